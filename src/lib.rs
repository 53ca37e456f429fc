pub mod chunk;
pub mod compiler;
pub mod reporter;
pub mod scanner;
pub mod token;
pub mod value;
pub mod vm;

use reporter::Reporter;

/// The three outcomes a full compile-then-run pass can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    CompileErr,
    RuntimeErr,
}

/// Compiles `source` and, if that succeeds, runs it to completion against a fresh VM.
/// Both phases report through the same `Reporter`, mirroring the single stderr contract
/// described for the CLI.
pub fn run_source<R: Reporter>(source: &str, reporter: &mut R) -> Outcome {
    let function = match compiler::compile(source, reporter) {
        Ok(function) => function,
        Err(()) => return Outcome::CompileErr,
    };
    match vm::Vm::new().interpret(function, reporter) {
        Ok(()) => Outcome::Ok,
        Err(()) => Outcome::RuntimeErr,
    }
}
