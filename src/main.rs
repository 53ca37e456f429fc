use lulz::reporter::CliReporter;
use lulz::Outcome;
use std::{env, fs, process};

fn main() {
    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| {
        eprintln!("usage: interp <path>");
        process::exit(exitcode::USAGE);
    });
    if args.next().is_some() {
        eprintln!("usage: interp <path>");
        process::exit(exitcode::USAGE);
    }

    let source = fs::read_to_string(&path).unwrap_or_else(|err| {
        eprintln!("error reading {path}: {err}");
        process::exit(exitcode::IOERR);
    });

    let mut reporter = CliReporter::new();
    let code = match lulz::run_source(&source, &mut reporter) {
        Outcome::Ok => exitcode::OK,
        Outcome::CompileErr => exitcode::DATAERR,
        Outcome::RuntimeErr => exitcode::SOFTWARE,
    };
    process::exit(code);
}
