use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::chunk::{Chunk, OpCode};
use super::reporter::{Phase, Report, Reporter};
use super::scanner::Scanner;
use super::token::{Span, Token, TokenType};
use super::value::{Function, Value};

struct Local {
    name: String,
    depth: usize,
}

/// One per Function being built. Slot 0 of `locals` is reserved for the function
/// value itself, aliasing `CallFrame::frame_start` at runtime.
struct FunctionCompiler {
    name: String,
    arity: u8,
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
}

impl FunctionCompiler {
    fn new(name: String) -> Self {
        Self {
            name,
            arity: 0,
            chunk: Chunk::new(),
            locals: vec![Local {
                name: String::new(),
                depth: 0,
            }],
            scope_depth: 0,
        }
    }
}

/// Recursive-descent, single-pass: every grammar rule below emits opcodes directly
/// instead of building an intermediate tree. `compilers` is a stack because function
/// declarations nest a fresh `FunctionCompiler`; globals are shared across all of them
/// since this language has no upvalues to resolve through an enclosing chain.
struct Parser<'src, 'rep, R: Reporter> {
    scanner: Scanner<'src>,
    reporter: &'rep mut R,
    previous: Token,
    current: Token,
    had_error: bool,
    panic_mode: bool,
    globals: Rc<RefCell<HashMap<String, u8>>>,
    compilers: Vec<FunctionCompiler>,
}

#[allow(clippy::result_unit_err)]
pub fn compile<R: Reporter>(source: &str, reporter: &mut R) -> Result<Function, ()> {
    let mut p = Parser::new(source, reporter);
    p.consume(TokenType::Hai, "expected HAI at the start of the program");
    p.consume(TokenType::Float, "expected a version number after HAI");
    p.skip_breaks();
    while !p.check(TokenType::Kthxbye) && !p.check(TokenType::Eof) {
        p.statement_and_recover();
        p.skip_breaks();
    }
    p.consume(TokenType::Kthxbye, "expected KTHXBYE to close the program");
    let had_error = p.had_error;
    let function = p.finish();
    if had_error {
        Err(())
    } else {
        Ok(function)
    }
}

impl<'src, 'rep, R: Reporter> Parser<'src, 'rep, R> {
    fn new(source: &'src str, reporter: &'rep mut R) -> Self {
        let mut scanner = Scanner::new(source);
        let current = scanner.scan_token();
        Self {
            scanner,
            reporter,
            previous: current.clone(),
            current,
            had_error: false,
            panic_mode: false,
            globals: Rc::new(RefCell::new(HashMap::new())),
            compilers: vec![FunctionCompiler::new("<script>".to_string())],
        }
    }

    // --- token stream plumbing -------------------------------------------------

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.scanner.scan_token());
        while self.current.typ == TokenType::Error {
            let msg = if self.current.lexeme == "\"" {
                "unterminated string".to_string()
            } else {
                format!("unexpected character near \"{}\"", self.current.lexeme)
            };
            self.error_at_current(&msg);
            self.current = self.scanner.scan_token();
        }
    }

    fn check(&self, typ: TokenType) -> bool {
        self.current.typ == typ
    }

    fn match_token(&mut self, typ: TokenType) -> bool {
        if self.check(typ) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, typ: TokenType, msg: &str) {
        if self.check(typ) {
            self.advance();
        } else {
            self.error_at_current(msg);
        }
    }

    fn consume_ident(&mut self, msg: &str) -> Token {
        if !self.check(TokenType::Ident) {
            self.error_at_current(msg);
        }
        let tok = self.current.clone();
        self.advance();
        tok
    }

    fn skip_breaks(&mut self) {
        while self.match_token(TokenType::Break) {}
    }

    fn can_start_expression(&self) -> bool {
        matches!(
            self.current.typ,
            TokenType::Number
                | TokenType::Float
                | TokenType::String
                | TokenType::Win
                | TokenType::Fail
                | TokenType::Noob
                | TokenType::It
                | TokenType::Sum
                | TokenType::Diff
                | TokenType::Produkt
                | TokenType::Quoshunt
                | TokenType::Biggr
                | TokenType::Smallr
                | TokenType::Both
                | TokenType::Iz
                | TokenType::I
                | TokenType::Ident
        )
    }

    // --- error reporting ---------------------------------------------------

    fn error_at(&mut self, span: Span, msg: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.reporter
            .error(Report::new(Phase::Compiling, msg.to_string(), span));
    }

    fn error_at_current(&mut self, msg: &str) {
        let span = self.current.span;
        self.error_at(span, msg);
    }

    /// Skips forward to the next statement boundary so a single mistake doesn't cascade
    /// into a wall of follow-on errors.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenType::Eof) {
            if self.previous.typ == TokenType::Break {
                return;
            }
            match self.current.typ {
                TokenType::How
                | TokenType::I
                | TokenType::Visible
                | TokenType::O
                | TokenType::Slab
                | TokenType::Found
                | TokenType::Gtfo
                | TokenType::Kthxbye => return,
                _ => self.advance(),
            }
        }
    }

    // --- bytecode emission --------------------------------------------------

    fn current_fc(&self) -> &FunctionCompiler {
        self.compilers.last().unwrap()
    }

    fn current_fc_mut(&mut self) -> &mut FunctionCompiler {
        self.compilers.last_mut().unwrap()
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_fc_mut().chunk
    }

    fn emit_op(&mut self, op: OpCode) {
        let span = self.previous.span;
        self.chunk_mut().emit_op(op, span);
    }

    fn emit_byte(&mut self, byte: u8) {
        let span = self.previous.span;
        self.chunk_mut().emit_byte(byte, span);
    }

    fn emit_constant(&mut self, value: Value) {
        let span = self.previous.span;
        if let Err(msg) = self.chunk_mut().emit_constant(value, span) {
            self.error_at(span, &msg);
        }
    }

    fn emit_epilogue(&mut self) {
        self.emit_op(OpCode::GetIt);
        self.emit_op(OpCode::Return);
    }

    fn finish(mut self) -> Function {
        self.emit_epilogue();
        let fc = self.compilers.pop().unwrap();
        Function::new(fc.name, fc.arity, fc.chunk)
    }

    fn begin_function(&mut self, name: String) {
        self.compilers.push(FunctionCompiler::new(name));
    }

    fn end_function(&mut self, arity: u8) -> Function {
        self.emit_epilogue();
        let mut fc = self.compilers.pop().unwrap();
        fc.arity = arity;
        Function::new(fc.name, fc.arity, fc.chunk)
    }

    fn begin_scope(&mut self) {
        self.current_fc_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let span = self.previous.span;
        let depth_after = self.current_fc().scope_depth - 1;
        while let Some(local) = self.current_fc().locals.last() {
            if local.depth > depth_after {
                self.current_fc_mut().locals.pop();
                self.chunk_mut().emit_op(OpCode::Pop, span);
            } else {
                break;
            }
        }
        self.current_fc_mut().scope_depth -= 1;
    }

    // --- scope resolution ----------------------------------------------------

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.current_fc()
            .locals
            .iter()
            .rposition(|l| l.name == name)
            .map(|i| i as u8)
    }

    fn resolve_global(&self, name: &str) -> Option<u8> {
        self.globals.borrow().get(name).copied()
    }

    fn get_or_create_global(&mut self, name: &str) -> u8 {
        let mut globals = self.globals.borrow_mut();
        if let Some(&slot) = globals.get(name) {
            return slot;
        }
        let slot = globals.len();
        if slot > u8::MAX as usize {
            drop(globals);
            self.error_at_current("too many globals");
            return 0;
        }
        globals.insert(name.to_string(), slot as u8);
        slot as u8
    }

    fn declare_local(&mut self, tok: &Token) {
        let depth = self.current_fc().scope_depth;
        let redeclared = self
            .current_fc()
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth == depth)
            .any(|l| l.name == tok.lexeme);
        if redeclared {
            self.error_at(
                tok.span,
                &format!("{} is already declared in this scope", tok.lexeme),
            );
            return;
        }
        if self.current_fc().locals.len() >= 256 {
            self.error_at(tok.span, "too many locals in one function");
            return;
        }
        self.current_fc_mut().locals.push(Local {
            name: tok.lexeme.clone(),
            depth,
        });
    }

    fn push_name_read(&mut self, name: &str, span: Span) {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_op(OpCode::LocalGet);
            self.emit_byte(slot);
        } else if let Some(slot) = self.resolve_global(name) {
            self.emit_op(OpCode::GlobalGet);
            self.emit_byte(slot);
        } else {
            self.error_at(span, &format!("undefined variable {name}"));
        }
    }

    /// Assumes the new value is already on top of the stack.
    fn assign(&mut self, name: &str, span: Span) {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_op(OpCode::LocalSet);
            self.emit_byte(slot);
        } else if let Some(slot) = self.resolve_global(name) {
            self.emit_op(OpCode::GlobalDef);
            self.emit_byte(slot);
            // GLOBAL_DEF pops; re-push so `x R 5` is itself expression-valued.
            self.emit_op(OpCode::GlobalGet);
            self.emit_byte(slot);
        } else {
            self.error_at(span, &format!("undefined variable {name}"));
        }
    }

    // --- statements ----------------------------------------------------------

    fn statement_and_recover(&mut self) {
        self.statement();
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        match self.current.typ {
            TokenType::How => self.function_decl(),
            TokenType::Visible => self.visible_stmt(),
            TokenType::O => self.conditional(),
            TokenType::Slab => self.block_stmt(),
            TokenType::Found => self.return_stmt(),
            TokenType::Gtfo => self.gtfo_stmt(),
            TokenType::I => {
                self.advance();
                if self.match_token(TokenType::Has) {
                    self.declaration_rest();
                } else if self.check(TokenType::Iz) {
                    self.call_rest();
                    self.emit_op(OpCode::SetIt);
                } else {
                    self.error_at_current("expected HAS or IZ after I");
                }
            }
            _ => {
                self.expression();
                self.emit_op(OpCode::SetIt);
            }
        }
    }

    /// `I` and `HAS` already consumed.
    fn declaration_rest(&mut self) {
        self.consume(TokenType::A, "expected A after HAS");
        let name = self.consume_ident("expected a variable name");
        self.consume(TokenType::Itz, "expected ITZ after the variable name");
        self.expression();
        if self.current_fc().scope_depth == 0 {
            let slot = self.get_or_create_global(&name.lexeme);
            self.emit_op(OpCode::GlobalDef);
            self.emit_byte(slot);
        } else {
            self.declare_local(&name);
        }
    }

    fn function_decl(&mut self) {
        self.advance(); // HOW
        self.consume(TokenType::Iz, "expected IZ after HOW");
        self.consume(TokenType::I, "expected I after HOW IZ");
        let name = self.consume_ident("expected a function name");
        let slot = self.get_or_create_global(&name.lexeme);

        self.begin_function(name.lexeme.clone());
        self.begin_scope();
        let mut arity: u8 = 0;
        if self.match_token(TokenType::Yr) {
            let param = self.consume_ident("expected a parameter name");
            self.declare_local(&param);
            arity += 1;
            while self.match_token(TokenType::An) {
                self.consume(TokenType::Yr, "expected YR after AN");
                let param = self.consume_ident("expected a parameter name");
                self.declare_local(&param);
                arity += 1;
            }
        }
        self.skip_breaks();
        while !self.check(TokenType::If) && !self.check(TokenType::Eof) {
            self.statement_and_recover();
            self.skip_breaks();
        }
        self.consume(TokenType::If, "expected IF U SAY SO to close the function");
        self.consume(TokenType::U, "expected U after IF");
        self.consume(TokenType::Say, "expected SAY after IF U");
        self.consume(TokenType::So, "expected SO after IF U SAY");
        let function = self.end_function(arity);

        self.emit_constant(Value::Function(Rc::new(function)));
        self.emit_op(OpCode::GlobalDef);
        self.emit_byte(slot);
    }

    fn visible_stmt(&mut self) {
        self.advance(); // VISIBLE
        let mut count: u32 = 0;
        while self.can_start_expression() {
            self.expression();
            count += 1;
        }
        if count == 0 {
            self.error_at_current("expected an expression after VISIBLE");
        }
        if count > u8::MAX as u32 {
            self.error_at_current("too many VISIBLE arguments");
            count = u8::MAX as u32;
        }
        let suppress_newline = self.match_token(TokenType::Bang);
        let op = if suppress_newline {
            OpCode::Print
        } else {
            OpCode::Println
        };
        self.emit_op(op);
        self.emit_byte(count as u8);
    }

    /// Branches on the IT value already current when `O RLY ?` is reached; only `MEBBE`
    /// guards evaluate a fresh expression.
    fn conditional(&mut self) {
        self.advance(); // O
        self.consume(TokenType::Rly, "expected RLY after O");
        self.consume(TokenType::Question, "expected ? after O RLY");
        self.skip_breaks();
        self.consume(TokenType::Ya, "expected YA RLY to open O RLY ?");
        self.consume(TokenType::Rly, "expected RLY after YA");
        self.skip_breaks();

        let span = self.previous.span;
        let mut end_jumps = Vec::new();
        let else_jump = self.chunk_mut().emit_jump(OpCode::JumpIfFalse, span);
        self.begin_scope();
        while !self.at_conditional_arm_boundary() {
            self.statement_and_recover();
            self.skip_breaks();
        }
        self.end_scope();
        end_jumps.push(self.chunk_mut().emit_jump(OpCode::Jump, span));
        self.patch_jump(else_jump, span);

        while self.match_token(TokenType::Mebbe) {
            self.expression();
            self.emit_op(OpCode::SetIt);
            self.skip_breaks();
            let guard_span = self.previous.span;
            let guard_jump = self.chunk_mut().emit_jump(OpCode::JumpIfFalse, guard_span);
            self.begin_scope();
            while !self.at_conditional_arm_boundary() {
                self.statement_and_recover();
                self.skip_breaks();
            }
            self.end_scope();
            end_jumps.push(self.chunk_mut().emit_jump(OpCode::Jump, guard_span));
            self.patch_jump(guard_jump, guard_span);
        }

        if self.match_token(TokenType::No) {
            self.consume(TokenType::Wai, "expected WAI after NO");
            self.skip_breaks();
            self.begin_scope();
            while !self.check(TokenType::Oic) && !self.check(TokenType::Eof) {
                self.statement_and_recover();
                self.skip_breaks();
            }
            self.end_scope();
        }

        self.consume(TokenType::Oic, "expected OIC to close O RLY ?");
        for j in end_jumps {
            self.patch_jump(j, span);
        }
    }

    fn at_conditional_arm_boundary(&self) -> bool {
        self.check(TokenType::Mebbe)
            || self.check(TokenType::No)
            || self.check(TokenType::Oic)
            || self.check(TokenType::Eof)
    }

    fn patch_jump(&mut self, offset: usize, span: Span) {
        if let Err(msg) = self.chunk_mut().patch_jump(offset) {
            self.error_at(span, &msg);
        }
    }

    fn block_stmt(&mut self) {
        self.advance(); // SLAB
        self.skip_breaks();
        self.begin_scope();
        while !self.check(TokenType::Kill) && !self.check(TokenType::Eof) {
            self.statement_and_recover();
            self.skip_breaks();
        }
        self.end_scope();
        self.consume(TokenType::Kill, "expected KILL to close SLAB");
    }

    fn return_stmt(&mut self) {
        self.advance(); // FOUND
        if self.compilers.len() == 1 {
            let span = self.previous.span;
            self.error_at(span, "FOUND YR is only valid inside a function");
        }
        self.consume(TokenType::Yr, "expected YR after FOUND");
        self.expression();
        self.emit_op(OpCode::Return);
    }

    fn gtfo_stmt(&mut self) {
        self.advance(); // GTFO
        if self.compilers.len() == 1 {
            let span = self.previous.span;
            self.error_at(span, "GTFO is only valid inside a function");
        }
        self.emit_op(OpCode::PushNoob);
        self.emit_op(OpCode::Return);
    }

    // --- expressions -----------------------------------------------------------

    fn expression(&mut self) {
        match self.current.typ {
            TokenType::Number => {
                let tok = self.current.clone();
                self.advance();
                self.number_literal(&tok);
            }
            TokenType::Float => {
                let tok = self.current.clone();
                self.advance();
                self.float_literal(&tok);
            }
            TokenType::String => {
                let tok = self.current.clone();
                self.advance();
                self.emit_constant(Value::new_string(tok.lexeme));
            }
            TokenType::Win => {
                self.advance();
                self.emit_op(OpCode::PushWin);
            }
            TokenType::Fail => {
                self.advance();
                self.emit_op(OpCode::PushFail);
            }
            TokenType::Noob => {
                self.advance();
                self.emit_op(OpCode::PushNoob);
            }
            TokenType::It => {
                self.advance();
                self.emit_op(OpCode::GetIt);
            }
            TokenType::Sum
            | TokenType::Diff
            | TokenType::Produkt
            | TokenType::Quoshunt
            | TokenType::Biggr
            | TokenType::Smallr => self.binary_op(),
            TokenType::Both => self.both_saem(),
            TokenType::Iz => self.comparison(),
            TokenType::I => self.call_expr(),
            TokenType::Ident => self.named_variable(),
            _ => {
                self.error_at_current("expected an expression");
                self.advance();
            }
        }
    }

    fn number_literal(&mut self, tok: &Token) {
        match tok.lexeme.parse::<i64>() {
            Ok(n) => self.emit_constant(Value::Integer(n)),
            Err(_) => self.error_at(tok.span, "number literal out of range"),
        }
    }

    fn float_literal(&mut self, tok: &Token) {
        match tok.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Float(n)),
            Err(_) => self.error_at(tok.span, "malformed float literal"),
        }
    }

    fn binary_op(&mut self) {
        let op = match self.current.typ {
            TokenType::Sum => OpCode::Add,
            TokenType::Diff => OpCode::Sub,
            TokenType::Produkt => OpCode::Mul,
            TokenType::Quoshunt => OpCode::Div,
            TokenType::Biggr => OpCode::Max,
            TokenType::Smallr => OpCode::Min,
            _ => unreachable!("binary_op only dispatched for arithmetic keywords"),
        };
        self.advance();
        self.consume(TokenType::Of, "expected OF");
        self.expression();
        self.consume(TokenType::An, "expected AN");
        self.expression();
        self.emit_op(op);
    }

    fn both_saem(&mut self) {
        self.advance(); // BOTH
        self.consume(TokenType::Saem, "expected SAEM after BOTH");
        self.expression();
        self.match_token(TokenType::An);
        self.expression();
        self.emit_op(OpCode::Eq);
    }

    fn comparison(&mut self) {
        self.advance(); // IZ
        self.expression();
        let greater = if self.match_token(TokenType::Les) {
            false
        } else if self.match_token(TokenType::Greter) {
            true
        } else {
            self.error_at_current("expected LES or GRETER");
            false
        };
        let eq = self.match_token(TokenType::Eq);
        self.consume(TokenType::Then, "expected THEN");
        self.expression();
        let op = match (greater, eq) {
            (false, false) => OpCode::Lt,
            (false, true) => OpCode::Lte,
            (true, false) => OpCode::Gt,
            (true, true) => OpCode::Gte,
        };
        self.emit_op(op);
    }

    /// Entry point when `I` has not yet been consumed (an `I IZ ... MKAY` call used as
    /// an expression).
    fn call_expr(&mut self) {
        self.advance(); // I
        self.call_rest();
    }

    /// Assumes `I` already consumed; parses `IZ <name> (YR <e> (AN YR <e>)*)? MKAY`.
    fn call_rest(&mut self) {
        self.consume(TokenType::Iz, "expected IZ after I");
        let name = self.consume_ident("expected a function name");
        self.push_name_read(&name.lexeme, name.span);
        let mut argc: u8 = 0;
        if self.match_token(TokenType::Yr) {
            self.expression();
            argc += 1;
            while self.match_token(TokenType::An) {
                self.consume(TokenType::Yr, "expected YR after AN");
                self.expression();
                argc += 1;
            }
        }
        self.consume(TokenType::Mkay, "expected MKAY to close the call");
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
    }

    fn named_variable(&mut self) {
        let tok = self.current.clone();
        self.advance();
        if self.match_token(TokenType::R) {
            self.expression();
            self.assign(&tok.lexeme, tok.span);
        } else {
            self.push_name_read(&tok.lexeme, tok.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use std::convert::TryFrom;

    fn compile_ok(src: &str) -> Function {
        let mut rep = CollectingReporter::default();
        compile(src, &mut rep).expect("expected a successful compile")
    }

    fn compile_err(src: &str) -> CollectingReporter {
        let mut rep = CollectingReporter::default();
        assert!(compile(src, &mut rep).is_err(), "expected a compile error");
        rep
    }

    #[test]
    fn script_ends_with_get_it_return() {
        let function = compile_ok("HAI 1.3\nVISIBLE 1\nKTHXBYE");
        let chunk = &function.chunk;
        let len = chunk.len();
        assert_eq!(
            OpCode::try_from(chunk.byte(len - 1)).unwrap(),
            OpCode::Return
        );
        assert_eq!(
            OpCode::try_from(chunk.byte(len - 2)).unwrap(),
            OpCode::GetIt
        );
    }

    #[test]
    fn undefined_variable_is_a_compile_error() {
        let rep = compile_err("HAI 1.3\nVISIBLE Y\nKTHXBYE");
        assert!(rep.errors[0].msg.contains("undefined variable Y"));
    }

    #[test]
    fn redeclaring_a_local_in_the_same_scope_errors() {
        compile_err("HAI 1.3\nSLAB\nI HAS A X ITZ 1\nI HAS A X ITZ 2\nKILL\nKTHXBYE");
    }

    #[test]
    fn function_declaration_compiles_and_installs_a_global() {
        let function = compile_ok(
            "HAI 1.3\nHOW IZ I DOUBLE YR N\nFOUND YR SUM OF N AN N\nIF U SAY SO\nVISIBLE I IZ DOUBLE YR 21 MKAY\nKTHXBYE",
        );
        assert!(!function.chunk.is_empty());
    }

    #[test]
    fn gtfo_outside_a_function_is_an_error() {
        compile_err("HAI 1.3\nGTFO\nKTHXBYE");
    }

    #[test]
    fn missing_kthxbye_is_an_error() {
        compile_err("HAI 1.3\nVISIBLE 1");
    }
}
