use super::token::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Compiling,
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Scanning => write!(f, "scanning"),
            Phase::Compiling => write!(f, "compile"),
            Phase::Runtime => write!(f, "runtime"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub phase: Phase,
    pub msg: String,
    pub span: Span,
}

impl Report {
    pub fn new(phase: Phase, msg: String, span: Span) -> Self {
        Report { phase, msg, span }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] Error: {}", self.span, self.msg)
    }
}

/// Threaded through the scanner, compiler, and VM so only the CLI binary decides how
/// errors ultimately get printed (`CliReporter`); tests can swap in an in-memory
/// reporter instead, following the teacher's `ErrorsTracker` pattern (`main.rs`).
pub trait Reporter {
    fn error(&mut self, report: Report);
}

pub struct CliReporter {
    pub error_count: usize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self { error_count: 0 }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for CliReporter {
    fn error(&mut self, report: Report) {
        self.error_count += 1;
        eprintln!("{report}");
    }
}

#[derive(Default)]
pub struct CollectingReporter {
    pub errors: Vec<Report>,
}

impl Reporter for CollectingReporter {
    fn error(&mut self, report: Report) {
        self.errors.push(report);
    }
}
