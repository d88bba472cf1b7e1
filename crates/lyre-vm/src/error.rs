//! Runtime error type.

use lyre_compiler::compiler::CompileError;
use std::fmt;

/// An error raised while executing a script. Carries the source line of
/// the failing instruction when it is known.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: Option<u32>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
            line: None,
        }
    }

    pub fn at(message: impl Into<String>, line: u32) -> Self {
        RuntimeError {
            message: message.into(),
            line: Some(line),
        }
    }

    /// An invariant violation in the runtime itself, not in the script.
    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError {
            message: format!("[Internal error] {}", message.into()),
            line: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Error at line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<CompileError> for RuntimeError {
    fn from(e: CompileError) -> Self {
        RuntimeError {
            message: e.message,
            line: Some(e.line),
        }
    }
}
