//! Error types for the Bugs language front end and runtime.

use crate::token::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lexer error.
#[derive(Debug, Clone)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexerError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexerError {}

/// Syntax error raised once a grammar rule has committed and its
/// continuation does not match. Aborts the whole parse.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
            found: None,
        }
    }

    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)?;
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        Self {
            message: e.message,
            line: e.line,
            column: e.column,
            found: None,
        }
    }
}

/// Errors raised while a bug (or the Allbugs section) is being interpreted.
///
/// Every variant except [`RuntimeError::Halted`] is fatal to the bug that
/// raised it and to nobody else.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("variable \"{0}\" could not be found")]
    UndefinedVariable(String),
    #[error("function \"{0}\" is not defined")]
    UndefinedFunction(String),
    #[error("function \"{name}\" expects {expected} argument(s) but was called with {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("\"{0}\" is a built-in field and cannot be declared as a variable or parameter")]
    ReservedName(String),
    #[error("\"{0}\" is not a valid color")]
    UnknownColor(String),
    #[error("bug \"{0}\" was not found")]
    BugNotFound(String),
    #[error("variable \"{var}\" in bug \"{bug}\" was not found")]
    BugVariableNotFound { bug: String, var: String },
    #[error("variable \"{0}\" has value NaN")]
    NotANumber(String),
    #[error("malformed program tree: {0}")]
    Malformed(String),
    #[error("could not start a thread: {0}")]
    Spawn(String),
    /// Cooperative termination requested by `kill()` or `reset()`.
    #[error("execution halted")]
    Halted,
}

impl RuntimeError {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        RuntimeError::Malformed(what.into())
    }
}

/// A bug that stopped because of a runtime error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugFailure {
    /// Name of the bug that failed.
    pub bug: String,
    /// Rendered error message.
    pub message: String,
}

/// Error record for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        let mut message = e.message;
        if let Some(ref found) = e.found {
            message.push_str(&format!(" (found: {})", found));
        }
        Self {
            line: e.line,
            column: e.column,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("Missing EOL after move", Span::new(3, 9));
        assert_eq!(err.to_string(), "Line 3: Missing EOL after move");
        let err = err.with_found("'}'");
        assert!(err.to_string().ends_with("(found: '}')"));
    }

    #[test]
    fn test_lexer_error_conversion() {
        let err: ParseError = LexerError::new("Unterminated block comment", 4, 2).into();
        assert_eq!(err.line, 4);
        assert_eq!(err.column, 2);
    }

    #[test]
    fn test_compile_error_conversion() {
        let err = ParseError::new("Unexpected token", Span::new(2, 3)).with_found("'x'");
        let compile_err: CompileError = err.into();
        assert_eq!(compile_err.line, 2);
        assert_eq!(compile_err.column, 3);
        assert!(compile_err.message.contains("'x'"));
    }

    #[test]
    fn test_runtime_error_messages() {
        let err = RuntimeError::ArgumentCount {
            name: "mult".to_string(),
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "function \"mult\" expects 2 argument(s) but was called with 1"
        );
        assert_eq!(
            RuntimeError::ReservedName("angle".to_string()).to_string(),
            "\"angle\" is a built-in field and cannot be declared as a variable or parameter"
        );
    }
}
