//! # Bugs Language Interpreter
//!
//! `bugs_lang` parses and runs programs written in Bugs, a small language
//! for 2-D drawing agents ("bugs") that move, turn and draw line segments
//! while sharing global variables and functions.
//!
//! This crate contains no unsafe code.
//!
//! ## Overview
//!
//! - **Front end**: a lexer with one token of pushback and a recursive
//!   descent parser producing a generic AST
//! - **Evaluator**: a tree-walking interpreter per bug with function-call
//!   frames, loops with early exit, and epsilon comparisons
//! - **Scheduler**: every bug runs on its own thread, and visible actions
//!   advance in synchronized rounds under run / step / pause / kill control
//!
//! ## Quick Start
//!
//! ```rust
//! use bugs_lang::interpreter::Interpreter;
//! use bugs_lang::scheduler::RunConfig;
//! use std::time::Duration;
//!
//! let source = "\
//! Bug Sally {
//!     color red
//!     move 10
//!     turn 90
//!     move 10
//! }
//! ";
//!
//! let program = bugs_lang::load(source).unwrap();
//! let config = RunConfig { pause_ms: 0, start_running: true };
//! let mut interpreter = Interpreter::new(program, config).unwrap();
//! interpreter.start().unwrap();
//!
//! assert!(interpreter.wait_until_finished(Duration::from_secs(5)));
//! assert_eq!(interpreter.lines().len(), 2);
//! ```
//!
//! ## Language Syntax
//!
//! ### Actions
//!
//! | Action | Description |
//! |--------|-------------|
//! | `move d` | Move `d` units along the current heading |
//! | `moveto x, y` | Move to an absolute position |
//! | `turn a` | Turn `a` degrees |
//! | `turnto a` | Face heading `a` (0 east, 90 north) |
//! | `line x1, y1, x2, y2` | Draw a segment without moving |
//!
//! Each action takes one round. Everything else runs without yielding.
//!
//! ### Program Structure
//!
//! ```text
//! Allbugs {
//!     var shared
//!     define forward using step {
//!         move step
//!     }
//! }
//!
//! Bug Sally {
//!     var count
//!     initially {
//!         moveto 10, 10
//!     }
//!     loop {
//!         do forward(5)
//!         count = count + 1
//!         exit if count >= 4
//!     }
//! }
//! ```
//!
//! ## WebAssembly Support
//!
//! ```javascript
//! import init, { parse, validate, version } from 'bugs-lang';
//!
//! await init();
//! const result = parse('Bug Sally {\n  move 10\n}\n');
//! console.log(result.status);
//! ```
//!
//! ## Module Structure
//!
//! - [`token`]: Token type definitions
//! - [`lexer`]: Tokenizer for source code
//! - [`parser`]: Recursive descent parser
//! - [`ast`]: Abstract Syntax Tree definitions
//! - [`bug`]: Per-bug evaluator
//! - [`scheduler`]: Round barrier and run configuration
//! - [`interpreter`]: Shared world state and run control
//! - [`output`]: JSON-serializable output structures
//! - [`error`]: Error types

#![doc(html_root_url = "https://docs.rs/bugs-lang/0.3.0")]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ast;
pub mod bug;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod scheduler;
pub mod token;

use ast::Program;
use error::ParseError;
use interpreter::Interpreter;
use output::{ParseResult, ParsedProgram};
use parser::Parser;
use wasm_bindgen::prelude::*;

// =============================================================================
// WebAssembly API
// =============================================================================

/// Initializes the panic hook for better error messages in WebAssembly.
///
/// Called automatically when the WASM module is loaded.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Parses Bugs source code into an AST.
///
/// # Returns
///
/// A [`JsValue`] containing a serialized [`ParseResult`]:
/// - On success: `{ "status": "success", "program": { "bugs": [...], "ast": {...} } }`
/// - On error: `{ "status": "error", "errors": [ ... ] }`
#[wasm_bindgen]
pub fn parse(source: &str) -> JsValue {
    let result = parse_native(source);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Validates Bugs source code.
///
/// # Returns
///
/// - On success: `{ "status": "ok", "valid": true }`
/// - On error: `{ "status": "error", "errors": [ ... ] }`
///
/// # Example (JavaScript)
///
/// ```javascript
/// const result = validate('Bug Sally {\n  move 10\n}\n');
/// if (result.status === 'ok') {
///     console.log('Syntax is valid');
/// }
/// ```
#[wasm_bindgen]
pub fn validate(source: &str) -> JsValue {
    match load(source) {
        Ok(_) => {
            let result = serde_json::json!({ "status": "ok", "valid": true });
            serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
        }
        Err(e) => serde_wasm_bindgen::to_value(&ParseResult::Error {
            errors: vec![e.into()],
        })
        .unwrap_or(JsValue::NULL),
    }
}

/// Returns the version of the Bugs interpreter.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// =============================================================================
// Native Rust API
// =============================================================================

/// Parses Bugs source code into a [`Program`].
///
/// A syntax error aborts the whole parse; there is no partial program.
///
/// # Examples
///
/// ```rust
/// let program = bugs_lang::load("Bug Sally {\n    move 10\n}\n").unwrap();
/// assert_eq!(program.bug_names(), vec!["Sally"]);
///
/// let err = bugs_lang::load("Bug Sally {\n    move 10 20\n}\n").unwrap_err();
/// assert_eq!(err.line, 2);
/// ```
pub fn load(source: &str) -> Result<Program, ParseError> {
    Parser::new(source).parse_program()
}

/// Parses Bugs source code into a JSON-serializable [`ParseResult`].
///
/// # Examples
///
/// ```rust
/// use bugs_lang::parse_native;
/// use bugs_lang::output::ParseResult;
///
/// match parse_native("Bug Sally {\n    move 10\n}\n") {
///     ParseResult::Success { program } => assert_eq!(program.bugs, vec!["Sally"]),
///     ParseResult::Error { errors } => panic!("{:?}", errors),
/// }
/// ```
pub fn parse_native(source: &str) -> ParseResult {
    match load(source) {
        Ok(program) => ParseResult::Success {
            program: ParsedProgram::from(&program),
        },
        Err(e) => ParseResult::Error {
            errors: vec![e.into()],
        },
    }
}

/// Serializes the interpreter's current [`WorldSnapshot`](output::WorldSnapshot) to JSON.
pub fn snapshot_json(interpreter: &Interpreter) -> serde_json::Result<String> {
    serde_json::to_string(&interpreter.snapshot())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RunConfig;

    #[test]
    fn test_load_simple() {
        let program = load("Bug Sally {\n    move 10\n}\n").unwrap();
        assert_eq!(program.bugs.len(), 1);
        assert!(program.allbugs.is_empty());
    }

    #[test]
    fn test_load_syntax_error() {
        let err = load("Bug Sally {\n    move\n}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_parse_native_error() {
        match parse_native("Bug {\n}\n") {
            ParseResult::Error { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].line, 1);
            }
            ParseResult::Success { .. } => panic!("expected a syntax error"),
        }
    }

    #[test]
    fn test_snapshot_json() {
        let program = load("Bug Sally {\n    move 10\n}\n").unwrap();
        let interpreter = Interpreter::new(program, RunConfig::default()).unwrap();
        let json = snapshot_json(&interpreter).unwrap();
        assert!(json.contains("\"name\":\"Sally\""));
        assert!(json.contains("\"lines\":[]"));
    }

    #[test]
    fn test_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
