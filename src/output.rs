//! Output data structures for JSON serialization.
//!
//! These are the read-only views handed to a renderer: the line log, bug
//! poses, and the result of parsing a program.

use crate::ast::{Program, Tree};
use crate::bug::Color;
use crate::error::{BugFailure, CompileError};
use serde::{Deserialize, Serialize};

/// A line segment in the line log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Pen color at the time the segment was drawn.
    pub color: Color,
    /// Assigned when the segment is appended; strictly increasing.
    pub id: u64,
}

/// Pose and pen of a live bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugSnapshot {
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Degrees clockwise on screen from east.
    pub angle: f64,
    /// `None` while the pen is lifted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Live bugs in definition order.
    pub bugs: Vec<BugSnapshot>,
    /// The full line log, oldest first.
    pub lines: Vec<Command>,
    /// Rounds granted so far.
    pub rounds: u64,
    /// Bugs that stopped on a runtime error.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<BugFailure>,
}

/// A successfully parsed program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProgram {
    /// Bug names in definition order.
    pub bugs: Vec<String>,
    /// The whole `program` tree.
    pub ast: Tree,
}

impl From<&Program> for ParsedProgram {
    fn from(program: &Program) -> Self {
        Self {
            bugs: program
                .bug_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            ast: program.root.clone(),
        }
    }
}

/// Parse result (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ParseResult {
    /// Successful parse
    #[serde(rename = "success")]
    Success {
        /// Parsed program
        program: ParsedProgram,
    },
    /// Syntax error
    #[serde(rename = "error")]
    Error {
        /// List of errors
        errors: Vec<CompileError>,
    },
}
