//! Per-bug tree-walking evaluator.
//!
//! A [`Bug`] owns everything private to one running bug: its function table,
//! the stack of function-call frames, the return slot and the loop depth.
//! The parts other threads may read (pose, color, top-level variables) live
//! in a shared [`BugHandle`] so the renderer and other bugs' dot-access can
//! see them while the bug runs.
//!
//! Visible actions (`move`, `moveto`, `turn`, `turnto`, `line`) end with a
//! handshake at the round barrier; nothing else ever yields.
//!
//! # Variable resolution
//!
//! 1. built-in fields `x`, `y`, `angle`
//! 2. function-call frames, innermost first
//! 3. the bug's own variables
//! 4. Allbugs globals

use crate::ast::Tree;
use crate::error::RuntimeError;
use crate::interpreter::World;
use crate::output::BugSnapshot;
use crate::scheduler::{lock, Control};
use crate::token::TokenKind;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tolerance used by every comparison operator.
pub const EPSILON: f64 = 0.001;

/// Names that always refer to a bug's pose and can never be declared.
pub const BUILT_IN_FIELDS: [&str; 3] = ["x", "y", "angle"];

/// Returns `true` for values outside `±EPSILON`.
#[inline]
pub fn is_true(value: f64) -> bool {
    value > EPSILON || value < -EPSILON
}

#[inline]
fn truth(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

fn is_built_in(name: &str) -> bool {
    BUILT_IN_FIELDS.contains(&name)
}

// =============================================================================
// Colors
// =============================================================================

/// Pen colors. The keyword `none` lifts the pen and has no variant here; it
/// is represented as `Option::<Color>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Color {
    Black,
    Blue,
    Cyan,
    DarkGray,
    Gray,
    Green,
    LightGray,
    Magenta,
    Orange,
    Pink,
    Red,
    White,
    Yellow,
    Brown,
    Purple,
}

impl Color {
    /// Look up a color by its keyword.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bugs_lang::bug::Color;
    ///
    /// assert_eq!(Color::from_name("darkGray"), Some(Color::DarkGray));
    /// assert_eq!(Color::from_name("none"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name {
            "black" => Color::Black,
            "blue" => Color::Blue,
            "cyan" => Color::Cyan,
            "darkGray" => Color::DarkGray,
            "gray" => Color::Gray,
            "green" => Color::Green,
            "lightGray" => Color::LightGray,
            "magenta" => Color::Magenta,
            "orange" => Color::Orange,
            "pink" => Color::Pink,
            "red" => Color::Red,
            "white" => Color::White,
            "yellow" => Color::Yellow,
            "brown" => Color::Brown,
            "purple" => Color::Purple,
            _ => return None,
        };
        Some(color)
    }

    /// The keyword naming this color.
    pub fn name(&self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::Blue => "blue",
            Color::Cyan => "cyan",
            Color::DarkGray => "darkGray",
            Color::Gray => "gray",
            Color::Green => "green",
            Color::LightGray => "lightGray",
            Color::Magenta => "magenta",
            Color::Orange => "orange",
            Color::Pink => "pink",
            Color::Red => "red",
            Color::White => "white",
            Color::Yellow => "yellow",
            Color::Brown => "brown",
            Color::Purple => "purple",
        }
    }

    /// RGB components.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Color::Black => (0, 0, 0),
            Color::Blue => (0, 0, 255),
            Color::Cyan => (0, 255, 255),
            Color::DarkGray => (64, 64, 64),
            Color::Gray => (128, 128, 128),
            Color::Green => (0, 255, 0),
            Color::LightGray => (192, 192, 192),
            Color::Magenta => (255, 0, 255),
            Color::Orange => (255, 200, 0),
            Color::Pink => (255, 175, 175),
            Color::Red => (255, 0, 0),
            Color::White => (255, 255, 255),
            Color::Yellow => (255, 255, 0),
            Color::Brown => (153, 76, 0),
            Color::Purple => (153, 51, 255),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Shared bug state
// =============================================================================

/// The externally visible part of a bug.
#[derive(Debug, Clone, PartialEq)]
pub struct BugState {
    pub x: f64,
    pub y: f64,
    /// Degrees, kept in `[0, 360)` by `turn` and `turnto`.
    pub angle: f64,
    pub color: Option<Color>,
    /// Variables declared in the bug definition.
    pub variables: HashMap<String, f64>,
}

impl Default for BugState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            color: Some(Color::Black),
            variables: HashMap::new(),
        }
    }
}

/// Shared handle to a bug's visible state.
#[derive(Debug)]
pub struct BugHandle {
    id: usize,
    name: String,
    state: Mutex<BugState>,
}

impl BugHandle {
    /// A bug at the origin, facing east, drawing in black.
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: Mutex::new(BugState::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock the state. Never hold this while evaluating an expression: the
    /// expression may read this same bug through dot-access.
    pub fn state(&self) -> MutexGuard<'_, BugState> {
        lock(&self.state)
    }

    /// A copy of the pose and color for the renderer.
    pub fn snapshot(&self) -> BugSnapshot {
        let state = self.state();
        BugSnapshot {
            name: self.name.clone(),
            x: state.x,
            y: state.y,
            angle: state.angle,
            color: state.color,
        }
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// How a statement finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Carry on with the next statement.
    Normal,
    /// A `return` ran; skip the rest of the enclosing blocks up to the call.
    Returned,
    /// An `exit if` fired; skip the rest of the blocks up to the innermost loop.
    LoopExit,
}

/// A running bug.
pub struct Bug {
    handle: Arc<BugHandle>,
    world: Arc<World>,
    control: Arc<Control>,
    functions: HashMap<String, Tree>,
    /// One frame per active function call.
    scopes: Vec<HashMap<String, f64>>,
    return_value: f64,
    /// Active loops, counted across function calls.
    loop_depth: usize,
    /// Set when a called function ended the caller's loop.
    exit_pending: bool,
}

impl Bug {
    pub fn new(handle: Arc<BugHandle>, world: Arc<World>, control: Arc<Control>) -> Self {
        Self {
            handle,
            world,
            control,
            functions: HashMap::new(),
            scopes: Vec::new(),
            return_value: 0.0,
            loop_depth: 0,
            exit_pending: false,
        }
    }

    pub fn handle(&self) -> &Arc<BugHandle> {
        &self.handle
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn x(&self) -> f64 {
        self.handle.state().x
    }

    pub fn y(&self) -> f64 {
        self.handle.state().y
    }

    pub fn angle(&self) -> f64 {
        self.handle.state().angle
    }

    pub fn color(&self) -> Option<Color> {
        self.handle.state().color
    }

    /// Number of active function-call frames.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    // -------------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------------

    /// Read a variable following the resolution order.
    pub fn fetch(&self, name: &str) -> Result<f64, RuntimeError> {
        if is_built_in(name) {
            let state = self.handle.state();
            let value = match name {
                "x" => state.x,
                "y" => state.y,
                _ => state.angle,
            };
            if value.is_nan() {
                return Err(RuntimeError::NotANumber(name.to_string()));
            }
            return Ok(value);
        }
        for scope in self.scopes.iter().rev() {
            if let Some(&value) = scope.get(name) {
                return Ok(value);
            }
        }
        if let Some(&value) = self.handle.state().variables.get(name) {
            return Ok(value);
        }
        self.world
            .global(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Assign to an existing variable following the resolution order.
    pub fn store(&mut self, name: &str, value: f64) -> Result<(), RuntimeError> {
        if is_built_in(name) {
            let mut state = self.handle.state();
            match name {
                "x" => state.x = value,
                "y" => state.y = value,
                _ => state.angle = value,
            }
            return Ok(());
        }
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        if let Some(slot) = self.handle.state().variables.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        if self.world.set_global(name, value) {
            return Ok(());
        }
        Err(RuntimeError::UndefinedVariable(name.to_string()))
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    /// Evaluate an expression tree.
    pub fn evaluate(&mut self, node: &Tree) -> Result<f64, RuntimeError> {
        match node.kind() {
            TokenKind::Number => node
                .text()
                .parse::<f64>()
                .map_err(|_| RuntimeError::malformed(format!("bad number '{}'", node.text()))),
            TokenKind::Name if node.is_empty() => self.fetch(node.text()),
            TokenKind::Name if node.text() == "call" => self.call(node),
            TokenKind::Keyword if node.text() == "case" => {
                let (guard, _) = self.run_case(node)?;
                Ok(guard)
            }
            TokenKind::Symbol if node.text() == "." => self.dot(node),
            TokenKind::Symbol => self.evaluate_operator(node),
            _ => Err(RuntimeError::malformed(format!(
                "'{}' is not an expression",
                node.text()
            ))),
        }
    }

    fn evaluate_operator(&mut self, node: &Tree) -> Result<f64, RuntimeError> {
        let op = node.text();
        if node.len() == 1 {
            let operand = self.evaluate(node.expect_child(0)?)?;
            return match op {
                "+" => Ok(operand),
                "-" => Ok(-operand),
                _ => Err(RuntimeError::malformed(format!("'{}' is not unary", op))),
            };
        }

        let a = self.evaluate(node.expect_child(0)?)?;
        let b = self.evaluate(node.expect_child(1)?)?;
        let value = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => a / b,
            "<" => truth(b - a > EPSILON),
            "<=" => truth(b - a > -EPSILON),
            "=" => truth(!is_true(a - b)),
            "!=" => truth(is_true(a - b)),
            ">" => truth(a - b > EPSILON),
            ">=" => truth(a - b > -EPSILON),
            _ => {
                return Err(RuntimeError::malformed(format!(
                    "unknown operator '{}'",
                    op
                )))
            }
        };
        Ok(value)
    }

    /// `other.field`: a built-in field or a top-level variable of another bug.
    fn dot(&self, node: &Tree) -> Result<f64, RuntimeError> {
        let bug = node.expect_child(0)?.text();
        let field = node.expect_child(1)?.text();
        let other = self
            .world
            .find_bug(bug)
            .ok_or_else(|| RuntimeError::BugNotFound(bug.to_string()))?;
        let state = other.state();
        match field {
            "x" => Ok(state.x),
            "y" => Ok(state.y),
            "angle" => Ok(state.angle),
            _ => state
                .variables
                .get(field)
                .copied()
                .ok_or_else(|| RuntimeError::BugVariableNotFound {
                    bug: bug.to_string(),
                    var: field.to_string(),
                }),
        }
    }

    /// Evaluate a case guard and, if it holds, run its block.
    fn run_case(&mut self, node: &Tree) -> Result<(f64, Option<Flow>), RuntimeError> {
        let guard = self.evaluate(node.expect_child(0)?)?;
        if !is_true(guard) {
            return Ok((guard, None));
        }
        let flow = self.interpret(node.expect_child(1)?)?;
        Ok((guard, Some(flow)))
    }

    /// `call(NAME, var(args...))`
    fn call(&mut self, node: &Tree) -> Result<f64, RuntimeError> {
        let name = node.expect_child(0)?.text();
        let args = node.expect_child(1)?;

        if name == "distance" || name == "direction" {
            if args.len() != 1 {
                return Err(RuntimeError::ArgumentCount {
                    name: name.to_string(),
                    expected: 1,
                    found: args.len(),
                });
            }
            let target = args.expect_child(0)?.text();
            return if name == "distance" {
                self.distance(target)
            } else {
                self.direction(target)
            };
        }

        let function = self
            .functions
            .get(name)
            .cloned()
            .or_else(|| self.world.function(name))
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        let params = function.expect_child(1)?;
        let body = function.expect_child(2)?;

        if params.len() != args.len() {
            return Err(RuntimeError::ArgumentCount {
                name: name.to_string(),
                expected: params.len(),
                found: args.len(),
            });
        }
        if let Some(reserved) = params.children.iter().find(|p| is_built_in(p.text())) {
            return Err(RuntimeError::ReservedName(reserved.text().to_string()));
        }

        let mut frame = HashMap::with_capacity(params.len());
        for (param, arg) in params.children.iter().zip(&args.children) {
            let value = self.evaluate(arg)?;
            frame.insert(param.text().to_string(), value);
        }

        self.return_value = 0.0;
        self.scopes.push(frame);
        let result = self.interpret(body);
        self.scopes.pop();
        if result? == Flow::LoopExit {
            self.exit_pending = true;
        }

        Ok(std::mem::take(&mut self.return_value))
    }

    /// Euclidean distance to the named bug.
    pub fn distance(&self, bug: &str) -> Result<f64, RuntimeError> {
        let (dx, dy) = self.offset_to(bug)?;
        Ok(dx.hypot(dy))
    }

    /// Heading that faces the named bug: east 0, north 90, west 180, south 270.
    pub fn direction(&self, bug: &str) -> Result<f64, RuntimeError> {
        let (dx, dy) = self.offset_to(bug)?;
        Ok((-dy).atan2(dx).to_degrees().rem_euclid(360.0))
    }

    fn offset_to(&self, bug: &str) -> Result<(f64, f64), RuntimeError> {
        let other = self
            .world
            .find_bug(bug)
            .ok_or_else(|| RuntimeError::BugNotFound(bug.to_string()))?;
        let (ox, oy) = {
            let state = other.state();
            (state.x, state.y)
        };
        let state = self.handle.state();
        Ok((ox - state.x, oy - state.y))
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    /// Execute a statement, block or declaration.
    pub fn interpret(&mut self, node: &Tree) -> Result<Flow, RuntimeError> {
        if self.control.is_killed() {
            return Err(RuntimeError::Halted);
        }
        match node.text() {
            "Bug" => self.interpret_bug(node),
            "list" => {
                for child in &node.children {
                    self.interpret(child)?;
                }
                Ok(Flow::Normal)
            }
            "var" => {
                for name in &node.children {
                    self.declare(name.text())?;
                }
                Ok(Flow::Normal)
            }
            "function" => {
                let name = node.expect_child(0)?.text().to_string();
                self.functions.insert(name, node.clone());
                Ok(Flow::Normal)
            }
            "initially" => match node.child(0) {
                Some(block) => self.interpret(block),
                None => Ok(Flow::Normal),
            },
            "block" => {
                for child in &node.children {
                    let mut flow = self.interpret(child)?;
                    if std::mem::take(&mut self.exit_pending) {
                        flow = Flow::LoopExit;
                    }
                    if flow != Flow::Normal {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            "move" | "moveto" | "turn" | "turnto" | "line" => self.action(node),
            "assign" => {
                let name = node.expect_child(0)?.text();
                let value = self.evaluate(node.expect_child(1)?)?;
                self.store(name, value)?;
                Ok(Flow::Normal)
            }
            "loop" => {
                let body = node.expect_child(0)?;
                self.loop_depth += 1;
                let flow = self.run_loop(body);
                self.loop_depth -= 1;
                flow
            }
            "exit" => {
                let condition = self.evaluate(node.expect_child(0)?)?;
                if is_true(condition) && self.loop_depth > 0 {
                    Ok(Flow::LoopExit)
                } else {
                    Ok(Flow::Normal)
                }
            }
            "switch" => {
                for case in &node.children {
                    if let (_, Some(flow)) = self.run_case(case)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            "return" => {
                self.return_value = self.evaluate(node.expect_child(0)?)?;
                Ok(Flow::Returned)
            }
            "call" => {
                self.call(node)?;
                Ok(Flow::Normal)
            }
            "color" => {
                let keyword = node.expect_child(0)?.text();
                let color = match keyword {
                    "none" => None,
                    _ => Some(
                        Color::from_name(keyword)
                            .ok_or_else(|| RuntimeError::UnknownColor(keyword.to_string()))?,
                    ),
                };
                self.handle.state().color = color;
                Ok(Flow::Normal)
            }
            other => Err(RuntimeError::malformed(format!(
                "'{}' is not a statement",
                other
            ))),
        }
    }

    /// `Bug(NAME, list(var...), initially, block, list(function...))`
    ///
    /// Runs declarations, then functions, then `initially`, then the main block.
    fn interpret_bug(&mut self, node: &Tree) -> Result<Flow, RuntimeError> {
        self.interpret(node.expect_child(1)?)?;
        self.interpret(node.expect_child(4)?)?;
        self.interpret(node.expect_child(2)?)?;
        self.interpret(node.expect_child(3)?)?;
        Ok(Flow::Normal)
    }

    fn declare(&mut self, name: &str) -> Result<(), RuntimeError> {
        if is_built_in(name) {
            return Err(RuntimeError::ReservedName(name.to_string()));
        }
        self.handle.state().variables.insert(name.to_string(), 0.0);
        Ok(())
    }

    fn run_loop(&mut self, body: &Tree) -> Result<Flow, RuntimeError> {
        loop {
            match self.interpret(body)? {
                Flow::Normal => {}
                Flow::LoopExit => return Ok(Flow::Normal),
                Flow::Returned => return Ok(Flow::Returned),
            }
        }
    }

    /// Perform a visible action, then park until the next round.
    fn action(&mut self, node: &Tree) -> Result<Flow, RuntimeError> {
        let mut operands = Vec::with_capacity(node.len());
        for child in &node.children {
            operands.push(self.evaluate(child)?);
        }
        let operand = |i: usize| {
            operands
                .get(i)
                .copied()
                .ok_or_else(|| {
                    RuntimeError::malformed(format!("'{}' is missing child {}", node.text(), i))
                })
        };

        let segment = {
            let mut state = self.handle.state();
            let (x, y) = (state.x, state.y);
            let segment = match node.text() {
                "move" => {
                    let distance = operand(0)?;
                    let radians = state.angle.to_radians();
                    state.x = x + distance * radians.cos();
                    state.y = y - distance * radians.sin();
                    Some((x, y, state.x, state.y))
                }
                "moveto" => {
                    state.x = operand(0)?;
                    state.y = operand(1)?;
                    Some((x, y, state.x, state.y))
                }
                "turn" => {
                    state.angle = (state.angle + operand(0)?).rem_euclid(360.0);
                    None
                }
                "turnto" => {
                    state.angle = operand(0)?.rem_euclid(360.0);
                    None
                }
                _ => Some((operand(0)?, operand(1)?, operand(2)?, operand(3)?)),
            };
            // a lifted pen moves without drawing
            segment.zip(state.color)
        };

        if let Some(((x1, y1, x2, y2), color)) = segment {
            self.world.add_line(x1, y1, x2, y2, color);
        }
        trace!("{}: {}", self.handle.name(), node);

        self.control.handshake(self.handle.id())?;
        Ok(Flow::Normal)
    }
}
