//! Abstract Syntax Tree definitions for the Bugs language.
//!
//! The tree is generic: every node carries a [`Token`] and an ordered list of
//! children. Nodes are immutable once the parser has built them and are
//! handed around as [`Tree`] (`Arc<Node>`), so a function body stored in a
//! function table is the same allocation the program holds.

use crate::error::RuntimeError;
use crate::token::{Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an immutable AST node.
pub type Tree = Arc<Node>;

/// A single AST node: a value and its ordered children.
///
/// Equality is structural: same value token, same children in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// The token this node represents.
    pub value: Token,
    /// Ordered children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Tree>,
}

impl Node {
    /// Create a leaf node.
    pub fn leaf(value: Token) -> Tree {
        Arc::new(Self {
            value,
            children: Vec::new(),
        })
    }

    /// Create a node with the given children.
    pub fn with_children(value: Token, children: Vec<Tree>) -> Tree {
        Arc::new(Self { value, children })
    }

    /// Create a node whose value is classified from `text` (see [`Token::of`]).
    ///
    /// # Example
    ///
    /// ```rust
    /// use bugs_lang::ast::Node;
    ///
    /// let tree = Node::of("move", vec![Node::of("10.0", vec![])]);
    /// assert_eq!(tree.text(), "move");
    /// assert_eq!(tree.child(0).unwrap().text(), "10.0");
    /// ```
    pub fn of(text: &str, children: Vec<Tree>) -> Tree {
        Self::with_children(Token::of(text), children)
    }

    /// Text of this node's value.
    #[inline]
    pub fn text(&self) -> &str {
        &self.value.text
    }

    /// Kind of this node's value.
    #[inline]
    pub fn kind(&self) -> TokenKind {
        self.value.kind
    }

    /// The `index`th child, if present.
    #[inline]
    pub fn child(&self, index: usize) -> Option<&Tree> {
        self.children.get(index)
    }

    /// Number of children.
    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` for a leaf.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The `index`th child, or a [`RuntimeError::Malformed`] naming this node.
    ///
    /// Used by the interpreter, which only ever sees parser-built trees but
    /// must not panic if handed a hand-built one.
    pub fn expect_child(&self, index: usize) -> Result<&Tree, RuntimeError> {
        self.children.get(index).ok_or_else(|| {
            RuntimeError::malformed(format!("'{}' is missing child {}", self.text(), index))
        })
    }
}

impl fmt::Display for Node {
    /// Lisp-style rendering: `move(10.0)`, `+(a, *(b, c))`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.kind {
            TokenKind::Eol => write!(f, "EOL")?,
            _ => write!(f, "{}", self.value.text)?,
        }
        if !self.children.is_empty() {
            write!(f, "(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A parsed program.
///
/// `root` is the whole `program` tree; `allbugs` and `bugs` are views onto its
/// two halves so the interpreter can reach them without re-walking the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// The `program` node: `program(Allbugs, list(Bug...))`.
    pub root: Tree,
    /// The `Allbugs` subtree (childless when the program has no Allbugs section).
    pub allbugs: Tree,
    /// One `Bug` subtree per bug definition, in source order.
    pub bugs: Vec<Tree>,
}

impl Program {
    /// Build a program view from a `program` root.
    pub fn from_root(root: Tree) -> Result<Self, RuntimeError> {
        if root.text() != "program" {
            return Err(RuntimeError::malformed(format!(
                "expected a program tree, found '{}'",
                root.text()
            )));
        }
        let allbugs = root.expect_child(0)?.clone();
        let bugs = root.expect_child(1)?.children.clone();
        Ok(Self {
            root,
            allbugs,
            bugs,
        })
    }

    /// Names of the bugs defined by this program, in source order.
    pub fn bug_names(&self) -> Vec<&str> {
        self.bugs
            .iter()
            .filter_map(|bug| bug.child(0).map(|name| name.text()))
            .collect()
    }
}
