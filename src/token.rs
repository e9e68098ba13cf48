//! Token definitions for the Bugs language lexer.
//!
//! This module defines the tokens produced by the lexer and consumed by the parser.
//! Tokens are also the values carried by every AST node, so a token can describe
//! either a piece of source text (`move`, `Sally`, `10.0`, `<`) or a structural
//! marker the parser synthesizes (`program`, `list`, `block`, `call`, `assign`).
//!
//! # Token Categories
//!
//! - **Names**: identifiers that are not keywords (`Sally`, `abc123`, `x`)
//! - **Numbers**: floating point literals (`10`, `25.3`)
//! - **Keywords**: the fixed set in [`KEYWORDS`], including color names
//! - **Symbols**: any other single non-whitespace character (`{`, `<`, `=`, `,`)
//! - **Control**: end of line and end of input
//!
//! # Example
//!
//! The source `move 10\n` produces tokens:
//!
//! ```text
//! Keyword(move), Number(10.0), Eol, Eof
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved words of the Bugs language.
///
/// The color keywords are only meaningful after `color`, but they are still
/// keywords everywhere, so they cannot be used as variable names.
pub const KEYWORDS: &[&str] = &[
    "Allbugs",
    "Bug",
    "var",
    "initially",
    "move",
    "moveto",
    "turn",
    "turnto",
    "line",
    "loop",
    "exit",
    "if",
    "switch",
    "case",
    "return",
    "do",
    "color",
    "define",
    "using",
    // color names
    "black",
    "blue",
    "cyan",
    "darkGray",
    "gray",
    "green",
    "lightGray",
    "magenta",
    "orange",
    "pink",
    "red",
    "white",
    "yellow",
    "brown",
    "purple",
    "none",
];

/// Returns `true` if `word` is a reserved keyword.
///
/// # Example
///
/// ```rust
/// use bugs_lang::token::is_keyword;
///
/// assert!(is_keyword("moveto"));
/// assert!(is_keyword("darkGray"));
/// assert!(!is_keyword("Sally"));
/// ```
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Position information for a token in the source code.
///
/// # Fields
///
/// - `line`: Line number (1-based)
/// - `column`: Column number (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Span {
    /// Creates a new span at the given line and column.
    #[inline]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token type enumeration for the Bugs language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// An identifier that is not a keyword.
    Name,
    /// A numeric literal. The token text is the canonical float rendering.
    Number,
    /// A member of [`KEYWORDS`].
    Keyword,
    /// A single punctuation character.
    Symbol,
    /// End of line. Significant: it terminates statements and declarations.
    Eol,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Returns a human-readable description of the token kind.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bugs_lang::token::TokenKind;
    ///
    /// assert_eq!(TokenKind::Eol.description(), "end of line");
    /// ```
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::Name => "name",
            TokenKind::Number => "number",
            TokenKind::Keyword => "keyword",
            TokenKind::Symbol => "symbol",
            TokenKind::Eol => "end of line",
            TokenKind::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Name => "NAME",
            TokenKind::Number => "NUMBER",
            TokenKind::Keyword => "KEYWORD",
            TokenKind::Symbol => "SYMBOL",
            TokenKind::Eol => "EOL",
            TokenKind::Eof => "EOF",
        };
        f.write_str(name)
    }
}

/// A token with its kind, text and source position.
///
/// Equality compares kind and text only; two tokens read from different
/// places in the source are equal if they say the same thing.
///
/// # Example
///
/// ```rust
/// use bugs_lang::token::{Span, Token, TokenKind};
///
/// let a = Token::new(TokenKind::Keyword, "move", Span::new(1, 1));
/// let b = Token::new(TokenKind::Keyword, "move", Span::new(7, 3));
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The type of this token.
    pub kind: TokenKind,
    /// The text of this token.
    pub text: String,
    /// Position information in the source code.
    #[serde(skip)]
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[inline]
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Creates a token for `text`, classifying it the way the lexer would.
    ///
    /// Used for the structural nodes the parser synthesizes (`list`, `block`,
    /// `call`, ...) and handy for building expected trees in tests.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bugs_lang::token::{Token, TokenKind};
    ///
    /// assert_eq!(Token::of("loop").kind, TokenKind::Keyword);
    /// assert_eq!(Token::of("<=").kind, TokenKind::Symbol);
    /// assert_eq!(Token::of("3.5").kind, TokenKind::Number);
    /// assert_eq!(Token::of("block").kind, TokenKind::Name);
    /// ```
    pub fn of(text: &str) -> Self {
        let kind = if is_keyword(text) {
            TokenKind::Keyword
        } else if text == "\n" {
            TokenKind::Eol
        } else if text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        {
            TokenKind::Name
        } else if text.parse::<f64>().is_ok() {
            TokenKind::Number
        } else {
            TokenKind::Symbol
        };
        Self::new(kind, text, Span::default())
    }

    /// Returns `true` if this token has the given kind and text.
    #[inline]
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eol => write!(f, "EOL at {}", self.span),
            TokenKind::Eof => write!(f, "EOF at {}", self.span),
            _ => write!(f, "{} '{}' at {}", self.kind, self.text, self.span),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new(3, 7);
        assert_eq!(format!("{}", span), "3:7");
    }

    #[test]
    fn test_keyword_set() {
        for word in ["Allbugs", "Bug", "define", "using", "purple", "none"] {
            assert!(is_keyword(word), "{} should be a keyword", word);
        }
        assert!(!is_keyword("bug"));
        assert!(!is_keyword("distance"));
    }

    #[test]
    fn test_token_equality_ignores_span() {
        let a = Token::new(TokenKind::Name, "Sally", Span::new(1, 5));
        let b = Token::new(TokenKind::Name, "Sally", Span::new(9, 1));
        let c = Token::new(TokenKind::Keyword, "Sally", Span::new(1, 5));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_token_of_classification() {
        assert_eq!(Token::of("Bug").kind, TokenKind::Keyword);
        assert_eq!(Token::of("program").kind, TokenKind::Name);
        assert_eq!(Token::of("10.0").kind, TokenKind::Number);
        assert_eq!(Token::of("!=").kind, TokenKind::Symbol);
        assert_eq!(Token::of(".").kind, TokenKind::Symbol);
        assert_eq!(Token::of("\n").kind, TokenKind::Eol);
    }

    #[test]
    fn test_token_display() {
        let token = Token::new(TokenKind::Keyword, "move", Span::new(2, 3));
        assert_eq!(format!("{}", token), "KEYWORD 'move' at 2:3");
        let eol = Token::new(TokenKind::Eol, "\n", Span::new(2, 10));
        assert_eq!(format!("{}", eol), "EOL at 2:10");
    }
}
