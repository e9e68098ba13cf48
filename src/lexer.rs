//! Lexer (tokenizer) for the Bugs language.
//!
//! Line comments (`//`) and block comments (`/* */`) are skipped; newlines are
//! significant and come out as [`TokenKind::Eol`]. Comparators are never
//! assembled here: `<=` is lexed as `<` followed by `=`, and the parser puts
//! them back together.

use crate::error::LexerError;
use crate::token::{is_keyword, Span, Token, TokenKind};

/// Lexer for the Bugs language.
///
/// Holds at most one pushed-back token, which is returned by the next call
/// to [`Lexer::next_token`] before any new input is read.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
    pushed_back: Option<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            pushed_back: None,
        }
    }

    /// Line of the next unread character (1-based).
    pub fn line(&self) -> usize {
        match self.pushed_back {
            Some(ref token) => token.span.line,
            None => self.line,
        }
    }

    /// Return a token to the lexer so the next call yields it again.
    ///
    /// Only one token of pushback is supported; the parser never needs more.
    pub fn push_back(&mut self, token: Token) {
        debug_assert!(
            self.pushed_back.is_none(),
            "lexer supports a single token of pushback"
        );
        self.pushed_back = Some(token);
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        if let Some(token) = self.pushed_back.take() {
            return Ok(token);
        }

        self.skip_blanks_and_comments()?;

        let span = Span::new(self.line, self.column);
        let Some((_, ch)) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, "EOF", span));
        };

        let token = match ch {
            '\n' => {
                self.line += 1;
                self.column = 1;
                Token::new(TokenKind::Eol, "\n", span)
            }
            c if c.is_ascii_digit() => {
                let text = self.read_number(c, span)?;
                Token::new(TokenKind::Number, text, span)
            }
            c if c.is_ascii_alphabetic() => {
                let word = self.read_word(c);
                let kind = if is_keyword(&word) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Name
                };
                Token::new(kind, word, span)
            }
            c => Token::new(TokenKind::Symbol, c.to_string(), span),
        };

        Ok(token)
    }

    /// Tokenize the entire input.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Skip spaces, tabs, carriage returns and comments, stopping at a newline.
    fn skip_blanks_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('/') => match self.peek_second() {
                    Some('/') => {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => self.skip_block_comment()?,
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    /// Skip a `/* ... */` comment. Newlines inside it are counted but not emitted.
    fn skip_block_comment(&mut self) -> Result<(), LexerError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        self.advance();

        let mut previous = '\0';
        while let Some((_, c)) = self.advance() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            }
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }

        Err(LexerError::new("Unterminated block comment", line, column))
    }

    /// Peek at the next character without consuming it.
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    /// Peek one character past the next.
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, ch)| ch)
    }

    /// Advance to the next character.
    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, ch)) = next {
            if ch != '\n' {
                self.column += 1;
            }
        }
        next
    }

    /// Read a numeric literal: digits with an optional fractional part.
    ///
    /// The token text is the canonical float rendering, so `10` reads as `10.0`.
    fn read_number(&mut self, first_digit: char, span: Span) -> Result<String, LexerError> {
        let mut text = String::from(first_digit);

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let value: f64 = text.parse().map_err(|_| {
            LexerError::new(
                format!("Malformed number '{}'", text),
                span.line,
                span.column,
            )
        })?;
        Ok(format!("{:?}", value))
    }

    /// Read a word: a letter followed by letters and digits.
    fn read_word(&mut self, first: char) -> String {
        let mut word = String::from(first);
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_texts(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_move_statement() {
        let tokens = kinds_and_texts("move 10\n");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "move".to_string()),
                (TokenKind::Number, "10.0".to_string()),
                (TokenKind::Eol, "\n".to_string()),
                (TokenKind::Eof, "EOF".to_string()),
            ]
        );
    }

    #[test]
    fn test_names_and_keywords() {
        let mut lexer = Lexer::new("Bug Sally abc123 darkGray");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Keyword);
        let name = lexer.next_token().unwrap();
        assert_eq!(name.kind, TokenKind::Name);
        assert_eq!(name.text, "Sally");
        let name = lexer.next_token().unwrap();
        assert_eq!(name.text, "abc123");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Keyword);
    }

    #[test]
    fn test_fractional_number() {
        let mut lexer = Lexer::new("25.3 2.0");
        assert_eq!(lexer.next_token().unwrap().text, "25.3");
        assert_eq!(lexer.next_token().unwrap().text, "2.0");
    }

    #[test]
    fn test_dot_after_name_is_symbol() {
        let tokens = kinds_and_texts("Sally.x");
        assert_eq!(tokens[0], (TokenKind::Name, "Sally".to_string()));
        assert_eq!(tokens[1], (TokenKind::Symbol, ".".to_string()));
        assert_eq!(tokens[2], (TokenKind::Name, "x".to_string()));
    }

    #[test]
    fn test_comparators_not_assembled() {
        let tokens = kinds_and_texts("a <= b != c");
        let symbols: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Symbol)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(symbols, vec!["<", "=", "!", "="]);
    }

    #[test]
    fn test_line_comment() {
        let mut lexer = Lexer::new("move n // pointless comment\nturn 1");
        assert_eq!(lexer.next_token().unwrap().text, "move");
        assert_eq!(lexer.next_token().unwrap().text, "n");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eol);
        let turn = lexer.next_token().unwrap();
        assert_eq!(turn.text, "turn");
        assert_eq!(turn.span.line, 2);
    }

    #[test]
    fn test_block_comment_spanning_lines() {
        let mut lexer = Lexer::new("/* one\ntwo */ move");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.text, "move");
        assert_eq!(token.span.line, 2);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let mut lexer = Lexer::new("move /* never closed");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("Unterminated"));
    }

    #[test]
    fn test_division_is_symbol() {
        let tokens = kinds_and_texts("100/3");
        assert_eq!(tokens[1], (TokenKind::Symbol, "/".to_string()));
    }

    #[test]
    fn test_push_back() {
        let mut lexer = Lexer::new("loop {");
        let first = lexer.next_token().unwrap();
        assert_eq!(first.text, "loop");
        lexer.push_back(first);
        assert_eq!(lexer.next_token().unwrap().text, "loop");
        assert_eq!(lexer.next_token().unwrap().text, "{");
    }

    #[test]
    fn test_crlf_is_single_eol() {
        let tokens = kinds_and_texts("a\r\nb");
        assert_eq!(tokens[1].0, TokenKind::Eol);
        assert_eq!(tokens[2], (TokenKind::Name, "b".to_string()));
    }

    #[test]
    fn test_span_tracking() {
        let mut lexer = Lexer::new("x = 1\n  y = 2");
        for _ in 0..4 {
            lexer.next_token().unwrap();
        }
        let y = lexer.next_token().unwrap();
        assert_eq!(y.span.line, 2);
        assert_eq!(y.span.column, 3);
    }
}
