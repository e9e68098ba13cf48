//! Recursive descent parser for the Bugs language.
//!
//! There is one `is_<rule>` recognizer per grammar rule. Each returns
//!
//! - `Ok(Some(tree))` when the rule matched and all of its tokens were consumed,
//! - `Ok(None)` when the rule did not match; the input is left exactly where it was,
//! - `Err(ParseError)` when the rule had already committed on an unambiguous
//!   keyword or symbol and the rest of it did not follow. There is no recovery;
//!   the error aborts the whole parse.
//!
//! Recognizers only ever look one token ahead, which is all the pushback the
//! lexer supports.
//!
//! # Grammar
//!
//! ```text
//! program      := [ allbugs ] bugDef { bugDef } EOF
//! allbugs      := "Allbugs" "{" EOL { varDecl } { funcDef } "}" EOL
//! bugDef       := "Bug" NAME "{" EOL { varDecl } [ initially ] command { command } { funcDef } "}" EOL
//! initially    := "initially" block
//! funcDef      := "define" NAME [ "using" NAME { "," NAME } ] block
//! block        := "{" EOL { command } "}" EOL
//! command      := action | statement
//! action       := move | moveto | turn | turnto | line
//! statement    := assign | loop | exitIf | switch | return | doStmt | colorStmt
//! expr         := arith { comparator arith }
//! arith        := term { ("+"|"-") term }
//! term         := factor { ("*"|"/") factor }
//! factor       := [ "+"|"-" ] unsignedFactor
//! unsignedFactor := NAME "." NAME | NAME paramList | NAME | NUMBER | "(" expr ")"
//! paramList    := "(" [ expr { "," expr } ] ")"
//! varDecl      := "var" NAME { "," NAME } EOL
//! ```

use crate::ast::{Node, Program, Tree};
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Result of a single recognizer.
pub type Parsed = Result<Option<Tree>, ParseError>;

/// Parser for the Bugs language.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
        }
    }

    /// Parse the entire program.
    ///
    /// A source text with no bug definition at all is an error here, since a
    /// program needs at least one bug.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        match self.is_program()? {
            Some(root) => Program::from_root(root)
                .map_err(|e| ParseError::new(e.to_string(), Default::default())),
            None => Err(self.error("Expected a Bug definition")),
        }
    }

    /// Consume and return the next raw token.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        Ok(self.lexer.next_token()?)
    }

    // =========================================================================
    // Program structure
    // =========================================================================

    /// `program := [ allbugs ] bugDef { bugDef } EOF`
    pub fn is_program(&mut self) -> Parsed {
        // Comments before the program leave blank lines behind.
        self.eol()?;

        let allbugs = match self.is_allbugs_code()? {
            Some(allbugs) => {
                if self.peek_is(TokenKind::Keyword, "Bug")? {
                    allbugs
                } else {
                    return Err(self.error("Expected a Bug definition after Allbugs code"));
                }
            }
            None => Node::of("Allbugs", vec![]),
        };

        let mut bugs = Vec::new();
        while let Some(bug) = self.is_bug_definition()? {
            bugs.push(bug);
        }
        if bugs.is_empty() {
            return Ok(None);
        }

        if self.take_kind(TokenKind::Eof)?.is_none() {
            return Err(self.error("Expected end of input after Bug definitions"));
        }

        Ok(Some(Node::of(
            "program",
            vec![allbugs, Node::of("list", bugs)],
        )))
    }

    /// `allbugs := "Allbugs" "{" EOL { varDecl } { funcDef } "}" EOL`
    pub fn is_allbugs_code(&mut self) -> Parsed {
        let Some(allbugs) = self.keyword("Allbugs")? else {
            return Ok(None);
        };
        self.expect_symbol("{", "Error in Allbugs code after \"Allbugs\"")?;
        self.expect_eol("Error in Allbugs code after \"{\"")?;

        let vars = self.var_declarations()?;
        let functions = self.function_definitions()?;

        self.expect_symbol("}", "Error in Allbugs code: expected \"}\"")?;
        self.expect_eol_or_eof("Error in Allbugs code after \"}\"")?;

        Ok(Some(Node::with_children(allbugs, vec![vars, functions])))
    }

    /// `bugDef := "Bug" NAME "{" EOL { varDecl } [ initially ] command { command } { funcDef } "}" EOL`
    pub fn is_bug_definition(&mut self) -> Parsed {
        let Some(bug) = self.keyword("Bug")? else {
            return Ok(None);
        };
        let Some(name) = self.name()? else {
            return Err(self.error("Error in Bug definition after \"Bug\""));
        };
        self.expect_symbol("{", "Error in Bug definition after name")?;
        self.expect_eol("Error in Bug definition after \"{\"")?;

        let vars = self.var_declarations()?;

        let initially = match self.is_initialization_block()? {
            Some(initially) => initially,
            None => Node::of("initially", vec![]),
        };

        let mut commands = Vec::new();
        match self.is_command()? {
            Some(command) => commands.push(command),
            None => return Err(self.error("Error in Bug definition: expected a command")),
        }
        while let Some(command) = self.is_command()? {
            commands.push(command);
        }

        let functions = self.function_definitions()?;

        self.expect_symbol("}", "Error in Bug definition after function definitions")?;
        self.expect_eol_or_eof("Error in Bug definition after \"}\"")?;

        Ok(Some(Node::with_children(
            bug,
            vec![
                Node::leaf(name),
                vars,
                initially,
                Node::of("block", commands),
                functions,
            ],
        )))
    }

    /// `initially := "initially" block`
    pub fn is_initialization_block(&mut self) -> Parsed {
        let Some(initially) = self.keyword("initially")? else {
            return Ok(None);
        };
        match self.is_block()? {
            Some(block) => Ok(Some(Node::with_children(initially, vec![block]))),
            None => Err(self.error("Error in initialization block after \"initially\"")),
        }
    }

    /// `funcDef := "define" NAME [ "using" NAME { "," NAME } ] block`
    pub fn is_function_definition(&mut self) -> Parsed {
        if self.keyword("define")?.is_none() {
            return Ok(None);
        }
        let Some(name) = self.name()? else {
            return Err(self.error("Error in function definition: nothing following \"define\""));
        };

        let mut params = Vec::new();
        if self.keyword("using")?.is_some() {
            match self.name()? {
                Some(param) => params.push(Node::leaf(param)),
                None => {
                    return Err(
                        self.error("Error in function definition: nothing following \"using\"")
                    )
                }
            }
            while self.symbol(",")?.is_some() {
                match self.name()? {
                    Some(param) => params.push(Node::leaf(param)),
                    None => {
                        return Err(
                            self.error("Error in function definition: nothing following \",\"")
                        )
                    }
                }
            }
        }

        let Some(block) = self.is_block()? else {
            return Err(self.error("Error in function definition: expected a block"));
        };

        Ok(Some(Node::of(
            "function",
            vec![Node::leaf(name), Node::of("var", params), block],
        )))
    }

    /// `varDecl := "var" NAME { "," NAME } EOL`
    pub fn is_var_declaration(&mut self) -> Parsed {
        let Some(var) = self.keyword("var")? else {
            return Ok(None);
        };
        let mut names = Vec::new();
        match self.name()? {
            Some(name) => names.push(Node::leaf(name)),
            None => return Err(self.error("Error in var declaration: nothing follows \"var\"")),
        }
        while self.symbol(",")?.is_some() {
            match self.name()? {
                Some(name) => names.push(Node::leaf(name)),
                None => return Err(self.error("Error in var declaration: nothing follows \",\"")),
            }
        }
        self.expect_eol("Error in var declaration: missing EOL")?;
        Ok(Some(Node::with_children(var, names)))
    }

    /// `block := "{" EOL { command } "}" EOL`
    pub fn is_block(&mut self) -> Parsed {
        if self.symbol("{")?.is_none() {
            return Ok(None);
        }
        self.expect_eol("Error in block after \"{\"")?;

        let mut commands = Vec::new();
        while let Some(command) = self.is_command()? {
            commands.push(command);
        }

        self.expect_symbol("}", "Error in block: expected a command or \"}\"")?;
        self.expect_eol("Error in block after \"}\"")?;
        Ok(Some(Node::of("block", commands)))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// `command := action | statement`
    pub fn is_command(&mut self) -> Parsed {
        if let Some(action) = self.is_action()? {
            return Ok(Some(action));
        }
        self.is_statement()
    }

    /// `action := move | moveto | turn | turnto | line`
    pub fn is_action(&mut self) -> Parsed {
        if let Some(tree) = self.is_move_action()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_move_to_action()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_turn_action()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_turn_to_action()? {
            return Ok(Some(tree));
        }
        self.is_line_action()
    }

    /// `statement := assign | loop | exitIf | switch | return | doStmt | colorStmt`
    pub fn is_statement(&mut self) -> Parsed {
        if let Some(tree) = self.is_assignment_statement()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_loop_statement()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_exit_if_statement()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_switch_statement()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_return_statement()? {
            return Ok(Some(tree));
        }
        if let Some(tree) = self.is_do_statement()? {
            return Ok(Some(tree));
        }
        self.is_color_statement()
    }

    /// `move := "move" expr EOL`
    pub fn is_move_action(&mut self) -> Parsed {
        self.keyword_with_expressions("move", 1)
    }

    /// `moveto := "moveto" expr "," expr EOL`
    pub fn is_move_to_action(&mut self) -> Parsed {
        self.keyword_with_expressions("moveto", 2)
    }

    /// `turn := "turn" expr EOL`
    pub fn is_turn_action(&mut self) -> Parsed {
        self.keyword_with_expressions("turn", 1)
    }

    /// `turnto := "turnto" expr EOL`
    pub fn is_turn_to_action(&mut self) -> Parsed {
        self.keyword_with_expressions("turnto", 1)
    }

    /// `line := "line" expr "," expr "," expr "," expr EOL`
    pub fn is_line_action(&mut self) -> Parsed {
        self.keyword_with_expressions("line", 4)
    }

    /// `return := "return" expr EOL`
    pub fn is_return_statement(&mut self) -> Parsed {
        self.keyword_with_expressions("return", 1)
    }

    /// `assign := NAME "=" expr EOL`
    pub fn is_assignment_statement(&mut self) -> Parsed {
        let Some(name) = self.name()? else {
            return Ok(None);
        };
        self.expect_symbol("=", "Error in assignment statement after variable")?;
        let Some(value) = self.is_expression()? else {
            return Err(self.error("Error in assignment statement after \"=\""));
        };
        self.expect_eol("Error in assignment statement after expression")?;
        Ok(Some(Node::of("assign", vec![Node::leaf(name), value])))
    }

    /// `loop := "loop" block`
    pub fn is_loop_statement(&mut self) -> Parsed {
        let Some(keyword) = self.keyword("loop")? else {
            return Ok(None);
        };
        match self.is_block()? {
            Some(block) => Ok(Some(Node::with_children(keyword, vec![block]))),
            None => Err(self.error("Error in loop statement after \"loop\"")),
        }
    }

    /// `exitIf := "exit" "if" expr EOL`
    pub fn is_exit_if_statement(&mut self) -> Parsed {
        let Some(exit) = self.keyword("exit")? else {
            return Ok(None);
        };
        if self.keyword("if")?.is_none() {
            return Err(self.error("Error in exit if statement after \"exit\""));
        }
        let Some(condition) = self.is_expression()? else {
            return Err(self.error("Error in exit if statement after \"if\""));
        };
        self.expect_eol("Error in exit if statement after expression")?;
        Ok(Some(Node::with_children(exit, vec![condition])))
    }

    /// `switch := "switch" "{" EOL { "case" expr EOL { command } } "}" EOL`
    pub fn is_switch_statement(&mut self) -> Parsed {
        let Some(switch) = self.keyword("switch")? else {
            return Ok(None);
        };
        self.expect_symbol("{", "Error in switch statement: nothing after \"switch\"")?;
        self.expect_eol("Error in switch statement: nothing after \"{\"")?;

        let mut cases = Vec::new();
        while let Some(case) = self.keyword("case")? {
            let Some(guard) = self.is_expression()? else {
                return Err(self.error("Error in switch statement: nothing after \"case\""));
            };
            self.expect_eol("Error in switch statement: missing EOL after case")?;

            let mut commands = Vec::new();
            while let Some(command) = self.is_command()? {
                commands.push(command);
            }
            cases.push(Node::with_children(
                case,
                vec![guard, Node::of("block", commands)],
            ));
        }

        self.expect_symbol("}", "Error in switch statement: expected \"case\" or \"}\"")?;
        self.expect_eol("Error in switch statement: nothing after \"}\"")?;
        Ok(Some(Node::with_children(switch, cases)))
    }

    /// `doStmt := "do" NAME [ paramList ] EOL`
    ///
    /// Produces the same `call(NAME, var(args...))` shape as a call expression.
    pub fn is_do_statement(&mut self) -> Parsed {
        if self.keyword("do")?.is_none() {
            return Ok(None);
        }
        let Some(name) = self.name()? else {
            return Err(self.error("Error in do statement after \"do\""));
        };
        let args = match self.is_parameter_list()? {
            Some(args) => args,
            None => Node::of("var", vec![]),
        };
        self.expect_eol("Error in do statement after function name")?;
        Ok(Some(Node::of("call", vec![Node::leaf(name), args])))
    }

    /// `colorStmt := "color" KEYWORD EOL`
    ///
    /// Any keyword is accepted here; whether it names a color is decided at run time.
    pub fn is_color_statement(&mut self) -> Parsed {
        let Some(color) = self.keyword("color")? else {
            return Ok(None);
        };
        let Some(value) = self.take_kind(TokenKind::Keyword)? else {
            return Err(self.error("Error in color statement after \"color\""));
        };
        self.expect_eol("Error in color statement after color name")?;
        Ok(Some(Node::with_children(color, vec![Node::leaf(value)])))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// `expr := arith { comparator arith }`
    ///
    /// Comparisons nest left to right: `a < b = c` is `=(<(a, b), c)`.
    pub fn is_expression(&mut self) -> Parsed {
        let Some(mut left) = self.is_arithmetic_expression()? else {
            return Ok(None);
        };
        while let Some(op) = self.comparator()? {
            let Some(right) = self.is_arithmetic_expression()? else {
                return Err(self.error("Illegal expression after comparator"));
            };
            left = Node::with_children(op, vec![left, right]);
        }
        Ok(Some(left))
    }

    /// `arith := term { ("+"|"-") term }`
    pub fn is_arithmetic_expression(&mut self) -> Parsed {
        let Some(mut left) = self.is_term()? else {
            return Ok(None);
        };
        while let Some(op) = self.add_operator()? {
            let Some(right) = self.is_term()? else {
                return Err(self.error("Error in expression after '+' or '-'"));
            };
            left = Node::with_children(op, vec![left, right]);
        }
        Ok(Some(left))
    }

    /// `term := factor { ("*"|"/") factor }`
    pub fn is_term(&mut self) -> Parsed {
        let Some(mut left) = self.is_factor()? else {
            return Ok(None);
        };
        while let Some(op) = self.multiply_operator()? {
            let Some(right) = self.is_factor()? else {
                return Err(self.error("No term after '*' or '/'"));
            };
            left = Node::with_children(op, vec![left, right]);
        }
        Ok(Some(left))
    }

    /// `factor := [ "+"|"-" ] unsignedFactor`
    ///
    /// A sign produces a unary node with a single child.
    pub fn is_factor(&mut self) -> Parsed {
        if let Some(sign) = self.add_operator()? {
            return match self.is_unsigned_factor()? {
                Some(operand) => Ok(Some(Node::with_children(sign, vec![operand]))),
                None => Err(self.error("No factor following unary plus or minus")),
            };
        }
        self.is_unsigned_factor()
    }

    /// `unsignedFactor := NAME "." NAME | NAME paramList | NAME | NUMBER | "(" expr ")"`
    pub fn is_unsigned_factor(&mut self) -> Parsed {
        if let Some(name) = self.name()? {
            if let Some(dot) = self.symbol(".")? {
                let Some(field) = self.name()? else {
                    return Err(self.error("Incorrect use of dot notation"));
                };
                return Ok(Some(Node::with_children(
                    dot,
                    vec![Node::leaf(name), Node::leaf(field)],
                )));
            }
            if let Some(args) = self.is_parameter_list()? {
                return Ok(Some(Node::of("call", vec![Node::leaf(name), args])));
            }
            return Ok(Some(Node::leaf(name)));
        }

        if let Some(number) = self.take_kind(TokenKind::Number)? {
            return Ok(Some(Node::leaf(number)));
        }

        if self.symbol("(")?.is_some() {
            let Some(inner) = self.is_expression()? else {
                return Err(self.error("Error in parenthesized expression"));
            };
            self.expect_symbol(")", "Unclosed parenthetical expression")?;
            return Ok(Some(inner));
        }

        Ok(None)
    }

    /// `NAME paramList` as a standalone rule.
    pub fn is_function_call(&mut self) -> Parsed {
        let Some(name) = self.name()? else {
            return Ok(None);
        };
        match self.is_parameter_list()? {
            Some(args) => Ok(Some(Node::of("call", vec![Node::leaf(name), args]))),
            None => Err(self.error("Error in function call after name")),
        }
    }

    /// `paramList := "(" [ expr { "," expr } ] ")"`
    ///
    /// Produces a `var` node whose children are the argument expressions.
    pub fn is_parameter_list(&mut self) -> Parsed {
        if self.symbol("(")?.is_none() {
            return Ok(None);
        }
        let mut args = Vec::new();
        if let Some(first) = self.is_expression()? {
            args.push(first);
            while self.symbol(",")?.is_some() {
                match self.is_expression()? {
                    Some(arg) => args.push(arg),
                    None => return Err(self.error("No expression after ','")),
                }
            }
        }
        self.expect_symbol(")", "Parameter list doesn't end with ')'")?;
        Ok(Some(Node::of("var", args)))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// `keyword expr { "," expr } EOL` with exactly `count` expressions.
    fn keyword_with_expressions(&mut self, keyword: &str, count: usize) -> Parsed {
        let Some(token) = self.keyword(keyword)? else {
            return Ok(None);
        };
        let mut operands = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 && self.symbol(",")?.is_none() {
                return Err(self.error(format!(
                    "Syntax error in {} after expression: expected ','",
                    keyword
                )));
            }
            match self.is_expression()? {
                Some(operand) => operands.push(operand),
                None => {
                    return Err(self.error(format!(
                        "Syntax error in {}: expected an expression",
                        keyword
                    )))
                }
            }
        }
        self.expect_eol(&format!("Syntax error in {}: missing EOL", keyword))?;
        Ok(Some(Node::with_children(token, operands)))
    }

    fn var_declarations(&mut self) -> Result<Tree, ParseError> {
        let mut vars = Vec::new();
        while let Some(var) = self.is_var_declaration()? {
            vars.push(var);
        }
        Ok(Node::of("list", vars))
    }

    fn function_definitions(&mut self) -> Result<Tree, ParseError> {
        let mut functions = Vec::new();
        while let Some(function) = self.is_function_definition()? {
            functions.push(function);
        }
        Ok(Node::of("list", functions))
    }

    /// `comparator := "<" | "<=" | "=" | "!=" | ">" | ">="`
    ///
    /// The lexer emits single characters; two-character comparators are
    /// assembled here.
    fn comparator(&mut self) -> Result<Option<Token>, ParseError> {
        if let Some(less) = self.symbol("<")? {
            return Ok(Some(self.with_trailing_equals(less)?));
        }
        if let Some(greater) = self.symbol(">")? {
            return Ok(Some(self.with_trailing_equals(greater)?));
        }
        if let Some(equals) = self.symbol("=")? {
            return Ok(Some(equals));
        }
        if let Some(bang) = self.symbol("!")? {
            if self.symbol("=")?.is_none() {
                return Err(self.error("Expected '=' after '!'"));
            }
            return Ok(Some(Token::new(TokenKind::Symbol, "!=", bang.span)));
        }
        Ok(None)
    }

    fn with_trailing_equals(&mut self, first: Token) -> Result<Token, ParseError> {
        if self.symbol("=")?.is_some() {
            let text = format!("{}=", first.text);
            return Ok(Token::new(TokenKind::Symbol, text, first.span));
        }
        Ok(first)
    }

    fn add_operator(&mut self) -> Result<Option<Token>, ParseError> {
        if let Some(plus) = self.symbol("+")? {
            return Ok(Some(plus));
        }
        self.symbol("-")
    }

    fn multiply_operator(&mut self) -> Result<Option<Token>, ParseError> {
        if let Some(times) = self.symbol("*")? {
            return Ok(Some(times));
        }
        self.symbol("/")
    }

    /// `EOL { EOL }`
    fn eol(&mut self) -> Result<bool, ParseError> {
        if self.take_kind(TokenKind::Eol)?.is_none() {
            return Ok(false);
        }
        while self.take_kind(TokenKind::Eol)?.is_some() {}
        Ok(true)
    }

    fn expect_eol(&mut self, message: &str) -> Result<(), ParseError> {
        if self.eol()? {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    /// Closing braces of top-level sections may also be the last thing in the file.
    fn expect_eol_or_eof(&mut self, message: &str) -> Result<(), ParseError> {
        if self.eol()? || self.peek_is(TokenKind::Eof, "EOF")? {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_symbol(&mut self, symbol: &str, message: &str) -> Result<Token, ParseError> {
        match self.symbol(symbol)? {
            Some(token) => Ok(token),
            None => Err(self.error(message)),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<Option<Token>, ParseError> {
        self.take(TokenKind::Keyword, Some(keyword))
    }

    fn symbol(&mut self, symbol: &str) -> Result<Option<Token>, ParseError> {
        self.take(TokenKind::Symbol, Some(symbol))
    }

    fn name(&mut self) -> Result<Option<Token>, ParseError> {
        self.take(TokenKind::Name, None)
    }

    fn take_kind(&mut self, kind: TokenKind) -> Result<Option<Token>, ParseError> {
        self.take(kind, None)
    }

    /// Consume the next token if it has the given kind (and text, if given);
    /// otherwise push it back and return `None`.
    fn take(&mut self, kind: TokenKind, text: Option<&str>) -> Result<Option<Token>, ParseError> {
        let token = self.lexer.next_token()?;
        let matches = token.kind == kind && text.map_or(true, |t| token.text == t);
        if matches {
            Ok(Some(token))
        } else {
            self.lexer.push_back(token);
            Ok(None)
        }
    }

    fn peek_is(&mut self, kind: TokenKind, text: &str) -> Result<bool, ParseError> {
        let token = self.lexer.next_token()?;
        let matches = token.is(kind, text);
        self.lexer.push_back(token);
        Ok(matches)
    }

    /// Build a syntax error located at the next unread token.
    fn error(&mut self, message: impl Into<String>) -> ParseError {
        match self.lexer.next_token() {
            Ok(token) => {
                let found = match token.kind {
                    TokenKind::Eol | TokenKind::Eof => token.kind.description().to_string(),
                    _ => format!("'{}'", token.text),
                };
                ParseError::new(message, token.span).with_found(found)
            }
            Err(e) => e.into(),
        }
    }
}
