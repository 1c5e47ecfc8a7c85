use std::fmt;
use std::str::Chars;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Identifier(String),
    Keyword(Keyword),

    NumericLiteral(f64),
    BigIntLiteral(String),
    StringLiteral(String),
    BooleanLiteral(bool),
    NullLiteral,

    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    Ellipsis,
    Semicolon,
    Comma,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Exponent,
    Increment,
    Decrement,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    Ampersand,
    Pipe,
    Caret,
    Bang,
    Tilde,
    LogicalAnd,
    LogicalOr,
    NullishCoalescing,
    Question,
    Colon,
    Arrow,
    Assign,
    /// Compound assignment; carries the binary operator token (`+=` holds `Plus`).
    CompoundAssign(Box<Token>),

    Eof,
}

/// Reserved words. Contextual words (`let`, `async`, `await`, `yield`,
/// `of`, `static`, `get`, `set`, `from`, `as`) lex as identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    New,
    Return,
    Super,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
}

impl Keyword {
    pub fn from_word(s: &str) -> Option<Keyword> {
        Some(match s {
            "break" => Keyword::Break,
            "case" => Keyword::Case,
            "catch" => Keyword::Catch,
            "class" => Keyword::Class,
            "const" => Keyword::Const,
            "continue" => Keyword::Continue,
            "debugger" => Keyword::Debugger,
            "default" => Keyword::Default,
            "delete" => Keyword::Delete,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "export" => Keyword::Export,
            "extends" => Keyword::Extends,
            "finally" => Keyword::Finally,
            "for" => Keyword::For,
            "function" => Keyword::Function,
            "if" => Keyword::If,
            "import" => Keyword::Import,
            "in" => Keyword::In,
            "instanceof" => Keyword::Instanceof,
            "new" => Keyword::New,
            "return" => Keyword::Return,
            "super" => Keyword::Super,
            "switch" => Keyword::Switch,
            "this" => Keyword::This,
            "throw" => Keyword::Throw,
            "try" => Keyword::Try,
            "typeof" => Keyword::Typeof,
            "var" => Keyword::Var,
            "void" => Keyword::Void,
            "while" => Keyword::While,
            "with" => Keyword::With,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Break => "break",
            Keyword::Case => "case",
            Keyword::Catch => "catch",
            Keyword::Class => "class",
            Keyword::Const => "const",
            Keyword::Continue => "continue",
            Keyword::Debugger => "debugger",
            Keyword::Default => "default",
            Keyword::Delete => "delete",
            Keyword::Do => "do",
            Keyword::Else => "else",
            Keyword::Export => "export",
            Keyword::Extends => "extends",
            Keyword::Finally => "finally",
            Keyword::For => "for",
            Keyword::Function => "function",
            Keyword::If => "if",
            Keyword::Import => "import",
            Keyword::In => "in",
            Keyword::Instanceof => "instanceof",
            Keyword::New => "new",
            Keyword::Return => "return",
            Keyword::Super => "super",
            Keyword::Switch => "switch",
            Keyword::This => "this",
            Keyword::Throw => "throw",
            Keyword::Try => "try",
            Keyword::Typeof => "typeof",
            Keyword::Var => "var",
            Keyword::Void => "void",
            Keyword::While => "while",
            Keyword::With => "with",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A token with its start position and whether a line break preceded it
/// (needed for automatic semicolon insertion).
#[derive(Clone, Debug)]
pub struct Spanned {
    pub token: Token,
    pub location: SourceLocation,
    pub newline_before: bool,
}

pub struct Lexer<'a> {
    chars: Chars<'a>,
    current: Option<char>,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            chars,
            current,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Lexes the whole input. The final token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let location = self.location();
            let token = self.next_token()?;
            let eof = token == Token::Eof;
            tokens.push(Spanned {
                token,
                location,
                newline_before,
            });
            if eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.current
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current?;
        self.offset += ch.len_utf8();
        self.column += 1;
        self.current = self.chars.next();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            location: self.location(),
        }
    }

    fn is_line_terminator(ch: char) -> bool {
        matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
    }

    fn is_identifier_start(ch: char) -> bool {
        ch == '_' || ch == '$' || unicode_ident::is_xid_start(ch)
    }

    fn is_identifier_continue(ch: char) -> bool {
        ch == '$' || ch == '\u{200C}' || ch == '\u{200D}' || unicode_ident::is_xid_continue(ch)
    }

    fn newline(&mut self, ch: char) {
        if ch == '\r' {
            self.eat('\n');
        }
        self.line += 1;
        self.column = 1;
    }

    /// Skips whitespace and comments, reporting whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, LexError> {
        let mut newline = false;
        while let Some(ch) = self.peek() {
            if Self::is_line_terminator(ch) {
                self.advance();
                self.newline(ch);
                newline = true;
            } else if ch.is_whitespace() || ch == '\u{FEFF}' {
                self.advance();
            } else if ch == '/' && self.peek_next() == Some('/') {
                while self.peek().is_some_and(|c| !Self::is_line_terminator(c)) {
                    self.advance();
                }
            } else if ch == '/' && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        None => return Err(self.error("Unterminated block comment")),
                        Some('*') if self.eat('/') => break,
                        Some(c) if Self::is_line_terminator(c) => {
                            self.newline(c);
                            newline = true;
                        }
                        Some(_) => {}
                    }
                }
            } else if ch == '#' && self.offset == 0 && self.peek_next() == Some('!') {
                while self.peek().is_some_and(|c| !Self::is_line_terminator(c)) {
                    self.advance();
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let Some(ch) = self.advance() else {
            return Ok(Token::Eof);
        };
        if ch == '\'' || ch == '"' {
            return self.read_string(ch).map(Token::StringLiteral);
        }
        if ch == '`' {
            return Err(self.error("Template literals are not supported"));
        }
        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit())) {
            return self.read_number(ch);
        }
        if Self::is_identifier_start(ch) {
            return Ok(self.read_word(ch));
        }
        self.read_punctuator(ch)
    }

    fn read_string(&mut self, quote: char) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("Unterminated string literal")),
                Some(ch) if ch == quote => return Ok(s),
                Some(ch) if Self::is_line_terminator(ch) => {
                    return Err(self.error("Unterminated string literal"));
                }
                Some('\\') => self.read_escape(&mut s)?,
                Some(ch) => s.push(ch),
            }
        }
    }

    fn read_escape(&mut self, out: &mut String) -> Result<(), LexError> {
        let ch = self
            .advance()
            .ok_or_else(|| self.error("Unterminated escape sequence"))?;
        match ch {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let value = self.read_hex_digits(2)?;
                out.push(char::from_u32(value).ok_or_else(|| self.error("Invalid hex escape"))?);
            }
            'u' => {
                let value = if self.eat('{') {
                    let mut value = 0u32;
                    while !self.eat('}') {
                        let c = self
                            .advance()
                            .ok_or_else(|| self.error("Unterminated Unicode escape"))?;
                        let digit = c
                            .to_digit(16)
                            .ok_or_else(|| self.error("Invalid Unicode escape"))?;
                        value = value * 16 + digit;
                        if value > 0x10FFFF {
                            return Err(self.error("Unicode code point out of range"));
                        }
                    }
                    value
                } else {
                    self.read_hex_digits(4)?
                };
                // Lone surrogates cannot be represented in a Rust string.
                out.push(char::from_u32(value).unwrap_or('\u{FFFD}'));
            }
            c if Self::is_line_terminator(c) => self.newline(c),
            c if c.is_ascii_digit() => {
                return Err(self.error("Octal escape sequences are not supported"));
            }
            c => out.push(c),
        }
        Ok(())
    }

    fn read_hex_digits(&mut self, count: usize) -> Result<u32, LexError> {
        let mut value = 0;
        for _ in 0..count {
            let digit = self
                .advance()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("Invalid hexadecimal escape"))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn read_number(&mut self, first: char) -> Result<Token, LexError> {
        let mut text = String::from(first);
        if first == '0' && self.peek().is_some_and(|c| "xXoObB".contains(c)) {
            let marker = self.advance().unwrap_or('x');
            text.push(marker);
            let radix = match marker {
                'x' | 'X' => 16,
                'o' | 'O' => 8,
                _ => 2,
            };
            while let Some(c) = self.peek() {
                if c == '_' {
                    self.advance();
                } else if c.is_digit(radix) {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if text.len() == 2 {
                return Err(self.error("Missing digits after radix prefix"));
            }
            if self.eat('n') {
                return Ok(Token::BigIntLiteral(text));
            }
            let value = u64::from_str_radix(&text[2..], radix)
                .map(|v| v as f64)
                .map_err(|_| self.error("Numeric literal out of range"))?;
            return self.finish_number(Token::NumericLiteral(value));
        }
        if first == '0' && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.error("Legacy octal literals are not supported"));
        }
        let mut is_integer = first != '.';
        self.read_digits(&mut text);
        if first != '.' && self.peek() == Some('.') {
            is_integer = false;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }
        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            is_integer = false;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("Missing exponent digits"));
            }
            self.read_digits(&mut text);
        }
        if is_integer && self.eat('n') {
            return Ok(Token::BigIntLiteral(text));
        }
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("Invalid numeric literal '{text}'")))?;
        self.finish_number(Token::NumericLiteral(value))
    }

    fn finish_number(&self, token: Token) -> Result<Token, LexError> {
        if self.peek().is_some_and(Self::is_identifier_start) {
            return Err(self.error("Identifier starts immediately after numeric literal"));
        }
        Ok(token)
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c != '_' {
                break;
            }
            self.advance();
        }
    }

    fn read_word(&mut self, first: char) -> Token {
        let mut word = String::from(first);
        while let Some(c) = self.peek() {
            if !Self::is_identifier_continue(c) {
                break;
            }
            word.push(c);
            self.advance();
        }
        match word.as_str() {
            "true" => Token::BooleanLiteral(true),
            "false" => Token::BooleanLiteral(false),
            "null" => Token::NullLiteral,
            _ => match Keyword::from_word(&word) {
                Some(kw) => Token::Keyword(kw),
                None => Token::Identifier(word),
            },
        }
    }

    /// `op` or `op=` depending on the next character.
    fn with_assign(&mut self, op: Token) -> Token {
        if self.eat('=') {
            Token::CompoundAssign(Box::new(op))
        } else {
            op
        }
    }

    fn read_punctuator(&mut self, ch: char) -> Result<Token, LexError> {
        let token = match ch {
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            '~' => Token::Tilde,
            ':' => Token::Colon,
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    Token::Ellipsis
                } else {
                    Token::Dot
                }
            }
            '?' => {
                if self.eat('?') {
                    self.with_assign(Token::NullishCoalescing)
                } else if self.peek() == Some('.') {
                    return Err(self.error("Optional chaining is not supported"));
                } else {
                    Token::Question
                }
            }
            '<' => {
                if self.eat('<') {
                    self.with_assign(Token::LeftShift)
                } else if self.eat('=') {
                    Token::LessThanEqual
                } else {
                    Token::LessThan
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        self.with_assign(Token::UnsignedRightShift)
                    } else {
                        self.with_assign(Token::RightShift)
                    }
                } else if self.eat('=') {
                    Token::GreaterThanEqual
                } else {
                    Token::GreaterThan
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { Token::StrictEqual } else { Token::Equal }
                } else if self.eat('>') {
                    Token::Arrow
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { Token::StrictNotEqual } else { Token::NotEqual }
                } else {
                    Token::Bang
                }
            }
            '+' => {
                if self.eat('+') {
                    Token::Increment
                } else {
                    self.with_assign(Token::Plus)
                }
            }
            '-' => {
                if self.eat('-') {
                    Token::Decrement
                } else {
                    self.with_assign(Token::Minus)
                }
            }
            '*' => {
                if self.eat('*') {
                    self.with_assign(Token::Exponent)
                } else {
                    self.with_assign(Token::Star)
                }
            }
            '/' => self.with_assign(Token::Slash),
            '%' => self.with_assign(Token::Percent),
            '&' => {
                if self.eat('&') {
                    self.with_assign(Token::LogicalAnd)
                } else {
                    self.with_assign(Token::Ampersand)
                }
            }
            '|' => {
                if self.eat('|') {
                    self.with_assign(Token::LogicalOr)
                } else {
                    self.with_assign(Token::Pipe)
                }
            }
            '^' => self.with_assign(Token::Caret),
            other => return Err(self.error(format!("Unexpected character '{other}'"))),
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            tokens("let x = 1.5;"),
            vec![
                Token::Identifier("let".into()),
                Token::Identifier("x".into()),
                Token::Assign,
                Token::NumericLiteral(1.5),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn compound_assignment_carries_operator() {
        assert_eq!(
            tokens("a >>>= 2")[1],
            Token::CompoundAssign(Box::new(Token::UnsignedRightShift))
        );
        assert_eq!(tokens("a ??= b")[1], Token::CompoundAssign(Box::new(Token::NullishCoalescing)));
        assert_eq!(tokens("a ** b")[1], Token::Exponent);
    }

    #[test]
    fn records_newlines_and_locations() {
        let spanned = Lexer::new("a\n  // note\n  b").tokenize().unwrap();
        assert!(!spanned[0].newline_before);
        assert!(spanned[1].newline_before);
        assert_eq!(spanned[1].location.line, 3);
        assert_eq!(spanned[1].location.column, 3);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#"'a\n\x41B\u{43}'"#)[0],
            Token::StringLiteral("a\nABC".into())
        );
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(tokens("0xff")[0], Token::NumericLiteral(255.0));
        assert_eq!(tokens("1_000")[0], Token::NumericLiteral(1000.0));
        assert_eq!(tokens("10n")[0], Token::BigIntLiteral("10".into()));
        assert_eq!(tokens(".5e1")[0], Token::NumericLiteral(5.0));
        assert!(Lexer::new("3in").tokenize().is_err());
    }

    #[test]
    fn keywords_and_contextual_words() {
        assert_eq!(tokens("while")[0], Token::Keyword(Keyword::While));
        assert_eq!(tokens("async")[0], Token::Identifier("async".into()));
        assert_eq!(tokens("null")[0], Token::NullLiteral);
    }
}
