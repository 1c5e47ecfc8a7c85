use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ast::*;
use crate::lexer::{Keyword, LexError, Lexer, SourceLocation, Spanned, Token};

mod expressions;
mod functions;
mod modules;
mod statements;

#[derive(Clone, Debug)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            location: e.location,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Per-function parsing state, saved and restored around nested functions.
#[derive(Clone, Default)]
struct FunctionState {
    in_function: bool,
    in_generator: bool,
    in_async: bool,
    in_iteration: u32,
    in_switch: u32,
    labels: Vec<(Rc<str>, bool)>,
    allow_super_call: bool,
    allow_super_property: bool,
    allow_new_target: bool,
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    strict: bool,
    module: bool,
    state: FunctionState,
    /// Locations of `{a = 1}` shorthands not yet reinterpreted as patterns.
    cover_initializers: Vec<SourceLocation>,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            strict: false,
            module: false,
            state: FunctionState::default(),
            cover_initializers: Vec::new(),
        })
    }

    pub fn parse_script(source: &str, strict: bool) -> ParseResult<Program> {
        let mut parser = Parser::new(source)?;
        parser.strict = strict;
        let start = parser.pos;
        parser.parse_directives()?;
        parser.pos = start;
        let body = parser.parse_statement_list_until_eof()?;
        parser.check_body_declarations(&body, false)?;
        Ok(Program {
            id: next_node_id(),
            source_type: SourceType::Script,
            strict: parser.strict,
            body: body.into(),
            scope: OnceCell::new(),
        })
    }

    pub fn parse_module(source: &str) -> ParseResult<Program> {
        let mut parser = Parser::new(source)?;
        parser.strict = true;
        parser.module = true;
        parser.state.in_async = true;
        let body = parser.parse_module_items()?;
        parser.check_body_declarations(&body, true)?;
        parser.check_module_exports(&body)?;
        Ok(Program {
            id: next_node_id(),
            source_type: SourceType::Module,
            strict: true,
            body: body.into(),
            scope: OnceCell::new(),
        })
    }

    pub fn parse_expression_source(source: &str, strict: bool) -> ParseResult<Rc<Expression>> {
        let mut parser = Parser::new(source)?;
        parser.strict = strict;
        let expr = parser.parse_expression()?;
        if parser.peek() != &Token::Eof {
            return Err(parser.error(format!("Unexpected token {:?}", parser.peek())));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn newline_before(&self) -> bool {
        self.tokens[self.pos].newline_before
    }

    fn newline_before_at(&self, n: usize) -> bool {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].newline_before
    }

    fn location(&self) -> SourceLocation {
        self.tokens[self.pos].location
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.peek() == &Token::Keyword(kw)
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Identifier(w) if w == word)
    }

    fn eat(&mut self, expected: &Token) -> ParseResult<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("{expected:?}")))
        }
    }

    fn eat_if(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> ParseResult<()> {
        self.eat(&Token::Keyword(kw))
    }

    fn eat_word(&mut self, word: &str) -> ParseResult<()> {
        if self.at_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{word}'")))
        }
    }

    fn eat_semicolon(&mut self) -> ParseResult<()> {
        if self.eat_if(&Token::Semicolon) {
            return Ok(());
        }
        if self.newline_before() || self.at(&Token::RightBrace) || self.at(&Token::Eof) {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.location(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Token::Eof => self.error(format!("Unexpected end of input, expected {expected}")),
            tok => self.error(format!("Unexpected token {tok:?}, expected {expected}")),
        }
    }

    fn is_reserved_word(&self, name: &str) -> bool {
        match name {
            "enum" => true,
            "implements" | "interface" | "package" | "private" | "protected" | "public"
            | "static" | "let" => self.strict,
            "yield" => self.strict || self.state.in_generator,
            "await" => self.module || self.state.in_async,
            _ => false,
        }
    }

    /// An identifier usable as a binding or reference in the current context.
    fn binding_identifier(&mut self) -> ParseResult<Rc<str>> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                if self.is_reserved_word(&name) {
                    return Err(self.error(format!("Unexpected reserved word '{name}'")));
                }
                if self.strict && (name == "eval" || name == "arguments") {
                    return Err(self.error(format!("Cannot bind '{name}' in strict mode")));
                }
                self.advance();
                Ok(Rc::from(name))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Any identifier name including reserved words (property names).
    fn identifier_name(&mut self) -> ParseResult<Rc<str>> {
        match self.advance() {
            Token::Identifier(name) => Ok(Rc::from(name)),
            Token::Keyword(kw) => Ok(Rc::from(kw.as_str())),
            Token::BooleanLiteral(b) => Ok(Rc::from(if b { "true" } else { "false" })),
            Token::NullLiteral => Ok(Rc::from("null")),
            tok => Err(self.error(format!("Unexpected token {tok:?}, expected property name"))),
        }
    }

    fn parse_directives(&mut self) -> ParseResult<()> {
        while let Token::StringLiteral(s) = self.peek().clone() {
            if !matches!(self.peek_at(1), Token::Semicolon | Token::RightBrace | Token::Eof)
                && !self.newline_before_at(1)
            {
                break;
            }
            if s == "use strict" {
                self.strict = true;
            }
            self.advance();
            self.eat_if(&Token::Semicolon);
        }
        Ok(())
    }

    fn enter_function(&mut self, state: FunctionState) -> FunctionState {
        std::mem::replace(&mut self.state, state)
    }

    fn leave_function(&mut self, saved: FunctionState) {
        self.state = saved;
    }

    /// Early errors for a body's own declarations: a lexical name may not be
    /// declared twice, nor collide with a var-scoped name of the same body.
    fn check_body_declarations(&self, body: &[Rc<Statement>], functions_are_lexical: bool) -> ParseResult<()> {
        let lexical = lexical_declarations(body, functions_are_lexical);
        let mut seen = FxHashSet::default();
        for decl in &lexical {
            let name = decl.name();
            if !seen.insert(name.clone()) {
                return Err(self.error(format!("Identifier '{name}' has already been declared")));
            }
        }
        let mut var_names = var_declared_names(body);
        if !functions_are_lexical {
            var_names.extend(top_level_functions(body).into_iter().filter_map(|f| f.name.clone()));
        }
        for name in var_names {
            if seen.contains(&name) {
                return Err(self.error(format!("Identifier '{name}' has already been declared")));
            }
        }
        Ok(())
    }

    /// Same check for a block, where function declarations are lexical and var
    /// declarations hoisted out of the block may not collide with them.
    fn check_block_declarations(&self, body: &[Rc<Statement>]) -> ParseResult<()> {
        let lexical = lexical_declarations(body, true);
        let mut seen = FxHashSet::default();
        for decl in &lexical {
            let name = decl.name();
            let duplicate_sloppy_functions = !self.strict
                && matches!(decl, LexicalDeclaration::Function(_))
                && lexical.iter().filter(|d| d.name() == name).all(|d| matches!(d, LexicalDeclaration::Function(_)));
            if !seen.insert(name.clone()) && !duplicate_sloppy_functions {
                return Err(self.error(format!("Identifier '{name}' has already been declared")));
            }
        }
        for name in var_declared_names(body) {
            if seen.contains(&name) {
                return Err(self.error(format!("Identifier '{name}' has already been declared")));
            }
        }
        Ok(())
    }

    fn check_parameters(&self, params: &[PatternElement], rest: Option<&Rc<Pattern>>, simple_ok: bool) -> ParseResult<()> {
        let mut names = Vec::new();
        for p in params {
            bound_names(&p.target, &mut names);
        }
        if let Some(rest) = rest {
            bound_names(rest, &mut names);
        }
        let simple = rest.is_none()
            && params
                .iter()
                .all(|p| p.default.is_none() && matches!(*p.target, Pattern::Identifier(_)));
        if !(simple && simple_ok && !self.strict) {
            let mut seen = FxHashSet::default();
            for name in &names {
                if !seen.insert(name.clone()) {
                    return Err(self.error(format!("Duplicate parameter name '{name}'")));
                }
            }
        }
        Ok(())
    }

    fn make_statement(&self, location: SourceLocation, kind: StatementKind) -> Rc<Statement> {
        Rc::new(Statement {
            id: next_node_id(),
            location,
            kind,
            scope: OnceCell::new(),
        })
    }

    fn make_expression(&self, location: SourceLocation, kind: ExpressionKind) -> Rc<Expression> {
        Rc::new(Expression {
            id: next_node_id(),
            location,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(src: &str) -> Program {
        Parser::parse_script(src, false).unwrap()
    }

    fn script_err(src: &str) -> String {
        Parser::parse_script(src, false).unwrap_err().message
    }

    #[test]
    fn parses_statement_kinds() {
        let program = script("var a = 1; let b; if (a) { b = 2 } else b = 3; for (;;) break;");
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[0].kind, StatementKind::Variable(_)));
        assert!(matches!(program.body[2].kind, StatementKind::If { .. }));
        assert!(matches!(program.body[3].kind, StatementKind::For(_)));
    }

    #[test]
    fn asi_between_lines() {
        let program = script("let a = 1\nlet b = 2\na + b");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn use_strict_directive() {
        assert!(script("'use strict'; var x;").strict);
        assert!(!script("var x; 'use strict';").strict);
        assert!(Parser::parse_script("'use strict'; var eval = 1;", false).is_err());
    }

    #[test]
    fn rejects_duplicate_lexical_declarations() {
        assert!(script_err("let a; let a;").contains("already been declared"));
        assert!(script_err("let a; var a;").contains("already been declared"));
        assert!(script_err("{ const a = 1; var a; }").contains("already been declared"));
        // var in a nested function does not collide
        script("let a; function f() { var a; }");
        // sibling blocks are separate scopes
        script("{ let a; } { let a; }");
    }

    #[test]
    fn rejects_misplaced_control_flow() {
        assert!(Parser::parse_script("return 1", false).is_err());
        assert!(Parser::parse_script("break;", false).is_err());
        assert!(Parser::parse_script("a: while (1) { continue b; }", false).is_err());
        assert!(Parser::parse_script("function f() { await 1 }", false).is_err());
        script("a: while (1) { continue a; }");
        script("async function f() { await 1 }");
    }

    #[test]
    fn node_ids_are_unique() {
        let program = script("a; b;");
        assert_ne!(program.body[0].id, program.body[1].id);
        let again = script("a; b;");
        assert_ne!(program.body[0].id, again.body[0].id);
    }

    #[test]
    fn module_items() {
        let program = Parser::parse_module("import x, { y as z } from './m'; export const a = x + z; export default 1;").unwrap();
        assert!(program.strict);
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[0].kind, StatementKind::Import(_)));
        assert!(matches!(program.body[2].kind, StatementKind::Export(ExportDeclaration::DefaultExpression(_))));
        assert!(Parser::parse_module("export { nope };").is_err());
    }

    #[test]
    fn error_reports_location() {
        let err = Parser::parse_script("let a = ;", false).unwrap_err();
        assert_eq!(err.location.line, 1);
        assert!(err.to_string().starts_with("SyntaxError: 1:"));
    }
}
