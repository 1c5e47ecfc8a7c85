use std::rc::Rc;

use super::*;

struct ParsedFunction {
    params: Vec<PatternElement>,
    rest: Option<Rc<Pattern>>,
    body: FunctionBody,
    strict: bool,
}

impl Parser {
    pub(super) fn parse_function_declaration(&mut self) -> ParseResult<Rc<FunctionNode>> {
        self.parse_function(true)
    }

    pub(super) fn parse_function_expression(&mut self) -> ParseResult<Rc<FunctionNode>> {
        self.parse_function(false)
    }

    pub(super) fn parse_function(&mut self, name_required: bool) -> ParseResult<Rc<FunctionNode>> {
        let location = self.location();
        let is_async = self.at_word("async");
        if is_async {
            self.advance();
        }
        self.eat_keyword(Keyword::Function)?;
        let is_generator = self.eat_if(&Token::Star);
        if is_async && is_generator {
            return Err(self.error("Async generators are not supported"));
        }
        let name = if matches!(self.peek(), Token::Identifier(_)) {
            Some(self.binding_identifier()?)
        } else if name_required {
            return Err(self.unexpected("function name"));
        } else {
            None
        };
        let state = FunctionState {
            in_function: true,
            in_generator: is_generator,
            in_async: is_async,
            allow_new_target: true,
            ..FunctionState::default()
        };
        let parsed = self.with_function_state(state, |p| {
            let (params, rest) = p.parse_formal_parameters()?;
            let (body, strict) = p.parse_function_body(&params, rest.as_ref(), true)?;
            Ok(ParsedFunction {
                params,
                rest,
                body: FunctionBody::Statements(body),
                strict,
            })
        })?;
        Ok(self.finish_function(location, name, FunctionKind::Normal, is_async, is_generator, parsed))
    }

    pub(super) fn parse_arrow_function(&mut self, no_in: bool) -> ParseResult<Rc<FunctionNode>> {
        let location = self.location();
        let is_async = self.at_word("async") && self.peek_at(1) != &Token::Arrow;
        if is_async {
            self.advance();
        }
        let state = FunctionState {
            in_function: true,
            in_generator: false,
            in_async: is_async,
            allow_super_call: self.state.allow_super_call,
            allow_super_property: self.state.allow_super_property,
            allow_new_target: self.state.allow_new_target,
            ..FunctionState::default()
        };
        let parsed = self.with_function_state(state, |p| {
            let (params, rest) = if matches!(p.peek(), Token::Identifier(_)) {
                let name = p.binding_identifier()?;
                let param = PatternElement {
                    target: Rc::new(Pattern::Identifier(name)),
                    default: None,
                };
                (vec![param], None)
            } else {
                p.parse_formal_parameters()?
            };
            if p.newline_before() {
                return Err(p.error("Line terminator before arrow"));
            }
            p.eat(&Token::Arrow)?;
            if p.at(&Token::LeftBrace) {
                let (body, strict) = p.parse_function_body(&params, rest.as_ref(), false)?;
                Ok(ParsedFunction {
                    params,
                    rest,
                    body: FunctionBody::Statements(body),
                    strict,
                })
            } else {
                p.check_parameters(&params, rest.as_ref(), false)?;
                let expr = p.parse_assignment_with(no_in)?;
                Ok(ParsedFunction {
                    params,
                    rest,
                    body: FunctionBody::Expression(expr),
                    strict: p.strict,
                })
            }
        })?;
        Ok(self.finish_function(location, None, FunctionKind::Arrow, is_async, false, parsed))
    }

    /// Parses `(params) { body }` of an object or class method.
    /// `constructor` is `Some(derived)` for a class constructor.
    pub(super) fn parse_method(
        &mut self,
        key: &PropertyName,
        kind: MethodKind,
        is_async: bool,
        is_generator: bool,
        constructor: Option<bool>,
    ) -> ParseResult<Rc<FunctionNode>> {
        let location = self.location();
        let state = FunctionState {
            in_function: true,
            in_generator: is_generator,
            in_async: is_async,
            allow_super_call: constructor == Some(true),
            allow_super_property: true,
            allow_new_target: true,
            ..FunctionState::default()
        };
        let parsed = self.with_function_state(state, |p| {
            let (params, rest) = p.parse_formal_parameters()?;
            match kind {
                MethodKind::Getter if !params.is_empty() || rest.is_some() => {
                    return Err(p.error("Getter must not have any formal parameters"));
                }
                MethodKind::Setter if params.len() != 1 || rest.is_some() => {
                    return Err(p.error("Setter must have exactly one formal parameter"));
                }
                _ => {}
            }
            let (body, strict) = p.parse_function_body(&params, rest.as_ref(), false)?;
            Ok(ParsedFunction {
                params,
                rest,
                body: FunctionBody::Statements(body),
                strict,
            })
        })?;
        let name = match key {
            PropertyName::Static(name) => Some(name.clone()),
            PropertyName::Computed(_) => None,
        };
        let function_kind = match constructor {
            Some(derived) => FunctionKind::ClassConstructor { derived },
            None => FunctionKind::Method,
        };
        Ok(self.finish_function(location, name, function_kind, is_async, is_generator, parsed))
    }

    fn with_function_state<T>(
        &mut self,
        state: FunctionState,
        f: impl FnOnce(&mut Parser) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = self.enter_function(state);
        let saved_strict = self.strict;
        let saved_cover = std::mem::take(&mut self.cover_initializers);
        let result = f(self);
        self.leave_function(saved);
        self.strict = saved_strict;
        self.cover_initializers = saved_cover;
        result
    }

    fn finish_function(
        &self,
        location: SourceLocation,
        name: Option<Rc<str>>,
        kind: FunctionKind,
        is_async: bool,
        is_generator: bool,
        parsed: ParsedFunction,
    ) -> Rc<FunctionNode> {
        Rc::new(FunctionNode {
            id: next_node_id(),
            location,
            name,
            params: parsed.params.into(),
            rest: parsed.rest,
            body: parsed.body,
            kind,
            is_async,
            is_generator,
            strict: parsed.strict,
            scope: OnceCell::new(),
        })
    }

    fn parse_formal_parameters(&mut self) -> ParseResult<(Vec<PatternElement>, Option<Rc<Pattern>>)> {
        self.eat(&Token::LeftParen)?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_if(&Token::RightParen) {
            if self.eat_if(&Token::Ellipsis) {
                rest = Some(Rc::new(self.parse_binding_target()?));
                self.eat(&Token::RightParen)?;
                break;
            }
            params.push(self.parse_binding_element()?);
            if !self.at(&Token::RightParen) {
                self.eat(&Token::Comma)?;
            }
        }
        Ok((params, rest))
    }

    /// Parses `{ … }` and returns the statements with the body's strictness.
    fn parse_function_body(
        &mut self,
        params: &[PatternElement],
        rest: Option<&Rc<Pattern>>,
        duplicates_allowed: bool,
    ) -> ParseResult<(StatementList, bool)> {
        self.eat(&Token::LeftBrace)?;
        let outer_strict = self.strict;
        let start = self.pos;
        self.parse_directives()?;
        self.pos = start;
        let simple = rest.is_none()
            && params
                .iter()
                .all(|p| p.default.is_none() && matches!(*p.target, Pattern::Identifier(_)));
        if self.strict && !outer_strict && !simple {
            return Err(self.error("Illegal 'use strict' directive in function with non-simple parameter list"));
        }
        self.check_parameters(params, rest, duplicates_allowed)?;
        let mut names = Vec::new();
        for p in params {
            bound_names(&p.target, &mut names);
        }
        if let Some(rest) = rest {
            bound_names(rest, &mut names);
        }
        if self.strict && names.iter().any(|n| &**n == "eval" || &**n == "arguments") {
            return Err(self.error("Unexpected eval or arguments in strict mode"));
        }

        let mut body = Vec::new();
        while !self.at(&Token::RightBrace) {
            if self.at(&Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement_list_item()?);
        }
        self.advance();
        self.check_body_declarations(&body, false)?;
        let lexical = lexical_declarations(&body, false);
        if let Some(clash) = lexical.iter().find(|d| names.contains(&d.name())) {
            return Err(self.error(format!("Identifier '{}' has already been declared", clash.name())));
        }
        Ok((body.into(), self.strict))
    }

    pub(super) fn parse_class(&mut self, name_required: bool) -> ParseResult<Rc<ClassNode>> {
        let location = self.location();
        let saved_strict = self.strict;
        self.strict = true;
        let result = self.parse_class_inner(location, name_required);
        self.strict = saved_strict;
        result
    }

    fn parse_class_inner(&mut self, location: SourceLocation, name_required: bool) -> ParseResult<Rc<ClassNode>> {
        self.eat_keyword(Keyword::Class)?;
        let name = if matches!(self.peek(), Token::Identifier(_)) {
            Some(self.binding_identifier()?)
        } else if name_required {
            return Err(self.unexpected("class name"));
        } else {
            None
        };
        let heritage = if self.at_keyword(Keyword::Extends) {
            self.advance();
            Some(self.parse_class_heritage()?)
        } else {
            None
        };
        let derived = heritage.is_some();
        self.eat(&Token::LeftBrace)?;
        let mut constructor = None;
        let mut members = Vec::new();
        while !self.eat_if(&Token::RightBrace) {
            if self.eat_if(&Token::Semicolon) {
                continue;
            }
            let is_static = self.at_word("static") && self.at_property_name_after_modifier();
            if is_static {
                self.advance();
            }
            let mut kind = MethodKind::Method;
            if (self.at_word("get") || self.at_word("set")) && self.at_property_name_after_modifier() {
                kind = if self.at_word("get") { MethodKind::Getter } else { MethodKind::Setter };
                self.advance();
            }
            let is_async = kind == MethodKind::Method
                && self.at_word("async")
                && self.at_property_name_after_modifier()
                && !self.newline_before_at(1);
            if is_async {
                self.advance();
            }
            let is_generator = kind == MethodKind::Method && self.eat_if(&Token::Star);
            if is_async && is_generator {
                return Err(self.error("Async generators are not supported"));
            }
            let key = self.parse_property_name()?;
            if !self.at(&Token::LeftParen) {
                return Err(self.error("Class fields are not supported"));
            }
            let is_constructor = !is_static && matches!(&key, PropertyName::Static(k) if &**k == "constructor");
            if is_constructor {
                if kind != MethodKind::Method || is_async || is_generator {
                    return Err(self.error("Class constructor may not be an accessor, generator or async"));
                }
                if constructor.is_some() {
                    return Err(self.error("A class may only have one constructor"));
                }
                constructor = Some(self.parse_method(&key, kind, false, false, Some(derived))?);
                continue;
            }
            if is_static && matches!(&key, PropertyName::Static(k) if &**k == "prototype") {
                return Err(self.error("Classes may not have a static property named 'prototype'"));
            }
            let function = self.parse_method(&key, kind, is_async, is_generator, None)?;
            members.push(ClassMember {
                is_static,
                key,
                kind,
                function,
            });
        }
        Ok(Rc::new(ClassNode {
            id: next_node_id(),
            location,
            name,
            heritage,
            constructor,
            members: members.into(),
        }))
    }

    fn parse_class_heritage(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let mut expr = match self.peek().clone() {
            Token::Identifier(name) => {
                if self.is_reserved_word(&name) {
                    return Err(self.error(format!("Unexpected reserved word '{name}'")));
                }
                self.advance();
                self.make_expression(location, ExpressionKind::Identifier(Rc::from(name)))
            }
            Token::LeftParen => {
                self.advance();
                let e = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                e
            }
            Token::NullLiteral => {
                self.advance();
                self.make_expression(location, ExpressionKind::Literal(Literal::Null))
            }
            _ => return Err(self.unexpected("class heritage")),
        };
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            let property = MemberProperty::Static(self.identifier_name()?);
            expr = self.make_expression(location, ExpressionKind::Member(expr, property));
        }
        Ok(expr)
    }

    pub(super) fn parse_binding_element(&mut self) -> ParseResult<PatternElement> {
        let target = Rc::new(self.parse_binding_target()?);
        let default = if self.eat_if(&Token::Assign) {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        Ok(PatternElement { target, default })
    }

    pub(super) fn parse_binding_target(&mut self) -> ParseResult<Pattern> {
        match self.peek() {
            Token::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                let mut rest = None;
                while !self.eat_if(&Token::RightBracket) {
                    if self.eat_if(&Token::Comma) {
                        elements.push(None);
                        continue;
                    }
                    if self.eat_if(&Token::Ellipsis) {
                        rest = Some(Rc::new(self.parse_binding_target()?));
                        self.eat(&Token::RightBracket)?;
                        break;
                    }
                    elements.push(Some(self.parse_binding_element()?));
                    if !self.at(&Token::RightBracket) {
                        self.eat(&Token::Comma)?;
                    }
                }
                Ok(Pattern::Array {
                    elements: elements.into(),
                    rest,
                })
            }
            Token::LeftBrace => {
                self.advance();
                let mut properties = Vec::new();
                let mut rest = None;
                while !self.eat_if(&Token::RightBrace) {
                    if self.eat_if(&Token::Ellipsis) {
                        rest = Some(Rc::new(Pattern::Identifier(self.binding_identifier()?)));
                        self.eat(&Token::RightBrace)?;
                        break;
                    }
                    let shorthand = matches!(self.peek(), Token::Identifier(_)) && self.peek_at(1) != &Token::Colon;
                    if shorthand {
                        let name = self.binding_identifier()?;
                        let default = if self.eat_if(&Token::Assign) {
                            Some(self.parse_assignment()?)
                        } else {
                            None
                        };
                        let element = PatternElement {
                            target: Rc::new(Pattern::Identifier(name.clone())),
                            default,
                        };
                        properties.push((PropertyName::Static(name), element));
                    } else {
                        let key = self.parse_property_name()?;
                        self.eat(&Token::Colon)?;
                        properties.push((key, self.parse_binding_element()?));
                    }
                    if !self.at(&Token::RightBrace) {
                        self.eat(&Token::Comma)?;
                    }
                }
                Ok(Pattern::Object {
                    properties: properties.into(),
                    rest,
                })
            }
            _ => Ok(Pattern::Identifier(self.binding_identifier()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_expression(src: &str) -> Rc<Expression> {
        let program = Parser::parse_script(src, false).unwrap();
        match &program.body[0].kind {
            StatementKind::Expression(e) => e.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn arrow_forms() {
        for src in ["x => x", "(a, b) => a + b", "async x => await x", "(a = 1, ...r) => { return r }"] {
            assert!(matches!(first_expression(src).kind, ExpressionKind::Arrow(_)), "{src}");
        }
        assert!(matches!(first_expression("(a, b)").kind, ExpressionKind::Sequence(_)));
    }

    #[test]
    fn destructuring_assignment_becomes_pattern() {
        let expr = first_expression("[a, b = 2, ...c] = arr");
        let ExpressionKind::Assign { target, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        let Pattern::Array { elements, rest } = &**target else {
            panic!("expected array pattern");
        };
        assert_eq!(elements.len(), 2);
        assert!(elements[1].as_ref().unwrap().default.is_some());
        assert!(rest.is_some());
    }

    #[test]
    fn shorthand_initializer_only_in_patterns() {
        assert!(Parser::parse_script("({a = 1} = {})", false).is_ok());
        assert!(Parser::parse_script("f({a = 1})", false).is_err());
    }

    #[test]
    fn class_members() {
        let program = Parser::parse_script(
            "class A extends B { constructor() { super(); } static make() {} get x() { return 1 } }",
            false,
        )
        .unwrap();
        let StatementKind::ClassDeclaration(class) = &program.body[0].kind else {
            panic!("expected class");
        };
        assert!(class.heritage.is_some());
        assert_eq!(class.members.len(), 2);
        assert_eq!(
            class.constructor.as_ref().unwrap().kind,
            FunctionKind::ClassConstructor { derived: true }
        );
        assert!(Parser::parse_script("class A { constructor() { super(); } }", false).is_err());
        assert!(Parser::parse_script("class A { x = 1 }", false).is_err());
    }

    #[test]
    fn function_flags() {
        let program = Parser::parse_script("function* g() { yield 1 } async function f() { 'use strict'; }", false).unwrap();
        let StatementKind::FunctionDeclaration(g) = &program.body[0].kind else {
            panic!()
        };
        assert!(g.is_generator && !g.strict);
        let StatementKind::FunctionDeclaration(f) = &program.body[1].kind else {
            panic!()
        };
        assert!(f.is_async && f.strict);
        assert!(Parser::parse_script("function f(a, a) { 'use strict' }", false).is_err());
        assert!(Parser::parse_script("function f(a, a) {}", false).is_ok());
    }
}
