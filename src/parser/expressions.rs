use std::rc::Rc;

use super::*;
use crate::types::{bigint_ops, number_ops};

enum BinaryKind {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

fn binary_operator(token: &Token, no_in: bool) -> Option<(BinaryKind, u8)> {
    use BinaryKind::{Binary, Logical};
    Some(match token {
        Token::NullishCoalescing => (Logical(LogicalOperator::Nullish), 1),
        Token::LogicalOr => (Logical(LogicalOperator::Or), 2),
        Token::LogicalAnd => (Logical(LogicalOperator::And), 3),
        Token::Pipe => (Binary(BinaryOperator::BitOr), 4),
        Token::Caret => (Binary(BinaryOperator::BitXor), 5),
        Token::Ampersand => (Binary(BinaryOperator::BitAnd), 6),
        Token::Equal => (Binary(BinaryOperator::Eq), 7),
        Token::NotEqual => (Binary(BinaryOperator::NotEq), 7),
        Token::StrictEqual => (Binary(BinaryOperator::StrictEq), 7),
        Token::StrictNotEqual => (Binary(BinaryOperator::StrictNotEq), 7),
        Token::LessThan => (Binary(BinaryOperator::Lt), 8),
        Token::GreaterThan => (Binary(BinaryOperator::Gt), 8),
        Token::LessThanEqual => (Binary(BinaryOperator::LtEq), 8),
        Token::GreaterThanEqual => (Binary(BinaryOperator::GtEq), 8),
        Token::Keyword(Keyword::Instanceof) => (Binary(BinaryOperator::Instanceof), 8),
        Token::Keyword(Keyword::In) if !no_in => (Binary(BinaryOperator::In), 8),
        Token::LeftShift => (Binary(BinaryOperator::LShift), 9),
        Token::RightShift => (Binary(BinaryOperator::RShift), 9),
        Token::UnsignedRightShift => (Binary(BinaryOperator::URShift), 9),
        Token::Plus => (Binary(BinaryOperator::Add), 10),
        Token::Minus => (Binary(BinaryOperator::Sub), 10),
        Token::Star => (Binary(BinaryOperator::Mul), 11),
        Token::Slash => (Binary(BinaryOperator::Div), 11),
        Token::Percent => (Binary(BinaryOperator::Mod), 11),
        Token::Exponent => (Binary(BinaryOperator::Exp), 12),
        _ => return None,
    })
}

fn compound_operator(token: &Token) -> Option<AssignOperator> {
    Some(match binary_operator(token, false)?.0 {
        BinaryKind::Binary(op) => AssignOperator::Compound(op),
        BinaryKind::Logical(op) => AssignOperator::Logical(op),
    })
}

impl Parser {
    pub(super) fn parse_expression(&mut self) -> ParseResult<Rc<Expression>> {
        self.parse_expression_with(false)
    }

    pub(super) fn parse_expression_with(&mut self, no_in: bool) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let mark = self.cover_initializers.len();
        let first = self.parse_assignment_with(no_in)?;
        let result = if self.at(&Token::Comma) {
            let mut items = vec![first];
            while self.eat_if(&Token::Comma) {
                items.push(self.parse_assignment_with(no_in)?);
            }
            self.make_expression(location, ExpressionKind::Sequence(items.into()))
        } else {
            first
        };
        if !no_in {
            self.check_cover_initializers(mark)?;
        }
        Ok(result)
    }

    pub(super) fn check_cover_initializers(&mut self, mark: usize) -> ParseResult<()> {
        if let Some(location) = self.cover_initializers.get(mark).copied() {
            return Err(ParseError {
                message: "Invalid shorthand property initializer".into(),
                location,
            });
        }
        Ok(())
    }

    pub(super) fn parse_assignment(&mut self) -> ParseResult<Rc<Expression>> {
        self.parse_assignment_with(false)
    }

    pub(super) fn parse_assignment_with(&mut self, no_in: bool) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        if self.at_arrow_function() {
            let f = self.parse_arrow_function(no_in)?;
            return Ok(self.make_expression(location, ExpressionKind::Arrow(f)));
        }
        if self.state.in_generator && self.at_word("yield") {
            return self.parse_yield(no_in);
        }

        let mark = self.cover_initializers.len();
        let left = self.parse_conditional(no_in)?;
        match self.peek().clone() {
            Token::Assign => {
                let target = match &left.kind {
                    ExpressionKind::Array(_) | ExpressionKind::Object(_) => {
                        let pattern = self.expression_to_pattern(&left)?;
                        self.cover_initializers.truncate(mark);
                        pattern
                    }
                    _ => self.simple_assignment_target(&left)?,
                };
                self.advance();
                let value = self.parse_assignment_with(no_in)?;
                Ok(self.make_expression(
                    location,
                    ExpressionKind::Assign {
                        operator: AssignOperator::Assign,
                        target: Rc::new(target),
                        value,
                    },
                ))
            }
            Token::CompoundAssign(op) => {
                let operator = compound_operator(&op).ok_or_else(|| self.error("Invalid assignment operator"))?;
                let target = self.simple_assignment_target(&left)?;
                self.advance();
                let value = self.parse_assignment_with(no_in)?;
                Ok(self.make_expression(
                    location,
                    ExpressionKind::Assign {
                        operator,
                        target: Rc::new(target),
                        value,
                    },
                ))
            }
            _ => Ok(left),
        }
    }

    fn parse_yield(&mut self, no_in: bool) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        self.advance();
        if self.at(&Token::Star) && !self.newline_before() {
            return Err(self.error("yield* is not supported"));
        }
        let argument = if self.newline_before()
            || matches!(
                self.peek(),
                Token::RightParen
                    | Token::RightBracket
                    | Token::RightBrace
                    | Token::Comma
                    | Token::Semicolon
                    | Token::Colon
                    | Token::Eof
            )
            || (no_in && self.at_keyword(Keyword::In))
        {
            None
        } else {
            Some(self.parse_assignment_with(no_in)?)
        };
        Ok(self.make_expression(location, ExpressionKind::Yield(argument)))
    }

    fn simple_assignment_target(&self, expr: &Rc<Expression>) -> ParseResult<Pattern> {
        match &expr.kind {
            ExpressionKind::Identifier(name) => {
                if self.strict && (&**name == "eval" || &**name == "arguments") {
                    return Err(self.error(format!("Cannot assign to '{name}' in strict mode")));
                }
                Ok(Pattern::Identifier(name.clone()))
            }
            ExpressionKind::Member(..) | ExpressionKind::SuperMember(_) => Ok(Pattern::Member(expr.clone())),
            _ => Err(self.error("Invalid left-hand side in assignment")),
        }
    }

    /// Reinterprets an array or object literal as a destructuring target.
    pub(super) fn expression_to_pattern(&self, expr: &Rc<Expression>) -> ParseResult<Pattern> {
        match &expr.kind {
            ExpressionKind::Array(items) => {
                let mut elements = Vec::new();
                let mut rest = None;
                for (i, item) in items.iter().enumerate() {
                    match item {
                        None => elements.push(None),
                        Some(Argument::Expression(e)) => elements.push(Some(self.expression_to_element(e)?)),
                        Some(Argument::Spread(e)) => {
                            if i + 1 != items.len() {
                                return Err(self.error("Rest element must be last element"));
                            }
                            rest = Some(Rc::new(self.expression_to_pattern(e)?));
                        }
                    }
                }
                Ok(Pattern::Array {
                    elements: elements.into(),
                    rest,
                })
            }
            ExpressionKind::Object(props) => {
                let mut properties = Vec::new();
                let mut rest = None;
                for (i, prop) in props.iter().enumerate() {
                    match prop {
                        ObjectProperty::Init(key, value) => {
                            properties.push((key.clone(), self.expression_to_element(value)?));
                        }
                        ObjectProperty::Spread(e) => {
                            if i + 1 != props.len() {
                                return Err(self.error("Rest element must be last element"));
                            }
                            rest = Some(Rc::new(self.simple_assignment_target(e)?));
                        }
                        ObjectProperty::Method(..) => {
                            return Err(self.error("Invalid destructuring assignment target"));
                        }
                    }
                }
                Ok(Pattern::Object {
                    properties: properties.into(),
                    rest,
                })
            }
            _ => self.simple_assignment_target(expr),
        }
    }

    fn expression_to_element(&self, expr: &Rc<Expression>) -> ParseResult<PatternElement> {
        if let ExpressionKind::Assign {
            operator: AssignOperator::Assign,
            target,
            value,
        } = &expr.kind
        {
            return Ok(PatternElement {
                target: target.clone(),
                default: Some(value.clone()),
            });
        }
        Ok(PatternElement {
            target: Rc::new(self.expression_to_pattern(expr)?),
            default: None,
        })
    }

    fn parse_conditional(&mut self, no_in: bool) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let test = self.parse_binary(0, no_in)?;
        if !self.eat_if(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment_with(false)?;
        self.eat(&Token::Colon)?;
        let alternate = self.parse_assignment_with(no_in)?;
        Ok(self.make_expression(location, ExpressionKind::Conditional(test, consequent, alternate)))
    }

    fn parse_binary(&mut self, min_precedence: u8, no_in: bool) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let mut left = self.parse_unary()?;
        while let Some((kind, precedence)) = binary_operator(self.peek(), no_in) {
            if precedence <= min_precedence {
                break;
            }
            self.advance();
            // `**` is right-associative
            let next_min = if precedence == 12 { precedence - 1 } else { precedence };
            let right = self.parse_binary(next_min, no_in)?;
            let kind = match kind {
                BinaryKind::Binary(op) => ExpressionKind::Binary(op, left, right),
                BinaryKind::Logical(op) => ExpressionKind::Logical(op, left, right),
            };
            left = self.make_expression(location, kind);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let operator = match self.peek() {
            Token::Minus => Some(UnaryOperator::Minus),
            Token::Plus => Some(UnaryOperator::Plus),
            Token::Bang => Some(UnaryOperator::Not),
            Token::Tilde => Some(UnaryOperator::BitNot),
            Token::Keyword(Keyword::Typeof) => Some(UnaryOperator::Typeof),
            Token::Keyword(Keyword::Void) => Some(UnaryOperator::Void),
            Token::Keyword(Keyword::Delete) => Some(UnaryOperator::Delete),
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance();
            let operand = self.parse_unary()?;
            if operator == UnaryOperator::Delete
                && self.strict
                && matches!(operand.kind, ExpressionKind::Identifier(_))
            {
                return Err(self.error("Delete of an unqualified identifier in strict mode"));
            }
            if self.at(&Token::Exponent) {
                return Err(self.error("Unary operator used immediately before exponentiation expression"));
            }
            return Ok(self.make_expression(location, ExpressionKind::Unary(operator, operand)));
        }
        if self.state.in_async && self.at_word("await") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(self.make_expression(location, ExpressionKind::Await(operand)));
        }
        if matches!(self.peek(), Token::Increment | Token::Decrement) {
            let increment = self.advance() == Token::Increment;
            let target = self.parse_unary()?;
            self.check_update_target(&target)?;
            return Ok(self.make_expression(
                location,
                ExpressionKind::Update {
                    increment,
                    prefix: true,
                    target,
                },
            ));
        }
        let expr = self.parse_left_hand_side()?;
        if matches!(self.peek(), Token::Increment | Token::Decrement) && !self.newline_before() {
            self.check_update_target(&expr)?;
            let increment = self.advance() == Token::Increment;
            return Ok(self.make_expression(
                location,
                ExpressionKind::Update {
                    increment,
                    prefix: false,
                    target: expr,
                },
            ));
        }
        Ok(expr)
    }

    fn check_update_target(&self, target: &Rc<Expression>) -> ParseResult<()> {
        self.simple_assignment_target(target).map(|_| ())
    }

    fn parse_left_hand_side(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let mut expr = if self.at_keyword(Keyword::New) {
            self.parse_new()?
        } else if self.at_keyword(Keyword::Super) {
            self.parse_super()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek() {
                Token::Dot | Token::LeftBracket => {
                    let property = self.parse_member_property()?;
                    expr = self.make_expression(location, ExpressionKind::Member(expr, property));
                }
                Token::LeftParen => {
                    let arguments = self.parse_arguments()?;
                    expr = self.make_expression(location, ExpressionKind::Call(expr, arguments));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_member_property(&mut self) -> ParseResult<MemberProperty> {
        if self.eat_if(&Token::Dot) {
            Ok(MemberProperty::Static(self.identifier_name()?))
        } else {
            self.eat(&Token::LeftBracket)?;
            let key = self.parse_expression()?;
            self.eat(&Token::RightBracket)?;
            Ok(MemberProperty::Computed(key))
        }
    }

    fn parse_super(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        self.eat_keyword(Keyword::Super)?;
        if self.at(&Token::LeftParen) {
            if !self.state.allow_super_call {
                return Err(self.error("'super' keyword unexpected here"));
            }
            let arguments = self.parse_arguments()?;
            return Ok(self.make_expression(location, ExpressionKind::SuperCall(arguments)));
        }
        if !self.state.allow_super_property || !matches!(self.peek(), Token::Dot | Token::LeftBracket) {
            return Err(self.error("'super' keyword unexpected here"));
        }
        let property = self.parse_member_property()?;
        Ok(self.make_expression(location, ExpressionKind::SuperMember(property)))
    }

    fn parse_new(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        self.eat_keyword(Keyword::New)?;
        if self.eat_if(&Token::Dot) {
            if !self.at_word("target") {
                return Err(self.unexpected("'target'"));
            }
            if !self.state.allow_new_target {
                return Err(self.error("new.target expression is not allowed here"));
            }
            self.advance();
            return Ok(self.make_expression(location, ExpressionKind::NewTarget));
        }
        let mut callee = if self.at_keyword(Keyword::New) {
            self.parse_new()?
        } else if self.at_keyword(Keyword::Super) {
            self.parse_super()?
        } else {
            self.parse_primary()?
        };
        while matches!(self.peek(), Token::Dot | Token::LeftBracket) {
            let property = self.parse_member_property()?;
            callee = self.make_expression(location, ExpressionKind::Member(callee, property));
        }
        let arguments = if self.at(&Token::LeftParen) {
            self.parse_arguments()?
        } else {
            Rc::from(Vec::new())
        };
        Ok(self.make_expression(location, ExpressionKind::New(callee, arguments)))
    }

    pub(super) fn parse_arguments(&mut self) -> ParseResult<Rc<[Argument]>> {
        self.eat(&Token::LeftParen)?;
        let mark = self.cover_initializers.len();
        let mut arguments = Vec::new();
        while !self.eat_if(&Token::RightParen) {
            if self.eat_if(&Token::Ellipsis) {
                arguments.push(Argument::Spread(self.parse_assignment()?));
            } else {
                arguments.push(Argument::Expression(self.parse_assignment()?));
            }
            if !self.at(&Token::RightParen) {
                self.eat(&Token::Comma)?;
            }
        }
        self.check_cover_initializers(mark)?;
        Ok(arguments.into())
    }

    fn parse_primary(&mut self) -> ParseResult<Rc<Expression>> {
        let location = self.location();
        let kind = match self.peek().clone() {
            Token::Keyword(Keyword::This) => {
                self.advance();
                ExpressionKind::This
            }
            Token::NumericLiteral(n) => {
                self.advance();
                ExpressionKind::Literal(Literal::Number(n))
            }
            Token::StringLiteral(s) => {
                self.advance();
                ExpressionKind::Literal(Literal::String(Rc::from(s)))
            }
            Token::BigIntLiteral(digits) => {
                self.advance();
                let value = bigint_ops::parse_literal(&digits).ok_or_else(|| self.error("Invalid BigInt literal"))?;
                ExpressionKind::Literal(Literal::BigInt(Rc::new(value)))
            }
            Token::BooleanLiteral(b) => {
                self.advance();
                ExpressionKind::Literal(Literal::Boolean(b))
            }
            Token::NullLiteral => {
                self.advance();
                ExpressionKind::Literal(Literal::Null)
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                return Ok(expr);
            }
            Token::LeftBracket => self.parse_array_literal()?,
            Token::LeftBrace => self.parse_object_literal()?,
            Token::Keyword(Keyword::Function) => ExpressionKind::Function(self.parse_function_expression()?),
            Token::Keyword(Keyword::Class) => ExpressionKind::Class(self.parse_class(false)?),
            Token::Identifier(ref word)
                if word == "async"
                    && self.peek_at(1) == &Token::Keyword(Keyword::Function)
                    && !self.newline_before_at(1) =>
            {
                ExpressionKind::Function(self.parse_function_expression()?)
            }
            Token::Identifier(name) => {
                if self.is_reserved_word(&name) {
                    return Err(self.error(format!("Unexpected reserved word '{name}'")));
                }
                self.advance();
                ExpressionKind::Identifier(Rc::from(name))
            }
            Token::Keyword(Keyword::Import) => {
                return Err(self.error("Dynamic import is not supported"));
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(self.make_expression(location, kind))
    }

    fn parse_array_literal(&mut self) -> ParseResult<ExpressionKind> {
        self.eat(&Token::LeftBracket)?;
        let mut elements = Vec::new();
        while !self.eat_if(&Token::RightBracket) {
            if self.eat_if(&Token::Comma) {
                elements.push(None);
                continue;
            }
            let element = if self.eat_if(&Token::Ellipsis) {
                Argument::Spread(self.parse_assignment()?)
            } else {
                Argument::Expression(self.parse_assignment()?)
            };
            elements.push(Some(element));
            if !self.at(&Token::RightBracket) {
                self.eat(&Token::Comma)?;
            }
        }
        Ok(ExpressionKind::Array(elements.into()))
    }

    pub(super) fn parse_property_name(&mut self) -> ParseResult<PropertyName> {
        match self.peek().clone() {
            Token::StringLiteral(s) => {
                self.advance();
                Ok(PropertyName::Static(Rc::from(s)))
            }
            Token::NumericLiteral(n) => {
                self.advance();
                Ok(PropertyName::Static(Rc::from(number_ops::to_string(n))))
            }
            Token::LeftBracket => {
                self.advance();
                let key = self.parse_assignment()?;
                self.eat(&Token::RightBracket)?;
                Ok(PropertyName::Computed(key))
            }
            _ => Ok(PropertyName::Static(self.identifier_name()?)),
        }
    }

    /// True when the next token can start a property name (after `get`, `set`, `async`, `static`).
    pub(super) fn at_property_name_after_modifier(&self) -> bool {
        !matches!(
            self.peek_at(1),
            Token::LeftParen | Token::Comma | Token::Colon | Token::RightBrace | Token::Assign | Token::Semicolon
        )
    }

    fn parse_object_literal(&mut self) -> ParseResult<ExpressionKind> {
        self.eat(&Token::LeftBrace)?;
        let mut properties = Vec::new();
        while !self.eat_if(&Token::RightBrace) {
            if self.eat_if(&Token::Ellipsis) {
                properties.push(ObjectProperty::Spread(self.parse_assignment()?));
            } else {
                properties.push(self.parse_object_member()?);
            }
            if !self.at(&Token::RightBrace) {
                self.eat(&Token::Comma)?;
            }
        }
        Ok(ExpressionKind::Object(properties.into()))
    }

    fn parse_object_member(&mut self) -> ParseResult<ObjectProperty> {
        let location = self.location();
        if (self.at_word("get") || self.at_word("set")) && self.at_property_name_after_modifier() {
            let kind = if self.at_word("get") { MethodKind::Getter } else { MethodKind::Setter };
            self.advance();
            let key = self.parse_property_name()?;
            let f = self.parse_method(&key, kind, false, false, None)?;
            return Ok(ObjectProperty::Method(key, kind, f));
        }
        let is_async = self.at_word("async") && self.at_property_name_after_modifier() && !self.newline_before_at(1);
        if is_async {
            self.advance();
        }
        let is_generator = self.eat_if(&Token::Star);
        if is_async && is_generator {
            return Err(self.error("Async generators are not supported"));
        }
        let shorthand = match self.peek() {
            Token::Identifier(name) if !is_async && !is_generator => Some(name.clone()),
            _ => None,
        };
        let key = self.parse_property_name()?;
        if self.at(&Token::LeftParen) || is_async || is_generator {
            let f = self.parse_method(&key, MethodKind::Method, is_async, is_generator, None)?;
            return Ok(ObjectProperty::Method(key, MethodKind::Method, f));
        }
        if self.eat_if(&Token::Colon) {
            let value = self.parse_assignment()?;
            return Ok(ObjectProperty::Init(key, value));
        }
        let Some(name) = shorthand else {
            return Err(self.unexpected("':'"));
        };
        if self.is_reserved_word(&name) {
            return Err(self.error(format!("Unexpected reserved word '{name}'")));
        }
        let name: Rc<str> = Rc::from(name);
        let reference = self.make_expression(location, ExpressionKind::Identifier(name.clone()));
        if self.at(&Token::Assign) {
            // `{a = 1}` is only valid once reinterpreted as a pattern.
            let at = self.location();
            self.cover_initializers.push(at);
            self.advance();
            let default = self.parse_assignment()?;
            let value = self.make_expression(
                location,
                ExpressionKind::Assign {
                    operator: AssignOperator::Assign,
                    target: Rc::new(Pattern::Identifier(name)),
                    value: default,
                },
            );
            return Ok(ObjectProperty::Init(key, value));
        }
        Ok(ObjectProperty::Init(key, reference))
    }

    /// Looks ahead for `x =>`, `(…) =>`, `async x =>` or `async (…) =>`.
    fn at_arrow_function(&self) -> bool {
        let mut n = 0;
        if self.at_word("async")
            && !self.newline_before_at(1)
            && matches!(self.peek_at(1), Token::Identifier(_) | Token::LeftParen)
        {
            n = 1;
        }
        match self.peek_at(n) {
            Token::Identifier(_) => self.peek_at(n + 1) == &Token::Arrow && !self.newline_before_at(n + 1),
            Token::LeftParen => {
                let mut depth = 0usize;
                let mut i = n;
                loop {
                    match self.peek_at(i) {
                        Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                        Token::RightParen | Token::RightBracket | Token::RightBrace => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return self.peek_at(i + 1) == &Token::Arrow && !self.newline_before_at(i + 1);
                            }
                        }
                        Token::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        }
    }
}
