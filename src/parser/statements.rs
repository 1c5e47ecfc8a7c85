use std::rc::Rc;

use super::*;

impl Parser {
    pub(super) fn parse_statement_list_until_eof(&mut self) -> ParseResult<Vec<Rc<Statement>>> {
        let mut body = Vec::new();
        while !self.at(&Token::Eof) {
            body.push(self.parse_statement_list_item()?);
        }
        Ok(body)
    }

    pub(super) fn parse_block_body(&mut self) -> ParseResult<Vec<Rc<Statement>>> {
        self.eat(&Token::LeftBrace)?;
        let mut body = Vec::new();
        while !self.at(&Token::RightBrace) {
            if self.at(&Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement_list_item()?);
        }
        self.advance();
        self.check_block_declarations(&body)?;
        Ok(body)
    }

    fn at_lexical_declaration(&self) -> bool {
        if self.at_keyword(Keyword::Const) {
            return true;
        }
        self.at_word("let")
            && match self.peek_at(1) {
                Token::LeftBracket | Token::LeftBrace => true,
                Token::Identifier(_) => true,
                _ => false,
            }
    }

    fn at_async_function(&self) -> bool {
        self.at_word("async")
            && self.peek_at(1) == &Token::Keyword(Keyword::Function)
            && !self.newline_before_at(1)
    }

    pub(super) fn parse_statement_list_item(&mut self) -> ParseResult<Rc<Statement>> {
        let location = self.location();
        if self.at_keyword(Keyword::Function) || self.at_async_function() {
            let f = self.parse_function_declaration()?;
            return Ok(self.make_statement(location, StatementKind::FunctionDeclaration(f)));
        }
        if self.at_keyword(Keyword::Class) {
            let class = self.parse_class(true)?;
            return Ok(self.make_statement(location, StatementKind::ClassDeclaration(class)));
        }
        if self.at_lexical_declaration() {
            let decl = self.parse_variable_declaration(false)?;
            self.eat_semicolon()?;
            return Ok(self.make_statement(location, StatementKind::Variable(decl)));
        }
        if self.at_keyword(Keyword::Import) || self.at_keyword(Keyword::Export) {
            return Err(self.error("Import and export declarations may only appear at the top level of a module"));
        }
        self.parse_statement()
    }

    pub(super) fn parse_statement(&mut self) -> ParseResult<Rc<Statement>> {
        let location = self.location();
        let kind = match self.peek().clone() {
            Token::LeftBrace => StatementKind::Block(self.parse_block_body()?.into()),
            Token::Semicolon => {
                self.advance();
                StatementKind::Empty
            }
            Token::Keyword(Keyword::Var) => {
                let decl = self.parse_variable_declaration(false)?;
                self.eat_semicolon()?;
                StatementKind::Variable(decl)
            }
            Token::Keyword(Keyword::If) => self.parse_if()?,
            Token::Keyword(Keyword::While) => {
                self.advance();
                self.eat(&Token::LeftParen)?;
                let test = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                let body = self.parse_loop_body()?;
                StatementKind::While { test, body }
            }
            Token::Keyword(Keyword::Do) => {
                self.advance();
                let body = self.parse_loop_body()?;
                self.eat_keyword(Keyword::While)?;
                self.eat(&Token::LeftParen)?;
                let test = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                self.eat_if(&Token::Semicolon);
                StatementKind::DoWhile { body, test }
            }
            Token::Keyword(Keyword::For) => self.parse_for()?,
            Token::Keyword(Keyword::Return) => {
                if !self.state.in_function {
                    return Err(self.error("Illegal return statement"));
                }
                self.advance();
                let arg = if self.at(&Token::Semicolon)
                    || self.at(&Token::RightBrace)
                    || self.at(&Token::Eof)
                    || self.newline_before()
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.eat_semicolon()?;
                StatementKind::Return(arg)
            }
            Token::Keyword(Keyword::Break) => {
                self.advance();
                let label = self.parse_jump_label()?;
                match &label {
                    Some(name) if !self.state.labels.iter().any(|(l, _)| l == name) => {
                        return Err(self.error(format!("Undefined label '{name}'")));
                    }
                    None if self.state.in_iteration == 0 && self.state.in_switch == 0 => {
                        return Err(self.error("Illegal break statement"));
                    }
                    _ => {}
                }
                self.eat_semicolon()?;
                StatementKind::Break(label)
            }
            Token::Keyword(Keyword::Continue) => {
                self.advance();
                if self.state.in_iteration == 0 {
                    return Err(self.error("Illegal continue statement"));
                }
                let label = self.parse_jump_label()?;
                if let Some(name) = &label
                    && !self.state.labels.iter().any(|(l, is_loop)| l == name && *is_loop)
                {
                    return Err(self.error(format!("Illegal continue target '{name}'")));
                }
                self.eat_semicolon()?;
                StatementKind::Continue(label)
            }
            Token::Keyword(Keyword::Throw) => {
                self.advance();
                if self.newline_before() {
                    return Err(self.error("Illegal newline after throw"));
                }
                let arg = self.parse_expression()?;
                self.eat_semicolon()?;
                StatementKind::Throw(arg)
            }
            Token::Keyword(Keyword::Try) => self.parse_try()?,
            Token::Keyword(Keyword::Switch) => self.parse_switch()?,
            Token::Keyword(Keyword::With) => {
                if self.strict {
                    return Err(self.error("Strict mode code may not include a with statement"));
                }
                self.advance();
                self.eat(&Token::LeftParen)?;
                let object = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                let body = self.parse_statement()?;
                StatementKind::With(object, body)
            }
            Token::Keyword(Keyword::Debugger) => {
                self.advance();
                self.eat_semicolon()?;
                StatementKind::Debugger
            }
            Token::Keyword(Keyword::Function) | Token::Keyword(Keyword::Class) => {
                return Err(self.error("Declaration is not allowed in statement position"));
            }
            Token::Identifier(name) if self.peek_at(1) == &Token::Colon && !self.is_reserved_word(&name) => {
                self.parse_labeled()?
            }
            _ => {
                let expr = self.parse_expression()?;
                self.eat_semicolon()?;
                StatementKind::Expression(expr)
            }
        };
        Ok(self.make_statement(location, kind))
    }

    fn parse_jump_label(&mut self) -> ParseResult<Option<Rc<str>>> {
        if !self.newline_before()
            && let Token::Identifier(name) = self.peek().clone()
        {
            self.advance();
            return Ok(Some(Rc::from(name)));
        }
        Ok(None)
    }

    fn parse_loop_body(&mut self) -> ParseResult<Rc<Statement>> {
        self.state.in_iteration += 1;
        let body = self.parse_statement();
        self.state.in_iteration -= 1;
        body
    }

    /// Whether the statement after a label chain is a loop (so `continue label` is valid).
    fn labels_a_loop(&self) -> bool {
        let mut n = 0;
        while matches!(self.peek_at(n), Token::Identifier(_)) && self.peek_at(n + 1) == &Token::Colon {
            n += 2;
        }
        matches!(
            self.peek_at(n),
            Token::Keyword(Keyword::For | Keyword::While | Keyword::Do)
        )
    }

    fn parse_labeled(&mut self) -> ParseResult<StatementKind> {
        let label = self.binding_identifier()?;
        self.eat(&Token::Colon)?;
        if self.state.labels.iter().any(|(l, _)| *l == label) {
            return Err(self.error(format!("Label '{label}' has already been declared")));
        }
        let is_loop = self.labels_a_loop();
        self.state.labels.push((label.clone(), is_loop));
        let body = if self.at_keyword(Keyword::Function) && !self.strict {
            let location = self.location();
            self.parse_function_declaration()
                .map(|f| self.make_statement(location, StatementKind::FunctionDeclaration(f)))
        } else {
            self.parse_statement()
        };
        self.state.labels.pop();
        Ok(StatementKind::Labeled(label, body?))
    }

    fn parse_if(&mut self) -> ParseResult<StatementKind> {
        self.eat_keyword(Keyword::If)?;
        self.eat(&Token::LeftParen)?;
        let test = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        let consequent = self.parse_if_branch()?;
        let alternate = if self.at_keyword(Keyword::Else) {
            self.advance();
            Some(self.parse_if_branch()?)
        } else {
            None
        };
        Ok(StatementKind::If {
            test,
            consequent,
            alternate,
        })
    }

    /// Sloppy code may use a bare function declaration as an if branch; it
    /// behaves as if wrapped in a block.
    fn parse_if_branch(&mut self) -> ParseResult<Rc<Statement>> {
        if self.at_keyword(Keyword::Function) && !self.strict {
            let location = self.location();
            let f = self.parse_function_declaration()?;
            let inner = self.make_statement(location, StatementKind::FunctionDeclaration(f));
            return Ok(self.make_statement(location, StatementKind::Block(Rc::from(vec![inner]))));
        }
        self.parse_statement()
    }

    pub(super) fn parse_variable_declaration(&mut self, no_in: bool) -> ParseResult<VariableDeclaration> {
        let kind = match self.advance() {
            Token::Keyword(Keyword::Var) => VarKind::Var,
            Token::Keyword(Keyword::Const) => VarKind::Const,
            Token::Identifier(w) if w == "let" => VarKind::Let,
            tok => return Err(self.error(format!("Unexpected token {tok:?}, expected declaration"))),
        };
        let mut declarations = Vec::new();
        loop {
            let target = Rc::new(self.parse_binding_target()?);
            if kind != VarKind::Var {
                let mut names = Vec::new();
                bound_names(&target, &mut names);
                if names.iter().any(|n| &**n == "let") {
                    return Err(self.error("let is disallowed as a lexically bound name"));
                }
            }
            let init = if self.eat_if(&Token::Assign) {
                Some(self.parse_assignment_with(no_in)?)
            } else {
                None
            };
            declarations.push(VariableDeclarator { target, init });
            if !self.eat_if(&Token::Comma) {
                break;
            }
        }
        Ok(VariableDeclaration {
            kind,
            declarations: declarations.into(),
        })
    }

    /// Checks initializers once we know the declaration is not a for-in/of head.
    fn check_declaration_initializers(&self, decl: &VariableDeclaration) -> ParseResult<()> {
        for d in decl.declarations.iter() {
            if d.init.is_none() && (decl.kind == VarKind::Const || !matches!(*d.target, Pattern::Identifier(_))) {
                return Err(self.error("Missing initializer in declaration"));
            }
        }
        Ok(())
    }

    fn parse_for(&mut self) -> ParseResult<StatementKind> {
        self.eat_keyword(Keyword::For)?;
        if self.at_word("await") {
            return Err(self.error("for await is not supported"));
        }
        self.eat(&Token::LeftParen)?;

        let mut init = None;
        if self.at(&Token::Semicolon) {
            // empty init
        } else if self.at_keyword(Keyword::Var) || self.at_lexical_declaration() {
            let decl = self.parse_variable_declaration(true)?;
            if decl.declarations.len() == 1 && decl.declarations[0].init.is_none() {
                let is_of = self.at_word("of");
                if is_of || self.at_keyword(Keyword::In) {
                    let target = decl.declarations[0].target.clone();
                    if decl.kind != VarKind::Var {
                        let mut names = Vec::new();
                        bound_names(&target, &mut names);
                        let mut seen = FxHashSet::default();
                        if !names.iter().all(|n| seen.insert(n.clone())) {
                            return Err(self.error("Duplicate binding in for declaration"));
                        }
                    }
                    return self.parse_for_in_of_rest(ForHead::Declaration(decl.kind, target), is_of);
                }
            }
            self.check_declaration_initializers(&decl)?;
            init = Some(ForInit::Variable(decl));
        } else {
            let mark = self.cover_initializers.len();
            let expr = self.parse_expression_with(true)?;
            let is_of = self.at_word("of");
            if is_of || self.at_keyword(Keyword::In) {
                let target = Rc::new(self.expression_to_pattern(&expr)?);
                self.cover_initializers.truncate(mark);
                return self.parse_for_in_of_rest(ForHead::Target(target), is_of);
            }
            self.check_cover_initializers(mark)?;
            init = Some(ForInit::Expression(expr));
        }

        self.eat(&Token::Semicolon)?;
        let test = if self.at(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat(&Token::Semicolon)?;
        let update = if self.at(&Token::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat(&Token::RightParen)?;
        let body = self.parse_loop_body()?;
        if let Some(ForInit::Variable(decl)) = &init
            && decl.kind != VarKind::Var
        {
            self.check_head_against_body(decl, &body)?;
        }
        Ok(StatementKind::For(ForStatement {
            init,
            test,
            update,
            body,
        }))
    }

    fn check_head_against_body(&self, decl: &VariableDeclaration, body: &Statement) -> ParseResult<()> {
        let mut names = Vec::new();
        for d in decl.declarations.iter() {
            bound_names(&d.target, &mut names);
        }
        let mut vars = Vec::new();
        if let StatementKind::Block(stmts) = &body.kind {
            vars = var_declared_names(stmts);
        } else if let StatementKind::Variable(v) = &body.kind
            && v.kind == VarKind::Var
        {
            for d in v.declarations.iter() {
                bound_names(&d.target, &mut vars);
            }
        }
        if let Some(name) = names.iter().find(|n| vars.contains(n)) {
            return Err(self.error(format!("Identifier '{name}' has already been declared")));
        }
        Ok(())
    }

    fn parse_for_in_of_rest(&mut self, left: ForHead, is_of: bool) -> ParseResult<StatementKind> {
        self.advance();
        let right = if is_of {
            self.parse_assignment()?
        } else {
            self.parse_expression()?
        };
        self.eat(&Token::RightParen)?;
        let body = self.parse_loop_body()?;
        let stmt = ForInOfStatement { left, right, body };
        Ok(if is_of {
            StatementKind::ForOf(stmt)
        } else {
            StatementKind::ForIn(stmt)
        })
    }

    fn parse_try(&mut self) -> ParseResult<StatementKind> {
        self.eat_keyword(Keyword::Try)?;
        let block_location = self.location();
        let block_body = self.parse_block_body()?;
        let block = self.make_statement(block_location, StatementKind::Block(block_body.into()));
        let handler = if self.at_keyword(Keyword::Catch) {
            self.advance();
            let param = if self.eat_if(&Token::LeftParen) {
                let pattern = self.parse_binding_target()?;
                self.eat(&Token::RightParen)?;
                Some(Rc::new(pattern))
            } else {
                None
            };
            let body_location = self.location();
            let stmts = self.parse_block_body()?;
            if let Some(param) = &param {
                let mut names = Vec::new();
                bound_names(param, &mut names);
                let lexical = lexical_declarations(&stmts, true);
                if let Some(clash) = lexical.iter().find(|d| names.contains(&d.name())) {
                    return Err(self.error(format!("Identifier '{}' has already been declared", clash.name())));
                }
            }
            let body = self.make_statement(body_location, StatementKind::Block(stmts.into()));
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.at_keyword(Keyword::Finally) {
            self.advance();
            let location = self.location();
            let body = self.parse_block_body()?;
            Some(self.make_statement(location, StatementKind::Block(body.into())))
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }
        Ok(StatementKind::Try(TryStatement {
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_switch(&mut self) -> ParseResult<StatementKind> {
        self.eat_keyword(Keyword::Switch)?;
        self.eat(&Token::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        self.eat(&Token::LeftBrace)?;
        self.state.in_switch += 1;
        let mut cases = Vec::new();
        let mut all = Vec::new();
        let mut has_default = false;
        while !self.eat_if(&Token::RightBrace) {
            let test = if self.at_keyword(Keyword::Default) {
                self.advance();
                if has_default {
                    return Err(self.error("More than one default clause in switch statement"));
                }
                has_default = true;
                None
            } else {
                self.eat_keyword(Keyword::Case)?;
                Some(self.parse_expression()?)
            };
            self.eat(&Token::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.peek(),
                Token::Keyword(Keyword::Case | Keyword::Default) | Token::RightBrace | Token::Eof
            ) {
                body.push(self.parse_statement_list_item()?);
            }
            all.extend(body.iter().cloned());
            cases.push(SwitchCase {
                test,
                body: body.into(),
            });
        }
        self.state.in_switch -= 1;
        self.check_block_declarations(&all)?;
        Ok(StatementKind::Switch(SwitchStatement {
            discriminant,
            cases: cases.into(),
        }))
    }
}
