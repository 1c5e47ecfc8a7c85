use std::rc::Rc;

use super::*;

impl Parser {
    pub(super) fn parse_module_items(&mut self) -> ParseResult<Vec<Rc<Statement>>> {
        let mut body = Vec::new();
        while !self.at(&Token::Eof) {
            let location = self.location();
            let item = if self.at_keyword(Keyword::Import) && self.peek_at(1) != &Token::LeftParen {
                let decl = self.parse_import_declaration()?;
                self.make_statement(location, StatementKind::Import(decl))
            } else if self.at_keyword(Keyword::Export) {
                let decl = self.parse_export_declaration()?;
                self.make_statement(location, StatementKind::Export(decl))
            } else {
                self.parse_statement_list_item()?
            };
            body.push(item);
        }
        Ok(body)
    }

    fn parse_module_specifier(&mut self) -> ParseResult<Rc<str>> {
        match self.advance() {
            Token::StringLiteral(s) => Ok(Rc::from(s)),
            tok => Err(self.error(format!("Unexpected token {tok:?}, expected module specifier"))),
        }
    }

    /// Export and import names may be any identifier name or a string.
    fn parse_module_export_name(&mut self) -> ParseResult<Rc<str>> {
        if let Token::StringLiteral(s) = self.peek().clone() {
            self.advance();
            return Ok(Rc::from(s));
        }
        self.identifier_name()
    }

    fn parse_import_declaration(&mut self) -> ParseResult<ImportDeclaration> {
        self.eat_keyword(Keyword::Import)?;
        if matches!(self.peek(), Token::StringLiteral(_)) {
            let source = self.parse_module_specifier()?;
            self.eat_semicolon()?;
            return Ok(ImportDeclaration {
                specifiers: Rc::from(Vec::new()),
                source,
            });
        }

        let mut specifiers = Vec::new();
        if matches!(self.peek(), Token::Identifier(_)) {
            specifiers.push(ImportSpecifier::Default(self.binding_identifier()?));
            if self.eat_if(&Token::Comma) {
                self.parse_import_clause_tail(&mut specifiers)?;
            }
        } else {
            self.parse_import_clause_tail(&mut specifiers)?;
        }
        self.eat_word("from")?;
        let source = self.parse_module_specifier()?;
        self.eat_semicolon()?;
        Ok(ImportDeclaration {
            specifiers: specifiers.into(),
            source,
        })
    }

    fn parse_import_clause_tail(&mut self, specifiers: &mut Vec<ImportSpecifier>) -> ParseResult<()> {
        if self.eat_if(&Token::Star) {
            self.eat_word("as")?;
            specifiers.push(ImportSpecifier::Namespace(self.binding_identifier()?));
            return Ok(());
        }
        self.eat(&Token::LeftBrace)?;
        while !self.eat_if(&Token::RightBrace) {
            let is_string = matches!(self.peek(), Token::StringLiteral(_));
            let imported = self.parse_module_export_name()?;
            let local = if self.at_word("as") {
                self.advance();
                self.binding_identifier()?
            } else {
                if is_string || self.is_reserved_word(&imported) || Keyword::from_word(&imported).is_some() {
                    return Err(self.error(format!("Unexpected reserved word '{imported}'")));
                }
                imported.clone()
            };
            specifiers.push(ImportSpecifier::Named { imported, local });
            if !self.at(&Token::RightBrace) {
                self.eat(&Token::Comma)?;
            }
        }
        Ok(())
    }

    fn parse_export_declaration(&mut self) -> ParseResult<ExportDeclaration> {
        self.eat_keyword(Keyword::Export)?;
        let location = self.location();

        if self.eat_if(&Token::Star) {
            let exported = if self.at_word("as") {
                self.advance();
                Some(self.parse_module_export_name()?)
            } else {
                None
            };
            self.eat_word("from")?;
            let source = self.parse_module_specifier()?;
            self.eat_semicolon()?;
            return Ok(ExportDeclaration::All { exported, source });
        }

        if self.at_keyword(Keyword::Default) {
            self.advance();
            let is_async_function = self.at_word("async")
                && self.peek_at(1) == &Token::Keyword(Keyword::Function)
                && !self.newline_before_at(1);
            if self.at_keyword(Keyword::Function) || is_async_function {
                let f = self.parse_function(false)?;
                return Ok(ExportDeclaration::DefaultFunction(f));
            }
            if self.at_keyword(Keyword::Class) {
                let class = self.parse_class(false)?;
                return Ok(ExportDeclaration::DefaultClass(class));
            }
            let expr = self.parse_assignment()?;
            self.eat_semicolon()?;
            return Ok(ExportDeclaration::DefaultExpression(expr));
        }

        if self.eat_if(&Token::LeftBrace) {
            let mut specifiers = Vec::new();
            while !self.eat_if(&Token::RightBrace) {
                let local = self.parse_module_export_name()?;
                let exported = if self.at_word("as") {
                    self.advance();
                    self.parse_module_export_name()?
                } else {
                    local.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.at(&Token::RightBrace) {
                    self.eat(&Token::Comma)?;
                }
            }
            let source = if self.at_word("from") {
                self.advance();
                Some(self.parse_module_specifier()?)
            } else {
                None
            };
            self.eat_semicolon()?;
            return Ok(ExportDeclaration::Named {
                specifiers: specifiers.into(),
                source,
            });
        }

        let declaration = match self.peek() {
            Token::Keyword(Keyword::Var | Keyword::Const | Keyword::Function | Keyword::Class) => {
                self.parse_statement_list_item()?
            }
            Token::Identifier(w) if w == "let" || w == "async" => self.parse_statement_list_item()?,
            _ => return Err(self.error("Unexpected token after export")),
        };
        if !matches!(
            declaration.kind,
            StatementKind::Variable(_) | StatementKind::FunctionDeclaration(_) | StatementKind::ClassDeclaration(_)
        ) {
            return Err(ParseError {
                message: "Expected declaration after export".into(),
                location,
            });
        }
        Ok(ExportDeclaration::Declaration(declaration))
    }

    /// Exported names must be unique and local export lists must name
    /// declared bindings.
    pub(super) fn check_module_exports(&self, body: &[Rc<Statement>]) -> ParseResult<()> {
        let mut declared: Vec<Rc<str>> = var_declared_names(body);
        declared.extend(lexical_declarations(body, true).iter().map(|d| d.name()));
        for stmt in body {
            if let StatementKind::Import(import) = &stmt.kind {
                for spec in import.specifiers.iter() {
                    match spec {
                        ImportSpecifier::Named { local, .. }
                        | ImportSpecifier::Default(local)
                        | ImportSpecifier::Namespace(local) => declared.push(local.clone()),
                    }
                }
            }
        }

        let mut exported = FxHashSet::default();
        let mut add = |name: Rc<str>, location: SourceLocation| -> ParseResult<()> {
            if !exported.insert(name.clone()) {
                return Err(ParseError {
                    message: format!("Duplicate export of '{name}'"),
                    location,
                });
            }
            Ok(())
        };
        for stmt in body {
            let StatementKind::Export(export) = &stmt.kind else {
                continue;
            };
            match export {
                ExportDeclaration::Declaration(decl) => {
                    let mut names = Vec::new();
                    match &decl.kind {
                        StatementKind::Variable(v) => {
                            for d in v.declarations.iter() {
                                bound_names(&d.target, &mut names);
                            }
                        }
                        StatementKind::FunctionDeclaration(f) => names.extend(f.name.clone()),
                        StatementKind::ClassDeclaration(c) => names.extend(c.name.clone()),
                        _ => {}
                    }
                    for name in names {
                        add(name, stmt.location)?;
                    }
                }
                ExportDeclaration::Named { specifiers, source } => {
                    for spec in specifiers.iter() {
                        if source.is_none() && !declared.contains(&spec.local) {
                            return Err(ParseError {
                                message: format!("Export '{}' is not defined", spec.local),
                                location: stmt.location,
                            });
                        }
                        add(spec.exported.clone(), stmt.location)?;
                    }
                }
                ExportDeclaration::DefaultExpression(_)
                | ExportDeclaration::DefaultFunction(_)
                | ExportDeclaration::DefaultClass(_) => add(Rc::from("default"), stmt.location)?,
                ExportDeclaration::All { exported, .. } => {
                    if let Some(name) = exported {
                        add(name.clone(), stmt.location)?;
                    }
                }
            }
        }
        Ok(())
    }
}
