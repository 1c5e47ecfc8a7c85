//! Statement evaluation frames.

use std::rc::Rc;

use super::Realm;
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step, Syntax};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::environment::{EnvRef, EnvironmentRecord, LexicalEnvironment, ObjectRecord, resolve_binding};
use super::eval::{ClassBinding, ClassFrame};
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::{Trace, Tracer, trace_fields};
use super::instantiate;
use super::iteration::{close_iterator, get_iterator, next_value};
use super::operations::{strict_equality, to_boolean};
use super::pattern::{BindFrame, BindMode};
use crate::ast::{
    ExportDeclaration, Expression, ForHead, ForInit, FunctionNode, Pattern, Program, Statement, StatementKind,
    StatementList, VarKind, VariableDeclarator, bound_names,
};
use crate::error::EngineError;
use crate::types::{JsObject, JsValue, PropertyKey};

/// Runs a statement list, keeping the last non-empty completion value.
#[derive(Debug)]
struct Statements {
    body: StatementList,
    index: usize,
    value: Option<JsValue>,
}

impl Statements {
    fn new(body: StatementList) -> Self {
        Self {
            body,
            index: 0,
            value: None,
        }
    }

    /// Feeds the completion of the previous statement (if any) and returns
    /// the next step.
    fn advance(&mut self, context: &Rc<EvaluationContext>, completion: Option<Completion>) -> Step {
        match completion {
            Some(Completion::Normal(Some(v))) => self.value = Some(v),
            Some(Completion::Normal(None)) | None => {}
            Some(abrupt) => return Step::Done(abrupt.update_empty(self.value.take())),
        }
        match self.body.get(self.index) {
            Some(stmt) => {
                self.index += 1;
                Step::statement(stmt, context)
            }
            None => Step::Done(Completion::Normal(self.value.take())),
        }
    }
}

fn enter(kind: FrameKind, options: EvalOptions) -> Step {
    Command::enter(Frame::internal(kind), options).into()
}

/// Completion of a loop labelled with `labels` whose body completed with
/// `completion`. A break aimed at the loop itself ends it normally.
fn loop_exit(completion: Completion, value: &JsValue, labels: &[Rc<str>]) -> Completion {
    match completion.update_empty(Some(value.clone())) {
        Completion::Break(None, v) => Completion::Normal(v),
        Completion::Break(Some(label), v) if labels.contains(&label) => Completion::Normal(v),
        other => other,
    }
}

fn update_loop_value(value: &mut JsValue, completion: &Completion) {
    if let Completion::Normal(Some(v)) | Completion::Continue(_, Some(v)) = completion {
        *value = v.clone();
    }
}

#[derive(Debug)]
pub struct ScriptFrame {
    program: Rc<Program>,
    context: Rc<EvaluationContext>,
    statements: Statements,
    instantiated: bool,
}

impl ScriptFrame {
    pub fn new(program: Rc<Program>, context: Rc<EvaluationContext>) -> Self {
        let statements = Statements::new(program.body.clone());
        Self {
            program,
            context,
            statements,
            instantiated: false,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start if !self.instantiated => {
                self.instantiated = true;
                let program = self.program.clone();
                if let Err(error) = instantiate::global(realm, &program, &self.context.lexical) {
                    return Ok(Step::throw(error));
                }
                Ok(self.statements.advance(&self.context, None))
            }
            Resumption::Completion(completion) => Ok(self.statements.advance(&self.context, Some(completion))),
            other => Err(unexpected("script", &other)),
        }
    }
}

/// A statement list evaluated in an already instantiated scope (module bodies).
#[derive(Debug)]
pub struct StatementListFrame {
    context: Rc<EvaluationContext>,
    statements: Statements,
}

impl StatementListFrame {
    pub fn new(body: StatementList, context: Rc<EvaluationContext>) -> Self {
        Self {
            context,
            statements: Statements::new(body),
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(self.statements.advance(&self.context, None)),
            Resumption::Completion(completion) => Ok(self.statements.advance(&self.context, Some(completion))),
            other => Err(unexpected("statement-list", &other)),
        }
    }
}

#[derive(Debug)]
pub struct ExpressionStatementFrame {
    expr: Rc<Expression>,
    context: Rc<EvaluationContext>,
}

impl ExpressionStatementFrame {
    pub fn new(expr: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self { expr, context }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.expr, &self.context)),
            Resumption::Value(v) => Ok(Step::value(v)),
            other => Err(unexpected("expression-statement", &other)),
        }
    }
}

#[derive(Debug)]
pub struct BlockFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
    statements: Statements,
}

impl BlockFrame {
    pub fn new(stmt: Rc<Statement>, body: StatementList, context: Rc<EvaluationContext>) -> Self {
        Self {
            stmt,
            context,
            statements: Statements::new(body),
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                match instantiate::block(realm, &self.stmt, &self.context) {
                    Ok(Some(context)) => self.context = context,
                    Ok(None) => {}
                    Err(error) => return Ok(Step::throw(error)),
                }
                Ok(self.statements.advance(&self.context, None))
            }
            Resumption::Completion(completion) => Ok(self.statements.advance(&self.context, Some(completion))),
            other => Err(unexpected("block", &other)),
        }
    }
}

#[derive(Debug)]
pub struct VariableFrame {
    kind: VarKind,
    declarations: Rc<[VariableDeclarator]>,
    context: Rc<EvaluationContext>,
    index: usize,
    /// Waiting for the initializer of the current declarator.
    initializing: bool,
}

impl VariableFrame {
    pub fn new(kind: VarKind, declarations: Rc<[VariableDeclarator]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            kind,
            declarations,
            context,
            index: 0,
            initializing: false,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => self.next(realm),
            Resumption::Value(value) if self.initializing => {
                self.initializing = false;
                let declarations = self.declarations.clone();
                let declarator = &declarations[self.index];
                self.index += 1;
                if let Some(init) = &declarator.init {
                    realm.name_anonymous_function(init, &declarator.target, &value);
                }
                self.bind(realm, &declarator.target, value)
            }
            Resumption::Value(_) => self.next(realm),
            other => Err(unexpected("variable", &other)),
        }
    }

    fn next(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        while let Some(declarator) = self.declarations.get(self.index) {
            if let Some(init) = &declarator.init {
                self.initializing = true;
                return Ok(Step::evaluate(init, &self.context));
            }
            self.index += 1;
            if self.kind == VarKind::Var {
                continue;
            }
            // `let x;` initializes to undefined.
            if let Pattern::Identifier(name) = &*declarator.target
                && let Err(e) = self.context.lexical.initialize_binding(realm, name, JsValue::Undefined)
            {
                return Ok(Step::throw(realm.throw_fault(e.into())));
            }
        }
        Ok(Step::Done(Completion::empty()))
    }

    fn bind(&mut self, realm: &mut Realm, target: &Rc<Pattern>, value: JsValue) -> Result<Step, EngineError> {
        match (&**target, self.kind) {
            (Pattern::Identifier(name), VarKind::Var) => {
                let reference = resolve_binding(realm, &self.context.lexical, name, self.context.strict);
                Ok(Command::Host(HostOperation::PutValue(reference, value), EvalOptions::VALUE).into())
            }
            (Pattern::Identifier(name), _) => match self.context.lexical.initialize_binding(realm, name, value) {
                Ok(()) => self.next(realm),
                Err(e) => Ok(Step::throw(realm.throw_fault(e.into()))),
            },
            (_, kind) => {
                let mode = if kind == VarKind::Var {
                    BindMode::Assign
                } else {
                    BindMode::Initialize(self.context.lexical.clone())
                };
                let frame = BindFrame::new(target.clone(), value, mode, self.context.clone());
                Ok(enter(FrameKind::Bind(frame), EvalOptions::VALUE))
            }
        }
    }
}

#[derive(Debug)]
pub struct IfFrame {
    test: Rc<Expression>,
    consequent: Rc<Statement>,
    alternate: Option<Rc<Statement>>,
    context: Rc<EvaluationContext>,
}

impl IfFrame {
    pub fn new(
        test: Rc<Expression>,
        consequent: Rc<Statement>,
        alternate: Option<Rc<Statement>>,
        context: Rc<EvaluationContext>,
    ) -> Self {
        Self {
            test,
            consequent,
            alternate,
            context,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.test, &self.context)),
            Resumption::Value(test) => {
                let branch = if to_boolean(&test) {
                    Some(&self.consequent)
                } else {
                    self.alternate.as_ref()
                };
                Ok(match branch {
                    Some(stmt) => Step::statement(stmt, &self.context),
                    None => Step::value(JsValue::Undefined),
                })
            }
            Resumption::Completion(completion) => Ok(Step::Done(completion.update_empty(Some(JsValue::Undefined)))),
            other => Err(unexpected("if", &other)),
        }
    }
}

/// `while` and `do-while`.
#[derive(Debug)]
pub struct WhileFrame {
    test: Rc<Expression>,
    body: Rc<Statement>,
    do_while: bool,
    context: Rc<EvaluationContext>,
    labels: Rc<[Rc<str>]>,
    value: JsValue,
}

impl WhileFrame {
    pub fn new(
        test: Rc<Expression>,
        body: Rc<Statement>,
        do_while: bool,
        context: Rc<EvaluationContext>,
        labels: Rc<[Rc<str>]>,
    ) -> Self {
        Self {
            test,
            body,
            do_while,
            context,
            labels,
            value: JsValue::Undefined,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start if self.do_while => Ok(Step::statement(&self.body, &self.context)),
            Resumption::Start => Ok(Step::evaluate(&self.test, &self.context)),
            Resumption::Value(test) => Ok(if to_boolean(&test) {
                Step::statement(&self.body, &self.context)
            } else {
                Step::value(self.value.clone())
            }),
            Resumption::Completion(completion) => {
                if !completion.loop_continues(&self.labels) {
                    return Ok(Step::Done(loop_exit(completion, &self.value, &self.labels)));
                }
                update_loop_value(&mut self.value, &completion);
                Ok(Step::evaluate(&self.test, &self.context))
            }
            other => Err(unexpected("while", &other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForPhase {
    Init,
    Test,
    Body,
    Update,
}

#[derive(Debug)]
pub struct ForFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
    labels: Rc<[Rc<str>]>,
    /// `let` names copied into a fresh environment every iteration.
    per_iteration: Vec<Rc<str>>,
    value: JsValue,
    phase: ForPhase,
}

impl ForFrame {
    pub fn new(stmt: Rc<Statement>, context: Rc<EvaluationContext>, labels: Rc<[Rc<str>]>) -> Self {
        Self {
            stmt,
            context,
            labels,
            per_iteration: Vec::new(),
            value: JsValue::Undefined,
            phase: ForPhase::Init,
        }
    }

    fn parts(&self) -> Result<&crate::ast::ForStatement, EngineError> {
        match &self.stmt.kind {
            StatementKind::For(f) => Ok(f),
            _ => Err(EngineError::defect("for frame over a non-for statement")),
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (ForPhase::Init, Resumption::Start) => {
                let stmt = self.stmt.clone();
                let StatementKind::For(parts) = &stmt.kind else {
                    return Err(EngineError::defect("for frame over a non-for statement"));
                };
                match &parts.init {
                    Some(ForInit::Variable(decl)) => {
                        if decl.kind != VarKind::Var {
                            let env = LexicalEnvironment::declarative(&self.context.lexical);
                            let mut names = Vec::new();
                            for d in decl.declarations.iter() {
                                bound_names(&d.target, &mut names);
                            }
                            for name in &names {
                                let created = if decl.kind == VarKind::Const {
                                    env.create_immutable_binding(name, true)
                                } else {
                                    env.create_mutable_binding(realm, name, false)
                                };
                                if let Err(e) = created {
                                    return Ok(Step::throw(realm.throw_fault(e.into())));
                                }
                            }
                            if decl.kind == VarKind::Let {
                                self.per_iteration = names;
                            }
                            self.context = self.context.with_lexical(env);
                        }
                        let frame = VariableFrame::new(decl.kind, decl.declarations.clone(), self.context.clone());
                        Ok(enter(FrameKind::Variable(frame), EvalOptions::VALUE))
                    }
                    Some(ForInit::Expression(expr)) => Ok(Step::evaluate(expr, &self.context)),
                    None => self.first_iteration(realm),
                }
            }
            (ForPhase::Init, Resumption::Value(_)) => self.first_iteration(realm),
            (ForPhase::Test, Resumption::Value(test)) => {
                if to_boolean(&test) {
                    self.body()
                } else {
                    Ok(Step::value(self.value.clone()))
                }
            }
            (ForPhase::Body, Resumption::Completion(completion)) => {
                if !completion.loop_continues(&self.labels) {
                    return Ok(Step::Done(loop_exit(completion, &self.value, &self.labels)));
                }
                update_loop_value(&mut self.value, &completion);
                if let Err(error) = self.copy_iteration_environment(realm) {
                    return Ok(Step::throw(error));
                }
                match self.parts()?.update.clone() {
                    Some(update) => {
                        self.phase = ForPhase::Update;
                        Ok(Step::evaluate(&update, &self.context))
                    }
                    None => self.test(),
                }
            }
            (ForPhase::Update, Resumption::Value(_)) => self.test(),
            (_, input) => Err(unexpected("for", &input)),
        }
    }

    fn first_iteration(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        if let Err(error) = self.copy_iteration_environment(realm) {
            return Ok(Step::throw(error));
        }
        self.test()
    }

    fn test(&mut self) -> Result<Step, EngineError> {
        match self.parts()?.test.clone() {
            Some(test) => {
                self.phase = ForPhase::Test;
                Ok(Step::evaluate(&test, &self.context))
            }
            None => self.body(),
        }
    }

    fn body(&mut self) -> Result<Step, EngineError> {
        self.phase = ForPhase::Body;
        let body = self.parts()?.body.clone();
        Ok(Step::statement(&body, &self.context))
    }

    /// CreatePerIterationEnvironment: closures from the previous iteration
    /// keep the old bindings.
    fn copy_iteration_environment(&mut self, realm: &mut Realm) -> Result<(), JsValue> {
        if self.per_iteration.is_empty() {
            return Ok(());
        }
        let last = self.context.lexical.clone();
        let Some(outer) = last.outer.clone() else {
            return Ok(());
        };
        let next = LexicalEnvironment::declarative(&outer);
        for name in &self.per_iteration {
            let value = last
                .get_binding_value(realm, name, true)
                .map_err(|e| realm.throw_fault(e.into()))?;
            next.create_mutable_binding(realm, name, false)
                .and_then(|()| next.initialize_binding(realm, name, value))
                .map_err(|e| realm.throw_fault(e.into()))?;
        }
        self.context = self.context.with_lexical(next);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForInOfPhase {
    Right,
    Iterator,
    Next,
    Bind,
    Body,
    Closing,
}

#[derive(Debug)]
enum Source {
    Keys { object: JsObject, keys: Vec<Rc<str>>, index: usize },
    Iterator(JsValue),
}

/// `for-in` and `for-of`.
#[derive(Debug)]
pub struct ForInOfFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
    body_context: Rc<EvaluationContext>,
    labels: Rc<[Rc<str>]>,
    source: Option<Source>,
    value: JsValue,
    phase: ForInOfPhase,
}

impl ForInOfFrame {
    pub fn new(stmt: Rc<Statement>, context: Rc<EvaluationContext>, labels: Rc<[Rc<str>]>) -> Self {
        Self {
            stmt,
            body_context: context.clone(),
            context,
            labels,
            source: None,
            value: JsValue::Undefined,
            phase: ForInOfPhase::Right,
        }
    }

    fn parts(&self) -> Result<(&crate::ast::ForInOfStatement, bool), EngineError> {
        match &self.stmt.kind {
            StatementKind::ForIn(f) => Ok((f, false)),
            StatementKind::ForOf(f) => Ok((f, true)),
            _ => Err(EngineError::defect("for-in/of frame over another statement")),
        }
    }

    /// Environment with the loop's lexical names in their dead zone.
    fn declaration_env(&self, realm: &mut Realm, kind: VarKind, pattern: &Pattern) -> Result<EnvRef, JsValue> {
        let env = LexicalEnvironment::declarative(&self.context.lexical);
        let mut names = Vec::new();
        bound_names(pattern, &mut names);
        for name in &names {
            let created = if kind == VarKind::Const {
                env.create_immutable_binding(name, true)
            } else {
                env.create_mutable_binding(realm, name, false)
            };
            created.map_err(|e| realm.throw_fault(e.into()))?;
        }
        Ok(env)
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let stmt = self.stmt.clone();
        let (parts, is_of) = match &stmt.kind {
            StatementKind::ForIn(f) => (f, false),
            StatementKind::ForOf(f) => (f, true),
            _ => return Err(EngineError::defect("for-in/of frame over another statement")),
        };
        match (self.phase, input) {
            (ForInOfPhase::Right, Resumption::Start) => {
                let right_context = match &parts.left {
                    ForHead::Declaration(kind @ (VarKind::Let | VarKind::Const), pattern) => {
                        match self.declaration_env(realm, *kind, pattern) {
                            Ok(env) => self.context.with_lexical(env),
                            Err(error) => return Ok(Step::throw(error)),
                        }
                    }
                    _ => self.context.clone(),
                };
                Ok(Step::evaluate(&parts.right, &right_context))
            }
            (ForInOfPhase::Right, Resumption::Value(right)) => {
                if is_of {
                    self.phase = ForInOfPhase::Iterator;
                    return Ok(get_iterator(right).into());
                }
                if right.is_nullish() {
                    return Ok(Step::value(JsValue::Undefined));
                }
                let object = match realm.to_object(&right) {
                    Ok(o) => o,
                    Err(error) => return Ok(Step::throw(error)),
                };
                let keys = realm.for_in_keys(object);
                self.source = Some(Source::Keys { object, keys, index: 0 });
                self.next(realm)
            }
            (ForInOfPhase::Iterator, Resumption::Value(iterator)) => {
                self.source = Some(Source::Iterator(iterator));
                self.next(realm)
            }
            (ForInOfPhase::Next, Resumption::Completion(completion)) => match completion {
                Completion::Normal(Some(value)) => self.bind(realm, value),
                Completion::Normal(None) => Ok(Step::value(self.value.clone())),
                abrupt => Ok(Step::Done(abrupt)),
            },
            (ForInOfPhase::Bind, Resumption::Value(_)) => {
                self.phase = ForInOfPhase::Body;
                Ok(Step::statement(&parts.body, &self.body_context))
            }
            (ForInOfPhase::Bind, Resumption::Completion(thrown @ Completion::Throw(_))) => self.exit(thrown),
            (ForInOfPhase::Body, Resumption::Completion(completion)) => {
                if !completion.loop_continues(&self.labels) {
                    let completion = completion.update_empty(Some(self.value.clone()));
                    return self.exit(completion);
                }
                update_loop_value(&mut self.value, &completion);
                self.next(realm)
            }
            (ForInOfPhase::Closing, Resumption::Completion(completion)) => {
                Ok(Step::Done(loop_exit(completion, &self.value, &self.labels)))
            }
            (_, input) => Err(unexpected("for-in/of", &input)),
        }
    }

    fn next(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        match &mut self.source {
            Some(Source::Iterator(iterator)) => {
                self.phase = ForInOfPhase::Next;
                Ok(next_value(iterator.clone()).into())
            }
            Some(Source::Keys { object, keys, index }) => {
                while let Some(key) = keys.get(*index).cloned() {
                    *index += 1;
                    // Keys deleted during iteration are skipped.
                    if realm.has_property(*object, &PropertyKey::String(key.clone())) {
                        return self.bind(realm, JsValue::String(key));
                    }
                }
                Ok(Step::value(self.value.clone()))
            }
            None => Err(EngineError::defect("for-in/of stepped before its source was ready")),
        }
    }

    fn bind(&mut self, realm: &mut Realm, value: JsValue) -> Result<Step, EngineError> {
        let (parts, _) = self.parts()?;
        let (pattern, mode, context) = match &parts.left {
            ForHead::Declaration(VarKind::Var, pattern) | ForHead::Target(pattern) => {
                (pattern.clone(), BindMode::Assign, self.context.clone())
            }
            ForHead::Declaration(kind, pattern) => {
                let (kind, pattern) = (*kind, pattern.clone());
                let env = match self.declaration_env(realm, kind, &pattern) {
                    Ok(env) => env,
                    Err(error) => return self.exit(Completion::Throw(error)),
                };
                let context = self.context.with_lexical(env.clone());
                (pattern, BindMode::Initialize(env), context)
            }
        };
        self.body_context = context.clone();
        self.phase = ForInOfPhase::Bind;
        let frame = BindFrame::new(pattern, value, mode, context);
        Ok(enter(FrameKind::Bind(frame), EvalOptions::CATCH))
    }

    /// Leaves the loop with `completion`, closing a for-of iterator first.
    fn exit(&mut self, completion: Completion) -> Result<Step, EngineError> {
        match &self.source {
            Some(Source::Iterator(iterator)) => {
                self.phase = ForInOfPhase::Closing;
                Ok(close_iterator(iterator.clone(), completion).into())
            }
            _ => Ok(Step::Done(loop_exit(completion, &self.value, &self.labels))),
        }
    }
}

#[derive(Debug)]
pub struct ReturnFrame {
    argument: Option<Rc<Expression>>,
    context: Rc<EvaluationContext>,
}

impl ReturnFrame {
    pub fn new(argument: Option<Rc<Expression>>, context: Rc<EvaluationContext>) -> Self {
        Self { argument, context }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(match &self.argument {
                Some(arg) => Step::evaluate(arg, &self.context),
                None => Step::Done(Completion::Return(JsValue::Undefined)),
            }),
            Resumption::Value(v) => Ok(Step::Done(Completion::Return(v))),
            other => Err(unexpected("return", &other)),
        }
    }
}

#[derive(Debug)]
pub struct ThrowFrame {
    argument: Rc<Expression>,
    context: Rc<EvaluationContext>,
}

impl ThrowFrame {
    pub fn new(argument: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self { argument, context }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.argument, &self.context)),
            Resumption::Value(v) => Ok(Step::throw(v)),
            other => Err(unexpected("throw", &other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TryPhase {
    Block,
    CatchBinding,
    Handler,
    Finalizer,
}

#[derive(Debug)]
pub struct TryFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
    catch_context: Option<Rc<EvaluationContext>>,
    /// Completion pending while the finalizer runs.
    result: Option<Completion>,
    phase: TryPhase,
}

impl TryFrame {
    pub fn new(stmt: Rc<Statement>, context: Rc<EvaluationContext>) -> Self {
        Self {
            stmt,
            context,
            catch_context: None,
            result: None,
            phase: TryPhase::Block,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let stmt = self.stmt.clone();
        let StatementKind::Try(parts) = &stmt.kind else {
            return Err(EngineError::defect("try frame over a non-try statement"));
        };
        match (self.phase, input) {
            (TryPhase::Block, Resumption::Start) => Ok(Step::statement(&parts.block, &self.context)),
            (TryPhase::Block, Resumption::Completion(Completion::Throw(error))) if parts.handler.is_some() => {
                let Some(handler) = &parts.handler else {
                    return Err(EngineError::defect("catch clause vanished"));
                };
                let env = LexicalEnvironment::declarative(&self.context.lexical);
                let catch_context = self.context.with_lexical(env.clone());
                self.catch_context = Some(catch_context.clone());
                let Some(param) = &handler.param else {
                    self.phase = TryPhase::Handler;
                    return Ok(Step::statement(&handler.body, &catch_context));
                };
                let mut names = Vec::new();
                bound_names(param, &mut names);
                for name in &names {
                    if let Err(e) = env.create_mutable_binding(realm, name, false) {
                        return Err(EngineError::defect(format!("catch parameter: {e}")));
                    }
                }
                self.phase = TryPhase::CatchBinding;
                let frame = BindFrame::new(param.clone(), error, BindMode::Initialize(env), catch_context);
                Ok(enter(FrameKind::Bind(frame), EvalOptions::CATCH))
            }
            (TryPhase::Block | TryPhase::Handler, Resumption::Completion(completion)) => self.finalize(parts, completion),
            (TryPhase::CatchBinding, Resumption::Value(_)) => {
                let (Some(handler), Some(context)) = (&parts.handler, &self.catch_context) else {
                    return Err(EngineError::defect("catch clause vanished"));
                };
                self.phase = TryPhase::Handler;
                Ok(Step::statement(&handler.body, context))
            }
            (TryPhase::CatchBinding, Resumption::Completion(completion)) => self.finalize(parts, completion),
            (TryPhase::Finalizer, Resumption::Completion(completion)) => {
                if completion.is_abrupt() {
                    return Ok(Step::Done(completion));
                }
                let pending = self.result.take().unwrap_or_else(Completion::empty);
                Ok(Step::Done(pending.update_empty(Some(JsValue::Undefined))))
            }
            (_, input) => Err(unexpected("try", &input)),
        }
    }

    fn finalize(&mut self, parts: &crate::ast::TryStatement, completion: Completion) -> Result<Step, EngineError> {
        match &parts.finalizer {
            Some(finalizer) => {
                self.result = Some(completion);
                self.phase = TryPhase::Finalizer;
                Ok(Step::statement(finalizer, &self.context))
            }
            None => Ok(Step::Done(completion.update_empty(Some(JsValue::Undefined)))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchPhase {
    Discriminant,
    Test(usize),
    Body,
}

#[derive(Debug)]
pub struct SwitchFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
    discriminant: JsValue,
    /// Next statement to run as (case index, statement index).
    position: (usize, usize),
    value: JsValue,
    phase: SwitchPhase,
}

impl SwitchFrame {
    pub fn new(stmt: Rc<Statement>, context: Rc<EvaluationContext>) -> Self {
        Self {
            stmt,
            context,
            discriminant: JsValue::Undefined,
            position: (0, 0),
            value: JsValue::Undefined,
            phase: SwitchPhase::Discriminant,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let stmt = self.stmt.clone();
        let StatementKind::Switch(parts) = &stmt.kind else {
            return Err(EngineError::defect("switch frame over a non-switch statement"));
        };
        match (self.phase, input) {
            (SwitchPhase::Discriminant, Resumption::Start) => Ok(Step::evaluate(&parts.discriminant, &self.context)),
            (SwitchPhase::Discriminant, Resumption::Value(value)) => {
                self.discriminant = value;
                match instantiate::block(realm, &stmt, &self.context) {
                    Ok(Some(context)) => self.context = context,
                    Ok(None) => {}
                    Err(error) => return Ok(Step::throw(error)),
                }
                self.test(parts, 0)
            }
            (SwitchPhase::Test(n), Resumption::Value(test)) => {
                if strict_equality(&self.discriminant, &test) {
                    self.position = (n, 0);
                    self.phase = SwitchPhase::Body;
                    return self.run(parts);
                }
                self.test(parts, n + 1)
            }
            (SwitchPhase::Body, Resumption::Completion(completion)) => match completion {
                Completion::Normal(v) => {
                    if let Some(v) = v {
                        self.value = v;
                    }
                    self.run(parts)
                }
                Completion::Break(None, v) => Ok(Step::value(v.unwrap_or_else(|| self.value.clone()))),
                abrupt => Ok(Step::Done(abrupt.update_empty(Some(self.value.clone())))),
            },
            (_, input) => Err(unexpected("switch", &input)),
        }
    }

    /// Evaluates the test of case `n` or a later one, skipping `default`.
    fn test(&mut self, parts: &crate::ast::SwitchStatement, n: usize) -> Result<Step, EngineError> {
        for (index, case) in parts.cases.iter().enumerate().skip(n) {
            if let Some(test) = &case.test {
                self.phase = SwitchPhase::Test(index);
                return Ok(Step::evaluate(test, &self.context));
            }
        }
        match parts.cases.iter().position(|case| case.test.is_none()) {
            Some(default) => {
                self.position = (default, 0);
                self.phase = SwitchPhase::Body;
                self.run(parts)
            }
            None => Ok(Step::value(JsValue::Undefined)),
        }
    }

    /// Runs the next statement, falling through into later cases.
    fn run(&mut self, parts: &crate::ast::SwitchStatement) -> Result<Step, EngineError> {
        let (mut case, mut index) = self.position;
        while let Some(clause) = parts.cases.get(case) {
            if let Some(stmt) = clause.body.get(index) {
                self.position = (case, index + 1);
                return Ok(Step::statement(stmt, &self.context));
            }
            case += 1;
            index = 0;
        }
        self.position = (case, index);
        Ok(Step::value(self.value.clone()))
    }
}

#[derive(Debug)]
pub struct LabeledFrame {
    label: Rc<str>,
    body: Rc<Statement>,
    context: Rc<EvaluationContext>,
    labels: Rc<[Rc<str>]>,
}

impl LabeledFrame {
    pub fn new(label: Rc<str>, body: Rc<Statement>, context: Rc<EvaluationContext>, labels: Rc<[Rc<str>]>) -> Self {
        Self {
            label,
            body,
            context,
            labels,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                let mut labels = self.labels.to_vec();
                labels.push(self.label.clone());
                let context = self.context.with_labels(Rc::from(labels));
                Ok(Command::evaluate(Syntax::Statement(self.body.clone()), &context, EvalOptions::COMPLETION).into())
            }
            Resumption::Completion(Completion::Break(Some(label), value)) if label == self.label => {
                Ok(Step::Done(Completion::Normal(value)))
            }
            Resumption::Completion(completion) => Ok(Step::Done(completion)),
            other => Err(unexpected("labeled", &other)),
        }
    }
}

#[derive(Debug)]
pub struct WithFrame {
    object: Rc<Expression>,
    body: Rc<Statement>,
    context: Rc<EvaluationContext>,
}

impl WithFrame {
    pub fn new(object: Rc<Expression>, body: Rc<Statement>, context: Rc<EvaluationContext>) -> Self {
        Self { object, body, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.object, &self.context)),
            Resumption::Value(value) => {
                let object = match realm.to_object(&value) {
                    Ok(o) => o,
                    Err(error) => return Ok(Step::throw(error)),
                };
                let record = EnvironmentRecord::Object(ObjectRecord {
                    object,
                    with_environment: true,
                });
                let env = LexicalEnvironment::new(record, Some(self.context.lexical.clone()));
                Ok(Step::statement(&self.body, &self.context.with_lexical(env)))
            }
            Resumption::Completion(completion) => Ok(Step::Done(completion.update_empty(Some(JsValue::Undefined)))),
            other => Err(unexpected("with", &other)),
        }
    }
}

/// A function declaration statement. The function itself was hoisted; in
/// sloppy code a block-level function is also copied to the var scope when
/// its declaration is evaluated.
#[derive(Debug)]
pub struct FunctionDeclarationFrame {
    function: Rc<FunctionNode>,
    context: Rc<EvaluationContext>,
}

impl FunctionDeclarationFrame {
    pub fn new(function: Rc<FunctionNode>, context: Rc<EvaluationContext>) -> Self {
        Self { function, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        if !matches!(input, Resumption::Start) {
            return Err(unexpected("function-declaration", &input));
        }
        let context = &self.context;
        if !context.strict
            && !Rc::ptr_eq(&context.lexical, &context.variable)
            && let Some(name) = &self.function.name
            && matches!(context.lexical.record, EnvironmentRecord::Declarative(_))
            && context.lexical.has_binding(realm, name)
            && context.variable.has_binding(realm, name)
            && let Ok(value) = context.lexical.get_binding_value(realm, name, false)
        {
            // The var binding only exists when no lexical declaration blocks it.
            let _ = context.variable.set_mutable_binding(realm, name, value, false);
        }
        Ok(Step::Done(Completion::empty()))
    }
}

#[derive(Debug)]
pub struct ExportFrame {
    stmt: Rc<Statement>,
    context: Rc<EvaluationContext>,
}

impl ExportFrame {
    pub fn new(stmt: Rc<Statement>, context: Rc<EvaluationContext>) -> Self {
        Self { stmt, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let stmt = self.stmt.clone();
        let StatementKind::Export(export) = &stmt.kind else {
            return Err(EngineError::defect("export frame over a non-export statement"));
        };
        match (export, input) {
            (ExportDeclaration::Declaration(inner), Resumption::Start) => Ok(Step::statement(inner, &self.context)),
            (ExportDeclaration::DefaultExpression(expr), Resumption::Start) => Ok(Step::evaluate(expr, &self.context)),
            (ExportDeclaration::DefaultExpression(expr), Resumption::Value(value)) => {
                let name: Rc<str> = Rc::from("*default*");
                realm.name_if_anonymous(expr, &Rc::from("default"), &value);
                match self.context.lexical.initialize_binding(realm, &name, value) {
                    Ok(()) => Ok(Step::Done(Completion::empty())),
                    Err(e) => Ok(Step::throw(realm.throw_fault(e.into()))),
                }
            }
            (ExportDeclaration::DefaultClass(class), Resumption::Start) => {
                let frame = ClassFrame::new(class.clone(), self.context.clone(), ClassBinding::Declaration);
                Ok(enter(FrameKind::Class(frame), EvalOptions::COMPLETION))
            }
            (_, Resumption::Completion(completion)) => Ok(Step::Done(completion)),
            (_, Resumption::Start) => Ok(Step::Done(Completion::empty())),
            (_, other) => Err(unexpected("export", &other)),
        }
    }
}

impl Trace for Source {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Source::Keys { object, .. } => tracer.object(*object),
            Source::Iterator(iterator) => iterator.trace(tracer),
        }
    }
}

trace_fields! {
    Statements => value;
    ScriptFrame => context, statements;
    StatementListFrame => context, statements;
    ExpressionStatementFrame => context;
    BlockFrame => context, statements;
    VariableFrame => context;
    IfFrame => context;
    WhileFrame => context, value;
    ForFrame => context, value;
    ForInOfFrame => context, body_context, source, value;
    ReturnFrame => context;
    ThrowFrame => context;
    TryFrame => context, catch_context, result;
    SwitchFrame => context, discriminant, value;
    LabeledFrame => context;
    WithFrame => context;
    FunctionDeclarationFrame => context;
    ExportFrame => context;
}
