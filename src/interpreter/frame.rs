//! Evaluation frames.
//!
//! Every syntactic form with sub-evaluations gets an explicit state machine.
//! [`Frame::resume`] is the single dispatch point: one exhaustive match over
//! every frame kind the engine has.

use std::rc::Rc;

use super::Realm;
use super::builtins::array::ArrayCallbackFrame;
use super::builtins::promise::{ExecutorFrame, FinallyFrame, ReactionFrame, ThenableFrame};
use super::call::{FunctionFrame, InvocationKind, InvokeFrame};
use super::command::{Resumption, Step, Syntax};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::eval::*;
use super::exec::*;
use super::gc::{Trace, Tracer, trace_fields};
use super::iteration::{CloseIteratorFrame, GetIteratorFrame, IterateFrame, NextValueFrame};
use super::module::ModuleGraphFrame;
use super::pattern::BindFrame;
use super::suspend::WakeFrame;
use crate::ast::{ExpressionKind, StatementKind};
use crate::error::EngineError;
use crate::lexer::SourceLocation;

#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub location: Option<SourceLocation>,
}

#[derive(Debug)]
pub enum FrameKind {
    /// A node whose completion is known without further evaluation.
    Complete(Option<Completion>),

    // Statements.
    Script(ScriptFrame),
    StatementList(StatementListFrame),
    ExpressionStatement(ExpressionStatementFrame),
    Block(BlockFrame),
    Variable(VariableFrame),
    If(IfFrame),
    While(WhileFrame),
    For(ForFrame),
    ForInOf(ForInOfFrame),
    Return(ReturnFrame),
    Throw(ThrowFrame),
    Try(TryFrame),
    Switch(SwitchFrame),
    Labeled(LabeledFrame),
    With(WithFrame),
    FunctionDeclaration(FunctionDeclarationFrame),
    Export(ExportFrame),

    // Expressions.
    Identifier(IdentifierFrame),
    This(ThisFrame),
    NewTarget(NewTargetFrame),
    Closure(ClosureFrame),
    Class(ClassFrame),
    ArrayLiteral(ArrayLiteralFrame),
    ObjectLiteral(ObjectLiteralFrame),
    Unary(UnaryFrame),
    Update(UpdateFrame),
    Binary(BinaryFrame),
    Logical(LogicalFrame),
    Assign(AssignFrame),
    Conditional(ConditionalFrame),
    Call(CallFrame),
    New(NewFrame),
    Member(MemberFrame),
    SuperMember(SuperMemberFrame),
    SuperCall(SuperCallFrame),
    Sequence(SequenceFrame),
    Yield(YieldFrame),
    Await(AwaitFrame),

    // Bindings and iteration.
    Bind(BindFrame),
    GetIterator(GetIteratorFrame),
    NextValue(NextValueFrame),
    CloseIterator(CloseIteratorFrame),
    Iterate(IterateFrame),

    // Invocations and host-driven work.
    Function(FunctionFrame),
    Invoke(InvokeFrame),
    ArrayCallback(ArrayCallbackFrame),
    PromiseExecutor(ExecutorFrame),
    Reaction(ReactionFrame),
    ResolveThenable(ThenableFrame),
    Finally(FinallyFrame),
    Wake(WakeFrame),
    ModuleGraph(ModuleGraphFrame),
}

impl Frame {
    pub fn internal(kind: FrameKind) -> Self {
        Self { kind, location: None }
    }

    pub fn at(kind: FrameKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location: Some(location),
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        self.location
    }

    pub fn is_function_boundary(&self) -> bool {
        matches!(self.kind, FrameKind::Function(_))
    }

    pub fn invocation_kind(&self) -> Option<&InvocationKind> {
        match &self.kind {
            FrameKind::Function(f) => Some(f.kind()),
            _ => None,
        }
    }

    /// Builds the frame that evaluates `node`. Loops and labelled statements
    /// take the label set from the context; every other frame sees a
    /// context without labels.
    pub fn for_node(node: &Syntax, context: &Rc<EvaluationContext>) -> Frame {
        match node {
            Syntax::Statement(stmt) => {
                let labels = context.labels.clone();
                let ctx = context.without_labels();
                let kind = match &stmt.kind {
                    StatementKind::Empty | StatementKind::Debugger | StatementKind::Import(_) => {
                        FrameKind::Complete(Some(Completion::empty()))
                    }
                    StatementKind::Break(label) => FrameKind::Complete(Some(Completion::Break(label.clone(), None))),
                    StatementKind::Continue(label) => {
                        FrameKind::Complete(Some(Completion::Continue(label.clone(), None)))
                    }
                    StatementKind::Expression(expr) => {
                        FrameKind::ExpressionStatement(ExpressionStatementFrame::new(expr.clone(), ctx))
                    }
                    StatementKind::Block(body) => FrameKind::Block(BlockFrame::new(stmt.clone(), body.clone(), ctx)),
                    StatementKind::Variable(decl) => {
                        FrameKind::Variable(VariableFrame::new(decl.kind, decl.declarations.clone(), ctx))
                    }
                    StatementKind::If {
                        test,
                        consequent,
                        alternate,
                    } => FrameKind::If(IfFrame::new(test.clone(), consequent.clone(), alternate.clone(), ctx)),
                    StatementKind::While { test, body } => {
                        FrameKind::While(WhileFrame::new(test.clone(), body.clone(), false, ctx, labels))
                    }
                    StatementKind::DoWhile { body, test } => {
                        FrameKind::While(WhileFrame::new(test.clone(), body.clone(), true, ctx, labels))
                    }
                    StatementKind::For(_) => FrameKind::For(ForFrame::new(stmt.clone(), ctx, labels)),
                    StatementKind::ForIn(_) | StatementKind::ForOf(_) => {
                        FrameKind::ForInOf(ForInOfFrame::new(stmt.clone(), ctx, labels))
                    }
                    StatementKind::Return(arg) => FrameKind::Return(ReturnFrame::new(arg.clone(), ctx)),
                    StatementKind::Throw(arg) => FrameKind::Throw(ThrowFrame::new(arg.clone(), ctx)),
                    StatementKind::Try(_) => FrameKind::Try(TryFrame::new(stmt.clone(), ctx)),
                    StatementKind::Switch(_) => FrameKind::Switch(SwitchFrame::new(stmt.clone(), ctx)),
                    StatementKind::Labeled(label, body) => {
                        FrameKind::Labeled(LabeledFrame::new(label.clone(), body.clone(), ctx, labels))
                    }
                    StatementKind::With(object, body) => {
                        FrameKind::With(WithFrame::new(object.clone(), body.clone(), ctx))
                    }
                    StatementKind::FunctionDeclaration(f) => {
                        FrameKind::FunctionDeclaration(FunctionDeclarationFrame::new(f.clone(), ctx))
                    }
                    StatementKind::ClassDeclaration(class) => {
                        FrameKind::Class(ClassFrame::new(class.clone(), ctx, ClassBinding::Declaration))
                    }
                    StatementKind::Export(_) => FrameKind::Export(ExportFrame::new(stmt.clone(), ctx)),
                };
                Frame::at(kind, stmt.location)
            }
            Syntax::Expression(expr) => {
                let ctx = context.without_labels();
                let kind = match &expr.kind {
                    ExpressionKind::Literal(lit) => FrameKind::Complete(Some(Completion::normal(literal_value(lit)))),
                    ExpressionKind::Identifier(name) => FrameKind::Identifier(IdentifierFrame::new(name.clone(), ctx)),
                    ExpressionKind::This => FrameKind::This(ThisFrame::new(ctx)),
                    ExpressionKind::NewTarget => FrameKind::NewTarget(NewTargetFrame::new(ctx)),
                    ExpressionKind::Function(f) | ExpressionKind::Arrow(f) => {
                        FrameKind::Closure(ClosureFrame::new(f.clone(), ctx))
                    }
                    ExpressionKind::Class(class) => {
                        FrameKind::Class(ClassFrame::new(class.clone(), ctx, ClassBinding::Expression))
                    }
                    ExpressionKind::Array(elements) => {
                        FrameKind::ArrayLiteral(ArrayLiteralFrame::new(elements.clone(), ctx))
                    }
                    ExpressionKind::Object(props) => {
                        FrameKind::ObjectLiteral(ObjectLiteralFrame::new(props.clone(), ctx))
                    }
                    ExpressionKind::Unary(op, arg) => FrameKind::Unary(UnaryFrame::new(*op, arg.clone(), ctx)),
                    ExpressionKind::Update {
                        increment,
                        prefix,
                        target,
                    } => FrameKind::Update(UpdateFrame::new(*increment, *prefix, target.clone(), ctx)),
                    ExpressionKind::Binary(op, left, right) => {
                        FrameKind::Binary(BinaryFrame::new(*op, left.clone(), right.clone(), ctx))
                    }
                    ExpressionKind::Logical(op, left, right) => {
                        FrameKind::Logical(LogicalFrame::new(*op, left.clone(), right.clone(), ctx))
                    }
                    ExpressionKind::Assign {
                        operator,
                        target,
                        value,
                    } => FrameKind::Assign(AssignFrame::new(*operator, target.clone(), value.clone(), ctx)),
                    ExpressionKind::Conditional(test, consequent, alternate) => FrameKind::Conditional(
                        ConditionalFrame::new(test.clone(), consequent.clone(), alternate.clone(), ctx),
                    ),
                    ExpressionKind::Call(callee, args) => {
                        FrameKind::Call(CallFrame::new(callee.clone(), args.clone(), ctx))
                    }
                    ExpressionKind::New(callee, args) => FrameKind::New(NewFrame::new(callee.clone(), args.clone(), ctx)),
                    ExpressionKind::Member(object, property) => {
                        FrameKind::Member(MemberFrame::new(object.clone(), property.clone(), ctx))
                    }
                    ExpressionKind::SuperMember(property) => {
                        FrameKind::SuperMember(SuperMemberFrame::new(property.clone(), ctx))
                    }
                    ExpressionKind::SuperCall(args) => FrameKind::SuperCall(SuperCallFrame::new(args.clone(), ctx)),
                    ExpressionKind::Sequence(exprs) => FrameKind::Sequence(SequenceFrame::new(exprs.clone(), ctx)),
                    ExpressionKind::Yield(arg) => FrameKind::Yield(YieldFrame::new(arg.clone(), ctx)),
                    ExpressionKind::Await(arg) => FrameKind::Await(AwaitFrame::new(arg.clone(), ctx)),
                };
                Frame::at(kind, expr.location)
            }
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match &mut self.kind {
            FrameKind::Complete(completion) => completion
                .take()
                .map(Step::Done)
                .ok_or_else(|| EngineError::defect("completed frame resumed twice")),
            FrameKind::Script(f) => f.resume(realm, input),
            FrameKind::StatementList(f) => f.resume(realm, input),
            FrameKind::ExpressionStatement(f) => f.resume(realm, input),
            FrameKind::Block(f) => f.resume(realm, input),
            FrameKind::Variable(f) => f.resume(realm, input),
            FrameKind::If(f) => f.resume(realm, input),
            FrameKind::While(f) => f.resume(realm, input),
            FrameKind::For(f) => f.resume(realm, input),
            FrameKind::ForInOf(f) => f.resume(realm, input),
            FrameKind::Return(f) => f.resume(realm, input),
            FrameKind::Throw(f) => f.resume(realm, input),
            FrameKind::Try(f) => f.resume(realm, input),
            FrameKind::Switch(f) => f.resume(realm, input),
            FrameKind::Labeled(f) => f.resume(realm, input),
            FrameKind::With(f) => f.resume(realm, input),
            FrameKind::FunctionDeclaration(f) => f.resume(realm, input),
            FrameKind::Export(f) => f.resume(realm, input),
            FrameKind::Identifier(f) => f.resume(realm, input),
            FrameKind::This(f) => f.resume(realm, input),
            FrameKind::NewTarget(f) => f.resume(realm, input),
            FrameKind::Closure(f) => f.resume(realm, input),
            FrameKind::Class(f) => f.resume(realm, input),
            FrameKind::ArrayLiteral(f) => f.resume(realm, input),
            FrameKind::ObjectLiteral(f) => f.resume(realm, input),
            FrameKind::Unary(f) => f.resume(realm, input),
            FrameKind::Update(f) => f.resume(realm, input),
            FrameKind::Binary(f) => f.resume(realm, input),
            FrameKind::Logical(f) => f.resume(realm, input),
            FrameKind::Assign(f) => f.resume(realm, input),
            FrameKind::Conditional(f) => f.resume(realm, input),
            FrameKind::Call(f) => f.resume(realm, input),
            FrameKind::New(f) => f.resume(realm, input),
            FrameKind::Member(f) => f.resume(realm, input),
            FrameKind::SuperMember(f) => f.resume(realm, input),
            FrameKind::SuperCall(f) => f.resume(realm, input),
            FrameKind::Sequence(f) => f.resume(realm, input),
            FrameKind::Yield(f) => f.resume(realm, input),
            FrameKind::Await(f) => f.resume(realm, input),
            FrameKind::Bind(f) => f.resume(realm, input),
            FrameKind::GetIterator(f) => f.resume(realm, input),
            FrameKind::NextValue(f) => f.resume(realm, input),
            FrameKind::CloseIterator(f) => f.resume(realm, input),
            FrameKind::Iterate(f) => f.resume(realm, input),
            FrameKind::Function(f) => f.resume(realm, input),
            FrameKind::Invoke(f) => f.resume(realm, input),
            FrameKind::ArrayCallback(f) => f.resume(realm, input),
            FrameKind::PromiseExecutor(f) => f.resume(realm, input),
            FrameKind::Reaction(f) => f.resume(realm, input),
            FrameKind::ResolveThenable(f) => f.resume(realm, input),
            FrameKind::Finally(f) => f.resume(realm, input),
            FrameKind::Wake(f) => f.resume(realm, input),
            FrameKind::ModuleGraph(f) => f.resume(realm, input),
        }
    }
}

/// Input a frame did not expect in its current state.
pub fn unexpected(frame: &str, input: &Resumption) -> EngineError {
    EngineError::defect(format!("{frame} frame resumed with unexpected {input:?}"))
}

impl Trace for FrameKind {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            FrameKind::Complete(completion) => completion.trace(tracer),
            FrameKind::Script(f) => f.trace(tracer),
            FrameKind::StatementList(f) => f.trace(tracer),
            FrameKind::ExpressionStatement(f) => f.trace(tracer),
            FrameKind::Block(f) => f.trace(tracer),
            FrameKind::Variable(f) => f.trace(tracer),
            FrameKind::If(f) => f.trace(tracer),
            FrameKind::While(f) => f.trace(tracer),
            FrameKind::For(f) => f.trace(tracer),
            FrameKind::ForInOf(f) => f.trace(tracer),
            FrameKind::Return(f) => f.trace(tracer),
            FrameKind::Throw(f) => f.trace(tracer),
            FrameKind::Try(f) => f.trace(tracer),
            FrameKind::Switch(f) => f.trace(tracer),
            FrameKind::Labeled(f) => f.trace(tracer),
            FrameKind::With(f) => f.trace(tracer),
            FrameKind::FunctionDeclaration(f) => f.trace(tracer),
            FrameKind::Export(f) => f.trace(tracer),
            FrameKind::Identifier(f) => f.trace(tracer),
            FrameKind::This(f) => f.trace(tracer),
            FrameKind::NewTarget(f) => f.trace(tracer),
            FrameKind::Closure(f) => f.trace(tracer),
            FrameKind::Class(f) => f.trace(tracer),
            FrameKind::ArrayLiteral(f) => f.trace(tracer),
            FrameKind::ObjectLiteral(f) => f.trace(tracer),
            FrameKind::Unary(f) => f.trace(tracer),
            FrameKind::Update(f) => f.trace(tracer),
            FrameKind::Binary(f) => f.trace(tracer),
            FrameKind::Logical(f) => f.trace(tracer),
            FrameKind::Assign(f) => f.trace(tracer),
            FrameKind::Conditional(f) => f.trace(tracer),
            FrameKind::Call(f) => f.trace(tracer),
            FrameKind::New(f) => f.trace(tracer),
            FrameKind::Member(f) => f.trace(tracer),
            FrameKind::SuperMember(f) => f.trace(tracer),
            FrameKind::SuperCall(f) => f.trace(tracer),
            FrameKind::Sequence(f) => f.trace(tracer),
            FrameKind::Yield(f) => f.trace(tracer),
            FrameKind::Await(f) => f.trace(tracer),
            FrameKind::Bind(f) => f.trace(tracer),
            FrameKind::GetIterator(f) => f.trace(tracer),
            FrameKind::NextValue(f) => f.trace(tracer),
            FrameKind::CloseIterator(f) => f.trace(tracer),
            FrameKind::Iterate(f) => f.trace(tracer),
            FrameKind::Function(f) => f.trace(tracer),
            FrameKind::Invoke(f) => f.trace(tracer),
            FrameKind::ArrayCallback(f) => f.trace(tracer),
            FrameKind::PromiseExecutor(f) => f.trace(tracer),
            FrameKind::Reaction(f) => f.trace(tracer),
            FrameKind::ResolveThenable(f) => f.trace(tracer),
            FrameKind::Finally(f) => f.trace(tracer),
            FrameKind::Wake(f) => f.trace(tracer),
            FrameKind::ModuleGraph(_) => {}
        }
    }
}

trace_fields! {
    Frame => kind;
}
