//! The protocol between evaluation frames and the coroutine driver.
//!
//! A frame never evaluates a child node or calls a function itself. It
//! returns a [`Step`] naming what it needs next and is resumed with the
//! answer as a [`Resumption`].

use std::rc::Rc;

use super::completion::Completion;
use super::context::EvaluationContext;
use super::frame::Frame;
use super::gc::{Trace, Tracer};
use super::reference::Reference;
use crate::ast::{Expression, Statement};
use crate::types::{JsObject, JsValue};

/// A node that can be handed to the driver for evaluation.
#[derive(Debug, Clone)]
pub enum Syntax {
    Statement(Rc<Statement>),
    Expression(Rc<Expression>),
}

/// How the driver delivers a child's result to the requesting frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    /// An abrupt completion skips the requesting frame and keeps unwinding.
    pub rethrow: bool,
    /// A normal completion is delivered as a plain value.
    pub for_normal_value: bool,
    /// The child may answer with a reference instead of a value.
    pub for_reference: bool,
}

impl EvalOptions {
    /// Deliver the raw completion.
    pub const COMPLETION: Self = Self {
        rethrow: false,
        for_normal_value: false,
        for_reference: false,
    };
    /// Deliver a value; abrupt completions unwind past the requester.
    pub const VALUE: Self = Self {
        rethrow: true,
        for_normal_value: true,
        for_reference: false,
    };
    /// Deliver a value, or a throw as a completion. Used at function and job
    /// boundaries that must observe exceptions.
    pub const CATCH: Self = Self {
        rethrow: false,
        for_normal_value: true,
        for_reference: false,
    };
    /// Deliver a reference; abrupt completions unwind past the requester.
    pub const REFERENCE: Self = Self {
        rethrow: true,
        for_normal_value: true,
        for_reference: true,
    };
}

#[derive(Debug)]
pub enum Command {
    Evaluate {
        node: Syntax,
        context: Rc<EvaluationContext>,
        options: EvalOptions,
    },
    /// Suspend until the value settles.
    Await(JsValue),
    /// Yield a value out of the enclosing generator.
    Produce(JsValue),
    Host(HostOperation, EvalOptions),
}

#[derive(Debug)]
pub enum HostOperation {
    Call {
        callee: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
    Construct {
        callee: JsValue,
        args: Vec<JsValue>,
        new_target: JsValue,
    },
    GetValue(Reference),
    PutValue(Reference, JsValue),
    /// Push an engine-internal frame.
    Enter(Box<Frame>),
    /// A generator finished instantiation and suspends before its body.
    GeneratorStart(JsObject),
}

/// Input handed to a frame when it is resumed.
#[derive(Debug)]
pub enum Resumption {
    Start,
    Completion(Completion),
    Value(JsValue),
    Reference(Reference),
}

impl Trace for Resumption {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Resumption::Start => {}
            Resumption::Completion(completion) => completion.trace(tracer),
            Resumption::Value(value) => value.trace(tracer),
            Resumption::Reference(reference) => reference.trace(tracer),
        }
    }
}

/// A frame's answer to being resumed.
#[derive(Debug)]
pub enum Step {
    Command(Command),
    Done(Completion),
    Reference(Reference),
}

impl Command {
    pub fn evaluate(node: Syntax, context: &Rc<EvaluationContext>, options: EvalOptions) -> Self {
        Command::Evaluate {
            node,
            context: context.clone(),
            options,
        }
    }

    pub fn expression(expr: &Rc<Expression>, context: &Rc<EvaluationContext>) -> Self {
        Self::evaluate(Syntax::Expression(expr.clone()), context, EvalOptions::VALUE)
    }

    pub fn reference(expr: &Rc<Expression>, context: &Rc<EvaluationContext>) -> Self {
        Self::evaluate(Syntax::Expression(expr.clone()), context, EvalOptions::REFERENCE)
    }

    pub fn statement(stmt: &Rc<Statement>, context: &Rc<EvaluationContext>) -> Self {
        Self::evaluate(Syntax::Statement(stmt.clone()), context, EvalOptions::COMPLETION)
    }

    pub fn call(callee: JsValue, this: JsValue, args: Vec<JsValue>) -> Self {
        Command::Host(HostOperation::Call { callee, this, args }, EvalOptions::VALUE)
    }

    /// A call whose throw is delivered back as a completion.
    pub fn call_catching(callee: JsValue, this: JsValue, args: Vec<JsValue>) -> Self {
        Command::Host(HostOperation::Call { callee, this, args }, EvalOptions::CATCH)
    }

    pub fn enter(frame: Frame, options: EvalOptions) -> Self {
        Command::Host(HostOperation::Enter(Box::new(frame)), options)
    }
}

impl Step {
    pub fn value(value: JsValue) -> Self {
        Step::Done(Completion::normal(value))
    }

    pub fn throw(value: JsValue) -> Self {
        Step::Done(Completion::Throw(value))
    }

    pub fn evaluate(expr: &Rc<Expression>, context: &Rc<EvaluationContext>) -> Self {
        Step::Command(Command::expression(expr, context))
    }

    pub fn statement(stmt: &Rc<Statement>, context: &Rc<EvaluationContext>) -> Self {
        Step::Command(Command::statement(stmt, context))
    }

    pub fn reference(expr: &Rc<Expression>, context: &Rc<EvaluationContext>) -> Self {
        Step::Command(Command::reference(expr, context))
    }
}

impl From<Command> for Step {
    fn from(command: Command) -> Self {
        Step::Command(command)
    }
}
