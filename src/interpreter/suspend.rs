//! The suspension bridge.
//!
//! `await` and `yield` both cut the coroutine at the innermost function
//! boundary. The frames above the cut belong to the suspended invocation:
//! an async function parks them on a promise reaction, a generator keeps
//! them in its object. The frames below the cut carry on with the
//! invocation's visible result (its promise, or an iterator result).
//!
//! An `await` with no enclosing function (module top level) cannot be cut
//! off, so the whole coroutine blocks on a wake-up instead.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::Realm;
use super::builtins::promise::ReactionFrame;
use super::call::InvocationKind;
use super::command::{Resumption, Step};
use super::completion::Completion;
use super::driver::{Coroutine, FrameSlot, StepResult, WakeId};
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::{Trace, Tracer, trace_fields};
use super::object::{GeneratorStatus, ObjectKind};
use crate::error::EngineError;
use crate::types::{JsObject, JsValue};

/// Something waiting for a promise to settle.
#[derive(Debug)]
pub enum PromiseReaction {
    /// A `then` handler whose result settles the derived promise.
    Handler {
        capability: Option<JsObject>,
        handler: JsValue,
    },
    /// An async invocation suspended on the promise. The same cell sits on
    /// both reaction lists; whichever list fires takes the frames.
    Resume(Rc<RefCell<Option<Vec<FrameSlot>>>>),
    /// A coroutine blocked on a top-level await.
    Wake(WakeId),
}

impl PromiseReaction {
    /// The job that runs this reaction for a promise settled with `argument`.
    pub(crate) fn into_job(self, argument: JsValue, rejected: bool) -> Option<Coroutine> {
        let input = |argument: JsValue| {
            if rejected {
                Resumption::Completion(Completion::Throw(argument))
            } else {
                Resumption::Value(argument)
            }
        };
        match self {
            PromiseReaction::Handler { capability, handler } => Some(Coroutine::new(Frame::internal(
                FrameKind::Reaction(ReactionFrame::new(capability, handler, argument, rejected)),
            ))),
            PromiseReaction::Resume(parked) => {
                let frames = parked.borrow_mut().take()?;
                Some(Coroutine::resumed(frames, input(argument)))
            }
            PromiseReaction::Wake(wake) => Some(Coroutine::new(Frame::internal(FrameKind::Wake(WakeFrame::new(
                wake,
                input(argument),
            ))))),
        }
    }
}

/// Suspends the running invocation until `value` settles.
pub(crate) fn await_value(co: &mut Coroutine, realm: &mut Realm, value: JsValue) -> Result<StepResult, EngineError> {
    let promise = realm.promise_resolve(value);
    let Some(index) = co.innermost_boundary() else {
        let wake = realm.allocate_wake();
        trace!(wake = wake.0, "top-level await suspended");
        realm.add_reactions(promise, PromiseReaction::Wake(wake), PromiseReaction::Wake(wake));
        co.blocked = Some(wake);
        return Ok(StepResult::Blocked);
    };
    let async_promise = match co.frames[index].frame.invocation_kind() {
        Some(InvocationKind::Async(p)) => *p,
        other => return Err(EngineError::defect(format!("await inside a {other:?} invocation"))),
    };
    let options = co.frames[index].options;
    let frames = co.split_off(index);
    trace!(frames = frames.len(), "async invocation suspended");
    let parked = Rc::new(RefCell::new(Some(frames)));
    realm.add_reactions(
        promise,
        PromiseReaction::Resume(parked.clone()),
        PromiseReaction::Resume(parked),
    );
    co.deliver(Completion::normal(JsValue::Object(async_promise)), options)
}

/// Index of the boundary frame of `generator`'s running invocation.
fn generator_boundary(co: &Coroutine, generator: Option<JsObject>) -> Result<(usize, JsObject), EngineError> {
    let index = co
        .innermost_boundary()
        .ok_or_else(|| EngineError::defect("yield outside any function"))?;
    match co.frames[index].frame.invocation_kind() {
        Some(InvocationKind::Generator(g)) if generator.is_none_or(|expected| expected == *g) => Ok((index, *g)),
        other => Err(EngineError::defect(format!("yield inside a {other:?} invocation"))),
    }
}

/// Suspends the running generator body, handing `value` to its consumer.
pub(crate) fn produce(co: &mut Coroutine, realm: &mut Realm, value: JsValue) -> Result<StepResult, EngineError> {
    let (index, generator) = generator_boundary(co, None)?;
    let options = co.frames[index].options;
    let frames = co.split_off(index);
    trace!(generator = generator.id, "generator yielded");
    realm.park_generator(generator, frames, GeneratorStatus::SuspendedYield);
    let result = realm.create_iter_result_object(value, false);
    co.deliver(Completion::normal(result), options)
}

/// Parks a freshly instantiated generator body before its first statement
/// and returns the generator object to the caller.
pub(crate) fn start_generator(co: &mut Coroutine, realm: &mut Realm, generator: JsObject) -> Result<StepResult, EngineError> {
    let (index, generator) = generator_boundary(co, Some(generator))?;
    let options = co.frames[index].options;
    let frames = co.split_off(index);
    realm.park_generator(generator, frames, GeneratorStatus::SuspendedStart);
    co.deliver(Completion::normal(JsValue::Object(generator)), options)
}

impl Realm {
    pub(crate) fn park_generator(&mut self, generator: JsObject, frames: Vec<FrameSlot>, status: GeneratorStatus) {
        if let ObjectKind::Generator(data) = &mut self.object_mut(generator).kind {
            data.frames = frames;
            data.status = status;
        }
    }

    /// Takes a suspended generator's frames and marks it executing.
    pub(crate) fn unpark_generator(&mut self, generator: JsObject) -> Vec<FrameSlot> {
        match &mut self.object_mut(generator).kind {
            ObjectKind::Generator(data) => {
                data.status = GeneratorStatus::Executing;
                std::mem::take(&mut data.frames)
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn allocate_wake(&mut self) -> WakeId {
        self.next_wake += 1;
        WakeId(self.next_wake)
    }

    pub(crate) fn settle_wake(&mut self, wake: WakeId, input: Resumption) {
        self.wakes.insert(wake, input);
    }

    /// Resumption input for a blocked coroutine, once its await settled.
    pub fn take_wake(&mut self, wake: WakeId) -> Option<Resumption> {
        self.wakes.remove(&wake)
    }
}

/// Root frame of the job that delivers a settled top-level await.
#[derive(Debug)]
pub struct WakeFrame {
    wake: WakeId,
    input: Option<Resumption>,
}

impl WakeFrame {
    pub fn new(wake: WakeId, input: Resumption) -> Self {
        Self {
            wake,
            input: Some(input),
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (input, self.input.take()) {
            (Resumption::Start, Some(settled)) => {
                trace!(wake = self.wake.0, "top-level await settled");
                realm.settle_wake(self.wake, settled);
                Ok(Step::Done(Completion::empty()))
            }
            (input, _) => Err(unexpected("wake", &input)),
        }
    }
}

impl Trace for PromiseReaction {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            PromiseReaction::Handler { capability, handler } => {
                capability.trace(tracer);
                handler.trace(tracer);
            }
            PromiseReaction::Resume(parked) => parked.trace(tracer),
            PromiseReaction::Wake(_) => {}
        }
    }
}

trace_fields! {
    WakeFrame => input;
}
