//! Coroutine driver.
//!
//! A coroutine is an explicit stack of evaluation frames. Each call to
//! [`Coroutine::step`] resumes the top frame exactly once and acts on the
//! [`Step`] it returns; that is the unit of work the scheduler counts.

use tracing::{debug, trace};

use super::Realm;
use super::call::{self, CallOutcome};
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step};
use super::completion::Completion;
use super::frame::Frame;
use super::gc::trace_fields;
use super::reference::Access;
use super::suspend;
use crate::error::EngineError;
use crate::lexer::SourceLocation;

/// A frame together with how its result goes back to the frame below it.
#[derive(Debug)]
pub struct FrameSlot {
    pub frame: Frame,
    pub options: EvalOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeId(pub u64);

/// Observable state of a coroutine after one step.
#[derive(Debug)]
pub enum StepResult {
    Running,
    /// Suspended on a top-level await.
    Blocked,
    Finished(Completion),
}

#[derive(Debug, Default)]
pub struct Coroutine {
    pub(crate) frames: Vec<FrameSlot>,
    pub(crate) pending: Option<Resumption>,
    pub(crate) blocked: Option<WakeId>,
    result: Option<Completion>,
    /// Function boundary frames on the stack.
    calls: usize,
}

fn count_calls(frames: &[FrameSlot]) -> usize {
    frames.iter().filter(|slot| slot.frame.is_function_boundary()).count()
}

impl Coroutine {
    pub fn new(frame: Frame) -> Self {
        let calls = usize::from(frame.is_function_boundary());
        Self {
            calls,
            frames: vec![FrameSlot {
                frame,
                options: EvalOptions::COMPLETION,
            }],
            pending: Some(Resumption::Start),
            blocked: None,
            result: None,
        }
    }

    /// A coroutine continuing previously suspended frames.
    pub fn resumed(mut frames: Vec<FrameSlot>, input: Resumption) -> Self {
        if let Some(bottom) = frames.first_mut() {
            bottom.options = EvalOptions::COMPLETION;
        }
        Self {
            calls: count_calls(&frames),
            frames,
            pending: Some(input),
            blocked: None,
            result: None,
        }
    }

    /// Source location of the innermost frame that has one.
    pub fn location(&self) -> Option<SourceLocation> {
        self.frames.iter().rev().find_map(|slot| slot.frame.location())
    }

    /// Drops every frame. Used when a task is aborted.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.calls = 0;
        self.pending = None;
        self.blocked = None;
    }

    pub fn step(&mut self, realm: &mut Realm) -> Result<StepResult, EngineError> {
        if let Some(result) = &self.result {
            return Ok(StepResult::Finished(result.clone()));
        }
        if let Some(wake) = self.blocked {
            match realm.take_wake(wake) {
                Some(input) => {
                    trace!(wake = wake.0, "top-level await resumed");
                    self.blocked = None;
                    self.pending = Some(input);
                }
                None => return Ok(StepResult::Blocked),
            }
        }
        let input = self.pending.take().unwrap_or(Resumption::Start);
        let Some(top) = self.frames.last_mut() else {
            return Err(EngineError::defect("stepped a coroutine with no frames"));
        };
        match top.frame.resume(realm, input)? {
            Step::Command(command) => self.dispatch(realm, command),
            Step::Done(completion) => {
                let Some(slot) = self.pop() else {
                    return Err(EngineError::defect("frame stack underflow"));
                };
                self.deliver(completion, slot.options)
            }
            Step::Reference(reference) => {
                let Some(slot) = self.pop() else {
                    return Err(EngineError::defect("frame stack underflow"));
                };
                if slot.options.for_reference {
                    self.pending = Some(Resumption::Reference(reference));
                    return Ok(StepResult::Running);
                }
                let access = realm.get_value(&reference);
                self.access(realm, access, slot.options)
            }
        }
    }

    /// Hands a completion to the frame now on top, following the delivery
    /// options of the slot that produced it.
    pub(crate) fn deliver(&mut self, completion: Completion, mut options: EvalOptions) -> Result<StepResult, EngineError> {
        let mut completion = completion;
        loop {
            if self.frames.is_empty() {
                self.result = Some(completion.clone());
                return Ok(StepResult::Finished(completion));
            }
            match completion {
                Completion::Normal(value) => {
                    self.pending = Some(if options.for_normal_value {
                        Resumption::Value(value.unwrap_or_default())
                    } else {
                        Resumption::Completion(Completion::Normal(value))
                    });
                    return Ok(StepResult::Running);
                }
                abrupt if options.rethrow => {
                    let Some(parent) = self.pop() else {
                        return Err(EngineError::defect("frame stack underflow while unwinding"));
                    };
                    options = parent.options;
                    completion = abrupt;
                }
                Completion::Throw(value) => {
                    self.pending = Some(Resumption::Completion(Completion::Throw(value)));
                    return Ok(StepResult::Running);
                }
                abrupt if options.for_normal_value => {
                    return Err(EngineError::defect(format!(
                        "expected a normal completion, got {abrupt:?}"
                    )));
                }
                abrupt => {
                    self.pending = Some(Resumption::Completion(abrupt));
                    return Ok(StepResult::Running);
                }
            }
        }
    }

    fn dispatch(&mut self, realm: &mut Realm, command: Command) -> Result<StepResult, EngineError> {
        match command {
            Command::Evaluate { node, context, options } => {
                if context.realm != realm.id() {
                    return Err(EngineError::defect("node evaluated in a foreign realm"));
                }
                let frame = Frame::for_node(&node, &context);
                self.push(frame, options);
                Ok(StepResult::Running)
            }
            Command::Await(value) => suspend::await_value(self, realm, value),
            Command::Produce(value) => suspend::produce(self, realm, value),
            Command::Host(operation, options) => self.host(realm, operation, options),
        }
    }

    fn host(&mut self, realm: &mut Realm, operation: HostOperation, options: EvalOptions) -> Result<StepResult, EngineError> {
        match operation {
            HostOperation::Call { callee, this, args } => {
                let outcome = call::begin_call(realm, &callee, this, args);
                self.apply(realm, outcome, options)
            }
            HostOperation::Construct {
                callee,
                args,
                new_target,
            } => {
                let outcome = call::begin_construct(realm, &callee, args, &new_target);
                self.apply(realm, outcome, options)
            }
            HostOperation::GetValue(reference) => {
                let access = realm.get_value(&reference);
                self.access(realm, access, options)
            }
            HostOperation::PutValue(reference, value) => {
                let access = realm.put_value(&reference, value);
                self.access(realm, access, options)
            }
            HostOperation::Enter(frame) => {
                self.push(*frame, options);
                Ok(StepResult::Running)
            }
            HostOperation::GeneratorStart(generator) => suspend::start_generator(self, realm, generator),
        }
    }

    fn access(&mut self, realm: &mut Realm, access: Access, options: EvalOptions) -> Result<StepResult, EngineError> {
        match access {
            Access::Value(v) => self.deliver(Completion::normal(v), options),
            Access::Throw(e) => self.deliver(Completion::Throw(e), options),
            Access::Call { function, this, args } => {
                let outcome = call::begin_call(realm, &function, this, args);
                self.apply(realm, outcome, options)
            }
        }
    }

    /// Continues with the result of starting a call. Entering a function
    /// beyond the realm's call depth limit throws a RangeError instead.
    pub(crate) fn apply(
        &mut self,
        realm: &mut Realm,
        outcome: CallOutcome,
        options: EvalOptions,
    ) -> Result<StepResult, EngineError> {
        match outcome {
            CallOutcome::Complete(completion) => self.deliver(completion, options),
            CallOutcome::Enter(frame) if frame.is_function_boundary() && self.calls >= realm.max_call_depth => {
                debug!(depth = self.calls, "call depth limit reached");
                let error = realm.range_error("Maximum call stack size exceeded");
                self.deliver(Completion::Throw(error), options)
            }
            CallOutcome::Enter(frame) => {
                self.push(frame, options);
                Ok(StepResult::Running)
            }
            CallOutcome::Resume { mut frames, input } => {
                let Some(bottom) = frames.first_mut() else {
                    return Err(EngineError::defect("resumed an empty frame list"));
                };
                bottom.options = options;
                self.calls += count_calls(&frames);
                self.frames.extend(frames);
                self.pending = Some(input);
                Ok(StepResult::Running)
            }
        }
    }

    fn push(&mut self, frame: Frame, options: EvalOptions) {
        if frame.is_function_boundary() {
            self.calls += 1;
        }
        self.frames.push(FrameSlot { frame, options });
        self.pending = Some(Resumption::Start);
    }

    /// Index of the innermost function boundary frame.
    pub(crate) fn innermost_boundary(&self) -> Option<usize> {
        self.frames.iter().rposition(|slot| slot.frame.is_function_boundary())
    }

    /// Removes and returns every frame from `index` upward.
    pub(crate) fn split_off(&mut self, index: usize) -> Vec<FrameSlot> {
        let frames = self.frames.split_off(index);
        self.calls -= count_calls(&frames);
        frames
    }

    fn pop(&mut self) -> Option<FrameSlot> {
        let slot = self.frames.pop()?;
        if slot.frame.is_function_boundary() {
            self.calls -= 1;
        }
        Some(slot)
    }
}

trace_fields! {
    FrameSlot => frame;
    Coroutine => frames, pending, result;
}
