//! Promises.
//!
//! Settling a promise turns each of its reactions into a microtask. Every
//! piece of guest code a promise runs (executors, handlers, thenables,
//! `finally` callbacks) runs inside a frame on some job's coroutine.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use super::slot;
use crate::error::EngineError;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall, NativeFn, begin_call};
use crate::interpreter::command::{Command, Resumption, Step};
use crate::interpreter::completion::Completion;
use crate::interpreter::driver::Coroutine;
use crate::interpreter::frame::{Frame, FrameKind, unexpected};
use crate::interpreter::gc::trace_fields;
use crate::interpreter::object::{FunctionData, ObjectData, ObjectKind, PromiseState, PropertyDescriptor};
use crate::interpreter::suspend::PromiseReaction;
use crate::types::{JsObject, JsValue, PropertyKey, WellKnownSymbol};

impl Realm {
    pub(crate) fn setup_promise(&mut self) {
        let proto = self.intrinsics.promise_prototype;
        let ctor = self.native_constructor("Promise", 1, construct, proto);
        self.install_method(ctor, "resolve", 1, resolve);
        self.install_method(ctor, "reject", 1, reject);
        self.install_method(proto, "then", 2, then);
        self.install_method(proto, "catch", 1, catch);
        self.install_method(proto, "finally", 1, finally);
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::ToStringTag.key(), JsValue::string("Promise"));
        self.define_global("Promise", JsValue::Object(ctor));
    }

    fn alloc_promise(&mut self, proto: JsObject) -> JsObject {
        self.alloc(ObjectData::new(
            ObjectKind::Promise(PromiseState::Pending {
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            }),
            Some(proto),
        ))
    }

    /// A new pending promise.
    pub fn create_promise(&mut self) -> JsObject {
        let proto = self.intrinsics.promise_prototype;
        self.alloc_promise(proto)
    }

    pub fn is_promise(&self, value: &JsValue) -> bool {
        value
            .as_object()
            .is_some_and(|o| matches!(self.object(o).kind, ObjectKind::Promise(_)))
    }

    fn is_pending(&self, promise: JsObject) -> bool {
        matches!(self.object(promise).kind, ObjectKind::Promise(PromiseState::Pending { .. }))
    }

    /// PromiseResolve with the intrinsic constructor: promises pass through,
    /// anything else is wrapped in a promise resolved with it.
    pub fn promise_resolve(&mut self, value: JsValue) -> JsObject {
        if let Some(o) = value.as_object()
            && self.is_promise(&value)
            && self.object(o).prototype == Some(self.intrinsics.promise_prototype)
        {
            return o;
        }
        let promise = self.create_promise();
        self.resolve_promise(promise, value);
        promise
    }

    /// The promise resolve function: adopts thenables, fulfills with anything else.
    pub fn resolve_promise(&mut self, promise: JsObject, resolution: JsValue) {
        if !self.is_pending(promise) {
            return;
        }
        let Some(o) = resolution.as_object() else {
            self.settle(promise, resolution, false);
            return;
        };
        if o == promise {
            let error = self.type_error("Chaining cycle detected for promise");
            self.settle(promise, error, true);
            return;
        }
        let then = self.get_data_str(o, "then");
        if !self.is_callable(&then) {
            self.settle(promise, resolution, false);
            return;
        }
        let job = ThenableFrame {
            promise,
            thenable: resolution,
            then,
            already_resolved: None,
        };
        self.enqueue_microtask(Coroutine::new(Frame::internal(FrameKind::ResolveThenable(job))));
    }

    pub fn reject_promise(&mut self, promise: JsObject, reason: JsValue) {
        if self.is_pending(promise) {
            self.settle(promise, reason, true);
        }
    }

    fn settle(&mut self, promise: JsObject, value: JsValue, rejected: bool) {
        let state = if rejected {
            PromiseState::Rejected(value.clone())
        } else {
            PromiseState::Fulfilled(value.clone())
        };
        let ObjectKind::Promise(current) = &mut self.object_mut(promise).kind else {
            return;
        };
        let PromiseState::Pending {
            fulfill_reactions,
            reject_reactions,
        } = std::mem::replace(current, state)
        else {
            return;
        };
        let reactions = if rejected { reject_reactions } else { fulfill_reactions };
        trace!(promise = promise.id, rejected, reactions = reactions.len(), "promise settled");
        for reaction in reactions {
            if let Some(job) = reaction.into_job(value.clone(), rejected) {
                self.enqueue_microtask(job);
            }
        }
    }

    /// Registers a pair of reactions; runs the matching one as a microtask
    /// right away if the promise is already settled.
    pub(crate) fn add_reactions(&mut self, promise: JsObject, on_fulfilled: PromiseReaction, on_rejected: PromiseReaction) {
        let (reaction, argument, rejected) = match &mut self.object_mut(promise).kind {
            ObjectKind::Promise(PromiseState::Pending {
                fulfill_reactions,
                reject_reactions,
            }) => {
                fulfill_reactions.push(on_fulfilled);
                reject_reactions.push(on_rejected);
                return;
            }
            ObjectKind::Promise(PromiseState::Fulfilled(v)) => (on_fulfilled, v.clone(), false),
            ObjectKind::Promise(PromiseState::Rejected(e)) => (on_rejected, e.clone(), true),
            _ => return,
        };
        if let Some(job) = reaction.into_job(argument, rejected) {
            self.enqueue_microtask(job);
        }
    }

    /// PerformPromiseThen; returns the derived promise.
    fn perform_then(&mut self, promise: JsObject, on_fulfilled: JsValue, on_rejected: JsValue) -> JsObject {
        let capability = self.create_promise();
        let handler = |realm: &Realm, h: JsValue| PromiseReaction::Handler {
            capability: Some(capability),
            handler: if realm.is_callable(&h) { h } else { JsValue::Undefined },
        };
        let fulfill = handler(self, on_fulfilled);
        let reject = handler(self, on_rejected);
        self.add_reactions(promise, fulfill, reject);
        capability
    }

    /// CreateResolvingFunctions: a resolve/reject pair sharing one
    /// already-resolved flag.
    fn create_resolving_functions(&mut self, promise: JsObject) -> (JsValue, JsValue, Rc<Cell<bool>>) {
        let already_resolved = Rc::new(Cell::new(false));
        let proto = self.intrinsics.function_prototype;
        let make = |realm: &mut Realm, reject: bool| {
            let f = realm.alloc(ObjectData::new(
                ObjectKind::Function(FunctionData::PromiseResolver {
                    promise,
                    reject,
                    already_resolved: already_resolved.clone(),
                }),
                Some(proto),
            ));
            realm.object_mut(f).insert_property(
                PropertyKey::from("length"),
                PropertyDescriptor::data(JsValue::Number(1.0), false, false, true),
            );
            JsValue::Object(f)
        };
        let resolve = make(self, false);
        let reject = make(self, true);
        (resolve, reject, already_resolved)
    }

    /// A host-visible view of a promise's state.
    pub fn promise_state(&self, promise: JsObject) -> Option<Result<JsValue, JsValue>> {
        match &self.object(promise).kind {
            ObjectKind::Promise(PromiseState::Fulfilled(v)) => Some(Ok(v.clone())),
            ObjectKind::Promise(PromiseState::Rejected(e)) => Some(Err(e.clone())),
            _ => None,
        }
    }
}

fn this_promise(realm: &mut Realm, call: &NativeCall, method: &str) -> Result<JsObject, JsValue> {
    match call.this.as_object() {
        Some(o) if realm.is_promise(&call.this) => Ok(o),
        _ => {
            let message = format!("Method Promise.prototype.{method} called on incompatible receiver {}", realm.describe(&call.this));
            Err(realm.type_error(message))
        }
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let Some(target) = call.new_target.as_ref().and_then(JsValue::as_object) else {
        return Err(realm.type_error("Promise constructor cannot be invoked without 'new'"));
    };
    let executor = call.arg(0);
    if !realm.is_callable(&executor) {
        let message = format!("Promise resolver {} is not a function", realm.describe(&executor));
        return Err(realm.type_error(message));
    }
    let default = realm.intrinsics.promise_prototype;
    let proto = realm.prototype_from_constructor(target, default);
    let promise = realm.alloc_promise(proto);
    let (resolve, reject, already_resolved) = realm.create_resolving_functions(promise);
    let frame = ExecutorFrame {
        promise,
        executor,
        functions: Some((resolve, reject)),
        already_resolved,
    };
    Ok(CallOutcome::Enter(Frame::internal(FrameKind::PromiseExecutor(frame))))
}

fn resolve(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let promise = realm.promise_resolve(call.arg(0));
    Ok(CallOutcome::value(JsValue::Object(promise)))
}

fn reject(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let promise = realm.create_promise();
    realm.reject_promise(promise, call.arg(0));
    Ok(CallOutcome::value(JsValue::Object(promise)))
}

fn then(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let promise = this_promise(realm, call, "then")?;
    let derived = realm.perform_then(promise, call.arg(0), call.arg(1));
    Ok(CallOutcome::value(JsValue::Object(derived)))
}

/// `catch` goes through the receiver's own `then`.
fn catch(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let this = call.this.clone();
    let o = realm.to_object(&this)?;
    let then = realm.get_data_str(o, "then");
    Ok(begin_call(realm, &then, this, vec![JsValue::Undefined, call.arg(0)]))
}

fn finally(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let promise = this_promise(realm, call, "finally")?;
    let on_finally = call.arg(0);
    if !realm.is_callable(&on_finally) {
        let derived = realm.perform_then(promise, on_finally.clone(), on_finally);
        return Ok(CallOutcome::value(JsValue::Object(derived)));
    }
    let then_finally = realm.native_function("", 1, then_finally, vec![on_finally.clone()]);
    let catch_finally = realm.native_function("", 1, catch_finally, vec![on_finally]);
    let derived = realm.perform_then(promise, JsValue::Object(then_finally), JsValue::Object(catch_finally));
    Ok(CallOutcome::value(JsValue::Object(derived)))
}

fn then_finally(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let frame = FinallyFrame {
        on_finally: slot(realm, call, 0),
        outcome: Completion::normal(call.arg(0)),
    };
    Ok(CallOutcome::Enter(Frame::internal(FrameKind::Finally(frame))))
}

fn catch_finally(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let frame = FinallyFrame {
        on_finally: slot(realm, call, 0),
        outcome: Completion::Throw(call.arg(0)),
    };
    Ok(CallOutcome::Enter(Frame::internal(FrameKind::Finally(frame))))
}

fn value_thunk(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    Ok(CallOutcome::value(slot(realm, call, 0)))
}

fn thrower(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    Err(slot(realm, call, 0))
}

/// Runs a promise executor and hands back the new promise.
#[derive(Debug)]
pub struct ExecutorFrame {
    promise: JsObject,
    executor: JsValue,
    functions: Option<(JsValue, JsValue)>,
    already_resolved: Rc<Cell<bool>>,
}

impl ExecutorFrame {
    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                let (resolve, reject) = self
                    .functions
                    .take()
                    .ok_or_else(|| EngineError::defect("promise executor started twice"))?;
                Ok(Command::call_catching(self.executor.clone(), JsValue::Undefined, vec![resolve, reject]).into())
            }
            Resumption::Value(_) => Ok(Step::value(JsValue::Object(self.promise))),
            Resumption::Completion(Completion::Throw(error)) => {
                if !self.already_resolved.replace(true) {
                    realm.reject_promise(self.promise, error);
                }
                Ok(Step::value(JsValue::Object(self.promise)))
            }
            other => Err(unexpected("promise-executor", &other)),
        }
    }
}

/// A promise reaction job: runs one `then` handler and settles the derived
/// promise with its outcome.
#[derive(Debug)]
pub struct ReactionFrame {
    capability: Option<JsObject>,
    handler: JsValue,
    argument: Option<JsValue>,
    rejected: bool,
}

impl ReactionFrame {
    pub fn new(capability: Option<JsObject>, handler: JsValue, argument: JsValue, rejected: bool) -> Self {
        Self {
            capability,
            handler,
            argument: Some(argument),
            rejected,
        }
    }

    fn settle(&self, realm: &mut Realm, outcome: Result<JsValue, JsValue>) -> Step {
        if let Some(capability) = self.capability {
            match outcome {
                Ok(value) => realm.resolve_promise(capability, value),
                Err(reason) => realm.reject_promise(capability, reason),
            }
        }
        Step::value(JsValue::Undefined)
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                let argument = self
                    .argument
                    .take()
                    .ok_or_else(|| EngineError::defect("promise reaction started twice"))?;
                if self.handler.is_undefined() {
                    let outcome = if self.rejected { Err(argument) } else { Ok(argument) };
                    return Ok(self.settle(realm, outcome));
                }
                Ok(Command::call_catching(self.handler.clone(), JsValue::Undefined, vec![argument]).into())
            }
            Resumption::Value(value) => Ok(self.settle(realm, Ok(value))),
            Resumption::Completion(Completion::Throw(reason)) => Ok(self.settle(realm, Err(reason))),
            other => Err(unexpected("promise-reaction", &other)),
        }
    }
}

/// NewPromiseResolveThenableJob: calls a thenable's `then` with fresh
/// resolving functions for `promise`.
#[derive(Debug)]
pub struct ThenableFrame {
    promise: JsObject,
    thenable: JsValue,
    then: JsValue,
    already_resolved: Option<Rc<Cell<bool>>>,
}

impl ThenableFrame {
    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                let (resolve, reject, already_resolved) = realm.create_resolving_functions(self.promise);
                self.already_resolved = Some(already_resolved);
                Ok(Command::call_catching(self.then.clone(), self.thenable.clone(), vec![resolve, reject]).into())
            }
            Resumption::Value(_) => Ok(Step::value(JsValue::Undefined)),
            Resumption::Completion(Completion::Throw(error)) => {
                if self.already_resolved.as_ref().is_some_and(|flag| !flag.replace(true)) {
                    realm.reject_promise(self.promise, error);
                }
                Ok(Step::value(JsValue::Undefined))
            }
            other => Err(unexpected("promise-thenable", &other)),
        }
    }
}

/// Body of the `thenFinally` / `catchFinally` closures: runs `onFinally`,
/// then waits on its result before passing the original outcome through.
#[derive(Debug)]
pub struct FinallyFrame {
    on_finally: JsValue,
    outcome: Completion,
}

impl FinallyFrame {
    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Command::call(self.on_finally.clone(), JsValue::Undefined, Vec::new()).into()),
            Resumption::Value(result) => {
                let promise = realm.promise_resolve(result);
                let (func, value): (NativeFn, JsValue) = match &self.outcome {
                    Completion::Throw(reason) => (thrower, reason.clone()),
                    other => (value_thunk, other.value().cloned().unwrap_or_default()),
                };
                let thunk = realm.native_function("", 0, func, vec![value]);
                let derived = realm.perform_then(promise, JsValue::Object(thunk), JsValue::Undefined);
                Ok(Step::value(JsValue::Object(derived)))
            }
            other => Err(unexpected("promise-finally", &other)),
        }
    }
}

trace_fields! {
    ExecutorFrame => promise, executor, functions;
    ReactionFrame => capability, handler, argument;
    ThenableFrame => promise, thenable, then;
    FinallyFrame => on_finally, outcome;
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;
    use crate::types::JsValue;

    #[test]
    fn resolving_with_itself_rejects() {
        let mut realm = Realm::new(RealmConfig::default());
        let promise = realm.create_promise();
        realm.resolve_promise(promise, JsValue::Object(promise));
        let state = realm.promise_state(promise).unwrap();
        let reason = state.unwrap_err();
        assert_eq!(realm.display(&reason), "TypeError: Chaining cycle detected for promise");
    }

    #[test]
    fn settled_promise_ignores_later_resolution() {
        let mut realm = Realm::new(RealmConfig::default());
        let promise = realm.create_promise();
        realm.resolve_promise(promise, JsValue::Number(1.0));
        realm.reject_promise(promise, JsValue::Number(2.0));
        assert!(matches!(realm.promise_state(promise), Some(Ok(JsValue::Number(n))) if n == 1.0));
    }

    #[test]
    fn promise_resolve_passes_native_promises_through() {
        let mut realm = Realm::new(RealmConfig::default());
        let promise = realm.create_promise();
        assert_eq!(realm.promise_resolve(JsValue::Object(promise)), promise);
        assert_ne!(realm.promise_resolve(JsValue::Number(1.0)), promise);
    }
}
