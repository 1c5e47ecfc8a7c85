//! The iterator protocol as frames.
//!
//! Iterator steps can run guest code (`next`, `return`, getters), so each
//! protocol operation is a small frame. Built-in array iterators over
//! unmodified arrays are stepped in place without any calls.

use super::Realm;
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step};
use super::completion::Completion;
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::trace_fields;
use super::object::IteratorKind;
use super::operations::to_boolean;
use super::reference::Reference;
use crate::error::EngineError;
use crate::types::{JsValue, PropertyKey, WellKnownSymbol};

fn get(base: &JsValue, key: PropertyKey) -> Command {
    Command::Host(HostOperation::GetValue(Reference::property(base.clone(), key, true)), EvalOptions::VALUE)
}

/// GetIterator; completes with the iterator object.
pub fn get_iterator(value: JsValue) -> Command {
    Command::enter(
        Frame::internal(FrameKind::GetIterator(GetIteratorFrame::new(value))),
        EvalOptions::VALUE,
    )
}

/// IteratorStep + IteratorValue; completes `Normal(Some(value))`, or
/// `Normal(None)` once the iterator is done. Throws arrive as completions.
pub fn next_value(iterator: JsValue) -> Command {
    Command::enter(
        Frame::internal(FrameKind::NextValue(NextValueFrame::new(iterator))),
        EvalOptions::COMPLETION,
    )
}

/// IteratorClose; completes with `completion` or the error that replaced it.
pub fn close_iterator(iterator: JsValue, completion: Completion) -> Command {
    Command::enter(
        Frame::internal(FrameKind::CloseIterator(CloseIteratorFrame::new(iterator, completion))),
        EvalOptions::COMPLETION,
    )
}

/// Collects every value of an iterable into a new array.
pub fn iterate(value: JsValue) -> Command {
    Command::enter(Frame::internal(FrameKind::Iterate(IterateFrame::new(value))), EvalOptions::VALUE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GetIteratorPhase {
    Start,
    Method,
    Call,
}

#[derive(Debug)]
pub struct GetIteratorFrame {
    value: JsValue,
    phase: GetIteratorPhase,
}

impl GetIteratorFrame {
    pub fn new(value: JsValue) -> Self {
        Self {
            value,
            phase: GetIteratorPhase::Start,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (GetIteratorPhase::Start, Resumption::Start) => {
                if self.value.is_nullish() {
                    return Ok(Step::throw(self.not_iterable(realm)));
                }
                if realm.has_default_array_iteration(&self.value) {
                    let iterator = realm.create_array_iterator(self.value.clone(), IteratorKind::Value);
                    return Ok(Step::value(iterator));
                }
                self.phase = GetIteratorPhase::Method;
                Ok(get(&self.value, WellKnownSymbol::Iterator.key()).into())
            }
            (GetIteratorPhase::Method, Resumption::Value(method)) => {
                if !realm.is_callable(&method) {
                    return Ok(Step::throw(self.not_iterable(realm)));
                }
                self.phase = GetIteratorPhase::Call;
                Ok(Command::call(method, self.value.clone(), Vec::new()).into())
            }
            (GetIteratorPhase::Call, Resumption::Value(iterator)) => {
                if !iterator.is_object() {
                    let error = realm.type_error("Result of the Symbol.iterator method is not an object");
                    return Ok(Step::throw(error));
                }
                Ok(Step::value(iterator))
            }
            (_, input) => Err(unexpected("get-iterator", &input)),
        }
    }

    fn not_iterable(&self, realm: &mut Realm) -> JsValue {
        let message = format!("{} is not iterable", realm.describe(&self.value));
        realm.type_error(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextPhase {
    Start,
    Method,
    Result,
    Done,
    Value,
}

#[derive(Debug)]
pub struct NextValueFrame {
    iterator: JsValue,
    result: JsValue,
    phase: NextPhase,
}

impl NextValueFrame {
    pub fn new(iterator: JsValue) -> Self {
        Self {
            iterator,
            result: JsValue::Undefined,
            phase: NextPhase::Start,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (NextPhase::Start, Resumption::Start) => {
                if let Some(step) = realm.step_builtin_iterator(&self.iterator) {
                    return Ok(Step::Done(Completion::Normal(step)));
                }
                self.phase = NextPhase::Method;
                Ok(get(&self.iterator, PropertyKey::from("next")).into())
            }
            (NextPhase::Method, Resumption::Value(next)) => {
                self.phase = NextPhase::Result;
                Ok(Command::call(next, self.iterator.clone(), Vec::new()).into())
            }
            (NextPhase::Result, Resumption::Value(result)) => {
                if !result.is_object() {
                    let message = format!("Iterator result {} is not an object", realm.describe(&result));
                    return Ok(Step::throw(realm.type_error(message)));
                }
                self.result = result;
                self.phase = NextPhase::Done;
                Ok(get(&self.result, PropertyKey::from("done")).into())
            }
            (NextPhase::Done, Resumption::Value(done)) => {
                if to_boolean(&done) {
                    return Ok(Step::Done(Completion::Normal(None)));
                }
                self.phase = NextPhase::Value;
                Ok(get(&self.result, PropertyKey::from("value")).into())
            }
            (NextPhase::Value, Resumption::Value(value)) => Ok(Step::Done(Completion::Normal(Some(value)))),
            (_, input) => Err(unexpected("iterator-next", &input)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClosePhase {
    Start,
    Method,
    Call,
}

#[derive(Debug)]
pub struct CloseIteratorFrame {
    iterator: JsValue,
    completion: Option<Completion>,
    phase: ClosePhase,
}

impl CloseIteratorFrame {
    pub fn new(iterator: JsValue, completion: Completion) -> Self {
        Self {
            iterator,
            completion: Some(completion),
            phase: ClosePhase::Start,
        }
    }

    fn original(&mut self) -> Result<Completion, EngineError> {
        self.completion
            .take()
            .ok_or_else(|| EngineError::defect("iterator close completed twice"))
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (ClosePhase::Start, Resumption::Start) => {
                if realm.close_builtin_iterator(&self.iterator) {
                    return self.original().map(Step::Done);
                }
                self.phase = ClosePhase::Method;
                let reference = Reference::property(self.iterator.clone(), PropertyKey::from("return"), true);
                Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::CATCH).into())
            }
            (ClosePhase::Method, input) => {
                let original = self.original()?;
                let method = match input {
                    _ if original.is_throw() => return Ok(Step::Done(original)),
                    Resumption::Value(method) => method,
                    Resumption::Completion(thrown @ Completion::Throw(_)) => return Ok(Step::Done(thrown)),
                    other => return Err(unexpected("iterator-close", &other)),
                };
                if method.is_nullish() {
                    return Ok(Step::Done(original));
                }
                self.completion = Some(original);
                self.phase = ClosePhase::Call;
                Ok(Command::call_catching(method, self.iterator.clone(), Vec::new()).into())
            }
            (ClosePhase::Call, input) => {
                let original = self.original()?;
                match input {
                    _ if original.is_throw() => Ok(Step::Done(original)),
                    Resumption::Value(result) if result.is_object() => Ok(Step::Done(original)),
                    Resumption::Value(_) => {
                        Ok(Step::throw(realm.type_error("Iterator result is not an object")))
                    }
                    Resumption::Completion(thrown @ Completion::Throw(_)) => Ok(Step::Done(thrown)),
                    other => Err(unexpected("iterator-close", &other)),
                }
            }
            (_, input) => Err(unexpected("iterator-close", &input)),
        }
    }
}

#[derive(Debug)]
pub struct IterateFrame {
    value: JsValue,
    iterator: JsValue,
    values: Vec<JsValue>,
    started: bool,
}

impl IterateFrame {
    pub fn new(value: JsValue) -> Self {
        Self {
            value,
            iterator: JsValue::Undefined,
            values: Vec::new(),
            started: false,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                if realm.has_default_array_iteration(&self.value) {
                    let values = realm.array_elements(&self.value).map(<[JsValue]>::to_vec).unwrap_or_default();
                    return Ok(Step::value(JsValue::Object(realm.create_array(values))));
                }
                Ok(get_iterator(self.value.clone()).into())
            }
            Resumption::Value(iterator) if !self.started => {
                self.started = true;
                self.iterator = iterator;
                Ok(next_value(self.iterator.clone()).into())
            }
            Resumption::Completion(Completion::Normal(Some(value))) => {
                self.values.push(value);
                Ok(next_value(self.iterator.clone()).into())
            }
            Resumption::Completion(Completion::Normal(None)) => {
                let values = std::mem::take(&mut self.values);
                Ok(Step::value(JsValue::Object(realm.create_array(values))))
            }
            Resumption::Completion(thrown @ Completion::Throw(_)) => Ok(Step::Done(thrown)),
            other => Err(unexpected("iterate", &other)),
        }
    }
}

trace_fields! {
    GetIteratorFrame => value;
    NextValueFrame => iterator, result;
    CloseIteratorFrame => iterator, completion;
    IterateFrame => value, iterator, values;
}
