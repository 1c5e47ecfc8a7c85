//! `Array` and `Array.prototype`.
//!
//! Methods that take a callback (`map`, `forEach`, `reduce`, ...) return an
//! [`ArrayCallbackFrame`] that calls back into guest code one element per
//! resumption, so a long `map` is as preemptible as a hand-written loop.

use super::{integer_arg, this_object};
use crate::error::EngineError;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::command::{Command, Resumption, Step};
use crate::interpreter::frame::{Frame, FrameKind, unexpected};
use crate::interpreter::gc::trace_fields;
use crate::interpreter::iteration::IterateFrame;
use crate::interpreter::object::{IteratorKind, ObjectKind};
use crate::interpreter::operations::{same_value_zero, strict_equality, to_boolean};
use crate::types::{JsObject, JsValue, WellKnownSymbol};

impl Realm {
    pub(crate) fn setup_array(&mut self) {
        let proto = self.intrinsics.array_prototype;
        let ctor = self.native_constructor("Array", 1, construct, proto);
        self.install_method(ctor, "isArray", 1, is_array);
        self.install_method(ctor, "of", 0, of);
        self.install_method(ctor, "from", 1, from);

        // Mutators
        self.install_method(proto, "push", 1, push);
        self.install_method(proto, "pop", 0, pop);
        self.install_method(proto, "shift", 0, shift);
        self.install_method(proto, "reverse", 0, reverse);

        // Accessors
        self.install_method(proto, "join", 1, join);
        self.install_method(proto, "toString", 0, to_string);
        self.install_method(proto, "indexOf", 1, index_of);
        self.install_method(proto, "includes", 1, includes);
        self.install_method(proto, "slice", 2, slice);
        self.install_method(proto, "concat", 1, concat);

        // Callback methods
        self.install_method(proto, "forEach", 1, for_each);
        self.install_method(proto, "map", 1, map);
        self.install_method(proto, "filter", 1, filter);
        self.install_method(proto, "some", 1, some);
        self.install_method(proto, "every", 1, every);
        self.install_method(proto, "find", 1, find);
        self.install_method(proto, "findIndex", 1, find_index);
        self.install_method(proto, "reduce", 1, reduce);

        // Iteration
        let values = self.intrinsics.array_values;
        self.install_existing(proto, "values", "values", 0, values);
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::Iterator.key(), JsValue::Object(values));
        self.install_method(proto, "keys", 0, keys);
        self.install_method(proto, "entries", 0, entries);

        self.define_global("Array", JsValue::Object(ctor));
    }

    fn array_length(&self, array: JsObject) -> usize {
        self.array_elements(&JsValue::Object(array)).map_or(0, <[JsValue]>::len)
    }

    fn element(&self, array: JsObject, index: usize) -> JsValue {
        self.array_elements(&JsValue::Object(array))
            .and_then(|elements| elements.get(index).cloned())
            .unwrap_or_default()
    }
}

/// The `this` array of a method. Array-likes are copied into a new array.
fn this_array(realm: &mut Realm, call: &NativeCall) -> Result<JsObject, JsValue> {
    if let Some(o) = call.this.as_object()
        && matches!(realm.object(o).kind, ObjectKind::Array(_))
    {
        return Ok(o);
    }
    let o = this_object(realm, call)?;
    let values = realm.list_from_array_like(&JsValue::Object(o))?;
    Ok(realm.create_array(values))
}

/// The `this` array of a mutating method; must be a real, unfrozen array.
fn mutable_array(realm: &mut Realm, call: &NativeCall, method: &str) -> Result<JsObject, JsValue> {
    match call.this.as_object() {
        Some(o) if matches!(realm.object(o).kind, ObjectKind::Array(_)) => {
            if realm.object(o).frozen {
                return Err(realm.type_error(format!("Cannot {method} on a frozen array")));
            }
            Ok(o)
        }
        _ => Err(realm.type_error(format!("Array.prototype.{method} called on a non-array"))),
    }
}

fn elements_mut(realm: &mut Realm, array: JsObject) -> Option<&mut Vec<JsValue>> {
    match &mut realm.object_mut(array).kind {
        ObjectKind::Array(elements) => Some(elements),
        _ => None,
    }
}

/// Resolves a relative index argument against `length`.
fn relative(value: f64, length: usize) -> usize {
    let len = length as f64;
    let index = if value < 0.0 { (len + value).max(0.0) } else { value.min(len) };
    index as usize
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let values = match call.args.as_slice() {
        [JsValue::Number(n)] => {
            let length = *n as usize;
            if length as f64 != *n {
                return Err(realm.range_error("Invalid array length"));
            }
            vec![JsValue::Undefined; length]
        }
        args => args.to_vec(),
    };
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(values))))
}

fn is_array(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = realm.array_elements(&call.arg(0)).is_some();
    Ok(CallOutcome::value(JsValue::Boolean(result)))
}

fn of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let values = std::mem::take(&mut call.args);
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(values))))
}

fn from(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let source = call.arg(0);
    if source.is_nullish() {
        let message = format!("{source} is not iterable");
        return Err(realm.type_error(message));
    }
    let iterable = match &source {
        JsValue::String(_) => true,
        JsValue::Object(o) => !realm.get_data(*o, &WellKnownSymbol::Iterator.key()).is_nullish(),
        _ => false,
    };
    if iterable {
        let frame = Frame::internal(FrameKind::Iterate(IterateFrame::new(source)));
        return Ok(CallOutcome::Enter(frame));
    }
    let values = realm.list_from_array_like(&source)?;
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(values))))
}

fn push(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = mutable_array(realm, call, "push")?;
    let args = std::mem::take(&mut call.args);
    let elements = elements_mut(realm, array).ok_or(JsValue::Undefined)?;
    elements.extend(args);
    let length = elements.len();
    Ok(CallOutcome::value(JsValue::Number(length as f64)))
}

fn pop(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = mutable_array(realm, call, "pop")?;
    let value = elements_mut(realm, array).and_then(Vec::pop).unwrap_or_default();
    Ok(CallOutcome::value(value))
}

fn shift(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = mutable_array(realm, call, "shift")?;
    let value = elements_mut(realm, array)
        .filter(|elements| !elements.is_empty())
        .map(|elements| elements.remove(0))
        .unwrap_or_default();
    Ok(CallOutcome::value(value))
}

fn reverse(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = mutable_array(realm, call, "reverse")?;
    if let Some(elements) = elements_mut(realm, array) {
        elements.reverse();
    }
    Ok(CallOutcome::value(JsValue::Object(array)))
}

fn join(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let separator = match call.arg(0) {
        JsValue::Undefined => ",".into(),
        v => realm.to_js_string(&v)?,
    };
    let mut parts = Vec::with_capacity(realm.array_length(array));
    for index in 0..realm.array_length(array) {
        match realm.element(array, index) {
            JsValue::Undefined | JsValue::Null => parts.push(String::new()),
            v => parts.push(realm.to_js_string(&v)?.to_string()),
        }
    }
    Ok(CallOutcome::value(JsValue::string(&parts.join(&*separator))))
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    call.args.clear();
    join(realm, call)
}

fn index_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let length = realm.array_length(array);
    let start = relative(integer_arg(realm, call, 1, 0.0)?, length);
    let target = call.arg(0);
    let found = (start..length).find(|i| strict_equality(&realm.element(array, *i), &target));
    let index = found.map_or(-1.0, |i| i as f64);
    Ok(CallOutcome::value(JsValue::Number(index)))
}

fn includes(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let length = realm.array_length(array);
    let start = relative(integer_arg(realm, call, 1, 0.0)?, length);
    let target = call.arg(0);
    let found = (start..length).any(|i| same_value_zero(&realm.element(array, i), &target));
    Ok(CallOutcome::value(JsValue::Boolean(found)))
}

fn slice(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let length = realm.array_length(array);
    let start = relative(integer_arg(realm, call, 0, 0.0)?, length);
    let end = relative(integer_arg(realm, call, 1, length as f64)?, length);
    let values = (start..end.max(start)).map(|i| realm.element(array, i)).collect();
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(values))))
}

fn concat(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let mut values = realm
        .array_elements(&JsValue::Object(array))
        .map(<[JsValue]>::to_vec)
        .unwrap_or_default();
    for arg in &call.args {
        match realm.array_elements(arg) {
            Some(elements) => values.extend_from_slice(elements),
            None => values.push(arg.clone()),
        }
    }
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(values))))
}

/// `Array.prototype.values`; also the intrinsic behind `[Symbol.iterator]`.
pub(crate) fn values(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = this_object(realm, call)?;
    Ok(CallOutcome::value(realm.create_array_iterator(JsValue::Object(o), IteratorKind::Value)))
}

fn keys(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = this_object(realm, call)?;
    Ok(CallOutcome::value(realm.create_array_iterator(JsValue::Object(o), IteratorKind::Key)))
}

fn entries(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = this_object(realm, call)?;
    Ok(CallOutcome::value(realm.create_array_iterator(JsValue::Object(o), IteratorKind::KeyValue)))
}

/// What a callback method does with each callback result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMethod {
    ForEach,
    Map,
    Filter,
    Some,
    Every,
    Find,
    FindIndex,
    Reduce,
}

impl CallbackMethod {
    fn name(self) -> &'static str {
        match self {
            CallbackMethod::ForEach => "forEach",
            CallbackMethod::Map => "map",
            CallbackMethod::Filter => "filter",
            CallbackMethod::Some => "some",
            CallbackMethod::Every => "every",
            CallbackMethod::Find => "find",
            CallbackMethod::FindIndex => "findIndex",
            CallbackMethod::Reduce => "reduce",
        }
    }
}

/// Runs one array callback method element by element.
#[derive(Debug)]
pub struct ArrayCallbackFrame {
    method: CallbackMethod,
    array: JsObject,
    callback: JsValue,
    this_arg: JsValue,
    /// Length observed when the method was called; later growth is ignored.
    length: usize,
    index: usize,
    current: JsValue,
    accumulator: JsValue,
    results: Vec<JsValue>,
}

impl ArrayCallbackFrame {
    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => self.advance(realm),
            Resumption::Value(result) => {
                let position = self.index - 1;
                match self.method {
                    CallbackMethod::ForEach => {}
                    CallbackMethod::Map => self.results.push(result),
                    CallbackMethod::Filter => {
                        if to_boolean(&result) {
                            self.results.push(self.current.clone());
                        }
                    }
                    CallbackMethod::Some if to_boolean(&result) => return Ok(Step::value(JsValue::Boolean(true))),
                    CallbackMethod::Every if !to_boolean(&result) => return Ok(Step::value(JsValue::Boolean(false))),
                    CallbackMethod::Find if to_boolean(&result) => return Ok(Step::value(self.current.clone())),
                    CallbackMethod::FindIndex if to_boolean(&result) => {
                        return Ok(Step::value(JsValue::Number(position as f64)));
                    }
                    CallbackMethod::Reduce => self.accumulator = result,
                    CallbackMethod::Some | CallbackMethod::Every | CallbackMethod::Find | CallbackMethod::FindIndex => {}
                }
                self.advance(realm)
            }
            other => Err(unexpected(self.method.name(), &other)),
        }
    }

    fn advance(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        if self.index >= self.length {
            return Ok(Step::value(self.finish(realm)));
        }
        let index = self.index;
        self.index += 1;
        self.current = realm.element(self.array, index);
        let position = JsValue::Number(index as f64);
        let array = JsValue::Object(self.array);
        let args = match self.method {
            CallbackMethod::Reduce => vec![self.accumulator.clone(), self.current.clone(), position, array],
            _ => vec![self.current.clone(), position, array],
        };
        let this = match self.method {
            CallbackMethod::Reduce => JsValue::Undefined,
            _ => self.this_arg.clone(),
        };
        Ok(Command::call(self.callback.clone(), this, args).into())
    }

    fn finish(&mut self, realm: &mut Realm) -> JsValue {
        match self.method {
            CallbackMethod::ForEach | CallbackMethod::Find => JsValue::Undefined,
            CallbackMethod::Map | CallbackMethod::Filter => {
                JsValue::Object(realm.create_array(std::mem::take(&mut self.results)))
            }
            CallbackMethod::Some => JsValue::Boolean(false),
            CallbackMethod::Every => JsValue::Boolean(true),
            CallbackMethod::FindIndex => JsValue::Number(-1.0),
            CallbackMethod::Reduce => std::mem::take(&mut self.accumulator),
        }
    }
}

fn with_callback(realm: &mut Realm, call: &mut NativeCall, method: CallbackMethod) -> Result<CallOutcome, JsValue> {
    let array = this_array(realm, call)?;
    let callback = call.arg(0);
    if !realm.is_callable(&callback) {
        let message = format!("{} is not a function", realm.describe(&callback));
        return Err(realm.type_error(message));
    }
    let length = realm.array_length(array);
    let mut frame = ArrayCallbackFrame {
        method,
        array,
        callback,
        this_arg: call.arg(1),
        length,
        index: 0,
        current: JsValue::Undefined,
        accumulator: JsValue::Undefined,
        results: Vec::new(),
    };
    if method == CallbackMethod::Reduce {
        if call.args.len() >= 2 {
            frame.accumulator = call.arg(1);
        } else if length == 0 {
            return Err(realm.type_error("Reduce of empty array with no initial value"));
        } else {
            frame.accumulator = realm.element(array, 0);
            frame.index = 1;
        }
    }
    Ok(CallOutcome::Enter(Frame::internal(FrameKind::ArrayCallback(frame))))
}

fn for_each(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::ForEach)
}

fn map(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Map)
}

fn filter(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Filter)
}

fn some(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Some)
}

fn every(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Every)
}

fn find(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Find)
}

fn find_index(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::FindIndex)
}

fn reduce(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    with_callback(realm, call, CallbackMethod::Reduce)
}

trace_fields! {
    ArrayCallbackFrame => array, callback, this_arg, current, accumulator, results;
}

#[cfg(test)]
mod tests {
    use super::relative;

    #[test]
    fn relative_indices_clamp() {
        assert_eq!(relative(-1.0, 5), 4);
        assert_eq!(relative(-10.0, 5), 0);
        assert_eq!(relative(7.0, 5), 5);
        assert_eq!(relative(f64::INFINITY, 5), 5);
        assert_eq!(relative(2.0, 5), 2);
    }
}
