//! Object heap and the ordinary property model.
//!
//! Objects live in the realm's [`Heap`](super::heap::Heap) and are addressed
//! by handle.
//! Property access that may need to run guest code (getters and setters)
//! reports the accessor back to the caller instead of invoking it, so the
//! evaluator can turn the call into a coroutine command.

use std::cell::Cell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::Realm;
use super::call::{Closure, NativeFn};
use super::driver::FrameSlot;
use super::environment::EnvRef;
use super::gc::{Trace, Tracer};
use super::module::ModuleId;
use crate::types::{JsObject, JsValue, PropertyKey, WellKnownSymbol, number_ops};

#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }

    pub fn accessor(get: Option<JsValue>, set: Option<JsValue>, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: None,
            writable: None,
            get,
            set,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }
}

pub enum FunctionData {
    Closure(Rc<Closure>),
    Native {
        name: Rc<str>,
        func: NativeFn,
        constructor: bool,
        /// Per-instance captured state for natives created at run time.
        slots: Vec<JsValue>,
    },
    /// Synthesized constructor of a class without an explicit one.
    DefaultConstructor { derived: bool, home_object: JsObject },
    Bound {
        target: JsObject,
        this: JsValue,
        args: Vec<JsValue>,
    },
    /// One of the resolve/reject pair handed to promise executors and thenables.
    PromiseResolver {
        promise: JsObject,
        reject: bool,
        already_resolved: Rc<Cell<bool>>,
    },
}

impl std::fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionData::Closure(c) => write!(f, "Closure({:?})", c.node.name),
            FunctionData::Native { name, .. } => write!(f, "Native({name})"),
            FunctionData::DefaultConstructor { derived, .. } => write!(f, "DefaultConstructor(derived: {derived})"),
            FunctionData::Bound { target, .. } => write!(f, "Bound({})", target.id),
            FunctionData::PromiseResolver { reject, .. } => write!(f, "PromiseResolver(reject: {reject})"),
        }
    }
}

#[derive(Debug)]
pub enum PromiseState {
    Pending {
        fulfill_reactions: Vec<super::suspend::PromiseReaction>,
        reject_reactions: Vec<super::suspend::PromiseReaction>,
    },
    Fulfilled(JsValue),
    Rejected(JsValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

#[derive(Debug)]
pub struct GeneratorData {
    pub status: GeneratorStatus,
    /// Saved coroutine frames from the generator body's boundary upward.
    pub frames: Vec<FrameSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Key,
    Value,
    KeyValue,
}

/// Value of one export as seen through a namespace object.
#[derive(Debug, Clone)]
pub enum NamespaceEntry {
    Binding(EnvRef, Rc<str>),
    Namespace(JsObject),
}

#[derive(Debug)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<JsValue>),
    Function(FunctionData),
    Error,
    /// Wrapper object for a primitive (`new Number(1)`, `Object("s")`).
    Primitive(JsValue),
    Promise(PromiseState),
    Generator(GeneratorData),
    ArrayIterator {
        target: JsValue,
        index: usize,
        kind: IteratorKind,
        done: bool,
    },
    Namespace {
        module: ModuleId,
        exports: Vec<(Rc<str>, NamespaceEntry)>,
    },
}

#[derive(Debug)]
pub struct ObjectData {
    pub kind: ObjectKind,
    pub prototype: Option<JsObject>,
    pub class_name: &'static str,
    pub extensible: bool,
    /// Array elements refuse writes once frozen.
    pub frozen: bool,
    properties: FxHashMap<PropertyKey, PropertyDescriptor>,
    property_order: Vec<PropertyKey>,
}

impl ObjectData {
    pub fn new(kind: ObjectKind, prototype: Option<JsObject>) -> Self {
        let class_name = match &kind {
            ObjectKind::Ordinary | ObjectKind::Primitive(_) => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Generator(_) => "Generator",
            ObjectKind::ArrayIterator { .. } => "Array Iterator",
            ObjectKind::Namespace { .. } => "Module",
        };
        Self {
            kind,
            prototype,
            class_name,
            extensible: true,
            frozen: false,
            properties: FxHashMap::default(),
            property_order: Vec::new(),
        }
    }

    pub fn insert_property(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if !self.properties.contains_key(&key) {
            self.property_order.push(key.clone());
        }
        self.properties.insert(key, desc);
    }

    pub fn insert_value(&mut self, key: impl Into<PropertyKey>, value: JsValue) {
        self.insert_property(key.into(), PropertyDescriptor::data_default(value));
    }

    /// Non-enumerable data property, as used for built-in methods.
    pub fn insert_builtin(&mut self, key: impl Into<PropertyKey>, value: JsValue) {
        self.insert_property(key.into(), PropertyDescriptor::data(value, true, false, true));
    }

    fn remove_property(&mut self, key: &PropertyKey) {
        if self.properties.remove(key).is_some() {
            self.property_order.retain(|k| k != key);
        }
    }

    pub fn function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }
}

/// A guest error raised by a heap operation, materialized into an error
/// object by the caller that owns the realm mutably.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub name: &'static str,
    pub message: String,
}

impl Fault {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            name: "TypeError",
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self {
            name: "RangeError",
            message: message.into(),
        }
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self {
            name: "ReferenceError",
            message: message.into(),
        }
    }
}

impl From<crate::error::BindingError> for Fault {
    fn from(e: crate::error::BindingError) -> Self {
        use crate::error::BindingError;
        let name = match &e {
            BindingError::Immutable(_) => "TypeError",
            BindingError::AlreadyDeclared(_) => "SyntaxError",
            BindingError::Uninitialized(_) | BindingError::NotDefined(_) | BindingError::AlreadyInitialized(_) => {
                "ReferenceError"
            }
        };
        Self {
            name,
            message: e.to_string(),
        }
    }
}

/// Outcome of reading a property.
#[derive(Debug, Clone)]
pub enum PropertyLookup {
    Value(JsValue),
    /// An accessor was found; the getter must be called with the receiver.
    Getter(JsValue),
}

/// Outcome of writing a property.
#[derive(Debug, Clone)]
pub enum SetOutcome {
    Done(bool),
    /// An accessor was found; the setter must be called with the receiver.
    Setter(JsValue),
}

fn valid_array_length(value: &JsValue) -> Option<usize> {
    let n = value.as_number()?;
    let len = number_ops::to_uint32(n);
    (f64::from(len) == n).then_some(len as usize)
}

impl Realm {
    pub fn alloc(&mut self, data: ObjectData) -> JsObject {
        self.heap.alloc(data)
    }

    pub fn object(&self, o: JsObject) -> &ObjectData {
        self.heap.get(o)
    }

    pub fn object_mut(&mut self, o: JsObject) -> &mut ObjectData {
        self.heap.get_mut(o)
    }

    /// Whether `o` is a live object of this realm.
    pub fn owns(&self, o: JsObject) -> bool {
        self.heap.contains(o)
    }

    pub fn create_object(&mut self) -> JsObject {
        let proto = self.intrinsics.object_prototype;
        self.alloc(ObjectData::new(ObjectKind::Ordinary, Some(proto)))
    }

    pub fn create_object_with_proto(&mut self, proto: Option<JsObject>) -> JsObject {
        self.alloc(ObjectData::new(ObjectKind::Ordinary, proto))
    }

    pub fn create_array(&mut self, values: Vec<JsValue>) -> JsObject {
        let proto = self.intrinsics.array_prototype;
        self.alloc(ObjectData::new(ObjectKind::Array(values), Some(proto)))
    }

    pub fn create_iter_result_object(&mut self, value: JsValue, done: bool) -> JsValue {
        let obj = self.create_object();
        let data = self.object_mut(obj);
        data.insert_value("value", value);
        data.insert_value("done", JsValue::Boolean(done));
        JsValue::Object(obj)
    }

    pub fn is_extensible(&self, o: JsObject) -> bool {
        self.object(o).extensible
    }

    pub fn is_callable(&self, value: &JsValue) -> bool {
        value.as_object().is_some_and(|o| self.object(o).is_callable())
    }

    pub fn is_constructor(&self, value: &JsValue) -> bool {
        let Some(o) = value.as_object() else {
            return false;
        };
        match self.object(o).function() {
            Some(FunctionData::Closure(c)) => c.is_constructor(),
            Some(FunctionData::Native { constructor, .. }) => *constructor,
            Some(FunctionData::DefaultConstructor { .. }) => true,
            Some(FunctionData::Bound { target, .. }) => self.is_constructor(&JsValue::Object(*target)),
            Some(FunctionData::PromiseResolver { .. }) | None => false,
        }
    }

    pub fn get_own_property(&self, o: JsObject, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let data = self.object(o);
        match &data.kind {
            ObjectKind::Array(elements) => {
                if let Some(index) = key.array_index() {
                    return elements
                        .get(index)
                        .map(|v| PropertyDescriptor::data(v.clone(), !data.frozen, true, !data.frozen));
                }
                if key.as_str() == Some("length") {
                    return Some(PropertyDescriptor::data(
                        JsValue::Number(elements.len() as f64),
                        !data.frozen,
                        false,
                        false,
                    ));
                }
            }
            ObjectKind::Primitive(JsValue::String(s)) => {
                if let Some(desc) = string_own_property(s, key) {
                    return Some(desc);
                }
            }
            ObjectKind::Namespace { exports, .. } => {
                if let Some(name) = key.as_str() {
                    let entry = exports.iter().find(|(n, _)| &**n == name)?;
                    let value = self.namespace_entry_value(&entry.1).unwrap_or(JsValue::Undefined);
                    return Some(PropertyDescriptor::data(value, true, true, false));
                }
            }
            _ => {}
        }
        data.properties.get(key).cloned()
    }

    pub fn has_own_property(&self, o: JsObject, key: &PropertyKey) -> bool {
        self.get_own_property(o, key).is_some()
    }

    pub fn has_property(&self, o: JsObject, key: &PropertyKey) -> bool {
        let mut current = Some(o);
        while let Some(obj) = current {
            if self.has_own_property(obj, key) {
                return true;
            }
            current = self.object(obj).prototype;
        }
        false
    }

    fn namespace_entry_value(&self, entry: &NamespaceEntry) -> Result<JsValue, crate::error::BindingError> {
        match entry {
            NamespaceEntry::Binding(env, name) => env.get_binding_value(self, name, true),
            NamespaceEntry::Namespace(ns) => Ok(JsValue::Object(*ns)),
        }
    }

    /// Prototype used for property lookups on a primitive base.
    pub fn primitive_prototype(&self, value: &JsValue) -> Option<JsObject> {
        let i = &self.intrinsics;
        match value {
            JsValue::Boolean(_) => Some(i.boolean_prototype),
            JsValue::Number(_) => Some(i.number_prototype),
            JsValue::String(_) => Some(i.string_prototype),
            JsValue::Symbol(_) => Some(i.symbol_prototype),
            JsValue::BigInt(_) => Some(i.bigint_prototype),
            JsValue::Object(o) => Some(*o),
            JsValue::Undefined | JsValue::Null => None,
        }
    }

    /// [[Get]] as the evaluator sees it: accessors are reported, not called.
    pub fn get_property(&mut self, base: &JsValue, key: &PropertyKey) -> Result<PropertyLookup, JsValue> {
        self.lookup_property(base, key).map_err(|f| self.throw_fault(f))
    }

    pub fn lookup_property(&self, base: &JsValue, key: &PropertyKey) -> Result<PropertyLookup, Fault> {
        let start = match base {
            JsValue::Undefined | JsValue::Null => {
                return Err(Fault::type_error(format!(
                    "Cannot read properties of {base} (reading '{key}')"
                )));
            }
            JsValue::String(s) => {
                if let Some(desc) = string_own_property(s, key) {
                    return Ok(PropertyLookup::Value(desc.value.unwrap_or(JsValue::Undefined)));
                }
                self.intrinsics.string_prototype
            }
            JsValue::Object(o) => {
                if let ObjectKind::Namespace { exports, .. } = &self.object(*o).kind
                    && let Some(name) = key.as_str()
                    && let Some((_, entry)) = exports.iter().find(|(n, _)| &**n == name)
                {
                    return self
                        .namespace_entry_value(entry)
                        .map(PropertyLookup::Value)
                        .map_err(Fault::from);
                }
                *o
            }
            other => match self.primitive_prototype(other) {
                Some(p) => p,
                None => return Ok(PropertyLookup::Value(JsValue::Undefined)),
            },
        };
        let mut current = Some(start);
        while let Some(obj) = current {
            if let Some(desc) = self.get_own_property(obj, key) {
                if desc.is_accessor_descriptor() {
                    return Ok(match desc.get {
                        Some(getter) if !getter.is_undefined() => PropertyLookup::Getter(getter),
                        _ => PropertyLookup::Value(JsValue::Undefined),
                    });
                }
                return Ok(PropertyLookup::Value(desc.value.unwrap_or(JsValue::Undefined)));
            }
            current = self.object(obj).prototype;
        }
        Ok(PropertyLookup::Value(JsValue::Undefined))
    }

    /// Reads a data property along the prototype chain. Accessors read as
    /// `undefined`; used by natives that never run guest code.
    pub fn get_data(&self, o: JsObject, key: &PropertyKey) -> JsValue {
        match self.lookup_property(&JsValue::Object(o), key) {
            Ok(PropertyLookup::Value(v)) => v,
            Ok(PropertyLookup::Getter(_)) | Err(_) => JsValue::Undefined,
        }
    }

    pub fn get_data_str(&self, o: JsObject, key: &str) -> JsValue {
        self.get_data(o, &PropertyKey::from(key))
    }

    /// OrdinarySet with `receiver` as the object that receives new data properties.
    pub fn set_property(
        &mut self,
        o: JsObject,
        key: PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<SetOutcome, Fault> {
        let mut current = Some(o);
        while let Some(obj) = current {
            if let Some(desc) = self.get_own_property(obj, &key) {
                if desc.is_accessor_descriptor() {
                    return Ok(match desc.set {
                        Some(setter) if !setter.is_undefined() => SetOutcome::Setter(setter),
                        _ => SetOutcome::Done(false),
                    });
                }
                if desc.writable == Some(false) {
                    return Ok(SetOutcome::Done(false));
                }
                break;
            }
            current = self.object(obj).prototype;
        }

        let Some(target) = receiver.as_object() else {
            return Ok(SetOutcome::Done(false));
        };
        if let Some(existing) = self.get_own_property(target, &key) {
            if existing.is_accessor_descriptor() || existing.writable == Some(false) {
                return Ok(SetOutcome::Done(false));
            }
            return self.write_own_value(target, key, value).map(SetOutcome::Done);
        }
        if !self.object(target).extensible {
            return Ok(SetOutcome::Done(false));
        }
        self.write_own_value(target, key, value).map(SetOutcome::Done)
    }

    /// Stores a value as an own data property, honouring array element and
    /// length semantics.
    fn write_own_value(&mut self, o: JsObject, key: PropertyKey, value: JsValue) -> Result<bool, Fault> {
        let data = self.object_mut(o);
        match &mut data.kind {
            ObjectKind::Array(elements) => {
                if let Some(index) = key.array_index() {
                    if index >= elements.len() {
                        elements.resize(index + 1, JsValue::Undefined);
                    }
                    elements[index] = value;
                    return Ok(true);
                }
                if key.as_str() == Some("length") {
                    let len = valid_array_length(&value).ok_or_else(|| Fault::range_error("Invalid array length"))?;
                    elements.resize(len, JsValue::Undefined);
                    return Ok(true);
                }
            }
            ObjectKind::Namespace { .. } => return Ok(false),
            _ => {}
        }
        match data.properties.get_mut(&key) {
            Some(desc) => desc.value = Some(value),
            None => data.insert_value(key, value),
        }
        Ok(true)
    }

    /// Writes a data property without invoking setters.
    pub fn set_data(&mut self, o: JsObject, key: PropertyKey, value: JsValue) -> bool {
        matches!(
            self.set_property(o, key, value, &JsValue::Object(o)),
            Ok(SetOutcome::Done(true))
        )
    }

    /// ValidateAndApplyPropertyDescriptor for ordinary objects.
    pub fn define_own_property(&mut self, o: JsObject, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        let current = self.get_own_property(o, &key);
        let data = self.object(o);
        if matches!(data.kind, ObjectKind::Namespace { .. }) {
            return false;
        }
        match &current {
            None if !data.extensible => return false,
            Some(current) if current.configurable == Some(false) => {
                if desc.configurable == Some(true) {
                    return false;
                }
                if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                    return false;
                }
                if current.is_data_descriptor() && desc.is_accessor_descriptor() {
                    return false;
                }
                if current.is_data_descriptor() && current.writable == Some(false) {
                    if desc.writable == Some(true) {
                        return false;
                    }
                    if let Some(v) = &desc.value
                        && !super::operations::same_value(v, current.value.as_ref().unwrap_or(&JsValue::Undefined))
                    {
                        return false;
                    }
                }
            }
            _ => {}
        }

        if matches!(self.object(o).kind, ObjectKind::Array(_))
            && (key.array_index().is_some() || key.as_str() == Some("length"))
        {
            if desc.is_accessor_descriptor() {
                return false;
            }
            if let Some(value) = desc.value {
                return self.write_own_value(o, key, value).unwrap_or(false);
            }
            return true;
        }

        let merged = match current {
            Some(mut existing)
                if !(desc.is_accessor_descriptor() && existing.is_data_descriptor())
                    && !(desc.is_data_descriptor() && existing.is_accessor_descriptor()) =>
            {
                if desc.value.is_some() {
                    existing.value = desc.value;
                }
                if desc.writable.is_some() {
                    existing.writable = desc.writable;
                }
                if desc.get.is_some() {
                    existing.get = desc.get;
                }
                if desc.set.is_some() {
                    existing.set = desc.set;
                }
                if desc.enumerable.is_some() {
                    existing.enumerable = desc.enumerable;
                }
                if desc.configurable.is_some() {
                    existing.configurable = desc.configurable;
                }
                existing
            }
            existing => PropertyDescriptor {
                enumerable: desc.enumerable.or(existing.as_ref().and_then(|e| e.enumerable)).or(Some(false)),
                configurable: desc
                    .configurable
                    .or(existing.as_ref().and_then(|e| e.configurable))
                    .or(Some(false)),
                writable: if desc.is_accessor_descriptor() {
                    None
                } else {
                    desc.writable.or(Some(false))
                },
                value: if desc.is_accessor_descriptor() {
                    None
                } else {
                    desc.value.or(Some(JsValue::Undefined))
                },
                get: desc.get,
                set: desc.set,
            },
        };
        self.object_mut(o).insert_property(key, merged);
        true
    }

    pub fn delete_property(&mut self, o: JsObject, key: &PropertyKey) -> bool {
        let data = self.object_mut(o);
        match &mut data.kind {
            ObjectKind::Array(elements) => {
                if let Some(index) = key.array_index() {
                    if data.frozen {
                        return index >= elements.len();
                    }
                    if index + 1 == elements.len() {
                        elements.pop();
                    } else if index < elements.len() {
                        elements[index] = JsValue::Undefined;
                    }
                    return true;
                }
                if key.as_str() == Some("length") {
                    return false;
                }
            }
            ObjectKind::Namespace { exports, .. } => {
                return key.as_str().is_none_or(|name| !exports.iter().any(|(n, _)| &**n == name));
            }
            _ => {}
        }
        match data.properties.get(key) {
            Some(desc) if desc.configurable == Some(false) => false,
            Some(_) => {
                data.remove_property(key);
                true
            }
            None => true,
        }
    }

    /// OrdinaryOwnPropertyKeys: integer indices ascending, then strings in
    /// insertion order, then symbols in insertion order.
    pub fn own_property_keys(&self, o: JsObject) -> Vec<PropertyKey> {
        let data = self.object(o);
        let mut indices: Vec<usize> = Vec::new();
        let mut strings = Vec::new();
        let mut symbols = Vec::new();
        match &data.kind {
            ObjectKind::Array(elements) => indices.extend(0..elements.len()),
            ObjectKind::Primitive(JsValue::String(s)) => indices.extend(0..s.encode_utf16().count()),
            ObjectKind::Namespace { exports, .. } => {
                strings.extend(exports.iter().map(|(n, _)| PropertyKey::String(n.clone())));
            }
            _ => {}
        }
        for key in &data.property_order {
            match key {
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
                k => match k.array_index() {
                    Some(i) => indices.push(i),
                    None => strings.push(k.clone()),
                },
            }
        }
        indices.sort_unstable();
        indices.dedup();
        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::from).collect();
        if matches!(data.kind, ObjectKind::Array(_)) {
            keys.push(PropertyKey::from("length"));
        }
        keys.extend(strings);
        keys.extend(symbols);
        keys
    }

    pub fn own_enumerable_string_keys(&self, o: JsObject) -> Vec<Rc<str>> {
        self.own_property_keys(o)
            .into_iter()
            .filter_map(|key| {
                let enumerable = self.get_own_property(o, &key)?.enumerable == Some(true);
                match key {
                    PropertyKey::String(s) if enumerable => Some(s),
                    _ => None,
                }
            })
            .collect()
    }

    /// Enumerable string keys visible to `for-in`, own keys first, shadowed
    /// keys reported once.
    pub fn for_in_keys(&self, o: JsObject) -> Vec<Rc<str>> {
        let mut seen = FxHashSet::default();
        let mut keys = Vec::new();
        let mut current = Some(o);
        while let Some(obj) = current {
            for key in self.own_property_keys(obj) {
                let PropertyKey::String(name) = &key else {
                    continue;
                };
                if !seen.insert(name.clone()) {
                    continue;
                }
                if self.get_own_property(obj, &key).is_some_and(|d| d.enumerable == Some(true)) {
                    keys.push(name.clone());
                }
            }
            current = self.object(obj).prototype;
        }
        keys
    }

    /// Elements of an array object, or `None` for anything else.
    pub fn array_elements(&self, value: &JsValue) -> Option<&[JsValue]> {
        match &self.object(value.as_object()?).kind {
            ObjectKind::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// Whether iterating `value` can read its elements directly instead of
    /// running the iterator protocol.
    pub fn has_default_array_iteration(&self, value: &JsValue) -> bool {
        let Some(o) = value.as_object() else {
            return false;
        };
        if !matches!(self.object(o).kind, ObjectKind::Array(_)) {
            return false;
        }
        let key = WellKnownSymbol::Iterator.key();
        !self.object(o).properties.contains_key(&key)
            && self.object(o).prototype == Some(self.intrinsics.array_prototype)
            && matches!(
                self.get_data(o, &key).as_object(),
                Some(f) if f == self.intrinsics.array_values
            )
    }
}

fn string_own_property(s: &str, key: &PropertyKey) -> Option<PropertyDescriptor> {
    if key.as_str() == Some("length") {
        return Some(PropertyDescriptor::data(
            JsValue::Number(s.encode_utf16().count() as f64),
            false,
            false,
            false,
        ));
    }
    let index = key.array_index()?;
    let unit = s.encode_utf16().nth(index)?;
    let ch = String::from_utf16_lossy(&[unit]);
    Some(PropertyDescriptor::data(JsValue::string(&ch), false, true, false))
}

impl Trace for PropertyDescriptor {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.value.trace(tracer);
        self.get.trace(tracer);
        self.set.trace(tracer);
    }
}

impl Trace for FunctionData {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            FunctionData::Closure(closure) => closure.trace(tracer),
            FunctionData::Native { slots, .. } => slots.trace(tracer),
            FunctionData::DefaultConstructor { home_object, .. } => tracer.object(*home_object),
            FunctionData::Bound { target, this, args } => {
                tracer.object(*target);
                this.trace(tracer);
                args.trace(tracer);
            }
            FunctionData::PromiseResolver { promise, .. } => tracer.object(*promise),
        }
    }
}

impl Trace for PromiseState {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            PromiseState::Pending {
                fulfill_reactions,
                reject_reactions,
            } => {
                fulfill_reactions.trace(tracer);
                reject_reactions.trace(tracer);
            }
            PromiseState::Fulfilled(value) | PromiseState::Rejected(value) => value.trace(tracer),
        }
    }
}

impl Trace for NamespaceEntry {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            NamespaceEntry::Binding(env, _) => env.trace(tracer),
            NamespaceEntry::Namespace(namespace) => tracer.object(*namespace),
        }
    }
}

impl Trace for ObjectData {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.prototype.trace(tracer);
        for desc in self.properties.values() {
            desc.trace(tracer);
        }
        match &self.kind {
            ObjectKind::Ordinary | ObjectKind::Error => {}
            ObjectKind::Array(values) => values.trace(tracer),
            ObjectKind::Function(function) => function.trace(tracer),
            ObjectKind::Primitive(value) => value.trace(tracer),
            ObjectKind::Promise(state) => state.trace(tracer),
            ObjectKind::Generator(data) => data.frames.trace(tracer),
            ObjectKind::ArrayIterator { target, .. } => target.trace(tracer),
            ObjectKind::Namespace { exports, .. } => {
                for (_, entry) in exports {
                    entry.trace(tracer);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;

    fn realm() -> Realm {
        Realm::new(RealmConfig::default())
    }

    #[test]
    fn array_length_tracks_elements() {
        let mut realm = realm();
        let arr = realm.create_array(vec![JsValue::Number(1.0)]);
        assert!(realm.set_data(arr, PropertyKey::from(3usize), JsValue::Number(4.0)));
        assert!(matches!(realm.get_data_str(arr, "length"), JsValue::Number(n) if n == 4.0));
        assert!(realm.set_data(arr, PropertyKey::from("length"), JsValue::Number(1.0)));
        assert_eq!(realm.array_elements(&JsValue::Object(arr)).map(<[JsValue]>::len), Some(1));
    }

    #[test]
    fn key_order_puts_indices_first() {
        let mut realm = realm();
        let obj = realm.create_object();
        for key in ["b", "2", "a", "0"] {
            realm.set_data(obj, PropertyKey::from(key), JsValue::Null);
        }
        let keys: Vec<String> = realm.own_property_keys(obj).iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["0", "2", "b", "a"]);
    }

    #[test]
    fn non_writable_properties_refuse_writes() {
        let mut realm = realm();
        let obj = realm.create_object();
        realm.define_own_property(
            obj,
            PropertyKey::from("fixed"),
            PropertyDescriptor::data(JsValue::Number(1.0), false, true, false),
        );
        assert!(!realm.set_data(obj, PropertyKey::from("fixed"), JsValue::Number(2.0)));
        assert!(!realm.delete_property(obj, &PropertyKey::from("fixed")));
        assert!(matches!(realm.get_data_str(obj, "fixed"), JsValue::Number(n) if n == 1.0));
    }

    #[test]
    fn inherited_setter_is_reported() {
        let mut realm = realm();
        let proto = realm.create_object();
        let setter = JsValue::Object(realm.create_object());
        realm.define_own_property(
            proto,
            PropertyKey::from("x"),
            PropertyDescriptor::accessor(None, Some(setter), true, true),
        );
        let child = realm.create_object_with_proto(Some(proto));
        let outcome = realm
            .set_property(child, PropertyKey::from("x"), JsValue::Null, &JsValue::Object(child))
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Setter(_)));
    }

    #[test]
    fn string_primitives_expose_length_and_indices() {
        let mut realm = realm();
        let s = JsValue::string("héllo");
        let len = realm.get_property(&s, &PropertyKey::from("length")).unwrap();
        assert!(matches!(len, PropertyLookup::Value(JsValue::Number(n)) if n == 5.0));
        let ch = realm.get_property(&s, &PropertyKey::from(1usize)).unwrap();
        assert!(matches!(ch, PropertyLookup::Value(JsValue::String(c)) if &*c == "é"));
    }
}
