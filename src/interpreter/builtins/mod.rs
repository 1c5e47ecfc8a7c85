//! Built-in objects.
//!
//! Prototypes that the object model itself needs (for primitives, arrays,
//! functions and iterators) are allocated first as bare objects so that
//! every later allocation can point at them; each `setup_*` pass then fills
//! in constructors and methods.

pub(crate) mod array;
mod boolean;
pub(crate) mod console;
mod error;
mod function;
pub(crate) mod generator;
pub(crate) mod iterators;
mod math;
mod number;
mod object;
pub(crate) mod promise;
mod string;
mod symbol;
pub(crate) mod timers;

use std::rc::Rc;

use super::Realm;
use super::call::{NativeCall, NativeFn};
use super::gc::{Trace, Tracer};
use super::heap::Heap;
use super::object::{FunctionData, ObjectData, ObjectKind, PropertyDescriptor};
use crate::types::{JsObject, JsValue, PropertyKey};

/// Objects the engine refers to directly.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    pub object_prototype: JsObject,
    pub function_prototype: JsObject,
    pub array_prototype: JsObject,
    pub boolean_prototype: JsObject,
    pub number_prototype: JsObject,
    pub string_prototype: JsObject,
    pub symbol_prototype: JsObject,
    pub bigint_prototype: JsObject,
    pub error_prototype: JsObject,
    pub iterator_prototype: JsObject,
    pub array_iterator_prototype: JsObject,
    pub generator_prototype: JsObject,
    pub promise_prototype: JsObject,
    /// `Array.prototype.values`, also `Array.prototype[Symbol.iterator]`.
    pub array_values: JsObject,
    /// `%ArrayIteratorPrototype%.next`.
    pub array_iterator_next: JsObject,
    /// Prototypes of the native error constructors, by name.
    pub native_errors: Vec<(&'static str, JsObject)>,
}

fn native(name: &str, func: NativeFn, constructor: bool) -> ObjectKind {
    ObjectKind::Function(FunctionData::Native {
        name: Rc::from(name),
        func,
        constructor,
        slots: Vec::new(),
    })
}

impl Intrinsics {
    /// Allocates the bare intrinsic objects into an empty heap.
    pub(crate) fn allocate(heap: &mut Heap) -> Self {
        let mut alloc = |kind: ObjectKind, prototype: Option<JsObject>| heap.alloc(ObjectData::new(kind, prototype));
        let object_prototype = alloc(ObjectKind::Ordinary, None);
        let op = Some(object_prototype);
        let function_prototype = alloc(native("", function::empty, false), op);
        let array_prototype = alloc(ObjectKind::Array(Vec::new()), op);
        let boolean_prototype = alloc(ObjectKind::Primitive(JsValue::Boolean(false)), op);
        let number_prototype = alloc(ObjectKind::Primitive(JsValue::Number(0.0)), op);
        let string_prototype = alloc(ObjectKind::Primitive(JsValue::string("")), op);
        let symbol_prototype = alloc(ObjectKind::Ordinary, op);
        let bigint_prototype = alloc(ObjectKind::Ordinary, op);
        let error_prototype = alloc(ObjectKind::Ordinary, op);
        let iterator_prototype = alloc(ObjectKind::Ordinary, op);
        let array_iterator_prototype = alloc(ObjectKind::Ordinary, Some(iterator_prototype));
        let generator_prototype = alloc(ObjectKind::Ordinary, Some(iterator_prototype));
        let promise_prototype = alloc(ObjectKind::Ordinary, op);
        let array_values = alloc(native("values", array::values, false), Some(function_prototype));
        let array_iterator_next = alloc(
            native("next", iterators::array_iterator_next, false),
            Some(function_prototype),
        );
        Self {
            object_prototype,
            function_prototype,
            array_prototype,
            boolean_prototype,
            number_prototype,
            string_prototype,
            symbol_prototype,
            bigint_prototype,
            error_prototype,
            iterator_prototype,
            array_iterator_prototype,
            generator_prototype,
            promise_prototype,
            array_values,
            array_iterator_next,
            native_errors: Vec::new(),
        }
    }
}

impl Realm {
    pub(crate) fn setup_globals(&mut self) {
        self.setup_object();
        self.setup_function();
        self.setup_symbol();
        self.setup_error();
        self.setup_array();
        self.setup_iterators();
        self.setup_generator();
        self.setup_string();
        self.setup_number();
        self.setup_boolean();
        self.setup_math();
        self.setup_promise();
        self.setup_console();
        self.setup_timers();

        // Value properties of the global object.
        let global = self.global_object();
        self.define_global("globalThis", JsValue::Object(global));
        for (name, value) in [
            ("undefined", JsValue::Undefined),
            ("NaN", JsValue::Number(f64::NAN)),
            ("Infinity", JsValue::Number(f64::INFINITY)),
        ] {
            self.define_own_property(
                global,
                PropertyKey::from(name),
                PropertyDescriptor::data(value, false, false, false),
            );
        }
    }

    /// Gives a native function object its `name` and `length`.
    fn name_native(&mut self, f: JsObject, name: &str, length: usize) {
        let data = self.object_mut(f);
        data.insert_property(
            PropertyKey::from("length"),
            PropertyDescriptor::data(JsValue::Number(length as f64), false, false, true),
        );
        data.insert_property(
            PropertyKey::from("name"),
            PropertyDescriptor::data(JsValue::string(name), false, false, true),
        );
    }

    /// Allocates a native function. `slots` is state captured by natives
    /// created at run time (resolving functions, `finally` callbacks).
    pub(crate) fn native_function(&mut self, name: &str, length: usize, func: NativeFn, slots: Vec<JsValue>) -> JsObject {
        let proto = self.intrinsics.function_prototype;
        let kind = ObjectKind::Function(FunctionData::Native {
            name: Rc::from(name),
            func,
            constructor: false,
            slots,
        });
        let f = self.alloc(ObjectData::new(kind, Some(proto)));
        self.name_native(f, name, length);
        f
    }

    /// Allocates a native constructor linked both ways with `prototype`.
    pub(crate) fn native_constructor(&mut self, name: &str, length: usize, func: NativeFn, prototype: JsObject) -> JsObject {
        let proto = self.intrinsics.function_prototype;
        let f = self.alloc(ObjectData::new(native(name, func, true), Some(proto)));
        self.name_native(f, name, length);
        self.object_mut(f).insert_property(
            PropertyKey::from("prototype"),
            PropertyDescriptor::data(JsValue::Object(prototype), false, false, false),
        );
        self.object_mut(prototype).insert_builtin("constructor", JsValue::Object(f));
        f
    }

    /// Installs a native method as a non-enumerable property of `target`.
    pub(crate) fn install_method(&mut self, target: JsObject, name: &str, length: usize, func: NativeFn) -> JsObject {
        let f = self.native_function(name, length, func, Vec::new());
        self.object_mut(target).insert_builtin(name, JsValue::Object(f));
        f
    }

    /// Like [`Realm::install_method`] for an already allocated function.
    fn install_existing(&mut self, target: JsObject, key: impl Into<PropertyKey>, name: &str, length: usize, f: JsObject) {
        self.name_native(f, name, length);
        self.object_mut(target).insert_builtin(key, JsValue::Object(f));
    }

    /// A writable, configurable, non-enumerable global property.
    pub(crate) fn define_global(&mut self, name: &str, value: JsValue) {
        let global = self.global_object();
        self.object_mut(global).insert_builtin(name, value);
    }
}

/// The `this` value of a native call as an object.
fn this_object(realm: &mut Realm, call: &NativeCall) -> Result<JsObject, JsValue> {
    realm.to_object(&call.this)
}

/// Captured slot `index` of the native being called.
fn slot(realm: &Realm, call: &NativeCall, index: usize) -> JsValue {
    match realm.object(call.function).function() {
        Some(FunctionData::Native { slots, .. }) => slots.get(index).cloned().unwrap_or_default(),
        _ => JsValue::Undefined,
    }
}

/// Argument `index` converted to an integer, with a default for `undefined`.
fn integer_arg(realm: &mut Realm, call: &NativeCall, index: usize, default: f64) -> Result<f64, JsValue> {
    match call.arg(index) {
        JsValue::Undefined => Ok(default),
        v => realm.to_number(&v).map(super::operations::to_integer_or_infinity),
    }
}

impl Trace for Intrinsics {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for o in [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.boolean_prototype,
            self.number_prototype,
            self.string_prototype,
            self.symbol_prototype,
            self.bigint_prototype,
            self.error_prototype,
            self.iterator_prototype,
            self.array_iterator_prototype,
            self.generator_prototype,
            self.promise_prototype,
            self.array_values,
            self.array_iterator_next,
        ] {
            tracer.object(o);
        }
        for (_, prototype) in &self.native_errors {
            tracer.object(*prototype);
        }
    }
}
