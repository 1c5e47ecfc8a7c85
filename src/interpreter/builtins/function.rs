use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall, begin_call};
use crate::interpreter::object::{FunctionData, ObjectData, ObjectKind, PropertyDescriptor};
use crate::types::{JsValue, PropertyKey};

impl Realm {
    pub(crate) fn setup_function(&mut self) {
        let proto = self.intrinsics.function_prototype;
        self.name_native(proto, "", 0);
        let ctor = self.native_constructor("Function", 1, construct, proto);

        // Function.prototype.call / apply / bind
        self.install_method(proto, "call", 1, call);
        self.install_method(proto, "apply", 2, apply);
        self.install_method(proto, "bind", 1, bind);
        self.install_method(proto, "toString", 0, to_string);

        self.define_global("Function", JsValue::Object(ctor));
    }

    /// Values of an array-like object, reading data properties only.
    pub(crate) fn list_from_array_like(&mut self, value: &JsValue) -> Result<Vec<JsValue>, JsValue> {
        if value.is_nullish() {
            return Ok(Vec::new());
        }
        if let Some(elements) = self.array_elements(value) {
            return Ok(elements.to_vec());
        }
        let Some(o) = value.as_object() else {
            return Err(self.type_error("CreateListFromArrayLike called on non-object"));
        };
        let length = self.get_data_str(o, "length");
        let length = self.to_number(&length)?;
        let length = if length.is_finite() && length > 0.0 { length as usize } else { 0 };
        Ok((0..length).map(|i| self.get_data(o, &PropertyKey::from(i))).collect())
    }
}

/// `Function.prototype` itself: callable, returns `undefined`.
pub(super) fn empty(_realm: &mut Realm, _call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    Ok(CallOutcome::undefined())
}

fn construct(realm: &mut Realm, _call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    Err(realm.type_error("Code generation from strings is not supported"))
}

fn call(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let mut args = std::mem::take(&mut call.args);
    let this = if args.is_empty() { JsValue::Undefined } else { args.remove(0) };
    Ok(begin_call(realm, &call.this, this, args))
}

fn apply(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let args = realm.list_from_array_like(&call.arg(1))?;
    Ok(begin_call(realm, &call.this, call.arg(0), args))
}

fn bind(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let Some(target) = call.this.as_object().filter(|o| realm.object(*o).is_callable()) else {
        return Err(realm.type_error("Bind must be called on a function"));
    };
    let mut args = std::mem::take(&mut call.args);
    let this = if args.is_empty() { JsValue::Undefined } else { args.remove(0) };
    let length = match realm.get_data_str(target, "length") {
        JsValue::Number(n) if n.is_finite() => (n - args.len() as f64).max(0.0),
        _ => 0.0,
    };
    let name = match realm.get_data_str(target, "name") {
        JsValue::String(s) => format!("bound {s}"),
        _ => "bound ".to_string(),
    };
    let proto = realm.object(target).prototype;
    let bound = realm.alloc(ObjectData::new(
        ObjectKind::Function(FunctionData::Bound { target, this, args }),
        proto,
    ));
    let data = realm.object_mut(bound);
    data.insert_property(
        PropertyKey::from("length"),
        PropertyDescriptor::data(JsValue::Number(length), false, false, true),
    );
    data.insert_property(
        PropertyKey::from("name"),
        PropertyDescriptor::data(JsValue::string(&name), false, false, true),
    );
    Ok(CallOutcome::value(JsValue::Object(bound)))
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    if !realm.is_callable(&call.this) {
        return Err(realm.type_error("Function.prototype.toString requires that 'this' be a Function"));
    }
    let text = realm.to_js_string(&call.this)?;
    Ok(CallOutcome::value(JsValue::String(text)))
}
