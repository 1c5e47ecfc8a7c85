use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall, NativeFn};
use crate::interpreter::object::{ObjectData, ObjectKind};
use crate::types::{JsObject, JsValue};

const NATIVE_ERRORS: [(&str, NativeFn); 4] = [
    ("TypeError", type_error),
    ("ReferenceError", reference_error),
    ("RangeError", range_error),
    ("SyntaxError", syntax_error),
];

impl Realm {
    pub(crate) fn setup_error(&mut self) {
        let proto = self.intrinsics.error_prototype;
        self.object_mut(proto).class_name = "Error";
        let error_ctor = self.native_constructor("Error", 1, error, proto);
        self.object_mut(proto).insert_builtin("name", JsValue::string("Error"));
        self.object_mut(proto).insert_builtin("message", JsValue::string(""));
        self.install_method(proto, "toString", 0, to_string);
        self.define_global("Error", JsValue::Object(error_ctor));

        // TypeError, ReferenceError, RangeError, SyntaxError
        for (name, func) in NATIVE_ERRORS {
            let sub_proto = self.create_object_with_proto(Some(proto));
            let ctor = self.native_constructor(name, 1, func, sub_proto);
            self.object_mut(ctor).prototype = Some(error_ctor);
            self.object_mut(sub_proto).insert_builtin("name", JsValue::string(name));
            self.object_mut(sub_proto).insert_builtin("message", JsValue::string(""));
            self.intrinsics.native_errors.push((name, sub_proto));
            self.define_global(name, JsValue::Object(ctor));
        }
    }

    fn error_prototype_for(&self, name: &str) -> JsObject {
        self.intrinsics
            .native_errors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
            .unwrap_or(self.intrinsics.error_prototype)
    }

    fn alloc_error(&mut self, proto: JsObject, message: Option<&str>) -> JsObject {
        let error = self.alloc(ObjectData::new(ObjectKind::Error, Some(proto)));
        if let Some(message) = message {
            self.object_mut(error).insert_builtin("message", JsValue::string(message));
        }
        error
    }

    /// A new error object of the named native error type.
    pub fn create_error(&mut self, name: &str, message: &str) -> JsValue {
        let proto = self.error_prototype_for(name);
        JsValue::Object(self.alloc_error(proto, Some(message)))
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall, name: &str) -> Result<CallOutcome, JsValue> {
    let default = realm.error_prototype_for(name);
    let proto = match call.new_target.as_ref().and_then(JsValue::as_object) {
        Some(target) => realm.prototype_from_constructor(target, default),
        None => default,
    };
    let message = match call.arg(0) {
        JsValue::Undefined => None,
        v => Some(realm.to_js_string(&v)?),
    };
    let error = realm.alloc_error(proto, message.as_deref());
    Ok(CallOutcome::value(JsValue::Object(error)))
}

fn error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    construct(realm, call, "Error")
}

fn type_error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    construct(realm, call, "TypeError")
}

fn reference_error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    construct(realm, call, "ReferenceError")
}

fn range_error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    construct(realm, call, "RangeError")
}

fn syntax_error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    construct(realm, call, "SyntaxError")
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let Some(o) = call.this.as_object() else {
        return Err(realm.type_error("Error.prototype.toString called on non-object"));
    };
    let text = realm.error_to_string(o);
    Ok(CallOutcome::value(JsValue::string(&text)))
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;

    #[test]
    fn native_errors_render_name_and_message() {
        let mut realm = Realm::new(RealmConfig::default());
        let error = realm.create_error("RangeError", "out of range");
        let o = error.as_object().unwrap();
        assert_eq!(realm.error_to_string(o), "RangeError: out of range");
        assert_eq!(realm.display(&error), "RangeError: out of range");
    }
}
