use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{ObjectData, ObjectKind};
use crate::interpreter::operations::to_boolean;
use crate::types::JsValue;

impl Realm {
    pub(crate) fn setup_boolean(&mut self) {
        let proto = self.intrinsics.boolean_prototype;
        let ctor = self.native_constructor("Boolean", 1, construct, proto);
        self.install_method(proto, "toString", 0, to_string);
        self.install_method(proto, "valueOf", 0, value_of);
        self.define_global("Boolean", JsValue::Object(ctor));
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let value = JsValue::Boolean(to_boolean(&call.arg(0)));
    let Some(target) = call.new_target.as_ref().and_then(JsValue::as_object) else {
        return Ok(CallOutcome::value(value));
    };
    let default = realm.intrinsics.boolean_prototype;
    let proto = realm.prototype_from_constructor(target, default);
    let wrapper = realm.alloc(ObjectData::new(ObjectKind::Primitive(value), Some(proto)));
    Ok(CallOutcome::value(JsValue::Object(wrapper)))
}

fn this_boolean(realm: &mut Realm, call: &NativeCall) -> Result<bool, JsValue> {
    match &call.this {
        JsValue::Boolean(b) => Ok(*b),
        JsValue::Object(o) => match realm.object(*o).kind {
            ObjectKind::Primitive(JsValue::Boolean(b)) => Ok(b),
            _ => Err(realm.type_error("Boolean.prototype method called on incompatible receiver")),
        },
        _ => Err(realm.type_error("Boolean.prototype method called on incompatible receiver")),
    }
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let b = this_boolean(realm, call)?;
    Ok(CallOutcome::value(JsValue::string(if b { "true" } else { "false" })))
}

fn value_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    this_boolean(realm, call).map(|b| CallOutcome::value(JsValue::Boolean(b)))
}
