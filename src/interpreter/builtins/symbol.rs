use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{ObjectKind, PropertyDescriptor};
use crate::types::{JsSymbol, JsValue, PropertyKey, WellKnownSymbol};

impl Realm {
    pub(crate) fn setup_symbol(&mut self) {
        let proto = self.intrinsics.symbol_prototype;
        let ctor = self.native_constructor("Symbol", 0, construct, proto);
        for (name, symbol) in [
            ("iterator", WellKnownSymbol::Iterator),
            ("toStringTag", WellKnownSymbol::ToStringTag),
        ] {
            self.object_mut(ctor).insert_property(
                PropertyKey::from(name),
                PropertyDescriptor::data(JsValue::Symbol(symbol.symbol()), false, false, false),
            );
        }
        self.install_method(proto, "toString", 0, to_string);
        self.install_method(proto, "valueOf", 0, value_of);
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::ToStringTag.key(), JsValue::string("Symbol"));
        self.define_global("Symbol", JsValue::Object(ctor));
    }

    /// A fresh symbol, unique within this realm.
    pub fn create_symbol(&mut self, description: Option<std::rc::Rc<str>>) -> JsSymbol {
        let id = self.next_symbol;
        self.next_symbol += 1;
        JsSymbol { id, description }
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    if call.new_target.is_some() {
        return Err(realm.type_error("Symbol is not a constructor"));
    }
    let description = match call.arg(0) {
        JsValue::Undefined => None,
        v => Some(realm.to_js_string(&v)?),
    };
    Ok(CallOutcome::value(JsValue::Symbol(realm.create_symbol(description))))
}

fn this_symbol(realm: &mut Realm, call: &NativeCall) -> Result<JsSymbol, JsValue> {
    match &call.this {
        JsValue::Symbol(s) => Ok(s.clone()),
        JsValue::Object(o) => match &realm.object(*o).kind {
            ObjectKind::Primitive(JsValue::Symbol(s)) => Ok(s.clone()),
            _ => Err(realm.type_error("Symbol.prototype method called on incompatible receiver")),
        },
        _ => Err(realm.type_error("Symbol.prototype method called on incompatible receiver")),
    }
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let symbol = this_symbol(realm, call)?;
    Ok(CallOutcome::value(JsValue::string(&JsValue::Symbol(symbol).to_string())))
}

fn value_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    this_symbol(realm, call).map(|s| CallOutcome::value(JsValue::Symbol(s)))
}
