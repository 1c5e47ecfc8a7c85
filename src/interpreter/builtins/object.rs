use super::this_object;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{ObjectKind, PropertyDescriptor};
use crate::types::{JsValue, PropertyKey};

impl Realm {
    pub(crate) fn setup_object(&mut self) {
        let proto = self.intrinsics.object_prototype;
        let ctor = self.native_constructor("Object", 1, construct, proto);

        // Object.keys / freeze / getPrototypeOf / create
        self.install_method(ctor, "keys", 1, keys);
        self.install_method(ctor, "freeze", 1, freeze);
        self.install_method(ctor, "isFrozen", 1, is_frozen);
        self.install_method(ctor, "getPrototypeOf", 1, get_prototype_of);
        self.install_method(ctor, "create", 2, create);

        // Object.prototype
        self.install_method(proto, "hasOwnProperty", 1, has_own_property);
        self.install_method(proto, "toString", 0, to_string);

        self.define_global("Object", JsValue::Object(ctor));
    }

    /// CopyDataProperties: copies the own enumerable properties of `source`
    /// onto `target`, skipping `excluded`. Accessors read as `undefined`.
    pub fn copy_data_properties(
        &mut self,
        target: crate::types::JsObject,
        source: &JsValue,
        excluded: &[PropertyKey],
    ) -> Result<(), JsValue> {
        if source.is_nullish() {
            return Ok(());
        }
        let from = self.to_object(source)?;
        for key in self.own_property_keys(from) {
            if excluded.contains(&key) {
                continue;
            }
            let Some(desc) = self.get_own_property(from, &key) else {
                continue;
            };
            if desc.enumerable != Some(true) {
                continue;
            }
            let value = desc.value.unwrap_or_default();
            self.define_own_property(target, key, PropertyDescriptor::data_default(value));
        }
        Ok(())
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let value = call.arg(0);
    if value.is_nullish() {
        return Ok(CallOutcome::value(JsValue::Object(realm.create_object())));
    }
    realm.to_object(&value).map(|o| CallOutcome::value(JsValue::Object(o)))
}

fn keys(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = realm.to_object(&call.arg(0))?;
    let names = realm
        .own_enumerable_string_keys(o)
        .into_iter()
        .map(JsValue::String)
        .collect();
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(names))))
}

fn freeze(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let value = call.arg(0);
    let Some(o) = value.as_object() else {
        return Ok(CallOutcome::value(value));
    };
    for key in realm.own_property_keys(o) {
        let Some(desc) = realm.get_own_property(o, &key) else {
            continue;
        };
        let frozen = PropertyDescriptor {
            writable: desc.is_data_descriptor().then_some(false),
            configurable: Some(false),
            ..PropertyDescriptor::default()
        };
        realm.define_own_property(o, key, frozen);
    }
    let data = realm.object_mut(o);
    data.extensible = false;
    data.frozen = true;
    Ok(CallOutcome::value(value))
}

fn is_frozen(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let Some(o) = call.arg(0).as_object() else {
        return Ok(CallOutcome::value(JsValue::Boolean(true)));
    };
    if realm.is_extensible(o) {
        return Ok(CallOutcome::value(JsValue::Boolean(false)));
    }
    let locked = realm.own_property_keys(o).iter().all(|key| {
        realm
            .get_own_property(o, key)
            .is_none_or(|d| d.configurable == Some(false) && d.writable != Some(true))
    });
    Ok(CallOutcome::value(JsValue::Boolean(locked)))
}

fn get_prototype_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = realm.to_object(&call.arg(0))?;
    let proto = realm.object(o).prototype.map(JsValue::Object).unwrap_or(JsValue::Null);
    Ok(CallOutcome::value(proto))
}

fn create(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let proto = match call.arg(0) {
        JsValue::Object(p) => Some(p),
        JsValue::Null => None,
        other => {
            let message = format!("Object prototype may only be an Object or null: {}", realm.describe(&other));
            return Err(realm.type_error(message));
        }
    };
    let o = realm.create_object_with_proto(proto);
    realm.copy_data_properties(o, &call.arg(1), &[])?;
    Ok(CallOutcome::value(JsValue::Object(o)))
}

fn has_own_property(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let key = realm.to_property_key(&call.arg(0))?;
    let o = this_object(realm, call)?;
    Ok(CallOutcome::value(JsValue::Boolean(realm.has_own_property(o, &key))))
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let tag = match &call.this {
        JsValue::Undefined => "Undefined".to_string(),
        JsValue::Null => "Null".to_string(),
        this => {
            let o = realm.to_object(this)?;
            let data = realm.object(o);
            match &data.kind {
                ObjectKind::Array(_) => "Array".to_string(),
                ObjectKind::Function(_) => "Function".to_string(),
                ObjectKind::Error => "Error".to_string(),
                ObjectKind::Primitive(JsValue::Boolean(_)) => "Boolean".to_string(),
                ObjectKind::Primitive(JsValue::Number(_)) => "Number".to_string(),
                ObjectKind::Primitive(JsValue::String(_)) => "String".to_string(),
                _ => match realm.get_data(o, &crate::types::WellKnownSymbol::ToStringTag.key()) {
                    JsValue::String(t) => t.to_string(),
                    _ => "Object".to_string(),
                },
            }
        }
    };
    Ok(CallOutcome::value(JsValue::String(format!("[object {tag}]").into())))
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;
    use crate::types::{JsValue, PropertyKey};

    #[test]
    fn copy_skips_excluded_and_non_enumerable() {
        let mut realm = Realm::new(RealmConfig::default());
        let source = realm.create_object();
        realm.set_data(source, PropertyKey::from("a"), JsValue::Number(1.0));
        realm.set_data(source, PropertyKey::from("b"), JsValue::Number(2.0));
        realm
            .object_mut(source)
            .insert_builtin("hidden", JsValue::Number(3.0));
        let target = realm.create_object();
        realm
            .copy_data_properties(target, &JsValue::Object(source), &[PropertyKey::from("a")])
            .unwrap();
        let keys: Vec<String> = realm.own_property_keys(target).iter().map(ToString::to_string).collect();
        assert_eq!(keys, ["b"]);
    }
}
