//! `String` and `String.prototype`. Indices count UTF-16 code units.

use std::rc::Rc;

use super::integer_arg;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{IteratorKind, ObjectData, ObjectKind};
use crate::types::{JsValue, WellKnownSymbol};

impl Realm {
    pub(crate) fn setup_string(&mut self) {
        let proto = self.intrinsics.string_prototype;
        let ctor = self.native_constructor("String", 1, construct, proto);
        self.install_method(ctor, "fromCharCode", 1, from_char_code);

        self.install_method(proto, "toString", 0, value_of);
        self.install_method(proto, "valueOf", 0, value_of);
        self.install_method(proto, "charAt", 1, char_at);
        self.install_method(proto, "charCodeAt", 1, char_code_at);
        self.install_method(proto, "indexOf", 1, index_of);
        self.install_method(proto, "includes", 1, includes);
        self.install_method(proto, "startsWith", 1, starts_with);
        self.install_method(proto, "endsWith", 1, ends_with);
        self.install_method(proto, "slice", 2, slice);
        self.install_method(proto, "substring", 2, substring);
        self.install_method(proto, "toUpperCase", 0, to_upper_case);
        self.install_method(proto, "toLowerCase", 0, to_lower_case);
        self.install_method(proto, "trim", 0, trim);
        self.install_method(proto, "split", 2, split);
        self.install_method(proto, "repeat", 1, repeat);
        self.install_method(proto, "padStart", 2, pad_start);
        self.install_method(proto, "padEnd", 2, pad_end);
        self.install_method(proto, "concat", 1, concat);
        let iterator = self.native_function("[Symbol.iterator]", 0, iterator, Vec::new());
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::Iterator.key(), JsValue::Object(iterator));

        self.define_global("String", JsValue::Object(ctor));
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let text: Rc<str> = match call.args.first() {
        None => Rc::from(""),
        Some(JsValue::Symbol(s)) if call.new_target.is_none() => Rc::from(JsValue::Symbol(s.clone()).to_string()),
        Some(v) => realm.to_js_string(v)?,
    };
    let Some(target) = call.new_target.as_ref().and_then(JsValue::as_object) else {
        return Ok(CallOutcome::value(JsValue::String(text)));
    };
    let default = realm.intrinsics.string_prototype;
    let proto = realm.prototype_from_constructor(target, default);
    let wrapper = realm.alloc(ObjectData::new(ObjectKind::Primitive(JsValue::String(text)), Some(proto)));
    Ok(CallOutcome::value(JsValue::Object(wrapper)))
}

fn from_char_code(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let mut units = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        units.push(crate::types::number_ops::to_uint32(realm.to_number(arg)?) as u16);
    }
    Ok(CallOutcome::value(JsValue::string(&String::from_utf16_lossy(&units))))
}

/// RequireObjectCoercible(this) then ToString.
fn this_string(realm: &mut Realm, call: &NativeCall) -> Result<Rc<str>, JsValue> {
    match &call.this {
        JsValue::String(s) => Ok(s.clone()),
        JsValue::Undefined | JsValue::Null => {
            Err(realm.type_error("String.prototype method called on null or undefined"))
        }
        other => realm.to_js_string(other),
    }
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> JsValue {
    JsValue::string(&String::from_utf16_lossy(units))
}

fn string_arg(realm: &mut Realm, call: &NativeCall, index: usize) -> Result<Vec<u16>, JsValue> {
    let s = realm.to_js_string(&call.arg(index))?;
    Ok(units(&s))
}

fn clamp(value: f64, length: usize) -> usize {
    value.clamp(0.0, length as f64) as usize
}

fn find(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    (from..haystack.len()).find(|i| haystack[*i..].starts_with(needle))
}

fn value_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    match &call.this {
        JsValue::String(s) => Ok(CallOutcome::value(JsValue::String(s.clone()))),
        JsValue::Object(o) => match &realm.object(*o).kind {
            ObjectKind::Primitive(JsValue::String(s)) => Ok(CallOutcome::value(JsValue::String(s.clone()))),
            _ => Err(realm.type_error("String.prototype.valueOf requires that 'this' be a String")),
        },
        _ => Err(realm.type_error("String.prototype.valueOf requires that 'this' be a String")),
    }
}

fn char_at(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let position = integer_arg(realm, call, 0, 0.0)?;
    let unit = (position >= 0.0).then(|| s.get(position as usize)).flatten();
    Ok(CallOutcome::value(from_units(unit.map(std::slice::from_ref).unwrap_or_default())))
}

fn char_code_at(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let position = integer_arg(realm, call, 0, 0.0)?;
    let unit = (position >= 0.0).then(|| s.get(position as usize)).flatten();
    Ok(CallOutcome::value(JsValue::Number(unit.map_or(f64::NAN, |u| f64::from(*u)))))
}

fn index_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let needle = string_arg(realm, call, 0)?;
    let from = clamp(integer_arg(realm, call, 1, 0.0)?, s.len());
    let index = find(&s, &needle, from).map_or(-1.0, |i| i as f64);
    Ok(CallOutcome::value(JsValue::Number(index)))
}

fn includes(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let needle = string_arg(realm, call, 0)?;
    let from = clamp(integer_arg(realm, call, 1, 0.0)?, s.len());
    Ok(CallOutcome::value(JsValue::Boolean(find(&s, &needle, from).is_some())))
}

fn starts_with(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let needle = string_arg(realm, call, 0)?;
    let from = clamp(integer_arg(realm, call, 1, 0.0)?, s.len());
    Ok(CallOutcome::value(JsValue::Boolean(s[from..].starts_with(&needle))))
}

fn ends_with(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let needle = string_arg(realm, call, 0)?;
    let end = clamp(integer_arg(realm, call, 1, s.len() as f64)?, s.len());
    Ok(CallOutcome::value(JsValue::Boolean(s[..end].ends_with(&needle))))
}

fn slice(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let len = s.len() as f64;
    let relative = |v: f64| (if v < 0.0 { (len + v).max(0.0) } else { v.min(len) }) as usize;
    let start = relative(integer_arg(realm, call, 0, 0.0)?);
    let end = relative(integer_arg(realm, call, 1, len)?);
    Ok(CallOutcome::value(from_units(&s[start..end.max(start)])))
}

fn substring(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let start = clamp(integer_arg(realm, call, 0, 0.0)?, s.len());
    let end = clamp(integer_arg(realm, call, 1, s.len() as f64)?, s.len());
    Ok(CallOutcome::value(from_units(&s[start.min(end)..start.max(end)])))
}

fn to_upper_case(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    Ok(CallOutcome::value(JsValue::string(&s.to_uppercase())))
}

fn to_lower_case(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    Ok(CallOutcome::value(JsValue::string(&s.to_lowercase())))
}

fn trim(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    Ok(CallOutcome::value(JsValue::string(s.trim())))
}

fn split(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    let limit = match call.arg(1) {
        JsValue::Undefined => u32::MAX as usize,
        v => crate::types::number_ops::to_uint32(realm.to_number(&v)?) as usize,
    };
    let parts: Vec<JsValue> = match call.arg(0) {
        JsValue::Undefined => vec![JsValue::String(s)],
        separator => {
            let separator = realm.to_js_string(&separator)?;
            if separator.is_empty() {
                units(&s).chunks(1).map(from_units).collect()
            } else {
                s.split(&*separator).map(JsValue::string).collect()
            }
        }
    };
    let parts = parts.into_iter().take(limit).collect();
    Ok(CallOutcome::value(JsValue::Object(realm.create_array(parts))))
}

fn repeat(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    let count = integer_arg(realm, call, 0, 0.0)?;
    if count < 0.0 || count.is_infinite() {
        return Err(realm.range_error(format!("Invalid count value: {count}")));
    }
    Ok(CallOutcome::value(JsValue::string(&s.repeat(count as usize))))
}

fn pad(realm: &mut Realm, call: &NativeCall, at_start: bool) -> Result<CallOutcome, JsValue> {
    let s = units(&this_string(realm, call)?);
    let target = integer_arg(realm, call, 0, 0.0)?;
    let filler = match call.arg(1) {
        JsValue::Undefined => vec![u16::from(b' ')],
        v => units(&realm.to_js_string(&v)?),
    };
    if target <= s.len() as f64 || filler.is_empty() {
        return Ok(CallOutcome::value(from_units(&s)));
    }
    let fill: Vec<u16> = filler.iter().copied().cycle().take(target as usize - s.len()).collect();
    let padded = if at_start { [fill, s].concat() } else { [s, fill].concat() };
    Ok(CallOutcome::value(from_units(&padded)))
}

fn pad_start(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    pad(realm, call, true)
}

fn pad_end(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    pad(realm, call, false)
}

fn concat(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let mut text = this_string(realm, call)?.to_string();
    for arg in call.args.clone() {
        text.push_str(&realm.to_js_string(&arg)?);
    }
    Ok(CallOutcome::value(JsValue::string(&text)))
}

/// `String.prototype[Symbol.iterator]`: iterates code points.
fn iterator(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let s = this_string(realm, call)?;
    let chars = s.chars().map(|c| JsValue::string(c.encode_utf8(&mut [0; 4]))).collect();
    let array = realm.create_array(chars);
    Ok(CallOutcome::value(realm.create_array_iterator(JsValue::Object(array), IteratorKind::Value)))
}

#[cfg(test)]
mod tests {
    use super::{find, units};

    #[test]
    fn find_counts_code_units() {
        let haystack = units("a😀b");
        assert_eq!(find(&haystack, &units("b"), 0), Some(3));
        assert_eq!(find(&haystack, &units(""), 4), Some(4));
        assert_eq!(find(&haystack, &units("c"), 0), None);
    }
}
