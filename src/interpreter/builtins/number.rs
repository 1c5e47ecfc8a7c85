use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{ObjectData, ObjectKind, PropertyDescriptor};
use crate::types::{JsValue, PropertyKey, number_ops};

impl Realm {
    pub(crate) fn setup_number(&mut self) {
        let proto = self.intrinsics.number_prototype;
        let ctor = self.native_constructor("Number", 1, construct, proto);
        for (name, value) in [
            ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
            ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
            ("EPSILON", f64::EPSILON),
            ("MAX_VALUE", f64::MAX),
            ("POSITIVE_INFINITY", f64::INFINITY),
            ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
            ("NaN", f64::NAN),
        ] {
            self.object_mut(ctor).insert_property(
                PropertyKey::from(name),
                PropertyDescriptor::data(JsValue::Number(value), false, false, false),
            );
        }
        self.install_method(ctor, "isInteger", 1, is_integer);
        self.install_method(ctor, "isFinite", 1, number_is_finite);
        self.install_method(ctor, "isNaN", 1, number_is_nan);
        self.install_method(proto, "toString", 1, to_string);
        self.install_method(proto, "toFixed", 1, to_fixed);
        self.install_method(proto, "valueOf", 0, value_of);
        self.define_global("Number", JsValue::Object(ctor));

        let global = self.global_object();
        self.install_method(global, "isNaN", 1, is_nan);
        self.install_method(global, "isFinite", 1, is_finite);
        self.install_method(global, "parseInt", 2, parse_int);
        self.install_method(global, "parseFloat", 1, parse_float);
    }
}

fn construct(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let n = match call.args.first() {
        None => 0.0,
        Some(v) => realm.to_number(v)?,
    };
    let Some(target) = call.new_target.as_ref().and_then(JsValue::as_object) else {
        return Ok(CallOutcome::value(JsValue::Number(n)));
    };
    let default = realm.intrinsics.number_prototype;
    let proto = realm.prototype_from_constructor(target, default);
    let wrapper = realm.alloc(ObjectData::new(ObjectKind::Primitive(JsValue::Number(n)), Some(proto)));
    Ok(CallOutcome::value(JsValue::Object(wrapper)))
}

fn this_number(realm: &mut Realm, call: &NativeCall) -> Result<f64, JsValue> {
    match &call.this {
        JsValue::Number(n) => Ok(*n),
        JsValue::Object(o) => match realm.object(*o).kind {
            ObjectKind::Primitive(JsValue::Number(n)) => Ok(n),
            _ => Err(realm.type_error("Number.prototype method called on incompatible receiver")),
        },
        _ => Err(realm.type_error("Number.prototype method called on incompatible receiver")),
    }
}

fn to_string(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let n = this_number(realm, call)?;
    let radix = super::integer_arg(realm, call, 0, 10.0)?;
    if !(2.0..=36.0).contains(&radix) {
        return Err(realm.range_error("toString() radix must be between 2 and 36"));
    }
    let text = if radix == 10.0 { number_ops::to_string(n) } else { to_radix(n, radix as u32) };
    Ok(CallOutcome::value(JsValue::string(&text)))
}

/// Non-decimal rendering; fractions are cut after 20 digits.
fn to_radix(n: f64, radix: u32) -> String {
    if !n.is_finite() {
        return number_ops::to_string(n);
    }
    let digit = |d: u32| std::char::from_digit(d, radix).unwrap_or('0');
    let mut int = n.abs().trunc();
    let mut frac = n.abs() - int;
    let mut digits = Vec::new();
    loop {
        digits.push(digit((int % radix as f64) as u32));
        int = (int / radix as f64).trunc();
        if int == 0.0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    let mut text: String = digits.into_iter().rev().collect();
    if frac > 0.0 {
        text.push('.');
        for _ in 0..20 {
            frac *= radix as f64;
            let d = frac.trunc();
            text.push(digit(d as u32));
            frac -= d;
            if frac == 0.0 {
                break;
            }
        }
    }
    text
}

fn to_fixed(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let n = this_number(realm, call)?;
    let digits = super::integer_arg(realm, call, 0, 0.0)?;
    if !(0.0..=100.0).contains(&digits) {
        return Err(realm.range_error("toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(CallOutcome::value(JsValue::string(&number_ops::to_string(n))));
    }
    Ok(CallOutcome::value(JsValue::string(&format!("{n:.*}", digits as usize))))
}

fn value_of(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    this_number(realm, call).map(|n| CallOutcome::value(JsValue::Number(n)))
}

fn is_integer(_realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = matches!(call.arg(0), JsValue::Number(n) if n.is_finite() && n.trunc() == n);
    Ok(CallOutcome::value(JsValue::Boolean(result)))
}

fn number_is_finite(_realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = matches!(call.arg(0), JsValue::Number(n) if n.is_finite());
    Ok(CallOutcome::value(JsValue::Boolean(result)))
}

fn number_is_nan(_realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = matches!(call.arg(0), JsValue::Number(n) if n.is_nan());
    Ok(CallOutcome::value(JsValue::Boolean(result)))
}

fn is_nan(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let n = realm.to_number(&call.arg(0))?;
    Ok(CallOutcome::value(JsValue::Boolean(n.is_nan())))
}

fn is_finite(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let n = realm.to_number(&call.arg(0))?;
    Ok(CallOutcome::value(JsValue::Boolean(n.is_finite())))
}

fn parse_int(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let text = realm.to_js_string(&call.arg(0))?;
    let radix = super::integer_arg(realm, call, 1, 0.0)? as u32;
    Ok(CallOutcome::value(JsValue::Number(parse_integer(&text, radix))))
}

fn parse_integer(text: &str, radix: u32) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, text) = match (radix, text.get(..2)) {
        (0 | 16, Some("0x" | "0X")) => (16, &text[2..]),
        (0, _) => (10, text),
        (r, _) if (2..=36).contains(&r) => (r, text),
        _ => return f64::NAN,
    };
    let digits: Vec<u32> = text.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits.iter().fold(0.0, |acc, d| acc * radix as f64 + *d as f64);
    if negative { -value } else { value }
}

fn parse_float(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let text = realm.to_js_string(&call.arg(0))?;
    let text = text.trim_start();
    if text.starts_with("Infinity") || text.starts_with("+Infinity") {
        return Ok(CallOutcome::value(JsValue::Number(f64::INFINITY)));
    }
    if text.starts_with("-Infinity") {
        return Ok(CallOutcome::value(JsValue::Number(f64::NEG_INFINITY)));
    }
    // Longest prefix that parses as a decimal literal.
    let candidate: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .collect();
    let value = (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    Ok(CallOutcome::value(JsValue::Number(value)))
}

#[cfg(test)]
mod tests {
    use super::{parse_integer, to_radix};

    #[test]
    fn radix_rendering() {
        assert_eq!(to_radix(255.0, 16), "ff");
        assert_eq!(to_radix(-5.0, 2), "-101");
        assert_eq!(to_radix(0.5, 2), "0.1");
    }

    #[test]
    fn parse_int_prefixes() {
        assert_eq!(parse_integer("  42px", 0), 42.0);
        assert_eq!(parse_integer("0x1F", 0), 31.0);
        assert_eq!(parse_integer("-11", 2), -3.0);
        assert!(parse_integer("zz", 10).is_nan());
    }
}
