use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall, NativeFn};
use crate::interpreter::object::PropertyDescriptor;
use crate::types::{JsValue, PropertyKey, WellKnownSymbol, number_ops};

const UNARY: [(&str, fn(f64) -> f64); 8] = [
    ("floor", f64::floor),
    ("ceil", f64::ceil),
    ("abs", f64::abs),
    ("sqrt", f64::sqrt),
    ("trunc", f64::trunc),
    ("sign", sign),
    ("round", round),
    ("log", f64::ln),
];

impl Realm {
    pub(crate) fn setup_math(&mut self) {
        let math = self.create_object();
        for (name, value) in [
            ("PI", std::f64::consts::PI),
            ("E", std::f64::consts::E),
            ("LN2", std::f64::consts::LN_2),
            ("SQRT2", std::f64::consts::SQRT_2),
        ] {
            self.object_mut(math).insert_property(
                PropertyKey::from(name),
                PropertyDescriptor::data(JsValue::Number(value), false, false, false),
            );
        }
        for (index, (name, _)) in UNARY.iter().enumerate() {
            let f = self.native_function(name, 1, unary, vec![JsValue::Number(index as f64)]);
            self.object_mut(math).insert_builtin(*name, JsValue::Object(f));
        }
        let methods: [(&str, usize, NativeFn); 4] = [("max", 2, max), ("min", 2, min), ("pow", 2, pow), ("random", 0, random)];
        for (name, length, func) in methods {
            self.install_method(math, name, length, func);
        }
        self.object_mut(math)
            .insert_builtin(WellKnownSymbol::ToStringTag.key(), JsValue::string("Math"));
        self.define_global("Math", JsValue::Object(math));
    }
}

fn sign(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() { x } else { x.signum() }
}

/// Rounds half up, toward +Infinity.
fn round(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let r = (x + 0.5).floor();
    if r == 0.0 && x < 0.0 { -0.0 } else { r }
}

fn unary(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let index = match super::slot(realm, call, 0) {
        JsValue::Number(n) => n as usize,
        _ => 0,
    };
    let x = realm.to_number(&call.arg(0))?;
    let f = UNARY.get(index).map_or(f64::abs as fn(f64) -> f64, |(_, f)| *f);
    Ok(CallOutcome::value(JsValue::Number(f(x))))
}

fn numbers(realm: &mut Realm, call: &NativeCall) -> Result<Vec<f64>, JsValue> {
    call.args.iter().map(|v| realm.to_number(v)).collect()
}

fn max(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = numbers(realm, call)?.into_iter().fold(f64::NEG_INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else if n > acc || (n == 0.0 && acc == 0.0 && acc.is_sign_negative()) {
            n
        } else {
            acc
        }
    });
    Ok(CallOutcome::value(JsValue::Number(result)))
}

fn min(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let result = numbers(realm, call)?.into_iter().fold(f64::INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else if n < acc || (n == 0.0 && acc == 0.0 && n.is_sign_negative()) {
            n
        } else {
            acc
        }
    });
    Ok(CallOutcome::value(JsValue::Number(result)))
}

fn pow(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let base = realm.to_number(&call.arg(0))?;
    let exp = realm.to_number(&call.arg(1))?;
    Ok(CallOutcome::value(JsValue::Number(number_ops::exponentiate(base, exp))))
}

/// Deterministic per realm: a xorshift sequence seeded from the realm.
fn random(realm: &mut Realm, _call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let mut x = realm.random_state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    realm.random_state = x;
    let value = (x >> 11) as f64 / (1u64 << 53) as f64;
    Ok(CallOutcome::value(JsValue::Number(value)))
}

#[cfg(test)]
mod tests {
    use super::round;

    #[test]
    fn round_goes_half_up() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert!(round(-0.4).is_sign_negative());
    }
}
