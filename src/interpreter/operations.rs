//! Abstract operations: type conversion, equality and the binary operators.
//!
//! Conversions never run guest code. Objects convert through their built-in
//! behaviour (arrays join, errors render as `Name: message`, wrappers unwrap);
//! user-defined `toString`/`valueOf` are not consulted.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;

use super::Realm;
use super::object::{Fault, FunctionData, ObjectKind};
use crate::ast::BinaryOperator;
use crate::types::{JsObject, JsValue, PropertyKey, WellKnownSymbol, bigint_ops, number_ops};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Default,
    Number,
    String,
}

#[derive(Debug, Clone)]
pub enum Numeric {
    Number(f64),
    BigInt(Rc<BigInt>),
}

const MIX_BIGINT: &str = "Cannot mix BigInt and other types, use explicit conversions";

pub fn to_boolean(value: &JsValue) -> bool {
    match value {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => !(*n == 0.0 || n.is_nan()),
        JsValue::String(s) => !s.is_empty(),
        JsValue::BigInt(b) => !bigint_ops::is_zero(b),
        JsValue::Symbol(_) | JsValue::Object(_) => true,
    }
}

pub fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

pub fn same_value_zero(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => strict_equality(left, right),
    }
}

pub fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => a == b,
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
        (JsValue::BigInt(a), JsValue::BigInt(b)) => a == b,
        (JsValue::Object(a), JsValue::Object(b)) => a == b,
        _ => false,
    }
}

pub fn to_integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else if n.is_infinite() {
        n
    } else {
        n.trunc() + 0.0
    }
}

fn compare_utf16(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn bigint_from_number(n: f64) -> Option<BigInt> {
    if !n.is_finite() || n.trunc() != n {
        return None;
    }
    format!("{n:.0}").parse().ok()
}

/// Compares a BigInt with a Number mathematically.
fn compare_bigint_number(b: &BigInt, n: f64) -> Option<Ordering> {
    if n.is_nan() {
        return None;
    }
    if n == f64::INFINITY {
        return Some(Ordering::Less);
    }
    if n == f64::NEG_INFINITY {
        return Some(Ordering::Greater);
    }
    let floor = bigint_from_number(n.floor())?;
    match b.cmp(&floor) {
        Ordering::Equal if n.floor() < n => Some(Ordering::Less),
        ordering => Some(ordering),
    }
}

impl Realm {
    /// Materializes a heap fault as a guest error object.
    pub fn throw_fault(&mut self, fault: Fault) -> JsValue {
        self.create_error(fault.name, &fault.message)
    }

    pub fn type_error(&mut self, message: impl AsRef<str>) -> JsValue {
        self.create_error("TypeError", message.as_ref())
    }

    pub fn range_error(&mut self, message: impl AsRef<str>) -> JsValue {
        self.create_error("RangeError", message.as_ref())
    }

    pub fn reference_error(&mut self, message: impl AsRef<str>) -> JsValue {
        self.create_error("ReferenceError", message.as_ref())
    }

    pub fn typeof_value(&self, value: &JsValue) -> &'static str {
        match value {
            JsValue::Object(o) if self.object(*o).is_callable() => "function",
            other => other.type_name(),
        }
    }

    /// Short rendering of a value for error messages.
    pub fn describe(&self, value: &JsValue) -> String {
        match value {
            JsValue::String(s) => format!("\"{s}\""),
            JsValue::Object(o) => match self.object(*o).function() {
                Some(_) => {
                    let name = self.get_data_str(*o, "name");
                    match name.as_str() {
                        Some(n) if !n.is_empty() => format!("function {n}"),
                        _ => "function".to_string(),
                    }
                }
                None if matches!(self.object(*o).kind, ObjectKind::Array(_)) => "array".to_string(),
                None => "object".to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn to_primitive(&self, value: &JsValue, hint: Hint) -> JsValue {
        match value {
            JsValue::Object(o) => match &self.object(*o).kind {
                ObjectKind::Primitive(inner) => inner.clone(),
                _ if hint == Hint::Number && matches!(self.object(*o).kind, ObjectKind::Ordinary) => {
                    JsValue::Number(f64::NAN)
                }
                _ => JsValue::String(Rc::from(self.object_to_string(*o, 0))),
            },
            other => other.clone(),
        }
    }

    /// Built-in string conversion of an object.
    fn object_to_string(&self, o: JsObject, depth: usize) -> String {
        let data = self.object(o);
        match &data.kind {
            ObjectKind::Array(elements) => {
                if depth > 8 {
                    return String::new();
                }
                let parts: Vec<String> = elements
                    .iter()
                    .map(|e| match e {
                        JsValue::Undefined | JsValue::Null => String::new(),
                        JsValue::Object(inner) => self.object_to_string(*inner, depth + 1),
                        JsValue::Symbol(_) => String::new(),
                        other => other.to_string(),
                    })
                    .collect();
                parts.join(",")
            }
            ObjectKind::Primitive(inner) => inner.to_string(),
            ObjectKind::Function(f) => {
                let name = self.get_data_str(o, "name");
                let name = name.as_str().unwrap_or("");
                match f {
                    FunctionData::Closure(c) if c.is_class_constructor() => format!("class {name} {{ }}"),
                    _ => format!("function {name}() {{ [native code] }}"),
                }
            }
            ObjectKind::Error => self.error_to_string(o),
            _ => {
                let tag = self.get_data(o, &WellKnownSymbol::ToStringTag.key());
                match tag.as_str() {
                    Some(t) => format!("[object {t}]"),
                    None => "[object Object]".to_string(),
                }
            }
        }
    }

    pub fn error_to_string(&self, o: JsObject) -> String {
        let name = match self.get_data_str(o, "name") {
            JsValue::Undefined => "Error".to_string(),
            v => v.to_string(),
        };
        let message = match self.get_data_str(o, "message") {
            JsValue::Undefined => String::new(),
            v => v.to_string(),
        };
        match (name.is_empty(), message.is_empty()) {
            (_, true) => name,
            (true, false) => message,
            (false, false) => format!("{name}: {message}"),
        }
    }

    pub fn to_number(&mut self, value: &JsValue) -> Result<f64, JsValue> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => Ok(number_ops::parse(s)),
            JsValue::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a number")),
            JsValue::BigInt(_) => Err(self.type_error("Cannot convert a BigInt value to a number")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, Hint::Number);
                self.to_number(&prim)
            }
        }
    }

    pub fn to_numeric(&mut self, value: &JsValue) -> Result<Numeric, JsValue> {
        let prim = self.to_primitive(value, Hint::Number);
        match prim {
            JsValue::BigInt(b) => Ok(Numeric::BigInt(b)),
            other => self.to_number(&other).map(Numeric::Number),
        }
    }

    pub fn to_js_string(&mut self, value: &JsValue) -> Result<Rc<str>, JsValue> {
        match value {
            JsValue::String(s) => Ok(s.clone()),
            JsValue::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a string")),
            JsValue::BigInt(b) => Ok(Rc::from(b.to_string())),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, Hint::String);
                self.to_js_string(&prim)
            }
            other => Ok(Rc::from(other.to_string())),
        }
    }

    pub fn to_property_key(&mut self, value: &JsValue) -> Result<PropertyKey, JsValue> {
        match value {
            JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
            JsValue::String(s) => Ok(PropertyKey::String(s.clone())),
            other => self.to_js_string(other).map(PropertyKey::String),
        }
    }

    pub fn to_object(&mut self, value: &JsValue) -> Result<JsObject, JsValue> {
        match value {
            JsValue::Object(o) => Ok(*o),
            JsValue::Undefined | JsValue::Null => {
                Err(self.type_error(format!("Cannot convert {value} to object")))
            }
            primitive => {
                let proto = self.primitive_prototype(primitive);
                let data = super::object::ObjectData::new(ObjectKind::Primitive(primitive.clone()), proto);
                Ok(self.alloc(data))
            }
        }
    }

    pub fn loose_equality(&mut self, left: &JsValue, right: &JsValue) -> Result<bool, JsValue> {
        Ok(match (left, right) {
            (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => true,
            (JsValue::Undefined | JsValue::Null, _) | (_, JsValue::Undefined | JsValue::Null) => false,
            (JsValue::Number(a), JsValue::String(s)) => *a == number_ops::parse(s),
            (JsValue::String(s), JsValue::Number(b)) => number_ops::parse(s) == *b,
            (JsValue::BigInt(a), JsValue::String(s)) | (JsValue::String(s), JsValue::BigInt(a)) => {
                bigint_ops::parse_literal(s.trim()).is_some_and(|b| **a == b)
            }
            (JsValue::Boolean(b), other) | (other, JsValue::Boolean(b)) => {
                let n = JsValue::Number(if *b { 1.0 } else { 0.0 });
                return self.loose_equality(&n, other);
            }
            (JsValue::Object(_), JsValue::Object(_)) => strict_equality(left, right),
            (JsValue::Object(_), _) => {
                let prim = self.to_primitive(left, Hint::Default);
                return self.loose_equality(&prim, right);
            }
            (_, JsValue::Object(_)) => {
                let prim = self.to_primitive(right, Hint::Default);
                return self.loose_equality(left, &prim);
            }
            (JsValue::BigInt(a), JsValue::Number(n)) | (JsValue::Number(n), JsValue::BigInt(a)) => {
                compare_bigint_number(a, *n) == Some(Ordering::Equal)
            }
            _ => strict_equality(left, right),
        })
    }

    /// IsLessThan. `None` means undefined (a NaN was involved).
    fn less_than(&mut self, left: &JsValue, right: &JsValue, left_first: bool) -> Result<Option<bool>, JsValue> {
        let (px, py) = if left_first {
            let px = self.to_primitive(left, Hint::Number);
            (px, self.to_primitive(right, Hint::Number))
        } else {
            let py = self.to_primitive(right, Hint::Number);
            (self.to_primitive(left, Hint::Number), py)
        };
        if let (JsValue::String(a), JsValue::String(b)) = (&px, &py) {
            return Ok(Some(compare_utf16(a, b) == Ordering::Less));
        }
        match (&px, &py) {
            (JsValue::BigInt(a), JsValue::String(s)) => {
                return Ok(bigint_ops::parse_literal(s.trim()).map(|b| **a < b));
            }
            (JsValue::String(s), JsValue::BigInt(b)) => {
                return Ok(bigint_ops::parse_literal(s.trim()).map(|a| a < **b));
            }
            _ => {}
        }
        let nx = self.to_numeric(&px)?;
        let ny = self.to_numeric(&py)?;
        Ok(match (nx, ny) {
            (Numeric::Number(a), Numeric::Number(b)) => {
                if a.is_nan() || b.is_nan() {
                    None
                } else {
                    Some(a < b)
                }
            }
            (Numeric::BigInt(a), Numeric::BigInt(b)) => Some(a < b),
            (Numeric::BigInt(a), Numeric::Number(b)) => compare_bigint_number(&a, b).map(|o| o == Ordering::Less),
            (Numeric::Number(a), Numeric::BigInt(b)) => {
                compare_bigint_number(&b, a).map(|o| o == Ordering::Greater)
            }
        })
    }

    /// OrdinaryHasInstance.
    pub fn instance_of(&mut self, value: &JsValue, target: &JsValue) -> Result<bool, JsValue> {
        let Some(target_obj) = target.as_object().filter(|_| self.is_callable(target)) else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        if let Some(FunctionData::Bound { target: inner, .. }) = self.object(target_obj).function() {
            let inner = JsValue::Object(*inner);
            return self.instance_of(value, &inner);
        }
        let Some(mut current) = value.as_object() else {
            return Ok(false);
        };
        let proto = self.get_data_str(target_obj, "prototype");
        let Some(proto) = proto.as_object() else {
            return Err(self.type_error("Function has non-object prototype in instanceof check"));
        };
        while let Some(next) = self.object(current).prototype {
            if next == proto {
                return Ok(true);
            }
            current = next;
        }
        Ok(false)
    }

    fn numeric_operation(&mut self, op: BinaryOperator, left: &JsValue, right: &JsValue) -> Result<JsValue, JsValue> {
        let a = self.to_numeric(left)?;
        let b = self.to_numeric(right)?;
        match (a, b) {
            (Numeric::Number(x), Numeric::Number(y)) => Ok(JsValue::Number(match op {
                BinaryOperator::Add => x + y,
                BinaryOperator::Sub => x - y,
                BinaryOperator::Mul => x * y,
                BinaryOperator::Div => x / y,
                BinaryOperator::Mod => {
                    if y.is_infinite() && x.is_finite() {
                        x
                    } else {
                        x % y
                    }
                }
                BinaryOperator::Exp => number_ops::exponentiate(x, y),
                BinaryOperator::LShift => number_ops::left_shift(x, y),
                BinaryOperator::RShift => number_ops::signed_right_shift(x, y),
                BinaryOperator::URShift => number_ops::unsigned_right_shift(x, y),
                BinaryOperator::BitAnd => f64::from(number_ops::to_int32(x) & number_ops::to_int32(y)),
                BinaryOperator::BitOr => f64::from(number_ops::to_int32(x) | number_ops::to_int32(y)),
                BinaryOperator::BitXor => f64::from(number_ops::to_int32(x) ^ number_ops::to_int32(y)),
                other => return Err(self.type_error(format!("{other:?} is not a numeric operator"))),
            })),
            (Numeric::BigInt(x), Numeric::BigInt(y)) => {
                let result = match op {
                    BinaryOperator::Add => Ok(&*x + &*y),
                    BinaryOperator::Sub => Ok(&*x - &*y),
                    BinaryOperator::Mul => Ok(&*x * &*y),
                    BinaryOperator::Div => bigint_ops::divide(&x, &y),
                    BinaryOperator::Mod => bigint_ops::remainder(&x, &y),
                    BinaryOperator::Exp => bigint_ops::exponentiate(&x, &y),
                    BinaryOperator::LShift => bigint_ops::shift(&x, &y, true),
                    BinaryOperator::RShift => bigint_ops::shift(&x, &y, false),
                    BinaryOperator::BitAnd => Ok(&*x & &*y),
                    BinaryOperator::BitOr => Ok(&*x | &*y),
                    BinaryOperator::BitXor => Ok(&*x ^ &*y),
                    BinaryOperator::URShift => {
                        return Err(self.type_error("BigInts have no unsigned right shift, use >> instead"));
                    }
                    other => return Err(self.type_error(format!("{other:?} is not a numeric operator"))),
                };
                result
                    .map(|v| JsValue::BigInt(Rc::new(v)))
                    .map_err(|message| self.range_error(message))
            }
            _ => Err(self.type_error(MIX_BIGINT)),
        }
    }

    /// Evaluates a binary operator on two already-evaluated operands.
    pub fn apply_binary(&mut self, op: BinaryOperator, left: &JsValue, right: &JsValue) -> Result<JsValue, JsValue> {
        use BinaryOperator::*;
        match op {
            Add => {
                let lp = self.to_primitive(left, Hint::Default);
                let rp = self.to_primitive(right, Hint::Default);
                if matches!(lp, JsValue::String(_)) || matches!(rp, JsValue::String(_)) {
                    let ls = self.to_js_string(&lp)?;
                    let rs = self.to_js_string(&rp)?;
                    let mut joined = String::with_capacity(ls.len() + rs.len());
                    joined.push_str(&ls);
                    joined.push_str(&rs);
                    return Ok(JsValue::String(Rc::from(joined)));
                }
                self.numeric_operation(Add, &lp, &rp)
            }
            Sub | Mul | Div | Mod | Exp | LShift | RShift | URShift | BitAnd | BitOr | BitXor => {
                self.numeric_operation(op, left, right)
            }
            Eq => self.loose_equality(left, right).map(JsValue::Boolean),
            NotEq => self.loose_equality(left, right).map(|b| JsValue::Boolean(!b)),
            StrictEq => Ok(JsValue::Boolean(strict_equality(left, right))),
            StrictNotEq => Ok(JsValue::Boolean(!strict_equality(left, right))),
            Lt => Ok(JsValue::Boolean(self.less_than(left, right, true)? == Some(true))),
            Gt => Ok(JsValue::Boolean(self.less_than(right, left, false)? == Some(true))),
            LtEq => Ok(JsValue::Boolean(self.less_than(right, left, false)? == Some(false))),
            GtEq => Ok(JsValue::Boolean(self.less_than(left, right, true)? == Some(false))),
            In => {
                let Some(o) = right.as_object() else {
                    let key = self.to_js_string(left).unwrap_or_else(|_| Rc::from("symbol"));
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{key}' in {}",
                        self.describe(right)
                    )));
                };
                let key = self.to_property_key(left)?;
                Ok(JsValue::Boolean(self.has_property(o, &key)))
            }
            Instanceof => self.instance_of(left, right).map(JsValue::Boolean),
        }
    }

    pub fn negate(&mut self, value: &JsValue) -> Result<JsValue, JsValue> {
        Ok(match self.to_numeric(value)? {
            Numeric::Number(n) => JsValue::Number(-n),
            Numeric::BigInt(b) => JsValue::BigInt(Rc::new(-&*b)),
        })
    }

    pub fn bitwise_not(&mut self, value: &JsValue) -> Result<JsValue, JsValue> {
        Ok(match self.to_numeric(value)? {
            Numeric::Number(n) => JsValue::Number(f64::from(!number_ops::to_int32(n))),
            Numeric::BigInt(b) => JsValue::BigInt(Rc::new(-&*b - 1)),
        })
    }

    /// `x + 1` or `x - 1` on a numeric value, for update expressions.
    pub fn increment(&mut self, value: &Numeric, up: bool) -> JsValue {
        match value {
            Numeric::Number(n) => JsValue::Number(if up { n + 1.0 } else { n - 1.0 }),
            Numeric::BigInt(b) => JsValue::BigInt(Rc::new(if up { &**b + 1 } else { &**b - 1 })),
        }
    }
}

impl From<Numeric> for JsValue {
    fn from(n: Numeric) -> Self {
        match n {
            Numeric::Number(n) => JsValue::Number(n),
            Numeric::BigInt(b) => JsValue::BigInt(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;

    #[test]
    fn truthiness() {
        assert!(!to_boolean(&JsValue::string("")));
        assert!(to_boolean(&JsValue::string("0")));
        assert!(!to_boolean(&JsValue::Number(f64::NAN)));
        assert!(!to_boolean(&JsValue::BigInt(Rc::new(BigInt::from(0)))));
    }

    #[test]
    fn addition_concatenates_when_either_side_is_a_string() {
        let mut realm = Realm::new(RealmConfig::default());
        let sum = realm
            .apply_binary(BinaryOperator::Add, &JsValue::Number(1.0), &JsValue::string("2"))
            .unwrap();
        assert_eq!(sum.as_str(), Some("12"));
        let arr = JsValue::Object(realm.create_array(vec![JsValue::Number(1.0), JsValue::Number(2.0)]));
        let joined = realm.apply_binary(BinaryOperator::Add, &arr, &JsValue::string("")).unwrap();
        assert_eq!(joined.as_str(), Some("1,2"));
    }

    #[test]
    fn loose_equality_coerces() {
        let mut realm = Realm::new(RealmConfig::default());
        assert!(realm.loose_equality(&JsValue::Null, &JsValue::Undefined).unwrap());
        assert!(realm.loose_equality(&JsValue::string("1"), &JsValue::Boolean(true)).unwrap());
        assert!(!realm.loose_equality(&JsValue::Null, &JsValue::Number(0.0)).unwrap());
        let big = JsValue::BigInt(Rc::new(BigInt::from(2)));
        assert!(realm.loose_equality(&big, &JsValue::Number(2.0)).unwrap());
    }

    #[test]
    fn mixing_bigint_and_number_throws() {
        let mut realm = Realm::new(RealmConfig::default());
        let big = JsValue::BigInt(Rc::new(BigInt::from(2)));
        assert!(realm.apply_binary(BinaryOperator::Mul, &big, &JsValue::Number(2.0)).is_err());
    }

    #[test]
    fn string_comparison_uses_code_units() {
        let mut realm = Realm::new(RealmConfig::default());
        let lt = realm
            .apply_binary(BinaryOperator::Lt, &JsValue::string("a"), &JsValue::string("b"))
            .unwrap();
        assert!(matches!(lt, JsValue::Boolean(true)));
        let nan = realm
            .apply_binary(BinaryOperator::GtEq, &JsValue::Number(f64::NAN), &JsValue::Number(1.0))
            .unwrap();
        assert!(matches!(nan, JsValue::Boolean(false)));
    }
}
