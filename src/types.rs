use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use num_bigint::BigInt;

/// A guest-language value. Objects are handles into the realm heap.
#[derive(Clone, Debug, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(JsSymbol),
    BigInt(Rc<BigInt>),
    Object(JsObject),
}

#[derive(Clone, Debug)]
pub struct JsSymbol {
    pub id: u64,
    pub description: Option<Rc<str>>,
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Symbols with reserved ids, shared by every realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellKnownSymbol {
    Iterator,
    ToStringTag,
}

impl WellKnownSymbol {
    pub fn symbol(self) -> JsSymbol {
        let (id, description) = match self {
            WellKnownSymbol::Iterator => (1, "Symbol.iterator"),
            WellKnownSymbol::ToStringTag => (2, "Symbol.toStringTag"),
        };
        JsSymbol {
            id,
            description: Some(Rc::from(description)),
        }
    }

    pub fn key(self) -> PropertyKey {
        PropertyKey::Symbol(self.symbol())
    }
}

/// First id handed out to symbols created at run time.
pub const FIRST_USER_SYMBOL: u64 = 16;

/// Handle to an object in a realm's heap. It resolves only in the realm
/// that allocated it, and only while the object is alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct JsObject {
    pub id: usize,
    /// Id of the allocating realm.
    pub(crate) heap: u64,
    pub(crate) generation: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(Rc<str>),
    Symbol(JsSymbol),
}

impl PropertyKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }

    /// Array index interpretation of a string key (canonical form only).
    pub fn array_index(&self) -> Option<usize> {
        let s = self.as_str()?;
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>().ok().filter(|&n| n != u32::MAX).map(|n| n as usize)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(Rc::from(s))
    }
}

impl From<Rc<str>> for PropertyKey {
    fn from(s: Rc<str>) -> Self {
        PropertyKey::String(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(n: usize) -> Self {
        PropertyKey::String(Rc::from(n.to_string()))
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{s}"),
            PropertyKey::Symbol(sym) => match &sym.description {
                Some(desc) => write!(f, "[{desc}]"),
                None => write!(f, "[Symbol()]"),
            },
        }
    }
}

impl JsValue {
    pub fn string(s: &str) -> Self {
        JsValue::String(Rc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn as_object(&self) -> Option<JsObject> {
        match self {
            JsValue::Object(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "null",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::BigInt(_) => "bigint",
            JsValue::Object(_) => "object",
        }
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::string(s)
    }
}

impl From<JsObject> for JsValue {
    fn from(o: JsObject) -> Self {
        JsValue::Object(o)
    }
}

pub mod number_ops {
    pub fn exponentiate(base: f64, exp: f64) -> f64 {
        if exp.is_nan() || ((base == 1.0 || base == -1.0) && exp.is_infinite()) {
            return f64::NAN;
        }
        base.powf(exp)
    }

    pub fn left_shift(x: f64, y: f64) -> f64 {
        f64::from(to_int32(x).wrapping_shl(to_uint32(y) & 0x1F))
    }

    pub fn signed_right_shift(x: f64, y: f64) -> f64 {
        f64::from(to_int32(x).wrapping_shr(to_uint32(y) & 0x1F))
    }

    pub fn unsigned_right_shift(x: f64, y: f64) -> f64 {
        f64::from(to_uint32(x).wrapping_shr(to_uint32(y) & 0x1F))
    }

    pub fn same_value(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if x == 0.0 && y == 0.0 {
            return x.is_sign_positive() == y.is_sign_positive();
        }
        x == y
    }

    pub fn to_string(x: f64) -> String {
        if x.is_nan() {
            return "NaN".to_string();
        }
        if x == 0.0 {
            return "0".to_string();
        }
        if x.is_infinite() {
            return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        let mut buf = ryu_js::Buffer::new();
        buf.format(x).to_string()
    }

    pub fn to_int32(x: f64) -> i32 {
        to_uint32(x) as i32
    }

    pub fn to_uint32(x: f64) -> u32 {
        if !x.is_finite() || x == 0.0 {
            return 0;
        }
        let wrapped = x.trunc().rem_euclid(4_294_967_296.0);
        wrapped as u32
    }

    /// StringToNumber for the decimal, hex, octal and binary literal forms.
    pub fn parse(s: &str) -> f64 {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return 0.0;
        }
        let radix = |prefix_len: usize, radix: u32| {
            u64::from_str_radix(&trimmed[prefix_len..], radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN)
        };
        match trimmed.get(..2) {
            Some("0x" | "0X") => return radix(2, 16),
            Some("0o" | "0O") => return radix(2, 8),
            Some("0b" | "0B") => return radix(2, 2),
            _ => {}
        }
        match trimmed {
            "Infinity" | "+Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            _ if trimmed
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
            {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
            _ => f64::NAN,
        }
    }
}

pub mod bigint_ops {
    use num_bigint::{BigInt, Sign};

    pub fn is_zero(x: &BigInt) -> bool {
        x.sign() == Sign::NoSign
    }

    pub fn exponentiate(base: &BigInt, exp: &BigInt) -> Result<BigInt, &'static str> {
        if exp.sign() == Sign::Minus {
            return Err("Exponent must be non-negative");
        }
        let exp: u32 = exp.try_into().map_err(|_| "Maximum BigInt size exceeded")?;
        Ok(base.pow(exp))
    }

    pub fn divide(x: &BigInt, y: &BigInt) -> Result<BigInt, &'static str> {
        if is_zero(y) {
            return Err("Division by zero");
        }
        Ok(x / y)
    }

    pub fn remainder(x: &BigInt, y: &BigInt) -> Result<BigInt, &'static str> {
        if is_zero(y) {
            return Err("Division by zero");
        }
        Ok(x % y)
    }

    pub fn shift(x: &BigInt, y: &BigInt, left: bool) -> Result<BigInt, &'static str> {
        let amount: i64 = y.try_into().map_err(|_| "Maximum BigInt size exceeded")?;
        let amount = if left { amount } else { -amount };
        Ok(if amount >= 0 {
            x << (amount as u64)
        } else {
            x >> (amount.unsigned_abs())
        })
    }

    pub fn to_f64(x: &BigInt) -> f64 {
        x.to_string().parse::<f64>().unwrap_or(f64::NAN)
    }

    /// Parses the digits of a BigInt literal, including radix prefixes.
    pub fn parse_literal(s: &str) -> Option<BigInt> {
        let (digits, radix) = match s.get(..2) {
            Some("0x" | "0X") => (&s[2..], 16),
            Some("0o" | "0O") => (&s[2..], 8),
            Some("0b" | "0B") => (&s[2..], 2),
            _ => (s, 10),
        };
        BigInt::parse_bytes(digits.as_bytes(), radix)
    }
}

/// A realm-independent value the host can create and send across threads,
/// for initial globals and settling deferred values.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Becomes a fresh array in the receiving realm.
    List(Vec<HostValue>),
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Boolean(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{b}"),
            JsValue::Number(n) => write!(f, "{}", number_ops::to_string(*n)),
            JsValue::String(s) => write!(f, "{s}"),
            JsValue::Symbol(s) => match &s.description {
                Some(desc) => write!(f, "Symbol({desc})"),
                None => write!(f, "Symbol()"),
            },
            JsValue::BigInt(b) => write!(f, "{b}n"),
            JsValue::Object(_) => write!(f, "[object Object]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_ops::to_string(45.0), "45");
        assert_eq!(number_ops::to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_ops::to_string(-0.0), "0");
        assert_eq!(number_ops::to_string(f64::NAN), "NaN");
        assert_eq!(number_ops::to_string(1e21), "1e+21");
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(number_ops::to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(number_ops::to_int32(-1.0), -1);
        assert_eq!(number_ops::to_uint32(-1.0), u32::MAX);
        assert_eq!(number_ops::left_shift(1.0, 33.0), 2.0);
    }

    #[test]
    fn string_to_number() {
        assert_eq!(number_ops::parse("  42 "), 42.0);
        assert_eq!(number_ops::parse(""), 0.0);
        assert_eq!(number_ops::parse("0x1f"), 31.0);
        assert!(number_ops::parse("12px").is_nan());
    }

    #[test]
    fn array_index_keys() {
        assert_eq!(PropertyKey::from("3").array_index(), Some(3));
        assert_eq!(PropertyKey::from("03").array_index(), None);
        assert_eq!(PropertyKey::from("length").array_index(), None);
    }

    #[test]
    fn bigint_shift_and_divide() {
        let x = BigInt::from(5);
        assert_eq!(bigint_ops::shift(&x, &BigInt::from(2), true).unwrap(), BigInt::from(20));
        assert_eq!(bigint_ops::shift(&x, &BigInt::from(1), false).unwrap(), BigInt::from(2));
        assert!(bigint_ops::divide(&x, &BigInt::from(0)).is_err());
        assert_eq!(bigint_ops::parse_literal("0xff"), Some(BigInt::from(255)));
    }
}
