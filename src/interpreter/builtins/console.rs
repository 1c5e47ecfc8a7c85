//! `console` and the host-facing value renderer.

use std::fmt::Write;

use crate::config::ConsoleLevel;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall, NativeFn};
use crate::interpreter::object::{FunctionData, ObjectKind, PromiseState};
use crate::types::{JsObject, JsValue, PropertyKey, number_ops};

/// Objects nested deeper than this render as `[Object]` / `[Array]`.
const MAX_DEPTH: usize = 2;

impl Realm {
    pub(crate) fn setup_console(&mut self) {
        let console = self.create_object();
        let methods: [(&str, NativeFn); 5] = [
            ("log", log),
            ("info", log),
            ("debug", log),
            ("error", error),
            ("warn", error),
        ];
        for (name, func) in methods {
            self.install_method(console, name, 0, func);
        }
        self.define_global("console", JsValue::Object(console));
    }

    /// Renders a value the way `console.log` prints it: strings raw at the
    /// top level, quoted inside containers.
    pub fn display(&self, value: &JsValue) -> String {
        match value {
            JsValue::String(s) => s.to_string(),
            other => {
                let mut out = String::new();
                self.render(&mut out, other, 0, &mut Vec::new());
                out
            }
        }
    }

    fn render(&self, out: &mut String, value: &JsValue, depth: usize, seen: &mut Vec<JsObject>) {
        match value {
            JsValue::String(s) => {
                let _ = write!(out, "'{}'", s.replace('\'', "\\'"));
            }
            JsValue::Number(n) if *n == 0.0 && n.is_sign_negative() => out.push_str("-0"),
            JsValue::Number(n) => out.push_str(&number_ops::to_string(*n)),
            JsValue::Object(o) => self.render_object(out, *o, depth, seen),
            other => {
                let _ = write!(out, "{other}");
            }
        }
    }

    fn render_object(&self, out: &mut String, o: JsObject, depth: usize, seen: &mut Vec<JsObject>) {
        if seen.contains(&o) {
            out.push_str("[Circular]");
            return;
        }
        if !self.owns(o) {
            out.push_str("[unavailable object]");
            return;
        }
        let data = self.object(o);
        let prefix = match &data.kind {
            ObjectKind::Function(f) => {
                let name = self.get_data_str(o, "name");
                let name = name.as_str().filter(|n| !n.is_empty());
                let _ = match (f, name) {
                    (FunctionData::Closure(c), Some(n)) if c.is_class_constructor() => write!(out, "[class {n}]"),
                    (FunctionData::Closure(c), None) if c.is_class_constructor() => write!(out, "[class (anonymous)]"),
                    (FunctionData::DefaultConstructor { .. }, Some(n)) => write!(out, "[class {n}]"),
                    (_, Some(n)) => write!(out, "[Function: {n}]"),
                    (_, None) => write!(out, "[Function (anonymous)]"),
                };
                return;
            }
            ObjectKind::Error => {
                out.push_str(&self.error_to_string(o));
                return;
            }
            ObjectKind::Primitive(inner) => {
                let _ = write!(out, "[{}: ", wrapper_name(inner));
                self.render(out, inner, depth, seen);
                out.push(']');
                return;
            }
            ObjectKind::Array(elements) => {
                if depth > MAX_DEPTH {
                    out.push_str("[Array]");
                    return;
                }
                seen.push(o);
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(out, element, depth + 1, seen);
                }
                out.push(']');
                seen.pop();
                return;
            }
            ObjectKind::Promise(state) => {
                out.push_str("Promise { ");
                match state {
                    PromiseState::Pending { .. } => out.push_str("<pending>"),
                    PromiseState::Fulfilled(v) => self.render(out, v, depth + 1, seen),
                    PromiseState::Rejected(e) => {
                        out.push_str("<rejected> ");
                        self.render(out, e, depth + 1, seen);
                    }
                }
                out.push_str(" }");
                return;
            }
            ObjectKind::Generator(_) => "Object [Generator] ",
            ObjectKind::ArrayIterator { .. } => "Object [Array Iterator] ",
            ObjectKind::Namespace { .. } => "[Module] ",
            ObjectKind::Ordinary => "",
        };
        out.push_str(prefix);
        if depth > MAX_DEPTH {
            out.push_str("[Object]");
            return;
        }
        let keys: Vec<PropertyKey> = self
            .own_property_keys(o)
            .into_iter()
            .filter(|k| self.get_own_property(o, k).is_some_and(|d| d.enumerable == Some(true)))
            .collect();
        if keys.is_empty() {
            out.push_str("{}");
            return;
        }
        seen.push(o);
        out.push_str("{ ");
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match key {
                PropertyKey::String(s) if is_plain_key(s) => out.push_str(s),
                PropertyKey::String(s) => {
                    let _ = write!(out, "'{s}'");
                }
                PropertyKey::Symbol(_) => {
                    let _ = write!(out, "[{key}]");
                }
            }
            out.push_str(": ");
            let Some(desc) = self.get_own_property(o, key) else {
                continue;
            };
            match (&desc.value, &desc.get, &desc.set) {
                (Some(v), _, _) => self.render(out, v, depth + 1, seen),
                (None, Some(_), Some(_)) => out.push_str("[Getter/Setter]"),
                (None, Some(_), None) => out.push_str("[Getter]"),
                (None, None, Some(_)) => out.push_str("[Setter]"),
                (None, None, None) => out.push_str("undefined"),
            }
        }
        out.push_str(" }");
        seen.pop();
    }

    fn write_console(&mut self, level: ConsoleLevel, call: &NativeCall) {
        let line = call
            .args
            .iter()
            .map(|v| self.display(v))
            .collect::<Vec<_>>()
            .join(" ");
        self.console.write(level, &line);
    }
}

/// Label of a primitive wrapper object, as in `[Number: 1]`.
fn wrapper_name(value: &JsValue) -> &'static str {
    match value {
        JsValue::Boolean(_) => "Boolean",
        JsValue::Number(_) => "Number",
        JsValue::String(_) => "String",
        JsValue::Symbol(_) => "Symbol",
        JsValue::BigInt(_) => "BigInt",
        _ => "Object",
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c == '$' || c == '_' || unicode_ident::is_xid_start(c))
        && chars.all(|c| c == '$' || unicode_ident::is_xid_continue(c))
}

fn log(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    realm.write_console(ConsoleLevel::Log, call);
    Ok(CallOutcome::undefined())
}

fn error(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    realm.write_console(ConsoleLevel::Error, call);
    Ok(CallOutcome::undefined())
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;
    use crate::types::{JsValue, PropertyKey};

    #[test]
    fn nested_values_render_like_node() {
        let mut realm = Realm::new(RealmConfig::default());
        let inner = realm.create_array(vec![JsValue::Number(1.0), JsValue::string("two")]);
        let outer = realm.create_object();
        realm.set_data(outer, PropertyKey::from("list"), JsValue::Object(inner));
        realm.set_data(outer, PropertyKey::from("odd key"), JsValue::Null);
        assert_eq!(realm.display(&JsValue::Object(outer)), "{ list: [1, 'two'], 'odd key': null }");
        assert_eq!(realm.display(&JsValue::string("raw")), "raw");
        assert_eq!(realm.display(&JsValue::Number(-0.0)), "-0");
    }

    #[test]
    fn cycles_are_marked() {
        let mut realm = Realm::new(RealmConfig::default());
        let o = realm.create_object();
        realm.set_data(o, PropertyKey::from("self"), JsValue::Object(o));
        assert_eq!(realm.display(&JsValue::Object(o)), "{ self: [Circular] }");
    }
}
