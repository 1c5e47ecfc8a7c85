use std::rc::Rc;

use super::Realm;
use super::environment::EnvRef;
use super::gc::{Trace, Tracer};
use super::object::{Fault, PropertyLookup, SetOutcome};
use crate::types::{JsValue, PropertyKey};

/// A resolved name or property, produced by evaluating an expression for
/// assignment, update, deletion or a method call.
#[derive(Debug, Clone)]
pub enum Reference {
    Binding {
        env: EnvRef,
        name: Rc<str>,
        strict: bool,
    },
    Unresolvable {
        name: Rc<str>,
        strict: bool,
    },
    Property {
        base: JsValue,
        key: PropertyKey,
        /// Receiver for accessors; differs from `base` for `super.x`.
        this: JsValue,
        strict: bool,
    },
}

/// What reading or writing a reference requires.
#[derive(Debug)]
pub enum Access {
    Value(JsValue),
    Throw(JsValue),
    /// An accessor must run before the access completes.
    Call {
        function: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
}

impl Reference {
    pub fn property(base: JsValue, key: PropertyKey, strict: bool) -> Self {
        Reference::Property {
            this: base.clone(),
            base,
            key,
            strict,
        }
    }

    /// `this` value for a call through this reference.
    pub fn this_value(&self) -> JsValue {
        match self {
            Reference::Property { this, .. } => this.clone(),
            Reference::Binding { env, .. } => env.with_base_object().map(JsValue::Object).unwrap_or_default(),
            Reference::Unresolvable { .. } => JsValue::Undefined,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Reference::Binding { name, .. } | Reference::Unresolvable { name, .. } => name.to_string(),
            Reference::Property { key, .. } => key.to_string(),
        }
    }
}

impl Realm {
    /// GetValue. Getters are returned as a pending call.
    pub fn get_value(&mut self, reference: &Reference) -> Access {
        match reference {
            Reference::Binding { env, name, strict } => match env.get_binding_value(self, name, *strict) {
                Ok(v) => Access::Value(v),
                Err(e) => Access::Throw(self.throw_fault(e.into())),
            },
            Reference::Unresolvable { name, .. } => {
                Access::Throw(self.throw_fault(Fault::reference_error(format!("{name} is not defined"))))
            }
            Reference::Property { base, key, this, .. } => match self.get_property(base, key) {
                Ok(PropertyLookup::Value(v)) => Access::Value(v),
                Ok(PropertyLookup::Getter(getter)) => Access::Call {
                    function: getter,
                    this: this.clone(),
                    args: Vec::new(),
                },
                Err(e) => Access::Throw(e),
            },
        }
    }

    /// PutValue. Setters are returned as a pending call.
    pub fn put_value(&mut self, reference: &Reference, value: JsValue) -> Access {
        match reference {
            Reference::Binding { env, name, strict } => {
                match env.set_mutable_binding(self, name, value.clone(), *strict) {
                    Ok(()) => Access::Value(value),
                    Err(e) => Access::Throw(self.throw_fault(e.into())),
                }
            }
            Reference::Unresolvable { name, strict } => {
                if *strict {
                    return Access::Throw(self.throw_fault(Fault::reference_error(format!("{name} is not defined"))));
                }
                let global = self.global_object();
                self.set_data(global, PropertyKey::String(name.clone()), value.clone());
                Access::Value(value)
            }
            Reference::Property { base, key, this, strict } => {
                let target = match base {
                    JsValue::Undefined | JsValue::Null => {
                        return Access::Throw(self.throw_fault(Fault::type_error(format!(
                            "Cannot set properties of {base} (setting '{key}')"
                        ))));
                    }
                    JsValue::Object(o) => *o,
                    primitive => match self.primitive_prototype(primitive) {
                        Some(proto) => proto,
                        None => return Access::Value(value),
                    },
                };
                match self.set_property(target, key.clone(), value.clone(), this) {
                    Ok(SetOutcome::Done(true)) => Access::Value(value),
                    Ok(SetOutcome::Done(false)) if *strict => Access::Throw(self.throw_fault(Fault::type_error(
                        format!("Cannot assign to read only property '{key}' of {}", base.type_name()),
                    ))),
                    Ok(SetOutcome::Done(false)) => Access::Value(value),
                    Ok(SetOutcome::Setter(setter)) => Access::Call {
                        function: setter,
                        this: this.clone(),
                        args: vec![value],
                    },
                    Err(fault) => Access::Throw(self.throw_fault(fault)),
                }
            }
        }
    }

    /// The `delete` operator applied to a reference.
    pub fn delete_reference(&mut self, reference: &Reference) -> Result<bool, JsValue> {
        match reference {
            Reference::Unresolvable { .. } => Ok(true),
            Reference::Binding { env, name, .. } => Ok(env.delete_binding(self, name)),
            Reference::Property { base, key, strict, .. } => {
                let Some(o) = base.as_object() else {
                    return Ok(!base.is_nullish());
                };
                let deleted = self.delete_property(o, key);
                if !deleted && *strict {
                    return Err(self.throw_fault(Fault::type_error(format!("Cannot delete property '{key}'"))));
                }
                Ok(deleted)
            }
        }
    }
}

impl Trace for Reference {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Reference::Binding { env, .. } => env.trace(tracer),
            Reference::Unresolvable { .. } => {}
            Reference::Property { base, this, .. } => {
                base.trace(tracer);
                this.trace(tracer);
            }
        }
    }
}
