//! Binding patterns: identifiers, member targets and destructuring.

use std::rc::Rc;

use super::Realm;
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step, Syntax};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::environment::{EnvRef, resolve_binding};
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::{Trace, Tracer, trace_fields};
use super::iteration::{close_iterator, get_iterator, next_value};
use super::reference::Reference;
use crate::ast::{Pattern, PatternElement, PropertyName};
use crate::error::EngineError;
use crate::types::{JsValue, PropertyKey};

/// Where the bound values go.
#[derive(Debug, Clone)]
pub enum BindMode {
    /// Initialize fresh bindings in this environment (`let`, `const`, parameters).
    Initialize(EnvRef),
    /// Assign through ordinary references (`var` and assignment expressions).
    Assign,
}

/// Which part of the pattern a pending target binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Whole,
    Element(usize),
    Rest,
    Property(usize),
    ObjectRest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Start,
    Iterator,
    Next(usize),
    ElementDefault(usize),
    RestNext,
    Key(usize),
    Get(usize),
    PropertyDefault(usize),
    Target(Slot),
    Closing,
}

enum Target {
    Bound,
    Wait(Step),
    Threw(JsValue),
}

#[derive(Debug)]
pub struct BindFrame {
    pattern: Rc<Pattern>,
    value: JsValue,
    mode: BindMode,
    context: Rc<EvaluationContext>,
    state: BindState,
    iterator: JsValue,
    done: bool,
    /// Value waiting for a member target's reference.
    pending: JsValue,
    used_keys: Vec<PropertyKey>,
    rest: Vec<JsValue>,
}

const REFERENCE_CATCH: EvalOptions = EvalOptions {
    rethrow: false,
    ..EvalOptions::REFERENCE
};

impl BindFrame {
    pub fn new(pattern: Rc<Pattern>, value: JsValue, mode: BindMode, context: Rc<EvaluationContext>) -> Self {
        Self {
            pattern,
            value,
            mode,
            context,
            state: BindState::Start,
            iterator: JsValue::Undefined,
            done: false,
            pending: JsValue::Undefined,
            used_keys: Vec::new(),
            rest: Vec::new(),
        }
    }

    fn finished() -> Result<Step, EngineError> {
        Ok(Step::value(JsValue::Undefined))
    }

    /// Binds `value` to `target`. Array patterns bind elements catching
    /// throws so the iterator can be closed.
    fn target(&mut self, realm: &mut Realm, target: &Rc<Pattern>, value: JsValue, catching: bool) -> Target {
        let options = if catching { EvalOptions::CATCH } else { EvalOptions::VALUE };
        match &**target {
            Pattern::Identifier(name) => match &self.mode {
                BindMode::Initialize(env) => match env.initialize_binding(realm, name, value) {
                    Ok(()) => Target::Bound,
                    Err(e) => Target::Threw(realm.throw_fault(e.into())),
                },
                BindMode::Assign => {
                    let reference = resolve_binding(realm, &self.context.lexical, name, self.context.strict);
                    Target::Wait(Command::Host(HostOperation::PutValue(reference, value), options).into())
                }
            },
            Pattern::Member(expr) => {
                self.pending = value;
                let reference_options = if catching { REFERENCE_CATCH } else { EvalOptions::REFERENCE };
                Target::Wait(Command::evaluate(Syntax::Expression(expr.clone()), &self.context, reference_options).into())
            }
            Pattern::Array { .. } | Pattern::Object { .. } => {
                let frame = BindFrame::new(target.clone(), value, self.mode.clone(), self.context.clone());
                Target::Wait(Command::enter(Frame::internal(FrameKind::Bind(frame)), options).into())
            }
        }
    }

    fn bind_slot(&mut self, realm: &mut Realm, slot: Slot, target: &Rc<Pattern>, value: JsValue) -> Result<Step, EngineError> {
        let catching = matches!(slot, Slot::Element(_) | Slot::Rest);
        self.state = BindState::Target(slot);
        match self.target(realm, target, value, catching) {
            Target::Bound => self.after(realm, slot),
            Target::Wait(step) => Ok(step),
            Target::Threw(error) if catching => self.close(Completion::Throw(error)),
            Target::Threw(error) => Ok(Step::throw(error)),
        }
    }

    /// Continues after the target of `slot` has been bound.
    fn after(&mut self, realm: &mut Realm, slot: Slot) -> Result<Step, EngineError> {
        match slot {
            Slot::Whole | Slot::ObjectRest => Self::finished(),
            Slot::Element(n) => self.element(realm, n + 1),
            Slot::Rest => self.close(Completion::empty()),
            Slot::Property(n) => self.property(realm, n + 1),
        }
    }

    fn elements(&self) -> Option<(Rc<[Option<PatternElement>]>, Option<Rc<Pattern>>)> {
        match &*self.pattern {
            Pattern::Array { elements, rest } => Some((elements.clone(), rest.clone())),
            _ => None,
        }
    }

    fn properties(&self) -> Option<(Rc<[(PropertyName, PatternElement)]>, Option<Rc<Pattern>>)> {
        match &*self.pattern {
            Pattern::Object { properties, rest } => Some((properties.clone(), rest.clone())),
            _ => None,
        }
    }

    fn element(&mut self, realm: &mut Realm, n: usize) -> Result<Step, EngineError> {
        let Some((elements, rest)) = self.elements() else {
            return Err(EngineError::defect("array binding on a non-array pattern"));
        };
        if n < elements.len() {
            if self.done {
                return self.element_value(realm, n, JsValue::Undefined);
            }
            self.state = BindState::Next(n);
            return Ok(next_value(self.iterator.clone()).into());
        }
        match rest {
            Some(_) if !self.done => {
                self.state = BindState::RestNext;
                Ok(next_value(self.iterator.clone()).into())
            }
            Some(rest) => {
                let array = JsValue::Object(realm.create_array(std::mem::take(&mut self.rest)));
                self.bind_slot(realm, Slot::Rest, &rest, array)
            }
            None => self.close(Completion::empty()),
        }
    }

    fn element_value(&mut self, realm: &mut Realm, n: usize, value: JsValue) -> Result<Step, EngineError> {
        let Some((elements, _)) = self.elements() else {
            return Err(EngineError::defect("array binding on a non-array pattern"));
        };
        let Some(element) = &elements[n] else {
            return self.element(realm, n + 1);
        };
        if value.is_undefined()
            && let Some(default) = &element.default
        {
            self.state = BindState::ElementDefault(n);
            return Ok(Command::evaluate(Syntax::Expression(default.clone()), &self.context, EvalOptions::CATCH).into());
        }
        let target = element.target.clone();
        self.bind_slot(realm, Slot::Element(n), &target, value)
    }

    /// Finishes an array pattern, closing the iterator unless it is exhausted.
    fn close(&mut self, completion: Completion) -> Result<Step, EngineError> {
        if self.done {
            return Ok(Step::Done(match completion {
                Completion::Normal(_) => Completion::normal(JsValue::Undefined),
                abrupt => abrupt,
            }));
        }
        self.done = true;
        self.state = BindState::Closing;
        Ok(close_iterator(self.iterator.clone(), completion).into())
    }

    fn property(&mut self, realm: &mut Realm, n: usize) -> Result<Step, EngineError> {
        let Some((properties, rest)) = self.properties() else {
            return Err(EngineError::defect("object binding on a non-object pattern"));
        };
        if n < properties.len() {
            return match &properties[n].0 {
                PropertyName::Static(name) => self.get(PropertyKey::String(name.clone()), n),
                PropertyName::Computed(expr) => {
                    self.state = BindState::Key(n);
                    Ok(Step::evaluate(expr, &self.context))
                }
            };
        }
        let Some(rest) = rest else {
            return Self::finished();
        };
        let copy = realm.create_object();
        if let Err(error) = realm.copy_data_properties(copy, &self.value, &self.used_keys) {
            return Ok(Step::throw(error));
        }
        self.bind_slot(realm, Slot::ObjectRest, &rest, JsValue::Object(copy))
    }

    fn get(&mut self, key: PropertyKey, n: usize) -> Result<Step, EngineError> {
        self.used_keys.push(key.clone());
        self.state = BindState::Get(n);
        let reference = Reference::property(self.value.clone(), key, self.context.strict);
        Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
    }

    fn property_value(&mut self, realm: &mut Realm, n: usize, value: JsValue) -> Result<Step, EngineError> {
        let Some((properties, _)) = self.properties() else {
            return Err(EngineError::defect("object binding on a non-object pattern"));
        };
        let element = &properties[n].1;
        if value.is_undefined()
            && let Some(default) = &element.default
        {
            self.state = BindState::PropertyDefault(n);
            return Ok(Step::evaluate(default, &self.context));
        }
        let target = element.target.clone();
        self.bind_slot(realm, Slot::Property(n), &target, value)
    }

    fn default_target(&self, n: usize, array: bool) -> Option<(Rc<crate::ast::Expression>, Rc<Pattern>)> {
        let element = if array {
            self.elements()?.0[n].clone()?
        } else {
            self.properties()?.0[n].1.clone()
        };
        Some((element.default?, element.target))
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.state, input) {
            (BindState::Start, Resumption::Start) => match &*self.pattern {
                Pattern::Identifier(_) | Pattern::Member(_) => {
                    let pattern = self.pattern.clone();
                    let value = self.value.clone();
                    self.bind_slot(realm, Slot::Whole, &pattern, value)
                }
                Pattern::Array { .. } => {
                    self.state = BindState::Iterator;
                    Ok(get_iterator(self.value.clone()).into())
                }
                Pattern::Object { .. } => {
                    if self.value.is_nullish() {
                        let message = format!("Cannot destructure '{}' as it is {}.", self.value, self.value);
                        return Ok(Step::throw(realm.type_error(message)));
                    }
                    self.property(realm, 0)
                }
            },
            (BindState::Iterator, Resumption::Value(iterator)) => {
                self.iterator = iterator;
                self.element(realm, 0)
            }
            (BindState::Next(n), Resumption::Completion(completion)) => match completion {
                Completion::Normal(Some(value)) => self.element_value(realm, n, value),
                Completion::Normal(None) => {
                    self.done = true;
                    self.element_value(realm, n, JsValue::Undefined)
                }
                abrupt => {
                    self.done = true;
                    Ok(Step::Done(abrupt))
                }
            },
            (BindState::ElementDefault(n), Resumption::Value(value)) => {
                let Some((default, target)) = self.default_target(n, true) else {
                    return Err(EngineError::defect("default value without a default"));
                };
                realm.name_anonymous_function(&default, &target, &value);
                self.bind_slot(realm, Slot::Element(n), &target, value)
            }
            (BindState::ElementDefault(_), Resumption::Completion(thrown @ Completion::Throw(_))) => self.close(thrown),
            (BindState::RestNext, Resumption::Completion(completion)) => match completion {
                Completion::Normal(Some(value)) => {
                    self.rest.push(value);
                    Ok(next_value(self.iterator.clone()).into())
                }
                Completion::Normal(None) => {
                    self.done = true;
                    let Some((_, Some(rest))) = self.elements() else {
                        return Err(EngineError::defect("rest element missing"));
                    };
                    let array = JsValue::Object(realm.create_array(std::mem::take(&mut self.rest)));
                    self.bind_slot(realm, Slot::Rest, &rest, array)
                }
                abrupt => {
                    self.done = true;
                    Ok(Step::Done(abrupt))
                }
            },
            (BindState::Key(n), Resumption::Value(key)) => match realm.to_property_key(&key) {
                Ok(key) => self.get(key, n),
                Err(error) => Ok(Step::throw(error)),
            },
            (BindState::Get(n), Resumption::Value(value)) => self.property_value(realm, n, value),
            (BindState::PropertyDefault(n), Resumption::Value(value)) => {
                let Some((default, target)) = self.default_target(n, false) else {
                    return Err(EngineError::defect("default value without a default"));
                };
                realm.name_anonymous_function(&default, &target, &value);
                self.bind_slot(realm, Slot::Property(n), &target, value)
            }
            (BindState::Target(slot), Resumption::Reference(reference)) => {
                let value = std::mem::take(&mut self.pending);
                let options = if matches!(slot, Slot::Element(_) | Slot::Rest) {
                    EvalOptions::CATCH
                } else {
                    EvalOptions::VALUE
                };
                Ok(Command::Host(HostOperation::PutValue(reference, value), options).into())
            }
            (BindState::Target(slot), Resumption::Value(_)) => self.after(realm, slot),
            (BindState::Target(_), Resumption::Completion(thrown @ Completion::Throw(_))) => self.close(thrown),
            (BindState::Closing, Resumption::Completion(completion)) => Ok(Step::Done(match completion {
                Completion::Normal(_) => Completion::normal(JsValue::Undefined),
                abrupt => abrupt,
            })),
            (_, input) => Err(unexpected("binding", &input)),
        }
    }
}

impl Trace for BindMode {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let BindMode::Initialize(env) = self {
            env.trace(tracer);
        }
    }
}

trace_fields! {
    BindFrame => value, mode, context, iterator, pending, rest;
}
