use std::rc::Rc;

use super::gc::{Trace, Tracer};
use crate::types::JsValue;

/// Result of evaluating a node.
///
/// `Normal(None)` is the empty completion value: statements like `var x;`
/// produce it and statement lists keep the last non-empty value.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Option<JsValue>),
    Return(JsValue),
    Throw(JsValue),
    /// Target label and the value of the statements run before the jump.
    Break(Option<Rc<str>>, Option<JsValue>),
    Continue(Option<Rc<str>>, Option<JsValue>),
}

impl Completion {
    pub fn normal(value: JsValue) -> Self {
        Completion::Normal(Some(value))
    }

    pub fn empty() -> Self {
        Completion::Normal(None)
    }

    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, Completion::Throw(_))
    }

    /// Fills an empty completion value with `value`.
    pub fn update_empty(self, value: Option<JsValue>) -> Self {
        match self {
            Completion::Normal(None) => Completion::Normal(value),
            Completion::Break(label, None) => Completion::Break(label, value),
            Completion::Continue(label, None) => Completion::Continue(label, value),
            other => other,
        }
    }

    /// The carried value, if the completion has one.
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Completion::Normal(v) => v.as_ref(),
            Completion::Return(v) | Completion::Throw(v) => Some(v),
            Completion::Break(_, v) | Completion::Continue(_, v) => v.as_ref(),
        }
    }

    /// Unwraps a normal completion into its value (empty reads as
    /// `undefined`); any abrupt completion is handed back for propagation.
    pub fn into_value(self) -> Result<JsValue, Completion> {
        match self {
            Completion::Normal(v) => Ok(v.unwrap_or(JsValue::Undefined)),
            abrupt => Err(abrupt),
        }
    }

    /// Whether a loop labelled with `labels` keeps iterating after a body
    /// completing with `self`.
    pub fn loop_continues(&self, labels: &[Rc<str>]) -> bool {
        match self {
            Completion::Normal(_) | Completion::Continue(None, _) => true,
            Completion::Continue(Some(label), _) => labels.contains(label),
            _ => false,
        }
    }
}

impl From<Result<JsValue, JsValue>> for Completion {
    fn from(result: Result<JsValue, JsValue>) -> Self {
        match result {
            Ok(v) => Completion::Normal(Some(v)),
            Err(e) => Completion::Throw(e),
        }
    }
}

impl Trace for Completion {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Completion::Normal(value) | Completion::Break(_, value) | Completion::Continue(_, value) => {
                value.trace(tracer)
            }
            Completion::Return(value) | Completion::Throw(value) => value.trace(tracer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_empty_only_fills_empty() {
        let filled = Completion::empty().update_empty(Some(JsValue::Number(1.0)));
        assert!(matches!(filled, Completion::Normal(Some(JsValue::Number(n))) if n == 1.0));

        let kept = Completion::normal(JsValue::Number(2.0)).update_empty(Some(JsValue::Number(1.0)));
        assert!(matches!(kept, Completion::Normal(Some(JsValue::Number(n))) if n == 2.0));

        let thrown = Completion::Throw(JsValue::Null).update_empty(Some(JsValue::Number(1.0)));
        assert!(thrown.is_throw());

        let jump = Completion::Break(None, None).update_empty(Some(JsValue::Number(3.0)));
        assert!(matches!(jump, Completion::Break(None, Some(JsValue::Number(n))) if n == 3.0));
    }

    #[test]
    fn loop_continuation_respects_labels() {
        let outer: Rc<str> = Rc::from("outer");
        assert!(Completion::Continue(None, None).loop_continues(&[]));
        assert!(Completion::Continue(Some(outer.clone()), None).loop_continues(&[outer.clone()]));
        assert!(!Completion::Continue(Some(outer.clone()), None).loop_continues(&[]));
        assert!(!Completion::Break(None, None).loop_continues(&[outer]));
    }

    #[test]
    fn into_value_treats_empty_as_undefined() {
        assert!(matches!(Completion::empty().into_value(), Ok(JsValue::Undefined)));
        assert!(Completion::Return(JsValue::Null).into_value().is_err());
    }
}
