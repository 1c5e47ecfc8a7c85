use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::parser::ParseError;
use crate::types::JsValue;

/// Host-facing failure of an evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An internal invariant was violated. Never observable by guest code.
    #[error("engine defect: {0}")]
    Defect(String),
    /// A guest value was thrown and not caught before reaching the task boundary.
    #[error("uncaught {0}")]
    Throw(GuestThrow),
    #[error(transparent)]
    Syntax(#[from] ParseError),
    /// The scheduler cancelled the task.
    #[error("task aborted: {0}")]
    Aborted(AbortReason),
    /// A synchronous evaluation awaited something nothing can settle synchronously.
    #[error("evaluation would block on a pending await")]
    WouldBlock,
    /// An asynchronous evaluation awaits a value that can never settle.
    #[error("evaluation stalled on an await that nothing can settle")]
    Stalled,
    /// The module resolution callback failed.
    #[error("cannot load module '{specifier}': {message}")]
    Module { specifier: String, message: String },
}

impl EngineError {
    pub fn defect(message: impl Into<String>) -> Self {
        EngineError::Defect(message.into())
    }

    /// The thrown guest value, for `Throw` failures.
    pub fn thrown(&self) -> Option<&JsValue> {
        match self {
            EngineError::Throw(t) => Some(&t.value),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, EngineError::Aborted(_))
    }
}

/// A thrown guest value together with a host-readable rendering of it.
#[derive(Debug, Clone)]
pub struct GuestThrow {
    pub value: JsValue,
    pub rendered: String,
}

impl fmt::Display for GuestThrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("abort requested by host")]
    Requested,
    #[error("per-task time limit exceeded")]
    TaskDeadline,
    #[error("evaluation time limit exceeded")]
    EvaluationDeadline,
}

impl AbortReason {
    pub(crate) fn code(self) -> u8 {
        match self {
            AbortReason::Requested => 1,
            AbortReason::TaskDeadline => 2,
            AbortReason::EvaluationDeadline => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(AbortReason::Requested),
            2 => Some(AbortReason::TaskDeadline),
            3 => Some(AbortReason::EvaluationDeadline),
            _ => None,
        }
    }
}

/// Failure of an Environment Record operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("Cannot access '{0}' before initialization")]
    Uninitialized(Rc<str>),
    #[error("{0} is not defined")]
    NotDefined(Rc<str>),
    #[error("Assignment to constant variable '{0}'")]
    Immutable(Rc<str>),
    #[error("Identifier '{0}' has already been declared")]
    AlreadyDeclared(Rc<str>),
    #[error("Binding '{0}' is already initialized")]
    AlreadyInitialized(Rc<str>),
}

impl BindingError {
    /// Errors a guest can observe, as opposed to instantiation defects.
    pub fn is_guest_error(&self) -> bool {
        matches!(
            self,
            BindingError::Uninitialized(_) | BindingError::NotDefined(_) | BindingError::Immutable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_naturally() {
        assert_eq!(
            BindingError::Uninitialized(Rc::from("x")).to_string(),
            "Cannot access 'x' before initialization"
        );
        assert_eq!(
            EngineError::Aborted(AbortReason::TaskDeadline).to_string(),
            "task aborted: per-task time limit exceeded"
        );
    }

    #[test]
    fn abort_reason_codes_round_trip() {
        for reason in [AbortReason::Requested, AbortReason::TaskDeadline, AbortReason::EvaluationDeadline] {
            assert_eq!(AbortReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(AbortReason::from_code(0), None);
    }
}
