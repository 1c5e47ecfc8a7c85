use std::rc::Rc;

use super::RealmId;
use super::environment::EnvRef;
use super::gc::{Trace, Tracer};

/// Everything a node needs from its surroundings to evaluate: the realm it
/// belongs to, its scopes, the label set it is evaluated under and whether
/// it is strict code.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub realm: RealmId,
    pub lexical: EnvRef,
    pub variable: EnvRef,
    pub labels: Rc<[Rc<str>]>,
    pub strict: bool,
}

impl EvaluationContext {
    pub fn new(realm: RealmId, env: EnvRef, strict: bool) -> Rc<Self> {
        Rc::new(Self {
            realm,
            lexical: env.clone(),
            variable: env,
            labels: Rc::from(Vec::new()),
            strict,
        })
    }

    pub fn with_lexical(self: &Rc<Self>, lexical: EnvRef) -> Rc<Self> {
        Rc::new(Self {
            lexical,
            labels: Rc::from(Vec::new()),
            ..(**self).clone()
        })
    }

    /// Context carrying an explicit label set.
    pub fn with_labels(self: &Rc<Self>, labels: Rc<[Rc<str>]>) -> Rc<Self> {
        Rc::new(Self {
            labels,
            ..(**self).clone()
        })
    }

    pub fn without_labels(self: &Rc<Self>) -> Rc<Self> {
        if self.labels.is_empty() {
            return self.clone();
        }
        Rc::new(Self {
            labels: Rc::from(Vec::new()),
            ..(**self).clone()
        })
    }
}

impl Trace for EvaluationContext {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.lexical.trace(tracer);
        self.variable.trace(tracer);
    }
}
