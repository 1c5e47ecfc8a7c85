//! `%GeneratorPrototype%`: `next`, `return` and `throw` resume the parked
//! frames of the generator body on the caller's coroutine.

use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::command::Resumption;
use crate::interpreter::completion::Completion;
use crate::interpreter::object::{GeneratorStatus, ObjectKind};
use crate::types::{JsObject, JsValue, WellKnownSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeKind {
    Next,
    Return,
    Throw,
}

impl Realm {
    pub(crate) fn setup_generator(&mut self) {
        let proto = self.intrinsics.generator_prototype;
        self.install_method(proto, "next", 1, next);
        self.install_method(proto, "return", 1, return_);
        self.install_method(proto, "throw", 1, throw);
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::ToStringTag.key(), JsValue::string("Generator"));
    }

    fn generator_status(&self, generator: JsObject) -> Option<GeneratorStatus> {
        match &self.object(generator).kind {
            ObjectKind::Generator(data) => Some(data.status),
            _ => None,
        }
    }
}

fn resume(realm: &mut Realm, call: &NativeCall, kind: ResumeKind) -> Result<CallOutcome, JsValue> {
    let value = call.arg(0);
    let generator = call.this.as_object();
    let Some((generator, status)) = generator.and_then(|g| Some((g, realm.generator_status(g)?))) else {
        let message = format!("{} is not a generator", realm.describe(&call.this));
        return Err(realm.type_error(message));
    };
    match (status, kind) {
        (GeneratorStatus::Executing, _) => Err(realm.type_error("Generator is already running")),
        (GeneratorStatus::Completed, ResumeKind::Throw) => Err(value),
        (GeneratorStatus::Completed, ResumeKind::Next) => {
            Ok(CallOutcome::value(realm.create_iter_result_object(JsValue::Undefined, true)))
        }
        (GeneratorStatus::Completed, ResumeKind::Return) => {
            Ok(CallOutcome::value(realm.create_iter_result_object(value, true)))
        }
        // Never started: `return` and `throw` complete it without running the body.
        (GeneratorStatus::SuspendedStart, ResumeKind::Return | ResumeKind::Throw) => {
            realm.park_generator(generator, Vec::new(), GeneratorStatus::Completed);
            if kind == ResumeKind::Throw {
                return Err(value);
            }
            Ok(CallOutcome::value(realm.create_iter_result_object(value, true)))
        }
        (GeneratorStatus::SuspendedStart | GeneratorStatus::SuspendedYield, _) => {
            let frames = realm.unpark_generator(generator);
            let input = match kind {
                ResumeKind::Next => Resumption::Value(value),
                ResumeKind::Return => Resumption::Completion(Completion::Return(value)),
                ResumeKind::Throw => Resumption::Completion(Completion::Throw(value)),
            };
            Ok(CallOutcome::Resume { frames, input })
        }
    }
}

fn next(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    resume(realm, call, ResumeKind::Next)
}

fn return_(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    resume(realm, call, ResumeKind::Return)
}

fn throw(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    resume(realm, call, ResumeKind::Throw)
}
