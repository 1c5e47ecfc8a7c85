//! End-to-end scenarios driven through the public host API.

mod language;
mod modules;
mod promises;
mod scheduling;

use std::rc::Rc;

use crate::config::{CapturedConsole, RealmConfig};
use crate::error::EngineError;
use crate::interpreter::Realm;

/// A realm whose console output is captured.
fn realm_with_console() -> (Realm, Rc<CapturedConsole>) {
    let console = CapturedConsole::new();
    let realm = Realm::new(RealmConfig::builder().console(console.clone()).build());
    (realm, console)
}

/// Evaluates a script in a fresh realm and renders its completion value.
fn eval(source: &str) -> String {
    let mut realm = Realm::new(RealmConfig::default());
    match realm.evaluate_program(source) {
        Ok(value) => realm.display(&value),
        Err(e) => panic!("{source:?} failed: {e}"),
    }
}

/// Evaluates a script that must throw and returns the rendered exception.
fn eval_throws(source: &str) -> String {
    let mut realm = Realm::new(RealmConfig::default());
    match realm.evaluate_program(source) {
        Err(EngineError::Throw(thrown)) => thrown.rendered,
        Ok(value) => panic!("{source:?} completed with {}", realm.display(&value)),
        Err(e) => panic!("{source:?} failed without throwing: {e}"),
    }
}
