use std::time::Duration;

use crate::config::{MapResolver, RealmConfig, RunnerPolicy, SliceConfig};
use crate::error::EngineError;
use crate::interpreter::Realm;

fn realm_with(resolver: MapResolver) -> Realm {
    Realm::new(RealmConfig::builder().resolver(resolver).build())
}

fn sliced_realm_with(resolver: MapResolver) -> Realm {
    let policy = RunnerPolicy::TimeSliced(SliceConfig::default().with_evaluation_timeout(Duration::from_secs(5)));
    Realm::new(RealmConfig::builder().resolver(resolver).policy(policy).build())
}

#[test]
fn namespace_lists_named_and_default_exports() {
    let resolver = MapResolver::new()
        .with("math", "export const two = 2; export function double(x) { return x * two; } export default 'm';")
        .with("main", "import label, { double } from 'math'; export const result = label + double(21);");
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { result: 'm42' }");
}

#[test]
fn namespace_import_sees_every_export_sorted() {
    let resolver = MapResolver::new()
        .with("lib", "export let zeta = 1; export let alpha = 2; export default 3;")
        .with("main", "import * as lib from 'lib'; export const keys = Object.keys(lib);");
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { keys: ['alpha', 'default', 'zeta'] }");
}

#[test]
fn imports_are_live_bindings() {
    let resolver = MapResolver::new()
        .with("counter", "export let count = 0; export function inc() { count++; }")
        .with(
            "main",
            "import { count, inc } from 'counter';
             const before = count;
             inc(); inc();
             export const seen = [before, count];",
        );
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { seen: [0, 2] }");
}

#[test]
fn imported_bindings_cannot_be_assigned() {
    let resolver = MapResolver::new()
        .with("a", "export let value = 1;")
        .with("main", "import { value } from 'a'; value = 2;");
    let mut realm = realm_with(resolver);
    let err = realm.evaluate_module("main").unwrap_err();
    let EngineError::Throw(thrown) = err else {
        panic!("expected a guest throw, got {err}");
    };
    assert!(thrown.rendered.starts_with("TypeError"), "{}", thrown.rendered);
}

#[test]
fn star_exports_forward_names_but_not_default() {
    let resolver = MapResolver::new()
        .with("inner", "export const a = 1; export default 'hidden';")
        .with("outer", "export * from 'inner'; export const b = 2;")
        .with("main", "import * as all from 'outer'; export const names = Object.keys(all);");
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { names: ['a', 'b'] }");
}

#[test]
fn missing_export_is_a_syntax_error() {
    let resolver = MapResolver::new()
        .with("lib", "export const present = 1;")
        .with("main", "import { absent } from 'lib';");
    let mut realm = realm_with(resolver);
    let err = realm.evaluate_module("main").unwrap_err();
    let EngineError::Throw(thrown) = err else {
        panic!("expected a guest throw, got {err}");
    };
    assert_eq!(
        thrown.rendered,
        "SyntaxError: The requested module 'lib' does not provide an export named 'absent'"
    );
}

#[test]
fn conflicting_star_exports_are_ambiguous() {
    let resolver = MapResolver::new()
        .with("left", "export const shared = 'l';")
        .with("right", "export const shared = 'r';")
        .with("both", "export * from 'left'; export * from 'right';")
        .with("names", "import * as ns from 'both'; export const keys = Object.keys(ns);")
        .with("main", "import { shared } from 'both';");
    let mut realm = realm_with(resolver);

    let namespace = realm.evaluate_module("names").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { keys: [] }");

    let err = realm.evaluate_module("main").unwrap_err();
    let thrown = err.thrown().map(|v| realm.display(v)).unwrap_or_default();
    assert_eq!(
        thrown,
        "SyntaxError: The requested module 'both' contains conflicting star exports for name 'shared'"
    );
}

#[test]
fn cycles_evaluate_dependencies_first() {
    let resolver = MapResolver::new()
        .with(
            "a",
            "import { fromB } from 'b';
             export function fromA() { return 'a'; }
             export const combined = fromA() + fromB();",
        )
        .with(
            "b",
            "import { fromA } from 'a';
             export function fromB() { return 'b'; }
             export const early = typeof fromA;",
        )
        .with("main", "import { combined } from 'a'; import { early } from 'b'; export const out = [combined, early];");
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { out: ['ab', 'function'] }");
}

#[test]
fn modules_are_evaluated_once() {
    let resolver = MapResolver::new()
        .with("shared", "globalThis.loads = (globalThis.loads || 0) + 1; export const x = 1;")
        .with("one", "import { x } from 'shared'; export const a = x;")
        .with("main", "import { a } from 'one'; import { x } from 'shared'; export const total = a + x;");
    let mut realm = realm_with(resolver);
    realm.evaluate_module("main").unwrap();
    realm.evaluate_module("one").unwrap();
    let loads = realm.get_global("loads").and_then(|v| v.as_number());
    assert_eq!(loads, Some(1.0));
}

#[test]
fn evaluation_errors_are_cached() {
    let resolver = MapResolver::new().with("bad", "throw new Error('boom');");
    let mut realm = realm_with(resolver);
    let first = realm.evaluate_module("bad").unwrap_err();
    let second = realm.evaluate_module("bad").unwrap_err();
    assert_eq!(first.to_string(), second.to_string());
    assert!(first.to_string().contains("Error: boom"), "{first}");
}

#[test]
fn unresolvable_specifier_fails_to_load() {
    let mut realm = realm_with(MapResolver::new().with("main", "import 'nowhere';"));
    let err = realm.evaluate_module("main").unwrap_err();
    assert!(
        matches!(&err, EngineError::Module { specifier, .. } if specifier == "nowhere"),
        "{err}"
    );
    // A failed load leaves nothing half-registered behind.
    let err = realm.evaluate_module("main").unwrap_err();
    assert!(matches!(err, EngineError::Module { .. }));
}

#[test]
fn module_without_resolver_is_rejected() {
    let mut realm = Realm::new(RealmConfig::default());
    let err = realm.evaluate_module("main").unwrap_err();
    assert!(err.to_string().contains("no module resolver is configured"), "{err}");
}

#[test]
fn module_code_is_strict() {
    let mut realm = realm_with(MapResolver::new().with("main", "undeclared = 1;"));
    let err = realm.evaluate_module("main").unwrap_err();
    let thrown = err.thrown().map(|v| realm.display(v)).unwrap_or_default();
    assert!(thrown.starts_with("ReferenceError"), "{thrown}");
}

#[test]
fn top_level_await_on_settled_promise_runs_synchronously() {
    let resolver = MapResolver::new().with("main", "export const v = await Promise.resolve(7) * 6;");
    let mut realm = realm_with(resolver);
    let namespace = realm.evaluate_module("main").unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { v: 42 }");
}

#[test]
fn synchronous_evaluation_would_block_on_host_promise() {
    let mut realm = realm_with(MapResolver::new().with("main", "export const v = await pending;"));
    let (promise, _handle) = realm.create_deferred();
    realm.set_global("pending", promise).unwrap();
    let err = realm.evaluate_module("main").unwrap_err();
    assert!(matches!(err, EngineError::WouldBlock), "{err}");
}

#[tokio::test]
async fn top_level_await_resumes_when_host_settles() {
    let mut realm = sliced_realm_with(MapResolver::new().with("main", "export const v = (await pending) + '!';"));
    let (promise, handle) = realm.create_deferred();
    realm.set_global("pending", promise).unwrap();
    let task = realm.module_task("main").unwrap();

    let settler = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        handle.resolve("ready");
    });
    let namespace = realm.run(task).await.unwrap();
    settler.join().unwrap();
    assert_eq!(realm.display(&namespace), "[Module] { v: 'ready!' }");
}

#[tokio::test]
async fn host_rejection_surfaces_as_a_guest_throw() {
    let mut realm = sliced_realm_with(MapResolver::new().with("main", "await pending;"));
    let (promise, handle) = realm.create_deferred();
    realm.set_global("pending", promise).unwrap();
    handle.reject("denied");
    let task = realm.module_task("main").unwrap();
    let err = realm.run(task).await.unwrap_err();
    assert_eq!(err.thrown().and_then(|v| v.as_str()), Some("denied"));
}

#[tokio::test]
async fn await_nothing_can_settle_is_stalled() {
    let mut realm = sliced_realm_with(MapResolver::new().with("main", "await new Promise(() => {});"));
    let task = realm.module_task("main").unwrap();
    let err = realm.run(task).await.unwrap_err();
    assert!(matches!(err, EngineError::Stalled), "{err}");
}
