use super::{eval, realm_with_console};
use crate::config::ConsoleLevel;

#[test]
fn microtasks_run_before_timers() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "setTimeout(() => console.log('t'), 0);
             Promise.resolve().then(() => console.log('p'));
             console.log('a');
             console.log('b');",
        )
        .unwrap();
    assert_eq!(console.lines(), ["a", "b", "p", "t"]);
}

#[test]
fn timers_fire_in_due_order() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "setTimeout(() => console.log('late'), 50);
             setTimeout(() => console.log('early'), 10);
             setTimeout(() => console.log('also early'), 10);",
        )
        .unwrap();
    assert_eq!(console.lines(), ["early", "also early", "late"]);
}

#[test]
fn cleared_timer_never_fires() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "const id = setTimeout(() => console.log('never'), 0);
             clearTimeout(id);
             queueMicrotask(() => console.log('micro'));",
        )
        .unwrap();
    assert_eq!(console.lines(), ["micro"]);
}

#[test]
fn interval_repeats_until_cleared() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "let n = 0;
             const id = setInterval(() => { n++; console.log('tick ' + n); if (n === 3) clearInterval(id); }, 5);",
        )
        .unwrap();
    assert_eq!(console.lines(), ["tick 1", "tick 2", "tick 3"]);
}

#[test]
fn async_function_result_is_available_after_jobs_drain() {
    let mut realm = crate::Realm::new(crate::RealmConfig::default());
    realm
        .evaluate_program(
            "var out;
             async function add(a, b) { const x = await a; const y = await b; return x + y; }
             add(Promise.resolve(20), 22).then(v => { out = v; });",
        )
        .unwrap();
    let out = realm.evaluate_expression("out").unwrap();
    assert_eq!(out.as_number(), Some(42.0));
}

#[test]
fn await_interleaves_with_other_microtasks() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "async function worker(name) { console.log(name + ' 1'); await null; console.log(name + ' 2'); }
             worker('x');
             worker('y');
             console.log('sync');",
        )
        .unwrap();
    assert_eq!(console.lines(), ["x 1", "y 1", "sync", "x 2", "y 2"]);
}

#[test]
fn rejections_flow_to_catch_and_finally() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "Promise.reject(new Error('nope'))
                 .then(() => console.log('skipped'))
                 .catch(e => { console.log('caught ' + e.message); return 'recovered'; })
                 .finally(() => console.log('finally'))
                 .then(v => console.log(v));",
        )
        .unwrap();
    assert_eq!(console.lines(), ["caught nope", "finally", "recovered"]);
}

#[test]
fn async_throw_becomes_rejection() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "async function fail() { throw new TypeError('bad'); }
             fail().catch(e => console.error(e));",
        )
        .unwrap();
    assert_eq!(console.lines_at(ConsoleLevel::Error), ["TypeError: bad"]);
    assert!(console.lines_at(ConsoleLevel::Log).is_empty());
}

#[test]
fn try_catch_around_await_catches_rejection() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "async function guarded() {
                 try { await Promise.reject('no'); } catch (e) { return 'handled ' + e; }
             }
             guarded().then(console.log);",
        )
        .unwrap();
    assert_eq!(console.lines(), ["handled no"]);
}

#[test]
fn uncaught_errors_in_jobs_do_not_stop_the_queue() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "setTimeout(() => { throw new Error('lost'); }, 0);
             setTimeout(() => console.log('still running'), 1);",
        )
        .unwrap();
    assert_eq!(console.lines(), ["still running"]);
}

#[test]
fn promise_renders_with_its_state() {
    assert_eq!(eval("Promise.resolve(1)"), "Promise { 1 }");
    assert_eq!(eval("new Promise(() => {})"), "Promise { <pending> }");
}

#[test]
fn thenables_are_adopted() {
    let (mut realm, console) = realm_with_console();
    realm
        .evaluate_program(
            "const thenable = { then(resolve) { resolve('adopted'); } };
             Promise.resolve(thenable).then(v => console.log(v));",
        )
        .unwrap();
    assert_eq!(console.lines(), ["adopted"]);
}
