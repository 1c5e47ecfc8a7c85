use std::time::Duration;

use super::realm_with_console;
use crate::config::{CapturedConsole, RealmConfig, RunnerPolicy, SliceConfig};
use crate::error::{AbortReason, EngineError};
use crate::interpreter::{Realm, TaskStatus};
use crate::types::JsValue;

const SUM_LOOP: &str = "let s = 0; for (let i = 0; i < 200; i++) { s += i; } s";

fn sliced(config: SliceConfig) -> Realm {
    Realm::new(RealmConfig::builder().policy(RunnerPolicy::TimeSliced(config)).build())
}

/// Steps a task by hand and returns its result with the number of calls.
fn step_manually(realm: &mut Realm, source: &str) -> (String, u64) {
    let mut task = realm.program_task(source).unwrap();
    let mut calls = 0;
    while !task.next(realm) {
        calls += 1;
    }
    assert_eq!(task.operations(), calls + 1);
    let value = task.into_result().unwrap();
    (realm.display(&value), calls + 1)
}

#[test]
fn manual_stepping_reaches_the_same_result() {
    let mut realm = Realm::new(RealmConfig::builder().policy(RunnerPolicy::Manual).build());
    let (value, operations) = step_manually(&mut realm, SUM_LOOP);
    assert_eq!(value, "19900");
    assert!(operations > 200, "a 200-iteration loop took only {operations} operations");
}

#[test]
fn every_call_to_next_makes_one_operation() {
    let mut realm = Realm::new(RealmConfig::default());
    let mut task = realm.program_task("1 + 2").unwrap();
    assert_eq!(task.status(), TaskStatus::Runnable);
    assert!(task.started().is_none());
    assert!(!task.next(&mut realm));
    assert_eq!(task.operations(), 1);
    assert!(task.started().is_some());
    while !task.next(&mut realm) {}
    assert_eq!(task.status(), TaskStatus::Done);
    assert_eq!(task.into_result().unwrap().as_number(), Some(3.0));
}

#[tokio::test]
async fn time_slicing_yields_once_per_budget() {
    const BUDGET: u64 = 100;
    let mut counter = Realm::new(RealmConfig::default());
    let (_, operations) = step_manually(&mut counter, SUM_LOOP);
    let k = operations / BUDGET;
    assert!(k >= 2, "loop too short to span several slices");

    let mut realm = sliced(SliceConfig::default().with_ops_per_slice(BUDGET));
    let task = realm.program_task(SUM_LOOP).unwrap();
    let value = realm.run(task).await.unwrap();
    assert_eq!(value.as_number(), Some(19900.0));
    assert!(realm.slices() >= k - 1, "{} slices for {operations} operations", realm.slices());
}

#[tokio::test]
async fn default_slice_never_yields_for_short_scripts() {
    let mut realm = sliced(SliceConfig::default());
    let task = realm.program_task("1").unwrap();
    realm.run(task).await.unwrap();
    assert_eq!(realm.slices(), 0);
}

#[test]
fn abort_finishes_the_task_and_later_calls_do_nothing() {
    let mut realm = Realm::new(RealmConfig::default());
    let mut task = realm.program_task("while (true) {}").unwrap();
    for _ in 0..10 {
        assert!(!task.next(&mut realm));
    }
    task.abort();
    assert!(task.next(&mut realm));
    assert!(task.done());
    assert!(task.aborted());
    assert!(task.location().is_none());
    let operations = task.operations();
    for _ in 0..5 {
        assert!(task.next(&mut realm));
    }
    assert_eq!(task.operations(), operations);
    assert!(matches!(task.result(), Some(Err(EngineError::Aborted(AbortReason::Requested)))));
}

#[test]
fn aborting_a_finished_task_keeps_its_result() {
    let mut realm = Realm::new(RealmConfig::default());
    let mut task = realm.program_task("'kept'").unwrap();
    while !task.next(&mut realm) {}
    task.abort();
    assert!(task.next(&mut realm));
    assert!(!task.aborted());
    assert_eq!(task.into_result().unwrap().as_str(), Some("kept"));
}

#[tokio::test]
async fn abort_handle_works_from_another_thread() {
    let mut realm = sliced(SliceConfig::default().with_ops_per_slice(500));
    let task = realm.program_task("while (true) {}").unwrap();
    let handle = task.abort_handle();
    let aborter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        handle.abort();
    });
    let err = realm.run(task).await.unwrap_err();
    aborter.join().unwrap();
    assert!(matches!(err, EngineError::Aborted(AbortReason::Requested)), "{err}");
}

#[tokio::test]
async fn task_deadline_aborts_runaway_loops() {
    let mut realm = sliced(SliceConfig::default().with_task_timeout(Duration::from_millis(30)));
    let task = realm.program_task("for (;;) {}").unwrap();
    let err = realm.run(task).await.unwrap_err();
    assert!(matches!(err, EngineError::Aborted(AbortReason::TaskDeadline)), "{err}");
}

#[tokio::test]
async fn evaluation_deadline_drops_endless_jobs() {
    let console = CapturedConsole::new();
    let mut realm = Realm::new(
        RealmConfig::builder()
            .console(console.clone())
            .policy(RunnerPolicy::TimeSliced(
                SliceConfig::default().with_evaluation_timeout(Duration::from_millis(30)),
            ))
            .build(),
    );
    let task = realm
        .program_task("let n = 0; setInterval(() => { n++; }, 1); console.log('scheduled'); 'done'")
        .unwrap();
    let value = realm.run(task).await.unwrap();
    assert_eq!(value.as_str(), Some("done"));
    assert!(!realm.has_pending_jobs());
    assert_eq!(console.lines(), ["scheduled"]);
}

#[test]
fn location_tracks_the_running_statement() {
    let mut realm = Realm::new(RealmConfig::default());
    let mut task = realm.program_task("let a = 1;\n\nwhile (a) {\n  a = 1;\n}").unwrap();
    for _ in 0..50 {
        task.next(&mut realm);
    }
    let location = task.location().expect("a running task has a location");
    assert!(location.line >= 3, "{location}");
}

#[test]
fn script_does_not_wait_for_host_promises() {
    let mut realm = Realm::new(RealmConfig::default());
    let (promise, _handle) = realm.create_deferred();
    realm.set_global("pending", promise).unwrap();
    realm
        .evaluate_program("var got; (async () => { got = await pending; })(); 'started'")
        .unwrap();
    // The async function is still waiting: its continuation is not a job yet.
    assert!(matches!(realm.get_global("got"), Some(JsValue::Undefined)));
}

#[test]
fn two_realms_evaluate_identically() {
    const SCRIPT: &str = "
        const seen = [];
        for (let i = 0; i < 5; i++) seen.push(Math.random());
        setTimeout(() => console.log('timer'), 3);
        Promise.resolve().then(() => console.log('then'));
        console.log(seen.length);
        seen.join(',')";

    let run = || {
        let (mut realm, console) = realm_with_console();
        let mut task = realm.program_task(SCRIPT).unwrap();
        while !task.next(&mut realm) {}
        let operations = task.operations();
        let value = task.into_result().unwrap();
        while realm.step_job() {}
        (realm.display(&value), operations, console.lines())
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(first.2, ["5", "then", "timer"]);
}
