//! Tasks and the runner policies that drive them.
//!
//! A task owns one coroutine; the realm keeps a weak reference to it so the
//! collector can treat its frames as roots. [`Task::next`] performs exactly one operation
//! and reports whether the task is finished, so a host can interleave tasks
//! with its own work. [`Realm::run`] drives a task under the realm's
//! [`RunnerPolicy`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::Realm;
use super::completion::Completion;
use super::driver::{Coroutine, StepResult};
use super::realm::RealmId;
use crate::config::{RunnerPolicy, SliceConfig};
use crate::error::{AbortReason, EngineError, GuestThrow};
use crate::lexer::SourceLocation;
use crate::types::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Program,
    Expression,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The next call to [`Task::next`] makes progress.
    Runnable,
    /// Waiting on an await that no queued job can settle yet.
    Blocked,
    Done,
}

/// Thread-safe handle that cancels a task. The task observes it at the top
/// of its next step.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicU8>);

impl AbortHandle {
    pub fn abort(&self) {
        self.abort_with(AbortReason::Requested);
    }

    /// Records `reason` unless an earlier abort already did.
    pub(crate) fn abort_with(&self, reason: AbortReason) {
        let _ = self
            .0
            .compare_exchange(0, reason.code(), Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    fn reason(&self) -> Option<AbortReason> {
        AbortReason::from_code(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    realm: RealmId,
    coroutine: Rc<RefCell<Coroutine>>,
    abort: AbortHandle,
    status: TaskStatus,
    operations: u64,
    started: Option<Instant>,
    result: Option<Result<JsValue, EngineError>>,
}

impl Task {
    pub(crate) fn new(id: TaskId, kind: TaskKind, realm: RealmId, coroutine: Rc<RefCell<Coroutine>>) -> Self {
        Self {
            id,
            kind,
            realm,
            coroutine,
            abort: AbortHandle::default(),
            status: TaskStatus::Runnable,
            operations: 0,
            started: None,
            result: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Performs one operation. Returns `true` once the task is finished;
    /// further calls do nothing and keep returning `true`.
    ///
    /// While the task is blocked on an await, the call steps the realm's
    /// queued jobs instead.
    pub fn next(&mut self, realm: &mut Realm) -> bool {
        if self.result.is_some() {
            return true;
        }
        if realm.id() != self.realm {
            self.finish(realm, Err(EngineError::defect("task stepped in a foreign realm")));
            return true;
        }
        if let Some(reason) = self.abort.reason() {
            warn!(task = %self.id, %reason, operations = self.operations, "task aborted");
            self.coroutine.borrow_mut().clear();
            self.finish(realm, Err(EngineError::Aborted(reason)));
            return true;
        }
        if !realm.begin_step() {
            self.finish(realm, Err(EngineError::defect("nested step of the same realm")));
            return true;
        }
        self.started.get_or_insert_with(Instant::now);
        self.operations += 1;
        let stepped = self.coroutine.borrow_mut().step(realm);
        let outcome = match stepped {
            Ok(StepResult::Running) => {
                self.status = TaskStatus::Runnable;
                None
            }
            Ok(StepResult::Blocked) => {
                self.status = if realm.step_job() {
                    TaskStatus::Runnable
                } else {
                    TaskStatus::Blocked
                };
                None
            }
            Ok(StepResult::Finished(completion)) => Some(completion_result(realm, completion)),
            Err(defect) => Some(Err(defect)),
        };
        realm.end_step();
        let finished = match outcome {
            Some(result) => {
                self.finish(realm, result);
                true
            }
            None => false,
        };
        realm.maybe_collect();
        finished
    }

    fn finish(&mut self, realm: &Realm, result: Result<JsValue, EngineError>) {
        match &result {
            Ok(value) => debug!(task = %self.id, operations = self.operations, value = %realm.display(value), "task finished"),
            Err(EngineError::Defect(message)) => warn!(task = %self.id, %message, "task failed on an engine defect"),
            Err(error) => debug!(task = %self.id, operations = self.operations, %error, "task failed"),
        }
        self.status = TaskStatus::Done;
        self.result = Some(result);
    }

    /// Ends the task with `error` unless it already finished.
    pub(crate) fn fail(&mut self, realm: &Realm, error: EngineError) {
        if self.result.is_none() {
            self.coroutine.borrow_mut().clear();
            self.finish(realm, Err(error));
        }
    }

    pub fn done(&self) -> bool {
        self.result.is_some()
    }

    pub fn aborted(&self) -> bool {
        matches!(self.result, Some(Err(EngineError::Aborted(_))))
    }

    /// Requests cancellation; the next call to [`Task::next`] finishes the
    /// task with [`EngineError::Aborted`].
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Source position of the innermost frame still running.
    pub fn location(&self) -> Option<SourceLocation> {
        self.coroutine.borrow().location()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Operations performed so far.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// When the first operation ran.
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    pub fn result(&self) -> Option<&Result<JsValue, EngineError>> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Result<JsValue, EngineError> {
        self.result
            .unwrap_or_else(|| Err(EngineError::defect(format!("{} has not finished", self.id))))
    }
}

fn completion_result(realm: &Realm, completion: Completion) -> Result<JsValue, EngineError> {
    match completion {
        Completion::Normal(value) => Ok(value.unwrap_or_default()),
        Completion::Throw(value) => {
            let rendered = realm.display(&value);
            Err(EngineError::Throw(GuestThrow { value, rendered }))
        }
        other => Err(EngineError::defect(format!("task ended with {other:?}"))),
    }
}

/// Operation budget and deadlines of one time-sliced run.
struct SliceClock<'a> {
    config: &'a SliceConfig,
    evaluation_start: Instant,
    used: u64,
    since_check: u64,
}

impl<'a> SliceClock<'a> {
    fn new(config: &'a SliceConfig) -> Self {
        Self {
            config,
            evaluation_start: Instant::now(),
            used: 0,
            since_check: 0,
        }
    }

    /// Counts one operation. Returns whether the slice is used up and
    /// whether deadlines are due for a check.
    fn tick(&mut self) -> (bool, bool) {
        self.used += 1;
        self.since_check += 1;
        let exhausted = self.used >= self.config.ops_per_slice;
        let check = exhausted || self.since_check >= self.config.check_interval;
        if check {
            self.since_check = 0;
        }
        (exhausted, check)
    }

    fn expired(&self, task_started: Option<Instant>) -> Option<AbortReason> {
        let now = Instant::now();
        if let (Some(limit), Some(started)) = (self.config.task_timeout, task_started)
            && now.duration_since(started) >= limit
        {
            return Some(AbortReason::TaskDeadline);
        }
        match self.config.evaluation_timeout {
            Some(limit) if now.duration_since(self.evaluation_start) >= limit => Some(AbortReason::EvaluationDeadline),
            _ => None,
        }
    }

    /// Time left before the nearest deadline.
    fn remaining(&self, task_started: Option<Instant>) -> Option<Duration> {
        let now = Instant::now();
        let task = self
            .config
            .task_timeout
            .zip(task_started)
            .map(|(limit, started)| limit.saturating_sub(now.duration_since(started)));
        let evaluation = self
            .config
            .evaluation_timeout
            .map(|limit| limit.saturating_sub(now.duration_since(self.evaluation_start)));
        match (task, evaluation) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

enum Wait {
    Settled,
    TimedOut,
    Nothing,
}

impl Realm {
    /// Drives `task` to completion under the realm's runner policy and
    /// returns its result. Queued jobs run after the task finishes.
    pub async fn run(&mut self, mut task: Task) -> Result<JsValue, EngineError> {
        match self.policy.clone() {
            RunnerPolicy::RunToCompletion => self.run_to_completion(&mut task),
            RunnerPolicy::TimeSliced(config) => self.run_sliced(&mut task, &config).await,
            RunnerPolicy::Manual => self.run_sliced(&mut task, &SliceConfig::default()).await,
        }
        task.into_result()
    }

    /// Steps without ever yielding. An await nothing can settle
    /// synchronously fails the task with [`EngineError::WouldBlock`].
    pub(crate) fn run_to_completion(&mut self, task: &mut Task) {
        while !task.next(self) {
            if task.status() == TaskStatus::Blocked {
                task.fail(self, EngineError::WouldBlock);
            }
        }
        while self.step_job() {}
    }

    async fn run_sliced(&mut self, task: &mut Task, config: &SliceConfig) {
        let mut clock = SliceClock::new(config);
        while !task.next(self) {
            if task.status() == TaskStatus::Blocked {
                match self.wait_for_host(clock.remaining(task.started())).await {
                    Wait::Settled => {}
                    Wait::TimedOut => {
                        let reason = clock.expired(task.started()).unwrap_or(AbortReason::EvaluationDeadline);
                        task.abort.abort_with(reason);
                    }
                    Wait::Nothing => task.fail(self, EngineError::Stalled),
                }
                continue;
            }
            let (exhausted, check) = clock.tick();
            if check && let Some(reason) = clock.expired(task.started()) {
                task.abort.abort_with(reason);
                continue;
            }
            if exhausted {
                self.yield_slice(task, &mut clock).await;
            }
        }

        // Jobs left behind by the task share the same budget.
        loop {
            if self.step_job() {
                let (exhausted, check) = clock.tick();
                if check && clock.expired(None).is_some() {
                    warn!(task = %task.id, "evaluation deadline reached; queued jobs dropped");
                    self.clear_jobs();
                    return;
                }
                if exhausted {
                    self.yield_slice(task, &mut clock).await;
                }
                continue;
            }
            match self.wait_for_host(clock.remaining(None)).await {
                Wait::Settled => {}
                Wait::TimedOut => {
                    warn!(task = %task.id, "evaluation deadline reached while waiting on the host");
                    self.clear_jobs();
                    return;
                }
                Wait::Nothing => return,
            }
        }
    }

    async fn yield_slice(&mut self, task: &Task, clock: &mut SliceClock<'_>) {
        self.slices += 1;
        debug!(task = %task.id, operations = task.operations, slice = self.slices, "slice exhausted");
        clock.used = 0;
        tokio::task::yield_now().await;
    }

    /// Waits until the host settles a deferred, or `limit` passes.
    async fn wait_for_host(&mut self, limit: Option<Duration>) -> Wait {
        if !self.has_outstanding_deferreds() {
            return Wait::Nothing;
        }
        let signal = self.deferred_signal();
        match limit {
            Some(limit) => match tokio::time::timeout(limit, signal.notified()).await {
                Ok(()) => Wait::Settled,
                Err(_) => Wait::TimedOut,
            },
            None => {
                signal.notified().await;
                Wait::Settled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::RealmConfig;

    #[test]
    fn abort_handle_keeps_first_reason() {
        let handle = AbortHandle::default();
        assert!(!handle.is_aborted());
        handle.abort_with(AbortReason::TaskDeadline);
        handle.abort();
        assert_eq!(handle.reason(), Some(AbortReason::TaskDeadline));
    }

    #[test]
    fn slice_clock_reports_exhaustion_and_checks() {
        let config = SliceConfig {
            ops_per_slice: 4,
            check_interval: 2,
            ..SliceConfig::default()
        };
        let mut clock = SliceClock::new(&config);
        assert_eq!(clock.tick(), (false, false));
        assert_eq!(clock.tick(), (false, true));
        assert_eq!(clock.tick(), (false, false));
        assert_eq!(clock.tick(), (true, true));
        assert!(clock.expired(Some(Instant::now())).is_none());
        assert!(clock.remaining(None).is_none());
    }

    #[test]
    fn jumps_escaping_a_task_are_defects() {
        let realm = Realm::new(RealmConfig::default());
        let escaped = Completion::Break(Some(Rc::from("nowhere")), None);
        assert!(matches!(completion_result(&realm, escaped), Err(EngineError::Defect(_))));
        let escaped = Completion::Continue(None, Some(JsValue::Null));
        assert!(matches!(completion_result(&realm, escaped), Err(EngineError::Defect(_))));
        let returned = Completion::Return(JsValue::Null);
        assert!(matches!(completion_result(&realm, returned), Err(EngineError::Defect(_))));
    }

    #[test]
    fn task_in_foreign_realm_is_a_defect() {
        let mut home = Realm::new(RealmConfig::default());
        let mut other = Realm::new(RealmConfig::default());
        let mut task = home.program_task("1").unwrap();
        assert!(task.next(&mut other));
        assert!(matches!(task.result(), Some(Err(EngineError::Defect(_)))));
    }
}
