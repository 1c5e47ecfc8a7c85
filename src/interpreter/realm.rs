//! The realm: object heap, global scope, job queues and the host entry
//! points.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use super::builtins::Intrinsics;
use super::builtins::timers::TimerQueue;
use super::command::{Resumption, Syntax};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::driver::{Coroutine, StepResult, WakeId};
use super::environment::{EnvRef, EnvironmentRecord, GlobalRecord, LexicalEnvironment};
use super::exec::ScriptFrame;
use super::frame::{Frame, FrameKind};
use super::heap::Heap;
use super::module::{ModuleGraphFrame, ModuleRegistry};
use super::object::{ObjectData, ObjectKind};
use super::task::{Task, TaskId, TaskKind};
use crate::config::{ConsoleSink, ModuleResolver, RealmConfig, RunnerPolicy};
use crate::error::EngineError;
use crate::parser::Parser;
use crate::types::{FIRST_USER_SYMBOL, HostValue, JsObject, JsValue};

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

/// Seed of `Math.random`. Every realm starts from the same state.
const RANDOM_SEED: u64 = 0x2545_f491_4f6c_dd1d;

/// Identifies a realm. Evaluation contexts carry it so a node can never be
/// evaluated against another realm's environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealmId(pub(crate) u64);

type DeferredSlot = Arc<Mutex<Option<Result<HostValue, HostValue>>>>;

/// Host side of a promise created by [`Realm::create_deferred`]. It can be
/// sent to another thread; the realm picks the outcome up the next time it
/// looks for runnable work.
#[derive(Debug, Clone)]
pub struct DeferredHandle {
    slot: DeferredSlot,
    signal: Arc<Notify>,
}

impl DeferredHandle {
    pub fn resolve(&self, value: impl Into<HostValue>) {
        self.settle(Ok(value.into()));
    }

    pub fn reject(&self, reason: impl Into<HostValue>) {
        self.settle(Err(reason.into()));
    }

    /// Only the first settlement counts.
    fn settle(&self, outcome: Result<HostValue, HostValue>) {
        if let Ok(mut slot) = self.slot.lock()
            && slot.is_none()
        {
            *slot = Some(outcome);
            self.signal.notify_one();
        }
    }
}

pub struct Realm {
    id: RealmId,
    pub(crate) heap: Heap,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) global: JsObject,
    pub(crate) global_env: EnvRef,
    pub(crate) modules: ModuleRegistry,

    pub(crate) microtasks: VecDeque<Coroutine>,
    pub(crate) macrotasks: VecDeque<Coroutine>,
    /// The job being stepped; it runs to completion before the next dequeue.
    pub(crate) current_job: Option<Coroutine>,
    /// Coroutines of the tasks handed out to the host.
    pub(crate) tasks: Vec<Weak<RefCell<Coroutine>>>,
    pub(crate) timers: TimerQueue,
    pub(crate) wakes: FxHashMap<WakeId, Resumption>,
    pub(crate) next_wake: u64,
    pub(crate) deferreds: Vec<(JsObject, DeferredSlot)>,
    deferred_signal: Arc<Notify>,

    pub(crate) next_symbol: u64,
    pub(crate) random_state: u64,
    pub(crate) console: Rc<dyn ConsoleSink>,
    pub(crate) resolver: Option<Rc<dyn ModuleResolver>>,
    pub(crate) policy: RunnerPolicy,
    pub(crate) max_call_depth: usize,
    strict: bool,
    stepping: bool,
    next_task: u64,
    pub(crate) slices: u64,
}

impl Realm {
    pub fn new(config: RealmConfig) -> Self {
        let id = RealmId(NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed));
        let mut heap = Heap::new(id.0, config.gc_threshold);
        let intrinsics = Intrinsics::allocate(&mut heap);
        let global = heap.alloc(ObjectData::new(ObjectKind::Ordinary, Some(intrinsics.object_prototype)));
        let global_env = LexicalEnvironment::new(EnvironmentRecord::Global(GlobalRecord::new(global)), None);

        let mut realm = Self {
            id,
            heap,
            intrinsics,
            global,
            global_env,
            modules: ModuleRegistry::default(),
            microtasks: VecDeque::new(),
            macrotasks: VecDeque::new(),
            current_job: None,
            tasks: Vec::new(),
            timers: TimerQueue::default(),
            wakes: FxHashMap::default(),
            next_wake: 0,
            deferreds: Vec::new(),
            deferred_signal: Arc::new(Notify::new()),
            next_symbol: FIRST_USER_SYMBOL,
            random_state: RANDOM_SEED,
            console: config.console,
            resolver: config.resolver,
            policy: config.policy,
            max_call_depth: config.max_call_depth,
            strict: config.strict,
            stepping: false,
            next_task: 0,
            slices: 0,
        };
        realm.setup_globals();
        for definition in config.globals {
            let value = realm.to_js(&definition.value);
            realm.define_host_global(&definition.name, value, definition.mutable);
        }
        debug!(realm = realm.id.0, objects = realm.heap.len(), "realm created");
        realm
    }

    pub fn id(&self) -> RealmId {
        self.id
    }

    pub fn global_object(&self) -> JsObject {
        self.global
    }

    pub fn policy(&self) -> &RunnerPolicy {
        &self.policy
    }

    /// Number of times a time-sliced runner yielded to the host.
    pub fn slices(&self) -> u64 {
        self.slices
    }

    /// A global lexical binding supplied by the host.
    fn define_host_global(&mut self, name: &str, value: JsValue, mutable: bool) {
        let env = self.global_env.clone();
        let name: Rc<str> = Rc::from(name);
        let created = if mutable {
            env.create_mutable_binding(self, &name, false)
        } else {
            env.create_immutable_binding(&name, true)
        };
        if let Err(e) = created.and_then(|()| env.initialize_binding(self, &name, value)) {
            warn!(global = %name, error = %e, "host global not defined");
        }
    }

    /// Current value of a global binding, lexical or property.
    pub fn get_global(&self, name: &str) -> Option<JsValue> {
        self.global_env.get_binding_value(self, &Rc::from(name), false).ok()
    }

    /// Sets a property of the global object, for example to hand a deferred
    /// promise to guest code. Objects must belong to this realm and still be
    /// alive.
    pub fn set_global(&mut self, name: &str, value: JsValue) -> Result<(), EngineError> {
        if let JsValue::Object(o) = value
            && !self.owns(o)
        {
            return Err(EngineError::defect(format!(
                "global '{name}' set to an object this realm does not own"
            )));
        }
        self.define_global(name, value);
        Ok(())
    }

    /// Converts a host value into a value of this realm.
    pub fn to_js(&mut self, value: &HostValue) -> JsValue {
        match value {
            HostValue::Undefined => JsValue::Undefined,
            HostValue::Null => JsValue::Null,
            HostValue::Boolean(b) => JsValue::Boolean(*b),
            HostValue::Number(n) => JsValue::Number(*n),
            HostValue::String(s) => JsValue::string(s),
            HostValue::List(items) => {
                let values = items.iter().map(|item| self.to_js(item)).collect();
                JsValue::Object(self.create_array(values))
            }
        }
    }

    /// A pending promise the host settles through the returned handle.
    pub fn create_deferred(&mut self) -> (JsValue, DeferredHandle) {
        let promise = self.create_promise();
        let slot: DeferredSlot = Arc::default();
        self.deferreds.push((promise, slot.clone()));
        let handle = DeferredHandle {
            slot,
            signal: self.deferred_signal.clone(),
        };
        (JsValue::Object(promise), handle)
    }

    pub(crate) fn has_outstanding_deferreds(&self) -> bool {
        !self.deferreds.is_empty()
    }

    pub(crate) fn deferred_signal(&self) -> Arc<Notify> {
        self.deferred_signal.clone()
    }

    /// Settles the promises of every deferred the host has settled.
    fn poll_deferreds(&mut self) {
        let mut settled = Vec::new();
        self.deferreds.retain(|(promise, slot)| {
            match slot.lock().ok().and_then(|mut outcome| outcome.take()) {
                Some(outcome) => {
                    settled.push((*promise, outcome));
                    false
                }
                None => true,
            }
        });
        for (promise, outcome) in settled {
            trace!(promise = promise.id, "host deferred settled");
            match outcome {
                Ok(value) => {
                    let value = self.to_js(&value);
                    self.resolve_promise(promise, value);
                }
                Err(reason) => {
                    let reason = self.to_js(&reason);
                    self.reject_promise(promise, reason);
                }
            }
        }
    }

    pub(crate) fn enqueue_microtask(&mut self, job: Coroutine) {
        self.microtasks.push_back(job);
    }

    pub(crate) fn enqueue_macrotask(&mut self, job: Coroutine) {
        self.macrotasks.push_back(job);
    }

    /// Whether any job or timer is still waiting to run.
    pub fn has_pending_jobs(&self) -> bool {
        self.current_job.is_some()
            || !self.microtasks.is_empty()
            || !self.macrotasks.is_empty()
            || !self.timers.is_empty()
    }

    /// Drops every queued job and timer.
    pub(crate) fn clear_jobs(&mut self) {
        self.current_job = None;
        self.microtasks.clear();
        self.macrotasks.clear();
        self.timers = TimerQueue::default();
    }

    /// Performs one operation of queued work. Microtasks drain before the
    /// next macrotask; a due timer becomes a macrotask only when both queues
    /// are empty. Returns `false` when there was nothing to run.
    pub(crate) fn step_job(&mut self) -> bool {
        self.poll_deferreds();
        let mut job = match self.current_job.take() {
            Some(job) => job,
            None => {
                if self.microtasks.is_empty()
                    && self.macrotasks.is_empty()
                    && let Some(timer) = self.fire_next_timer()
                {
                    self.enqueue_macrotask(timer);
                }
                if let Some(job) = self.microtasks.pop_front() {
                    trace!(queued = self.microtasks.len(), "microtask dequeued");
                    job
                } else if let Some(job) = self.macrotasks.pop_front() {
                    trace!(queued = self.macrotasks.len(), "macrotask dequeued");
                    job
                } else {
                    return false;
                }
            }
        };
        match job.step(self) {
            Ok(StepResult::Running) => self.current_job = Some(job),
            Ok(StepResult::Finished(Completion::Throw(error))) => {
                let rendered = self.display(&error);
                warn!(error = %rendered, "uncaught exception in queued job");
            }
            Ok(StepResult::Finished(_)) => {}
            Ok(StepResult::Blocked) => warn!("queued job blocked on a top-level await"),
            Err(defect) => warn!(error = %defect, "engine defect in queued job"),
        }
        self.maybe_collect();
        true
    }

    /// Marks the realm as stepping. `false` when a step is already running.
    pub(crate) fn begin_step(&mut self) -> bool {
        !std::mem::replace(&mut self.stepping, true)
    }

    pub(crate) fn stepping(&self) -> bool {
        self.stepping
    }

    pub(crate) fn end_step(&mut self) {
        self.stepping = false;
    }

    fn new_task(&mut self, kind: TaskKind, root: Frame) -> Task {
        self.next_task += 1;
        let id = TaskId(self.next_task);
        debug!(task = %id, ?kind, "task created");
        let coroutine = Rc::new(RefCell::new(Coroutine::new(root)));
        self.tasks.retain(|task| task.strong_count() > 0);
        self.tasks.push(Rc::downgrade(&coroutine));
        Task::new(id, kind, self.id, coroutine)
    }

    /// A task that runs `source` as a script.
    pub fn program_task(&mut self, source: &str) -> Result<Task, EngineError> {
        let program = Rc::new(Parser::parse_script(source, self.strict)?);
        let context = EvaluationContext::new(self.id, self.global_env.clone(), program.strict);
        let root = Frame::internal(FrameKind::Script(ScriptFrame::new(program, context)));
        Ok(self.new_task(TaskKind::Program, root))
    }

    /// A task that evaluates a single expression in the global scope.
    pub fn expression_task(&mut self, source: &str) -> Result<Task, EngineError> {
        let expression = Parser::parse_expression_source(source, self.strict)?;
        let context = EvaluationContext::new(self.id, self.global_env.clone(), self.strict);
        let root = Frame::for_node(&Syntax::Expression(expression), &context);
        Ok(self.new_task(TaskKind::Expression, root))
    }

    /// A task that loads, links and evaluates the module graph rooted at
    /// `specifier`. Its result is the root module's namespace object.
    pub fn module_task(&mut self, specifier: &str) -> Result<Task, EngineError> {
        let root = self.load_module(specifier, None)?;
        let frame = Frame::internal(FrameKind::ModuleGraph(ModuleGraphFrame::new(root)));
        Ok(self.new_task(TaskKind::Module, frame))
    }

    /// Runs a script to completion, then every job it queued.
    pub fn evaluate_program(&mut self, source: &str) -> Result<JsValue, EngineError> {
        let mut task = self.program_task(source)?;
        self.run_to_completion(&mut task);
        task.into_result()
    }

    pub fn evaluate_expression(&mut self, source: &str) -> Result<JsValue, EngineError> {
        let mut task = self.expression_task(source)?;
        self.run_to_completion(&mut task);
        task.into_result()
    }

    pub fn evaluate_module(&mut self, specifier: &str) -> Result<JsValue, EngineError> {
        let mut task = self.module_task(specifier)?;
        self.run_to_completion(&mut task);
        task.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realms_get_distinct_ids() {
        let a = Realm::new(RealmConfig::default());
        let b = Realm::new(RealmConfig::default());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn host_globals_respect_mutability() {
        let mut realm = Realm::new(
            RealmConfig::builder()
                .global("limit", 3.0, false)
                .global("names", HostValue::List(vec!["a".into(), "b".into()]), true)
                .build(),
        );
        assert!(matches!(realm.get_global("limit"), Some(JsValue::Number(n)) if n == 3.0));
        let err = realm.evaluate_program("limit = 4").unwrap_err();
        assert!(err.thrown().is_some());
        let joined = realm.evaluate_expression("names.join('+')").unwrap();
        assert_eq!(joined.as_str(), Some("a+b"));
    }

    #[test]
    fn objects_of_another_realm_are_rejected() {
        let mut home = Realm::new(RealmConfig::default());
        let mut other = Realm::new(RealmConfig::default());
        let foreign = home.evaluate_expression("({ a: 1 })").unwrap();
        let err = other.set_global("leaked", foreign.clone()).unwrap_err();
        assert!(matches!(err, EngineError::Defect(_)), "{err}");
        assert!(other.get_global("leaked").is_none());
        assert_eq!(other.display(&foreign), "[unavailable object]");
        assert_eq!(home.display(&foreign), "{ a: 1 }");

        other.set_global("plain", JsValue::Number(2.0)).unwrap();
        assert_eq!(other.evaluate_expression("plain * 2").unwrap().as_number(), Some(4.0));
    }

    #[test]
    fn deferred_settles_on_next_poll() {
        let mut realm = Realm::new(RealmConfig::default());
        let (promise, handle) = realm.create_deferred();
        assert!(realm.has_outstanding_deferreds());
        handle.resolve("done");
        handle.reject("ignored");
        assert!(!realm.step_job());
        let state = realm.promise_state(promise.as_object().unwrap());
        assert!(matches!(state, Some(Ok(JsValue::String(ref s))) if &**s == "done"));
        assert!(!realm.has_outstanding_deferreds());
    }
}
