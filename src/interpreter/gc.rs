//! Mark-and-sweep collection of the object heap.
//!
//! Collection runs only between steps, when no frame is half-resumed and
//! every value the engine still needs sits in a root: the intrinsics and
//! global scope, the module registry, queued jobs and timers, pending wakes
//! and host deferreds, and the coroutines of tasks the host still holds.
//! Marking walks objects through an explicit worklist; environments are
//! visited once each.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;

use super::Realm;
use super::environment::LexicalEnvironment;
use super::heap::Heap;
use crate::types::{JsObject, JsValue};

/// Implements [`Trace`] for each type by tracing the listed fields.
macro_rules! trace_fields {
    ($($ty:ty => $($field:ident),+;)+) => {
        $(
            impl $crate::interpreter::gc::Trace for $ty {
                fn trace(&self, tracer: &mut $crate::interpreter::gc::Tracer<'_>) {
                    $($crate::interpreter::gc::Trace::trace(&self.$field, tracer);)+
                }
            }
        )+
    };
}
pub(crate) use trace_fields;

/// Anything that can hold object handles or environments.
pub(crate) trait Trace {
    fn trace(&self, tracer: &mut Tracer<'_>);
}

pub(crate) struct Tracer<'h> {
    heap: &'h Heap,
    marks: Vec<bool>,
    worklist: Vec<usize>,
    envs: FxHashSet<*const LexicalEnvironment>,
}

impl<'h> Tracer<'h> {
    fn new(heap: &'h Heap) -> Self {
        Self {
            heap,
            marks: vec![false; heap.capacity()],
            worklist: Vec::new(),
            envs: FxHashSet::default(),
        }
    }

    pub(crate) fn object(&mut self, o: JsObject) {
        if let Some(index) = self.heap.index(o)
            && !self.marks[index]
        {
            self.marks[index] = true;
            self.worklist.push(index);
        }
    }

    /// Whether `env` is seen for the first time.
    pub(crate) fn first_visit(&mut self, env: &LexicalEnvironment) -> bool {
        self.envs.insert(env as *const LexicalEnvironment)
    }

    fn drain(&mut self) {
        let heap = self.heap;
        while let Some(index) = self.worklist.pop() {
            if let Some(data) = heap.slot(index) {
                data.trace(self);
            }
        }
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.object(*self);
    }
}

impl Trace for JsValue {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let JsValue::Object(o) = self {
            tracer.object(*o);
        }
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Trace + ?Sized> Trace for Rc<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        (**self).trace(tracer);
    }
}

impl<T: Trace + ?Sized> Trace for Box<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        (**self).trace(tracer);
    }
}

/// A cell borrowed mutably right now belongs to a running step, and the
/// collector never runs during one.
impl<T: Trace> Trace for RefCell<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Ok(inner) = self.try_borrow() {
            inner.trace(tracer);
        }
    }
}

impl<A: Trace, B: Trace> Trace for (A, B) {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.0.trace(tracer);
        self.1.trace(tracer);
    }
}

impl Realm {
    /// Objects currently alive in the heap.
    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    /// Collections run so far.
    pub fn collections(&self) -> u64 {
        self.heap.collections()
    }

    /// Collects once enough has been allocated since the last collection.
    /// Never runs inside a step.
    pub(crate) fn maybe_collect(&mut self) {
        if !self.stepping() && self.heap.due() {
            self.collect_garbage();
        }
    }

    /// Frees every object unreachable from the realm's roots. Values the
    /// host holds outside of them stop resolving. Returns how many objects
    /// were freed; skipped (returning 0) while a step is running.
    pub fn collect_garbage(&mut self) -> usize {
        if self.stepping() {
            return 0;
        }
        self.tasks.retain(|task| task.strong_count() > 0);
        let tasks: Vec<_> = self.tasks.iter().filter_map(|task| task.upgrade()).collect();
        if tasks.iter().any(|task| task.try_borrow().is_err()) {
            debug!("collection skipped: a task is being stepped");
            return 0;
        }

        let mut tracer = Tracer::new(&self.heap);
        self.intrinsics.trace(&mut tracer);
        tracer.object(self.global);
        self.global_env.trace(&mut tracer);
        self.modules.trace(&mut tracer);
        self.microtasks.iter().for_each(|job| job.trace(&mut tracer));
        self.macrotasks.iter().for_each(|job| job.trace(&mut tracer));
        self.current_job.trace(&mut tracer);
        self.timers.trace(&mut tracer);
        self.wakes.values().for_each(|input| input.trace(&mut tracer));
        self.deferreds.iter().for_each(|(promise, _)| tracer.object(*promise));
        tasks.trace(&mut tracer);
        tracer.drain();
        let marks = tracer.marks;

        let before = self.heap.len();
        let freed = self.heap.sweep(&marks);
        debug!(
            realm = self.id().0,
            before,
            freed,
            live = self.heap.len(),
            collection = self.heap.collections(),
            "garbage collected"
        );
        freed
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;

    const CHURN: &str = "for (let i = 0; i < 20000; i++) { let o = { v: i }; let f = () => o; }";

    fn small_heap() -> Realm {
        Realm::new(RealmConfig::builder().gc_threshold(512).build())
    }

    #[test]
    fn garbage_does_not_accumulate_across_evaluations() {
        let mut realm = small_heap();
        let baseline = realm.live_objects();
        realm.evaluate_program(CHURN).unwrap();
        let first = realm.live_objects();
        realm.evaluate_program(CHURN).unwrap();
        let second = realm.live_objects();
        assert!(realm.collections() > 0);
        assert!(first < baseline + 2048, "{baseline} -> {first}");
        assert!(second < first + 1024, "{first} -> {second}");
        realm.collect_garbage();
        assert!(realm.live_objects() < baseline + 64, "{baseline} -> {}", realm.live_objects());
    }

    #[test]
    fn reachable_values_survive_collection() {
        let mut realm = small_heap();
        realm
            .evaluate_program(
                "var kept = { list: [1, { deep: 'yes' }] };
                 const counter = (() => { let n = 0; return () => ++n; })();
                 function* gen() { const local = { g: 1 }; yield local.g; yield local.g + 1; }
                 var it = gen(); it.next();
                 var later;
                 async function wait() { const held = { w: 5 }; await null; later = held.w; }
                 wait();
                 for (let i = 0; i < 3000; i++) { [i]; }",
            )
            .unwrap();
        realm.evaluate_program(CHURN).unwrap();
        realm.collect_garbage();
        assert_eq!(realm.evaluate_expression("kept.list[1].deep").unwrap().as_str(), Some("yes"));
        assert_eq!(realm.evaluate_expression("counter() + counter()").unwrap().as_number(), Some(3.0));
        assert_eq!(realm.evaluate_expression("it.next().value").unwrap().as_number(), Some(2.0));
        assert_eq!(realm.evaluate_expression("later").unwrap().as_number(), Some(5.0));
    }

    #[test]
    fn suspended_task_frames_are_roots() {
        let mut realm = small_heap();
        let mut task = realm
            .program_task(
                "(function () {
                     const mine = { tag: 'alive' };
                     for (let i = 0; i < 3000; i++) { [i]; }
                     return mine.tag;
                 })()",
            )
            .unwrap();
        while !task.next(&mut realm) {}
        assert!(realm.collections() > 0);
        let value = task.into_result().unwrap();
        assert_eq!(value.as_str(), Some("alive"));
    }

    #[test]
    fn freed_handles_render_as_unavailable() {
        let mut realm = small_heap();
        let dropped = realm.evaluate_expression("({ a: 1 })").unwrap();
        assert_eq!(realm.display(&dropped), "{ a: 1 }");
        realm.collect_garbage();
        assert_eq!(realm.display(&dropped), "[unavailable object]");
        assert!(realm.set_global("again", dropped).is_err());
    }
}
