//! Timers on a virtual clock.
//!
//! The clock only moves when the realm runs out of other jobs: the next due
//! timer then fires and the clock jumps to its due time. Delays never wait
//! on the wall clock, so scripts with timers stay deterministic.

use std::collections::BTreeMap;

use tracing::trace;

use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, InvokeFrame, NativeCall};
use crate::interpreter::driver::Coroutine;
use crate::interpreter::frame::{Frame, FrameKind};
use crate::interpreter::gc::{Trace, Tracer, trace_fields};
use crate::types::JsValue;

#[derive(Debug)]
pub struct Timer {
    id: u64,
    callback: JsValue,
    args: Vec<JsValue>,
    /// Re-arm period for `setInterval`.
    interval: Option<u64>,
}

/// Pending timers ordered by due time, then by creation order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: u64,
    next_id: u64,
    next_seq: u64,
    pending: BTreeMap<(u64, u64), Timer>,
}

impl TimerQueue {
    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn schedule(&mut self, delay: u64, timer: Timer) {
        self.next_seq += 1;
        self.pending.insert((self.now + delay, self.next_seq), timer);
    }

    fn cancel(&mut self, id: u64) -> bool {
        let key = self.pending.iter().find(|(_, t)| t.id == id).map(|(key, _)| *key);
        key.and_then(|key| self.pending.remove(&key)).is_some()
    }

    /// Removes the earliest timer and advances the clock to its due time.
    fn pop_due(&mut self) -> Option<Timer> {
        let ((due, _), timer) = self.pending.pop_first()?;
        self.now = self.now.max(due);
        Some(timer)
    }
}

impl Realm {
    pub(crate) fn setup_timers(&mut self) {
        let global = self.global_object();
        self.install_method(global, "setTimeout", 2, set_timeout);
        self.install_method(global, "setInterval", 2, set_interval);
        self.install_method(global, "clearTimeout", 1, clear_timer);
        self.install_method(global, "clearInterval", 1, clear_timer);
        self.install_method(global, "queueMicrotask", 1, queue_microtask);
    }

    /// Fires the next timer: returns its callback job, re-arming intervals.
    pub(crate) fn fire_next_timer(&mut self) -> Option<Coroutine> {
        let timer = self.timers.pop_due()?;
        trace!(timer = timer.id, now = self.timers.now(), "timer fired");
        let job = Coroutine::new(Frame::internal(FrameKind::Invoke(InvokeFrame::new(
            timer.callback.clone(),
            JsValue::Undefined,
            timer.args.clone(),
        ))));
        if let Some(period) = timer.interval {
            self.timers.schedule(period, timer);
        }
        Some(job)
    }

    fn add_timer(&mut self, call: &NativeCall, repeat: bool) -> Result<CallOutcome, JsValue> {
        let callback = call.arg(0);
        if !self.is_callable(&callback) {
            let message = format!("The \"callback\" argument must be of type function. Received {}", self.describe(&callback));
            return Err(self.type_error(message));
        }
        let delay = match call.arg(1) {
            JsValue::Undefined => 0.0,
            v => self.to_number(&v)?,
        };
        // Non-finite or sub-millisecond delays behave like 1ms.
        let delay = if delay.is_finite() && delay >= 1.0 { delay as u64 } else { 1 };
        self.timers.next_id += 1;
        let id = self.timers.next_id;
        let timer = Timer {
            id,
            callback,
            args: call.args.get(2..).map(<[JsValue]>::to_vec).unwrap_or_default(),
            interval: repeat.then_some(delay),
        };
        self.timers.schedule(delay, timer);
        trace!(timer = id, delay, "timer scheduled");
        Ok(CallOutcome::value(JsValue::Number(id as f64)))
    }
}

fn set_timeout(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    realm.add_timer(call, false)
}

fn set_interval(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    realm.add_timer(call, true)
}

fn clear_timer(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    if let JsValue::Number(id) = call.arg(0)
        && id.is_finite()
        && id >= 0.0
    {
        realm.timers.cancel(id as u64);
    }
    Ok(CallOutcome::undefined())
}

fn queue_microtask(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let callback = call.arg(0);
    if !realm.is_callable(&callback) {
        return Err(realm.type_error("queueMicrotask requires a function"));
    }
    let frame = InvokeFrame::new(callback, JsValue::Undefined, Vec::new());
    realm.enqueue_microtask(Coroutine::new(Frame::internal(FrameKind::Invoke(frame))));
    Ok(CallOutcome::undefined())
}

trace_fields! {
    Timer => callback, args;
}

impl Trace for TimerQueue {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.pending.values().for_each(|timer| timer.trace(tracer));
    }
}

#[cfg(test)]
mod tests {
    use super::{Timer, TimerQueue};
    use crate::types::JsValue;

    fn timer(id: u64) -> Timer {
        Timer {
            id,
            callback: JsValue::Undefined,
            args: Vec::new(),
            interval: None,
        }
    }

    #[test]
    fn timers_fire_by_due_time_then_creation_order() {
        let mut queue = TimerQueue::default();
        queue.schedule(20, timer(1));
        queue.schedule(5, timer(2));
        queue.schedule(5, timer(3));
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop_due().map(|t| t.id)).collect();
        assert_eq!(order, [2, 3, 1]);
        assert_eq!(queue.now(), 20);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut queue = TimerQueue::default();
        queue.schedule(1, timer(1));
        assert!(queue.cancel(1));
        assert!(!queue.cancel(1));
        assert!(queue.is_empty());
    }
}
