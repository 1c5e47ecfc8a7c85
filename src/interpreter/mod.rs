//! The evaluation engine.
//!
//! Every syntactic form is a resumable frame ([`frame`]); a [`driver`]
//! steps an explicit stack of them so that evaluation can stop between any
//! two child evaluations. [`suspend`] cuts that stack at `await` and
//! `yield`, and [`task`] hands the steps out to the host one at a time.

mod builtins;
mod call;
mod command;
mod completion;
mod context;
mod driver;
mod environment;
mod eval;
mod exec;
mod frame;
mod gc;
mod heap;
mod instantiate;
mod iteration;
mod module;
mod object;
mod operations;
mod pattern;
mod realm;
mod reference;
mod suspend;
mod task;

pub use object::PropertyDescriptor;
pub use realm::{DeferredHandle, Realm, RealmId};
pub use task::{AbortHandle, Task, TaskId, TaskKind, TaskStatus};
