//! `jsstep`: an ECMAScript evaluator whose every evaluation can be stepped,
//! suspended and aborted.
//!
//! ```no_run
//! use jsstep::{Realm, RealmConfig};
//!
//! let mut realm = Realm::new(RealmConfig::default());
//! let value = realm.evaluate_program("let s = 0; for (let i = 0; i < 10; i++) s += i; s").unwrap();
//! assert_eq!(value.as_number(), Some(45.0));
//! ```

pub mod ast;
pub mod config;
pub mod error;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod types;

pub use config::{
    CapturedConsole, ConsoleLevel, ConsoleSink, FileResolver, MapResolver, ModuleResolver, RealmConfig,
    RealmConfigBuilder, RunnerPolicy, SliceConfig, StdConsole,
};
pub use error::{AbortReason, BindingError, EngineError, GuestThrow};
pub use interpreter::{AbortHandle, DeferredHandle, Realm, RealmId, Task, TaskId, TaskKind, TaskStatus};
pub use types::{HostValue, JsValue};

#[cfg(test)]
mod tests;
