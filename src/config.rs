//! Realm configuration: initial globals, module loading, console output
//! and the runner policy.

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::types::HostValue;

/// Default number of operations a time-sliced runner performs before
/// yielding to the host scheduler.
pub const DEFAULT_OPS_PER_SLICE: u64 = 10_000;

/// Default number of operations between two wall-clock deadline checks.
pub const DEFAULT_CHECK_INTERVAL: u64 = 1_024;

/// Default limit on nested guest function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Default number of allocations between two garbage collections.
pub const DEFAULT_GC_THRESHOLD: usize = 4_096;

/// Supplies module source text.
pub trait ModuleResolver {
    /// Source text of `specifier` as imported from `referrer` (`None` for the
    /// entry module).
    fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String, String>;
}

impl<F> ModuleResolver for F
where
    F: Fn(&str, Option<&str>) -> Result<String, String>,
{
    fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String, String> {
        self(specifier, referrer)
    }
}

/// Modules held in memory, keyed by specifier.
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    modules: FxHashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, specifier: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(specifier, source);
        self
    }

    pub fn insert(&mut self, specifier: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(specifier.into(), source.into());
    }
}

impl ModuleResolver for MapResolver {
    fn resolve(&self, specifier: &str, _referrer: Option<&str>) -> Result<String, String> {
        self.modules
            .get(specifier)
            .cloned()
            .ok_or_else(|| "module not found".to_string())
    }
}

/// Reads modules from disk. Specifiers are paths relative to `root`.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ModuleResolver for FileResolver {
    fn resolve(&self, specifier: &str, _referrer: Option<&str>) -> Result<String, String> {
        let path = self.root.join(specifier.trim_start_matches("./"));
        std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// `console.log`, `info` and `debug`.
    Log,
    /// `console.error` and `warn`.
    Error,
}

/// Where guest `console` output goes.
pub trait ConsoleSink {
    fn write(&self, level: ConsoleLevel, line: &str);
}

/// Writes log lines to stdout and error lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl ConsoleSink for StdConsole {
    fn write(&self, level: ConsoleLevel, line: &str) {
        match level {
            ConsoleLevel::Log => println!("{line}"),
            ConsoleLevel::Error => eprintln!("{line}"),
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct CapturedConsole {
    lines: RefCell<Vec<(ConsoleLevel, String)>>,
}

impl CapturedConsole {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Every line written so far, regardless of level.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|(_, line)| line.clone()).collect()
    }

    pub fn lines_at(&self, level: ConsoleLevel) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl ConsoleSink for CapturedConsole {
    fn write(&self, level: ConsoleLevel, line: &str) {
        self.lines.borrow_mut().push((level, line.to_string()));
    }
}

/// Limits of the time-sliced runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceConfig {
    pub ops_per_slice: u64,
    /// Wall-clock ceiling for a single task.
    pub task_timeout: Option<Duration>,
    /// Wall-clock ceiling for a whole evaluation, queued jobs included.
    pub evaluation_timeout: Option<Duration>,
    /// Operations between two deadline checks inside a slice.
    pub check_interval: u64,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            ops_per_slice: DEFAULT_OPS_PER_SLICE,
            task_timeout: None,
            evaluation_timeout: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl SliceConfig {
    pub fn with_ops_per_slice(mut self, ops: u64) -> Self {
        self.ops_per_slice = ops.max(1);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = Some(timeout);
        self
    }
}

/// How [`Realm::run`](crate::Realm::run) drives a task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunnerPolicy {
    /// Step until done without yielding to the host.
    #[default]
    RunToCompletion,
    /// Yield to the host scheduler every slice; enforce deadlines.
    TimeSliced(SliceConfig),
    /// The host calls [`Task::next`](crate::Task::next) itself. `run` still
    /// works and behaves like `TimeSliced` with default limits.
    Manual,
}

/// A global binding created when the realm starts.
#[derive(Debug, Clone)]
pub struct GlobalDefinition {
    pub name: String,
    pub value: HostValue,
    pub mutable: bool,
}

#[derive(Clone)]
pub struct RealmConfig {
    pub globals: Vec<GlobalDefinition>,
    pub strict: bool,
    pub resolver: Option<Rc<dyn ModuleResolver>>,
    pub policy: RunnerPolicy,
    pub console: Rc<dyn ConsoleSink>,
    /// Calls nested deeper than this throw a `RangeError`.
    pub max_call_depth: usize,
    /// Allocations between two collections of unreachable objects.
    pub gc_threshold: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            globals: Vec::new(),
            strict: false,
            resolver: None,
            policy: RunnerPolicy::default(),
            console: Rc::new(StdConsole),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }
}

impl fmt::Debug for RealmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmConfig")
            .field("globals", &self.globals)
            .field("strict", &self.strict)
            .field("resolver", &self.resolver.is_some())
            .field("policy", &self.policy)
            .field("max_call_depth", &self.max_call_depth)
            .field("gc_threshold", &self.gc_threshold)
            .finish_non_exhaustive()
    }
}

impl RealmConfig {
    pub fn builder() -> RealmConfigBuilder {
        RealmConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct RealmConfigBuilder {
    config: RealmConfig,
}

impl RealmConfigBuilder {
    /// A global `let`-like binding (or `const`-like when not `mutable`).
    pub fn global(mut self, name: impl Into<String>, value: impl Into<HostValue>, mutable: bool) -> Self {
        self.config.globals.push(GlobalDefinition {
            name: name.into(),
            value: value.into(),
            mutable,
        });
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.config.resolver = Some(Rc::new(resolver));
        self
    }

    pub fn policy(mut self, policy: RunnerPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn console(mut self, console: Rc<dyn ConsoleSink>) -> Self {
        self.config.console = console;
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.config.max_call_depth = depth.max(1);
        self
    }

    pub fn gc_threshold(mut self, allocations: usize) -> Self {
        self.config.gc_threshold = allocations.max(1);
        self
    }

    pub fn build(self) -> RealmConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_globals_in_order() {
        let config = RealmConfig::builder()
            .global("a", 1.0, true)
            .global("b", "two", false)
            .strict(true)
            .policy(RunnerPolicy::TimeSliced(SliceConfig::default().with_ops_per_slice(5)))
            .build();
        let names: Vec<_> = config.globals.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(!config.globals[1].mutable);
        assert!(config.strict);
        assert!(matches!(config.policy, RunnerPolicy::TimeSliced(ref s) if s.ops_per_slice == 5));
    }

    #[test]
    fn limits_default_and_clamp() {
        let config = RealmConfig::default();
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.gc_threshold, DEFAULT_GC_THRESHOLD);
        let config = RealmConfig::builder().max_call_depth(0).gc_threshold(0).build();
        assert_eq!((config.max_call_depth, config.gc_threshold), (1, 1));
    }

    #[test]
    fn slice_defaults() {
        let slice = SliceConfig::default();
        assert_eq!(slice.ops_per_slice, 10_000);
        assert_eq!(slice.check_interval, 1_024);
        assert_eq!(SliceConfig::default().with_ops_per_slice(0).ops_per_slice, 1);
    }

    #[test]
    fn map_resolver_reports_missing_modules() {
        let resolver = MapResolver::new().with("a", "export let x = 1;");
        assert!(resolver.resolve("a", None).is_ok());
        assert_eq!(resolver.resolve("b", Some("a")).unwrap_err(), "module not found");
    }

    #[test]
    fn captured_console_splits_levels() {
        let console = CapturedConsole::new();
        console.write(ConsoleLevel::Log, "hi");
        console.write(ConsoleLevel::Error, "oops");
        assert_eq!(console.lines(), ["hi", "oops"]);
        assert_eq!(console.lines_at(ConsoleLevel::Error), ["oops"]);
    }
}
