use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use jsstep::{EngineError, FileResolver, Realm, RealmConfig, RunnerPolicy, SliceConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsstep", version, about = "A steppable JavaScript evaluator")]
struct Cli {
    /// JavaScript file to execute
    file: Option<PathBuf>,

    /// Evaluate inline JavaScript
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Treat FILE as an ES module (imports resolve relative to its directory)
    #[arg(long)]
    module: bool,

    /// Evaluate scripts as strict mode code
    #[arg(long)]
    strict: bool,

    /// Run time-sliced, yielding every N operations
    #[arg(long, value_name = "N")]
    slice: Option<u64>,

    /// Abort the main task after this many milliseconds
    #[arg(long, value_name = "MS")]
    task_timeout_ms: Option<u64>,

    /// Abort the whole evaluation after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Throw a RangeError when calls nest deeper than N
    #[arg(long, value_name = "N")]
    max_call_depth: Option<usize>,
}

impl Cli {
    fn policy(&self) -> RunnerPolicy {
        if self.slice.is_none() && self.task_timeout_ms.is_none() && self.timeout_ms.is_none() {
            return RunnerPolicy::RunToCompletion;
        }
        let mut slice = SliceConfig::default();
        if let Some(ops) = self.slice {
            slice = slice.with_ops_per_slice(ops);
        }
        if let Some(ms) = self.task_timeout_ms {
            slice = slice.with_task_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            slice = slice.with_evaluation_timeout(Duration::from_millis(ms));
        }
        RunnerPolicy::TimeSliced(slice)
    }

    fn realm(&self, module_root: Option<&Path>) -> Realm {
        let mut builder = RealmConfig::builder().strict(self.strict).policy(self.policy());
        if let Some(depth) = self.max_call_depth {
            builder = builder.max_call_depth(depth);
        }
        if let Some(root) = module_root {
            builder = builder.resolver(FileResolver::new(root));
        }
        Realm::new(builder.build())
    }
}

fn report(realm: &Realm, result: Result<jsstep::JsValue, EngineError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(EngineError::Throw(thrown)) => {
            eprintln!("Uncaught {}", realm.display(&thrown.value));
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

async fn execute_code(cli: &Cli, code: &str) -> ExitCode {
    let mut realm = cli.realm(None);
    let result = match realm.program_task(code) {
        Ok(task) => realm.run(task).await,
        Err(e) => Err(e),
    };
    report(&realm, result)
}

async fn run_file(cli: &Cli, path: &Path) -> ExitCode {
    if cli.module {
        let root = path.parent().unwrap_or(Path::new("."));
        let mut realm = cli.realm(Some(root));
        let specifier = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let result = match realm.module_task(&specifier) {
            Ok(task) => realm.run(task).await,
            Err(e) => Err(e),
        };
        return report(&realm, result);
    }
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            return ExitCode::from(1);
        }
    };
    execute_code(cli, &source).await
}

async fn run_repl(cli: &Cli) -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut realm = cli.realm(None);

    println!("jsstep v{}", env!("CARGO_PKG_VERSION"));
    println!("Type JavaScript statements. Press Ctrl-D to exit.");

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let result = match realm.program_task(trimmed) {
                    Ok(task) => realm.run(task).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(value) => println!("{}", realm.display(&value)),
                    Err(EngineError::Throw(thrown)) => eprintln!("Uncaught {}", realm.display(&thrown.value)),
                    Err(e) => eprintln!("{e}"),
                }
            }
            Err(e) => {
                eprintln!("Read error: {e}");
                return ExitCode::from(1);
            }
        }
    }

    println!();
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("JSSTEP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(async {
        if let Some(code) = &cli.eval {
            return execute_code(&cli, code).await;
        }
        if let Some(path) = &cli.file {
            return run_file(&cli, path).await;
        }
        run_repl(&cli).await
    })
}
