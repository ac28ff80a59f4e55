//! `taskproc` drives a single ad hoc process descriptor over a list of
//! input values: an executable entry point over the library crate's
//! operator, the way `turbopack-cli`'s `main.rs` is a thin
//! `clap`-parsing, tracing-initializing shell around its own library.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueEnum};
use console::style;
use taskproc_engine::{LocalExecutor, Session, SessionConfig};
use taskproc_id::ProcessId;
use taskproc_types::{
    Arity, ErrorStrategy, HashingMode, InputKind, InputParameter, OutputKind, OutputParameter,
    OutputType, ProcessDescriptor, Value,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    Terminate,
    Finish,
    Ignore,
    Retry,
}

impl From<Strategy> for ErrorStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Terminate => ErrorStrategy::Terminate,
            Strategy::Finish => ErrorStrategy::Finish,
            Strategy::Ignore => ErrorStrategy::Ignore,
            Strategy::Retry => ErrorStrategy::Retry,
        }
    }
}

/// Run a shell command once per `--value`, fanning out through the
/// cache-aware task processor and collecting its declared outputs.
#[derive(Parser, Debug)]
#[command(name = "taskproc", about = "Run a process over a stream of inputs")]
struct Args {
    /// Shell command template, e.g. `echo ${value} > out.txt`
    #[arg(long)]
    command: String,

    /// Shell or interpreter used to run the resolved command
    #[arg(long, default_value = "bash")]
    shell: String,

    /// One input binding for the `value` context key; repeat for more tuples
    #[arg(long = "value")]
    values: Vec<String>,

    /// Glob pattern collected as a file output after each run, relative
    /// to the task's work directory
    #[arg(long)]
    output: Option<String>,

    /// Root directory for per-task work directories
    #[arg(long, default_value = "./taskproc-work")]
    work_dir: PathBuf,

    /// Root directory for the fingerprint cache
    #[arg(long, default_value = "./taskproc-cache")]
    cache_dir: PathBuf,

    #[arg(long, value_enum, default_value = "finish")]
    error_strategy: Strategy,

    #[arg(long, default_value_t = 0)]
    max_retries: u32,

    /// Emit results in input order rather than completion order
    #[arg(long)]
    fair: bool,

    /// Maximum concurrently running tasks, 0 means unbounded
    #[arg(long, default_value_t = 4)]
    max_forks: usize,

    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_descriptor(args: &Args) -> ProcessDescriptor {
    let outputs = match &args.output {
        Some(pattern) => vec![OutputParameter {
            name: "result".into(),
            kind: OutputKind::File {
                pattern: pattern.clone(),
                glob: true,
                output_type: OutputType::Any,
                follow_links: false,
                hidden: false,
                max_depth: None,
            },
            arity: Arity::ANY,
            optional: true,
            include_inputs: false,
        }],
        None => vec![OutputParameter {
            name: "stdout".into(),
            kind: OutputKind::Stdout,
            arity: Arity::ONE,
            optional: false,
            include_inputs: false,
        }],
    };

    ProcessDescriptor {
        id: ProcessId::from_raw(0),
        name: "adhoc".into(),
        inputs: vec![InputParameter {
            name: "value".into(),
            index: 0,
            kind: InputKind::Value,
            arity: Arity::ONE,
        }],
        outputs,
        command_template: args.command.clone(),
        shell: args.shell.clone(),
        error_strategy: args.error_strategy.into(),
        max_retries: args.max_retries,
        max_errors: None,
        max_forks: args.max_forks,
        array_size: 0,
        fair: args.fair,
        hashing_mode: HashingMode::Standard,
        caching_enabled: true,
        resume_enabled: false,
        store_dir: None,
        guard: None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.values.is_empty() {
        anyhow::bail!("at least one --value is required");
    }

    let work_dir = Utf8PathBuf::from_path_buf(args.work_dir.clone())
        .map_err(|p| anyhow::anyhow!("work dir {} is not valid utf-8", p.display()))?;
    let cache_dir = Utf8PathBuf::from_path_buf(args.cache_dir.clone())
        .map_err(|p| anyhow::anyhow!("cache dir {} is not valid utf-8", p.display()))?;
    let session = Session::init(SessionConfig::new(work_dir, cache_dir))
        .context("failed to initialize session directories")?;
    let executor = Arc::new(LocalExecutor::new(Duration::from_secs(30)));
    let descriptor = build_descriptor(&args);

    let operator = session.operator(descriptor, executor);
    let (input_tx, input_rx) = tokio::sync::mpsc::channel(args.values.len().max(1));
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(args.values.len().max(1));

    for value in &args.values {
        let mut bindings = BTreeMap::new();
        bindings.insert("value".to_string(), Value::Str(value.clone()));
        input_tx.send(bindings).await.ok();
    }
    drop(input_tx);

    let run_handle = tokio::spawn(operator.run(input_rx, output_tx));

    let mut completed = 0usize;
    while let Some(emission) = output_rx.recv().await {
        match emission {
            taskproc_engine::Emission::Tuple(outputs) => {
                completed += 1;
                println!("{} task {completed}: {outputs:?}", style("ok").green().bold());
            }
            taskproc_engine::Emission::Poison => break,
        }
    }

    if let Some(fault) = run_handle.await.context("operator task panicked")? {
        eprintln!("{} {fault}", style("error").red().bold());
        session.report_fault(&fault);
        std::process::exit(1);
    }

    println!("{completed} task(s) completed");
    Ok(())
}
