//! The dataflow operator shell: the per-process actor that turns an
//! input tuple into a task, drives it through cache/work-dir
//! coordination and execution, retries or terminates on failure, and
//! emits the result downstream in fair or completion order.
//!
//! Grounded on the `Visitor`'s per-node execution loop in
//! `turborepo-lib/src/task_graph/visitor/mod.rs` (push work onto a
//! `FuturesUnordered`, drain results) and the `Semaphore`-bounded
//! concurrent spawn in `turborepo-lib/src/engine/execute.rs`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use taskproc_cache::Cache;
use taskproc_hash::{FingerprintHasher, HashInput};
use taskproc_id::{GlobalIdGenerator, TupleIndex, TupleIndexGenerator};
use taskproc_types::{ProcessDescriptor, Task, TaskFault, TraceRecord, Value};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, instrument, warn};

use crate::array_collector::ArrayCollector;
use crate::backend::{Executor, ExecutorError};
use crate::collect::{self, CollectInputs};
use crate::coordinate::{self, CoordinateOutcome};
use crate::env_assembly;
use crate::errors::{self, ErrorCounters, ErrorDecision, FailureKind};
use crate::lock::LockManager;
use crate::materialize::{self, MaterializeOutcome};
use crate::sequencer::EmissionSequencer;
use crate::staging::StagingError;
use crate::state;

/// A fully bound downstream tuple, or the poison sentinel closing the
/// process's output channels.
#[derive(Debug, Clone)]
pub enum Emission {
    Tuple(BTreeMap<String, Value>),
    Poison,
}

/// Resources shared across every tuple a process handles: the cache, the
/// fingerprint lock table, and where work directories live on disk.
pub struct ProcessResources<C> {
    pub cache: Arc<C>,
    pub lock_manager: Arc<LockManager>,
    pub hasher: FingerprintHasher,
    pub work_root: Utf8PathBuf,
}

const WORK_DIR_SEARCH_SLACK: u32 = 2;

pub struct Operator<E, C> {
    descriptor: ProcessDescriptor,
    executor: Arc<E>,
    resources: Arc<ProcessResources<C>>,
    id_gen: Arc<GlobalIdGenerator>,
    tuple_gen: TupleIndexGenerator,
    max_forks: Option<Arc<Semaphore>>,
}

impl<E, C> Operator<E, C>
where
    E: Executor + 'static,
    C: Cache + 'static,
{
    pub fn new(
        descriptor: ProcessDescriptor,
        executor: Arc<E>,
        resources: Arc<ProcessResources<C>>,
        id_gen: Arc<GlobalIdGenerator>,
    ) -> Self {
        let max_forks = if descriptor.max_forks > 0 {
            Some(Arc::new(Semaphore::new(descriptor.max_forks)))
        } else {
            None
        };
        Self {
            descriptor,
            executor,
            resources,
            id_gen,
            tuple_gen: TupleIndexGenerator::new(),
            max_forks,
        }
    }

    /// Drive the operator: read bound tuples from `input_rx` until it
    /// closes, running each through the full pipeline, and emit results
    /// (in fair or completion order) to `output_tx`, finishing with a
    /// poison value.
    #[instrument(skip_all, fields(process = %self.descriptor.name))]
    pub async fn run(
        self,
        input_rx: mpsc::Receiver<BTreeMap<String, Value>>,
        output_tx: mpsc::Sender<Emission>,
    ) -> Option<TaskFault> {
        let each_param = crate::each::each_param_name(&self.descriptor).map(str::to_string);
        let mut input_rx = crate::each::spawn_expansion(each_param, input_rx, 8);

        let (state, terminal) = state::spawn(1);
        let sequencer: Arc<EmissionSequencer<BTreeMap<String, Value>>> = Arc::new(EmissionSequencer::new());
        let mut array_collector: Option<ArrayCollector<(TupleIndex, BTreeMap<String, Value>)>> =
            (self.descriptor.array_size > 0).then(|| ArrayCollector::new(self.descriptor.array_size));
        let fault: Arc<tokio::sync::Mutex<Option<TaskFault>>> = Arc::new(tokio::sync::Mutex::new(None));

        let mut join_set = tokio::task::JoinSet::new();

        while let Some(bindings) = input_rx.recv().await {
            let tuple_index = self.tuple_gen.next_index();
            state.inc_submitted();

            // With array batching on, a tuple only gets spawned once its
            // batch fills; the shell then submits the whole batch at
            // once rather than as each tuple arrives, per SPEC_FULL.md
            // §4.10. Without batching, every tuple spawns immediately.
            let ready_batch = match array_collector.as_mut() {
                Some(collector) => collector.push((tuple_index, bindings)),
                None => Some(vec![(tuple_index, bindings)]),
            };

            if let Some(batch) = ready_batch {
                for (tuple_index, bindings) in batch {
                    self.spawn_tuple(
                        &mut join_set,
                        &state,
                        &sequencer,
                        &output_tx,
                        &fault,
                        tuple_index,
                        bindings,
                    )
                    .await;
                }
            }
        }

        if let Some(batch) = array_collector.as_mut().and_then(|c| c.flush()) {
            for (tuple_index, bindings) in batch {
                self.spawn_tuple(
                    &mut join_set,
                    &state,
                    &sequencer,
                    &output_tx,
                    &fault,
                    tuple_index,
                    bindings,
                )
                .await;
            }
        }

        while join_set.join_next().await.is_some() {}

        state.close_port();
        let _ = terminal.await;
        let _ = output_tx.send(Emission::Poison).await;

        Arc::try_unwrap(fault)
            .map(|m| m.into_inner())
            .unwrap_or(None)
    }

    /// Clone the shared state a tuple's run needs and push it onto
    /// `join_set`, acquiring a fork permit first if the process caps
    /// concurrency.
    #[allow(clippy::too_many_arguments)]
    async fn spawn_tuple(
        &self,
        join_set: &mut tokio::task::JoinSet<()>,
        state: &state::StateHandle,
        sequencer: &Arc<EmissionSequencer<BTreeMap<String, Value>>>,
        output_tx: &mpsc::Sender<Emission>,
        fault: &Arc<tokio::sync::Mutex<Option<TaskFault>>>,
        tuple_index: TupleIndex,
        bindings: BTreeMap<String, Value>,
    ) {
        let descriptor = self.descriptor.clone();
        let executor = self.executor.clone();
        let resources = self.resources.clone();
        let id_gen = self.id_gen.clone();
        let state = state.clone();
        let sequencer = sequencer.clone();
        let output_tx = output_tx.clone();
        let fault = fault.clone();
        let permit = match &self.max_forks {
            Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore never closes")),
            None => None,
        };

        join_set.spawn(async move {
            let _permit = permit;
            let outcome = run_tuple(&descriptor, &executor, &resources, &id_gen, tuple_index, bindings).await;
            state.inc_completed();

            match outcome {
                Ok(outputs) => {
                    if descriptor.fair {
                        if let Ok(ready) = sequencer.complete(tuple_index, outputs).await {
                            for tuple in ready {
                                let _ = output_tx.send(Emission::Tuple(tuple)).await;
                            }
                        }
                    } else {
                        let _ = output_tx.send(Emission::Tuple(outputs)).await;
                    }
                }
                Err(task_fault) => {
                    let mut guard = fault.lock().await;
                    if guard.is_none() {
                        *guard = Some(task_fault);
                    }
                }
            }
        });
    }
}

/// Run the full pipeline for one tuple: materialize, coordinate,
/// execute, collect, and retry per the error-strategy engine. Returns
/// the bound output map, or a `TaskFault` if the process should
/// terminate.
async fn run_tuple<E: Executor, C: Cache>(
    descriptor: &ProcessDescriptor,
    executor: &E,
    resources: &ProcessResources<C>,
    id_gen: &GlobalIdGenerator,
    tuple_index: TupleIndex,
    bindings: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, TaskFault> {
    let mut counters = ErrorCounters::default();

    loop {
        // Every attempt gets its own session-wide id, so two processes
        // starting from the same tuple index never collide (SPEC_FULL.md
        // §3: task ids are globally unique and monotone).
        let task_id = id_gen.next_task_id();

        let outcome = materialize::materialize(
            descriptor,
            task_id,
            tuple_index,
            bindings.clone(),
            |path| executor.is_foreign_file(path),
        );

        let mut task = match outcome {
            Ok(MaterializeOutcome::GuardSkipped(_)) => return Ok(BTreeMap::new()),
            Ok(MaterializeOutcome::Run(task)) => task,
            Err(staging_err) => return Err(staging_fault(descriptor, staging_err)),
        };
        task.attempt = counters.task_errors + 1;

        let keys = hash_keys(descriptor, &task);
        let base_fingerprint = match resources.hasher.hash(&keys) {
            Ok(digest) => digest,
            Err(err) => {
                return Err(TaskFault {
                    process_name: descriptor.name.clone(),
                    cause: format!("failed to compute fingerprint: {err}"),
                    command: task.resolved_command.clone(),
                    exit_status: -1,
                    output_tail: vec![],
                    command_error: None,
                    wrapper_tail: None,
                    work_dir: None,
                    container: None,
                    tip: None,
                })
            }
        };

        let bound = descriptor.max_retries + counters.process_errors.max(descriptor.max_errors.unwrap_or(0)) + WORK_DIR_SEARCH_SLACK + 1;
        let coordination = coordinate::coordinate(
            descriptor,
            resources.cache.as_ref(),
            resources.lock_manager.as_ref(),
            &resources.hasher,
            &resources.work_root,
            base_fingerprint,
            task.attempt,
            bound,
        )
        .await;

        let (work_dir, fingerprint_hex, from_cache, cached_entry) = match coordination {
            Ok(CoordinateOutcome::CacheHit(entry)) => {
                (entry.work_dir.clone(), entry.trace.fingerprint.clone(), true, Some(entry))
            }
            Ok(CoordinateOutcome::Submitted {
                work_dir,
                fingerprint_hex,
                ..
            }) => (work_dir, fingerprint_hex, false, None),
            Err(err) => {
                return Err(TaskFault {
                    process_name: descriptor.name.clone(),
                    cause: format!("cache/work-dir coordination failed: {err}"),
                    command: task.resolved_command.clone(),
                    exit_status: -1,
                    output_tail: vec![],
                    command_error: None,
                    wrapper_tail: None,
                    work_dir: None,
                    container: None,
                    tip: None,
                });
            }
        };
        task.work_dir = Some(work_dir.clone());
        task.fingerprint = Some(*base_fingerprint.as_bytes());
        task.cached = from_cache;

        if !from_cache {
            if let Err(err) = crate::staging::place_files(task.stage_map.values(), &work_dir) {
                return Err(staging_fault(descriptor, err));
            }
        }

        let started = Instant::now();
        let exit_status = if from_cache {
            cached_entry.as_ref().map(|e| e.trace.exit_status).unwrap_or(0)
        } else {
            let env = match env_assembly::assemble_env(&BTreeMap::new(), None, false) {
                Ok(env) => env,
                Err(_) => BTreeMap::new(),
            };
            match executor
                .submit(&task.resolved_command, &descriptor.shell, &work_dir, &env)
                .await
            {
                Ok(completion) => completion.exit_status,
                Err(err) => {
                    return handle_executor_failure(descriptor, &mut counters, task, err);
                }
            }
        };
        task.exit_status = exit_status;

        let staged_names: std::collections::BTreeSet<String> =
            task.stage_map.keys().cloned().collect();
        let env_captures = if from_cache {
            BTreeMap::new()
        } else {
            read_command_env(&work_dir).unwrap_or_default()
        };

        let collected = collect::collect_outputs(
            descriptor,
            CollectInputs {
                work_dir: &work_dir,
                context: &task.context,
                env_captures: &env_captures,
                staged_input_names: &staged_names,
            },
        );

        let failure_kind = if exit_status != 0 {
            Some(FailureKind::ProcessFailure)
        } else if collected.is_err() {
            Some(FailureKind::ProcessFailure)
        } else {
            None
        };

        if let Some(kind) = failure_kind {
            counters.task_errors += 1;
            counters.process_errors += 1;
            let decision = errors::decide(
                descriptor.error_strategy,
                kind,
                counters,
                descriptor.max_retries,
                descriptor.max_errors,
            );
            match decision {
                ErrorDecision::Retry => {
                    debug!(attempt = task.attempt, "retrying task after failure");
                    continue;
                }
                ErrorDecision::Ignore => return Ok(BTreeMap::new()),
                ErrorDecision::Finish => return Ok(BTreeMap::new()),
                ErrorDecision::Terminate => {
                    return Err(process_failure_fault(descriptor, &task, &collected));
                }
            }
        }

        if !from_cache && descriptor.caching_enabled {
            let trace = TraceRecord {
                fingerprint: fingerprint_hex.clone(),
                exit_status,
                completed: true,
                duration_millis: started.elapsed().as_millis() as u64,
            };
            if let Err(err) = resources.cache.put(&fingerprint_hex, &work_dir, trace, None) {
                warn!(%err, "failed to publish cache entry");
            }
        }

        return Ok(collected.unwrap_or_default());
    }
}

fn hash_keys(descriptor: &ProcessDescriptor, task: &Task) -> Vec<HashInput> {
    let mut keys = vec![
        HashInput::str(descriptor.name.clone()),
        HashInput::str(descriptor.command_template.clone()),
    ];
    for (name, value) in &task.context {
        keys.push(HashInput::str(format!("{name}={}", value.literal_content())));
    }
    keys
}

fn read_command_env(
    work_dir: &camino::Utf8Path,
) -> std::io::Result<BTreeMap<String, crate::env_parser::EnvCapture>> {
    let contents = std::fs::read_to_string(work_dir.join(".command.env")).unwrap_or_default();
    let mut parser = crate::env_parser::CommandEnvParser::new();
    parser.feed(&contents);
    parser.finish();
    Ok(parser.captures().clone())
}

fn staging_fault(descriptor: &ProcessDescriptor, err: StagingError) -> TaskFault {
    TaskFault {
        process_name: descriptor.name.clone(),
        cause: format!("input staging failed: {err}"),
        command: descriptor.command_template.clone(),
        exit_status: -1,
        output_tail: vec![],
        command_error: None,
        wrapper_tail: None,
        work_dir: None,
        container: None,
        tip: None,
    }
}

fn process_failure_fault(
    descriptor: &ProcessDescriptor,
    task: &Task,
    collected: &Result<BTreeMap<String, Value>, collect::CollectError>,
) -> TaskFault {
    TaskFault {
        process_name: descriptor.name.clone(),
        cause: collected
            .as_ref()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("process terminated with exit code {}", task.exit_status)),
        command: task.resolved_command.clone(),
        exit_status: task.exit_status,
        output_tail: vec![],
        command_error: None,
        wrapper_tail: None,
        work_dir: task.work_dir.clone(),
        container: None,
        tip: None,
    }
}

fn handle_executor_failure(
    descriptor: &ProcessDescriptor,
    _counters: &mut ErrorCounters,
    task: Task,
    err: ExecutorError,
) -> Result<BTreeMap<String, Value>, TaskFault> {
    Err(TaskFault {
        process_name: descriptor.name.clone(),
        cause: format!("executor failed to run the task: {err}"),
        command: task.resolved_command.clone(),
        exit_status: -1,
        output_tail: vec![],
        command_error: None,
        wrapper_tail: None,
        work_dir: task.work_dir.clone(),
        container: None,
        tip: None,
    })
}

/// A no-op delay used only by tests that want to observe ordering
/// without a real backend.
#[cfg(test)]
pub(crate) async fn test_delay(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
