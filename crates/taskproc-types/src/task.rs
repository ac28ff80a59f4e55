use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use taskproc_id::{ProcessId, TaskId, TupleIndex};

use crate::file_holder::FileHolder;
use crate::value::Value;

/// Sentinel exit status for a task that has not yet completed.
pub const EXIT_STATUS_PENDING: i32 = i32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    None,
    Ignored,
    Retried,
    Terminated,
    Finished,
}

/// One materialization of a process for one input tuple.
///
/// Cloned (with an incremented `attempt`) by the error-strategy engine
/// when retrying; every other field is rebuilt from scratch for the new
/// attempt by the task materializer.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: TaskId,
    pub process_id: ProcessId,
    pub attempt: u32,
    pub submit_attempt: u32,
    pub tuple_index: TupleIndex,
    pub input_bindings: BTreeMap<String, Value>,
    pub context: BTreeMap<String, Value>,
    pub resolved_command: String,
    pub work_dir: Option<Utf8PathBuf>,
    pub fingerprint: Option<[u8; 16]>,
    pub exit_status: i32,
    pub stdout_path: Option<Utf8PathBuf>,
    pub stderr_path: Option<Utf8PathBuf>,
    pub failed: bool,
    pub cached: bool,
    pub error_action: ErrorAction,
    pub outputs: BTreeMap<String, Value>,
    pub stage_map: BTreeMap<String, FileHolder>,
}

impl Task {
    pub fn new(
        task_id: TaskId,
        process_id: ProcessId,
        tuple_index: TupleIndex,
        input_bindings: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            task_id,
            process_id,
            attempt: 1,
            submit_attempt: 1,
            tuple_index,
            input_bindings,
            context: BTreeMap::new(),
            resolved_command: String::new(),
            work_dir: None,
            fingerprint: None,
            exit_status: EXIT_STATUS_PENDING,
            stdout_path: None,
            stderr_path: None,
            failed: false,
            cached: false,
            error_action: ErrorAction::None,
            outputs: BTreeMap::new(),
            stage_map: BTreeMap::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.exit_status == EXIT_STATUS_PENDING
    }

    /// Produce the next-attempt clone used by the error-strategy engine's
    /// RETRY path: a new attempt counter, inherited input bindings, and
    /// every derived field reset so the materializer rebuilds them.
    pub fn next_attempt(&self, new_task_id: TaskId) -> Self {
        let mut next = Task::new(
            new_task_id,
            self.process_id,
            self.tuple_index,
            self.input_bindings.clone(),
        );
        next.attempt = self.attempt + 1;
        next.submit_attempt = self.submit_attempt + 1;
        next
    }
}
