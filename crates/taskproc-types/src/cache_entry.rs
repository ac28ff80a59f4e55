use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// On-disk record a completed task publishes, and what cache lookups
/// read back. Mirrors the teacher's `CacheMetadata` (`turborepo-cache/
/// src/fs.rs`): a small JSON sidecar written next to the archived
/// artifacts, atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceRecord {
    pub fingerprint: String,
    pub exit_status: i32,
    pub completed: bool,
    pub duration_millis: u64,
}

impl TraceRecord {
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// What a cache lookup returns: the trace record plus, optionally, the
/// task context needed to re-resolve lazy `value` outputs without
/// re-running the task.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub trace: TraceRecord,
    pub work_dir: Utf8PathBuf,
    pub context: Option<BTreeMap<String, Value>>,
}
