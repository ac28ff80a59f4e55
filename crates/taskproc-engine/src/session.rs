//! Ambient session state shared by every process operator in a run:
//! the cache handle, the fingerprint lock table, work-dir root, and the
//! "has an error already been printed" latch that keeps a terminating
//! run from spamming the same fault to the terminal twice.
//!
//! Grounded on `turborepo-lib/src/run/mod.rs`'s `Run` struct, which
//! plays the same role of bundling per-invocation shared state (cache
//! client, concurrency limits, UI) behind one handle passed to every
//! task.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::Utf8PathBuf;
use taskproc_cache::{Cache, FsCache};
use taskproc_hash::FingerprintHasher;
use taskproc_id::GlobalIdGenerator;
use taskproc_types::{HashingMode, TaskFault};
use tracing::error;

use crate::backend::Executor;
use crate::lock::LockManager;
use crate::operator::{Operator, ProcessResources};

/// Top-level run configuration, the ambient counterpart of a process
/// descriptor: where work happens, how hard to hash, and how many
/// processes may run concurrently session-wide.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub work_root: Utf8PathBuf,
    pub cache_root: Utf8PathBuf,
    pub hashing_mode: HashingMode,
}

impl SessionConfig {
    pub fn new(work_root: impl Into<Utf8PathBuf>, cache_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            cache_root: cache_root.into(),
            hashing_mode: HashingMode::Standard,
        }
    }
}

/// Owns the resources every process operator in a run shares, and the
/// single "has a fault already been reported" flag a session-level
/// error handler consults before printing.
pub struct Session<C = FsCache> {
    resources: Arc<ProcessResources<C>>,
    id_gen: Arc<GlobalIdGenerator>,
    error_shown: AtomicBool,
}

impl Session<FsCache> {
    /// Build a session backed by the bundled filesystem cache, creating
    /// the work and cache roots if they don't already exist.
    pub fn init(config: SessionConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(Path::new(config.work_root.as_str()))?;
        std::fs::create_dir_all(Path::new(config.cache_root.as_str()))?;

        let resources = Arc::new(ProcessResources {
            cache: Arc::new(FsCache::new(config.cache_root)),
            lock_manager: Arc::new(LockManager::new()),
            hasher: FingerprintHasher::new(config.hashing_mode),
            work_root: config.work_root,
        });
        Ok(Self {
            resources,
            id_gen: Arc::new(GlobalIdGenerator::new()),
            error_shown: AtomicBool::new(false),
        })
    }
}

impl<C: Cache + 'static> Session<C> {
    /// Build a session around a caller-provided cache implementation,
    /// e.g. a remote cache client in a test double.
    pub fn with_cache(
        cache: Arc<C>,
        lock_manager: Arc<LockManager>,
        hasher: FingerprintHasher,
        work_root: Utf8PathBuf,
    ) -> Self {
        Self {
            resources: Arc::new(ProcessResources {
                cache,
                lock_manager,
                hasher,
                work_root,
            }),
            id_gen: Arc::new(GlobalIdGenerator::new()),
            error_shown: AtomicBool::new(false),
        }
    }

    pub fn resources(&self) -> Arc<ProcessResources<C>> {
        self.resources.clone()
    }

    pub fn id_generator(&self) -> Arc<GlobalIdGenerator> {
        self.id_gen.clone()
    }

    /// Build an operator for one process descriptor, bound to this
    /// session's shared cache/lock/work-dir resources.
    pub fn operator<E: Executor + 'static>(
        &self,
        descriptor: taskproc_types::ProcessDescriptor,
        executor: Arc<E>,
    ) -> Operator<E, C> {
        Operator::new(descriptor, executor, self.resources(), self.id_generator())
    }

    /// Report a task fault exactly once per session; subsequent faults
    /// for the same or other processes are swallowed, mirroring the
    /// teacher's single first-error-wins reporting for a run.
    pub fn report_fault(&self, fault: &TaskFault) {
        if self
            .error_shown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            error!("{fault}");
        }
    }

    pub fn error_shown(&self) -> bool {
        self.error_shown.load(Ordering::SeqCst)
    }
}
