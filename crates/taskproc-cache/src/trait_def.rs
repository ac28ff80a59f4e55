use std::collections::BTreeMap;

use camino::Utf8Path;
use taskproc_types::{CacheEntry, TraceRecord, Value};

use crate::error::CacheError;

/// The cache contract the engine consumes, kept narrow deliberately:
/// everything about archive formats or remote storage is a concern of
/// the implementation, not of callers.
pub trait Cache: Send + Sync {
    fn lookup(&self, fingerprint_hex: &str) -> Result<Option<CacheEntry>, CacheError>;

    fn put(
        &self,
        fingerprint_hex: &str,
        work_dir: &Utf8Path,
        trace: TraceRecord,
        context: Option<BTreeMap<String, Value>>,
    ) -> Result<(), CacheError>;
}

impl Cache for crate::FsCache {
    fn lookup(&self, fingerprint_hex: &str) -> Result<Option<CacheEntry>, CacheError> {
        crate::FsCache::lookup(self, fingerprint_hex)
    }

    fn put(
        &self,
        fingerprint_hex: &str,
        work_dir: &Utf8Path,
        trace: TraceRecord,
        context: Option<BTreeMap<String, Value>>,
    ) -> Result<(), CacheError> {
        crate::FsCache::put(self, fingerprint_hex, work_dir, trace, context)
    }
}
