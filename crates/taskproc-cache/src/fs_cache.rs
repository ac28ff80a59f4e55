use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use taskproc_types::{CacheEntry, TraceRecord, Value};
use tracing::debug;

use crate::error::CacheError;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    trace: TraceRecord,
    work_dir: Utf8PathBuf,
    context: Option<BTreeMap<String, Value>>,
}

/// A content-addressed store of task completion records, keyed by
/// fingerprint hex. Grounded on `turborepo-cache/src/fs.rs`'s
/// `FSCache`: metadata is written to a pid-suffixed temp file and
/// renamed into place, so a reader never observes a partially written
/// file, and concurrent writers to the same fingerprint never interleave
/// bytes.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: Utf8PathBuf,
}

impl FsCache {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn meta_path(&self, fingerprint_hex: &str) -> Utf8PathBuf {
        self.root.join(format!("{fingerprint_hex}-meta.json"))
    }

    /// Look up a previously published entry. Returns `Ok(None)` if no
    /// entry exists yet, or if it exists but its recorded work directory
    /// has since been removed (the entry is stale and the caller should
    /// fall through to a fresh submission).
    pub fn lookup(&self, fingerprint_hex: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.meta_path(fingerprint_hex);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        let persisted: PersistedEntry =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Malformed { path, source })?;

        if !persisted.work_dir.exists() {
            debug!(work_dir = %persisted.work_dir, "cache entry's work dir no longer exists");
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            trace: persisted.trace,
            work_dir: persisted.work_dir,
            context: persisted.context,
        }))
    }

    /// Publish a completed task. Writes the metadata sidecar atomically:
    /// write to a unique temp path, then rename over the final name.
    pub fn put(
        &self,
        fingerprint_hex: &str,
        work_dir: &Utf8Path,
        trace: TraceRecord,
        context: Option<BTreeMap<String, Value>>,
    ) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;

        let persisted = PersistedEntry {
            trace,
            work_dir: work_dir.to_path_buf(),
            context,
        };
        let bytes = serde_json::to_vec_pretty(&persisted).expect("TraceRecord/Value always serialize");

        let final_path = self.meta_path(fingerprint_hex);
        let tmp_path = self.root.join(format!(
            "{fingerprint_hex}-meta.json.{}.tmp",
            std::process::id()
        ));

        std::fs::write(&tmp_path, &bytes).map_err(|source| CacheError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &final_path).map_err(|source| CacheError::Io {
            path: final_path,
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(hash: &str) -> TraceRecord {
        TraceRecord {
            fingerprint: hash.to_string(),
            exit_status: 0,
            completed: true,
            duration_millis: 10,
        }
    }

    #[test]
    fn round_trips_a_published_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        let work_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        assert!(cache.lookup("abc123").unwrap().is_none());
        cache.put("abc123", &work_dir, trace("abc123"), None).unwrap();

        let entry = cache.lookup("abc123").unwrap().expect("entry exists");
        assert_eq!(entry.trace.fingerprint, "abc123");
        assert!(entry.trace.is_completed());
    }

    #[test]
    fn stale_entry_with_missing_work_dir_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        let missing_work_dir = Utf8PathBuf::from_path_buf(dir.path().join("gone")).unwrap();

        cache
            .put("def456", &missing_work_dir, trace("def456"), None)
            .unwrap();
        assert!(cache.lookup("def456").unwrap().is_none());
    }

    #[test]
    fn no_leftover_temp_files_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        let work_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        cache.put("ghi789", &work_dir, trace("ghi789"), None).unwrap();

        let leftover_tmp = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(".tmp"));
        assert!(!leftover_tmp);
    }
}
