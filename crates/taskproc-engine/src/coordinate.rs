//! Cache lookup and work-dir creation, serialized per fingerprint. See
//! `SPEC_FULL.md` §4.4 for the algorithm this implements; grounded on
//! the `Semaphore`-gated concurrent-submit pattern in
//! `turborepo-lib/src/engine/execute.rs` and the fetch/put split in
//! `turborepo-cache/src/fs.rs`.

use camino::Utf8PathBuf;
use taskproc_cache::{Cache, CacheError};
use taskproc_hash::{Digest, FingerprintHasher};
use taskproc_types::{CacheEntry, OutputKind, OutputParameter, ProcessDescriptor};
use thiserror::Error;

use crate::globmatch;
use crate::lock::LockManager;

#[derive(Debug, Error)]
pub enum CoordinateError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to create work directory {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The attempt-index search exceeded its bound without finding a
    /// free work directory. This is the pinned resolution to the "what
    /// if directory creation races forever" open question: treat it as
    /// an unrecoverable error rather than looping without end.
    #[error("exhausted {attempts} attempts looking for a free work directory")]
    WorkDirExhausted { attempts: u32 },
}

#[derive(Debug)]
pub enum CoordinateOutcome {
    CacheHit(CacheEntry),
    Submitted {
        work_dir: Utf8PathBuf,
        fingerprint_hex: String,
        fingerprint: Digest,
    },
}

/// A cache entry is only usable if the recorded run completed with a
/// backend-accepted exit status *and* every declared output it promised
/// is still present on disk — `checkCachedOutput` in `SPEC_FULL.md` §4.4.
/// A stale entry (exit status fine, but outputs since deleted) falls
/// through to a fresh submission instead of surfacing as a collection
/// failure later.
fn cache_entry_is_usable(descriptor: &ProcessDescriptor, entry: &CacheEntry) -> bool {
    if !entry.trace.is_completed() || entry.trace.exit_status != 0 {
        return false;
    }
    if !entry.work_dir.is_dir() {
        return false;
    }
    descriptor
        .outputs
        .iter()
        .all(|output| cached_output_satisfied(output, entry))
}

fn cached_output_satisfied(output: &OutputParameter, entry: &CacheEntry) -> bool {
    match &output.kind {
        OutputKind::Stdout => entry.work_dir.join(".command.out").is_file(),
        OutputKind::File {
            pattern,
            glob,
            output_type,
            follow_links,
            hidden,
            max_depth,
        } => {
            let got = if *glob {
                let opts = globmatch::infer_options(pattern, *output_type, *follow_links, *hidden, *max_depth);
                globmatch::match_outputs(&entry.work_dir, pattern, opts)
                    .map(|m| m.len())
                    .unwrap_or(0)
            } else {
                let candidate = entry.work_dir.join(pattern);
                let exists = if *follow_links {
                    candidate.exists()
                } else {
                    candidate.symlink_metadata().is_ok()
                };
                usize::from(exists)
            };
            output.optional || output.arity.contains(got)
        }
        // Value/env/cmd-eval outputs aren't backed by files on disk; a
        // completed trace with a stored context is the only signal
        // available, and `context` only exists when the process declared
        // lazy values in the first place.
        OutputKind::Value { expression } => entry
            .context
            .as_ref()
            .map(|ctx| ctx.contains_key(expression))
            .unwrap_or(output.optional),
        OutputKind::Env { .. } | OutputKind::CmdEval { .. } | OutputKind::Default => true,
    }
}

pub async fn coordinate(
    descriptor: &ProcessDescriptor,
    cache: &impl Cache,
    lock_manager: &LockManager,
    hasher: &FingerprintHasher,
    work_root: &camino::Utf8Path,
    base_fingerprint: Digest,
    start_attempt: u32,
    bound: u32,
) -> Result<CoordinateOutcome, CoordinateError> {
    for attempt in start_attempt..start_attempt + bound {
        let fingerprint = hasher.rehash(base_fingerprint, attempt);
        let fingerprint_hex = fingerprint.to_hex();

        if let Some(entry) = cache.lookup(&fingerprint_hex)? {
            if cache_entry_is_usable(descriptor, &entry) {
                return Ok(CoordinateOutcome::CacheHit(entry));
            }
        }

        let guard = lock_manager.acquire(&fingerprint_hex).await;
        let work_dir = work_root.join(&fingerprint_hex);
        if work_dir.exists() {
            drop(guard);
            continue;
        }
        std::fs::create_dir_all(&work_dir).map_err(|source| CoordinateError::Io {
            path: work_dir.clone(),
            source,
        })?;
        drop(guard);

        return Ok(CoordinateOutcome::Submitted {
            work_dir,
            fingerprint_hex,
            fingerprint,
        });
    }
    Err(CoordinateError::WorkDirExhausted { attempts: bound })
}
