use std::collections::VecDeque;

use taskproc_id::TupleIndex;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequencerError {
    #[error("tuple {index} arrived after its slot ({current}) had already been emitted")]
    LateArrival { index: u64, current: u64 },
}

/// Reorders out-of-order task completions back into strictly ascending
/// `tuple-index` order for "fair" processes. Unfair processes should
/// simply emit as soon as a task finishes and never touch this type.
///
/// Grounded on the `Visitor`'s single result-consuming loop in
/// `turborepo-lib/src/task_graph/visitor/mod.rs`, which drains a
/// `FuturesUnordered` of completions arriving in any order; here the
/// draining loop additionally rebuffers slots so they can be released in
/// tuple order.
pub struct EmissionSequencer<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    current: u64,
    buffer: VecDeque<Option<T>>,
}

impl<T> EmissionSequencer<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: 0,
                buffer: VecDeque::new(),
            }),
        }
    }

    /// Record a completed tuple's payload and return every payload now
    /// ready to emit, in order. An index at or before the current
    /// emission point is a logic error elsewhere in the pipeline (the
    /// same tuple index completing twice), not a recoverable condition.
    pub async fn complete(&self, index: TupleIndex, payload: T) -> Result<Vec<T>, SequencerError> {
        let mut inner = self.inner.lock().await;
        let slot = index.raw();

        if slot < inner.current {
            return Err(SequencerError::LateArrival {
                index: slot,
                current: inner.current,
            });
        }

        let offset = (slot - inner.current) as usize;
        if offset >= inner.buffer.len() {
            inner.buffer.resize_with(offset + 1, || None);
        }
        debug_assert!(inner.buffer[offset].is_none(), "tuple index completed twice");
        inner.buffer[offset] = Some(payload);

        let mut ready = Vec::new();
        while let Some(front) = inner.buffer.front_mut() {
            match front.take() {
                Some(value) => {
                    ready.push(value);
                    inner.buffer.pop_front();
                    inner.current += 1;
                }
                None => break,
            }
        }
        Ok(ready)
    }
}

impl<T> Default for EmissionSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}
