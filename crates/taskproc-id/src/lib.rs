//! Monotonic identifiers for processes, tasks, and tuples.
//!
//! Every id in this crate is assigned from a process-wide or
//! process-scoped atomic counter. None of them are ever reused, which is
//! what lets the rest of the workspace treat equality on an id as
//! equality on identity rather than on content.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! monotonic_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

monotonic_id!(ProcessId);
monotonic_id!(TaskId);
monotonic_id!(TupleIndex);

/// Global source of [`ProcessId`]s and [`TaskId`]s, both of which must be
/// unique across the whole session regardless of which process produced
/// them.
#[derive(Debug, Default)]
pub struct GlobalIdGenerator {
    next_process: AtomicU64,
    next_task: AtomicU64,
}

impl GlobalIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_process_id(&self) -> ProcessId {
        ProcessId(self.next_process.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.next_task.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-process source of [`TupleIndex`]es. Tuple indices only need to be
/// monotone *within* a process, so each operator owns one of these rather
/// than sharing the session-wide generator.
#[derive(Debug, Default)]
pub struct TupleIndexGenerator {
    next: AtomicU64,
}

impl TupleIndexGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&self) -> TupleIndex {
        TupleIndex(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_and_task_ids_are_distinct_sequences() {
        let gen = GlobalIdGenerator::new();
        let p0 = gen.next_process_id();
        let p1 = gen.next_process_id();
        let t0 = gen.next_task_id();
        assert_eq!(p0.raw(), 0);
        assert_eq!(p1.raw(), 1);
        assert_eq!(t0.raw(), 0);
    }

    #[test]
    fn tuple_index_is_strictly_increasing() {
        let gen = TupleIndexGenerator::new();
        let indices: Vec<_> = (0..5).map(|_| gen.next_index().raw()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
