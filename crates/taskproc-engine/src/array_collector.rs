/// Batches up to `capacity` ready (non-retry) items, flushing on size or
/// on process close. See `SPEC_FULL.md` §4.10.
pub struct ArrayCollector<T> {
    capacity: usize,
    buffer: Vec<T>,
}

impl<T> ArrayCollector<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Vec::new(),
        }
    }

    /// Push a ready item. Returns a full batch if `capacity` was
    /// reached.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.buffer.push(item);
        if self.buffer.len() >= self.capacity {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Flush whatever is buffered, e.g. when the process's input ports
    /// have all closed.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_at_capacity() {
        let mut collector = ArrayCollector::new(2);
        assert!(collector.push(0u64).is_none());
        let batch = collector.push(1u64).expect("second push fills the batch");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn flush_drains_a_partial_batch() {
        let mut collector = ArrayCollector::new(3);
        collector.push(0u64);
        let batch = collector.flush().expect("partial batch exists");
        assert_eq!(batch.len(), 1);
        assert!(collector.flush().is_none());
    }
}
