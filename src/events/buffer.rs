/// Ordered, bounded record buffer
///
/// Records accumulate until `capacity` is reached; the push that fills the
/// buffer takes the whole batch out. Every record ends up in exactly one
/// batch, in push order.
#[derive(Debug)]
pub struct RecordBuffer<T> {
    records: Vec<T>,
    capacity: usize,
}

impl<T> RecordBuffer<T> {
    /// `capacity` of 0 is treated as 1 (flush on every record)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record; returns the full batch when the size threshold is hit
    pub fn push(&mut self, record: T) -> Option<Vec<T>> {
        self.records.push(record);
        if self.records.len() >= self.capacity {
            self.take()
        } else {
            None
        }
    }

    /// Take whatever is buffered; `None` when empty, so a repeated flush is a no-op
    pub fn take(&mut self) -> Option<Vec<T>> {
        if self.records.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.records,
            Vec::with_capacity(self.capacity),
        ))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushes_on_size_threshold() {
        let mut buffer = RecordBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), Some(vec![1, 2, 3]));
        assert!(buffer.is_empty());

        assert_eq!(buffer.push(4), None);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_take_is_idempotent() {
        let mut buffer = RecordBuffer::new(10);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.take(), Some(vec!["a", "b"]));
        assert_eq!(buffer.take(), None);
        assert_eq!(buffer.take(), None);
    }

    #[test]
    fn test_zero_capacity_flushes_every_record() {
        let mut buffer = RecordBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.push('x'), Some(vec!['x']));
    }
}
