//! Fixed-capacity FIFO ring buffer.

use std::collections::VecDeque;

/// Bounded FIFO queue that evicts its oldest entry when full.
///
/// Used to hold messages that arrived early (tagged with an epoch we have not
/// started yet). Memory use never exceeds `capacity` entries no matter how many
/// items a peer pushes.
#[derive(Debug, Clone)]
pub struct MessageBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> MessageBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item` at the tail.
    ///
    /// Returns the evicted head if the buffer was already full. With a zero
    /// capacity the item itself is returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return the head.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// The head, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut buffer = MessageBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.peek(), Some(&1));
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = MessageBuffer::new(3);
        for i in 0..3 {
            assert_eq!(buffer.push(i), None);
        }
        assert_eq!(buffer.push(3), Some(0));
        assert_eq!(buffer.len(), 3);

        // Interleave pops: eviction still takes the oldest entry still present.
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.push(4), None);
        assert_eq!(buffer.push(5), Some(2));

        let drained: Vec<_> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(drained, vec![3, 4, 5]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = MessageBuffer::new(4);
        for i in 0..100 {
            buffer.push(i);
            assert!(buffer.len() <= buffer.capacity());
        }
        assert_eq!(buffer.peek(), Some(&96));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut buffer = MessageBuffer::new(0);
        assert_eq!(buffer.push("x"), Some("x"));
        assert!(buffer.is_empty());
    }
}
