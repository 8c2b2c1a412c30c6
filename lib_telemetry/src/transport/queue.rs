//! Bounded FIFO for outbound control messages accumulated while the link is
//! down. When full, the *oldest* entry is dropped: stale control commands
//! are generally obsolete, so the queue favors recency over completeness.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<Vec<u8>>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueues a message, evicting the oldest entry when full. Returns true
    /// when an eviction happened.
    pub fn push(&mut self, message: Vec<u8>) -> bool {
        let mut evicted = false;
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.dropped += 1;
            evicted = true;
        }
        self.items.push_back(message);
        evicted
    }

    /// Drains all queued messages in FIFO order, oldest first. Used to flush
    /// the backlog after a reconnect.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let mut q = OutboundQueue::new(4);
        q.push(b"a".to_vec());
        q.push(b"b".to_vec());
        q.push(b"c".to_vec());
        assert_eq!(q.drain(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut q = OutboundQueue::new(2);
        assert!(!q.push(b"a".to_vec()));
        assert!(!q.push(b"b".to_vec()));
        assert!(q.push(b"c".to_vec()));
        assert_eq!(q.drain(), vec![b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn clear_keeps_drop_count() {
        let mut q = OutboundQueue::new(1);
        q.push(b"a".to_vec());
        q.push(b"b".to_vec());
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 1);
    }
}
