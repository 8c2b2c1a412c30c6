//! # Fixed-Capacity Ring Buffer
//!
//! Overwrite-oldest circular storage backing the per-source aggregate
//! history. The whole point of this structure is the memory bound: a buffer
//! of capacity C never holds more than C items no matter how many hours the
//! pipeline runs, and `push` never allocates after construction.

use crate::error::PipelineError;

/// Fixed-capacity circular store with O(1) push and snapshot reads.
///
/// Backing storage is a pre-sized `Box<[Option<T>]>`; a write cursor advances
/// `(cursor + 1) % capacity` and a count tracks items written up to capacity.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    cursor: usize,
    len: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// Fails with `InvalidCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            cursor: 0,
            len: 0,
        })
    }

    /// Appends an item, overwriting the oldest entry once full. Never fails.
    pub fn push(&mut self, item: T) {
        let capacity = self.slots.len();
        self.slots[self.cursor] = Some(item);
        self.cursor = (self.cursor + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Snapshot of all items, oldest to newest. The returned vector owns
    /// clones; no aliasing with internal storage escapes.
    pub fn get_all(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        let capacity = self.slots.len();
        // Not yet full: items live in the prefix [0, len). Full: the oldest
        // item sits at the cursor, so split the backing array there and
        // concatenate the two segments.
        let start = if self.len < capacity { 0 } else { self.cursor };
        for i in 0..self.len {
            let idx = (start + i) % capacity;
            if let Some(item) = &self.slots[idx] {
                out.push(item.clone());
            }
        }
        out
    }

    /// The newest `n` items, oldest to newest.
    ///
    /// `n == 0` returns an empty vector — this must not fall through to the
    /// "return everything" path of naive modulo arithmetic. `n > len`
    /// returns all available items, never more.
    pub fn get_last(&self, n: usize) -> Vec<T> {
        if n == 0 {
            return Vec::new();
        }
        let take = n.min(self.len);
        let mut all = self.get_all();
        all.split_off(all.len() - take)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Resets to empty without reallocating backing storage.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.cursor = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RingBuffer::<u32>::new(0),
            Err(PipelineError::InvalidCapacity)
        ));
    }

    #[test]
    fn push_overwrites_oldest_in_fifo_order() {
        let mut buf = RingBuffer::new(3).unwrap();
        buf.push(1);
        buf.push(2);
        buf.push(3);
        buf.push(4);
        assert_eq!(buf.get_all(), vec![2, 3, 4]);
        assert!(buf.is_full());
    }

    #[test]
    fn size_stays_bounded_for_long_runs() {
        let mut buf = RingBuffer::new(5).unwrap();
        for i in 0..10_000 {
            buf.push(i);
            assert!(buf.len() <= 5);
            assert!(buf.get_all().len() <= 5);
        }
        // After N >> C pushes the content is the last C items in order.
        assert_eq!(buf.get_all(), vec![9995, 9996, 9997, 9998, 9999]);
    }

    #[test]
    fn get_last_zero_is_empty() {
        let mut buf = RingBuffer::new(4).unwrap();
        buf.push(10);
        buf.push(20);
        assert_eq!(buf.get_last(0), Vec::<i32>::new());
    }

    #[test]
    fn get_last_clamps_to_available() {
        let mut buf = RingBuffer::new(4).unwrap();
        buf.push(10);
        buf.push(20);
        assert_eq!(buf.get_last(10), vec![10, 20]);
        assert_eq!(buf.get_last(1), vec![20]);
    }

    #[test]
    fn get_last_spans_the_wrap_point() {
        let mut buf = RingBuffer::new(3).unwrap();
        for i in 1..=5 {
            buf.push(i);
        }
        // Buffer holds [3, 4, 5] with the cursor mid-array.
        assert_eq!(buf.get_last(2), vec![4, 5]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = RingBuffer::new(3).unwrap();
        buf.push(1);
        buf.push(2);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 3);
        buf.push(7);
        assert_eq!(buf.get_all(), vec![7]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut buf = RingBuffer::new(2).unwrap();
        buf.push(String::from("a"));
        let snap = buf.get_all();
        buf.push(String::from("b"));
        buf.push(String::from("c"));
        assert_eq!(snap, vec![String::from("a")]);
    }
}
