use std::fmt;

/// Larger buffers grow on demand instead of allocating up front.
const PREALLOCATE_LIMIT: usize = 4096;

/// Fixed-capacity ring: once full, each push overwrites the oldest item.
#[derive(Clone)]
pub struct CircularBuffer<T> {
    buffer: Vec<T>,
    write_pos: usize,
    len: usize,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            write_pos: 0,
            len: 0,
            capacity,
        }
    }

    /// Appends `item`, returning the evicted oldest item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.len < self.capacity {
            self.buffer.push(item);
            self.len += 1;
            None
        } else {
            Some(std::mem::replace(&mut self.buffer[self.write_pos], item))
        };
        self.write_pos = (self.write_pos + 1) % self.capacity;
        evicted
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
        self.len = 0;
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (head, tail) = if self.len < self.capacity {
            (0, self.len)
        } else {
            (self.write_pos, self.capacity)
        };

        self.buffer[head..]
            .iter()
            .chain(&self.buffer[..head])
            .take(tail)
    }

    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.write_pos + self.capacity - 1) % self.capacity;
        self.buffer.get(idx)
    }

    pub fn as_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_in_order() {
        let mut buffer = CircularBuffer::new(3);
        for i in 0..7 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_vec(), vec![4, 5, 6]);
        assert_eq!(buffer.last(), Some(&6));
    }

    #[test]
    fn evicts_exactly_one_per_push_when_full() {
        let mut buffer = CircularBuffer::new(2);
        assert_eq!(buffer.push('a'), None);
        assert_eq!(buffer.push('b'), None);
        assert_eq!(buffer.push('c'), Some('a'));
        assert_eq!(buffer.push('d'), Some('b'));
        assert_eq!(buffer.as_vec(), vec!['c', 'd']);
    }

    #[test]
    fn partial_fill() {
        let mut buffer = CircularBuffer::new(5);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.as_vec(), vec![1, 2]);
        assert_eq!(buffer.last(), Some(&2));
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut buffer = CircularBuffer::new(0);
        assert_eq!(buffer.push(1), Some(1));
        assert!(buffer.is_empty());
        assert_eq!(buffer.last(), None);
        assert!(buffer.as_vec().is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut buffer = CircularBuffer::new(2);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.push(9);
        assert_eq!(buffer.as_vec(), vec![9]);
    }
}
