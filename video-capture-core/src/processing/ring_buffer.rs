use std::ops::{Index, IndexMut};

/// Fixed-capacity circular FIFO.
///
/// Used for decoded playback frames and for per-channel audio samples.
/// Not synchronized: wrap in `parking_lot::Mutex` for cross-thread access.
///
/// Indexing is relative to the head (index 0 is the oldest element) and panics
/// when out of range, like slice indexing.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    read_index: usize,
    available: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);
        Self {
            buffer,
            read_index: 0,
            available: 0,
        }
    }

    fn slot(&self, offset: usize) -> usize {
        (self.read_index + offset) % self.buffer.len()
    }

    /// Append `item` at the tail.
    ///
    /// When full, the oldest element is evicted if `overwrite_if_full` is set;
    /// otherwise `item` is dropped and `false` is returned.
    pub fn enqueue(&mut self, item: T, overwrite_if_full: bool) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        if self.is_full() {
            if !overwrite_if_full {
                return false;
            }
            self.dequeue();
        }
        let tail = self.slot(self.available);
        self.buffer[tail] = Some(item);
        self.available += 1;
        true
    }

    /// Remove and return the oldest element.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.available == 0 {
            return None;
        }
        let item = self.buffer[self.read_index].take();
        self.read_index = self.slot(1);
        self.available -= 1;
        item
    }

    /// Drop up to `count` elements from the head. Returns how many were dropped.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.available);
        for _ in 0..count {
            self.dequeue();
        }
        count
    }

    /// Move up to `dest.len()` elements into `dest`, oldest first. Returns how many were moved.
    pub fn dequeue_into(&mut self, dest: &mut [T]) -> usize {
        let mut moved = 0;
        for slot in dest.iter_mut() {
            match self.dequeue() {
                Some(item) => {
                    *slot = item;
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    pub fn get(&self, offset: usize) -> Option<&T> {
        if offset >= self.available {
            return None;
        }
        self.buffer[self.slot(offset)].as_ref()
    }

    pub fn get_mut(&mut self, offset: usize) -> Option<&mut T> {
        if offset >= self.available {
            return None;
        }
        let slot = self.slot(offset);
        self.buffer[slot].as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.available).filter_map(move |i| self.get(i))
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn is_full(&self) -> bool {
        self.available == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Reset to empty, dropping every stored element.
    pub fn clear(&mut self) {
        for slot in self.buffer.iter_mut() {
            *slot = None;
        }
        self.read_index = 0;
        self.available = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Append a slice, dropping the oldest elements on overflow.
    ///
    /// If `items` is larger than capacity, only the last `capacity` items are kept.
    pub fn write(&mut self, items: &[T]) {
        let capacity = self.capacity();
        let items = if items.len() > capacity {
            &items[items.len() - capacity..]
        } else {
            items
        };
        for item in items {
            self.enqueue(item.clone(), true);
        }
    }

    /// Read and remove up to `count` elements.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let count = count.min(self.available);
        let mut result = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(item) = self.dequeue() {
                result.push(item);
            }
        }
        result
    }
}

impl<T> Index<usize> for RingBuffer<T> {
    type Output = T;

    fn index(&self, offset: usize) -> &T {
        let len = self.available;
        match self.get(offset) {
            Some(item) => item,
            None => panic!("ring buffer index {} out of range for length {}", offset, len),
        }
    }
}

impl<T> IndexMut<usize> for RingBuffer<T> {
    fn index_mut(&mut self, offset: usize) -> &mut T {
        let len = self.available;
        match self.get_mut(offset) {
            Some(item) => item,
            None => panic!("ring buffer index {} out of range for length {}", offset, len),
        }
    }
}
