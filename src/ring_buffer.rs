//! Fixed-capacity ring buffer.
//!
//! Storage is allocated once at construction and never grows. Pushing into a
//! full buffer overwrites the oldest entry. All bounded histories in the
//! estimator (calibration windows, rest flags, stability window, raw samples)
//! use this type.

/// Ring buffer over a preallocated slot array.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    // Index where the next push lands.
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// A zero capacity yields a buffer that silently drops every push.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Appends a value, evicting the oldest one when full.
    pub fn push(&mut self, value: T) {
        let capacity = self.slots.len();
        if capacity == 0 {
            return;
        }

        self.slots[self.head] = value;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Forgets all values; capacity is unchanged.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = T> + ExactSizeIterator + '_ {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity.max(1);
        (0..self.len).map(move |i| self.slots[(start + i) % capacity])
    }

    /// Iterates over the `n` most recent values, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = T> + '_ {
        self.iter().rev().take(n)
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> Option<T> {
        self.iter().next_back()
    }
}

impl RingBuffer<f64> {
    /// Arithmetic mean, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Population standard deviation (divides by N), `None` when empty.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / self.len as f64;
        Some(variance.sqrt())
    }
}
