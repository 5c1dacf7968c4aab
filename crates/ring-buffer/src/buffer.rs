//! Sliding Window Sample Buffer

use crate::BufferError;

/// Circular storage for the last `capacity` sample vectors
///
/// The dimension of every sample is fixed by the first one pushed. Slots are
/// reused once the window is full, so a push never allocates after warm-up.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Slot storage, one vector per retained sample
    storage: Vec<Vec<f64>>,
    /// Window depth
    capacity: usize,
    /// Next slot to write
    head: usize,
    /// Number of samples currently retained
    len: usize,
    /// Sample dimension, fixed on first push
    dimension: Option<usize>,
    /// Total samples ever pushed
    total_written: u64,
}

impl SampleBuffer {
    /// Create a new buffer holding up to `capacity` samples
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            storage: vec![Vec::new(); capacity],
            capacity,
            head: 0,
            len: 0,
            dimension: None,
            total_written: 0,
        })
    }

    /// Check that a sample of `dimension` values may be pushed
    pub fn check_dimension(&self, dimension: usize) -> Result<(), BufferError> {
        match self.dimension {
            Some(expected) if expected != dimension => Err(BufferError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            _ => Ok(()),
        }
    }

    /// Push the newest sample, evicting the oldest once the window is full
    pub fn push(&mut self, sample: &[f64]) -> Result<(), BufferError> {
        self.check_dimension(sample.len())?;
        self.dimension = Some(sample.len());

        let slot = &mut self.storage[self.head];
        slot.clear();
        slot.extend_from_slice(sample);

        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        self.total_written += 1;
        Ok(())
    }

    /// Sample that was newest `delay` pushes ago (`0` is the newest)
    ///
    /// Returns `None` when `delay` reaches past the first sample ever pushed.
    /// Once the window is full, any `delay >= capacity` yields the oldest
    /// retained sample.
    pub fn delayed(&self, delay: usize) -> Option<&[f64]> {
        if self.len == 0 || delay as u64 >= self.total_written {
            return None;
        }
        let delay = delay.min(self.len - 1);
        let idx = (self.head + self.capacity - 1 - delay) % self.capacity;
        Some(&self.storage[idx])
    }

    /// Iterate over retained samples, newest first
    pub fn iter_recent(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.len).filter_map(move |delay| self.delayed(delay))
    }

    /// Number of samples currently retained
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no sample has been retained yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the window holds `capacity` samples
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Window depth
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample dimension, once fixed
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Total samples ever pushed
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Drop all samples and forget the dimension
    pub fn clear(&mut self) {
        for slot in &mut self.storage {
            slot.clear();
        }
        self.head = 0;
        self.len = 0;
        self.dimension = None;
        self.total_written = 0;
    }
}
