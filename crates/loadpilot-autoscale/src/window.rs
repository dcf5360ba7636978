//! Fixed-size window of recent CPU samples.

/// Default window size: two minutes at a 3 second tick.
pub const LOAD_WINDOW_SIZE: usize = 40;

/// Ring buffer of CPU samples with an on-demand median.
#[derive(Debug, Clone)]
pub struct LoadWindow {
    samples: Vec<f64>,
    /// Slot the next push writes to once the window is full.
    next: usize,
    capacity: usize,
}

impl LoadWindow {
    pub fn new() -> Self {
        Self::with_capacity(LOAD_WINDOW_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            next: 0,
            capacity,
        }
    }

    /// Record a sample, overwriting the oldest one when full.
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Median of the current contents, `None` when empty.
    ///
    /// Sorts a scratch copy; the ring itself is left untouched.
    pub fn median(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        }
    }

    /// Samples oldest first.
    pub fn samples(&self) -> Vec<f64> {
        if self.samples.len() < self.capacity {
            return self.samples.clone();
        }
        let (newer, older) = self.samples.split_at(self.next);
        older.iter().chain(newer).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LoadWindow {
    fn default() -> Self {
        Self::new()
    }
}
