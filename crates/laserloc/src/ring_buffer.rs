//! Fixed-capacity window of recent world-space samples.
//!
//! A missed detection is stored as `None`: it still takes a slot (so it
//! evicts an older sample) and keeps the window from counting as stable.

use crate::geometry::WorldPoint;

/// Default window length.
pub const SAMPLE_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sample index {index} out of range (holding {len})")]
pub struct SampleIndexError {
    pub index: usize,
    pub len: usize,
}

/// Circular buffer of the last `N` samples.
#[derive(Debug, Clone)]
pub struct SampleBuffer<const N: usize = SAMPLE_CAPACITY> {
    slots: [Option<WorldPoint>; N],
    /// Next slot to overwrite.
    cursor: usize,
    len: usize,
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SampleBuffer<N> {
    pub fn new() -> Self {
        Self {
            slots: [None; N],
            cursor: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Push a sample, evicting the oldest once full.
    pub fn add(&mut self, sample: Option<WorldPoint>) {
        if N == 0 {
            return;
        }
        self.slots[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    /// The `i`-th oldest held sample.
    pub fn get(&self, i: usize) -> Result<Option<WorldPoint>, SampleIndexError> {
        if i >= self.len {
            return Err(SampleIndexError {
                index: i,
                len: self.len,
            });
        }
        // Oldest sample sits `len` slots behind the cursor.
        let pos = (self.cursor + N - self.len + i) % N;
        Ok(self.slots[pos])
    }

    /// Held samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Option<WorldPoint>> + '_ {
        (0..self.len).map(move |i| self.slots[(self.cursor + N - self.len + i) % N])
    }

    /// Mean of the held detections; `None` if no held sample is a detection.
    pub fn average(&self) -> Option<WorldPoint> {
        let mut sum = [0.0f64; 2];
        let mut n = 0usize;
        for p in self.iter().flatten() {
            sum[0] += p.x;
            sum[1] += p.y;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(WorldPoint::new(sum[0] / n as f64, sum[1] / n as f64))
    }

    /// True iff the buffer is full, holds no missed detections, and every
    /// pair of samples differs by at most `tx` in x and `ty` in y.
    pub fn all_within_tolerance(&self, tx: f64, ty: f64) -> bool {
        if !self.is_full() {
            return false;
        }
        let mut points = [WorldPoint::default(); N];
        for (dst, src) in points.iter_mut().zip(self.iter()) {
            match src {
                Some(p) => *dst = p,
                None => return false,
            }
        }
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                if (a.x - b.x).abs() > tx || (a.y - b.y).abs() > ty {
                    return false;
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
