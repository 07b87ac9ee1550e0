use nalgebra::Vector3;
use std::collections::VecDeque;

/// Moving average over the last `capacity` translations.
#[derive(Clone, Debug)]
pub struct WindowAverage {
    capacity: usize,
    buf: VecDeque<Vector3<f64>>,
}

impl WindowAverage {
    /// `capacity` is clamped to at least one sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `t`, evicting the oldest sample beyond capacity, and return the
    /// mean of the buffered samples.
    pub fn push(&mut self, t: Vector3<f64>) -> Vector3<f64> {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(t);
        self.mean()
    }

    /// Arithmetic mean, accumulated as offsets from the oldest sample so a
    /// window of identical samples averages to that sample bit for bit.
    pub fn mean(&self) -> Vector3<f64> {
        let Some(&first) = self.buf.front() else {
            return Vector3::zeros();
        };
        let offsets = self
            .buf
            .iter()
            .fold(Vector3::zeros(), |acc, t| acc + (t - first));
        first + offsets / self.buf.len() as f64
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
