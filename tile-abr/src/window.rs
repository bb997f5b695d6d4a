//! Fixed-capacity sample windows
//!
//! New samples are pushed at the front and the oldest sample falls off the
//! back once the window is full. Iteration runs oldest to newest.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SampleWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> SampleWindow<T> {
    /// Create an empty window
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a window pre-filled with `value` in every slot
    pub fn filled(capacity: usize, value: T) -> Self {
        Self {
            samples: std::iter::repeat(value).take(capacity).collect(),
            capacity,
        }
    }

    /// Push the newest sample, dropping the oldest when full
    pub fn push(&mut self, sample: T) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(sample);
    }

    /// Most recent sample
    pub fn newest(&self) -> Option<T> {
        self.samples.front().copied()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.samples.iter().rev().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl SampleWindow<f64> {
    pub fn sum(&self) -> f64 {
        self.samples.iter().sum()
    }

    /// Arithmetic mean, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum() / self.samples.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut window = SampleWindow::new(3);
        for v in 1..=5 {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(window.newest(), Some(5));
    }

    #[test]
    fn test_filled_window_shifts() {
        let mut window = SampleWindow::filled(3, 0.0);
        assert_eq!(window.len(), 3);
        window.push(2.0);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![0.0, 0.0, 2.0]);
        assert_eq!(window.sum(), 2.0);
    }

    #[test]
    fn test_mean() {
        let mut window = SampleWindow::new(5);
        assert_eq!(window.mean(), None);
        window.push(1.0);
        window.push(3.0);
        assert_eq!(window.mean(), Some(2.0));
    }
}
