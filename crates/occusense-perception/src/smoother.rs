//! Rolling Smoother.
//!
//! Keeps the most recent fused counts in a fixed-capacity FIFO window and
//! reports their integer mean. Eviction is strictly oldest-first by insertion
//! order, so one outlier frame affects at most `1 / len` of the output and
//! leaves the window after `capacity` further frames.

use std::collections::VecDeque;

/// Default number of fused counts kept in the window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Bounded history of fused counts.
#[derive(Debug, Clone)]
pub struct RollingSmoother {
    capacity: usize,
    history: VecDeque<u32>,
}

impl Default for RollingSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RollingSmoother {
    /// Create an empty window holding at most `capacity` samples.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `count`, evict the oldest sample if the window overflowed, and
    /// return `⌊sum / len⌋` over the window.
    pub fn push(&mut self, count: u32) -> u32 {
        self.history.push_back(count);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.current().unwrap_or(count)
    }

    /// Integer mean of the window, or `None` before the first sample.
    pub fn current(&self) -> Option<u32> {
        if self.history.is_empty() {
            return None;
        }
        let sum: u64 = self.history.iter().map(|&c| u64::from(c)).sum();
        let mean = sum / self.history.len() as u64;
        // The mean of u32 samples always fits in a u32.
        Some(mean as u32)
    }

    /// Samples in chronological order (oldest first).
    pub fn samples(&self) -> impl Iterator<Item = u32> + '_ {
        self.history.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(s: &RollingSmoother) -> Vec<u32> {
        s.samples().collect()
    }

    #[test]
    fn single_sample_is_passed_through() {
        let mut s = RollingSmoother::default();
        assert_eq!(s.current(), None);
        assert_eq!(s.push(7), 7);
        assert_eq!(window(&s), vec![7]);
    }

    #[test]
    fn outlier_is_damped() {
        let mut s = RollingSmoother::default();
        let mut out = 0;
        for c in [2, 2, 2, 2, 10] {
            out = s.push(c);
        }
        assert_eq!(out, 3); // ⌊18 / 5⌋
    }

    #[test]
    fn oldest_sample_is_evicted_first() {
        let mut s = RollingSmoother::default();
        for c in [2, 2, 2, 2, 10] {
            s.push(c);
        }
        assert_eq!(s.push(0), 3); // ⌊16 / 5⌋
        assert_eq!(window(&s), vec![2, 2, 2, 10, 0]);
    }

    #[test]
    fn eviction_is_by_insertion_order_not_value() {
        let mut s = RollingSmoother::default();
        for c in [9, 1, 1, 1, 1] {
            s.push(c);
        }
        // The first (largest) sample leaves, not the smallest.
        assert_eq!(s.push(1), 1);
        assert_eq!(window(&s), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut s = RollingSmoother::new(3);
        for c in 0..50 {
            s.push(c);
            assert!(s.len() <= 3);
        }
        assert_eq!(window(&s), vec![47, 48, 49]);
    }

    #[test]
    fn mean_rounds_down() {
        let mut s = RollingSmoother::default();
        s.push(1);
        assert_eq!(s.push(2), 1);
    }

    #[test]
    fn large_counts_do_not_overflow() {
        let mut s = RollingSmoother::default();
        for _ in 0..5 {
            s.push(u32::MAX);
        }
        assert_eq!(s.current(), Some(u32::MAX));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut s = RollingSmoother::new(0);
        assert_eq!(s.capacity(), 1);
        s.push(4);
        assert_eq!(s.push(8), 8);
    }
}
