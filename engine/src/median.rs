//! RunningMedianTracker
//!
//! Append-only running median over a stream of weights.
//! Responsibilities:
//!   • Keep a max-heap of the lower half and a min-heap of the upper half
//!   • Rebalance after every insert so the lower half holds the extra element
//!   • Remember inserted values in order (used to reseed subset trackers),
//!     optionally only the most recent ones
//!
//! There is no removal; windowed variants are built by starting a fresh
//! tracker from the tail of an existing one.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// `f64` with a total order, so it can live in a `BinaryHeap`.
#[derive(Debug, Clone, Copy)]
struct OrdF64(f64);

impl PartialEq for OrdF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunningMedianTracker {
    low: BinaryHeap<OrdF64>,
    high: BinaryHeap<Reverse<OrdF64>>,
    values: Vec<f64>,
    retain: Option<usize>,
}

impl RunningMedianTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut tracker = Self::new();
        for v in values {
            tracker.insert(*v);
        }
        tracker
    }

    /// Remember only the last `n` inserted values. The median still covers
    /// every insert.
    pub fn retaining(mut self, n: usize) -> Self {
        self.retain = Some(n);
        self.trim();
        self
    }

    fn trim(&mut self) {
        match self.retain {
            Some(n) if self.values.len() > n => {
                self.values.drain(..self.values.len() - n);
            }
            _ => {}
        }
    }

    pub fn insert(&mut self, value: f64) {
        self.values.push(value);
        self.trim();

        match self.low.peek() {
            Some(top) if value > top.0 => self.high.push(Reverse(OrdF64(value))),
            _ => self.low.push(OrdF64(value)),
        }

        if self.low.len() > self.high.len() + 1 {
            if let Some(v) = self.low.pop() {
                self.high.push(Reverse(v));
            }
        } else if self.high.len() > self.low.len() {
            if let Some(Reverse(v)) = self.high.pop() {
                self.low.push(v);
            }
        }
    }

    /// `None` until something has been inserted.
    pub fn median(&self) -> Option<f64> {
        let lo = self.low.peek()?.0;
        if self.low.len() > self.high.len() {
            return Some(lo);
        }
        let hi = self.high.peek()?.0.0;
        Some(0.5 * (lo + hi))
    }

    /// Remembered values, oldest first.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Last `n` inserted values.
    pub fn tail(&self, n: usize) -> &[f64] {
        &self.values[self.values.len().saturating_sub(n)..]
    }

    /// Number of inserts covered by the median.
    pub fn len(&self) -> usize {
        self.low.len() + self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }
}

/// Median of a slice (mean of the middle pair on even lengths).
pub fn median_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_has_no_median() {
        assert_eq!(RunningMedianTracker::new().median(), None);
        assert_eq!(median_of(&[]), None);
    }

    #[test]
    fn first_value_seeds_the_low_heap() {
        let mut t = RunningMedianTracker::new();
        t.insert(50.0);
        assert_eq!(t.median(), Some(50.0));
        assert_eq!(t.low.len(), 1);
        assert!(t.high.is_empty());
    }

    #[test]
    fn odd_and_even_counts() {
        let mut t = RunningMedianTracker::from_values(&[5.0, 1.0, 3.0]);
        assert_eq!(t.median(), Some(3.0));

        t.insert(10.0);
        assert_eq!(t.median(), Some(4.0));
        assert_eq!(t.values(), &[5.0, 1.0, 3.0, 10.0]);
        assert_eq!(t.tail(2), &[3.0, 10.0]);
        assert_eq!(t.tail(10).len(), 4);
    }

    #[test]
    fn retained_history_is_capped_but_median_is_not() {
        let mut t = RunningMedianTracker::from_values(&[1.0, 2.0, 3.0]).retaining(2);
        assert_eq!(t.values(), &[2.0, 3.0]);

        for v in [10.0, 20.0, 30.0, 40.0] {
            t.insert(v);
        }
        assert_eq!(t.values(), &[30.0, 40.0]);
        assert_eq!(t.len(), 7);
        assert_eq!(t.median(), Some(10.0));
    }

    #[test]
    fn duplicates_are_balanced() {
        let t = RunningMedianTracker::from_values(&[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(t.median(), Some(2.0));
        assert!(t.low.len().abs_diff(t.high.len()) <= 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn matches_sorted_reference(values in proptest::collection::vec(-1e6f64..1e6, 1..200)) {
                let mut t = RunningMedianTracker::new();
                for (i, v) in values.iter().enumerate() {
                    t.insert(*v);

                    let expected = median_of(&values[..=i]);
                    prop_assert_eq!(t.median(), expected);
                    prop_assert!(t.low.len() >= t.high.len());
                    prop_assert!(t.low.len() - t.high.len() <= 1);
                }
            }
        }
    }
}
