//! SeriesBuffer
//!
//! Append-optimized numeric storage backing every time series.
//!
//! Responsibilities:
//!   • Keep a logical length `n` separate from the allocated capacity
//!   • Double the capacity before a write that would overflow it
//!   • Keep the unused tail filled with `NaN`
//!
//! Reads only ever expose `[0, n)`. The tail is never part of a slice, a
//! min/max or an iterator.

use crate::error::MarketError;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBuffer {
    /// Backing storage. `data.len()` is the capacity.
    data: Vec<f64>,

    /// Logical length.
    n: usize,
}

impl SeriesBuffer {
    pub const GROWTH: usize = 2;

    pub fn new() -> Self {
        Self::from_slice(&[])
    }

    /// Build a buffer holding `values`, with capacity `max(1, 2 * len)`.
    pub fn from_slice(values: &[f64]) -> Self {
        let n = values.len();
        let cap = (Self::GROWTH * n).max(1);

        let mut data = Vec::with_capacity(cap);
        data.extend_from_slice(values);
        data.resize(cap, f64::NAN);

        Self { data, n }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn append(&mut self, value: f64) {
        if self.n >= self.data.len() {
            self.grow();
        }

        self.data[self.n] = value;
        self.n += 1;
    }

    /// Re-append the current last value.
    pub fn push_last(&mut self) {
        let v = self.last();
        self.append(v);
    }

    fn grow(&mut self) {
        let new_cap = (self.data.len() * Self::GROWTH).max(1);
        self.data.resize(new_cap, f64::NAN);
    }

    /// Element `n - 1`, or element `0` when empty (which is the `NaN` sentinel
    /// for a buffer that never held data).
    pub fn last(&self) -> f64 {
        match self.n {
            0 => self.data[0],
            n => self.data[n - 1],
        }
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.logical().get(idx).copied()
    }

    pub fn logical(&self) -> &[f64] {
        &self.data[..self.n]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.logical().iter().copied()
    }

    /// Logical sub-slice `[lo, hi)`, clamped to `[0, n)`.
    pub fn slice(&self, lo: usize, hi: usize) -> &[f64] {
        let hi = hi.min(self.n);
        let lo = lo.min(hi);
        &self.data[lo..hi]
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.logical().to_vec()
    }

    /// Overwrite element `idx` without changing the logical length.
    pub fn insert_at(&mut self, idx: usize, value: f64) -> Result<(), MarketError> {
        if idx >= self.n {
            return Err(MarketError::IndexOutOfRange {
                index: idx,
                len: self.n,
            });
        }
        self.data[idx] = value;
        Ok(())
    }

    /// Overwrite `[lo, hi)` in place. The logical length is unchanged.
    pub fn insert_range(&mut self, values: &[f64], lo: usize, hi: usize) -> Result<(), MarketError> {
        if lo > hi || hi > self.n {
            return Err(MarketError::InvalidRange {
                lo,
                hi,
                len: self.n,
            });
        }
        if values.len() != hi - lo {
            return Err(MarketError::LengthMismatch {
                expected: hi - lo,
                actual: values.len(),
            });
        }

        self.data[lo..hi].copy_from_slice(values);
        Ok(())
    }

    /// Minimum over `[0, n)`, skipping `NaN`. `None` when no finite value exists.
    pub fn min(&self) -> Option<f64> {
        finite_fold(self.logical(), f64::min)
    }

    /// Maximum over `[0, n)`, skipping `NaN`.
    pub fn max(&self) -> Option<f64> {
        finite_fold(self.logical(), f64::max)
    }
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<f64>> for SeriesBuffer {
    fn from(values: Vec<f64>) -> Self {
        Self::from_slice(&values)
    }
}

impl FromIterator<f64> for SeriesBuffer {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let values: Vec<f64> = iter.into_iter().collect();
        Self::from_slice(&values)
    }
}

/// Fold over the non-NaN values of `values`.
pub(crate) fn finite_fold(values: &[f64], f: fn(f64, f64) -> f64) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn appends_are_visible_in_order_and_capacity_never_shrinks(
            seed in prop::collection::vec(-1e6f64..1e6, 0..8),
            appends in prop::collection::vec(-1e6f64..1e6, 0..200),
        ) {
            let mut b = SeriesBuffer::from_slice(&seed);
            let mut expected = seed.clone();
            let mut cap = b.capacity();

            for v in appends {
                b.append(v);
                expected.push(v);

                prop_assert_eq!(b.logical(), expected.as_slice());
                prop_assert!(b.capacity() >= b.len());
                prop_assert!(b.capacity() == cap || b.capacity() == cap * SeriesBuffer::GROWTH);
                cap = b.capacity();
            }

            let reference_min = expected.iter().copied().reduce(f64::min);
            let reference_max = expected.iter().copied().reduce(f64::max);
            prop_assert_eq!(b.min(), reference_min);
            prop_assert_eq!(b.max(), reference_max);
        }
    }
}
