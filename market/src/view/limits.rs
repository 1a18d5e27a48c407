//! Aggregate limits over a collection of views.
//!
//! These are limits of the *data*, not of the viewport: `view` is the union of
//! the visible items' windowed bounds, `visible` the union of the visible
//! items' full-dataset bounds, and `all` covers every item regardless of
//! visibility.

use super::series_view::{Bounds, SeriesView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Limit {
    pub xmin: Option<f64>,
    pub xmax: Option<f64>,
    pub ymin: Option<f64>,
    pub ymax: Option<f64>,
}

impl Limit {
    pub fn from_bounds(b: Option<Bounds>) -> Self {
        let mut l = Self::default();
        l.set(b);
        l
    }

    /// Widen to include `b`.
    pub fn check(&mut self, b: Bounds) {
        self.xmin = Some(self.xmin.map_or(b.xmin, |v| v.min(b.xmin)));
        self.xmax = Some(self.xmax.map_or(b.xmax, |v| v.max(b.xmax)));
        self.ymin = Some(self.ymin.map_or(b.ymin, |v| v.min(b.ymin)));
        self.ymax = Some(self.ymax.map_or(b.ymax, |v| v.max(b.ymax)));
    }

    pub fn set(&mut self, b: Option<Bounds>) {
        match b {
            Some(b) => {
                self.xmin = Some(b.xmin);
                self.xmax = Some(b.xmax);
                self.ymin = Some(b.ymin);
                self.ymax = Some(b.ymax);
            }
            None => self.reset(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Some(Bounds {
            xmin: self.xmin?,
            xmax: self.xmax?,
            ymin: self.ymin?,
            ymax: self.ymax?,
        })
    }
}

/// Bounds contributed by one plotted item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitSource {
    /// Bounds of the item's current window.
    pub view: Option<Bounds>,
    /// Bounds of the item's whole dataset.
    pub dataset: Option<Bounds>,
    pub visible: bool,
}

impl LimitSource {
    pub fn from_views(window: &SeriesView, dataset: &SeriesView, visible: bool) -> Self {
        Self {
            view: window.limits(),
            dataset: dataset.limits(),
            visible,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataLimits {
    pub view: Limit,
    pub visible: Limit,
    pub all: Limit,
}

impl DataLimits {
    pub fn new(first: &LimitSource) -> Self {
        Self {
            view: Limit::from_bounds(first.view),
            visible: Limit::from_bounds(first.dataset),
            all: Limit::from_bounds(first.dataset),
        }
    }

    /// Widen with one more item.
    pub fn check_set_limits(&mut self, item: &LimitSource) {
        if item.visible {
            if let Some(b) = item.view {
                self.view.check(b);
            }
            if let Some(b) = item.dataset {
                self.visible.check(b);
            }
        }
        if let Some(b) = item.dataset {
            self.all.check(b);
        }
    }

    /// Recompute all three régimes from scratch over `items`.
    pub fn calculate_collection<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a LimitSource>,
    {
        self.reset_limits();
        for item in items {
            self.check_set_limits(item);
        }
    }

    pub fn reset_limits(&mut self) {
        self.view.reset();
        self.visible.reset();
        self.all.reset();
    }

    pub fn set_axis_view_limit(&mut self, axis: Axis, min: f64, max: f64) {
        match axis {
            Axis::X => {
                self.view.xmin = Some(min);
                self.view.xmax = Some(max);
            }
            Axis::Y => {
                self.view.ymin = Some(min);
                self.view.ymax = Some(max);
            }
        }
    }

    /// Set the view limits, clamped to the visible dataset where known.
    pub fn set_view_limits(&mut self, b: Bounds) {
        let clamp_lo = |v: f64, lo: Option<f64>| lo.map_or(v, |lo| v.max(lo));
        let clamp_hi = |v: f64, hi: Option<f64>| hi.map_or(v, |hi| v.min(hi));

        self.view.set(Some(Bounds {
            xmin: clamp_lo(b.xmin, self.visible.xmin),
            xmax: clamp_hi(b.xmax, self.visible.xmax),
            ymin: clamp_lo(b.ymin, self.visible.ymin),
            ymax: clamp_hi(b.ymax, self.visible.ymax),
        }));
    }

    /// Whether the view limits on `axis` lie inside `[lb, ub]`.
    pub fn view_within_bounds(&self, axis: Axis, lb: f64, ub: f64) -> bool {
        let (lo, hi) = match axis {
            Axis::X => (self.view.xmin, self.view.xmax),
            Axis::Y => (self.view.ymin, self.view.ymax),
        };
        lo.is_none_or(|v| v >= lb) && hi.is_none_or(|v| v <= ub)
    }

    /// Pad `[min, max]` by `buffer` times its width on both sides.
    pub fn calculate_limits_from_buffer(min: f64, max: f64, buffer: f64) -> (f64, f64) {
        let d = buffer * (max - min);
        (min - d, max + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Bounds {
        Bounds {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    fn src(view: Bounds, dataset: Bounds, visible: bool) -> LimitSource {
        LimitSource {
            view: Some(view),
            dataset: Some(dataset),
            visible,
        }
    }

    #[test]
    fn collection_separates_visible_and_hidden_items() {
        let items = [
            src(b(5.0, 10.0, 1.0, 2.0), b(0.0, 10.0, 0.0, 3.0), true),
            src(b(6.0, 9.0, -1.0, 4.0), b(0.0, 12.0, -2.0, 5.0), true),
            src(b(0.0, 100.0, -50.0, 50.0), b(-10.0, 100.0, -60.0, 60.0), false),
        ];

        let mut limits = DataLimits::default();
        limits.calculate_collection(&items);

        assert_eq!(limits.view.bounds(), Some(b(5.0, 10.0, -1.0, 4.0)));
        assert_eq!(limits.visible.bounds(), Some(b(0.0, 12.0, -2.0, 5.0)));
        assert_eq!(limits.all.bounds(), Some(b(-10.0, 100.0, -60.0, 60.0)));
    }

    #[test]
    fn nothing_visible_leaves_view_unset() {
        let items = [src(b(0.0, 1.0, 0.0, 1.0), b(0.0, 1.0, 0.0, 1.0), false)];
        let mut limits = DataLimits::default();
        limits.calculate_collection(&items);

        assert_eq!(limits.view.bounds(), None);
        assert!(limits.all.bounds().is_some());
    }

    #[test]
    fn set_view_limits_clamps_to_visible_data() {
        let mut limits = DataLimits::new(&src(b(0.0, 1.0, 0.0, 1.0), b(0.0, 10.0, -5.0, 5.0), true));
        limits.set_view_limits(b(-3.0, 20.0, -1.0, 1.0));

        assert_eq!(limits.view.bounds(), Some(b(0.0, 10.0, -1.0, 1.0)));
        assert!(limits.view_within_bounds(Axis::X, 0.0, 10.0));
        assert!(!limits.view_within_bounds(Axis::Y, 0.0, 1.0));
    }

    #[test]
    fn axis_view_limit_and_buffer_padding() {
        let mut limits = DataLimits::default();
        limits.set_axis_view_limit(Axis::Y, 2.0, 4.0);
        assert_eq!(limits.view.ymin, Some(2.0));
        assert_eq!(limits.view.xmin, None);

        assert_eq!(DataLimits::calculate_limits_from_buffer(0.0, 10.0, 0.1), (-1.0, 11.0));
    }
}
