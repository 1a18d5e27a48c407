use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::metric::{MetricConverter, Scale};
use crate::search::{find_idx_filters, searchsorted_right};
use crate::series_buffer::finite_fold;
use crate::timeseries::TimeSeries;

/// Requested view window `[[xlo, xhi], [ylo, yhi]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRange {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl ViewRange {
    pub fn new(x: [f64; 2], y: [f64; 2]) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Bounds {
    /// Bounds of `(x, y)` ignoring `NaN`. `None` when either axis has no value.
    pub fn of(x: &[f64], y: &[f64]) -> Option<Self> {
        Some(Self {
            xmin: finite_fold(x, f64::min)?,
            xmax: finite_fold(x, f64::max)?,
            ymin: finite_fold(y, f64::min)?,
            ymax: finite_fold(y, f64::max)?,
        })
    }

    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            xmin: self.xmin.min(other.xmin),
            xmax: self.xmax.max(other.xmax),
            ymin: self.ymin.min(other.ymin),
            ymax: self.ymax.max(other.ymax),
        }
    }
}

/// Windowed projection of a series.
///
/// Holds the source `(x, y)` it was last fed, the processed (displayed) arrays,
/// and the bounds/last point of the processed window. Owns its own converter
/// so rebasing a view never touches the underlying series.
#[derive(Debug, Clone)]
pub struct SeriesView {
    name: String,
    converter: MetricConverter,

    bounds: Option<Bounds>,
    last: Option<(f64, f64)>,

    x_source: Vec<f64>,
    y_source: Vec<f64>,
    x_processed: Vec<f64>,
    y_processed: Vec<f64>,

    last_idx_min: Option<usize>,
    last_idx_max: Option<usize>,

    /// Rebase to the first point of every requested window.
    normalise_to_view: bool,

    /// Absolute index into the full series where an active subset starts.
    subset_idx: Option<usize>,

    view_range: Option<ViewRange>,
}

impl SeriesView {
    pub fn new(name: impl Into<String>, converter: MetricConverter) -> Self {
        Self {
            name: name.into(),
            converter,
            bounds: None,
            last: None,
            x_source: Vec::new(),
            y_source: Vec::new(),
            x_processed: Vec::new(),
            y_processed: Vec::new(),
            last_idx_min: None,
            last_idx_max: None,
            normalise_to_view: false,
            subset_idx: None,
            view_range: None,
        }
    }

    /// View over the full data of `series`, starting from its display converter.
    pub fn from_series(series: &TimeSeries) -> Self {
        let mut view = Self::new(series.name(), series.engine().display_converter());
        let (x, y) = series.data();
        view.update_from_series(x, y);
        view
    }

    pub fn with_normalise_to_view(mut self, on: bool) -> Self {
        self.normalise_to_view = on;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn converter(&self) -> &MetricConverter {
        &self.converter
    }

    pub fn limits(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn last_values(&self) -> Option<(f64, f64)> {
        self.last
    }

    pub fn source_series(&self) -> (&[f64], &[f64]) {
        (&self.x_source, &self.y_source)
    }

    pub fn processed_series(&self) -> (&[f64], &[f64]) {
        (&self.x_processed, &self.y_processed)
    }

    pub fn last_idx_range(&self) -> (Option<usize>, Option<usize>) {
        (self.last_idx_min, self.last_idx_max)
    }

    pub fn view_range(&self) -> Option<ViewRange> {
        self.view_range
    }

    pub fn is_subset(&self) -> bool {
        self.subset_idx.is_some()
    }

    /// Replace the source and re-derive processed arrays, bounds and last point.
    pub fn update_from_series(&mut self, x: &[f64], y: &[f64]) {
        self.x_source = x.to_vec();
        self.y_source = y.to_vec();
        self.reprocess();
    }

    fn reprocess(&mut self) {
        self.x_processed = self.x_source.clone();
        self.y_processed = self.converter.display_all(&self.y_source);

        self.bounds = Bounds::of(&self.x_processed, &self.y_processed);
        self.last = self
            .x_processed
            .last()
            .copied()
            .zip(self.y_processed.last().copied());
    }

    /// Project `(x, y)` onto `range`. Returns the selected `[lo, hi)`.
    ///
    /// The window starts one point before `range.x[0]` and stops before the
    /// first point at or after `range.x[1]`.
    pub fn update_from_view_range(&mut self, x: &[f64], y: &[f64], range: ViewRange) -> (usize, usize) {
        self.view_range = Some(range);

        let len = x.len().min(y.len());
        let (lo, hi) = find_idx_filters(&x[..len], range.x[0], range.x[1]);
        let hi = hi.max(lo).min(len);
        let lo = lo.min(hi);

        self.last_idx_min = Some(lo);
        self.last_idx_max = Some(hi);

        if self.normalise_to_view && lo < len {
            self.converter.change_static_param(y[lo]);
        }

        self.update_from_series(&x[lo..hi], &y[lo..hi]);
        (lo, hi)
    }

    /// Re-project from the last window start through the end of `(x, y)`.
    pub fn update_on_last_idx_min(&mut self, x: &[f64], y: &[f64]) {
        let len = x.len().min(y.len());
        let lo = self.last_idx_min.unwrap_or(0).min(len);
        self.update_from_series(&x[lo..len], &y[lo..len]);
    }

    /// Swap the display scale and recompute from the held source.
    pub fn scale(&mut self, scale: Scale) -> Result<(), MarketError> {
        self.converter.change_scale(scale)?;
        self.reprocess();
        Ok(())
    }

    pub fn change_static_param(&mut self, value: f64) {
        self.converter.change_static_param(value);
        self.reprocess();
    }

    /// Refresh after the underlying series grew, honouring an active subset.
    ///
    /// Bounds are extended incrementally with the new last point.
    pub fn update_from_update_response(&mut self, x: &[f64], y: &[f64]) {
        let len = x.len().min(y.len());
        let start = self.subset_idx.unwrap_or(0).min(len);

        self.x_source = x[start..len].to_vec();
        self.y_source = y[start..len].to_vec();
        self.x_processed = self.x_source.clone();
        self.y_processed = self.converter.display_all(&self.y_source);

        if let (Some(px), Some(py)) = (self.x_processed.last().copied(), self.y_processed.last().copied()) {
            self.update_from_point(px, py);
        }
    }

    /// Extend bounds with one point and make it the last point.
    pub fn update_from_point(&mut self, x: f64, y: f64) {
        self.last = Some((x, y));

        let mut b = match self.bounds {
            Some(b) => b,
            None if x.is_nan() || y.is_nan() => return,
            None => Bounds {
                xmin: x,
                xmax: x,
                ymin: y,
                ymax: y,
            },
        };

        if x > b.xmax {
            b.xmax = x;
        } else if x < b.xmin {
            b.xmin = x;
        }
        if y > b.ymax {
            b.ymax = y;
        } else if y < b.ymin {
            b.ymin = y;
        }
        self.bounds = Some(b);
    }

    /// Drop everything before `timestamp` and re-anchor on the new first value.
    ///
    /// Both changes happen in this one call; bounds are recomputed only after
    /// the anchor moved.
    pub fn make_subset(&mut self, timestamp: f64) {
        let idx = searchsorted_right(&self.x_source, timestamp).saturating_sub(1);
        let idx = idx.min(self.x_source.len());

        self.x_source.drain(..idx);
        self.y_source.drain(..idx.min(self.y_source.len()));

        if let Some(first) = self.y_source.first() {
            self.converter.change_static_param(*first);
        }

        let absolute = self.subset_idx.unwrap_or(0) + idx;
        self.subset_idx = Some(absolute);
        self.last_idx_min = Some(absolute);

        self.reprocess();
    }

    /// Adopt another view's processed window and bounds.
    pub fn copy_metrics_from(&mut self, other: &SeriesView) {
        self.bounds = other.bounds;
        self.last = other.last;
        self.x_processed = other.x_processed.clone();
        self.y_processed = other.y_processed.clone();
    }
}
