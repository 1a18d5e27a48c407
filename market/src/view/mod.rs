//! Windowed projections of series for a requested view range.

mod limits;
mod series_view;

pub use limits::{Axis, DataLimits, Limit, LimitSource};
pub use series_view::{Bounds, SeriesView, ViewRange};
