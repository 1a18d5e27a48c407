//! Time series propagation.
//!
//! `ParentTimeSeries` is the source of truth for one instrument (raw bid/ask).
//! Derived `TimeSeries` and `SyntheticTimeSeries` subscribe to parents through
//! weak observer registrations and recompute their values on every update.

mod derived;
mod parent;
mod synthetic;

pub use derived::TimeSeries;
pub use parent::{ParentTimeSeries, SeriesSnapshot, ValueField};
pub use synthetic::SyntheticTimeSeries;
