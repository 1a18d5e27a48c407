//! Market-side analytics: growable series storage, metric conversion, series
//! propagation and windowing, plus the single-consumer tick ingestion loop.

pub mod bootstrap;
pub mod calendar;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod manager;
pub mod metric;
pub mod observer;
pub mod search;
pub mod series_buffer;
pub mod timeseries;
pub mod view;

pub use error::MarketError;
pub use series_buffer::SeriesBuffer;
