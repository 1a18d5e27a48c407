//! Leader/follower analytics: running medians, theoretical weight calibration,
//! drift detection and the per-group wiring onto market series.

pub mod error;
pub mod group;
pub mod median;
pub mod registry;
pub mod weights;

pub use error::EngineError;
pub use group::{AnalyticsGroup, build_analytics_groups};
pub use median::RunningMedianTracker;
