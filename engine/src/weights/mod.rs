//! Leader/follower weight analytics.
//!
//! Responsibilities:
//!   • Calibrate a theoretical weight per (leader, follower) pair from history
//!   • Classify streaming weights and detect structural breaks
//!   • Maintain leader/follower return-delta state from parent series ticks

pub mod calibration;
pub mod metrics;
pub mod nodes;
pub mod theo;

pub use calibration::{Calibration, PriceHistory, WeightBucket, calibrate, pct_return_deltas};
pub use metrics::{UpdateOutcome, WeightMetrics};
pub use nodes::{Follower, Leader, NodeState};
pub use theo::TheoWeight;

use corelib::config::GroupConfig;

/// Seconds of leader history kept for "as of" lookups.
pub const DEFAULT_HISTORY_HORIZON: f64 = 60.0;

/// Tolerances and window sizes for one analytics group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSettings {
    pub dt: f64,
    pub dw: f64,
    /// Decimal places applied to `follower_delta / leader_delta`.
    pub rounding: u32,
    pub n_max: usize,
    pub subset_k: usize,
    pub subset_break_dispatch: bool,
    pub history_horizon: f64,
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self::from(&GroupConfig::new(&[], &[]))
    }
}

impl From<&GroupConfig> for WeightSettings {
    fn from(cfg: &GroupConfig) -> Self {
        Self {
            dt: cfg.tolerance.dt,
            dw: cfg.tolerance.dw,
            rounding: cfg.rounding.weight,
            n_max: cfg.n_max,
            subset_k: cfg.subset_k,
            subset_break_dispatch: cfg.subset_break_dispatch,
            history_horizon: DEFAULT_HISTORY_HORIZON,
        }
    }
}
