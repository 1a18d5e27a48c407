//! WeightMetrics
//!
//! Streaming drift detector for one follower against each of its leaders.
//! Responsibilities:
//!   • Turn paired return deltas into weights and classify them
//!   • Fire weight-changed events when a full window is mostly inconsistent
//!   • Keep a running median and a rolling subset median per leader
//!   • Publish the windowed median of canonical weights after every update
//!
//! All state is owned by the single consumer; handlers run synchronously in
//! the tick's call stack.

use std::collections::BTreeMap;

use market::metric::functions::round_to;
use tracing::{debug, info};

use super::{Calibration, TheoWeight, WeightSettings};
use crate::error::EngineError;
use crate::median::{RunningMedianTracker, median_of};
use crate::registry::{
    BreakSource, HandlerRegistry, ValueUpdated, ValueUpdatedHandler, WeightChanged, WeightChangedHandler,
};

/// Values carried over from a closed subset into the next one.
const SUBSET_SEED: usize = 2;

/// What one accepted update did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    pub weight: f64,
    pub canonical: f64,
    pub consistent: bool,
    /// A full consistency window closed below the threshold.
    pub break_fired: bool,
    /// Median shift between the closed subset and the previous one, when it exceeded `dw`.
    pub subset_shift: Option<f64>,
    pub running_median: Option<f64>,
    /// Median of the last `n_max` canonical weights.
    pub window_median: Option<f64>,
}

#[derive(Debug, Clone)]
struct LeaderTrack {
    theo: TheoWeight,
    running: RunningMedianTracker,
    subset: RunningMedianTracker,
    subset_prev: RunningMedianTracker,
    consistency: Vec<bool>,
    /// Last `n_max` canonical weights.
    canonical: Vec<f64>,
    counter: usize,
    change_points: Vec<usize>,
    breaks: Vec<f64>,
}

impl LeaderTrack {
    fn fresh(theo: TheoWeight) -> Self {
        Self {
            theo,
            running: RunningMedianTracker::new().retaining(SUBSET_SEED),
            subset: RunningMedianTracker::new(),
            subset_prev: RunningMedianTracker::new(),
            consistency: Vec::new(),
            canonical: Vec::new(),
            counter: 0,
            change_points: Vec::new(),
            breaks: Vec::new(),
        }
    }

    fn seeded(cal: Calibration, settings: &WeightSettings) -> Self {
        let running = RunningMedianTracker::from_values(&cal.weights).retaining(SUBSET_SEED);
        let subset = RunningMedianTracker::from_values(running.tail(SUBSET_SEED));
        let subset_k = settings.subset_k;

        let n = cal.weights.len();
        let prev_end = n.saturating_sub(SUBSET_SEED);
        let prev_start = n.saturating_sub(SUBSET_SEED + subset_k);
        let subset_prev = RunningMedianTracker::from_values(&cal.weights[prev_start..prev_end]);

        let mut canonical = cal.canonical;
        keep_last(&mut canonical, settings.n_max);

        Self {
            theo: cal.theo,
            counter: subset.len(),
            running,
            subset,
            subset_prev,
            consistency: Vec::new(),
            canonical,
            change_points: cal.change_points,
            breaks: Vec::new(),
        }
    }

    /// Close the current subset: compare medians, then reseed.
    fn roll_subset(&mut self, dw: f64) -> Option<f64> {
        let shift = match (self.subset.median(), self.subset_prev.median()) {
            (Some(now), Some(prev)) if (now - prev).abs() > dw => Some(now - prev),
            _ => None,
        };

        let seed = RunningMedianTracker::from_values(self.subset.tail(SUBSET_SEED));
        self.subset_prev = std::mem::replace(&mut self.subset, seed);
        self.counter = 0;
        shift
    }
}

#[derive(Debug)]
pub struct WeightMetrics {
    follower: String,
    settings: WeightSettings,
    tracks: BTreeMap<String, LeaderTrack>,
    handlers: HandlerRegistry,
}

impl WeightMetrics {
    pub fn new(follower: impl Into<String>, settings: WeightSettings) -> Self {
        Self {
            follower: follower.into(),
            settings,
            tracks: BTreeMap::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    /// Track `leader` from a historical calibration.
    pub fn add_leader(&mut self, leader: &str, calibration: Calibration) {
        let track = LeaderTrack::seeded(calibration, &self.settings);
        self.tracks.insert(leader.to_string(), track);
    }

    /// Track `leader` with a known theoretical weight and no history.
    pub fn add_leader_with_theo(&mut self, leader: &str, theo: TheoWeight) {
        self.tracks.insert(leader.to_string(), LeaderTrack::fresh(theo));
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    pub fn on_weight_changed(&mut self, leader: &str, handler: WeightChangedHandler) {
        self.handlers.on_weight_changed(leader, handler);
    }

    pub fn on_value_updated(&mut self, leader: &str, handler: ValueUpdatedHandler) {
        self.handlers.on_value_updated(leader, handler);
    }

    pub fn follower(&self) -> &str {
        &self.follower
    }

    pub fn settings(&self) -> &WeightSettings {
        &self.settings
    }

    pub fn leaders(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    pub fn theo(&self, leader: &str) -> Option<&TheoWeight> {
        self.tracks.get(leader).map(|t| &t.theo)
    }

    pub fn running_median(&self, leader: &str) -> Option<f64> {
        self.tracks.get(leader)?.running.median()
    }

    pub fn window_median(&self, leader: &str) -> Option<f64> {
        let track = self.tracks.get(leader)?;
        median_of(&track.canonical)
    }

    /// Timestamps of every streaming structural break for `leader`.
    pub fn breaks(&self, leader: &str) -> &[f64] {
        self.tracks.get(leader).map(|t| t.breaks.as_slice()).unwrap_or(&[])
    }

    /// Replay windows that failed during calibration.
    pub fn change_points(&self, leader: &str) -> &[usize] {
        self.tracks.get(leader).map(|t| t.change_points.as_slice()).unwrap_or(&[])
    }

    /// Pending entries of the current consistency window.
    pub fn pending(&self, leader: &str) -> usize {
        self.tracks.get(leader).map_or(0, |t| t.consistency.len())
    }

    /// Apply the time-tolerance gate, then update.
    pub fn process_response(
        &mut self,
        leader: &str,
        leader_ts: f64,
        leader_delta: f64,
        follower_ts: f64,
        follower_delta: f64,
    ) -> Result<Option<UpdateOutcome>, EngineError> {
        if !self.tracks.contains_key(leader) {
            return Err(self.unknown(leader));
        }
        if follower_ts - leader_ts >= self.settings.dt {
            debug!(follower = %self.follower, leader, leader_ts, follower_ts, "pair outside dt");
            return Ok(None);
        }
        self.update(leader, leader_ts, leader_delta, follower_delta)
    }

    /// Feed one paired observation.
    ///
    /// Degenerate pairs (zero or non-finite leader delta, non-finite weight)
    /// are skipped and return `Ok(None)`.
    pub fn update(
        &mut self,
        leader: &str,
        timestamp: f64,
        leader_delta: f64,
        follower_delta: f64,
    ) -> Result<Option<UpdateOutcome>, EngineError> {
        if !self.tracks.contains_key(leader) {
            return Err(self.unknown(leader));
        }
        if leader_delta == 0.0 || !leader_delta.is_finite() {
            return Ok(None);
        }

        let s = self.settings;
        let weight = 100.0 * round_to(follower_delta / leader_delta, s.rounding);
        if !weight.is_finite() {
            return Ok(None);
        }

        let Some(track) = self.tracks.get_mut(leader) else {
            return Ok(None);
        };

        let (consistent, canonical) = track.theo.classify(weight, s.dw);
        track.consistency.push(consistent);
        track.canonical.push(canonical);
        keep_last(&mut track.canonical, s.n_max);

        let mut break_fired = false;
        if track.consistency.len() >= s.n_max {
            let n_true = track.consistency.iter().filter(|c| **c).count();
            if 2 * n_true < s.n_max {
                break_fired = true;
                track.breaks.push(timestamp);
            }
            track.consistency.clear();
        }

        track.running.insert(weight);
        track.subset.insert(weight);
        track.counter += 1;

        let subset_shift = if track.counter >= s.subset_k.max(1) {
            track.roll_subset(s.dw)
        } else {
            None
        };

        let outcome = UpdateOutcome {
            weight,
            canonical,
            consistent,
            break_fired,
            subset_shift,
            running_median: track.running.median(),
            window_median: median_of(&track.canonical),
        };

        debug!(
            follower = %self.follower,
            leader,
            ts = timestamp,
            weight,
            canonical,
            consistent,
            "weight updated"
        );

        if break_fired {
            info!(follower = %self.follower, leader, ts = timestamp, "structural break");
            self.handlers.dispatch_weight_changed(&WeightChanged {
                follower: self.follower.clone(),
                leader: leader.to_string(),
                timestamp,
                source: BreakSource::Consistency,
            });
        }

        if let Some(shift) = subset_shift {
            info!(follower = %self.follower, leader, ts = timestamp, shift, "subset median moved");
            if s.subset_break_dispatch {
                self.handlers.dispatch_weight_changed(&WeightChanged {
                    follower: self.follower.clone(),
                    leader: leader.to_string(),
                    timestamp,
                    source: BreakSource::SubsetMedian,
                });
            }
        }

        if let Some(median) = outcome.window_median {
            self.handlers.dispatch_value_updated(&ValueUpdated {
                follower: self.follower.clone(),
                leader: leader.to_string(),
                timestamp,
                median,
            });
        }

        Ok(Some(outcome))
    }

    fn unknown(&self, leader: &str) -> EngineError {
        EngineError::UnknownLeader {
            follower: self.follower.clone(),
            leader: leader.to_string(),
        }
    }
}

fn keep_last(values: &mut Vec<f64>, n: usize) {
    if values.len() > n {
        values.drain(..values.len() - n);
    }
}
