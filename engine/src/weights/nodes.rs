//! Leader and follower nodes.
//!
//! A node tracks the percentage return of its instrument against the first
//! historical price and the change of that return on every tick. Leaders keep
//! a short history of `(timestamp, delta)` so a follower can pair its move with
//! the leader's move "as of" the follower's timestamp.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use corelib::Quote;
use market::observer::Observer;
use market::timeseries::ParentTimeSeries;
use serde::Serialize;
use tracing::{debug, warn};

use super::WeightMetrics;
use super::calibration::pct_return_deltas;

/// Response points kept per leader before the oldest are dropped.
pub const RESPONSE_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeState {
    pub init_price: f64,
    pub last_timestamp: f64,
    pub last_price: f64,
    pub last_return: f64,
    pub last_delta: f64,
}

impl NodeState {
    /// State at the end of a price history; `None` when the history is empty.
    pub fn from_history(timestamps: &[f64], prices: &[f64]) -> Option<Self> {
        let (returns, deltas) = pct_return_deltas(prices);
        Some(Self {
            init_price: *prices.first()?,
            last_timestamp: *timestamps.last()?,
            last_price: *prices.last()?,
            last_return: *returns.last()?,
            last_delta: *deltas.last()?,
        })
    }

    /// Move to `mid` at `timestamp`; returns the new delta.
    fn advance(&mut self, timestamp: f64, mid: f64) -> f64 {
        let ret = 100.0 * (mid / self.init_price - 1.0);
        let delta = ret - self.last_return;

        self.last_timestamp = timestamp;
        self.last_price = mid;
        self.last_return = ret;
        self.last_delta = delta;
        delta
    }
}

#[derive(Debug, Clone)]
pub struct Leader {
    name: String,
    state: NodeState,
    history: VecDeque<(f64, f64)>,
    /// Seconds of history kept behind the newest entry.
    horizon: f64,
}

impl Leader {
    pub fn new(name: impl Into<String>, state: NodeState, horizon: f64) -> Self {
        Self {
            name: name.into(),
            state,
            history: VecDeque::new(),
            horizon,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn update_from_quote(&mut self, quote: &Quote) {
        let delta = self.state.advance(quote.timestamp, quote.mid());
        self.history.push_back((quote.timestamp, delta));

        let cutoff = quote.timestamp - self.horizon;
        while self.history.len() > 1 && self.history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.history.pop_front();
        }
    }

    /// Last `(timestamp, delta)` strictly before `follower_ts`.
    ///
    /// Falls back to the current state when no history entry precedes it.
    pub fn last_values(&self, follower_ts: f64) -> (f64, f64) {
        let idx = self.history.partition_point(|(ts, _)| *ts < follower_ts);
        match idx.checked_sub(1).and_then(|i| self.history.get(i)) {
            Some(&(ts, delta)) => (ts, delta),
            None => (self.state.last_timestamp, self.state.last_delta),
        }
    }
}

impl Observer<ParentTimeSeries> for Leader {
    fn on_update(&mut self, parent: &ParentTimeSeries) {
        if let Some(quote) = parent.last_quote() {
            self.update_from_quote(&quote);
        }
    }
}

/// One paired move recorded by a follower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponsePoint {
    pub timestamp: f64,
    pub leader_timestamp: f64,
    pub follower_delta: f64,
    pub leader_delta: f64,
}

pub struct Follower {
    name: String,
    state: NodeState,
    leaders: Vec<(String, Rc<RefCell<Leader>>)>,
    leaders_last_ts: HashMap<String, f64>,
    metrics: WeightMetrics,
    responses: BTreeMap<String, VecDeque<ResponsePoint>>,
}

impl Follower {
    pub fn new(name: impl Into<String>, state: NodeState, metrics: WeightMetrics) -> Self {
        Self {
            name: name.into(),
            state,
            leaders: Vec::new(),
            leaders_last_ts: HashMap::new(),
            metrics,
            responses: BTreeMap::new(),
        }
    }

    /// Pair with `leader`. Only leader moves newer than its current state count.
    pub fn add_leader(&mut self, leader: Rc<RefCell<Leader>>) {
        let (name, last_ts) = {
            let l = leader.borrow();
            (l.name().to_string(), l.state().last_timestamp)
        };
        self.leaders_last_ts.insert(name.clone(), last_ts);
        self.responses.entry(name.clone()).or_default();
        self.leaders.push((name, leader));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn metrics(&self) -> &WeightMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut WeightMetrics {
        &mut self.metrics
    }

    pub fn responses(&self, leader: &str) -> Vec<ResponsePoint> {
        self.responses
            .get(leader)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn update_from_quote(&mut self, quote: &Quote) {
        let ts = quote.timestamp;
        let follower_delta = self.state.advance(ts, quote.mid());

        for (name, leader) in &self.leaders {
            let Ok(leader) = leader.try_borrow() else {
                warn!(follower = %self.name, leader = %name, "leader busy; pairing skipped");
                continue;
            };
            let (leader_ts, leader_delta) = leader.last_values(ts);
            drop(leader);

            let usable = |d: f64| d != 0.0 && d.is_finite();
            if !usable(leader_delta) || !usable(follower_delta) {
                continue;
            }

            let last = self.leaders_last_ts.get(name).copied().unwrap_or(f64::NEG_INFINITY);
            if leader_ts <= last {
                continue;
            }
            self.leaders_last_ts.insert(name.clone(), leader_ts);

            let responses = self.responses.entry(name.clone()).or_default();
            responses.push_back(ResponsePoint {
                timestamp: ts,
                leader_timestamp: leader_ts,
                follower_delta,
                leader_delta,
            });
            if responses.len() > RESPONSE_CAP {
                responses.pop_front();
            }

            match self
                .metrics
                .process_response(name, leader_ts, leader_delta, ts, follower_delta)
            {
                Ok(Some(outcome)) => {
                    debug!(follower = %self.name, leader = %name, weight = outcome.weight, "pair processed")
                }
                Ok(None) => {}
                Err(e) => warn!(follower = %self.name, error = %e, "pair rejected"),
            }
        }
    }
}

impl Observer<ParentTimeSeries> for Follower {
    fn on_update(&mut self, parent: &ParentTimeSeries) {
        if let Some(quote) = parent.last_quote() {
            self.update_from_quote(&quote);
        }
    }
}

impl std::fmt::Debug for Follower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Follower")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("leaders", &self.leaders.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{TheoWeight, WeightSettings};

    fn state(ts: f64, price: f64) -> NodeState {
        NodeState {
            init_price: 100.0,
            last_timestamp: ts,
            last_price: price,
            last_return: 100.0 * (price / 100.0 - 1.0),
            last_delta: 0.0,
        }
    }

    fn leader() -> Leader {
        Leader::new("US500", state(99.0, 100.0), 60.0)
    }

    #[test]
    fn node_state_from_history() {
        let s = NodeState::from_history(&[1.0, 2.0], &[100.0, 102.0]).unwrap();
        assert_eq!(s.init_price, 100.0);
        assert_eq!(s.last_timestamp, 2.0);
        assert!((s.last_return - 2.0).abs() < 1e-9);
        assert!((s.last_delta - 2.0).abs() < 1e-9);
        assert_eq!(NodeState::from_history(&[], &[]), None);
    }

    #[test]
    fn last_values_is_as_of_not_nearest() {
        let mut l = leader();
        l.update_from_quote(&Quote::new(100.0, 101.0, 101.0));
        l.update_from_quote(&Quote::new(101.0, 103.0, 103.0));

        let (ts, d) = l.last_values(100.9);
        assert_eq!(ts, 100.0);
        assert!((d - 1.0).abs() < 1e-9);

        // Equal timestamps are not "before".
        assert_eq!(l.last_values(101.0).0, 100.0);
        assert_eq!(l.last_values(500.0).0, 101.0);
    }

    #[test]
    fn last_values_falls_back_to_current_state() {
        let mut l = leader();
        l.update_from_quote(&Quote::new(100.0, 101.0, 101.0));

        let (ts, _) = l.last_values(50.0);
        assert_eq!(ts, 100.0);
    }

    #[test]
    fn history_is_pruned_to_horizon() {
        let mut l = Leader::new("US500", state(0.0, 100.0), 10.0);
        for i in 0..30 {
            l.update_from_quote(&Quote::new(i as f64, 100.0 + i as f64, 100.0 + i as f64));
        }
        assert_eq!(l.history_len(), 11);
        assert_eq!(l.last_values(25.5).0, 25.0);
    }

    #[test]
    fn follower_forwards_fresh_pairs_once() {
        let leader = Rc::new(RefCell::new(leader()));

        let mut wm = WeightMetrics::new("DE40", WeightSettings::default());
        wm.add_leader_with_theo("US500", TheoWeight::new(50.0));
        let mut f = Follower::new("DE40", state(99.0, 100.0), wm);
        f.add_leader(Rc::clone(&leader));

        leader.borrow_mut().update_from_quote(&Quote::new(100.0, 102.0, 102.0));
        f.update_from_quote(&Quote::new(100.1, 101.0, 101.0));
        // Same leader move again: not newer, not forwarded.
        f.update_from_quote(&Quote::new(100.2, 102.0, 102.0));

        assert_eq!(f.responses("US500").len(), 1);
        assert_eq!(f.metrics().running_median("US500"), Some(50.0));
    }
}
