//! Analytics group setup.
//!
//! Responsibilities:
//!   • Validate the whole configuration up front (malformed config is fatal)
//!   • Skip, with a warning, groups whose instruments are not all registered
//!     or whose history cannot be calibrated
//!   • Calibrate every (leader, follower) pair and build the nodes
//!   • Subscribe nodes to their parent series only once the group is complete

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use common::logger::child_span;
use corelib::config::{AnalyticsConfig, GroupConfig};
use market::manager::{MarketManager, SharedSeries};
use market::observer::ObserverId;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::registry::{EventKind, ValueUpdatedHandler, WeightChangedHandler};
use crate::weights::{
    Follower, Leader, NodeState, PriceHistory, WeightMetrics, WeightSettings, calibrate,
};

/// The live leader/follower wiring of one configured group.
pub struct AnalyticsGroup {
    title: String,
    settings: WeightSettings,
    leaders: BTreeMap<String, Rc<RefCell<Leader>>>,
    followers: BTreeMap<String, Rc<RefCell<Follower>>>,
    subscriptions: Vec<(SharedSeries, ObserverId)>,
}

impl AnalyticsGroup {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn settings(&self) -> &WeightSettings {
        &self.settings
    }

    pub fn leader_names(&self) -> impl Iterator<Item = &str> {
        self.leaders.keys().map(String::as_str)
    }

    pub fn follower_names(&self) -> impl Iterator<Item = &str> {
        self.followers.keys().map(String::as_str)
    }

    pub fn leader(&self, name: &str) -> Option<Rc<RefCell<Leader>>> {
        self.leaders.get(name).cloned()
    }

    pub fn follower(&self, name: &str) -> Option<Rc<RefCell<Follower>>> {
        self.followers.get(name).cloned()
    }

    /// Register `handler` for breaks against `leader` on every follower.
    ///
    /// Returns the number of followers it was attached to.
    pub fn on_weight_changed(&self, leader: &str, handler: WeightChangedHandler) -> usize {
        self.attach(leader, |wm| wm.on_weight_changed(leader, Arc::clone(&handler)))
    }

    /// Register `handler` for median updates against `leader` on every follower.
    pub fn on_value_updated(&self, leader: &str, handler: ValueUpdatedHandler) -> usize {
        self.attach(leader, |wm| wm.on_value_updated(leader, Arc::clone(&handler)))
    }

    pub fn set_panic_hook(&self, hook: Arc<dyn Fn(EventKind, &str) + Send + Sync + 'static>) {
        for follower in self.followers.values() {
            follower
                .borrow_mut()
                .metrics_mut()
                .handlers_mut()
                .set_panic_hook(Arc::clone(&hook));
        }
    }

    fn attach<F: Fn(&mut WeightMetrics)>(&self, leader: &str, f: F) -> usize {
        if !self.leaders.contains_key(leader) {
            return 0;
        }
        for follower in self.followers.values() {
            f(follower.borrow_mut().metrics_mut());
        }
        self.followers.len()
    }

    /// Unsubscribe every node from its parent series.
    pub fn detach(&mut self) {
        for (series, id) in self.subscriptions.drain(..) {
            series.borrow_mut().unsubscribe(id);
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

impl std::fmt::Debug for AnalyticsGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsGroup")
            .field("title", &self.title)
            .field("leaders", &self.leaders.keys().collect::<Vec<_>>())
            .field("followers", &self.followers.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Build every configured group that the manager can support.
pub fn build_analytics_groups(
    manager: &MarketManager,
    config: &AnalyticsConfig,
) -> Result<Vec<AnalyticsGroup>, EngineError> {
    config.validate()?;

    let mut groups = Vec::with_capacity(config.groups.len());
    for (title, cfg) in &config.groups {
        let span = child_span("analytics_group");
        span.record("group", title.as_str());
        let _guard = span.enter();

        match build_group(manager, title, cfg) {
            Ok(group) => {
                info!(
                    group = %title,
                    leaders = group.leaders.len(),
                    followers = group.followers.len(),
                    "analytics group ready"
                );
                groups.push(group);
            }
            Err(e @ (EngineError::MissingInstrument { .. } | EngineError::InsufficientHistory { .. })) => {
                warn!(group = %title, error = %e, "analytics group skipped");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(groups)
}

/// Timestamps and mids of one registered instrument.
struct History {
    timestamps: Vec<f64>,
    mids: Vec<f64>,
}

impl History {
    fn view(&self) -> PriceHistory<'_> {
        PriceHistory::new(&self.timestamps, &self.mids)
    }
}

fn build_group(manager: &MarketManager, title: &str, cfg: &GroupConfig) -> Result<AnalyticsGroup, EngineError> {
    let settings = WeightSettings::from(cfg);

    let mut series: BTreeMap<String, SharedSeries> = BTreeMap::new();
    let mut histories: BTreeMap<String, History> = BTreeMap::new();
    for name in cfg.instruments() {
        let shared = manager.get(name).ok_or_else(|| EngineError::MissingInstrument {
            group: title.to_string(),
            instrument: name.clone(),
        })?;
        {
            let s = shared.borrow();
            histories.insert(
                name.clone(),
                History {
                    timestamps: s.timestamps().to_vec(),
                    mids: s.mids(),
                },
            );
        }
        series.insert(name.clone(), shared);
    }

    let node_state = |name: &str| {
        histories
            .get(name)
            .and_then(|h| NodeState::from_history(&h.timestamps, &h.mids))
            .ok_or_else(|| EngineError::MissingInstrument {
                group: title.to_string(),
                instrument: name.to_string(),
            })
    };

    let mut leaders = BTreeMap::new();
    for name in cfg.leaders() {
        let leader = Leader::new(name.as_str(), node_state(name)?, settings.history_horizon);
        leaders.insert(name.clone(), Rc::new(RefCell::new(leader)));
    }

    let mut followers = BTreeMap::new();
    for f_name in cfg.followers() {
        let mut metrics = WeightMetrics::new(f_name.as_str(), settings);

        for l_name in cfg.leaders() {
            let (Some(lh), Some(fh)) = (histories.get(l_name), histories.get(f_name)) else {
                continue;
            };
            let calibration = calibrate(l_name, f_name, lh.view(), fh.view(), &settings)?;
            metrics.add_leader(l_name, calibration);
        }

        let mut follower = Follower::new(f_name.as_str(), node_state(f_name)?, metrics);
        for l_name in cfg.leaders() {
            if let Some(leader) = leaders.get(l_name) {
                follower.add_leader(Rc::clone(leader));
            }
        }
        followers.insert(f_name.clone(), Rc::new(RefCell::new(follower)));
    }

    // Fully built: wire into the parent series.
    let mut subscriptions = Vec::new();
    for (name, leader) in &leaders {
        if let Some(s) = series.get(name) {
            let id = s.borrow_mut().subscribe(leader);
            subscriptions.push((Rc::clone(s), id));
        }
    }
    for (name, follower) in &followers {
        if let Some(s) = series.get(name) {
            let id = s.borrow_mut().subscribe(follower);
            subscriptions.push((Rc::clone(s), id));
        }
    }

    Ok(AnalyticsGroup {
        title: title.to_string(),
        settings,
        leaders,
        followers,
        subscriptions,
    })
}
