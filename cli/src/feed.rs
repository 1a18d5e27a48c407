//! Seeded synthetic market.
//!
//! Every step one leading instrument takes a random move; each of its followers
//! answers a fraction of a second later with a configured share of that move.
//! The share is applied in return-against-first-price units, so the ratio of
//! follower to leader delta is exactly the configured weight. A small fraction
//! of answers use a random weight instead.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use corelib::config::AnalyticsConfig;
use corelib::{HistoricalRow, Tick};
use market::feed::TickFeed;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

/// Synthetic seconds between two market steps.
pub const STEP_SECS: f64 = 1.0;

/// Delay of the first follower answer; later followers answer a little later.
const LAG_SECS: f64 = 0.1;

/// Weights assigned to (leader, follower) pairs.
const WEIGHT_CHOICES: [f64; 3] = [50.0, 25.0, 100.0];

#[derive(Debug, Clone, Copy)]
struct Shape {
    /// Typical leader move, in percent of price.
    move_pct: f64,
    /// Half spread, in percent of price.
    half_spread_pct: f64,
    /// Probability that a follower answers off its configured weight.
    off_weight: f64,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            move_pct: 0.05,
            half_spread_pct: 0.005,
            off_weight: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
struct Reaction {
    follower: String,
    weight: f64,
}

#[derive(Debug)]
pub struct SyntheticMarket {
    rng: StdRng,
    clock: f64,
    shape: Shape,
    init: BTreeMap<String, f64>,
    prices: BTreeMap<String, f64>,
    drivers: Vec<String>,
    reactions: BTreeMap<String, Vec<Reaction>>,
}

impl SyntheticMarket {
    /// One instrument per configured name; every group leader drives its followers.
    pub fn from_config(config: &AnalyticsConfig, seed: u64, start: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut prices = BTreeMap::new();
        for name in config.instruments() {
            let base: f64 = rng.gen_range(1_000.0..20_000.0);
            prices.insert(name, base.round());
        }

        let mut reactions: BTreeMap<String, Vec<Reaction>> = BTreeMap::new();
        for group in config.groups.values() {
            for leader in group.leaders() {
                let list = reactions.entry(leader.clone()).or_default();
                for follower in group.followers() {
                    if list.iter().any(|r| &r.follower == follower) {
                        continue;
                    }
                    let weight = WEIGHT_CHOICES[rng.gen_range(0..WEIGHT_CHOICES.len())];
                    list.push(Reaction {
                        follower: follower.clone(),
                        weight,
                    });
                }
            }
        }

        Self {
            rng,
            clock: start,
            shape: Shape::default(),
            init: prices.clone(),
            prices,
            drivers: reactions.keys().cloned().collect(),
            reactions,
        }
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn price(&self, name: &str) -> Option<f64> {
        self.prices.get(name).copied()
    }

    /// Configured weight of `follower` against `leader`.
    pub fn weight(&self, leader: &str, follower: &str) -> Option<f64> {
        self.reactions
            .get(leader)?
            .iter()
            .find(|r| r.follower == follower)
            .map(|r| r.weight)
    }

    /// Scale every configured weight, e.g. to force a regime change.
    pub fn scale_weights(&mut self, factor: f64) {
        for r in self.reactions.values_mut().flatten() {
            r.weight *= factor;
        }
    }

    fn tick(&self, name: &str, timestamp: f64) -> Option<Tick> {
        let price = self.price(name)?;
        let half = price * self.shape.half_spread_pct / 100.0;
        Some(Tick::new(name, timestamp, price - half, price + half))
    }

    /// Advance the clock by one step and return the ticks it produced, in time order.
    pub fn step(&mut self) -> Vec<Tick> {
        self.clock += STEP_SECS;
        if self.drivers.is_empty() {
            return Vec::new();
        }

        let leader = self.drivers[self.rng.gen_range(0..self.drivers.len())].clone();
        let (Some(&l_init), Some(&l_prev)) = (self.init.get(&leader), self.prices.get(&leader)) else {
            return Vec::new();
        };

        let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let size = self.rng.gen_range(0.5..1.5);
        let l_new = l_prev * (1.0 + sign * size * self.shape.move_pct / 100.0);
        self.prices.insert(leader.clone(), l_new);

        let mut ticks = Vec::new();
        ticks.extend(self.tick(&leader, self.clock));

        let reactions = self.reactions.get(&leader).cloned().unwrap_or_default();
        for (j, reaction) in reactions.iter().enumerate() {
            let (Some(&f_init), Some(&f_prev)) =
                (self.init.get(&reaction.follower), self.prices.get(&reaction.follower))
            else {
                continue;
            };

            let weight = if self.rng.gen_bool(self.shape.off_weight) {
                self.rng.gen_range(5.0..95.0)
            } else {
                reaction.weight
            };
            let f_new = f_prev + weight / 100.0 * (l_new - l_prev) * f_init / l_init;
            self.prices.insert(reaction.follower.clone(), f_new);

            let lag = LAG_SECS * (1.0 + 0.2 * j as f64);
            ticks.extend(self.tick(&reaction.follower, self.clock + lag));
        }

        ticks.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        ticks
    }

    /// Seed history: one row per instrument at the current clock, then `steps` steps.
    pub fn history(&mut self, steps: usize) -> BTreeMap<String, Vec<HistoricalRow>> {
        let mut rows: BTreeMap<String, Vec<HistoricalRow>> = BTreeMap::new();

        let names: Vec<String> = self.prices.keys().cloned().collect();
        for name in &names {
            if let Some(t) = self.tick(name, self.clock) {
                rows.entry(name.clone()).or_default().push(row(&t));
            }
        }

        for _ in 0..steps {
            for t in self.step() {
                rows.entry(t.instrument.clone()).or_default().push(row(&t));
            }
        }
        rows
    }
}

fn row(tick: &Tick) -> HistoricalRow {
    HistoricalRow::new(tick.timestamp, tick.bid, tick.ask)
}

/// `TickFeed` over a `SyntheticMarket`, paced in wall-clock time.
pub struct SyntheticFeed {
    market: Mutex<SyntheticMarket>,
    pace: Duration,
    max_steps: Option<usize>,
    regime_shift: Option<(usize, f64)>,
}

impl SyntheticFeed {
    pub fn new(market: SyntheticMarket, pace: Duration) -> Self {
        Self {
            market: Mutex::new(market),
            pace,
            max_steps: None,
            regime_shift: None,
        }
    }

    /// Stop after `steps` market steps instead of running until the receiver is gone.
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Scale every weight by `factor` once `step` steps have been streamed.
    pub fn with_regime_shift(mut self, step: Option<usize>, factor: f64) -> Self {
        self.regime_shift = step.map(|s| (s, factor));
        self
    }
}

#[async_trait]
impl TickFeed for SyntheticFeed {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn run(&self, tx: Sender<Tick>) -> anyhow::Result<()> {
        let mut steps = 0usize;
        loop {
            if self.max_steps.is_some_and(|max| steps >= max) {
                info!(steps, "synthetic feed exhausted");
                return Ok(());
            }

            let ticks = {
                let mut market = self.market.lock().await;
                match self.regime_shift {
                    Some((at, factor)) if at == steps => {
                        market.scale_weights(factor);
                        info!(step = steps, factor, "synthetic regime shift");
                    }
                    _ => {}
                }
                market.step()
            };
            steps += 1;

            for tick in ticks {
                if tx.send(tick).await.is_err() {
                    debug!(steps, "synthetic receiver dropped");
                    return Ok(());
                }
            }

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::config::GroupConfig;
    use engine::build_analytics_groups;
    use market::bootstrap::TimestampUnit;
    use market::manager::MarketManager;

    fn eurex() -> AnalyticsConfig {
        let mut groups = BTreeMap::new();
        groups.insert("EUREX".to_string(), GroupConfig::new(&["US500"], &["DE40", "EU50"]));
        AnalyticsConfig { groups }
    }

    #[test]
    fn same_seed_same_market() {
        let mut a = SyntheticMarket::from_config(&eurex(), 11, 0.0);
        let mut b = SyntheticMarket::from_config(&eurex(), 11, 0.0);

        for _ in 0..50 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn followers_answer_after_the_leader() {
        let mut m = SyntheticMarket::from_config(&eurex(), 3, 0.0);
        let ticks = m.step();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].instrument, "US500");
        assert!(ticks[1..].iter().all(|t| t.timestamp > ticks[0].timestamp));
        assert!(ticks.iter().all(|t| t.timestamp < STEP_SECS + 1.0));
    }

    #[test]
    fn history_covers_every_instrument_in_time_order() {
        let mut m = SyntheticMarket::from_config(&eurex(), 5, 100.0);
        let history = m.history(20);

        assert_eq!(history.len(), 3);
        for rows in history.values() {
            assert!(rows.len() >= 2);
            assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }
        assert_eq!(m.clock(), 120.0);
    }

    #[test]
    fn calibration_recovers_configured_weight() {
        let cfg = eurex();
        let mut m = SyntheticMarket::from_config(&cfg, 42, 0.0);
        let history = m.history(400);

        let mut mm = MarketManager::new();
        for (name, rows) in &history {
            mm.register_instrument(name, rows, TimestampUnit::Seconds).unwrap();
        }
        let groups = build_analytics_groups(&mm, &cfg).unwrap();

        let expected = m.weight("US500", "DE40").unwrap();
        let de = groups[0].follower("DE40").unwrap();
        let theo = de.borrow().metrics().theo("US500").cloned().unwrap();
        assert!((theo.main - expected).abs() < 1e-6);
    }

    #[test]
    fn scale_weights_applies_to_every_pair() {
        let mut m = SyntheticMarket::from_config(&eurex(), 9, 0.0);
        let before = m.weight("US500", "EU50").unwrap();
        m.scale_weights(0.5);
        assert_eq!(m.weight("US500", "EU50"), Some(before * 0.5));
    }

    #[tokio::test]
    async fn bounded_feed_closes_its_channel() {
        let m = SyntheticMarket::from_config(&eurex(), 1, 0.0);
        let feed = SyntheticFeed::new(m, Duration::ZERO).with_max_steps(10);

        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let task = tokio::spawn(async move { feed.run(tx).await });

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        task.await.unwrap().unwrap();
        assert_eq!(received, 30);
    }
}
