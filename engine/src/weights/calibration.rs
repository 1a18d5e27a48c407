//! Offline calibration of the theoretical weight.
//!
//! Each leader tick with a usable delta is matched to the follower ticks in
//! `[ts_l, ts_l + dt]`. A barrier (`previous leader tick + dt`) stops one
//! follower tick from being counted against several leader ticks. The first
//! match gives `weight = 100 * d_f / d_l`. Unambiguous matches (exactly one
//! follower tick) feed a histogram keyed by the weight rounded to 0.1; the
//! most frequent buckets give the theoretical weight and its ratios.

use std::collections::HashMap;

use market::metric::functions::round_to;
use market::search::{searchsorted_left, searchsorted_right};
use serde::Serialize;
use tracing::debug;

use super::{TheoWeight, WeightSettings};
use crate::error::EngineError;
use crate::median::median_of;

/// Number of histogram buckets that contribute to the theoretical weight.
pub const HISTOGRAM_TOP: usize = 6;

/// Leader/follower time offsets are floored to this step (seconds).
const OFFSET_STEP: f64 = 0.005;

/// Timestamps with the matching mid prices of one instrument.
#[derive(Debug, Clone, Copy)]
pub struct PriceHistory<'a> {
    pub timestamps: &'a [f64],
    pub prices: &'a [f64],
}

impl<'a> PriceHistory<'a> {
    pub fn new(timestamps: &'a [f64], prices: &'a [f64]) -> Self {
        Self { timestamps, prices }
    }

    fn len(&self) -> usize {
        self.timestamps.len().min(self.prices.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightBucket {
    /// Weight rounded to one decimal.
    pub weight: f64,
    pub count: usize,
    /// Median leader -> follower delay of the bucket's matches.
    pub median_offset: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub theo: TheoWeight,
    /// Every historical weight, in leader-tick order.
    pub weights: Vec<f64>,
    /// Buckets ranked by count, most frequent first.
    pub histogram: Vec<WeightBucket>,
    /// Start index of every replay window that failed the consistency test.
    pub change_points: Vec<usize>,
    /// Canonical weights of the replayed windows.
    pub canonical: Vec<f64>,
}

/// Percentage returns against the first price, and their first differences.
///
/// The first delta is `NaN`.
pub fn pct_return_deltas(prices: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let Some(&init) = prices.first() else {
        return (Vec::new(), Vec::new());
    };

    let returns: Vec<f64> = prices.iter().map(|p| 100.0 * (p / init - 1.0)).collect();
    let deltas = std::iter::once(f64::NAN)
        .chain(returns.windows(2).map(|w| w[1] - w[0]))
        .collect();
    (returns, deltas)
}

pub fn calibrate(
    leader_name: &str,
    follower_name: &str,
    leader: PriceHistory<'_>,
    follower: PriceHistory<'_>,
    settings: &WeightSettings,
) -> Result<Calibration, EngineError> {
    let insufficient = || EngineError::InsufficientHistory {
        leader: leader_name.to_string(),
        follower: follower_name.to_string(),
    };

    let (_, d_leader) = pct_return_deltas(&leader.prices[..leader.len()]);
    let (_, d_follower) = pct_return_deltas(&follower.prices[..follower.len()]);
    let follower_ts = &follower.timestamps[..follower.len()];

    let mut weights = Vec::new();
    let mut buckets: Vec<(f64, Vec<f64>)> = Vec::new();
    let mut bucket_idx: HashMap<i64, usize> = HashMap::new();

    let mut barrier = 0.0;
    for (i, &ts_l) in leader.timestamps[..leader.len()].iter().enumerate() {
        let d_l = d_leader[i];
        if d_l.is_nan() {
            continue;
        }

        let past_barrier = ts_l > barrier;
        barrier = ts_l + settings.dt;
        if !past_barrier || d_l == 0.0 {
            continue;
        }

        let lo = searchsorted_left(follower_ts, ts_l);
        let hi = searchsorted_right(follower_ts, ts_l + settings.dt);
        if lo >= hi {
            continue;
        }

        let weight = 100.0 * d_follower[lo] / d_l;
        if weight.is_nan() {
            continue;
        }
        weights.push(weight);

        if hi - lo == 1 {
            let key = round_to(weight, 1);
            let offset = ((follower_ts[lo] - ts_l) / OFFSET_STEP).floor() * OFFSET_STEP;
            let idx = *bucket_idx.entry((key * 10.0).round() as i64).or_insert_with(|| {
                buckets.push((key, Vec::new()));
                buckets.len() - 1
            });
            buckets[idx].1.push(offset);
        }
    }

    let mut histogram: Vec<WeightBucket> = buckets
        .into_iter()
        .map(|(weight, offsets)| WeightBucket {
            weight,
            count: offsets.len(),
            median_offset: median_of(&offsets),
        })
        .collect();
    histogram.sort_by(|a, b| b.count.cmp(&a.count));

    let ranked: Vec<f64> = histogram.iter().take(HISTOGRAM_TOP).map(|b| b.weight).collect();
    let theo = TheoWeight::from_ranked(&ranked).ok_or_else(insufficient)?;

    let (change_points, canonical) = replay(&weights, &theo, settings);

    debug!(
        leader = leader_name,
        follower = follower_name,
        main = theo.main,
        ratios = theo.ratio_map.len(),
        weights = weights.len(),
        change_points = change_points.len(),
        "calibrated theoretical weight"
    );

    Ok(Calibration {
        theo,
        weights,
        histogram,
        change_points,
        canonical,
    })
}

/// Classify historical weights in consecutive windows of `subset_k`.
///
/// Only windows that end strictly before the last weight are replayed.
fn replay(weights: &[f64], theo: &TheoWeight, settings: &WeightSettings) -> (Vec<usize>, Vec<f64>) {
    let k = settings.subset_k.max(1);
    let mut change_points = Vec::new();
    let mut canonical = Vec::with_capacity(weights.len());

    let mut start = 0;
    let mut end = k;
    while end < weights.len() {
        let mut n_true = 0;
        for w in &weights[start..end] {
            let (consistent, value) = theo.classify(*w, settings.dw);
            n_true += usize::from(consistent);
            canonical.push(value);
        }
        if 2 * n_true < k {
            change_points.push(start);
        }
        start = end;
        end += k;
    }

    (change_points, canonical)
}
