//! End-of-run summary printed as JSON.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use engine::AnalyticsGroup;
use market::dispatcher::{DispatchStats, StopReason};
use market::manager::MarketManager;
use market::metric::{MetricConverter, MetricEngine, Scale};
use market::search::searchsorted_right;
use market::timeseries::{ParentTimeSeries, ValueField};
use market::view::SeriesView;
use serde::Serialize;

/// Event totals shared with the registered handlers.
#[derive(Debug, Default)]
pub struct EventCounters {
    pub weight_changed: AtomicU64,
    pub value_updated: AtomicU64,
    pub handler_panics: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct EventTotals {
    pub weight_changed: u64,
    pub value_updated: u64,
    pub handler_panics: u64,
}

impl From<&EventCounters> for EventTotals {
    fn from(c: &EventCounters) -> Self {
        Self {
            weight_changed: c.weight_changed.load(Ordering::Relaxed),
            value_updated: c.value_updated.load(Ordering::Relaxed),
            handler_panics: c.handler_panics.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DispatchSummary {
    pub stop_reason: &'static str,
    pub cycles: u64,
    pub applied: u64,
    pub unknown: u64,
    pub unresolved: u64,
}

#[derive(Debug, Serialize)]
pub struct InstrumentReport {
    pub name: String,
    pub live_ticks: u64,
    pub last_tick_ts: Option<f64>,
    pub rebase_ts: Option<f64>,
    /// Percentage move of the mid since the rebase point.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PairReport {
    pub group: String,
    pub leader: String,
    pub follower: String,
    pub theo_weight: Option<f64>,
    pub running_median: Option<f64>,
    pub window_median: Option<f64>,
    pub breaks: Vec<f64>,
    pub responses: usize,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub trace_id: String,
    pub dispatch: DispatchSummary,
    pub events: EventTotals,
    pub instruments: Vec<InstrumentReport>,
    pub pairs: Vec<PairReport>,
}

impl RunReport {
    pub fn collect(
        trace_id: String,
        (stats, reason): (DispatchStats, StopReason),
        manager: &MarketManager,
        groups: &[AnalyticsGroup],
        rebase: &HashMap<String, f64>,
        events: &Arc<EventCounters>,
    ) -> Self {
        let instruments = manager
            .instruments()
            .map(|name| {
                let feed = manager.stats(name).unwrap_or_default();
                let rebase_ts = rebase.get(name).copied();
                let change_pct = match (manager.get(name), rebase_ts) {
                    (Some(series), Some(ts)) => change_since(&series.borrow(), ts),
                    _ => None,
                };
                InstrumentReport {
                    name: name.to_string(),
                    live_ticks: feed.ticks,
                    last_tick_ts: feed.last_tick_ts,
                    rebase_ts,
                    change_pct,
                }
            })
            .collect();

        let mut pairs = Vec::new();
        for group in groups {
            for f_name in group.follower_names() {
                let Some(follower) = group.follower(f_name) else {
                    continue;
                };
                let follower = follower.borrow();
                let metrics = follower.metrics();
                for l_name in group.leader_names() {
                    pairs.push(PairReport {
                        group: group.title().to_string(),
                        leader: l_name.to_string(),
                        follower: f_name.to_string(),
                        theo_weight: metrics.theo(l_name).map(|t| t.main),
                        running_median: metrics.running_median(l_name),
                        window_median: metrics.window_median(l_name),
                        breaks: metrics.breaks(l_name).to_vec(),
                        responses: follower.responses(l_name).len(),
                    });
                }
            }
        }

        Self {
            trace_id,
            dispatch: DispatchSummary {
                stop_reason: match reason {
                    StopReason::Shutdown => "shutdown",
                    StopReason::FeedClosed => "feed_closed",
                },
                cycles: stats.cycles,
                applied: stats.applied,
                unknown: stats.unknown,
                unresolved: stats.unresolved,
            },
            events: EventTotals::from(events.as_ref()),
            instruments,
            pairs,
        }
    }
}

/// Percentage move of the mid from `rebase_ts` to the last tick.
fn change_since(series: &ParentTimeSeries, rebase_ts: f64) -> Option<f64> {
    let idx = searchsorted_right(series.timestamps(), rebase_ts).saturating_sub(1);
    let anchor = series.quote_at(idx)?.mid();

    let converter = MetricConverter::price(anchor).with_scale(Scale::Pct).ok()?;
    let child = series
        .create_child(rebase_ts, f64::INFINITY, ValueField::Mid, MetricEngine::Direct(converter))
        .ok()?;
    SeriesView::from_series(&child).last_values().map(|(_, pct)| pct)
}
