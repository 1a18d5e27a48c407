pub mod cli;
mod feed;
mod report;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{NaiveTime, Utc};
use clap::Parser;
use common::logger::{TraceId, init_logger, root_span};
use engine::registry::{EventKind, ValueUpdated, WeightChanged};
use engine::{AnalyticsGroup, build_analytics_groups};
use market::bootstrap::TimestampUnit;
use market::calendar::{FixedSessionCalendar, Session, rebase_points};
use market::dispatcher::{DispatcherConfig, TickDispatcher};
use market::feed::TickFeed;
use market::manager::MarketManager;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, error, info, warn};

use cli::*;
use feed::{STEP_SECS, SyntheticFeed, SyntheticMarket};
use report::{EventCounters, RunReport};

/// Session close used for the default rebase points (UTC).
const SESSION_CLOSE_HOUR: u32 = 21;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger("weightwatch", cli.json_logs);

    let trace_id = TraceId::new();
    let span = root_span("weightwatch", &trace_id);
    run(cli, trace_id).instrument(span).await
}

async fn run(cli: Cli, trace_id: TraceId) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    info!(groups = config.groups.len(), "Starting weightwatch");

    // History ends at "now" so the live stream continues from the present.
    let start = Utc::now().timestamp() as f64 - cli.history_ticks as f64 * STEP_SECS;
    let mut market = SyntheticMarket::from_config(&config, cli.seed, start);
    let history = market.history(cli.history_ticks);

    let mut manager = MarketManager::new();
    for (name, rows) in &history {
        manager.register_instrument(name, rows, TimestampUnit::Seconds)?;
    }
    info!(instruments = manager.len(), steps = cli.history_ticks, "history registered");

    let rebase = default_rebase_points(&manager, market.clock());

    let mut groups = build_analytics_groups(&manager, &config)?;
    if groups.is_empty() {
        anyhow::bail!("no analytics group could be built");
    }
    let events = Arc::new(EventCounters::default());
    attach_event_logging(&groups, &events);

    let (tick_tx, tick_rx) = mpsc::channel(cli.queue_capacity.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);

    let feed = SyntheticFeed::new(market, cli.pace())
        .with_regime_shift(cli.regime_shift_step, cli.regime_shift_factor);
    let feed_task = start_feed(feed, tick_tx);
    let stopper = start_stopper(cli.duration(), stop_tx);

    let dispatcher = TickDispatcher::new(
        tick_rx,
        stop_rx,
        DispatcherConfig {
            cadence: cli.cadence(),
            ..DispatcherConfig::default()
        },
    );
    let outcome = dispatcher.run(&mut manager).await;

    stopper.abort();
    feed_task.abort();

    let report = RunReport::collect(trace_id.to_string(), outcome, &manager, &groups, &rebase, &events);
    for group in &mut groups {
        group.detach();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn default_rebase_points(manager: &MarketManager, at: f64) -> HashMap<String, f64> {
    let close = NaiveTime::from_hms_opt(SESSION_CLOSE_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let calendar = FixedSessionCalendar::new().with_fallback(Session::weekdays(close));

    let names: Vec<&str> = manager.instruments().collect();
    let points = rebase_points(&calendar, &names, at);
    debug!(points = points.len(), "default rebase points");
    points
}

fn attach_event_logging(groups: &[AnalyticsGroup], events: &Arc<EventCounters>) {
    for group in groups {
        let leaders: Vec<String> = group.leader_names().map(str::to_string).collect();
        for leader in &leaders {
            let counters = Arc::clone(events);
            group.on_weight_changed(
                leader,
                Arc::new(move |ev: &WeightChanged| {
                    counters.weight_changed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        follower = %ev.follower,
                        leader = %ev.leader,
                        ts = ev.timestamp,
                        source = ?ev.source,
                        "weight changed"
                    );
                }),
            );

            let counters = Arc::clone(events);
            group.on_value_updated(
                leader,
                Arc::new(move |ev: &ValueUpdated| {
                    counters.value_updated.fetch_add(1, Ordering::Relaxed);
                    debug!(follower = %ev.follower, leader = %ev.leader, median = ev.median, "value updated");
                }),
            );
        }

        let counters = Arc::clone(events);
        group.set_panic_hook(Arc::new(move |kind: EventKind, leader: &str| {
            counters.handler_panics.fetch_add(1, Ordering::Relaxed);
            error!(?kind, leader, "analytics handler panicked");
        }));
    }
}

fn start_feed<F>(feed: F, tx: mpsc::Sender<corelib::Tick>) -> tokio::task::JoinHandle<()>
where
    F: TickFeed + 'static,
{
    tokio::spawn(async move {
        info!(feed = feed.name(), "feed started");
        if let Err(e) = feed.run(tx).await {
            error!(feed = feed.name(), error = %e, "feed failed");
        }
    })
}

fn start_stopper(after: std::time::Duration, stop_tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        info!("run duration elapsed; shutting down");
        let _ = stop_tx.send(true);
    })
}
