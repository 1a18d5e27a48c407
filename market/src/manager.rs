//! MarketManager
//!
//! Explicit registry of the instrument universe.
//! Responsibilities:
//!   • Own one `ParentTimeSeries` per instrument, seeded from cleaned history
//!   • Resolve partial ticks against the last known quote (per-field no-op)
//!   • Append resolved ticks and let each parent notify its subscribers
//!   • Track per-instrument tick counts and last tick time (liveness)
//!
//! The manager and everything it owns live on the single consumer. Series are
//! shared as `Rc<RefCell<_>>` so analytics can subscribe to them; nothing here
//! is `Send`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use corelib::{HistoricalRow, Tick};
use tracing::{debug, info, warn};

use crate::bootstrap::{TimestampUnit, clean_history};
use crate::error::MarketError;
use crate::timeseries::{ParentTimeSeries, SeriesSnapshot};

pub type SharedSeries = Rc<RefCell<ParentTimeSeries>>;

/// Result of ingesting one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// No such instrument in the universe; ignored.
    UnknownInstrument,
    /// A side was missing and there was no previous value to fall back on.
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedStats {
    pub ticks: u64,
    /// Timestamp carried by the last applied tick.
    pub last_tick_ts: Option<f64>,
}

#[derive(Default)]
pub struct MarketManager {
    series: BTreeMap<String, SharedSeries>,
    stats: BTreeMap<String, FeedStats>,
    unknown_ticks: u64,
    last_tick_at: Option<Instant>,
}

impl MarketManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `name` from raw historical rows.
    pub fn register_instrument(
        &mut self,
        name: &str,
        rows: &[HistoricalRow],
        unit: TimestampUnit,
    ) -> Result<SharedSeries, MarketError> {
        if self.series.contains_key(name) {
            return Err(MarketError::DuplicateInstrument(name.to_string()));
        }

        let quotes = clean_history(rows, unit);
        if quotes.is_empty() {
            return Err(MarketError::EmptyHistory(name.to_string()));
        }

        info!(
            instrument = name,
            raw_rows = rows.len(),
            rows = quotes.len(),
            "instrument registered"
        );
        self.register_series(ParentTimeSeries::from_quotes(name, &quotes))
    }

    /// Register an already built series.
    pub fn register_series(&mut self, series: ParentTimeSeries) -> Result<SharedSeries, MarketError> {
        let name = series.name().to_string();
        if self.series.contains_key(&name) {
            return Err(MarketError::DuplicateInstrument(name));
        }

        let shared = Rc::new(RefCell::new(series));
        self.series.insert(name.clone(), Rc::clone(&shared));
        self.stats.insert(name, FeedStats::default());
        Ok(shared)
    }

    pub fn get(&self, name: &str) -> Option<SharedSeries> {
        self.series.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Apply one streaming tick.
    ///
    /// A missing bid or ask keeps the previous value for that side only.
    pub fn ingest(&mut self, tick: &Tick) -> IngestOutcome {
        let Some(series) = self.series.get(&tick.instrument) else {
            self.unknown_ticks += 1;
            warn!(instrument = %tick.instrument, "tick for unknown instrument ignored");
            return IngestOutcome::UnknownInstrument;
        };

        let previous = series.borrow().last_quote();
        let Some(quote) = tick.resolve(previous) else {
            debug!(instrument = %tick.instrument, ts = tick.timestamp, "unresolvable partial tick");
            return IngestOutcome::Unresolved;
        };

        series.borrow_mut().update(quote);

        let stats = self.stats.entry(tick.instrument.clone()).or_default();
        stats.ticks += 1;
        stats.last_tick_ts = Some(quote.timestamp);
        self.last_tick_at = Some(Instant::now());

        IngestOutcome::Applied
    }

    pub fn stats(&self, name: &str) -> Option<FeedStats> {
        self.stats.get(name).copied()
    }

    pub fn unknown_ticks(&self) -> u64 {
        self.unknown_ticks
    }

    /// No tick applied within `timeout` (or never).
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_tick_at.is_none_or(|t| t.elapsed() > timeout)
    }

    pub fn snapshot(&self, name: &str) -> Option<SeriesSnapshot> {
        self.series.get(name).map(|s| s.borrow().snapshot())
    }
}

impl std::fmt::Debug for MarketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketManager")
            .field("instruments", &self.series.keys().collect::<Vec<_>>())
            .field("unknown_ticks", &self.unknown_ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<HistoricalRow> {
        vec![
            HistoricalRow::new(1.0, Some(99.0), Some(101.0)),
            HistoricalRow::new(2.0, Some(100.0), Some(102.0)),
        ]
    }

    #[test]
    fn register_and_ingest_full_tick() {
        let mut mm = MarketManager::new();
        let us = mm.register_instrument("US500", &rows(), TimestampUnit::Seconds).unwrap();

        let out = mm.ingest(&Tick::new("US500", 3.0, 101.0, 103.0));

        assert_eq!(out, IngestOutcome::Applied);
        assert_eq!(us.borrow().len(), 3);
        assert_eq!(mm.stats("US500").unwrap().ticks, 1);
        assert_eq!(mm.stats("US500").unwrap().last_tick_ts, Some(3.0));
        assert!(!mm.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn partial_tick_keeps_previous_side() {
        let mut mm = MarketManager::new();
        let us = mm.register_instrument("US500", &rows(), TimestampUnit::Seconds).unwrap();

        let tick = Tick {
            instrument: "US500".into(),
            timestamp: 3.0,
            bid: None,
            ask: Some(104.0),
        };
        mm.ingest(&tick);

        let last = us.borrow().last_quote().unwrap();
        assert_eq!((last.bid, last.ask), (100.0, 104.0));
    }

    #[test]
    fn unknown_instrument_is_ignored() {
        let mut mm = MarketManager::new();
        assert_eq!(
            mm.ingest(&Tick::new("XX", 1.0, 1.0, 2.0)),
            IngestOutcome::UnknownInstrument
        );
        assert_eq!(mm.unknown_ticks(), 1);
        assert!(mm.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn duplicate_and_empty_registrations_fail() {
        let mut mm = MarketManager::new();
        mm.register_instrument("US500", &rows(), TimestampUnit::Seconds).unwrap();

        assert_eq!(
            mm.register_instrument("US500", &rows(), TimestampUnit::Seconds).unwrap_err(),
            MarketError::DuplicateInstrument("US500".into())
        );
        assert_eq!(
            mm.register_instrument("DE40", &[], TimestampUnit::Seconds).unwrap_err(),
            MarketError::EmptyHistory("DE40".into())
        );
    }
}
