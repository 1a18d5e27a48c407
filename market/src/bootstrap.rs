//! Historical bootstrap cleaning.
//!
//! Rows arrive as loaded by an external collaborator: unsorted, duplicated,
//! possibly in milliseconds, with gaps. The result seeds a `ParentTimeSeries`.

use corelib::{HistoricalRow, Quote};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Millis,
}

/// Clean raw rows into fully populated quotes.
///
/// Steps, in order:
///   • drop rows with a non-finite timestamp
///   • dedupe by timestamp, keeping the first occurrence
///   • sort ascending
///   • convert milliseconds to seconds when asked
///   • forward-fill missing bid/ask
///   • trim to the first row with both sides present
pub fn clean_history(rows: &[HistoricalRow], unit: TimestampUnit) -> Vec<Quote> {
    let mut rows: Vec<HistoricalRow> = rows.iter().copied().filter(|r| r.timestamp.is_finite()).collect();

    // Stable sort keeps input order among equal timestamps, so dedup keeps the first.
    rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    rows.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);

    let divisor = match unit {
        TimestampUnit::Seconds => 1.0,
        TimestampUnit::Millis => 1_000.0,
    };

    let mut bid: Option<f64> = None;
    let mut ask: Option<f64> = None;

    rows.into_iter()
        .filter_map(|r| {
            bid = r.bid.filter(|v| v.is_finite()).or(bid);
            ask = r.ask.filter(|v| v.is_finite()).or(ask);
            Some(Quote::new(r.timestamp / divisor, bid?, ask?))
        })
        .collect()
}
