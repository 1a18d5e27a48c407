use serde::{Deserialize, Serialize};

pub mod config;

/// One raw observation delivered by the upstream price feed.
///
/// Either side may be missing on a streaming update. A missing field is a
/// no-op for that field only: the receiver keeps the last known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument identifier as known to the instrument universe (e.g. `US500`).
    pub instrument: String,

    /// Epoch seconds (fractional).
    pub timestamp: f64,

    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl Tick {
    pub fn new(instrument: impl Into<String>, timestamp: f64, bid: f64, ask: f64) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            bid: Some(bid),
            ask: Some(ask),
        }
    }

    /// Resolve missing sides against the previously known quote.
    ///
    /// Returns `None` when a side is missing and there is nothing to fall back on.
    pub fn resolve(&self, previous: Option<Quote>) -> Option<Quote> {
        let bid = self.bid.or(previous.map(|q| q.bid))?;
        let ask = self.ask.or(previous.map(|q| q.ask))?;

        Some(Quote {
            timestamp: self.timestamp,
            bid,
            ask,
        })
    }
}

/// A fully resolved bid/ask observation for a single instrument.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: f64,
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(timestamp: f64, bid: f64, ask: f64) -> Self {
        Self {
            timestamp,
            bid,
            ask,
        }
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.bid + self.ask)
    }
}

/// One historical row as loaded by the bootstrap collaborator.
///
/// Timestamps may arrive unsorted, duplicated or in milliseconds; fields may be
/// missing. Cleaning happens in `market::bootstrap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    pub timestamp: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl HistoricalRow {
    pub fn new(timestamp: f64, bid: Option<f64>, ask: Option<f64>) -> Self {
        Self {
            timestamp,
            bid,
            ask,
        }
    }
}

impl From<Quote> for HistoricalRow {
    fn from(q: Quote) -> Self {
        Self {
            timestamp: q.timestamp,
            bid: Some(q.bid),
            ask: Some(q.ask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fills_missing_side_from_previous_quote() {
        let prev = Quote::new(1.0, 99.0, 101.0);
        let tick = Tick {
            instrument: "US500".into(),
            timestamp: 2.0,
            bid: Some(100.0),
            ask: None,
        };

        let q = tick.resolve(Some(prev)).unwrap();
        assert_eq!(q, Quote::new(2.0, 100.0, 101.0));
    }

    #[test]
    fn resolve_without_history_needs_both_sides() {
        let tick = Tick {
            instrument: "US500".into(),
            timestamp: 2.0,
            bid: None,
            ask: Some(101.0),
        };

        assert!(tick.resolve(None).is_none());
    }

    #[test]
    fn mid_is_average_of_bid_and_ask() {
        assert_eq!(Quote::new(0.0, 99.0, 101.0).mid(), 100.0);
    }
}
