use std::cell::RefCell;
use std::rc::Rc;

use corelib::Quote;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TimeSeries;
use crate::error::MarketError;
use crate::metric::{MetricEngine, MetricInput};
use crate::observer::{Observer, ObserverId, ObserverList};
use crate::search::find_idx_filters;
use crate::series_buffer::SeriesBuffer;

/// Which parent field a derived series is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueField {
    Bid,
    Ask,
    #[default]
    Mid,
}

/// Owned, `Send` copy of a parent series for readers outside the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub name: String,
    pub timestamps: Vec<f64>,
    pub bid: Vec<f64>,
    pub ask: Vec<f64>,
}

/// Raw bid/ask history of one instrument.
pub struct ParentTimeSeries {
    name: String,
    timestamps: SeriesBuffer,
    bid: SeriesBuffer,
    ask: SeriesBuffer,
    observers: ObserverList<ParentTimeSeries>,
}

impl ParentTimeSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamps: SeriesBuffer::new(),
            bid: SeriesBuffer::new(),
            ask: SeriesBuffer::new(),
            observers: ObserverList::new(),
        }
    }

    pub fn from_quotes(name: impl Into<String>, quotes: &[Quote]) -> Self {
        Self {
            name: name.into(),
            timestamps: quotes.iter().map(|q| q.timestamp).collect(),
            bid: quotes.iter().map(|q| q.bid).collect(),
            ask: quotes.iter().map(|q| q.ask).collect(),
            observers: ObserverList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        self.timestamps.logical()
    }

    pub fn bid(&self) -> &[f64] {
        self.bid.logical()
    }

    pub fn ask(&self) -> &[f64] {
        self.ask.logical()
    }

    pub fn mids(&self) -> Vec<f64> {
        self.bid()
            .iter()
            .zip(self.ask())
            .map(|(b, a)| 0.5 * (b + a))
            .collect()
    }

    pub fn quote_at(&self, idx: usize) -> Option<Quote> {
        Some(Quote::new(
            self.timestamps.get(idx)?,
            self.bid.get(idx)?,
            self.ask.get(idx)?,
        ))
    }

    pub fn last_quote(&self) -> Option<Quote> {
        self.len().checked_sub(1).and_then(|i| self.quote_at(i))
    }

    /// Append one resolved quote and notify every subscriber in order.
    pub fn update(&mut self, quote: Quote) {
        self.timestamps.append(quote.timestamp);
        self.bid.append(quote.bid);
        self.ask.append(quote.ask);

        let this: &Self = self;
        let dead = this.observers.notify(this);
        if dead > 0 {
            let pruned = self.observers.prune();
            debug!(series = %self.name, pruned, "pruned dropped observers");
        }
    }

    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> ObserverId
    where
        O: Observer<ParentTimeSeries> + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.live_count()
    }

    /// Derived series over `[lo, hi)` of this parent.
    ///
    /// The child is not subscribed; call `subscribe` to keep it in sync.
    pub fn create_child_at_idx(
        &self,
        lo: usize,
        hi: usize,
        field: ValueField,
        mut engine: MetricEngine,
    ) -> Result<TimeSeries, MarketError> {
        if lo > hi || hi > self.len() {
            return Err(MarketError::InvalidRange {
                lo,
                hi,
                len: self.len(),
            });
        }

        let timestamps = self.timestamps.slice(lo, hi).to_vec();
        let values: Vec<f64> = (lo..hi)
            .filter_map(|i| self.quote_at(i))
            .map(|q| engine.evaluate(self.input_for(field, &q)))
            .collect();

        Ok(TimeSeries::new(
            self.name.clone(),
            field,
            engine,
            lo,
            timestamps,
            values,
        ))
    }

    /// Derived series covering `[start, end]`, with one point of lead-in.
    ///
    /// A window that would start on the very last tick is widened to keep a
    /// few points of context. A window reaching the last tick runs to the
    /// tail, so the child can follow live updates without a gap.
    pub fn create_child(
        &self,
        start: f64,
        end: f64,
        field: ValueField,
        engine: MetricEngine,
    ) -> Result<TimeSeries, MarketError> {
        let (mut lo, mut hi) = find_idx_filters(self.timestamps(), start, end);
        if self.timestamps.logical().last().is_some_and(|last| end >= *last) {
            hi = self.len();
        }
        if self.len() > 0 && lo == self.len() - 1 {
            lo = self.len().saturating_sub(3);
        }
        self.create_child_at_idx(lo.min(hi), hi, field, engine)
    }

    /// Engine input for `field` of `quote`.
    pub fn input_for<'a>(&'a self, field: ValueField, quote: &Quote) -> MetricInput<'a> {
        match field {
            ValueField::Mid => MetricInput::Quote {
                name: &self.name,
                bid: quote.bid,
                ask: quote.ask,
            },
            ValueField::Bid => MetricInput::Value {
                name: &self.name,
                value: quote.bid,
            },
            ValueField::Ask => MetricInput::Value {
                name: &self.name,
                value: quote.ask,
            },
        }
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            name: self.name.clone(),
            timestamps: self.timestamps.to_vec(),
            bid: self.bid.to_vec(),
            ask: self.ask.to_vec(),
        }
    }
}

impl std::fmt::Debug for ParentTimeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentTimeSeries")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("observers", &self.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricConverter, Scale};

    fn parent() -> ParentTimeSeries {
        ParentTimeSeries::from_quotes(
            "US500",
            &[
                Quote::new(0.0, 99.0, 101.0),
                Quote::new(10.0, 101.0, 103.0),
                Quote::new(20.0, 103.0, 105.0),
                Quote::new(30.0, 105.0, 107.0),
                Quote::new(40.0, 107.0, 109.0),
            ],
        )
    }

    #[test]
    fn child_over_window_includes_lead_in_point() {
        let p = parent();
        let child = p
            .create_child(15.0, 35.0, ValueField::Mid, MetricEngine::Direct(MetricConverter::price(100.0)))
            .unwrap();

        assert_eq!(child.timestamps(), &[10.0, 20.0, 30.0]);
        assert_eq!(child.values(), &[102.0, 104.0, 106.0]);
    }

    #[test]
    fn child_on_last_tick_is_widened() {
        let p = parent();
        let child = p
            .create_child(45.0, 50.0, ValueField::Bid, MetricEngine::Null)
            .unwrap();
        assert_eq!(child.timestamps(), &[20.0, 30.0, 40.0]);
        assert_eq!(child.values(), &[103.0, 105.0, 107.0]);
    }

    #[test]
    fn invalid_child_range_is_rejected() {
        let p = parent();
        assert!(p.create_child_at_idx(3, 9, ValueField::Mid, MetricEngine::Null).is_err());
    }

    #[test]
    fn update_propagates_to_subscribed_children_until_dropped() {
        let mut p = parent();
        let engine = MetricEngine::Direct(MetricConverter::price(100.0).with_scale(Scale::Pct).unwrap());
        let child = Rc::new(RefCell::new(
            p.create_child_at_idx(0, p.len(), ValueField::Mid, engine).unwrap(),
        ));
        p.subscribe(&child);

        p.update(Quote::new(50.0, 109.0, 111.0));
        assert_eq!(child.borrow().last_value(), 110.0);
        assert_eq!(child.borrow().len(), 6);

        drop(child);
        p.update(Quote::new(60.0, 111.0, 113.0));
        assert_eq!(p.observer_count(), 0);
        assert_eq!(p.len(), 7);
    }

    #[test]
    fn child_to_last_tick_stays_aligned_through_spread_reingest() {
        let mut p = parent();
        let child = Rc::new(RefCell::new(
            p.create_child(0.0, 40.0, ValueField::Mid, MetricEngine::Direct(MetricConverter::spread()))
                .unwrap(),
        ));
        assert_eq!(child.borrow().timestamps(), p.timestamps());
        p.subscribe(&child);

        p.update(Quote::new(50.0, 109.0, 113.0));
        assert_eq!(child.borrow().timestamps(), p.timestamps());
        assert_eq!(child.borrow().values(), &[2.0, 2.0, 2.0, 2.0, 2.0, 4.0]);

        child.borrow_mut().change_scale(Scale::Pct, &p).unwrap();
        let c = child.borrow();
        assert_eq!(c.timestamps(), p.timestamps());
        assert!((c.values()[0] - 2.0).abs() < 1e-12);
        assert!((c.last_value() - 100.0 * 4.0 / 111.0).abs() < 1e-12);
    }

    #[test]
    fn child_ending_inside_history_is_backfilled_on_update() {
        let mut p = parent();
        let child = Rc::new(RefCell::new(
            p.create_child(15.0, 35.0, ValueField::Bid, MetricEngine::Null).unwrap(),
        ));
        p.subscribe(&child);

        p.update(Quote::new(50.0, 109.0, 111.0));
        let c = child.borrow();
        assert_eq!(c.timestamps(), &[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(c.values(), &[101.0, 103.0, 105.0, 107.0, 109.0]);
    }

    #[test]
    fn snapshot_is_owned_copy() {
        let p = parent();
        let snap = p.snapshot();
        assert_eq!(snap.timestamps.len(), 5);
        assert_eq!(snap.bid[0], 99.0);
    }
}
