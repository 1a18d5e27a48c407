use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::{ParentTimeSeries, ValueField};
use crate::error::MarketError;
use crate::metric::{MetricEngine, Scale};
use crate::observer::{Observer, ObserverId, ObserverList};
use crate::search::searchsorted_right;
use crate::series_buffer::SeriesBuffer;

/// A derived series (price, spread, ...) of one parent instrument.
///
/// `parent_offset` is the parent index of this series' first point; it lets a
/// spread series re-ingest from the parent's bid/ask after a scale change.
pub struct TimeSeries {
    name: String,
    field: ValueField,
    engine: MetricEngine,
    parent_offset: usize,
    timestamps: SeriesBuffer,
    values: SeriesBuffer,
    observers: ObserverList<TimeSeries>,
}

impl TimeSeries {
    pub fn new(
        name: String,
        field: ValueField,
        engine: MetricEngine,
        parent_offset: usize,
        timestamps: Vec<f64>,
        values: Vec<f64>,
    ) -> Self {
        Self {
            name,
            field,
            engine,
            parent_offset,
            timestamps: SeriesBuffer::from(timestamps),
            values: SeriesBuffer::from(values),
            observers: ObserverList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> ValueField {
        self.field
    }

    pub fn engine(&self) -> &MetricEngine {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        self.timestamps.logical()
    }

    pub fn values(&self) -> &[f64] {
        self.values.logical()
    }

    pub fn data(&self) -> (&[f64], &[f64]) {
        (self.timestamps(), self.values())
    }

    pub fn last_value(&self) -> f64 {
        self.values.last()
    }

    pub fn last_timestamp(&self) -> f64 {
        self.timestamps.last()
    }

    /// Replace both buffers. Lengths must match.
    pub fn set_data(&mut self, timestamps: Vec<f64>, values: Vec<f64>) -> Result<(), MarketError> {
        if timestamps.len() != values.len() {
            return Err(MarketError::LengthMismatch {
                expected: timestamps.len(),
                actual: values.len(),
            });
        }
        self.timestamps = SeriesBuffer::from(timestamps);
        self.values = SeriesBuffer::from(values);
        self.notify();
        Ok(())
    }

    /// Discard every point before the one at or preceding `timestamp`.
    pub fn subset(&mut self, timestamp: f64) {
        let cut = searchsorted_right(self.timestamps(), timestamp).saturating_sub(1);
        if cut == 0 {
            return;
        }

        let ts = self.timestamps.slice(cut, self.len()).to_vec();
        let vals = self.values.slice(cut, self.len()).to_vec();
        self.timestamps = SeriesBuffer::from(ts);
        self.values = SeriesBuffer::from(vals);
        self.parent_offset += cut;
        self.notify();
    }

    pub fn change_static_param(&mut self, value: f64) {
        self.engine.change_static_param(value);
        self.notify();
    }

    /// Change the display scale. Spread series are recomputed from `parent`.
    pub fn change_scale(&mut self, scale: Scale, parent: &ParentTimeSeries) -> Result<(), MarketError> {
        self.engine.change_scale(scale)?;
        if self.engine.reingest_on_scale_change() {
            self.reingest(parent)?;
        }
        self.notify();
        Ok(())
    }

    /// Recompute every value from the parent's raw fields.
    pub fn reingest(&mut self, parent: &ParentTimeSeries) -> Result<(), MarketError> {
        let lo = self.parent_offset;
        let hi = lo + self.len();
        if hi > parent.len() {
            return Err(MarketError::InvalidRange {
                lo,
                hi,
                len: parent.len(),
            });
        }

        let values: Vec<f64> = (lo..hi)
            .filter_map(|i| parent.quote_at(i))
            .map(|q| self.engine.evaluate(parent.input_for(self.field, &q)))
            .collect();
        self.values.insert_range(&values, 0, values.len())
    }

    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> ObserverId
    where
        O: Observer<TimeSeries> + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn notify(&mut self) {
        let this: &Self = self;
        if this.observers.notify(this) > 0 {
            self.observers.prune();
        }
    }

    /// Copy without subscribers.
    pub fn clone_detached(&self) -> Self {
        Self::new(
            self.name.clone(),
            self.field,
            self.engine.clone(),
            self.parent_offset,
            self.timestamps.to_vec(),
            self.values.to_vec(),
        )
    }
}

impl Observer<ParentTimeSeries> for TimeSeries {
    /// Append every parent point past this series' end.
    ///
    /// A child built over a window that stops short of the parent's tail is
    /// backfilled first, so point `i` always maps to parent index
    /// `parent_offset + i`.
    fn on_update(&mut self, parent: &ParentTimeSeries) {
        let next = self.parent_offset + self.len();
        if next >= parent.len() {
            return;
        }

        let mut appended = 0;
        for idx in next..parent.len() {
            let Some(quote) = parent.quote_at(idx) else {
                break;
            };
            let value = self.engine.evaluate(parent.input_for(self.field, &quote));
            self.timestamps.append(quote.timestamp);
            self.values.append(value);
            appended += 1;
        }

        debug!(series = %self.name, appended, ts = self.last_timestamp(), "derived series updated");
        self.notify();
    }
}
