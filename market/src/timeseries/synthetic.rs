use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ParentTimeSeries;
use crate::error::MarketError;
use crate::metric::ExpressionMetric;
use crate::observer::{Observer, ObserverId, ObserverList};
use crate::search::searchsorted_left;
use crate::series_buffer::SeriesBuffer;

/// Minimum spacing enforced between synthetic timestamps.
const TIMESTAMP_BUMP: f64 = 1e-3;

/// A series combining several instruments through a formula (e.g. `DE40 - US500`).
///
/// Built over the union of the parents' timestamps with each parent's mid
/// forward-filled; afterwards every parent update appends one point.
pub struct SyntheticTimeSeries {
    name: String,
    expr: ExpressionMetric,
    timestamps: SeriesBuffer,
    values: SeriesBuffer,
    observers: ObserverList<SyntheticTimeSeries>,
}

impl SyntheticTimeSeries {
    pub fn from_parents(
        name: impl Into<String>,
        mut expr: ExpressionMetric,
        parents: &[&ParentTimeSeries],
    ) -> Result<Self, MarketError> {
        expr.validate(|v| parents.iter().any(|p| p.name() == v))?;

        let mut union: Vec<f64> = parents.iter().flat_map(|p| p.timestamps().iter().copied()).collect();
        union.sort_by(f64::total_cmp);
        union.dedup();

        let mut columns: HashMap<String, Vec<f64>> = HashMap::new();
        for parent in parents {
            let mut expanded = vec![f64::NAN; union.len()];
            for (ts, mid) in parent.timestamps().iter().zip(parent.mids()) {
                expanded[searchsorted_left(&union, *ts)] = mid;
            }
            forward_fill(&mut expanded);
            columns.insert(parent.name().to_string(), expanded);

            if let Some(last) = parent.last_quote() {
                expr.set_value(parent.name(), last.mid());
            }
        }

        let values = expr.evaluate_array(&columns);

        Ok(Self {
            name: name.into(),
            expr,
            timestamps: SeriesBuffer::from(union),
            values: SeriesBuffer::from(values),
            observers: ObserverList::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &str {
        self.expr.source()
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

    pub fn last_value(&self) -> f64 {
        self.values.last()
    }

    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> ObserverId
    where
        O: Observer<SyntheticTimeSeries> + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl Observer<ParentTimeSeries> for SyntheticTimeSeries {
    fn on_update(&mut self, parent: &ParentTimeSeries) {
        let Some(quote) = parent.last_quote() else {
            return;
        };

        // Keep timestamps strictly increasing across interleaved parents.
        let last_ts = self.timestamps.last();
        let ts = if !self.timestamps.is_empty() && quote.timestamp <= last_ts {
            last_ts + TIMESTAMP_BUMP
        } else {
            quote.timestamp
        };

        let value = self.expr.update_and_evaluate(parent.name(), quote.mid());
        self.timestamps.append(ts);
        self.values.append(value);

        let this: &Self = self;
        if this.observers.notify(this) > 0 {
            self.observers.prune();
        }
    }
}

fn forward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::Quote;

    fn parent(name: &str, points: &[(f64, f64)]) -> ParentTimeSeries {
        let quotes: Vec<Quote> = points.iter().map(|(t, m)| Quote::new(*t, *m, *m)).collect();
        ParentTimeSeries::from_quotes(name, &quotes)
    }

    #[test]
    fn union_timestamps_with_forward_fill() {
        let de = parent("DE40", &[(1.0, 10.0), (3.0, 12.0)]);
        let us = parent("US500", &[(2.0, 4.0), (3.0, 5.0)]);
        let expr = ExpressionMetric::parse("DE40 - US500").unwrap();

        let s = SyntheticTimeSeries::from_parents("DE40-US500", expr, &[&de, &us]).unwrap();

        assert_eq!(s.timestamps(), &[1.0, 2.0, 3.0]);
        assert!(s.values()[0].is_nan());
        assert_eq!(&s.values()[1..], &[6.0, 7.0]);
    }

    #[test]
    fn unknown_variable_is_rejected_at_build_time() {
        let de = parent("DE40", &[(1.0, 10.0)]);
        let expr = ExpressionMetric::parse("DE40 - US500").unwrap();
        assert!(matches!(
            SyntheticTimeSeries::from_parents("x", expr, &[&de]),
            Err(MarketError::Expression(_))
        ));
    }

    #[test]
    fn parent_updates_append_with_bumped_timestamps() {
        let mut de = parent("DE40", &[(1.0, 10.0)]);
        let mut us = parent("US500", &[(1.0, 4.0)]);
        let expr = ExpressionMetric::parse("DE40 - US500").unwrap();
        let s = Rc::new(RefCell::new(
            SyntheticTimeSeries::from_parents("spread", expr, &[&de, &us]).unwrap(),
        ));
        de.subscribe(&s);
        us.subscribe(&s);

        de.update(Quote::new(2.0, 11.0, 11.0));
        us.update(Quote::new(2.0, 5.0, 5.0));

        let s = s.borrow();
        assert_eq!(s.values(), &[6.0, 7.0, 6.0]);
        assert_eq!(s.timestamps()[2], 2.0 + TIMESTAMP_BUMP);
    }
}
