use std::cell::RefCell;
use std::rc::Rc;

use corelib::{HistoricalRow, Tick};
use market::{
    bootstrap::TimestampUnit,
    manager::{IngestOutcome, MarketManager},
    metric::{ExpressionMetric, MetricConverter, MetricEngine, Scale},
    timeseries::{SyntheticTimeSeries, ValueField},
    view::{SeriesView, ViewRange},
};

/// Utility: history with a mid of 100, 101, ... at t = 0, 10, 20, ...
fn history(n: usize) -> Vec<HistoricalRow> {
    (0..n)
        .map(|i| {
            let mid = 100.0 + i as f64;
            HistoricalRow::new(i as f64 * 10.0, Some(mid - 0.5), Some(mid + 0.5))
        })
        .collect()
}

#[test]
fn ticks_propagate_from_parent_to_derived_series() {
    let mut mm = MarketManager::new();
    let us = mm
        .register_instrument("US500", &history(5), TimestampUnit::Seconds)
        .unwrap();

    let child = us
        .borrow()
        .create_child(0.0, 40.0, ValueField::Mid, MetricEngine::Direct(MetricConverter::price(100.0)))
        .unwrap();
    let child = Rc::new(RefCell::new(child));
    us.borrow_mut().subscribe(&child);

    assert_eq!(mm.ingest(&Tick::new("US500", 50.0, 104.5, 105.5)), IngestOutcome::Applied);

    let child = child.borrow();
    assert_eq!(child.len(), 6);
    assert_eq!(child.last_timestamp(), 50.0);
    assert_eq!(child.last_value(), 105.0);
}

#[test]
fn dropped_child_is_pruned_on_next_update() {
    let mut mm = MarketManager::new();
    let us = mm
        .register_instrument("US500", &history(3), TimestampUnit::Seconds)
        .unwrap();

    {
        let child = us
            .borrow()
            .create_child_at_idx(0, 3, ValueField::Bid, MetricEngine::Null)
            .unwrap();
        let child = Rc::new(RefCell::new(child));
        us.borrow_mut().subscribe(&child);
        assert_eq!(us.borrow().observer_count(), 1);
    }

    mm.ingest(&Tick::new("US500", 30.0, 102.0, 103.0));
    assert_eq!(us.borrow().observer_count(), 0);
}

#[test]
fn millisecond_history_is_cleaned_before_registration() {
    let rows = vec![
        HistoricalRow::new(2_000.0, Some(10.0), None),
        HistoricalRow::new(1_000.0, None, Some(11.0)),
        HistoricalRow::new(2_000.0, Some(99.0), Some(99.0)),
        HistoricalRow::new(3_000.0, Some(10.5), None),
    ];

    let mut mm = MarketManager::new();
    let de = mm.register_instrument("DE40", &rows, TimestampUnit::Millis).unwrap();

    let de = de.borrow();
    assert_eq!(de.timestamps(), &[2.0, 3.0]);
    assert_eq!(de.bid(), &[10.0, 10.5]);
    assert_eq!(de.ask(), &[11.0, 11.0]);
}

#[test]
fn synthetic_series_follows_both_parents() {
    let mut mm = MarketManager::new();
    let de = mm
        .register_instrument("DE40", &history(2), TimestampUnit::Seconds)
        .unwrap();
    let us = mm
        .register_instrument("US500", &history(2), TimestampUnit::Seconds)
        .unwrap();

    let expr = ExpressionMetric::parse("DE40 / US500").unwrap();
    let synthetic = {
        let (de_ref, us_ref) = (de.borrow(), us.borrow());
        SyntheticTimeSeries::from_parents("ratio", expr, &[&*de_ref, &*us_ref]).unwrap()
    };
    let synthetic = Rc::new(RefCell::new(synthetic));
    de.borrow_mut().subscribe(&synthetic);
    us.borrow_mut().subscribe(&synthetic);

    mm.ingest(&Tick::new("DE40", 20.0, 201.5, 202.5));

    let s = synthetic.borrow();
    assert_eq!(s.values(), &[1.0, 1.0, 2.0]);
}

#[test]
fn windowed_view_rebases_and_rescales_derived_series() {
    let mut mm = MarketManager::new();
    let us = mm
        .register_instrument("US500", &history(5), TimestampUnit::Seconds)
        .unwrap();

    let child = us
        .borrow()
        .create_child(0.0, 40.0, ValueField::Mid, MetricEngine::Direct(MetricConverter::price(100.0)))
        .unwrap();

    let mut view = SeriesView::from_series(&child);
    let (lo, hi) = view.update_from_view_range(
        child.timestamps(),
        child.values(),
        ViewRange::new([15.0, 35.0], [0.0, 200.0]),
    );
    assert_eq!((lo, hi), (1, 4));
    assert_eq!(view.source_series().0, &[10.0, 20.0, 30.0]);

    view.scale(Scale::Pct).unwrap();
    let (_, pct) = view.processed_series();
    assert!((pct[0] - 1.0).abs() < 1e-9);
    assert!((pct[2] - 3.0).abs() < 1e-9);
}
