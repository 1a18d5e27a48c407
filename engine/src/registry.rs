use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

/// What raised a weight-changed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakSource {
    /// Fewer than half of a full consistency window matched the theoretical weight.
    Consistency,
    /// The closed subset median moved more than `dw` from the previous subset.
    SubsetMedian,
}

/// Structural break in a leader/follower relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightChanged {
    pub follower: String,
    pub leader: String,
    pub timestamp: f64,
    pub source: BreakSource,
}

/// Emitted on every weight update with the windowed median of canonical weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueUpdated {
    pub follower: String,
    pub leader: String,
    pub timestamp: f64,
    pub median: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    WeightChanged,
    ValueUpdated,
}

/// A thread-safe callback that receives a reference to a weight-changed event.
pub type WeightChangedHandler = Arc<dyn Fn(&WeightChanged) + Send + Sync + 'static>;

/// A thread-safe callback that receives a reference to a value-updated event.
pub type ValueUpdatedHandler = Arc<dyn Fn(&ValueUpdated) + Send + Sync + 'static>;

type PanicHook = Arc<dyn Fn(EventKind, &str) + Send + Sync + 'static>;

/// Per-leader handler lists for one follower's weight metrics.
///
/// Handlers are untrusted: each call is wrapped in `catch_unwind`, so one bad
/// handler does not prevent the others (or the analytics update) from running.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    weight_changed: HashMap<String, Vec<WeightChangedHandler>>,
    value_updated: HashMap<String, Vec<ValueUpdatedHandler>>,
    /// Optional callback invoked with `(kind, leader)` when a handler panics.
    on_handler_panic: Option<PanicHook>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a callback to be invoked whenever a handler panics.
    pub fn with_panic_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(EventKind, &str) + Send + Sync + 'static,
    {
        self.on_handler_panic = Some(Arc::new(f));
        self
    }

    pub fn set_panic_hook(&mut self, hook: Arc<dyn Fn(EventKind, &str) + Send + Sync + 'static>) {
        self.on_handler_panic = Some(hook);
    }

    pub fn on_weight_changed(&mut self, leader: &str, handler: WeightChangedHandler) {
        self.weight_changed
            .entry(leader.to_string())
            .or_default()
            .push(handler);
    }

    pub fn on_value_updated(&mut self, leader: &str, handler: ValueUpdatedHandler) {
        self.value_updated
            .entry(leader.to_string())
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, kind: EventKind, leader: &str) -> usize {
        match kind {
            EventKind::WeightChanged => self.weight_changed.get(leader).map_or(0, Vec::len),
            EventKind::ValueUpdated => self.value_updated.get(leader).map_or(0, Vec::len),
        }
    }

    /// Run every weight-changed handler for `event.leader`, in registration order.
    pub fn dispatch_weight_changed(&self, event: &WeightChanged) {
        let Some(handlers) = self.weight_changed.get(&event.leader) else {
            return;
        };
        for handler in handlers {
            self.guarded(EventKind::WeightChanged, &event.leader, || handler(event));
        }
    }

    /// Run every value-updated handler for `event.leader`, in registration order.
    pub fn dispatch_value_updated(&self, event: &ValueUpdated) {
        let Some(handlers) = self.value_updated.get(&event.leader) else {
            return;
        };
        for handler in handlers {
            self.guarded(EventKind::ValueUpdated, &event.leader, || handler(event));
        }
    }

    fn guarded<F: FnOnce()>(&self, kind: EventKind, leader: &str, f: F) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        if result.is_err() {
            warn!(?kind, leader, "event handler panicked");
            if let Some(ref hook) = self.on_handler_panic {
                hook(kind, leader);
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("weight_changed", &self.weight_changed.keys().collect::<Vec<_>>())
            .field("value_updated", &self.value_updated.keys().collect::<Vec<_>>())
            .field("panic_hook", &self.on_handler_panic.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn changed(leader: &str, ts: f64) -> WeightChanged {
        WeightChanged {
            follower: "DE40".into(),
            leader: leader.into(),
            timestamp: ts,
            source: BreakSource::Consistency,
        }
    }

    fn updated(leader: &str, median: f64) -> ValueUpdated {
        ValueUpdated {
            follower: "DE40".into(),
            leader: leader.into(),
            timestamp: 1.0,
            median,
        }
    }

    #[test]
    fn handler_receives_event_for_its_leader_only() {
        let mut reg = HandlerRegistry::new();

        let seen = Arc::new(Mutex::new(vec![]));
        let seen_clone = seen.clone();

        reg.on_weight_changed(
            "US500",
            Arc::new(move |ev: &WeightChanged| {
                seen_clone.lock().unwrap().push((ev.leader.clone(), ev.timestamp));
            }),
        );

        reg.dispatch_weight_changed(&changed("US500", 100.0));
        reg.dispatch_weight_changed(&changed("EU50", 101.0));

        assert_eq!(*seen.lock().unwrap(), vec![("US500".to_string(), 100.0)]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut reg = HandlerRegistry::new();

        let order = Arc::new(Mutex::new(vec![]));
        let o1 = order.clone();
        let o2 = order.clone();

        reg.on_value_updated("US500", Arc::new(move |_| o1.lock().unwrap().push(1)));
        reg.on_value_updated("US500", Arc::new(move |_| o2.lock().unwrap().push(2)));

        reg.dispatch_value_updated(&updated("US500", 50.0));

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(reg.handler_count(EventKind::ValueUpdated, "US500"), 2);
        assert_eq!(reg.handler_count(EventKind::WeightChanged, "US500"), 0);
    }

    #[test]
    fn no_handlers_is_a_no_op() {
        let reg = HandlerRegistry::new();
        reg.dispatch_weight_changed(&changed("US500", 1.0));
        reg.dispatch_value_updated(&updated("US500", 1.0));
    }

    #[test]
    fn handler_panics_do_not_stop_other_handlers() {
        let panics = Arc::new(Mutex::new(vec![]));
        let panics_clone = panics.clone();

        let mut reg = HandlerRegistry::new().with_panic_hook(move |kind, leader| {
            panics_clone.lock().unwrap().push((kind, leader.to_string()));
        });

        let hits = Arc::new(Mutex::new(0));
        let hits_clone = hits.clone();

        // First handler panics
        reg.on_weight_changed("US500", Arc::new(|_| panic!("boom")));

        // Second handler must still run
        reg.on_weight_changed(
            "US500",
            Arc::new(move |_| {
                *hits_clone.lock().unwrap() += 1;
            }),
        );

        reg.dispatch_weight_changed(&changed("US500", 9.0));

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(
            *panics.lock().unwrap(),
            vec![(EventKind::WeightChanged, "US500".to_string())]
        );
    }
}
