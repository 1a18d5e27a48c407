//! Observer list used to propagate series updates.
//!
//! A producer holds only weak registrations. An observer is detached either by
//! `unsubscribe` or by dropping its last strong handle; dead entries are
//! skipped during dispatch and pruned afterwards.
//!
//! Dispatch is synchronous and follows subscription order.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub trait Observer<E: ?Sized> {
    fn on_update(&mut self, source: &E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

pub struct ObserverList<E: ?Sized> {
    next_id: u64,
    entries: Vec<(ObserverId, Weak<RefCell<dyn Observer<E>>>)>,
}

impl<E: ?Sized + 'static> ObserverList<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> ObserverId
    where
        O: Observer<E> + 'static,
    {
        let strong: Rc<RefCell<dyn Observer<E>>> = observer.clone();
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Rc::downgrade(&strong)));
        id
    }

    /// Returns `false` when `id` was not (or no longer) registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(eid, _)| *eid != id);
        self.entries.len() != before
    }

    /// Notify every live observer in subscription order.
    ///
    /// Returns the number of dead registrations encountered. An observer that is
    /// already borrowed (re-entrant dispatch) is skipped for this round.
    pub fn notify(&self, source: &E) -> usize {
        let mut dead = 0;
        for (_, weak) in &self.entries {
            match weak.upgrade() {
                Some(observer) => match observer.try_borrow_mut() {
                    Ok(mut o) => o.on_update(source),
                    Err(_) => tracing::warn!("observer re-entered during dispatch; skipped"),
                },
                None => dead += 1,
            }
        }
        dead
    }

    /// Drop registrations whose observer has been dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, weak)| weak.strong_count() > 0);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl<E: ?Sized + 'static> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> fmt::Debug for ObserverList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("registrations", &self.entries.len())
            .finish()
    }
}
