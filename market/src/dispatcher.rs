//! TickDispatcher
//!
//! The single consumer of the tick queue.
//! Responsibilities:
//!   • Wake on a fixed cadence and drain whatever producers have enqueued
//!   • Apply each tick synchronously through `MarketManager::ingest`
//!   • Stop on the shutdown signal without draining further items
//!
//! Every mutation of series and analytics state happens inside `drain`, one
//! tick at a time, so no update ever spans two scheduling slices.

use std::time::Duration;

use common::logger::warn_if_slow;
use tokio::sync::{
    mpsc::{Receiver, error::TryRecvError},
    watch,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use crate::manager::{IngestOutcome, MarketManager};
use corelib::Tick;

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Drain period.
    pub cadence: Duration,

    /// Upper bound on ticks applied per drain cycle.
    pub max_batch: usize,

    /// Drain cycles slower than this are reported.
    pub slow_cycle: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            max_batch: 10_000,
            slow_cycle: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub cycles: u64,
    pub applied: u64,
    pub unknown: u64,
    pub unresolved: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    /// Every producer dropped its sender and the queue is empty.
    FeedClosed,
}

pub struct TickDispatcher {
    rx: Receiver<Tick>,
    shutdown: watch::Receiver<bool>,
    config: DispatcherConfig,
}

impl TickDispatcher {
    pub fn new(rx: Receiver<Tick>, shutdown: watch::Receiver<bool>, config: DispatcherConfig) -> Self {
        Self { rx, shutdown, config }
    }

    /// Run until shutdown or until the feed closes.
    #[instrument(skip_all, fields(cadence_us = self.config.cadence.as_micros() as u64))]
    pub async fn run(mut self, manager: &mut MarketManager) -> (DispatchStats, StopReason) {
        let mut stats = DispatchStats::default();

        let mut ticker = tokio::time::interval(self.config.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    // A dropped sender can never signal again: treat it as a stop.
                    if changed.is_err() || *self.shutdown.borrow() {
                        break StopReason::Shutdown;
                    }
                }

                _ = ticker.tick() => {
                    if *self.shutdown.borrow() {
                        break StopReason::Shutdown;
                    }

                    let slow = self.config.slow_cycle;
                    let closed = warn_if_slow("drain_cycle", slow, || self.drain(manager, &mut stats));
                    stats.cycles += 1;

                    if closed {
                        break StopReason::FeedClosed;
                    }
                }
            }
        };

        info!(
            ?reason,
            cycles = stats.cycles,
            applied = stats.applied,
            unknown = stats.unknown,
            unresolved = stats.unresolved,
            "dispatcher stopped"
        );
        (stats, reason)
    }

    /// Drain one batch. Returns `true` once the channel is closed and empty.
    fn drain(&mut self, manager: &mut MarketManager, stats: &mut DispatchStats) -> bool {
        for _ in 0..self.config.max_batch {
            if *self.shutdown.borrow() {
                return false;
            }

            match self.rx.try_recv() {
                Ok(tick) => match manager.ingest(&tick) {
                    IngestOutcome::Applied => stats.applied += 1,
                    IngestOutcome::UnknownInstrument => stats.unknown += 1,
                    IngestOutcome::Unresolved => stats.unresolved += 1,
                },
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    debug!("tick channel closed");
                    return true;
                }
            }
        }
        false
    }
}
