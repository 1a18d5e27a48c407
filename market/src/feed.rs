//! Producer side of the tick hand-off.
//!
//! A feed pushes `Tick`s into a bounded channel; the single consumer
//! (`TickDispatcher`) drains it. Feeds run on their own task and never touch
//! analytics state.

use std::time::Duration;

use async_trait::async_trait;
use corelib::Tick;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

#[async_trait]
pub trait TickFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Stream ticks into `tx` until the feed is exhausted or the receiver is gone.
    async fn run(&self, tx: Sender<Tick>) -> anyhow::Result<()>;
}

/// Replays a fixed tick sequence, optionally pacing between ticks.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    ticks: Vec<Tick>,
    pace: Option<Duration>,
}

impl ReplayFeed {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self { ticks, pace: None }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

#[async_trait]
impl TickFeed for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    async fn run(&self, tx: Sender<Tick>) -> anyhow::Result<()> {
        for (sent, tick) in self.ticks.iter().enumerate() {
            if tx.send(tick.clone()).await.is_err() {
                debug!(sent, "replay receiver dropped");
                return Ok(());
            }
            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }
        }

        info!(ticks = self.ticks.len(), "replay feed exhausted");
        Ok(())
    }
}
