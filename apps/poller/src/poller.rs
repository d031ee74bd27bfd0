use std::{sync::Arc, time::Duration};

use currency::{CurrencyStore, QuoteFeed, StoreError};
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;

use crate::sync::PriceSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl PollerState {
    fn can_become(self, next: PollerState) -> bool {
        use PollerState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("failed to connect to store: {0}")]
    Connect(#[source] StoreError),

    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition { from: PollerState, to: PollerState },
}

/// Drives [`PriceSync`] on a fixed interval and owns the store connection
/// for the lifetime of the process.
///
/// Cycles run inline on the loop task, so a slow cycle delays the next tick
/// instead of overlapping it, and shutdown never interrupts a cycle that has
/// already started.
pub struct Poller<S, F> {
    feed: Arc<F>,
    sync: Option<PriceSync<S, F>>,
    interval: Duration,
    state: PollerState,
}

impl<S, F> Poller<S, F>
where
    S: CurrencyStore,
    F: QuoteFeed,
{
    pub fn new(feed: F, interval: Duration) -> Self {
        Self {
            feed: Arc::new(feed),
            sync: None,
            interval,
            state: PollerState::Idle,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Available once started, until shutdown releases the store.
    pub fn sync(&self) -> Option<&PriceSync<S, F>> {
        self.sync.as_ref()
    }

    fn transition(&mut self, next: PollerState) -> Result<(), PollerError> {
        if !self.state.can_become(next) {
            return Err(PollerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!(from = ?self.state, to = ?next, "poller state change");
        self.state = next;
        Ok(())
    }

    /// Connect to the store and log initial diagnostics. A failed connection
    /// leaves the poller `Stopped`; failed diagnostics are only logged.
    pub async fn start<C>(&mut self, connect: C) -> Result<(), PollerError>
    where
        C: Future<Output = Result<S, StoreError>>,
    {
        self.transition(PollerState::Starting)?;
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "starting currency price poller"
        );

        let store = match connect.await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "failed to connect to store");
                self.transition(PollerState::Stopped)?;
                return Err(PollerError::Connect(e));
            }
        };
        info!("connected to store");

        let sync = PriceSync::new(Arc::new(store), Arc::clone(&self.feed));

        match sync.record_count().await {
            Ok(count) => info!(count, "found currencies in store"),
            Err(e) => warn!(error = %e, "could not count currencies"),
        }

        match sync.last_sync_timestamp().await {
            Ok(Some(last_update)) => info!(last_update = %last_update.to_rfc3339(), "last update"),
            Ok(None) => info!("no update recorded yet"),
            Err(e) => warn!(error = %e, "could not read last update time"),
        }

        self.sync = Some(sync);
        self.transition(PollerState::Running)
    }

    /// Run one cycle immediately, then one per interval, until `shutdown`
    /// resolves. Then stop the poller.
    pub async fn run<Sh>(&mut self, shutdown: Sh) -> Result<(), PollerError>
    where
        Sh: Future<Output = ()>,
    {
        let sync = match (&self.sync, self.state) {
            (Some(sync), PollerState::Running) => sync.clone(),
            _ => {
                return Err(PollerError::InvalidTransition {
                    from: self.state,
                    to: PollerState::Running,
                });
            }
        };

        let mut tick = time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("starting update loop");
        let mut cycle: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(cycles = cycle, "shutdown requested, no further cycles");
                    break;
                }
                _ = tick.tick() => {
                    cycle += 1;
                    let span = info_span!("cycle", cycle);

                    match sync.run_cycle().instrument(span).await {
                        Ok(report) => debug!(cycle, updated = report.updated, "cycle finished"),
                        Err(e) => error!(cycle, error = %e, timeout = e.is_timeout(), "error in update loop"),
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Stop scheduling and release the store. Calling it again once stopped
    /// is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), PollerError> {
        if self.state == PollerState::Stopped {
            return Ok(());
        }

        self.transition(PollerState::Stopping)?;

        if let Some(sync) = self.sync.take()
            && let Err(e) = sync.store().close().await
        {
            warn!(error = %e, "failed to close store connection");
        }

        self.transition(PollerState::Stopped)?;
        info!("currency price poller stopped");
        Ok(())
    }
}
