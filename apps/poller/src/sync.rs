use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use currency::{CurrencyStore, FeedError, QuoteFeed, QuotePrice, StoreError, UpdateOutcome};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::report::CycleReport;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The feed call itself failed; no record was touched.
    #[error("feed fetch failed: {0}")]
    FeedFetchFailed(#[from] FeedError),
}

impl SyncError {
    pub fn is_timeout(&self) -> bool {
        match self {
            SyncError::FeedFetchFailed(e) => e.is_timeout(),
        }
    }
}

/// One fetch-validate-reconcile pass of feed quotes into the store.
pub struct PriceSync<S, F> {
    store: Arc<S>,
    feed: Arc<F>,
}

impl<S, F> Clone for PriceSync<S, F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            feed: Arc::clone(&self.feed),
        }
    }
}

impl<S, F> PriceSync<S, F>
where
    S: CurrencyStore,
    F: QuoteFeed,
{
    pub fn new(store: Arc<S>, feed: Arc<F>) -> Self {
        Self { store, feed }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[instrument(name = "sync_cycle", skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let start = Instant::now();
        let mut report = CycleReport::new();

        info!("fetching currency prices from feed");
        let items = self.feed.fetch_quotes().await?;
        report.total = items.len();
        debug!(items = items.len(), "received quotes");

        for item in items {
            let (Some(symbol), Some(price)) = (item.symbol(), item.price()) else {
                report.skipped += 1;
                warn!(%item, "skipping item with missing symbol or price");
                continue;
            };

            let QuotePrice::Number(price) = price else {
                report.errors += 1;
                error!(symbol, %item, "price is not a number");
                continue;
            };

            match self.store.update_price(symbol, price, Utc::now()).await {
                Ok(UpdateOutcome::Updated) => {
                    report.updated += 1;
                }
                Ok(UpdateOutcome::NotFound) => {
                    // unknown symbols are dropped, never inserted
                    report.unmatched += 1;
                    debug!(symbol, "no record for symbol");
                }
                Err(e) => {
                    report.errors += 1;
                    error!(symbol, error = %e, "error updating currency");
                }
            }
        }

        report.completed_at = Utc::now();
        report.elapsed = start.elapsed();
        report.log_summary();

        Ok(report)
    }

    pub async fn record_count(&self) -> Result<usize, StoreError> {
        self.store.count().await
    }

    pub async fn last_sync_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.most_recent_update().await
    }
}
