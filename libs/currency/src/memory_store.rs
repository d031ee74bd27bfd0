use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{CurrencyRecord, CurrencyStore, StoreError, UpdateOutcome};

/// In-process record store. Supports fault injection so callers can
/// exercise the `Unavailable` paths without a real backend.
#[derive(Clone, Default)]
pub struct MemoryCurrencyStore {
    records: Arc<Mutex<HashMap<String, CurrencyRecord>>>,
    failing_symbols: Arc<Mutex<HashSet<String>>>,
    unavailable: Arc<AtomicBool>,
    update_calls: Arc<AtomicUsize>,
}

impl MemoryCurrencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_records(records: impl IntoIterator<Item = CurrencyRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.provision(record).await;
        }
        store
    }

    /// Insert or replace a whole record.
    pub async fn provision(&self, record: CurrencyRecord) {
        let mut records = self.records.lock().await;
        records.insert(record.symbol.clone(), record);
    }

    pub async fn get(&self, symbol: &str) -> Option<CurrencyRecord> {
        self.records.lock().await.get(symbol).cloned()
    }

    /// Make every later `update_price` for `symbol` fail as unavailable.
    pub async fn fail_updates_for(&self, symbol: &str) {
        self.failing_symbols.lock().await.insert(symbol.to_string());
    }

    /// Make every operation fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `update_price` calls received, failed ones included.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CurrencyStore for MemoryCurrencyStore {
    async fn count(&self) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(self.records.lock().await.len())
    }

    async fn most_recent_update(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check_available()?;
        let records = self.records.lock().await;
        Ok(records.values().map(|r| r.last_updated).max())
    }

    async fn update_price(
        &self,
        symbol: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if self.failing_symbols.lock().await.contains(symbol) {
            return Err(StoreError::Unavailable(format!(
                "write for {symbol} rejected"
            )));
        }

        let mut records = self.records.lock().await;
        match records.get_mut(symbol) {
            Some(record) => {
                record.price = price;
                record.last_updated = now;
                debug!(symbol, price, "memory store updated");
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(symbol: &str, price: f64) -> CurrencyRecord {
        CurrencyRecord::new(symbol, symbol, symbol, price, 0.5, "USD")
    }

    #[tokio::test]
    async fn test_update_existing_record() {
        let store = MemoryCurrencyStore::with_records([record("USD", 1.0)]).await;
        let now = Utc::now() + Duration::seconds(5);

        let outcome = store.update_price("USD", 1.05, now).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let usd = store.get("USD").await.unwrap();
        assert_eq!(usd.price, 1.05);
        assert_eq!(usd.last_updated, now);
        assert_eq!(usd.change_percent, 0.5);
    }

    #[tokio::test]
    async fn test_update_unknown_symbol_never_inserts() {
        let store = MemoryCurrencyStore::with_records([record("USD", 1.0)]).await;

        let outcome = store.update_price("EUR", 1.1, Utc::now()).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
        assert!(store.get("EUR").await.is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_symbols_match_exactly() {
        let store = MemoryCurrencyStore::with_records([record("USD", 1.0)]).await;

        for key in ["usd", " USD", "USD "] {
            let outcome = store.update_price(key, 2.0, Utc::now()).await.unwrap();
            assert_eq!(outcome, UpdateOutcome::NotFound, "{key:?}");
        }
        assert_eq!(store.get("USD").await.unwrap().price, 1.0);
    }

    #[tokio::test]
    async fn test_most_recent_update() {
        let store = MemoryCurrencyStore::new();
        assert_eq!(store.most_recent_update().await.unwrap(), None);

        let mut old = record("USD", 1.0);
        old.last_updated = Utc::now() - Duration::hours(2);
        let newer = record("XAU", 1900.0);
        let expected = newer.last_updated;
        store.provision(old).await;
        store.provision(newer).await;

        assert_eq!(store.most_recent_update().await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryCurrencyStore::with_records([record("USD", 1.0)]).await;
        store.fail_updates_for("USD").await;

        let err = store.update_price("USD", 2.0, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.get("USD").await.unwrap().price, 1.0);

        store.set_unavailable(true);
        assert!(store.count().await.is_err());
        assert!(store.most_recent_update().await.is_err());
        assert_eq!(store.update_calls(), 1);
    }
}
