use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::StoreError;

/// Result of a keyed price update. A missing symbol is a normal outcome,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Persistent collection of currency records keyed by symbol.
#[async_trait]
pub trait CurrencyStore: Send + Sync {
    /// Total number of records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Greatest `last_updated` across all records, `None` when empty.
    async fn most_recent_update(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Set `price` and `last_updated` on the record for `symbol`, if one
    /// exists. Never creates a record.
    async fn update_price(
        &self,
        symbol: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), StoreError>;
}
