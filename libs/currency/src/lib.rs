mod error;
mod feed_client;
mod memory_store;
mod record;
mod redis_store;
mod store;

pub use error::{FeedError, StoreError};
pub use feed_client::{
    DEFAULT_FEED_TIMEOUT, FeedClient, QuoteFeed, QuoteItem, QuotePrice, QuotesResponse,
};
pub use memory_store::MemoryCurrencyStore;
pub use record::CurrencyRecord;
pub use redis_store::RedisCurrencyStore;
pub use store::{CurrencyStore, UpdateOutcome};
