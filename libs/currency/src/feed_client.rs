use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::FeedError;

pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of current quotes.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    async fn fetch_quotes(&self) -> Result<Vec<QuoteItem>, FeedError>;
}

#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    base_api: String,
    api_key: String,
    timeout: Duration,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_api", &self.base_api)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FeedClient {
    pub fn new(
        base_api: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FeedError::Request)?;

        Ok(Self {
            client,
            base_api: base_api.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub async fn fetch(&self) -> Result<QuotesResponse, FeedError> {
        let res: QuotesResponse = self
            .client
            .get(&self.base_api)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| FeedError::from_reqwest(e, self.timeout))?
            .json()
            .await
            .map_err(|e| FeedError::from_reqwest(e, self.timeout))?;

        debug!(
            gold = res.gold.len(),
            currency = res.currency.len(),
            "fetched quotes"
        );

        Ok(res)
    }
}

#[async_trait]
impl QuoteFeed for FeedClient {
    async fn fetch_quotes(&self) -> Result<Vec<QuoteItem>, FeedError> {
        Ok(self.fetch().await?.into_items())
    }
}

//
// Feed payload: two category arrays, every other top-level field ignored.
// Items stay as raw JSON so one bad entry cannot fail the whole payload.
//
#[derive(Debug, Deserialize, Clone)]
pub struct QuotesResponse {
    pub gold: Vec<QuoteItem>,
    pub currency: Vec<QuoteItem>,
}

impl QuotesResponse {
    /// Gold quotes first, then currencies.
    pub fn into_items(self) -> Vec<QuoteItem> {
        let mut items = self.gold;
        items.extend(self.currency);
        items
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct QuoteItem(Value);

/// A `price` field that is present and non-null.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotePrice {
    Number(f64),
    /// Present but neither a JSON number nor a numeric string.
    Invalid,
}

impl QuoteItem {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Non-empty string `symbol`, if present.
    pub fn symbol(&self) -> Option<&str> {
        self.0
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `None` when `price` is absent or null. Numeric strings such as
    /// `"61000"` are accepted. Zero is a valid price.
    pub fn price(&self) -> Option<QuotePrice> {
        let price = match self.0.get("price")? {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        Some(match price {
            Some(price) if price.is_finite() => QuotePrice::Number(price),
            _ => QuotePrice::Invalid,
        })
    }
}

impl fmt::Display for QuoteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
