use std::time::Duration;

use thiserror::Error;

/// Failures talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or driver level failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<fred::error::Error> for StoreError {
    fn from(err: fred::error::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Failures of the upstream quote feed call itself.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request timed out after {0:?}")]
    Timeout(Duration),

    #[error("feed request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl FeedError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Request(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
