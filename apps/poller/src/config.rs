use std::{env::var, fmt, time::Duration};

use anyhow::{Context, Result, bail};

pub const DEFAULT_KEY_PREFIX: &str = "currencies";
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_FEED_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone)]
pub struct Config {
    pub feed_url: String,
    pub feed_api_key: String,
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub update_interval: Duration,
    pub feed_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("feed_url", &self.feed_url)
            .field("feed_api_key", &"<redacted>")
            .field("redis_url", &"<redacted>")
            .field("redis_key_prefix", &self.redis_key_prefix)
            .field("update_interval", &self.update_interval)
            .field("feed_timeout", &self.feed_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| get(key).with_context(|| format!("{key} environment variable is required"));

        Ok(Self {
            feed_url: required("BRS_API_ADDRESS")?,
            feed_api_key: required("BRS_API_KEY")?,
            redis_url: required("REDIS_URL")?,
            redis_key_prefix: get("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            update_interval: millis(
                get("UPDATE_INTERVAL"),
                "UPDATE_INTERVAL",
                DEFAULT_UPDATE_INTERVAL_MS,
            )?,
            feed_timeout: millis(
                get("FEED_TIMEOUT_MS"),
                "FEED_TIMEOUT_MS",
                DEFAULT_FEED_TIMEOUT_MS,
            )?,
        })
    }
}

fn millis(raw: Option<String>, key: &str, default: u64) -> Result<Duration> {
    let ms = match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of milliseconds, got `{raw}`"))?,
        None => default,
    };

    if ms == 0 {
        bail!("{key} must be greater than zero");
    }

    Ok(Duration::from_millis(ms))
}
