use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::prelude::*;
use tracing::{debug, error, warn};

use crate::{
    CurrencyRecord, CurrencyStore, StoreError, UpdateOutcome, record::parse_timestamp,
};

// Existence check and write run atomically server-side.
const UPDATE_PRICE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], 'price', ARGV[1], 'last_updated', ARGV[2])
    return 1
end
return 0
"#;

/// Currency records kept in Redis: one hash per symbol plus a set indexing
/// every provisioned symbol.
#[derive(Clone)]
pub struct RedisCurrencyStore {
    client: Client,
    key_prefix: String,
}

impl RedisCurrencyStore {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!(?server, ?error, "redis connection error");
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self::with_client(client, key))
    }

    fn with_client(client: Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key.into(),
        }
    }

    fn index_key(&self) -> String {
        format!("{}:currencies", self.key_prefix)
    }

    /// Symbols are used verbatim: `"usd"` and `"USD"` are different records.
    fn record_key(&self, symbol: &str) -> String {
        format!("{}:currency:{}", self.key_prefix, symbol)
    }

    /// Insert or replace a whole record. Used for out-of-band seeding, never
    /// by the sync cycle.
    pub async fn provision(&self, record: &CurrencyRecord) -> Result<(), StoreError> {
        let _: i64 = self
            .client
            .hset(self.record_key(&record.symbol), record.to_fields())
            .await?;
        let _: i64 = self
            .client
            .sadd(self.index_key(), record.symbol.as_str())
            .await?;

        Ok(())
    }

    /// Read one record back.
    pub async fn get(&self, symbol: &str) -> Result<Option<CurrencyRecord>, StoreError> {
        let key = self.record_key(symbol);
        let fields: HashMap<String, String> = self.client.hgetall(&key).await?;

        if fields.is_empty() {
            Ok(None)
        } else {
            CurrencyRecord::from_fields(&key, fields).map(Some)
        }
    }
}

#[async_trait]
impl CurrencyStore for RedisCurrencyStore {
    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.client.scard(self.index_key()).await?;
        Ok(count as usize)
    }

    async fn most_recent_update(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let symbols: Vec<String> = self.client.smembers(self.index_key()).await?;

        let mut latest: Option<DateTime<Utc>> = None;
        for symbol in symbols {
            let raw: Option<String> = self
                .client
                .hget(self.record_key(&symbol), "last_updated")
                .await?;

            match raw.as_deref().and_then(parse_timestamp) {
                Some(ts) => latest = latest.max(Some(ts)),
                None => warn!(%symbol, ?raw, "record has no usable last_updated"),
            }
        }

        Ok(latest)
    }

    async fn update_price(
        &self,
        symbol: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let matched: i64 = self
            .client
            .eval(
                UPDATE_PRICE_SCRIPT,
                self.record_key(symbol),
                vec![price.to_string(), now.to_rfc3339()],
            )
            .await?;

        debug!(symbol, price, matched, "update_price");

        Ok(if matched == 1 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NotFound
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.client.quit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use fred::mocks::{MockCommand, Mocks};
    use std::{
        collections::BTreeSet,
        sync::{Arc, Mutex},
    };

    /// Just enough of Redis for the commands this store sends.
    #[derive(Debug, Default)]
    struct FakeRedis {
        hashes: Mutex<HashMap<String, HashMap<String, String>>>,
        sets: Mutex<HashMap<String, BTreeSet<String>>>,
    }

    impl FakeRedis {
        fn field(&self, key: &str, field: &str) -> Option<String> {
            self.hashes.lock().unwrap().get(key)?.get(field).cloned()
        }

        fn keys(&self) -> BTreeSet<String> {
            self.hashes.lock().unwrap().keys().cloned().collect()
        }
    }

    impl Mocks for FakeRedis {
        fn process_command(&self, command: MockCommand) -> Result<Value, Error> {
            let args: Vec<String> = command
                .args
                .iter()
                .map(|arg| arg.as_string().unwrap_or_default())
                .collect();
            let mut hashes = self.hashes.lock().unwrap();
            let mut sets = self.sets.lock().unwrap();

            let value = match &*command.cmd {
                "HSET" => {
                    let hash = hashes.entry(args[0].clone()).or_default();
                    let added = args[1..]
                        .chunks(2)
                        .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                        .count();
                    Value::Integer(added as i64)
                }
                "HGET" => hashes
                    .get(&args[0])
                    .and_then(|hash| hash.get(&args[1]))
                    .cloned()
                    .map_or(Value::Null, Value::from),
                "HGETALL" => Value::Array(
                    hashes
                        .get(&args[0])
                        .into_iter()
                        .flatten()
                        .flat_map(|(k, v)| [Value::from(k.clone()), Value::from(v.clone())])
                        .collect(),
                ),
                "SADD" => {
                    let set = sets.entry(args[0].clone()).or_default();
                    let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
                    Value::Integer(added as i64)
                }
                "SCARD" => Value::Integer(sets.get(&args[0]).map_or(0, BTreeSet::len) as i64),
                "SMEMBERS" => Value::Array(
                    sets.get(&args[0])
                        .into_iter()
                        .flatten()
                        .cloned()
                        .map(Value::from)
                        .collect(),
                ),
                // script, numkeys, key, price, last_updated
                "EVAL" => match hashes.get_mut(&args[2]) {
                    Some(hash) => {
                        hash.insert("price".to_string(), args[3].clone());
                        hash.insert("last_updated".to_string(), args[4].clone());
                        Value::Integer(1)
                    }
                    None => Value::Integer(0),
                },
                other => {
                    return Err(Error::new(
                        ErrorKind::Unknown,
                        format!("unsupported command {other}"),
                    ));
                }
            };

            Ok(value)
        }
    }

    async fn fake_store(prefix: &str) -> (RedisCurrencyStore, Arc<FakeRedis>) {
        let redis = Arc::new(FakeRedis::default());
        let mocks: Arc<dyn Mocks> = redis.clone();
        let config = Config {
            mocks: Some(mocks),
            ..Default::default()
        };
        let client = Builder::from_config(config).build().unwrap();
        client.init().await.unwrap();

        (RedisCurrencyStore::with_client(client, prefix), redis)
    }

    fn record(symbol: &str, price: f64) -> CurrencyRecord {
        CurrencyRecord::new(symbol, symbol, symbol, price, 0.5, "toman")
    }

    #[tokio::test]
    async fn test_key_layout() {
        let (store, _) = fake_store("p").await;

        assert_eq!(store.index_key(), "p:currencies");
        assert_eq!(store.record_key("USD"), "p:currency:USD");
        assert_eq!(store.record_key("usd"), "p:currency:usd");
        assert_eq!(store.record_key(" usd "), "p:currency: usd ");
    }

    #[tokio::test]
    async fn test_provision_keeps_symbol_as_given() {
        let (store, redis) = fake_store("p").await;

        store.provision(&record("usd", 1.0)).await.unwrap();

        assert_eq!(redis.keys(), BTreeSet::from(["p:currency:usd".to_string()]));
        assert_eq!(redis.field("p:currency:usd", "symbol").as_deref(), Some("usd"));
        assert_eq!(store.get("usd").await.unwrap().unwrap().symbol, "usd");
        assert!(store.get("USD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_price_matches_symbol_exactly() {
        let (store, redis) = fake_store("p").await;
        store.provision(&record("USD", 1.0)).await.unwrap();
        let now = Utc::now();

        for key in ["usd", " USD", "USD ", "EUR"] {
            let outcome = store.update_price(key, 2.0, now).await.unwrap();
            assert_eq!(outcome, UpdateOutcome::NotFound, "{key:?}");
        }
        assert_eq!(redis.field("p:currency:USD", "price").as_deref(), Some("1"));
        assert_eq!(redis.keys().len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let outcome = store.update_price("USD", 1.02, now).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let usd = store.get("USD").await.unwrap().unwrap();
        assert_eq!(usd.price, 1.02);
        assert_eq!(usd.last_updated.timestamp(), now.timestamp());
        assert_eq!(usd.change_percent, 0.5);
    }

    #[tokio::test]
    async fn test_count_and_most_recent_update_follow_index() {
        let (store, redis) = fake_store("p").await;
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.most_recent_update().await.unwrap(), None);

        let mut old = record("USD", 1.0);
        old.last_updated = Utc::now() - ChronoDuration::hours(3);
        let newer = record("XAU", 1900.0);
        store.provision(&old).await.unwrap();
        store.provision(&newer).await.unwrap();

        // unreadable timestamps are skipped, not fatal
        redis
            .hashes
            .lock()
            .unwrap()
            .entry("p:currency:BAD".to_string())
            .or_default()
            .insert("last_updated".to_string(), "yesterday".to_string());
        redis
            .sets
            .lock()
            .unwrap()
            .entry("p:currencies".to_string())
            .or_default()
            .insert("BAD".to_string());

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(
            store.most_recent_update().await.unwrap().map(|t| t.timestamp()),
            Some(newer.last_updated.timestamp())
        );
    }

    // Needs a disposable Redis, e.g. `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.
    async fn connect_test_store(prefix: &str) -> RedisCurrencyStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisCurrencyStore::connect(&url, prefix).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running redis"]
    async fn test_update_price_only_touches_existing_symbols() {
        let prefix = format!("currency-test-{}", std::process::id());
        let store = connect_test_store(&prefix).await;

        let usd = CurrencyRecord::new("USD", "US Dollar", "دلار", 1.0, 0.0, "IRR");
        store.provision(&usd).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let now = Utc::now();
        let outcome = store.update_price("USD", 1.02, now).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let lowercase = store.update_price("usd", 1.5, now).await.unwrap();
        assert_eq!(lowercase, UpdateOutcome::NotFound);

        let missing = store.update_price("EUR", 1.1, now).await.unwrap();
        assert_eq!(missing, UpdateOutcome::NotFound);
        assert!(store.get("EUR").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);

        let stored = store.get("USD").await.unwrap().unwrap();
        assert_eq!(stored.price, 1.02);
        assert_eq!(stored.name_en, "US Dollar");
        assert_eq!(stored.last_updated.timestamp(), now.timestamp());
        assert_eq!(
            store.most_recent_update().await.unwrap().map(|t| t.timestamp()),
            Some(now.timestamp())
        );

        let _: i64 = store
            .client
            .del(vec![store.record_key("USD"), store.index_key()])
            .await
            .unwrap();
        store.close().await.unwrap();
    }
}
