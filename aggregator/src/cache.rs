use crate::AggregatorError;
use async_trait::async_trait;
use ferrotrade_types::Ohlcv;
use parking_lot::Mutex;
use redis::AsyncCommands;
use std::collections::HashMap;

/// Recovery storage for in-progress candles (`spec.md` §4.C): written after
/// every tick update under key `ohlc:{source}:{symbol}:{tf}`, scanned once
/// at aggregator startup to rehydrate state before consuming new ticks.
/// Closed candles are never restored here — the historical store is
/// authoritative for those.
#[async_trait]
pub trait RecoveryCache: Send + Sync {
    async fn set(&self, key: &str, candle: &Ohlcv) -> Result<(), AggregatorError>;

    /// Returns every in-progress candle currently cached, regardless of key,
    /// since each candle's own fields carry its `(source, symbol,
    /// timeframe)` triple.
    async fn scan(&self) -> Result<Vec<Ohlcv>, AggregatorError>;
}

/// Production recovery cache, backed by Redis strings holding serialised
/// candles.
pub struct RedisRecoveryCache {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisRecoveryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRecoveryCache").finish_non_exhaustive()
    }
}

impl RedisRecoveryCache {
    pub async fn connect(redis_url: &str) -> Result<Self, AggregatorError> {
        let client = redis::Client::open(redis_url).map_err(|e| AggregatorError::Cache(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AggregatorError::Cache(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl RecoveryCache for RedisRecoveryCache {
    async fn set(&self, key: &str, candle: &Ohlcv) -> Result<(), AggregatorError> {
        let payload = serde_json::to_vec(candle).expect("Ohlcv is always serialisable");
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, payload)
            .await
            .map_err(|e| AggregatorError::Cache(e.to_string()))
    }

    async fn scan(&self) -> Result<Vec<Ohlcv>, AggregatorError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AggregatorError::Cache(e.to_string()))?;
        let keys: Vec<String> = conn
            .keys("ohlc:*")
            .await
            .map_err(|e| AggregatorError::Cache(e.to_string()))?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Option<Vec<u8>>> = conn
            .mget(&keys)
            .await
            .map_err(|e| AggregatorError::Cache(e.to_string()))?;
        Ok(raw
            .into_iter()
            .flatten()
            .filter_map(|bytes| serde_json::from_slice(&bytes).ok())
            .collect())
    }
}

/// In-memory recovery cache for tests and the CLI's single-process demo.
#[derive(Debug, Default)]
pub struct InMemoryRecoveryCache {
    entries: Mutex<HashMap<String, Ohlcv>>,
}

impl InMemoryRecoveryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryCache for InMemoryRecoveryCache {
    async fn set(&self, key: &str, candle: &Ohlcv) -> Result<(), AggregatorError> {
        self.entries.lock().insert(key.to_owned(), candle.clone());
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Ohlcv>, AggregatorError> {
        Ok(self.entries.lock().values().cloned().collect())
    }
}
