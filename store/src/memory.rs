use crate::traits::{BacktestStore, CandleStore, DeploymentStore, OrderStore, SnapshotStore, Stores};
use crate::StorageError;
use async_trait::async_trait;
use ferrotrade_types::{
    AccountSnapshot, BacktestMetrics, BacktestRecord, BacktestStatus, DeploymentRecord,
    DeploymentStatus, Ohlcv, OrderResponse, OrderStatus, SnapshotType, Tick, Timeframe,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// Everything the store crate can hold, backed by plain `HashMap`s behind a
/// single mutex. Used by unit tests across the workspace and by the
/// backtest engine, which never talks to Postgres.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    candles: Mutex<HashMap<(String, String, Timeframe), Vec<Ohlcv>>>,
    ticks: Mutex<HashMap<(String, String), Vec<Tick>>>,
    orders: Mutex<HashMap<String, OrderRow>>,
    backtests: Mutex<HashMap<Uuid, BacktestRecord>>,
    deployments: Mutex<HashMap<Uuid, DeploymentRecord>>,
    snapshots: Mutex<Vec<AccountSnapshot>>,
}

#[derive(Debug, Clone)]
struct OrderRow {
    deployment_id: Option<Uuid>,
    backtest_id: Option<Uuid>,
    order: OrderResponse,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleStore for InMemoryStore {
    async fn insert(&self, candle: &Ohlcv) -> Result<(), StorageError> {
        let key = (candle.source.to_string(), candle.symbol.to_string(), candle.timeframe);
        let mut candles = self.candles.lock();
        let series = candles.entry(key).or_default();
        match series.binary_search_by_key(&candle.timestamp, |c| c.timestamp) {
            Ok(idx) => series[idx] = candle.clone(),
            Err(idx) => series.insert(idx, candle.clone()),
        }
        Ok(())
    }

    async fn latest(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Ohlcv>, StorageError> {
        let key = (source.to_owned(), symbol.to_owned(), timeframe);
        Ok(self.candles.lock().get(&key).and_then(|s| s.last().cloned()))
    }

    async fn page(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
        from_ts: i64,
        to_ts: i64,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, StorageError> {
        let key = (source.to_owned(), symbol.to_owned(), timeframe);
        let candles = self.candles.lock();
        let Some(series) = candles.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(series
            .iter()
            .filter(|c| c.timestamp >= from_ts && c.timestamp <= to_ts)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl crate::traits::TickStore for InMemoryStore {
    async fn insert(&self, tick: &Tick) -> Result<(), StorageError> {
        let key = (tick.source.to_string(), tick.symbol.to_string());
        self.ticks.lock().entry(key).or_default().push(tick.clone());
        Ok(())
    }

    async fn range(
        &self,
        source: &str,
        symbol: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Tick>, StorageError> {
        let key = (source.to_owned(), symbol.to_owned());
        let ticks = self.ticks.lock();
        Ok(ticks
            .get(&key)
            .map(|s| {
                s.iter()
                    .filter(|t| t.timestamp >= from_ts && t.timestamp <= to_ts)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn upsert(
        &self,
        deployment_id: Option<Uuid>,
        backtest_id: Option<Uuid>,
        order: &OrderResponse,
    ) -> Result<(), StorageError> {
        let mut orders = self.orders.lock();
        if let Some(existing) = orders.get(&order.order_id) {
            let current = existing.order.status;
            if current != order.status && !current.can_transition_to(order.status) {
                // Stale/out-of-order status, e.g. a late `submitted` after
                // `filled` has already landed — drop it rather than
                // regressing the stored status (`spec.md` §5).
                return Ok(());
            }
        }
        orders.insert(
            order.order_id.clone(),
            OrderRow {
                deployment_id,
                backtest_id,
                order: order.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderResponse>, StorageError> {
        Ok(self.orders.lock().get(order_id).map(|r| r.order.clone()))
    }

    async fn list_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<OrderResponse>, StorageError> {
        Ok(self
            .orders
            .lock()
            .values()
            .filter(|r| r.deployment_id == Some(deployment_id))
            .map(|r| r.order.clone())
            .collect())
    }

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<OrderResponse>, StorageError> {
        Ok(self
            .orders
            .lock()
            .values()
            .filter(|r| r.backtest_id == Some(backtest_id))
            .map(|r| r.order.clone())
            .collect())
    }
}

#[async_trait]
impl BacktestStore for InMemoryStore {
    async fn create(&self, record: &BacktestRecord) -> Result<(), StorageError> {
        self.backtests.lock().insert(record.backtest_id, record.clone());
        Ok(())
    }

    async fn set_status(&self, backtest_id: Uuid, status: BacktestStatus) -> Result<(), StorageError> {
        let mut backtests = self.backtests.lock();
        let record = backtests
            .get_mut(&backtest_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "backtest",
                id: backtest_id.to_string(),
            })?;
        record.status = status;
        Ok(())
    }

    async fn set_failed(&self, backtest_id: Uuid, failure_message: String) -> Result<(), StorageError> {
        let mut backtests = self.backtests.lock();
        let record = backtests
            .get_mut(&backtest_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "backtest",
                id: backtest_id.to_string(),
            })?;
        record.status = BacktestStatus::Failed;
        record.failure_message = Some(failure_message);
        Ok(())
    }

    async fn set_metrics(&self, backtest_id: Uuid, metrics: &BacktestMetrics) -> Result<(), StorageError> {
        let mut backtests = self.backtests.lock();
        let record = backtests
            .get_mut(&backtest_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "backtest",
                id: backtest_id.to_string(),
            })?;
        record.metrics = Some(metrics.clone());
        Ok(())
    }

    async fn get(&self, backtest_id: Uuid) -> Result<Option<BacktestRecord>, StorageError> {
        Ok(self.backtests.lock().get(&backtest_id).cloned())
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn create(&self, record: &DeploymentRecord) -> Result<(), StorageError> {
        self.deployments.lock().insert(record.deployment_id, record.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
    ) -> Result<(), StorageError> {
        let mut deployments = self.deployments.lock();
        let record = deployments
            .get_mut(&deployment_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "deployment",
                id: deployment_id.to_string(),
            })?;
        record.status = status;
        Ok(())
    }

    async fn set_terminal_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
        error_message: Option<String>,
        stopped_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError> {
        let mut deployments = self.deployments.lock();
        let record = deployments
            .get_mut(&deployment_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "deployment",
                id: deployment_id.to_string(),
            })?;
        record.status = status;
        record.error_message = error_message;
        record.stopped_at = Some(stopped_at);
        Ok(())
    }

    async fn set_starting_balance(
        &self,
        deployment_id: Uuid,
        value: rust_decimal::Decimal,
    ) -> Result<(), StorageError> {
        let mut deployments = self.deployments.lock();
        let record = deployments
            .get_mut(&deployment_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "deployment",
                id: deployment_id.to_string(),
            })?;
        record.starting_balance = Some(value);
        Ok(())
    }

    async fn get(&self, deployment_id: Uuid) -> Result<Option<DeploymentRecord>, StorageError> {
        Ok(self.deployments.lock().get(&deployment_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StorageError> {
        Ok(self
            .deployments
            .lock()
            .values()
            .filter(|d| d.status == DeploymentStatus::Running)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn insert(&self, snapshot: &AccountSnapshot) -> Result<(), StorageError> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }

    async fn latest(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Option<AccountSnapshot>, StorageError> {
        Ok(self
            .snapshots
            .lock()
            .iter()
            .filter(|s| s.deployment_id == deployment_id && s.snapshot_type == snapshot_type)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn series(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<AccountSnapshot>, StorageError> {
        let mut series: Vec<AccountSnapshot> = self
            .snapshots
            .lock()
            .iter()
            .filter(|s| s.deployment_id == deployment_id && s.snapshot_type == snapshot_type)
            .cloned()
            .collect();
        series.sort_by_key(|s| s.timestamp);
        Ok(series)
    }
}

impl Stores for InMemoryStore {
    fn candles(&self) -> &(dyn CandleStore + '_) {
        self
    }
    fn ticks(&self) -> &(dyn crate::traits::TickStore + '_) {
        self
    }
    fn orders(&self) -> &(dyn OrderStore + '_) {
        self
    }
    fn backtests(&self) -> &(dyn BacktestStore + '_) {
        self
    }
    fn deployments(&self) -> &(dyn DeploymentStore + '_) {
        self
    }
    fn snapshots(&self) -> &(dyn SnapshotStore + '_) {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: rust_decimal::Decimal) -> Ohlcv {
        Ohlcv {
            source: "alpaca".into(),
            symbol: "AAPL".into(),
            timeframe: Timeframe::M1,
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_key() {
        let store = InMemoryStore::new();
        store.insert(&candle(60, dec!(10))).await.unwrap();
        store.insert(&candle(60, dec!(11))).await.unwrap();
        let page = store
            .page("alpaca", "AAPL", Timeframe::M1, 0, 120, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].close, dec!(11));
    }

    #[tokio::test]
    async fn page_is_ordered_by_timestamp() {
        let store = InMemoryStore::new();
        store.insert(&candle(180, dec!(3))).await.unwrap();
        store.insert(&candle(60, dec!(1))).await.unwrap();
        store.insert(&candle(120, dec!(2))).await.unwrap();
        let page = store
            .page("alpaca", "AAPL", Timeframe::M1, 0, 1000, 10)
            .await
            .unwrap();
        let timestamps: Vec<i64> = page.iter().map(|c| c.timestamp).collect();
        assert_eq!(timestamps, vec![60, 120, 180]);
    }
}
