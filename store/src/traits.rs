use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferrotrade_types::{
    AccountSnapshot, BacktestMetrics, BacktestRecord, BacktestStatus, DeploymentRecord,
    DeploymentStatus, Ohlcv, OrderResponse, SnapshotType, Tick, Timeframe,
};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use uuid::Uuid;

/// Durable candle storage, keyed on `(source, symbol, timeframe, timestamp)`.
///
/// `insert` is idempotent: re-inserting a candle already on disk for the same
/// key overwrites it rather than erroring, matching the aggregator's at-least-
/// once emission.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn insert(&self, candle: &Ohlcv) -> Result<(), StorageError>;

    async fn latest(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Ohlcv>, StorageError>;

    /// Returns up to `limit` candles at or after `from_ts`, ordered by
    /// timestamp ascending. Used by the backtest engine to page through
    /// history without loading an entire run into memory at once.
    async fn page(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
        from_ts: i64,
        to_ts: i64,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, StorageError>;
}

/// Durable tick storage, keyed on `(source, symbol, tick.key())`.
#[async_trait]
pub trait TickStore: Send + Sync {
    async fn insert(&self, tick: &Tick) -> Result<(), StorageError>;

    async fn range(
        &self,
        source: &str,
        symbol: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Tick>, StorageError>;
}

/// Order book of record. `upsert` is keyed on the broker-assigned
/// `order.order_id`; callers replaying the same fill event twice must not
/// double count.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn upsert(
        &self,
        deployment_id: Option<Uuid>,
        backtest_id: Option<Uuid>,
        order: &OrderResponse,
    ) -> Result<(), StorageError>;

    async fn get(&self, order_id: &str) -> Result<Option<OrderResponse>, StorageError>;

    async fn list_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<OrderResponse>, StorageError>;

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<OrderResponse>, StorageError>;
}

#[async_trait]
pub trait BacktestStore: Send + Sync {
    async fn create(&self, record: &BacktestRecord) -> Result<(), StorageError>;

    async fn set_status(&self, backtest_id: Uuid, status: BacktestStatus) -> Result<(), StorageError>;

    /// Sets `status` to `failed` along with `failure_message`, used when the
    /// candle-reading loop itself errors (`spec.md` §4.J: "the final status
    /// is `failed` only if the loop itself cannot read candles").
    async fn set_failed(&self, backtest_id: Uuid, failure_message: String) -> Result<(), StorageError>;

    async fn set_metrics(&self, backtest_id: Uuid, metrics: &BacktestMetrics) -> Result<(), StorageError>;

    async fn get(&self, backtest_id: Uuid) -> Result<Option<BacktestRecord>, StorageError>;
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn create(&self, record: &DeploymentRecord) -> Result<(), StorageError>;

    async fn set_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
    ) -> Result<(), StorageError>;

    /// Sets the deployment's terminal status (`stopped` or `error`) along with
    /// `error_message` and `stopped_at`, used by the deployment runtime once
    /// its strategy/control race finishes (`spec.md` §4.K step 6: "always set
    /// `stopped_at`").
    async fn set_terminal_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
        error_message: Option<String>,
        stopped_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Sets `starting_balance` on a deployment row that does not yet have
    /// one, called by the event handler the first time a `balance` snapshot
    /// arrives (`spec.md` §4.L: "single-writer ensures no race").
    async fn set_starting_balance(&self, deployment_id: Uuid, value: Decimal) -> Result<(), StorageError>;

    async fn get(&self, deployment_id: Uuid) -> Result<Option<DeploymentRecord>, StorageError>;

    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StorageError>;
}

/// Account equity/cash snapshots emitted on each closed candle during a live
/// deployment. `insert` is append-only; there is no update path.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert(&self, snapshot: &AccountSnapshot) -> Result<(), StorageError>;

    async fn latest(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Option<AccountSnapshot>, StorageError>;

    async fn series(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<AccountSnapshot>, StorageError>;
}

/// Convenience bundle so callers (the CLI, the deployment runtime) can take a
/// single `Arc<dyn Stores>` instead of threading five trait objects around.
pub trait Stores: Send + Sync {
    fn candles(&self) -> &(dyn CandleStore + '_);
    fn ticks(&self) -> &(dyn TickStore + '_);
    fn orders(&self) -> &(dyn OrderStore + '_);
    fn backtests(&self) -> &(dyn BacktestStore + '_);
    fn deployments(&self) -> &(dyn DeploymentStore + '_);
    fn snapshots(&self) -> &(dyn SnapshotStore + '_);
}

#[allow(dead_code)]
pub(crate) fn symbol_key(source: &str, symbol: &str) -> SmolStr {
    SmolStr::new(format!("{source}:{symbol}"))
}
