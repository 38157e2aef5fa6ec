use crate::traits::{BacktestStore, CandleStore, DeploymentStore, OrderStore, SnapshotStore, Stores, TickStore};
use crate::StorageError;
use async_trait::async_trait;
use ferrotrade_types::{
    AccountSnapshot, BacktestMetrics, BacktestRecord, BacktestStatus, DeploymentRecord,
    DeploymentStatus, Ohlcv, OrderResponse, OrderStatus, SnapshotType, Tick, Timeframe,
};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed implementation of every repository trait in this crate,
/// sharing one connection pool. Migrations live under `migrations/` and are
/// applied with `sqlx::migrate!` at process startup, not by this type.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CandleStore for PgStore {
    async fn insert(&self, candle: &Ohlcv) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO candles (source, symbol, timeframe, ts, open, high, low, close, volume)
            VALUES ($1, $2, $3, to_timestamp($4), $5, $6, $7, $8, $9)
            ON CONFLICT (source, symbol, timeframe, ts)
            DO UPDATE SET open = EXCLUDED.open, high = EXCLUDED.high,
                          low = EXCLUDED.low, close = EXCLUDED.close, volume = EXCLUDED.volume
            "#,
        )
        .bind(candle.source.as_str())
        .bind(candle.symbol.as_str())
        .bind(candle.timeframe.as_str())
        .bind(candle.timestamp)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Ohlcv>, StorageError> {
        let row = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT source, symbol, timeframe, extract(epoch from ts)::bigint as ts,
                   open, high, low, close, volume
            FROM candles
            WHERE source = $1 AND symbol = $2 AND timeframe = $3
            ORDER BY ts DESC LIMIT 1
            "#,
        )
        .bind(source)
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
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
        let rows = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT source, symbol, timeframe, extract(epoch from ts)::bigint as ts,
                   open, high, low, close, volume
            FROM candles
            WHERE source = $1 AND symbol = $2 AND timeframe = $3
              AND ts >= to_timestamp($4) AND ts <= to_timestamp($5)
            ORDER BY ts ASC
            LIMIT $6
            "#,
        )
        .bind(source)
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(from_ts)
        .bind(to_ts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct CandleRow {
    source: String,
    symbol: String,
    timeframe: String,
    ts: i64,
    open: rust_decimal::Decimal,
    high: rust_decimal::Decimal,
    low: rust_decimal::Decimal,
    close: rust_decimal::Decimal,
    volume: rust_decimal::Decimal,
}

impl From<CandleRow> for Ohlcv {
    fn from(r: CandleRow) -> Self {
        Ohlcv {
            source: r.source.into(),
            symbol: r.symbol.into(),
            timeframe: r.timeframe.parse().unwrap_or(Timeframe::M1),
            timestamp: r.ts,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

#[async_trait]
impl TickStore for PgStore {
    async fn insert(&self, tick: &Tick) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO ticks (source, symbol, market_type, dedup_key, price, size, ts)
            VALUES ($1, $2, $3, $4, $5, $6, to_timestamp($7))
            ON CONFLICT (source, dedup_key) DO NOTHING
            "#,
        )
        .bind(tick.source.as_str())
        .bind(tick.symbol.as_str())
        .bind(serde_json::to_string(&tick.market_type).unwrap_or_default())
        .bind(tick.key())
        .bind(tick.price)
        .bind(tick.size)
        .bind(tick.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn range(
        &self,
        source: &str,
        symbol: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Tick>, StorageError> {
        let rows = sqlx::query_as::<_, TickRow>(
            r#"
            SELECT source, symbol, market_type, price, size, extract(epoch from ts)::bigint as ts
            FROM ticks
            WHERE source = $1 AND symbol = $2 AND ts >= to_timestamp($3) AND ts <= to_timestamp($4)
            ORDER BY ts ASC
            "#,
        )
        .bind(source)
        .bind(symbol)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct TickRow {
    source: String,
    symbol: String,
    market_type: String,
    price: rust_decimal::Decimal,
    size: rust_decimal::Decimal,
    ts: i64,
}

impl From<TickRow> for Tick {
    fn from(r: TickRow) -> Self {
        Tick {
            source: r.source.into(),
            symbol: r.symbol.into(),
            market_type: serde_json::from_str(&r.market_type).unwrap_or(ferrotrade_types::MarketType::Spot),
            price: r.price,
            size: r.size,
            timestamp: r.ts,
        }
    }
}

/// Every status the order-status DAG ([`OrderStatus::can_transition_to`])
/// allows moving forward into `next`, serialized the same way a status is
/// bound elsewhere in this file. Lets the upsert below reject a stale event
/// (e.g. a late `submitted` arriving after `filled`) at the SQL layer, as a
/// backstop to the same check already applied before this is called
/// (`spec.md` §5).
fn forward_predecessors(next: OrderStatus) -> Vec<String> {
    use OrderStatus::*;
    let predecessors: &[OrderStatus] = match next {
        Pending => &[],
        Submitted => &[Pending],
        PartiallyFilled => &[Submitted, PartiallyFilled],
        Filled => &[Submitted, PartiallyFilled],
        Cancelled => &[Submitted, PartiallyFilled],
        Rejected => &[Submitted],
        Expired => &[Submitted, PartiallyFilled],
    };
    predecessors
        .iter()
        .map(|s| serde_json::to_string(s).unwrap_or_default())
        .collect()
}

#[async_trait]
impl OrderStore for PgStore {
    async fn upsert(
        &self,
        deployment_id: Option<Uuid>,
        backtest_id: Option<Uuid>,
        order: &OrderResponse,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, deployment_id, backtest_id, client_order_id, symbol, side, order_type,
                quantity, filled_quantity, limit_price, stop_price, status, created_at, filled_at,
                avg_fill_price, time_in_force, broker_metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (order_id) DO UPDATE SET
                filled_quantity = EXCLUDED.filled_quantity,
                status = CASE
                    WHEN orders.status = EXCLUDED.status OR orders.status = ANY($18) THEN EXCLUDED.status
                    ELSE orders.status
                END,
                filled_at = EXCLUDED.filled_at,
                avg_fill_price = EXCLUDED.avg_fill_price,
                broker_metadata = EXCLUDED.broker_metadata
            "#,
        )
        .bind(&order.order_id)
        .bind(deployment_id)
        .bind(backtest_id)
        .bind(&order.client_order_id)
        .bind(order.symbol.as_str())
        .bind(serde_json::to_string(&order.side).unwrap_or_default())
        .bind(serde_json::to_string(&order.order_type).unwrap_or_default())
        .bind(order.quantity)
        .bind(order.filled_quantity)
        .bind(order.limit_price)
        .bind(order.stop_price)
        .bind(serde_json::to_string(&order.status).unwrap_or_default())
        .bind(order.created_at)
        .bind(order.filled_at)
        .bind(order.avg_fill_price)
        .bind(serde_json::to_string(&order.time_in_force).unwrap_or_default())
        .bind(&order.broker_metadata)
        .bind(forward_predecessors(order.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderResponse>, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"SELECT order_id, client_order_id, symbol, side, order_type, quantity,
                      filled_quantity, limit_price, stop_price, status, created_at, filled_at,
                      avg_fill_price, time_in_force, broker_metadata
               FROM orders WHERE order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TryInto::try_into).transpose()?)
    }

    async fn list_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<OrderResponse>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"SELECT order_id, client_order_id, symbol, side, order_type, quantity,
                      filled_quantity, limit_price, stop_price, status, created_at, filled_at,
                      avg_fill_price, time_in_force, broker_metadata
               FROM orders WHERE deployment_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<OrderResponse>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"SELECT order_id, client_order_id, symbol, side, order_type, quantity,
                      filled_quantity, limit_price, stop_price, status, created_at, filled_at,
                      avg_fill_price, time_in_force, broker_metadata
               FROM orders WHERE backtest_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(backtest_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    client_order_id: Option<String>,
    symbol: String,
    side: String,
    order_type: String,
    quantity: rust_decimal::Decimal,
    filled_quantity: rust_decimal::Decimal,
    limit_price: Option<rust_decimal::Decimal>,
    stop_price: Option<rust_decimal::Decimal>,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    filled_at: Option<chrono::DateTime<chrono::Utc>>,
    avg_fill_price: Option<rust_decimal::Decimal>,
    time_in_force: String,
    broker_metadata: serde_json::Value,
}

impl TryFrom<OrderRow> for OrderResponse {
    type Error = StorageError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(OrderResponse {
            order_id: r.order_id,
            client_order_id: r.client_order_id,
            symbol: r.symbol.into(),
            side: serde_json::from_str(&r.side).map_err(|e| StorageError::Other(e.to_string()))?,
            order_type: serde_json::from_str(&r.order_type)
                .map_err(|e| StorageError::Other(e.to_string()))?,
            quantity: r.quantity,
            filled_quantity: r.filled_quantity,
            limit_price: r.limit_price,
            stop_price: r.stop_price,
            status: serde_json::from_str(&r.status).map_err(|e| StorageError::Other(e.to_string()))?,
            created_at: r.created_at,
            filled_at: r.filled_at,
            avg_fill_price: r.avg_fill_price,
            time_in_force: serde_json::from_str(&r.time_in_force)
                .map_err(|e| StorageError::Other(e.to_string()))?,
            broker_metadata: r.broker_metadata,
        })
    }
}

#[async_trait]
impl BacktestStore for PgStore {
    async fn create(&self, record: &BacktestRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO backtests (backtest_id, strategy_id, symbol, start_date, end_date,
                                    timeframe, starting_balance, status, failure_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.backtest_id)
        .bind(record.strategy_id)
        .bind(record.symbol.as_str())
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(record.timeframe.as_str())
        .bind(record.starting_balance)
        .bind(serde_json::to_string(&record.status).unwrap_or_default())
        .bind(&record.failure_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, backtest_id: Uuid, status: BacktestStatus) -> Result<(), StorageError> {
        sqlx::query("UPDATE backtests SET status = $2 WHERE backtest_id = $1")
            .bind(backtest_id)
            .bind(serde_json::to_string(&status).unwrap_or_default())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_failed(&self, backtest_id: Uuid, failure_message: String) -> Result<(), StorageError> {
        sqlx::query("UPDATE backtests SET status = $2, failure_message = $3 WHERE backtest_id = $1")
            .bind(backtest_id)
            .bind(serde_json::to_string(&BacktestStatus::Failed).unwrap_or_default())
            .bind(failure_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_metrics(&self, backtest_id: Uuid, metrics: &BacktestMetrics) -> Result<(), StorageError> {
        let metrics_json =
            serde_json::to_value(metrics).map_err(|e| StorageError::Other(e.to_string()))?;
        sqlx::query("UPDATE backtests SET metrics = $2 WHERE backtest_id = $1")
            .bind(backtest_id)
            .bind(metrics_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, backtest_id: Uuid) -> Result<Option<BacktestRecord>, StorageError> {
        let row = sqlx::query_as::<_, BacktestRow>(
            r#"SELECT backtest_id, strategy_id, symbol, start_date, end_date, timeframe,
                      starting_balance, status, failure_message, metrics
               FROM backtests WHERE backtest_id = $1"#,
        )
        .bind(backtest_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct BacktestRow {
    backtest_id: Uuid,
    strategy_id: Uuid,
    symbol: String,
    start_date: chrono::DateTime<chrono::Utc>,
    end_date: chrono::DateTime<chrono::Utc>,
    timeframe: String,
    starting_balance: rust_decimal::Decimal,
    status: String,
    failure_message: Option<String>,
    metrics: Option<serde_json::Value>,
}

impl TryFrom<BacktestRow> for BacktestRecord {
    type Error = StorageError;

    fn try_from(r: BacktestRow) -> Result<Self, Self::Error> {
        Ok(BacktestRecord {
            backtest_id: r.backtest_id,
            strategy_id: r.strategy_id,
            symbol: r.symbol.into(),
            start_date: r.start_date,
            end_date: r.end_date,
            timeframe: r.timeframe.parse().unwrap_or(Timeframe::M1),
            starting_balance: r.starting_balance,
            status: serde_json::from_str(&r.status).map_err(|e| StorageError::Other(e.to_string()))?,
            failure_message: r.failure_message,
            metrics: r
                .metrics
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| StorageError::Other(e.to_string()))?,
        })
    }
}

#[async_trait]
impl DeploymentStore for PgStore {
    async fn create(&self, record: &DeploymentRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO deployments (deployment_id, strategy_id, broker_connection_id, symbol,
                                      timeframe, starting_balance, status, error_message, stopped_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.deployment_id)
        .bind(record.strategy_id)
        .bind(record.broker_connection_id)
        .bind(record.symbol.as_str())
        .bind(record.timeframe.as_str())
        .bind(record.starting_balance)
        .bind(serde_json::to_string(&record.status).unwrap_or_default())
        .bind(&record.error_message)
        .bind(record.stopped_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE deployments SET status = $2, updated_at = now() WHERE deployment_id = $1")
            .bind(deployment_id)
            .bind(serde_json::to_string(&status).unwrap_or_default())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_terminal_status(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
        error_message: Option<String>,
        stopped_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE deployments SET status = $2, error_message = $3, stopped_at = $4, updated_at = now() WHERE deployment_id = $1",
        )
        .bind(deployment_id)
        .bind(serde_json::to_string(&status).unwrap_or_default())
        .bind(&error_message)
        .bind(stopped_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_starting_balance(
        &self,
        deployment_id: Uuid,
        value: rust_decimal::Decimal,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE deployments SET starting_balance = $2, updated_at = now() WHERE deployment_id = $1")
            .bind(deployment_id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, deployment_id: Uuid) -> Result<Option<DeploymentRecord>, StorageError> {
        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"SELECT deployment_id, strategy_id, broker_connection_id, symbol, timeframe,
                      starting_balance, status, error_message, stopped_at, created_at, updated_at
               FROM deployments WHERE deployment_id = $1"#,
        )
        .bind(deployment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StorageError> {
        let rows = sqlx::query_as::<_, DeploymentRow>(
            r#"SELECT deployment_id, strategy_id, broker_connection_id, symbol, timeframe,
                      starting_balance, status, error_message, stopped_at, created_at, updated_at
               FROM deployments WHERE status = 'running'"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    deployment_id: Uuid,
    strategy_id: Uuid,
    broker_connection_id: Uuid,
    symbol: String,
    timeframe: String,
    starting_balance: Option<rust_decimal::Decimal>,
    status: String,
    error_message: Option<String>,
    stopped_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<DeploymentRow> for DeploymentRecord {
    type Error = StorageError;

    fn try_from(r: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(DeploymentRecord {
            deployment_id: r.deployment_id,
            strategy_id: r.strategy_id,
            broker_connection_id: r.broker_connection_id,
            symbol: r.symbol.into(),
            timeframe: r.timeframe.parse().unwrap_or(Timeframe::M1),
            starting_balance: r.starting_balance,
            status: serde_json::from_str(&r.status).map_err(|e| StorageError::Other(e.to_string()))?,
            error_message: r.error_message,
            stopped_at: r.stopped_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn insert(&self, snapshot: &AccountSnapshot) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (snapshot_id, deployment_id, ts, snapshot_type, value)
            VALUES ($1, $2, to_timestamp($3), $4, $5)
            "#,
        )
        .bind(snapshot.snapshot_id)
        .bind(snapshot.deployment_id)
        .bind(snapshot.timestamp)
        .bind(serde_json::to_string(&snapshot.snapshot_type).unwrap_or_default())
        .bind(snapshot.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Option<AccountSnapshot>, StorageError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT snapshot_id, deployment_id, extract(epoch from ts)::bigint as ts,
                   snapshot_type, value
            FROM snapshots
            WHERE deployment_id = $1 AND snapshot_type = $2
            ORDER BY ts DESC LIMIT 1
            "#,
        )
        .bind(deployment_id)
        .bind(serde_json::to_string(&snapshot_type).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TryInto::try_into).transpose()?)
    }

    async fn series(
        &self,
        deployment_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<AccountSnapshot>, StorageError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT snapshot_id, deployment_id, extract(epoch from ts)::bigint as ts,
                   snapshot_type, value
            FROM snapshots
            WHERE deployment_id = $1 AND snapshot_type = $2
            ORDER BY ts ASC
            "#,
        )
        .bind(deployment_id)
        .bind(serde_json::to_string(&snapshot_type).unwrap_or_default())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    snapshot_id: Uuid,
    deployment_id: Uuid,
    ts: i64,
    snapshot_type: String,
    value: rust_decimal::Decimal,
}

impl TryFrom<SnapshotRow> for AccountSnapshot {
    type Error = StorageError;

    fn try_from(r: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(AccountSnapshot {
            snapshot_id: r.snapshot_id,
            deployment_id: r.deployment_id,
            timestamp: r.ts,
            snapshot_type: serde_json::from_str(&r.snapshot_type)
                .map_err(|e| StorageError::Other(e.to_string()))?,
            value: r.value,
        })
    }
}

impl Stores for PgStore {
    fn candles(&self) -> &(dyn CandleStore + '_) {
        self
    }
    fn ticks(&self) -> &(dyn TickStore + '_) {
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
