use crate::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    StopRequested,
    Stopped,
    Error,
}

impl DeploymentStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Stopped | DeploymentStatus::Error)
    }
}

/// Live execution of a strategy against a broker account.
///
/// A deployment exclusively owns its orders and snapshots (cascade delete).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeploymentRecord {
    pub deployment_id: Uuid,
    pub strategy_id: Uuid,
    pub broker_connection_id: Uuid,
    pub symbol: SmolStr,
    pub timeframe: Timeframe,
    pub starting_balance: Option<Decimal>,
    pub status: DeploymentStatus,
    pub error_message: Option<String>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One point of an equity or cash time series.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct CurvePoint {
    pub timestamp: i64,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestMetrics {
    pub realised_pnl: Decimal,
    pub unrealised_pnl: Decimal,
    pub total_return_pct: Decimal,
    pub sharpe_ratio: Decimal,
    /// Non-positive percentage: the largest peak-to-trough decline observed
    /// on the equity curve, e.g. `-0.12` for a 12% drawdown.
    pub max_drawdown: Decimal,
    pub total_trades: u64,
    pub equity_curve: Vec<CurvePoint>,
}

/// Offline replay of historical candles through a strategy.
///
/// A strategy exclusively owns its backtests (cascade delete).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestRecord {
    pub backtest_id: Uuid,
    pub strategy_id: Uuid,
    pub symbol: SmolStr,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub starting_balance: Decimal,
    pub status: BacktestStatus,
    /// Human-readable failure reason; set only when `status == Failed`.
    pub failure_message: Option<String>,
    pub metrics: Option<BacktestMetrics>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Equity,
    Balance,
}

/// Point-in-time sample of equity or cash, persisted for later analysis.
///
/// Append-only. The first `balance` snapshot for a deployment sets that
/// deployment's `starting_balance`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountSnapshot {
    pub snapshot_id: Uuid,
    pub deployment_id: Uuid,
    pub timestamp: i64,
    pub snapshot_type: SnapshotType,
    pub value: Decimal,
}
