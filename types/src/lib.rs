#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Canonical value types shared by every crate in the Ferrotrade execution
//! substrate: candles, ticks, timeframes, orders, accounts, and the
//! persisted record shapes (deployments, backtests, snapshots).
//!
//! This crate has no async runtime and no I/O — it only defines data and the
//! invariants/validation that apply to it, so every other crate can depend on
//! it without pulling in tokio, sqlx, or a broker client.

mod account;
mod candle;
mod error;
mod order;
mod records;
mod tick;
mod timeframe;

pub use account::Account;
pub use candle::{CandleInvariantError, Ohlcv};
pub use error::EngineError;
pub use order::{
    OrderRequest, OrderResponse, OrderSide, OrderStatus, OrderType, OrderValidationError,
    PendingOrder, TimeInForce,
};
pub use records::{
    AccountSnapshot, BacktestMetrics, BacktestRecord, BacktestStatus, CurvePoint,
    DeploymentRecord, DeploymentStatus, SnapshotType,
};
pub use tick::{MarketType, Tick};
pub use timeframe::{Timeframe, UnknownTimeframe};
