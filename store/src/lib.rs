#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Repository traits for candles, ticks, orders, backtests, deployments, and
//! account snapshots, plus a Postgres implementation ([`PgStore`]) and an
//! in-memory one ([`InMemoryStore`]) used by tests and the backtest engine.

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::StorageError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use traits::{
    BacktestStore, CandleStore, DeploymentStore, OrderStore, SnapshotStore, Stores, TickStore,
};
