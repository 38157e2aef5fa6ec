#![warn(missing_debug_implementations, rust_2018_idioms)]

//! The OHLCV aggregator (`spec.md` §4.C): folds a tick stream into candles
//! for every timeframe, emits closed candles onto the bus and into the
//! historical store, and recovers in-progress state after a restart.

mod aggregator;
mod cache;
mod error;

pub use aggregator::Aggregator;
pub use cache::{InMemoryRecoveryCache, RecoveryCache, RedisRecoveryCache};
pub use error::AggregatorError;
