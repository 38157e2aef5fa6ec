#![warn(missing_debug_implementations, rust_2018_idioms)]

//! The strategy host contract (`spec.md` §4.I): a `Strategy` trait fed
//! candles one at a time, a registry of strategy instances addressed by
//! `strategy_id`, and a small expression DSL for strategies that aren't
//! pre-compiled Rust.

mod context;
pub mod dsl;
mod error;
mod registry;
mod strategy_trait;

pub use context::StrategyContext;
pub use error::{DslError, RegistryError, StrategyError};
pub use registry::StrategyRegistry;
pub use strategy_trait::{Strategy, StrategyFactory};
