#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Tick source adapters (`spec.md` §4.B): a `TickSource` trait with a
//! streaming operation and a historical backfill operation, plus two
//! implementations — [`ReplayTickSource`] for tests and backtests, and
//! [`WebSocketTickSource`] for a live venue feed.
//!
//! Adapters only produce [`ferrotrade_types::Tick`]s; turning those into
//! candles is the aggregator crate's job. Non-goal carried from `spec.md`:
//! no venue-specific authentication or order-book depth — ticks only.

mod error;
mod replay;
mod traits;
mod websocket;

pub use error::TickSourceError;
pub use replay::ReplayTickSource;
pub use traits::{TickParser, TickSource};
pub use websocket::WebSocketTickSource;
