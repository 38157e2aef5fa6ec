#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Broker implementations (`spec.md` §4.F/G/H): [`LiveBroker`] talks to a
//! real venue over a signed REST API and the candle-close bus channel,
//! [`SimulatedBroker`] deterministically replays candles against an
//! in-process ledger for backtests, and [`ProxyBroker`] wraps either to
//! publish order/snapshot lifecycle events.

mod live;
mod proxy;
mod simulated;

pub use live::{LiveBroker, LiveBrokerConfig};
pub use proxy::ProxyBroker;
pub use simulated::{generate_order_id, SimulatedBroker};
