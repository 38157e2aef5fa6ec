#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Runs one strategy live against a broker connection for the lifetime of a
//! deployment row (`spec.md` §4.K): a strategy task streaming candles
//! through a [`ferrotrade_execution::ProxyBroker`], racing a control task
//! that watches for a `DeploymentStop` event, with cooperative cancellation
//! of whichever task loses the race.

mod error;
mod runtime;

pub use error::DeploymentError;
pub use runtime::{DeploymentRuntime, CANCELLATION_GRACE_PERIOD};
