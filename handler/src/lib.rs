#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Subscribes to `orders.events` and `snapshots.events` and translates each
//! message into an idempotent database mutation (`spec.md` §4.L).
//!
//! The two consumers run concurrently, each with its own reconnect-with-
//! backoff loop; a per-message failure (malformed payload, a modify/cancel
//! arriving before its placement) is logged and the message dropped, never
//! aborting the consumer.

mod error;
mod orders;
mod run;
mod snapshots;

pub use error::HandlerError;
pub use run::run;
