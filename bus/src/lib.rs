#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Publish/subscribe transport for the trading system's order, snapshot,
//! candle-close, tick, and deployment-lifecycle events, plus the wire event
//! shapes themselves.
//!
//! Two [`EventBus`] implementations ship: [`RedisEventBus`] for production and
//! [`InMemoryEventBus`] for tests and the single-process demo path in the CLI.

pub mod channels;
mod error;
mod events;
mod memory;
mod redis_bus;

pub use error::BusError;
pub use events::{CandleCloseEvent, DeploymentEvent, OrderEvent, SnapshotEvent, TickEvent};
pub use memory::InMemoryEventBus;
pub use redis_bus::RedisEventBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Bus publish is bounded to this duration (`spec.md` §5); on timeout the
/// caller logs a warning and proceeds rather than blocking indefinitely.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Common contract for a keyed publish/subscribe message broker.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    async fn publish_raw(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribes to `channel`, returning a stream of raw message payloads.
    /// The stream never terminates on its own; a dropped sender side (bus
    /// connection lost) ends it.
    async fn subscribe_raw(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BusError>;
}

/// Serialises `event` to JSON and publishes it to `channel`, bounded by
/// [`PUBLISH_TIMEOUT`]. Timing out is reported as [`BusError::PublishTimeout`]
/// so the caller can log-and-continue per the spec's propagation policy.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn EventBus,
    channel: &str,
    event: &T,
) -> Result<(), BusError> {
    let payload = serde_json::to_vec(event).expect("event types are always serialisable");
    tokio::time::timeout(PUBLISH_TIMEOUT, bus.publish_raw(channel, payload))
        .await
        .map_err(|_| BusError::PublishTimeout {
            channel: channel.to_owned(),
        })?
}

/// Subscribes to `channel` and decodes each message as JSON, yielding
/// `Err(serde_json::Error)` for malformed payloads rather than dropping them
/// silently — callers (the event handler) log and skip per the spec.
pub async fn subscribe_json<T: DeserializeOwned + Send + 'static>(
    bus: &dyn EventBus,
    channel: &str,
) -> Result<BoxStream<'static, Result<T, serde_json::Error>>, BusError> {
    use futures::StreamExt;
    let raw = bus.subscribe_raw(channel).await?;
    Ok(raw.map(|bytes| serde_json::from_slice(&bytes)).boxed())
}
