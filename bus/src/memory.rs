use crate::{BusError, EventBus};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const CHANNEL_CAPACITY: usize = 1024;

/// In-process bus backed by one [`tokio::sync::broadcast`] channel per topic.
///
/// Used by tests and by the CLI's single-process demo mode. Like the Redis
/// transport it models, publishing to a channel with no current subscribers
/// simply has no effect — it does not error.
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_raw(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // No receivers is not an error: pub/sub is best-effort everywhere else too.
        let _ = self.sender_for(channel).send(payload);
        Ok(())
    }

    async fn subscribe_raw(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BusError> {
        let receiver = self.sender_for(channel).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "in-memory bus subscriber lagged, dropping messages");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_subscribe_roundtrips() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe_raw("x").await.unwrap();
        bus.publish_raw("x", b"hello".to_vec()).await.unwrap();
        let got = sub.next().await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = InMemoryEventBus::new();
        bus.publish_raw("nobody-listening", b"x".to_vec())
            .await
            .unwrap();
    }
}
