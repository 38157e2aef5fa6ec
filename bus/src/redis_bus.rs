use crate::{BusError, EventBus};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Production bus transport: Redis `PUBLISH`/`SUBSCRIBE`.
///
/// Publishing reuses a single multiplexed [`ConnectionManager`] (cheap to
/// clone, reconnects transparently). Subscribing opens a dedicated PubSub
/// connection per call, since a Redis connection in subscriber mode can't
/// also be used to publish.
pub struct RedisEventBus {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl std::fmt::Debug for RedisEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEventBus").finish_non_exhaustive()
    }
}

impl RedisEventBus {
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = client.get_connection_manager().await?;
        Ok(Self {
            client,
            publish_conn,
        })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish_raw(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.publish_conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe_raw(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|source| BusError::SubscribeLost {
                channel: channel.to_owned(),
                source,
            })?;
        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        Ok(stream.boxed())
    }
}
