/// Bus-layer error taxonomy from the spec's error design: publish is bounded
/// and failures here are logged and swallowed by callers (the proxy broker,
/// the aggregator's emit step); subscribe failures drive a reconnect policy.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish to {channel} timed out")]
    PublishTimeout { channel: String },
    #[error("subscription to {channel} was lost: {source}")]
    SubscribeLost {
        channel: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("redis transport error: {0}")]
    Redis(#[from] redis::RedisError),
}
