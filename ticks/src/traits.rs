use crate::TickSourceError;
use async_trait::async_trait;
use ferrotrade_types::Tick;
use futures::stream::BoxStream;

/// Streams and backfills raw trades from an external venue.
///
/// `stream` never terminates on its own — a lost upstream connection ends
/// the stream, and reconnect policy is the caller's responsibility (the
/// `pipeline run` CLI entry point restarts a dropped source with backoff).
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Streams ticks for `symbol` as they trade, in the order the venue
    /// reports them. Out-of-order or duplicate ticks are the aggregator's
    /// concern, not the source's.
    async fn stream(&self, symbol: &str) -> Result<BoxStream<'static, Tick>, TickSourceError>;

    /// Fetches historical trades for `symbol` in `[from_ts, to_ts]`, used to
    /// backfill a gap (e.g. after an outage) before resuming the live
    /// stream.
    async fn backfill(
        &self,
        symbol: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Tick>, TickSourceError>;
}

/// Parses one vendor-specific JSON frame into a [`Tick`], or `None` if the
/// frame isn't a trade event (e.g. a heartbeat or subscription ack).
///
/// Injected into [`crate::WebSocketTickSource`] so exchange-specific wire
/// formats plug in without forking the transport.
pub trait TickParser: Send + Sync {
    fn parse(&self, frame: &str) -> Result<Option<Tick>, String>;
}

impl<F> TickParser for F
where
    F: Fn(&str) -> Result<Option<Tick>, String> + Send + Sync,
{
    fn parse(&self, frame: &str) -> Result<Option<Tick>, String> {
        (self)(frame)
    }
}
