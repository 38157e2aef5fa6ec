use crate::{TickSource, TickSourceError};
use async_trait::async_trait;
use ferrotrade_types::Tick;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

/// Replays a fixed, pre-recorded sequence of ticks. Used by tests and by
/// backtests that exercise the ingestion pipeline itself rather than
/// reading candles straight out of the historical store.
///
/// `stream` is one-shot: each call drains whatever ticks remain, so a
/// second call after the first has consumed everything yields an empty
/// stream. This mirrors a real venue feed, which never replays what you've
/// already seen.
#[derive(Debug)]
pub struct ReplayTickSource {
    ticks: Mutex<Vec<Tick>>,
}

impl ReplayTickSource {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks: Mutex::new(ticks),
        }
    }
}

#[async_trait]
impl TickSource for ReplayTickSource {
    async fn stream(&self, symbol: &str) -> Result<BoxStream<'static, Tick>, TickSourceError> {
        let remaining: Vec<Tick> = {
            let mut ticks = self.ticks.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                ticks.drain(..).partition(|t| t.symbol == symbol);
            *ticks = rest;
            matching
        };
        Ok(stream::iter(remaining).boxed())
    }

    async fn backfill(
        &self,
        symbol: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Tick>, TickSourceError> {
        Ok(self
            .ticks
            .lock()
            .iter()
            .filter(|t| t.symbol == symbol && t.timestamp >= from_ts && t.timestamp <= to_ts)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_types::MarketType;
    use rust_decimal_macros::dec;

    fn tick(symbol: &str, ts: i64) -> Tick {
        Tick {
            source: "test".into(),
            symbol: symbol.into(),
            market_type: MarketType::Spot,
            price: dec!(100),
            size: dec!(1),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn stream_only_yields_matching_symbol() {
        let source = ReplayTickSource::new(vec![tick("BTC", 1), tick("ETH", 2), tick("BTC", 3)]);
        let ticks: Vec<_> = source.stream("BTC").await.unwrap().collect().await;
        assert_eq!(ticks.len(), 2);
        assert!(ticks.iter().all(|t| t.symbol == "BTC"));
    }

    #[tokio::test]
    async fn backfill_filters_by_time_range() {
        let source = ReplayTickSource::new(vec![tick("BTC", 1), tick("BTC", 5), tick("BTC", 10)]);
        let got = source.backfill("BTC", 2, 10).await.unwrap();
        assert_eq!(got.len(), 2);
    }
}
