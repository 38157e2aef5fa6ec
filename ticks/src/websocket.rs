use crate::{TickParser, TickSource, TickSourceError};
use async_trait::async_trait;
use ferrotrade_types::Tick;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

/// Generic venue websocket adapter. Exchange-specific wire formats plug in
/// through an injected [`TickParser`] rather than forking the transport per
/// vendor (grounded on the teacher's `execution::client::binance::websocket`
/// module).
///
/// `backfill` is not implemented by the websocket transport itself — venues
/// expose historical trades over REST, which is out of this adapter's
/// scope; callers needing backfill pair a `WebSocketTickSource` with a
/// venue-specific REST backfill call at a higher layer.
#[derive(Debug)]
pub struct WebSocketTickSource {
    url: url::Url,
    parser: Arc<dyn TickParser>,
}

impl WebSocketTickSource {
    pub fn new(url: url::Url, parser: Arc<dyn TickParser>) -> Self {
        Self { url, parser }
    }
}

#[async_trait]
impl TickSource for WebSocketTickSource {
    async fn stream(&self, symbol: &str) -> Result<BoxStream<'static, Tick>, TickSourceError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TickSourceError::ConnectionLost(e.to_string()))?;

        let parser = self.parser.clone();
        let symbol = symbol.to_owned();
        let stream = ws.filter_map(move |msg| {
            let parser = parser.clone();
            let symbol = symbol.clone();
            async move {
                let text: String = match msg {
                    Ok(Message::Text(text)) => text.to_string(),
                    Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(_) => return None,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket tick source frame error");
                        return None;
                    }
                };
                match parser.parse(&text) {
                    Ok(Some(tick)) if tick.symbol == symbol => Some(tick),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, frame = %text, "dropping unparsable tick frame");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn backfill(
        &self,
        _symbol: &str,
        _from_ts: i64,
        _to_ts: i64,
    ) -> Result<Vec<Tick>, TickSourceError> {
        Err(TickSourceError::BackfillFailed(
            "websocket transport has no historical backfill; use a venue REST client".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_types::MarketType;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn parse_json_frame(frame: &str) -> Result<Option<Tick>, String> {
        let v: serde_json::Value = serde_json::from_str(frame).map_err(|e| e.to_string())?;
        if v.get("event") == Some(&serde_json::Value::String("heartbeat".into())) {
            return Ok(None);
        }
        Ok(Some(Tick {
            source: "test-venue".into(),
            symbol: v["symbol"].as_str().unwrap_or_default().into(),
            market_type: MarketType::Spot,
            price: Decimal::from_str(v["price"].as_str().unwrap_or("0")).unwrap(),
            size: Decimal::from_str(v["size"].as_str().unwrap_or("0")).unwrap(),
            timestamp: v["timestamp"].as_i64().unwrap_or(0),
        }))
    }

    #[test]
    fn parser_skips_non_trade_frames() {
        assert_eq!(parse_json_frame(r#"{"event":"heartbeat"}"#).unwrap(), None);
    }

    #[test]
    fn parser_extracts_trade_fields() {
        let tick = parse_json_frame(
            r#"{"symbol":"BTCUSDT","price":"100.5","size":"0.1","timestamp":1700000000}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
    }
}
