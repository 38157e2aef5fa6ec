use std::sync::Arc;

use ferrotrade_bus::{channels, publish_json, EventBus, TickEvent};
use ferrotrade_ticks::{TickSource, WebSocketTickSource};
use futures::StreamExt;

use crate::CliError;

/// Parses one `ticks.raw`-shaped JSON frame into a [`ferrotrade_types::Tick`].
///
/// Venue-specific wire formats (Binance, Alpaca, ...) are a gateway's job
/// upstream of this process (`spec.md` §1 non-goal: "no venue-specific
/// authentication"); this adapter decodes the canonical shape that any such
/// gateway is expected to normalise into before handing frames to the
/// websocket this process connects to.
fn parse_canonical_frame(frame: &str) -> Result<Option<ferrotrade_types::Tick>, String> {
    let event: TickEvent = serde_json::from_str(frame).map_err(|e| e.to_string())?;
    Ok(Some(event.into()))
}

/// `pipeline run --broker B --market M --symbol S` (`spec.md` §6, §4.B):
/// streams ticks from one venue connection and republishes each onto
/// `ticks.raw`, where a separately-running `backend run` aggregator
/// consumes them. A dropped upstream connection restarts the stream with
/// backoff rather than ending the process, per
/// [`ferrotrade_ticks::TickSource`]'s contract.
pub async fn run(
    bus: Arc<dyn EventBus>,
    ws_url: url::Url,
    broker: String,
    market: ferrotrade_types::MarketType,
    symbol: String,
) -> Result<(), CliError> {
    let backoff_steps = [
        std::time::Duration::from_millis(500),
        std::time::Duration::from_secs(2),
        std::time::Duration::from_secs(10),
        std::time::Duration::from_secs(30),
    ];
    let mut attempt = 0usize;

    loop {
        let source = WebSocketTickSource::new(ws_url.clone(), Arc::new(parse_canonical_frame));
        match source.stream(&symbol).await {
            Ok(mut stream) => {
                attempt = 0;
                tracing::info!(%broker, ?market, %symbol, "pipeline connected");
                while let Some(tick) = stream.next().await {
                    let event = TickEvent::from(&tick);
                    if let Err(e) = publish_json(bus.as_ref(), channels::TICKS_RAW, &event).await {
                        tracing::warn!(error = %e, "tick publish failed, continuing");
                    }
                }
                tracing::warn!(%broker, %symbol, "pipeline stream ended, reconnecting");
            }
            Err(e) => {
                tracing::warn!(error = %e, %broker, %symbol, "pipeline connect failed, retrying");
            }
        }

        let delay = backoff_steps[attempt.min(backoff_steps.len() - 1)];
        attempt += 1;
        tokio::time::sleep(delay).await;
    }
}
