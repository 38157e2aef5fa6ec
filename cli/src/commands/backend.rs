use std::sync::Arc;

use ferrotrade_aggregator::{Aggregator, InMemoryRecoveryCache, RecoveryCache, RedisRecoveryCache};
use ferrotrade_bus::{channels, subscribe_json, EventBus, TickEvent};
use futures::StreamExt;

use crate::config::StoreHandles;
use crate::CliError;

/// `backend run [--workers N]` (`spec.md` §6, §5): starts the aggregator and
/// the order/snapshot event handler as parallel tasks on a `worker_threads`
/// runtime of the requested size.
///
/// The HTTP route layer (auth, resource CRUD) is an external collaborator
/// (`spec.md` §1 "OUT OF SCOPE") and is not started here; this entry point
/// covers exactly the two always-on listeners the core owns.
pub async fn run(
    handles: StoreHandles,
    bus: Arc<dyn EventBus>,
    redis_url: Option<String>,
) -> Result<(), CliError> {
    let cache: Arc<dyn RecoveryCache> = match redis_url {
        Some(url) => {
            tracing::info!("aggregator recovery cache: redis");
            Arc::new(RedisRecoveryCache::connect(&url).await?)
        }
        None => {
            tracing::warn!("aggregator recovery cache: in-memory (lost on restart)");
            Arc::new(InMemoryRecoveryCache::new())
        }
    };

    let aggregator = Arc::new(Aggregator::new(bus.clone(), handles.candles.clone(), cache));
    let recovered = aggregator.recover().await?;
    tracing::info!(recovered, "aggregator recovery complete");

    let ticks_task = run_ticks_consumer(aggregator, bus.clone());
    let handler_task = async { ferrotrade_handler::run(handles.stores, bus).await.map_err(CliError::from) };

    tokio::try_join!(ticks_task, handler_task)?;

    Ok(())
}

/// Subscribes `ticks.raw` and folds every tick into the aggregator, with
/// the same bounded-reconnect policy as the event handler's consumers
/// (`spec.md` §7).
async fn run_ticks_consumer(aggregator: Arc<Aggregator>, bus: Arc<dyn EventBus>) -> Result<(), CliError> {
    const MAX_ATTEMPTS: u32 = 8;
    let mut attempt = 0;

    loop {
        let mut stream = match subscribe_json::<TickEvent>(bus.as_ref(), channels::TICKS_RAW).await {
            Ok(stream) => {
                attempt = 0;
                stream
            }
            Err(e) => {
                attempt += 1;
                if attempt > MAX_ATTEMPTS {
                    return Err(e.into());
                }
                tracing::warn!(error = %e, attempt, "ticks.raw subscribe failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(200) * attempt).await;
                continue;
            }
        };

        while let Some(decoded) = stream.next().await {
            match decoded {
                Ok(event) => aggregator.process_tick(&event.into()).await,
                Err(e) => tracing::warn!(error = %e, "malformed ticks.raw payload, dropping"),
            }
        }

        attempt += 1;
        if attempt > MAX_ATTEMPTS {
            return Err(CliError::ReconnectExhausted(channels::TICKS_RAW.to_owned()));
        }
        tracing::warn!(attempt, "ticks.raw subscription lost, reconnecting");
        tokio::time::sleep(std::time::Duration::from_millis(200) * attempt).await;
    }
}
