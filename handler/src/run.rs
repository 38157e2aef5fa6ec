use crate::{orders, snapshots, HandlerError};
use ferrotrade_bus::{channels, subscribe_json, EventBus, OrderEvent, SnapshotEvent};
use ferrotrade_store::Stores;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Bounded reconnect attempts before the handler gives up and returns
/// `Err`, leaving process exit (and supervisor restart) to the caller
/// (`spec.md` §7: "subscription failures trigger reconnect with backoff (up
/// to capped attempts, then process exit for supervisor restart)").
const MAX_RECONNECT_ATTEMPTS: u32 = 8;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Runs the `orders.events` and `snapshots.events` consumers concurrently
/// until both subscriptions are exhausted by repeated reconnect failures
/// (`spec.md` §4.L). Each per-message failure — a malformed payload, a
/// modify/cancel for a row that hasn't arrived yet — is logged and the
/// message dropped; it never aborts the consumer loop.
pub async fn run(stores: Arc<dyn Stores>, bus: Arc<dyn EventBus>) -> Result<(), HandlerError> {
    let orders_task = run_orders(stores.clone(), bus.clone());
    let snapshots_task = run_snapshots(stores, bus);
    tokio::try_join!(orders_task, snapshots_task)?;
    Ok(())
}

async fn run_orders(stores: Arc<dyn Stores>, bus: Arc<dyn EventBus>) -> Result<(), HandlerError> {
    let mut attempt = 0;
    loop {
        let mut stream = match subscribe_json::<OrderEvent>(bus.as_ref(), channels::ORDERS_EVENTS).await {
            Ok(stream) => {
                attempt = 0;
                stream
            }
            Err(e) => {
                attempt += 1;
                if attempt > MAX_RECONNECT_ATTEMPTS {
                    return Err(e.into());
                }
                tracing::warn!(error = %e, attempt, "orders.events subscribe failed, retrying");
                tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                continue;
            }
        };

        while let Some(decoded) = stream.next().await {
            match decoded {
                Ok(event) => {
                    if let Err(e) = orders::apply(stores.orders(), event).await {
                        tracing::error!(error = %e, "orders.events handler storage failure");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed orders.events payload, dropping"),
            }
        }

        // The stream ended: the connection was lost. Reconnect from scratch.
        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            return Err(HandlerError::ReconnectExhausted {
                channel: channels::ORDERS_EVENTS.to_owned(),
            });
        }
        tracing::warn!(attempt, "orders.events subscription lost, reconnecting");
        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
    }
}

async fn run_snapshots(stores: Arc<dyn Stores>, bus: Arc<dyn EventBus>) -> Result<(), HandlerError> {
    let mut attempt = 0;
    loop {
        let mut stream = match subscribe_json::<SnapshotEvent>(bus.as_ref(), channels::SNAPSHOTS_EVENTS).await {
            Ok(stream) => {
                attempt = 0;
                stream
            }
            Err(e) => {
                attempt += 1;
                if attempt > MAX_RECONNECT_ATTEMPTS {
                    return Err(e.into());
                }
                tracing::warn!(error = %e, attempt, "snapshots.events subscribe failed, retrying");
                tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                continue;
            }
        };

        while let Some(decoded) = stream.next().await {
            match decoded {
                Ok(event) => {
                    if let Err(e) = snapshots::apply(stores.snapshots(), stores.deployments(), event).await {
                        tracing::error!(error = %e, "snapshots.events handler storage failure");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed snapshots.events payload, dropping"),
            }
        }

        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            return Err(HandlerError::ReconnectExhausted {
                channel: channels::SNAPSHOTS_EVENTS.to_owned(),
            });
        }
        tracing::warn!(attempt, "snapshots.events subscription lost, reconnecting");
        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_bus::InMemoryEventBus;
    use ferrotrade_store::InMemoryStore;
    use ferrotrade_types::{OrderResponse, OrderSide, OrderStatus, OrderType, TimeInForce};
    use uuid::Uuid;

    #[tokio::test]
    async fn orders_consumer_applies_published_event() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let stores: Arc<dyn Stores> = store.clone();

        let handle = tokio::spawn(run_orders(stores, bus.clone() as Arc<dyn EventBus>));
        // Let the spawned consumer reach its subscribe call before we publish;
        // the in-memory bus only delivers to subscribers registered in time.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let order = OrderResponse {
            order_id: "abc".into(),
            client_order_id: None,
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: rust_decimal_macros::dec!(1),
            filled_quantity: rust_decimal_macros::dec!(0),
            limit_price: None,
            stop_price: None,
            status: OrderStatus::Submitted,
            created_at: chrono::Utc::now(),
            filled_at: None,
            avg_fill_price: None,
            time_in_force: TimeInForce::Day,
            broker_metadata: serde_json::Value::Null,
        };
        let event = OrderEvent::OrderPlaced {
            id: Uuid::new_v4(),
            deployment_id: Uuid::new_v4(),
            timestamp: 1,
            order,
        };
        ferrotrade_bus::publish_json(bus.as_ref(), channels::ORDERS_EVENTS, &event)
            .await
            .unwrap();

        // Give the spawned consumer a chance to process the message.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.get("abc").await.unwrap().is_some());
    }
}
