use ferrotrade_bus::OrderEvent;
use ferrotrade_store::{OrderStore, StorageError};
use ferrotrade_types::OrderStatus;

/// Applies one `orders.events` message to the store (`spec.md` §4.L mapping
/// table). Returns the storage error only when the store itself is broken;
/// "row missing" on a modify/cancel is logged here and reported as handled.
pub async fn apply(store: &dyn OrderStore, event: OrderEvent) -> Result<(), StorageError> {
    match event {
        OrderEvent::OrderPlaced {
            deployment_id,
            order,
            ..
        } => store.upsert(Some(deployment_id), None, &order).await,

        OrderEvent::OrderModified {
            deployment_id,
            order,
            ..
        } => {
            let Some(existing) = store.get(&order.order_id).await? else {
                tracing::info!(
                    order_id = %order.order_id,
                    "order modified event arrived before placement, dropping"
                );
                return Ok(());
            };
            if !is_forward_or_same(existing.status, order.status) {
                tracing::info!(
                    order_id = %order.order_id,
                    from = ?existing.status,
                    to = ?order.status,
                    "order modified event is not a forward status transition, dropping"
                );
                return Ok(());
            }
            store.upsert(Some(deployment_id), None, &order).await
        }

        OrderEvent::OrderCancelled {
            deployment_id,
            order_id,
            ..
        } => {
            let Some(mut order) = store.get(&order_id).await? else {
                tracing::info!(%order_id, "order cancelled event for unknown order, dropping");
                return Ok(());
            };
            if !is_forward_or_same(order.status, OrderStatus::Cancelled) {
                tracing::info!(
                    %order_id,
                    from = ?order.status,
                    "order cancelled event is not a forward status transition, dropping"
                );
                return Ok(());
            }
            order.status = OrderStatus::Cancelled;
            store.upsert(Some(deployment_id), None, &order).await
        }
    }
}

/// Whether applying `next` over `current` is either a valid forward move on
/// the status DAG or a same-status re-application of a duplicate event.
/// [`OrderStatus::can_transition_to`] treats equal states as `false` so
/// idempotent re-delivery needs this short-circuit (`spec.md` §5).
fn is_forward_or_same(current: OrderStatus, next: OrderStatus) -> bool {
    current == next || current.can_transition_to(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferrotrade_store::InMemoryStore;
    use ferrotrade_types::{OrderSide, OrderType, TimeInForce};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(order_id: &str, status: OrderStatus) -> ferrotrade_types::OrderResponse {
        ferrotrade_types::OrderResponse {
            order_id: order_id.to_owned(),
            client_order_id: None,
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: dec!(1),
            filled_quantity: dec!(0),
            limit_price: None,
            stop_price: None,
            status,
            created_at: Utc::now(),
            filled_at: None,
            avg_fill_price: None,
            time_in_force: TimeInForce::Day,
            broker_metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn order_placed_is_idempotent_on_order_id() {
        let store = InMemoryStore::new();
        let deployment_id = Uuid::new_v4();
        let event = OrderEvent::OrderPlaced {
            id: Uuid::new_v4(),
            deployment_id,
            timestamp: 1,
            order: order("abc", OrderStatus::Submitted),
        };
        apply(&store, event.clone()).await.unwrap();
        apply(&store, event).await.unwrap();
        assert!(store.get("abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn order_modified_before_placement_is_dropped_not_errored() {
        let store = InMemoryStore::new();
        let event = OrderEvent::OrderModified {
            id: Uuid::new_v4(),
            deployment_id: Uuid::new_v4(),
            timestamp: 1,
            order: order("missing", OrderStatus::PartiallyFilled),
            success: true,
        };
        apply(&store, event).await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn order_cancelled_sets_status_on_existing_row() {
        let store = InMemoryStore::new();
        let deployment_id = Uuid::new_v4();
        store
            .upsert(Some(deployment_id), None, &order("abc", OrderStatus::Submitted))
            .await
            .unwrap();

        let event = OrderEvent::OrderCancelled {
            id: Uuid::new_v4(),
            deployment_id,
            timestamp: 1,
            order_id: "abc".into(),
            success: true,
        };
        apply(&store, event).await.unwrap();

        let row = store.get("abc").await.unwrap().unwrap();
        assert_eq!(row.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_order_modified_event_does_not_regress_status() {
        let store = InMemoryStore::new();
        let deployment_id = Uuid::new_v4();
        store
            .upsert(Some(deployment_id), None, &order("abc", OrderStatus::Filled))
            .await
            .unwrap();

        // A late `OrderModified{status: Submitted}` arriving after
        // `OrderPlaced{status: Filled}` has already landed must not
        // regress the stored status.
        let event = OrderEvent::OrderModified {
            id: Uuid::new_v4(),
            deployment_id,
            timestamp: 1,
            order: order("abc", OrderStatus::Submitted),
            success: true,
        };
        apply(&store, event).await.unwrap();

        let row = store.get("abc").await.unwrap().unwrap();
        assert_eq!(row.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn order_cancelled_does_not_regress_a_terminal_status() {
        let store = InMemoryStore::new();
        let deployment_id = Uuid::new_v4();
        store
            .upsert(Some(deployment_id), None, &order("abc", OrderStatus::Filled))
            .await
            .unwrap();

        let event = OrderEvent::OrderCancelled {
            id: Uuid::new_v4(),
            deployment_id,
            timestamp: 1,
            order_id: "abc".into(),
            success: true,
        };
        apply(&store, event).await.unwrap();

        let row = store.get("abc").await.unwrap().unwrap();
        assert_eq!(row.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn order_cancelled_for_unknown_order_is_dropped_not_errored() {
        let store = InMemoryStore::new();
        let event = OrderEvent::OrderCancelled {
            id: Uuid::new_v4(),
            deployment_id: Uuid::new_v4(),
            timestamp: 1,
            order_id: "ghost".into(),
            success: true,
        };
        apply(&store, event).await.unwrap();
    }
}
