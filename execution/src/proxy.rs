use async_trait::async_trait;
use chrono::Utc;
use ferrotrade_broker::{AccountProvider, Broker, BrokerError, MarketDataProvider, OrderExecutor};
use ferrotrade_bus::{channels, publish_json, EventBus, OrderEvent, SnapshotEvent};
use ferrotrade_types::{Account, Ohlcv, OrderRequest, OrderResponse, SnapshotType, Timeframe};
use futures::stream::{BoxStream, StreamExt};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;
use uuid::Uuid;

/// Wraps any [`Broker`] and publishes a lifecycle event per mutating call
/// plus a pair of account snapshots per streamed candle (`spec.md` §4.H).
///
/// Never blocks the underlying call's result on the publish: publishing
/// uses [`ferrotrade_bus::publish_json`]'s bounded timeout, and a publish
/// failure is logged and swallowed rather than surfaced to the caller — the
/// event handler (4.L) reconciles from the source of truth independently,
/// this is best-effort fan-out for UI/persistence, not the system of
/// record.
pub struct ProxyBroker {
    inner: Arc<dyn Broker>,
    bus: Arc<dyn EventBus>,
    deployment_id: Uuid,
}

impl std::fmt::Debug for ProxyBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyBroker")
            .field("deployment_id", &self.deployment_id)
            .finish_non_exhaustive()
    }
}

impl ProxyBroker {
    pub fn new(inner: Arc<dyn Broker>, bus: Arc<dyn EventBus>, deployment_id: Uuid) -> Self {
        Self {
            inner,
            bus,
            deployment_id,
        }
    }

    async fn publish_order_event(&self, event: OrderEvent) {
        if let Err(e) = publish_json(self.bus.as_ref(), channels::ORDERS_EVENTS, &event).await {
            tracing::warn!(error = %e, deployment_id = %self.deployment_id, "order event publish failed, continuing");
        }
    }

}

/// Reads the account and publishes the equity-then-balance snapshot pair
/// for one processed candle (`spec.md` §4.H: "two `SnapshotCreated` events,
/// equity first then balance"). Free function so the streamed-candle
/// adapter in [`ProxyBroker::stream_candles`] can call it without
/// reconstructing a [`ProxyBroker`] per item.
async fn publish_snapshots_for(
    inner: &Arc<dyn Broker>,
    bus: &Arc<dyn EventBus>,
    deployment_id: Uuid,
    candle: &Ohlcv,
) {
    let account = match inner.account().await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!(error = %e, "could not read account for snapshot publish, skipping");
            return;
        }
    };
    let now = Utc::now().timestamp();
    let equity = account.equity_single(&candle.symbol, candle.close);

    let equity_event = SnapshotEvent {
        id: Uuid::new_v4(),
        deployment_id,
        snapshot_type: SnapshotType::Equity,
        value: equity,
        timestamp: now,
    };
    if let Err(e) = publish_json(bus.as_ref(), channels::SNAPSHOTS_EVENTS, &equity_event).await {
        tracing::warn!(error = %e, "equity snapshot publish failed, continuing");
    }

    let balance_event = SnapshotEvent {
        id: Uuid::new_v4(),
        deployment_id,
        snapshot_type: SnapshotType::Balance,
        value: account.cash,
        timestamp: now,
    };
    if let Err(e) = publish_json(bus.as_ref(), channels::SNAPSHOTS_EVENTS, &balance_event).await {
        tracing::warn!(error = %e, "balance snapshot publish failed, continuing");
    }
}

#[async_trait]
impl MarketDataProvider for ProxyBroker {
    async fn stream_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<BoxStream<'static, Ohlcv>, BrokerError> {
        let inner_stream = self.inner.stream_candles(symbol, timeframe).await?;
        let bus = self.bus.clone();
        let inner = self.inner.clone();
        let deployment_id = self.deployment_id;

        let stream = inner_stream.then(move |candle| {
            let bus = bus.clone();
            let inner = inner.clone();
            async move {
                publish_snapshots_for(&inner, &bus, deployment_id, &candle).await;
                candle
            }
        });
        Ok(stream.boxed())
    }

    async fn latest_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        self.inner.latest_price(symbol).await
    }
}

#[async_trait]
impl OrderExecutor for ProxyBroker {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, BrokerError> {
        let order = self.inner.submit_order(request).await?;
        self.publish_order_event(OrderEvent::OrderPlaced {
            id: Uuid::new_v4(),
            deployment_id: self.deployment_id,
            timestamp: Utc::now().timestamp(),
            order: order.clone(),
        })
        .await;
        Ok(order)
    }

    async fn modify_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let result = self.inner.modify_order(order_id, request).await;
        match &result {
            Ok(order) => {
                self.publish_order_event(OrderEvent::OrderModified {
                    id: Uuid::new_v4(),
                    deployment_id: self.deployment_id,
                    timestamp: Utc::now().timestamp(),
                    order: order.clone(),
                    success: true,
                })
                .await;
            }
            Err(modify_err) => {
                // The modify itself failed, so there is no fresh
                // `OrderResponse` to attach — fetch the order's unchanged
                // state so `OrderModified{success: false}` still carries a
                // real snapshot, the way `cancel_order` always publishes
                // regardless of outcome.
                match self.inner.get_order(order_id).await {
                    Ok(order) => {
                        self.publish_order_event(OrderEvent::OrderModified {
                            id: Uuid::new_v4(),
                            deployment_id: self.deployment_id,
                            timestamp: Utc::now().timestamp(),
                            order,
                            success: false,
                        })
                        .await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            modify_error = %modify_err,
                            order_id,
                            deployment_id = %self.deployment_id,
                            "could not fetch order state for failed-modify event, skipping publish"
                        );
                    }
                }
            }
        }
        result
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let result = self.inner.cancel_order(order_id).await;
        self.publish_order_event(OrderEvent::OrderCancelled {
            id: Uuid::new_v4(),
            deployment_id: self.deployment_id,
            timestamp: Utc::now().timestamp(),
            order_id: order_id.to_owned(),
            success: result.is_ok(),
        })
        .await;
        result
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
        self.inner.get_order(order_id).await
    }
}

#[async_trait]
impl AccountProvider for ProxyBroker {
    async fn account(&self) -> Result<Account, BrokerError> {
        self.inner.account().await
    }
}

impl Broker for ProxyBroker {
    fn account_id(&self) -> SmolStr {
        self.inner.account_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedBroker;
    use ferrotrade_bus::InMemoryEventBus;
    use ferrotrade_types::{OrderSide, OrderType, TimeInForce};
    use futures::StreamExt as _;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn submit_order_publishes_order_placed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sim = Arc::new(SimulatedBroker::new("acct", "X", dec!(1000)));
        let proxy = ProxyBroker::new(sim.clone() as Arc<dyn Broker>, bus.clone() as Arc<dyn EventBus>, Uuid::nil());

        let mut sub = bus.subscribe_raw(channels::ORDERS_EVENTS).await.unwrap();

        // SimulatedBroker needs a candle before a market order can fill.
        sim.feed(test_candle()).await;

        let request = OrderRequest {
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: Some(dec!(1)),
            notional: None,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        };
        proxy.submit_order(request).await.unwrap();

        let payload = sub.next().await.unwrap();
        let event: OrderEvent = serde_json::from_slice(&payload).unwrap();
        assert!(matches!(event, OrderEvent::OrderPlaced { .. }));
    }

    fn test_candle() -> Ohlcv {
        Ohlcv {
            source: "sim".into(),
            symbol: "X".into(),
            timeframe: Timeframe::M1,
            timestamp: 0,
            open: dec!(10),
            high: dec!(10),
            low: dec!(10),
            close: dec!(10),
            volume: dec!(1),
        }
    }

    /// Delegates to a [`SimulatedBroker`] except `modify_order`, which
    /// always rejects — used to exercise `ProxyBroker::modify_order`'s
    /// failure path without relying on the simulated broker's own (narrower)
    /// set of modify failures.
    struct AlwaysFailModifyBroker {
        inner: Arc<SimulatedBroker>,
    }

    #[async_trait]
    impl MarketDataProvider for AlwaysFailModifyBroker {
        async fn stream_candles(
            &self,
            symbol: &str,
            timeframe: Timeframe,
        ) -> Result<BoxStream<'static, Ohlcv>, BrokerError> {
            self.inner.stream_candles(symbol, timeframe).await
        }

        async fn latest_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
            self.inner.latest_price(symbol).await
        }
    }

    #[async_trait]
    impl OrderExecutor for AlwaysFailModifyBroker {
        async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, BrokerError> {
            self.inner.submit_order(request).await
        }

        async fn modify_order(&self, _order_id: &str, _request: OrderRequest) -> Result<OrderResponse, BrokerError> {
            Err(BrokerError::OrderRejected {
                reason: "modify rejected by venue".into(),
            })
        }

        async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
            self.inner.cancel_order(order_id).await
        }

        async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
            self.inner.get_order(order_id).await
        }
    }

    #[async_trait]
    impl AccountProvider for AlwaysFailModifyBroker {
        async fn account(&self) -> Result<Account, BrokerError> {
            self.inner.account().await
        }
    }

    impl Broker for AlwaysFailModifyBroker {
        fn account_id(&self) -> SmolStr {
            self.inner.account_id()
        }
    }

    #[tokio::test]
    async fn failed_modify_order_still_publishes_order_modified() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sim = Arc::new(SimulatedBroker::new("acct", "X", dec!(1000)));
        sim.feed(test_candle()).await;

        let request = OrderRequest {
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: Some(dec!(1)),
            notional: None,
            limit_price: Some(dec!(9)),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        };
        let placed = sim.submit_order(request).await.unwrap();

        let broker: Arc<dyn Broker> = Arc::new(AlwaysFailModifyBroker { inner: sim });
        let proxy = ProxyBroker::new(broker, bus.clone() as Arc<dyn EventBus>, Uuid::nil());

        let mut sub = bus.subscribe_raw(channels::ORDERS_EVENTS).await.unwrap();

        let modify_request = OrderRequest {
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: Some(dec!(2)),
            notional: None,
            limit_price: Some(dec!(9)),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        };
        let err = proxy.modify_order(&placed.order_id, modify_request).await.unwrap_err();
        assert!(matches!(err, BrokerError::OrderRejected { .. }));

        let payload = sub.next().await.unwrap();
        let event: OrderEvent = serde_json::from_slice(&payload).unwrap();
        match event {
            OrderEvent::OrderModified { success, order, .. } => {
                assert!(!success);
                assert_eq!(order.order_id, placed.order_id);
            }
            other => panic!("expected OrderModified, got {other:?}"),
        }
    }
}
