use crate::DeploymentError;
use chrono::Utc;
use ferrotrade_broker::Broker;
use ferrotrade_bus::{channels, subscribe_json, DeploymentEvent, EventBus};
use ferrotrade_execution::ProxyBroker;
use ferrotrade_store::Stores;
use ferrotrade_strategy::{Strategy, StrategyContext};
use ferrotrade_types::{DeploymentRecord, DeploymentStatus, Ohlcv, Timeframe};
use futures::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cooperative-cancellation grace period for the losing side of the
/// strategy/control race (`spec.md` §5: "bounded grace period ... after
/// that, the losing task is abandoned").
pub const CANCELLATION_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Drives one deployment's strategy/control race (`spec.md` §4.K). Owns no
/// broker or strategy itself — those are supplied per `run` call so the
/// same runtime instance can be reused by a worker pool across deployments.
pub struct DeploymentRuntime {
    stores: Arc<dyn Stores>,
    bus: Arc<dyn EventBus>,
}

impl std::fmt::Debug for DeploymentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRuntime").finish_non_exhaustive()
    }
}

impl DeploymentRuntime {
    pub fn new(stores: Arc<dyn Stores>, bus: Arc<dyn EventBus>) -> Self {
        Self { stores, bus }
    }

    /// Runs `deployment_id` to a terminal status, writing `running` on entry
    /// and `stopped`/`error` on exit (`spec.md` §4.K steps 4-6). `strategy`
    /// is a fresh instance (see [`ferrotrade_strategy::StrategyFactory`]) and
    /// `broker` is the live adapter for this deployment's broker connection,
    /// wrapped here in a [`ProxyBroker`] for lifecycle event fan-out.
    ///
    /// Returns the terminal [`DeploymentStatus`] actually written
    /// (`Stopped` or `Error`) so the caller — the CLI's `deployment run`
    /// subcommand — can choose its process exit code. `Err` is reserved for
    /// failures that happen *before* a terminal status can be written at all
    /// (the deployment row is missing, or the storage write itself fails).
    pub async fn run(
        &self,
        deployment_id: Uuid,
        strategy: Box<dyn Strategy>,
        broker: Arc<dyn Broker>,
    ) -> Result<DeploymentStatus, DeploymentError> {
        let record = self
            .stores
            .deployments()
            .get(deployment_id)
            .await?
            .ok_or(DeploymentError::NotFound(deployment_id))?;

        let proxy: Arc<dyn Broker> = Arc::new(ProxyBroker::new(broker, self.bus.clone(), deployment_id));

        self.stores
            .deployments()
            .set_status(deployment_id, DeploymentStatus::Running)
            .await?;

        let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
        let mut strategy_task = tokio::spawn(run_strategy_task(strategy, proxy, record.clone(), cancel_rx));

        let outcome = tokio::select! {
            res = &mut strategy_task => res.unwrap_or_else(|e| {
                tracing::error!(error = %e, "strategy task panicked");
                Err(DeploymentError::Strategy(ferrotrade_strategy::StrategyError::Raised(e.to_string())))
            }),
            res = run_control_task(self.bus.clone(), deployment_id) => {
                // The control task won: tell the strategy task to stop and
                // give it up to the grace period to run `shutdown` before
                // abandoning it (`spec.md` §5).
                let _ = cancel_tx.send(true);
                match tokio::time::timeout(CANCELLATION_GRACE_PERIOD, &mut strategy_task).await {
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(error = %e, "strategy task errored while shutting down after stop signal");
                    }
                    Ok(Err(join_err)) => {
                        tracing::error!(error = %join_err, "strategy task panicked while shutting down after stop signal");
                    }
                    Err(_elapsed) => {
                        tracing::warn!("strategy task did not shut down within the cancellation grace period; abandoning it");
                    }
                    Ok(Ok(Ok(()))) => {}
                }
                res
            },
        };

        let (status, error_message) = match outcome {
            Ok(()) => (DeploymentStatus::Stopped, None),
            Err(e) => (DeploymentStatus::Error, Some(e.to_string())),
        };

        self.stores
            .deployments()
            .set_terminal_status(deployment_id, status, error_message, Utc::now())
            .await?;

        Ok(status)
    }
}

/// The strategy task half of the race: `startup`, then one `on_candle` per
/// streamed candle, then `shutdown`. Returning `Err` here is treated as the
/// "unhandled exception" case from `spec.md` §4.K step 6 — unlike the
/// backtest engine, a deployment does not swallow strategy errors.
///
/// `cancel` is raised by the control task when a stop signal arrives; the
/// candle loop breaks out cooperatively as soon as it observes the change so
/// `shutdown` still runs instead of the task being dropped mid-poll.
async fn run_strategy_task(
    mut strategy: Box<dyn Strategy>,
    broker: Arc<dyn Broker>,
    record: DeploymentRecord,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<(), DeploymentError> {
    let mut last_candle = placeholder_candle(&record);
    let startup_ctx = StrategyContext::new(last_candle.clone(), broker.clone());
    strategy.startup(&startup_ctx).await?;

    let mut stream = broker.stream_candles(&record.symbol, record.timeframe).await?;
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            item = stream.next() => {
                match item {
                    Some(candle) => {
                        last_candle = candle.clone();
                        let ctx = StrategyContext::new(candle, broker.clone());
                        strategy.on_candle(&ctx).await?;
                    }
                    None => break,
                }
            }
        }
    }

    let shutdown_ctx = StrategyContext::new(last_candle, broker.clone());
    strategy.shutdown(&shutdown_ctx).await?;
    Ok(())
}

/// The control task half of the race: waits for a `DeploymentStop` event
/// naming this deployment on `deployments.events`. Malformed or unrelated
/// events are logged and skipped, matching every other subscriber in this
/// system.
async fn run_control_task(bus: Arc<dyn EventBus>, deployment_id: Uuid) -> Result<(), DeploymentError> {
    let mut stream = subscribe_json::<DeploymentEvent>(bus.as_ref(), channels::DEPLOYMENTS_EVENTS).await?;
    while let Some(item) = stream.next().await {
        match item {
            Ok(DeploymentEvent::Stop { deployment_id: id, .. }) if id == deployment_id => return Ok(()),
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "malformed deployment event, skipping");
            }
        }
    }
    Ok(())
}

fn placeholder_candle(record: &DeploymentRecord) -> Ohlcv {
    Ohlcv {
        source: "deployment".into(),
        symbol: record.symbol.clone(),
        timeframe: record.timeframe,
        timestamp: Utc::now().timestamp(),
        open: Decimal::ZERO,
        high: Decimal::ZERO,
        low: Decimal::ZERO,
        close: Decimal::ZERO,
        volume: Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferrotrade_bus::InMemoryEventBus;
    use ferrotrade_execution::SimulatedBroker;
    use ferrotrade_store::InMemoryStore;
    use ferrotrade_strategy::StrategyError;
    use ferrotrade_types::OrderRequest;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct NoopStrategy;

    #[async_trait]
    impl Strategy for NoopStrategy {
        async fn on_candle(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
            Ok(())
        }
    }

    /// Records whether `shutdown` ran, so a test can assert the strategy
    /// task got its cancellation grace period rather than being dropped.
    struct ShutdownTrackingStrategy {
        shutdown_ran: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl Strategy for ShutdownTrackingStrategy {
        async fn on_candle(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
            Ok(())
        }

        async fn shutdown(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
            self.shutdown_ran.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl Strategy for FailingStrategy {
        async fn on_candle(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
            Err(StrategyError::Raised("boom".into()))
        }
    }

    fn candle(ts: i64) -> Ohlcv {
        Ohlcv {
            source: "sim".into(),
            symbol: "X".into(),
            timeframe: Timeframe::M1,
            timestamp: ts,
            open: dec!(100),
            high: dec!(100),
            low: dec!(100),
            close: dec!(100),
            volume: dec!(1),
        }
    }

    async fn seed_deployment(store: &InMemoryStore, deployment_id: Uuid) {
        use ferrotrade_store::DeploymentStore;
        store
            .create(&DeploymentRecord {
                deployment_id,
                strategy_id: Uuid::new_v4(),
                broker_connection_id: Uuid::new_v4(),
                symbol: "X".into(),
                timeframe: Timeframe::M1,
                starting_balance: Some(dec!(1000)),
                status: DeploymentStatus::Pending,
                error_message: None,
                stopped_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    /// Wraps a [`SimulatedBroker`] to additionally support
    /// `stream_candles`, which the simulated broker itself deliberately
    /// does not (see its own doc comment) — needed here only so these tests
    /// can exercise the strategy task's candle loop without a real venue.
    /// Streams candles forever, `delay` apart, so a racing control task gets
    /// a chance to run between items.
    struct FakeStreamingBroker {
        inner: Arc<SimulatedBroker>,
        delay: Duration,
    }

    #[async_trait]
    impl ferrotrade_broker::MarketDataProvider for FakeStreamingBroker {
        async fn stream_candles(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
        ) -> Result<futures::stream::BoxStream<'static, Ohlcv>, ferrotrade_broker::BrokerError> {
            let delay = self.delay;
            let stream = futures::stream::unfold(0i64, move |i| async move {
                tokio::time::sleep(delay).await;
                Some((candle(i), i + 1))
            });
            Ok(stream.boxed())
        }

        async fn latest_price(&self, symbol: &str) -> Result<Decimal, ferrotrade_broker::BrokerError> {
            self.inner.latest_price(symbol).await
        }
    }

    #[async_trait]
    impl ferrotrade_broker::OrderExecutor for FakeStreamingBroker {
        async fn submit_order(
            &self,
            request: OrderRequest,
        ) -> Result<ferrotrade_types::OrderResponse, ferrotrade_broker::BrokerError> {
            self.inner.submit_order(request).await
        }

        async fn modify_order(
            &self,
            order_id: &str,
            request: OrderRequest,
        ) -> Result<ferrotrade_types::OrderResponse, ferrotrade_broker::BrokerError> {
            self.inner.modify_order(order_id, request).await
        }

        async fn cancel_order(&self, order_id: &str) -> Result<(), ferrotrade_broker::BrokerError> {
            self.inner.cancel_order(order_id).await
        }

        async fn get_order(&self, order_id: &str) -> Result<ferrotrade_types::OrderResponse, ferrotrade_broker::BrokerError> {
            self.inner.get_order(order_id).await
        }
    }

    #[async_trait]
    impl ferrotrade_broker::AccountProvider for FakeStreamingBroker {
        async fn account(&self) -> Result<ferrotrade_types::Account, ferrotrade_broker::BrokerError> {
            self.inner.account().await
        }
    }

    impl Broker for FakeStreamingBroker {
        fn account_id(&self) -> smol_str::SmolStr {
            self.inner.account_id()
        }
    }

    #[tokio::test]
    async fn stop_event_transitions_deployment_to_stopped() {
        let store = Arc::new(InMemoryStore::new());
        let deployment_id = Uuid::new_v4();
        seed_deployment(&store, deployment_id).await;

        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let sim = Arc::new(SimulatedBroker::new("acct", "X", dec!(1000)));
        sim.feed(candle(0)).await;
        let broker: Arc<dyn Broker> = Arc::new(FakeStreamingBroker {
            inner: sim,
            delay: Duration::from_millis(5),
        });

        let runtime = DeploymentRuntime::new(store.clone(), bus.clone());

        let stop_bus = bus.clone();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            ferrotrade_bus::publish_json(
                stop_bus.as_ref(),
                channels::DEPLOYMENTS_EVENTS,
                &DeploymentEvent::Stop {
                    id: Uuid::new_v4(),
                    deployment_id,
                    timestamp: 0,
                },
            )
            .await
            .unwrap();
        });

        let shutdown_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let strategy = ShutdownTrackingStrategy {
            shutdown_ran: shutdown_ran.clone(),
        };

        let status = runtime
            .run(deployment_id, Box::new(strategy), broker)
            .await
            .unwrap();
        assert_eq!(status, DeploymentStatus::Stopped);
        stopper.await.unwrap();
        assert!(
            shutdown_ran.load(std::sync::atomic::Ordering::SeqCst),
            "strategy.shutdown() should run within the cancellation grace period after a stop signal"
        );

        use ferrotrade_store::DeploymentStore;
        let record = store.get(deployment_id).await.unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Stopped);
        assert!(record.stopped_at.is_some());
    }

    #[tokio::test]
    async fn strategy_error_transitions_deployment_to_error() {
        let store = Arc::new(InMemoryStore::new());
        let deployment_id = Uuid::new_v4();
        seed_deployment(&store, deployment_id).await;

        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let sim = Arc::new(SimulatedBroker::new("acct", "X", dec!(1000)));
        sim.feed(candle(0)).await;
        let broker: Arc<dyn Broker> = Arc::new(FakeStreamingBroker {
            inner: sim,
            delay: Duration::from_millis(1),
        });
        let runtime = DeploymentRuntime::new(store.clone(), bus.clone());

        let status = runtime
            .run(deployment_id, Box::new(FailingStrategy), broker)
            .await
            .unwrap();
        assert_eq!(status, DeploymentStatus::Error);

        use ferrotrade_store::DeploymentStore;
        let record = store.get(deployment_id).await.unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
        assert!(record.error_message.is_some());
    }
}
