use crate::StrategyError;
use ferrotrade_broker::Broker;
use ferrotrade_types::{Account, Ohlcv, OrderRequest, OrderResponse};
use std::sync::Arc;

/// Everything a strategy's `on_candle` is handed for one invocation: the
/// candle that just closed and a handle to the broker it trades through
/// (the proxy broker in a live deployment, the simulated broker in a
/// backtest — the strategy cannot tell which).
#[derive(Clone)]
pub struct StrategyContext {
    pub candle: Ohlcv,
    broker: Arc<dyn Broker>,
}

impl StrategyContext {
    pub fn new(candle: Ohlcv, broker: Arc<dyn Broker>) -> Self {
        Self { candle, broker }
    }

    pub async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, StrategyError> {
        Ok(self.broker.submit_order(request).await?)
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), StrategyError> {
        Ok(self.broker.cancel_order(order_id).await?)
    }

    pub async fn account(&self) -> Result<Account, StrategyError> {
        Ok(self.broker.account().await?)
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("candle", &self.candle)
            .finish_non_exhaustive()
    }
}
