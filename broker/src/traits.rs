use crate::BrokerError;
use async_trait::async_trait;
use ferrotrade_types::{Account, Ohlcv, OrderRequest, OrderResponse, Timeframe};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use smol_str::SmolStr;

/// Historical and streaming candle access. Implementations that wrap a
/// synchronous client run their blocking calls on
/// `tokio::task::spawn_blocking` and forward results through a channel
/// turned into a [`BoxStream`], so every implementation looks the same to
/// callers regardless of what sits underneath (`spec.md` §9, "async vs sync
/// brokers").
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Streams closed candles for `symbol`/`timeframe` as they become
    /// available. Never terminates on its own; a lost upstream connection
    /// ends the stream.
    async fn stream_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<BoxStream<'static, Ohlcv>, BrokerError>;

    async fn latest_price(&self, symbol: &str) -> Result<Decimal, BrokerError>;
}

/// Order submission, modification, cancellation, and lookup.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, BrokerError>;

    /// Replaces the mutable parameters of an open order (quantity, prices).
    /// `request` must describe the order's new full state; venues that only
    /// support cancel/replace implement this by doing exactly that
    /// internally.
    async fn modify_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<OrderResponse, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError>;
}

/// Account equity/cash/position lookup.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn account(&self) -> Result<Account, BrokerError>;
}

/// Everything a strategy host or deployment runtime needs from a venue: the
/// union of market data, order execution, and account state. Implemented by
/// the live adapter, the simulated broker, and the proxy broker wrapping
/// either.
pub trait Broker: MarketDataProvider + OrderExecutor + AccountProvider + Send + Sync {
    fn account_id(&self) -> SmolStr;
}
