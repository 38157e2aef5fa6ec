use async_trait::async_trait;
use chrono::Utc;
use ferrotrade_broker::{AccountProvider, Broker, BrokerError, MarketDataProvider, OrderExecutor, TokenBucketRateLimiter};
use ferrotrade_bus::{channels, subscribe_json, CandleCloseEvent, EventBus};
use ferrotrade_types::{Account, Ohlcv, OrderRequest, OrderResponse, OrderSide, OrderStatus, OrderType, Timeframe};
use futures::stream::{BoxStream, StreamExt};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Connection parameters for one broker account at a live venue, grounded
/// on `original_source/src/engine/brokers/alpaca.py` (the original's only
/// live venue) and re-expressed in the teacher's signed-REST-client shape
/// (`execution::client::binance`).
#[derive(Debug, Clone)]
pub struct LiveBrokerConfig {
    pub base_url: url::Url,
    pub api_key: String,
    pub api_secret: String,
    pub account_id: SmolStr,
    /// The `source` identifier this venue publishes candles under on
    /// `candles.close` — i.e. what the aggregator calls this broker.
    pub source: SmolStr,
    pub rate_limit_per_minute: u32,
}

impl LiveBrokerConfig {
    pub fn default_rate_limit(mut self) -> Self {
        if self.rate_limit_per_minute == 0 {
            self.rate_limit_per_minute = 200;
        }
        self
    }
}

/// Live broker adapter (`spec.md` §4.F): order submission and account state
/// go over a signed REST API; candle data is consumed from the aggregator's
/// `candles.close` bus channel rather than opened as a second venue
/// connection, since the aggregator is already the system's single source
/// of truth for closed candles (`spec.md` §2 data flow: "a deployment
/// streams live candles from C (via F)").
pub struct LiveBroker {
    config: LiveBrokerConfig,
    http: reqwest::Client,
    bus: Arc<dyn EventBus>,
    limiter: TokenBucketRateLimiter,
}

impl std::fmt::Debug for LiveBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBroker")
            .field("account_id", &self.config.account_id)
            .field("source", &self.config.source)
            .finish_non_exhaustive()
    }
}

impl LiveBroker {
    pub fn new(config: LiveBrokerConfig, bus: Arc<dyn EventBus>) -> Self {
        let limiter = TokenBucketRateLimiter::new(config.rate_limit_per_minute.max(1), Duration::from_secs(60));
        Self {
            config,
            http: reqwest::Client::new(),
            bus,
            limiter,
        }
    }

    fn sign(&self, query_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signs and sends one authenticated request, rate-limited by the
    /// configured token bucket, and maps the response onto the shared
    /// broker error taxonomy (`spec.md` §7).
    async fn signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BrokerError> {
        self.limiter.acquire().await;

        let timestamp = Utc::now().timestamp_millis();
        let mut query_string = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query_string.is_empty() {
            query_string.push('&');
        }
        query_string.push_str(&format!("timestamp={timestamp}"));
        let signature = self.sign(&query_string);

        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| BrokerError::ConnectionLost(e.to_string()))?;

        let response = self
            .http
            .request(method, url)
            .header("X-API-KEY", &self.config.api_key)
            .query(&[("raw_query", format!("{query_string}&signature={signature}"))])
            .send()
            .await
            .map_err(|e| BrokerError::ConnectionLost(e.to_string()))?;

        map_http_error(&response)?;

        response
            .json::<T>()
            .await
            .map_err(|e| BrokerError::DataUnavailable(e.to_string()))
    }
}

/// Maps an HTTP response's status code onto the broker error taxonomy
/// before the body is parsed, so authentication/rate-limit/venue failures
/// never get interpreted as malformed JSON.
fn map_http_error(response: &reqwest::Response) -> Result<(), BrokerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(match status.as_u16() {
        401 | 403 => BrokerError::AuthenticationFailed,
        404 => BrokerError::SymbolNotFound(response.url().path().to_owned()),
        429 => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            BrokerError::RateLimited { retry_after }
        }
        500..=599 => BrokerError::ConnectionLost(format!("venue returned {status}")),
        _ => BrokerError::OrderRejected {
            reason: format!("venue returned {status}"),
        },
    })
}

#[async_trait]
impl MarketDataProvider for LiveBroker {
    /// Subscribes to `candles.close`, filtering for this venue's `source`
    /// and the caller's `symbol`/`timeframe`. This is the channel's
    /// consumer side of the aggregator's emit step (`spec.md` §4.C).
    async fn stream_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<BoxStream<'static, Ohlcv>, BrokerError> {
        let events = subscribe_json::<CandleCloseEvent>(self.bus.as_ref(), channels::CANDLES_CLOSE)
            .await
            .map_err(|e| BrokerError::ConnectionLost(e.to_string()))?;

        let source = self.config.source.clone();
        let symbol = SmolStr::new(symbol);
        let stream = events.filter_map(move |result| {
            let source = source.clone();
            let symbol = symbol.clone();
            async move {
                match result {
                    Ok(event) if event.broker == source && event.symbol == symbol && event.timeframe == timeframe => {
                        Some(Ohlcv {
                            source: event.broker,
                            symbol: event.symbol,
                            timeframe: event.timeframe,
                            timestamp: event.timestamp.timestamp(),
                            open: event.open,
                            high: event.high,
                            low: event.low,
                            close: event.close,
                            volume: event.volume,
                        })
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed candle-close event");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn latest_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        #[derive(Deserialize)]
        struct PriceResponse {
            price: Decimal,
        }
        let resp: PriceResponse = self
            .signed_request(
                reqwest::Method::GET,
                "/v2/ticker/price",
                &[("symbol", symbol.to_owned())],
            )
            .await?;
        Ok(resp.price)
    }
}

#[derive(Deserialize)]
struct VenueOrder {
    id: String,
    client_order_id: Option<String>,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    qty: Decimal,
    filled_qty: Decimal,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    avg_fill_price: Option<Decimal>,
    status: String,
    created_at: chrono::DateTime<Utc>,
    filled_at: Option<chrono::DateTime<Utc>>,
}

impl VenueOrder {
    fn into_order_response(self, time_in_force: ferrotrade_types::TimeInForce) -> Result<OrderResponse, BrokerError> {
        Ok(OrderResponse {
            order_id: self.id,
            client_order_id: self.client_order_id,
            symbol: self.symbol.into(),
            side: parse_side(&self.side)?,
            order_type: parse_order_type(&self.order_type)?,
            quantity: self.qty,
            filled_quantity: self.filled_qty,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            filled_at: self.filled_at,
            avg_fill_price: self.avg_fill_price,
            time_in_force,
            broker_metadata: serde_json::Value::Null,
        })
    }
}

fn parse_side(s: &str) -> Result<OrderSide, BrokerError> {
    match s {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(BrokerError::OrderRejected {
            reason: format!("unknown side from venue: {other}"),
        }),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, BrokerError> {
    Ok(match s {
        "market" => OrderType::Market,
        "limit" => OrderType::Limit,
        "stop" => OrderType::Stop,
        "stop_limit" => OrderType::StopLimit,
        "trailing_stop" => OrderType::TrailingStop,
        other => {
            return Err(BrokerError::OrderRejected {
                reason: format!("unknown order type from venue: {other}"),
            })
        }
    })
}

fn parse_status(s: &str) -> Result<OrderStatus, BrokerError> {
    Ok(match s {
        "pending" | "new" => OrderStatus::Pending,
        "accepted" | "submitted" | "open" => OrderStatus::Submitted,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "cancelled" | "canceled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        "expired" => OrderStatus::Expired,
        other => {
            return Err(BrokerError::OrderRejected {
                reason: format!("unknown status from venue: {other}"),
            })
        }
    })
}

#[async_trait]
impl OrderExecutor for LiveBroker {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, BrokerError> {
        request
            .validate()
            .map_err(|e| BrokerError::Engine(ferrotrade_types::EngineError::InvalidOrderParameters(e.to_string())))?;

        let mut query = vec![
            ("symbol".to_owned(), request.symbol.to_string()),
            ("side".to_owned(), side_str(request.side).to_owned()),
            ("type".to_owned(), order_type_str(request.order_type).to_owned()),
        ];
        if let Some(q) = request.quantity {
            query.push(("qty".to_owned(), q.to_string()));
        }
        if let Some(n) = request.notional {
            query.push(("notional".to_owned(), n.to_string()));
        }
        if let Some(p) = request.limit_price {
            query.push(("limit_price".to_owned(), p.to_string()));
        }
        if let Some(p) = request.stop_price {
            query.push(("stop_price".to_owned(), p.to_string()));
        }
        if let Some(id) = &request.client_order_id {
            query.push(("client_order_id".to_owned(), id.clone()));
        }
        let query_refs: Vec<(&str, String)> = query.into_iter().collect();

        let venue_order: VenueOrder = self.signed_request(reqwest::Method::POST, "/v2/orders", &query_refs).await?;
        venue_order.into_order_response(request.time_in_force)
    }

    async fn modify_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let mut query = vec![];
        if let Some(q) = request.quantity {
            query.push(("qty".to_owned(), q.to_string()));
        }
        if let Some(p) = request.limit_price {
            query.push(("limit_price".to_owned(), p.to_string()));
        }
        if let Some(p) = request.stop_price {
            query.push(("stop_price".to_owned(), p.to_string()));
        }
        let venue_order: VenueOrder = self
            .signed_request(reqwest::Method::PATCH, &format!("/v2/orders/{order_id}"), &query)
            .await?;
        venue_order.into_order_response(request.time_in_force)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let _: serde_json::Value = self
            .signed_request(reqwest::Method::DELETE, &format!("/v2/orders/{order_id}"), &[])
            .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
        let venue_order: VenueOrder = self
            .signed_request(reqwest::Method::GET, &format!("/v2/orders/{order_id}"), &[])
            .await?;
        venue_order.into_order_response(ferrotrade_types::TimeInForce::Day)
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::Stop => "stop",
        OrderType::StopLimit => "stop_limit",
        OrderType::TrailingStop => "trailing_stop",
    }
}

#[derive(Deserialize)]
struct VenueAccount {
    cash: Decimal,
    positions: Vec<VenuePosition>,
}

#[derive(Deserialize)]
struct VenuePosition {
    symbol: String,
    qty: Decimal,
}

#[async_trait]
impl AccountProvider for LiveBroker {
    async fn account(&self) -> Result<Account, BrokerError> {
        let venue_account: VenueAccount = self
            .signed_request(reqwest::Method::GET, "/v2/account", &[])
            .await?;
        let mut account = Account::new(self.config.account_id.clone(), venue_account.cash);
        for pos in venue_account.positions {
            account.positions.insert(pos.symbol.into(), pos.qty);
        }
        Ok(account)
    }
}

impl Broker for LiveBroker {
    fn account_id(&self) -> SmolStr {
        self.config.account_id.clone()
    }
}
