use async_trait::async_trait;
use chrono::Utc;
use ferrotrade_broker::{AccountProvider, Broker, BrokerError, MarketDataProvider, OrderExecutor};
use ferrotrade_risk::{check_order_placement, RiskDecision};
use ferrotrade_types::{
    Account, EngineError, Ohlcv, OrderRequest, OrderResponse, OrderSide, OrderStatus, OrderType,
    PendingOrder, Timeframe,
};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Deterministic broker over a fed candle stream (`spec.md` §4.G). The
/// backtest engine (and any other single-task caller) drives it with
/// [`SimulatedBroker::feed`] once per candle; there is no internal
/// streaming of candles — `MarketDataProvider::stream_candles` is
/// unsupported here, matching the spec's framing of the simulated broker as
/// "single-writer, no locks needed (only entered from one task)".
///
/// All mutation goes through one `tokio::sync::Mutex` even though the spec
/// calls for no locking, purely to satisfy `&self` in the shared [`Broker`]
/// trait object — contention never occurs because only one task ever calls
/// in.
pub struct SimulatedBroker {
    account_id: SmolStr,
    symbol: SmolStr,
    state: Mutex<State>,
}

struct State {
    cash: Decimal,
    filled_buy_qty: Decimal,
    filled_sell_qty: Decimal,
    current_candle: Option<Ohlcv>,
    /// Every order ever submitted, keyed by its simulated order id, in
    /// submission order via `order_seq`.
    orders: HashMap<String, (OrderRequest, OrderResponse)>,
    /// Ids still awaiting their trigger condition, in insertion order.
    pending_ids: Vec<String>,
    next_seq: u64,
}

impl std::fmt::Debug for SimulatedBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBroker")
            .field("account_id", &self.account_id)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

impl SimulatedBroker {
    pub fn new(account_id: impl Into<SmolStr>, symbol: impl Into<SmolStr>, starting_balance: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            symbol: symbol.into(),
            state: Mutex::new(State {
                cash: starting_balance,
                filled_buy_qty: Decimal::ZERO,
                filled_sell_qty: Decimal::ZERO,
                current_candle: None,
                orders: HashMap::new(),
                pending_ids: Vec::new(),
                next_seq: 0,
            }),
        }
    }

    /// Feeds one candle into the broker (`spec.md` §4.G "Candle loop"):
    /// sets the current candle, then scans pending orders in insertion
    /// order, transitioning triggered orders to `filled` or `rejected`.
    /// Orders submitted afterwards by the strategy (market orders in
    /// particular) see this same candle as the current one, so they fill
    /// at its close.
    pub async fn feed(&self, candle: Ohlcv) {
        let mut state = self.state.lock().await;
        state.current_candle = Some(candle.clone());

        let pending_ids = std::mem::take(&mut state.pending_ids);
        let mut still_pending = Vec::with_capacity(pending_ids.len());
        for id in pending_ids {
            let Some((request, _)) = state.orders.get(&id).cloned() else {
                continue;
            };
            match trigger_price(&request, &candle) {
                Some(fill_price) => {
                    Self::settle(&mut state, &id, fill_price, candle.timestamp);
                }
                None => still_pending.push(id),
            }
        }
        state.pending_ids = still_pending;
    }

    /// Applies a fill or a fill-time rejection to the order `id`, mutating
    /// cash/position and the order's terminal status. A fill that would
    /// overdraw cash or oversell the position rejects instead of erroring,
    /// per the spec's balance discipline: pending orders never reserve cash
    /// at placement, so the check happens here.
    fn settle(state: &mut State, id: &str, fill_price: Decimal, candle_ts: i64) {
        let Some((request, response)) = state.orders.get(id).cloned() else {
            return;
        };
        let quantity = resolve_quantity(&request, fill_price);

        let accepted = match request.side {
            OrderSide::Buy => {
                let cost = quantity * fill_price;
                if state.cash >= cost {
                    state.cash -= cost;
                    state.filled_buy_qty += quantity;
                    true
                } else {
                    false
                }
            }
            OrderSide::Sell => {
                let net_open = state.filled_buy_qty - state.filled_sell_qty;
                if net_open >= quantity {
                    state.cash += quantity * fill_price;
                    state.filled_sell_qty += quantity;
                    true
                } else {
                    false
                }
            }
        };

        let mut updated = response;
        if accepted {
            updated.status = OrderStatus::Filled;
            updated.quantity = quantity;
            updated.filled_quantity = quantity;
            updated.avg_fill_price = Some(fill_price);
            updated.filled_at = chrono::DateTime::from_timestamp(candle_ts, 0);
        } else {
            updated.status = OrderStatus::Rejected;
        }
        state.orders.insert(id.to_owned(), (request, updated));
    }

    fn next_order_id(state: &mut State) -> String {
        state.next_seq += 1;
        format!("sim-{:08}", state.next_seq)
    }

    pub async fn cash(&self) -> Decimal {
        self.state.lock().await.cash
    }

    pub async fn net_open_quantity(&self) -> Decimal {
        let state = self.state.lock().await;
        state.filled_buy_qty - state.filled_sell_qty
    }

    /// `equity = cash + net_open_qty * current_close`, computed on demand.
    pub async fn equity(&self) -> Result<Decimal, BrokerError> {
        let state = self.state.lock().await;
        let close = state
            .current_candle
            .as_ref()
            .map(|c| c.close)
            .ok_or(EngineError::NoPriceData)?;
        Ok(state.cash + (state.filled_buy_qty - state.filled_sell_qty) * close)
    }

    pub async fn filled_orders(&self) -> Vec<OrderResponse> {
        self.state
            .lock()
            .await
            .orders
            .values()
            .filter(|(_, r)| r.status == OrderStatus::Filled)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub async fn pending_orders(&self) -> Vec<PendingOrder> {
        let state = self.state.lock().await;
        state
            .pending_ids
            .iter()
            .filter_map(|id| state.orders.get(id))
            .map(|(request, response)| PendingOrder {
                request: request.clone(),
                response: response.clone(),
            })
            .collect()
    }
}

/// Matches one order's trigger condition against the candle it is being
/// evaluated against (`spec.md` §4.G fill table). `stop_limit` triggers like
/// `stop` but fills at `limit_price`; `trailing_stop` is treated as an
/// absolute-level stop (`stop_price` as the trigger) since the spec's fill
/// table only covers market/limit/stop and true trailing-reference tracking
/// is out of scope here (documented in `DESIGN.md`).
fn trigger_price(request: &OrderRequest, candle: &Ohlcv) -> Option<Decimal> {
    match (request.order_type, request.side) {
        (OrderType::Market, _) => Some(candle.close),
        (OrderType::Limit, OrderSide::Buy) => {
            (candle.low <= request.limit_price?).then_some(request.limit_price?)
        }
        (OrderType::Limit, OrderSide::Sell) => {
            (candle.high >= request.limit_price?).then_some(request.limit_price?)
        }
        (OrderType::Stop, OrderSide::Buy) | (OrderType::TrailingStop, OrderSide::Buy) => {
            (candle.high >= request.stop_price?).then_some(request.stop_price?)
        }
        (OrderType::Stop, OrderSide::Sell) | (OrderType::TrailingStop, OrderSide::Sell) => {
            (candle.low <= request.stop_price?).then_some(request.stop_price?)
        }
        (OrderType::StopLimit, OrderSide::Buy) => {
            (candle.high >= request.stop_price?).then_some(request.limit_price?)
        }
        (OrderType::StopLimit, OrderSide::Sell) => {
            (candle.low <= request.stop_price?).then_some(request.limit_price?)
        }
    }
}

fn resolve_quantity(request: &OrderRequest, fill_price: Decimal) -> Decimal {
    match request.quantity {
        Some(q) => q,
        None => request.notional.expect("OrderRequest::validate ensures exactly one is set") / fill_price,
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedBroker {
    async fn stream_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
    ) -> Result<BoxStream<'static, Ohlcv>, BrokerError> {
        Err(BrokerError::DataUnavailable(
            "simulated broker is driven by SimulatedBroker::feed, not streamed".into(),
        ))
    }

    async fn latest_price(&self, _symbol: &str) -> Result<Decimal, BrokerError> {
        self.state
            .lock()
            .await
            .current_candle
            .as_ref()
            .map(|c| c.close)
            .ok_or_else(|| EngineError::NoPriceData.into())
    }
}

#[async_trait]
impl OrderExecutor for SimulatedBroker {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResponse, BrokerError> {
        let mut state = self.state.lock().await;
        let reference_price = state
            .current_candle
            .as_ref()
            .map(|c| c.close)
            .ok_or(EngineError::NoPriceData)?;

        match check_order_placement(&request, reference_price).map_err(|e| {
            BrokerError::Engine(EngineError::InvalidOrderParameters(e.to_string()))
        })? {
            RiskDecision::Refused(reason) => {
                return Err(BrokerError::Engine(EngineError::InvalidOrderParameters(reason)))
            }
            RiskDecision::Approved => {}
        }

        let order_id = Self::next_order_id(&mut state);
        let now = Utc::now();
        let response = OrderResponse {
            order_id: order_id.clone(),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity.unwrap_or_default(),
            filled_quantity: Decimal::ZERO,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            status: OrderStatus::Submitted,
            created_at: now,
            filled_at: None,
            avg_fill_price: None,
            time_in_force: request.time_in_force,
            broker_metadata: serde_json::Value::Null,
        };
        state.orders.insert(order_id.clone(), (request.clone(), response));

        if request.order_type == OrderType::Market {
            let candle_ts = state.current_candle.as_ref().expect("checked above").timestamp;
            Self::settle(&mut state, &order_id, reference_price, candle_ts);
            if let Some((_, filled)) = state.orders.get(&order_id) {
                if filled.status == OrderStatus::Rejected {
                    let needed = resolve_quantity(&request, reference_price) * reference_price;
                    return match request.side {
                        OrderSide::Buy => Err(EngineError::InsufficientFunds {
                            needed,
                            available: state.cash,
                        }
                        .into()),
                        OrderSide::Sell => Err(EngineError::PositionShort {
                            have: state.filled_buy_qty - state.filled_sell_qty,
                            requested: resolve_quantity(&request, reference_price),
                        }
                        .into()),
                    };
                }
            }
        } else {
            state.pending_ids.push(order_id.clone());
        }

        Ok(state.orders.get(&order_id).expect("just inserted").1.clone())
    }

    async fn modify_order(
        &self,
        order_id: &str,
        request: OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let mut state = self.state.lock().await;
        if !state.pending_ids.iter().any(|id| id == order_id) {
            return Err(EngineError::OrderNotFound(order_id.to_owned()).into());
        }
        let (_, existing) = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_owned()))?;

        let mut updated = existing;
        updated.quantity = request.quantity.unwrap_or(updated.quantity);
        updated.limit_price = request.limit_price;
        updated.stop_price = request.stop_price;
        state.orders.insert(order_id.to_owned(), (request, updated.clone()));
        Ok(updated)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let before = state.pending_ids.len();
        state.pending_ids.retain(|id| id != order_id);
        if state.pending_ids.len() == before {
            return Err(EngineError::OrderNotFound(order_id.to_owned()).into());
        }
        if let Some((_, response)) = state.orders.get_mut(order_id) {
            response.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
        self.state
            .lock()
            .await
            .orders
            .get(order_id)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_owned()).into())
    }
}

#[async_trait]
impl AccountProvider for SimulatedBroker {
    async fn account(&self) -> Result<Account, BrokerError> {
        let state = self.state.lock().await;
        let mut account = Account::new(self.account_id.clone(), state.cash);
        account
            .positions
            .insert(self.symbol.clone(), state.filled_buy_qty - state.filled_sell_qty);
        Ok(account)
    }
}

impl Broker for SimulatedBroker {
    fn account_id(&self) -> SmolStr {
        self.account_id.clone()
    }
}

/// Generates a fresh `client_order_id`-free id for orders the strategy
/// submits without specifying one. Kept separate from [`SimulatedBroker`]
/// so tests can construct ids the same way production code does.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_types::{TimeInForce, Timeframe};
    use rust_decimal_macros::dec;

    fn candle(close: Decimal, high: Decimal, low: Decimal) -> Ohlcv {
        Ohlcv {
            source: "sim".into(),
            symbol: "X".into(),
            timeframe: Timeframe::M1,
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    fn market_buy(qty: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "X".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: Some(qty),
            notional: None,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        }
    }

    #[tokio::test]
    async fn buy_hold_scenario_matches_spec_numbers() {
        let broker = SimulatedBroker::new("acct", "X", dec!(100000));
        let closes = [dec!(100), dec!(101), dec!(102), dec!(103), dec!(104), dec!(105), dec!(104), dec!(103), dec!(102), dec!(101)];

        for (i, &c) in closes.iter().enumerate() {
            broker.feed(candle(c, c, c)).await;
            if i == 0 {
                broker.submit_order(market_buy(dec!(10))).await.unwrap();
            }
        }

        assert_eq!(broker.cash().await, dec!(99000));
        assert_eq!(broker.net_open_quantity().await, dec!(10));
        assert_eq!(broker.equity().await.unwrap(), dec!(100010));
    }

    #[tokio::test]
    async fn buy_then_sell_scenario_matches_spec_numbers() {
        let broker = SimulatedBroker::new("acct", "X", dec!(100000));
        let closes = [dec!(100), dec!(101), dec!(102), dec!(103), dec!(104), dec!(105), dec!(104), dec!(103), dec!(102), dec!(101)];

        for (i, &c) in closes.iter().enumerate() {
            broker.feed(candle(c, c, c)).await;
            if i == 0 {
                broker.submit_order(market_buy(dec!(10))).await.unwrap();
            }
            if i == 5 {
                let sell = OrderRequest {
                    side: OrderSide::Sell,
                    ..market_buy(dec!(10))
                };
                broker.submit_order(sell).await.unwrap();
            }
        }

        assert_eq!(broker.net_open_quantity().await, dec!(0));
        assert_eq!(broker.cash().await, dec!(100050));
    }

    #[tokio::test]
    async fn buy_limit_at_or_above_reference_is_refused_at_placement() {
        let broker = SimulatedBroker::new("acct", "X", dec!(100000));
        broker.feed(candle(dec!(100), dec!(100), dec!(100))).await;
        let bad = OrderRequest {
            order_type: OrderType::Limit,
            limit_price: Some(dec!(105)),
            ..market_buy(dec!(1))
        };
        let err = broker.submit_order(bad).await.unwrap_err();
        assert!(matches!(err, BrokerError::Engine(EngineError::InvalidOrderParameters(_))));
    }

    #[tokio::test]
    async fn buy_limit_below_reference_fills_when_triggered() {
        let broker = SimulatedBroker::new("acct", "X", dec!(100000));
        broker.feed(candle(dec!(100), dec!(100), dec!(100))).await;
        let order = OrderRequest {
            order_type: OrderType::Limit,
            limit_price: Some(dec!(95)),
            ..market_buy(dec!(1))
        };
        let resp = broker.submit_order(order).await.unwrap();
        assert_eq!(resp.status, OrderStatus::Submitted);

        broker.feed(candle(dec!(96), dec!(97), dec!(94))).await;
        let updated = broker.get_order(&resp.order_id).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Filled);
        assert_eq!(updated.avg_fill_price, Some(dec!(95)));
    }

    #[tokio::test]
    async fn pending_order_overdrawing_cash_rejects_at_fill_time_not_placement() {
        let broker = SimulatedBroker::new("acct", "X", dec!(100));
        broker.feed(candle(dec!(100), dec!(100), dec!(100))).await;
        let order = OrderRequest {
            order_type: OrderType::Limit,
            limit_price: Some(dec!(95)),
            ..market_buy(dec!(10))
        };
        let resp = broker.submit_order(order).await.unwrap();

        broker.feed(candle(dec!(94), dec!(95), dec!(90))).await;
        let updated = broker.get_order(&resp.order_id).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn market_order_with_no_candle_yet_fails_synchronously() {
        let broker = SimulatedBroker::new("acct", "X", dec!(1000));
        let err = broker.submit_order(market_buy(dec!(1))).await.unwrap_err();
        assert!(matches!(err, BrokerError::Engine(EngineError::NoPriceData)));
    }

    #[tokio::test]
    async fn cash_conservation_holds_after_every_feed() {
        let broker = SimulatedBroker::new("acct", "X", dec!(1000));
        broker.feed(candle(dec!(10), dec!(10), dec!(10))).await;
        broker.submit_order(market_buy(dec!(5))).await.unwrap();
        broker.feed(candle(dec!(12), dec!(12), dec!(12))).await;
        let sell = OrderRequest {
            side: OrderSide::Sell,
            ..market_buy(dec!(5))
        };
        broker.submit_order(sell).await.unwrap();

        // cash_after == cash_before - buy_fills + sell_fills
        assert_eq!(broker.cash().await, dec!(1000) - dec!(50) + dec!(60));
    }
}
