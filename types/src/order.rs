use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

/// Caller-supplied order intent.
///
/// Exactly one of `quantity` / `notional` must be set (both greater than
/// zero). Type-specific rules are enforced by [`OrderRequest::validate`], not
/// by construction, so deserialising a caller-provided payload and validating
/// it are separate steps.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderRequest {
    pub symbol: SmolStr,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub notional: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("exactly one of quantity/notional must be set and positive")]
    SizeSpecification,
    #[error("market orders must not carry limit or stop prices")]
    MarketWithPrice,
    #[error("limit orders require a positive limit_price")]
    MissingLimitPrice,
    #[error("stop orders require a positive stop_price")]
    MissingStopPrice,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        let qty_set = self.quantity.is_some_and(|q| q > Decimal::ZERO);
        let notional_set = self.notional.is_some_and(|n| n > Decimal::ZERO);
        if qty_set == notional_set {
            // both or neither
            return Err(OrderValidationError::SizeSpecification);
        }

        match self.order_type {
            OrderType::Market => {
                if self.limit_price.is_some() || self.stop_price.is_some() {
                    return Err(OrderValidationError::MarketWithPrice);
                }
            }
            OrderType::Limit => {
                if !self.limit_price.is_some_and(|p| p > Decimal::ZERO) {
                    return Err(OrderValidationError::MissingLimitPrice);
                }
            }
            OrderType::Stop | OrderType::TrailingStop => {
                if !self.stop_price.is_some_and(|p| p > Decimal::ZERO) {
                    return Err(OrderValidationError::MissingStopPrice);
                }
            }
            OrderType::StopLimit => {
                if !self.limit_price.is_some_and(|p| p > Decimal::ZERO) {
                    return Err(OrderValidationError::MissingLimitPrice);
                }
                if !self.stop_price.is_some_and(|p| p > Decimal::ZERO) {
                    return Err(OrderValidationError::MissingStopPrice);
                }
            }
        }
        Ok(())
    }
}

/// Status transitions form a DAG: `pending -> submitted -> {partially_filled
/// -> filled | cancelled | rejected | expired}`. `filled`, `cancelled`,
/// `rejected`, `expired` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Whether transitioning from `self` to `next` is a valid forward move
    /// along the status DAG. Equal states are not a transition (`false`);
    /// callers that need idempotent re-application should short-circuit on
    /// equality before calling this.
    pub const fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Submitted, PartiallyFilled)
                | (Submitted, Filled)
                | (Submitted, Cancelled)
                | (Submitted, Rejected)
                | (Submitted, Expired)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
                | (PartiallyFilled, Expired)
        )
    }
}

/// Broker-assigned order state, as reported back to callers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: SmolStr,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub avg_fill_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub broker_metadata: serde_json::Value,
}

/// A limit/stop order awaiting its trigger condition, owned by the broker
/// instance's lifetime — never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PendingOrder {
    pub request: OrderRequest,
    pub response: OrderResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base(order_type: OrderType) -> OrderRequest {
        OrderRequest {
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            order_type,
            quantity: Some(dec!(10)),
            notional: None,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        }
    }

    #[test]
    fn market_order_is_valid() {
        base(OrderType::Market).validate().unwrap();
    }

    #[test]
    fn market_order_rejects_limit_price() {
        let mut r = base(OrderType::Market);
        r.limit_price = Some(dec!(100));
        assert_eq!(r.validate(), Err(OrderValidationError::MarketWithPrice));
    }

    #[test]
    fn limit_order_requires_limit_price() {
        assert_eq!(
            base(OrderType::Limit).validate(),
            Err(OrderValidationError::MissingLimitPrice)
        );
    }

    #[test]
    fn rejects_both_quantity_and_notional() {
        let mut r = base(OrderType::Market);
        r.notional = Some(dec!(500));
        assert_eq!(r.validate(), Err(OrderValidationError::SizeSpecification));
    }

    #[test]
    fn rejects_neither_quantity_nor_notional() {
        let mut r = base(OrderType::Market);
        r.quantity = None;
        assert_eq!(r.validate(), Err(OrderValidationError::SizeSpecification));
    }

    #[test]
    fn status_dag_allows_only_forward_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Submitted));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Filled));
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Submitted));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::Filled.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }
}
