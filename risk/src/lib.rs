#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Placement-time order checks shared by the simulated and live brokers.
//!
//! These are not a general risk-management layer — `spec.md` explicitly
//! scopes the core to balance/quantity checks, not portfolio risk — just the
//! handful of parameter checks every order must pass before a broker accepts
//! it: field-level validity (delegated to [`ferrotrade_types::OrderRequest::validate`])
//! plus the limit/stop price-vs-reference checks from `spec.md` §4.G.

use ferrotrade_types::{OrderRequest, OrderSide, OrderType};
use rust_decimal::Decimal;
use thiserror::Error;

/// Outcome of a placement-time check: either the order may proceed, or it is
/// refused with a human-readable reason (mirrors a broker's synchronous
/// rejection, distinct from a later fill-time rejection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Approved,
    Refused(String),
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("invalid order parameters: {0}")]
    InvalidParameters(String),
}

/// Runs field validation, then the limit/stop-vs-reference-price checks from
/// `spec.md` §4.G: a buy-limit at or above the reference price is refused (it
/// would simply fill immediately as a market order), a sell-limit at or
/// below it likewise; a buy-stop must sit above the reference price and a
/// sell-stop below it.
pub fn check_order_placement(
    request: &OrderRequest,
    reference_price: Decimal,
) -> Result<RiskDecision, RiskError> {
    request
        .validate()
        .map_err(|e| RiskError::InvalidParameters(e.to_string()))?;

    let refused = match (request.order_type, request.side) {
        (OrderType::Limit, OrderSide::Buy) => request
            .limit_price
            .is_some_and(|p| p >= reference_price)
            .then(|| format!("buy-limit price {p} is not below reference price {reference_price}", p = request.limit_price.unwrap())),
        (OrderType::Limit, OrderSide::Sell) => request
            .limit_price
            .is_some_and(|p| p <= reference_price)
            .then(|| format!("sell-limit price {p} is not above reference price {reference_price}", p = request.limit_price.unwrap())),
        (OrderType::Stop, OrderSide::Buy) => request
            .stop_price
            .is_some_and(|p| p <= reference_price)
            .then(|| format!("buy-stop price {p} is not above reference price {reference_price}", p = request.stop_price.unwrap())),
        (OrderType::Stop, OrderSide::Sell) => request
            .stop_price
            .is_some_and(|p| p >= reference_price)
            .then(|| format!("sell-stop price {p} is not below reference price {reference_price}", p = request.stop_price.unwrap())),
        _ => None,
    };

    Ok(match refused {
        Some(reason) => RiskDecision::Refused(reason),
        None => RiskDecision::Approved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_types::TimeInForce;
    use rust_decimal_macros::dec;

    fn limit(side: OrderSide, limit_price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "AAPL".into(),
            side,
            order_type: OrderType::Limit,
            quantity: Some(dec!(1)),
            notional: None,
            limit_price: Some(limit_price),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        }
    }

    #[test]
    fn buy_limit_above_reference_is_refused() {
        let decision = check_order_placement(&limit(OrderSide::Buy, dec!(105)), dec!(100)).unwrap();
        assert!(!decision.is_approved());
    }

    #[test]
    fn buy_limit_below_reference_is_approved() {
        let decision = check_order_placement(&limit(OrderSide::Buy, dec!(95)), dec!(100)).unwrap();
        assert_eq!(decision, RiskDecision::Approved);
    }

    #[test]
    fn sell_limit_below_reference_is_refused() {
        let decision = check_order_placement(&limit(OrderSide::Sell, dec!(95)), dec!(100)).unwrap();
        assert!(!decision.is_approved());
    }
}
