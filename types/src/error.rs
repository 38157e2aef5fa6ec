use rust_decimal::Decimal;

/// Engine-level errors raised synchronously by order placement against a
/// broker (live or simulated). Rejections discovered later, at fill time,
/// mutate the order's status instead of raising one of these.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EngineError {
    #[error("no price data available for this instrument yet")]
    NoPriceData,
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    #[error("position too small to sell: have {have}, requested {requested}")]
    PositionShort { have: Decimal, requested: Decimal },
    #[error("invalid order parameters: {0}")]
    InvalidOrderParameters(String),
    #[error("order not found: {0}")]
    OrderNotFound(String),
}
