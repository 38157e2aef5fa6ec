use ferrotrade_types::EngineError;
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy shared by every [`crate::Broker`] implementation
/// (`spec.md` §7). Adapter-specific rejection reasons are mapped onto this
/// set at the boundary so callers never see venue-specific error types.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Simulated-broker placement errors (`spec.md` §4.G): `NoPriceData`,
    /// `InsufficientFunds`, `PositionShort`, `InvalidOrderParameters`,
    /// `OrderNotFound`.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),
}
