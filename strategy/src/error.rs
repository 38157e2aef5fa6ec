use ferrotrade_broker::BrokerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("strategy raised an error: {0}")]
    Raised(String),
}

#[derive(Debug, Error)]
pub enum DslError {
    #[error("parse error at position {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("unknown field: {0}")]
    UnknownField(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no strategy registered for id {0}")]
    NotFound(uuid::Uuid),
}
