use ferrotrade_store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("historical store error: {0}")]
    Storage(#[from] StorageError),

    #[error("recovery cache error: {0}")]
    Cache(String),
}
