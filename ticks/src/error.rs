use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickSourceError {
    #[error("connection to venue feed lost: {0}")]
    ConnectionLost(String),

    #[error("backfill request failed: {0}")]
    BackfillFailed(String),
}
