use ferrotrade_bus::BusError;
use ferrotrade_store::StorageError;
use thiserror::Error;

/// Errors that abort the handler entirely. Per-message failures (a bad
/// payload, a missing row on a modify/cancel) are logged and the message is
/// dropped — they never reach this type (`spec.md` §4.L).
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("subscription to {channel} exhausted its reconnect attempts")]
    ReconnectExhausted { channel: String },
}
