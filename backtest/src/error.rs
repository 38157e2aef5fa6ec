use ferrotrade_store::StorageError;
use thiserror::Error;

/// Errors that abort a backtest outright, as opposed to a strategy
/// exception raised from `on_candle`, which is logged and does not fail the
/// run (`spec.md` §4.J: "the final status is `failed` only if the loop
/// itself cannot read candles").
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
