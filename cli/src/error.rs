use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the `ferrotrade` binary's subcommands. Each
/// variant wraps one subsystem's error type the way the teacher's worker
/// errors wrap theirs; the binary prints `Display` and exits non-zero.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] ferrotrade_store::StorageError),

    #[error(transparent)]
    Bus(#[from] ferrotrade_bus::BusError),

    #[error(transparent)]
    Aggregator(#[from] ferrotrade_aggregator::AggregatorError),

    #[error(transparent)]
    Backtest(#[from] ferrotrade_backtest::BacktestError),

    #[error(transparent)]
    Deployment(#[from] ferrotrade_deployment::DeploymentError),

    #[error(transparent)]
    Handler(#[from] ferrotrade_handler::HandlerError),

    #[error(transparent)]
    TickSource(#[from] ferrotrade_ticks::TickSourceError),

    #[error(transparent)]
    Dsl(#[from] ferrotrade_strategy::DslError),

    #[error("backtest {0} not found")]
    BacktestNotFound(Uuid),

    #[error("deployment {0} not found")]
    DeploymentNotFound(Uuid),

    #[error("strategy {0} (owner {1}) is not registered in this process")]
    StrategyNotRegistered(Uuid, Uuid),

    #[error("could not read strategy source file: {0}")]
    Io(#[from] std::io::Error),

    #[error("subscription to {0} exhausted its reconnect attempts")]
    ReconnectExhausted(String),
}
