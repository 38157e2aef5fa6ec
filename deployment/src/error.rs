use ferrotrade_broker::BrokerError;
use ferrotrade_bus::BusError;
use ferrotrade_store::StorageError;
use ferrotrade_strategy::StrategyError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the deployment runtime, aggregated the way the
/// teacher's error enums wrap subsystem errors with `#[from]` (`spec.md`
/// §7: "each subsystem owns a taxonomy slice").
///
/// Unlike [`ferrotrade_backtest::BacktestError`], a [`StrategyError`] here
/// IS fatal: `spec.md` §4.K treats an unhandled exception from the strategy
/// loop as the `error` terminal status, not a log-and-continue.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("deployment {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
