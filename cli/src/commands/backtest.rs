use std::path::PathBuf;

use ferrotrade_backtest::{BacktestConfig, BacktestEngine};
use ferrotrade_strategy::StrategyRegistry;
use ferrotrade_types::BacktestStatus;
use uuid::Uuid;

use crate::commands::{instantiate, register_dsl_strategy};
use crate::config::StoreHandles;
use crate::CliError;

/// `backtest run --backtest-id UUID` (`spec.md` §6, §4.J): loads the
/// backtest row, runs the engine to completion, and writes the resulting
/// status and metrics back. Exit code is the caller's concern in `main`.
pub async fn run(
    handles: StoreHandles,
    backtest_id: Uuid,
    strategy_dsl_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let record = handles
        .stores
        .backtests()
        .get(backtest_id)
        .await?
        .ok_or(CliError::BacktestNotFound(backtest_id))?;

    let mut registry = StrategyRegistry::new();
    if let Some(path) = &strategy_dsl_path {
        register_dsl_strategy(&mut registry, record.strategy_id, path)?;
    }
    let strategy = instantiate(&registry, record.strategy_id, backtest_id)?;

    handles
        .stores
        .backtests()
        .set_status(backtest_id, BacktestStatus::Running)
        .await?;

    let config = BacktestConfig::new(
        "historical",
        record.symbol.clone(),
        record.timeframe,
        record.start_date,
        record.end_date,
        record.starting_balance,
    );

    let engine = BacktestEngine::new(handles.candles.clone());
    match engine.run(config, strategy).await {
        Ok(metrics) => {
            handles.stores.backtests().set_metrics(backtest_id, &metrics).await?;
            handles
                .stores
                .backtests()
                .set_status(backtest_id, BacktestStatus::Completed)
                .await?;
            tracing::info!(%backtest_id, total_trades = metrics.total_trades, "backtest completed");
        }
        Err(e) => {
            tracing::error!(%backtest_id, error = %e, "backtest failed, preserving partial orders");
            handles
                .stores
                .backtests()
                .set_failed(backtest_id, e.to_string())
                .await?;
        }
    }

    Ok(())
}
