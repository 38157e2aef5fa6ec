mod backend;
mod backtest;
pub mod deployment;
mod pipeline;

pub use backend::run as backend_run;
pub use backtest::run as backtest_run;
pub use deployment::run as deployment_run;
pub use pipeline::run as pipeline_run;

use ferrotrade_strategy::{Strategy, StrategyRegistry};
use std::path::Path;
use uuid::Uuid;

use crate::CliError;

/// Loads a DSL program from `path` and registers it under `strategy_id`.
///
/// Fetching the strategy's source text from the strategies table is the web
/// layer's job (out of scope here, `spec.md` §1); this is the CLI's stand-in
/// so `backtest run`/`deployment run` can be exercised standalone, the way
/// the spec's §9 Design Notes describe the registry being populated by "a
/// build step" upstream of the core.
pub fn register_dsl_strategy(
    registry: &mut StrategyRegistry,
    strategy_id: Uuid,
    dsl_path: &Path,
) -> Result<(), CliError> {
    let source = std::fs::read_to_string(dsl_path)?;
    registry.register_dsl_source(strategy_id, &source)?;
    Ok(())
}

pub(crate) fn instantiate(
    registry: &StrategyRegistry,
    strategy_id: Uuid,
    owner_id: Uuid,
) -> Result<Box<dyn Strategy>, CliError> {
    registry
        .instantiate(strategy_id)
        .map_err(|_| CliError::StrategyNotRegistered(strategy_id, owner_id))
}
