use crate::{StrategyContext, StrategyError};
use async_trait::async_trait;

/// A user strategy's lifecycle, matching `spec.md` §4.I exactly:
/// `startup` runs once before the first candle, `on_candle` runs once per
/// closed candle, `shutdown` runs once after the loop ends (including after
/// an error — the host is responsible for calling it in a `finally`-style
/// position).
///
/// Both `startup` and `shutdown` default to no-ops so a minimal strategy
/// only needs to implement `on_candle`.
#[async_trait]
pub trait Strategy: Send {
    async fn startup(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }

    async fn on_candle(&mut self, ctx: &StrategyContext) -> Result<(), StrategyError>;

    async fn shutdown(&mut self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// Produces a fresh, independently-stateful [`Strategy`] instance. A
/// backtest and a live deployment of the same `strategy_id` each get their
/// own instance so mutable state (e.g. a position-size tracker) never leaks
/// between runs.
pub trait StrategyFactory: Send + Sync {
    fn create(&self) -> Box<dyn Strategy>;
}

impl<F> StrategyFactory for F
where
    F: Fn() -> Box<dyn Strategy> + Send + Sync,
{
    fn create(&self) -> Box<dyn Strategy> {
        (self)()
    }
}
