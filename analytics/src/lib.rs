#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Performance metrics computed over a backtest or deployment's equity/cash
//! curves (`spec.md` §4.J.metrics): Sharpe ratio, max drawdown, total return,
//! realised/unrealised PnL, and trade count.

mod drawdown;
mod pnl;
#[cfg(test)]
mod properties;
mod returns;
mod sharpe;

pub use drawdown::max_drawdown;
pub use pnl::{realised_pnl, total_trades, unrealised_pnl};
pub use returns::{period_returns, total_return_pct};
pub use sharpe::sharpe_ratio;
