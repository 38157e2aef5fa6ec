use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// `equity = cash + sum(position_qty * current_price)`. Equity is always
/// derived at read time; only `cash` and `positions` are mutated on fills.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub account_id: SmolStr,
    pub cash: Decimal,
    /// Net open quantity per symbol (positive = long, negative = short).
    pub positions: HashMap<SmolStr, Decimal>,
}

impl Account {
    pub fn new(account_id: impl Into<SmolStr>, cash: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            cash,
            positions: HashMap::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Computes equity against a single symbol's current price, for the
    /// common single-instrument deployment/backtest case.
    pub fn equity_single(&self, symbol: &str, current_price: Decimal) -> Decimal {
        self.cash + self.position(symbol) * current_price
    }

    /// Computes equity across every open position given a price lookup.
    pub fn equity(&self, mut current_price: impl FnMut(&str) -> Option<Decimal>) -> Decimal {
        self.positions
            .iter()
            .fold(self.cash, |equity, (symbol, qty)| {
                match current_price(symbol) {
                    Some(price) => equity + *qty * price,
                    None => equity,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn equity_single_combines_cash_and_position() {
        let mut acct = Account::new("acct-1", dec!(99000));
        acct.positions.insert("AAPL".into(), dec!(10));
        assert_eq!(acct.equity_single("AAPL", dec!(101)), dec!(100010));
    }
}
