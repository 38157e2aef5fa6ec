use ferrotrade_types::CurvePoint;
use rust_decimal::Decimal;

/// `total_return_pct = (final_equity - starting_balance) / starting_balance`
/// (`spec.md` §4.J.metrics). Zero when `starting_balance` is zero rather than
/// dividing by it, since a zero starting balance has no meaningful return.
pub fn total_return_pct(starting_balance: Decimal, final_equity: Decimal) -> Decimal {
    if starting_balance.is_zero() {
        return Decimal::ZERO;
    }
    (final_equity - starting_balance) / starting_balance
}

/// Per-period returns `r_i = (E_i - E_{i-1}) / E_{i-1}` of an equity curve,
/// one shorter than the input. Points where `E_{i-1}` is zero are skipped
/// rather than producing a division-by-zero return.
pub fn period_returns(equity_curve: &[CurvePoint]) -> Vec<Decimal> {
    equity_curve
        .windows(2)
        .filter_map(|pair| {
            let [prev, curr] = pair else { unreachable!() };
            if prev.value.is_zero() {
                None
            } else {
                Some((curr.value - prev.value) / prev.value)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(ts: i64, value: Decimal) -> CurvePoint {
        CurvePoint { timestamp: ts, value }
    }

    #[test]
    fn total_return_pct_matches_scenario_numbers() {
        assert_eq!(total_return_pct(dec!(100000), dec!(100010)), dec!(0.0001));
    }

    #[test]
    fn period_returns_has_one_fewer_point_than_curve() {
        let curve = vec![point(0, dec!(100)), point(60, dec!(110)), point(120, dec!(99))];
        let returns = period_returns(&curve);
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0], dec!(0.1));
        assert_eq!(returns[1], dec!(-0.1));
    }
}
