use rust_decimal::Decimal;

/// `sharpe = (mean(r) - rf_per_period) / stdev(r, sample) * sqrt(N)`
/// (`spec.md` §4.J.metrics), computed over a period-returns series already
/// extracted from an equity curve via [`crate::period_returns`].
///
/// Returns `0.0` if `returns` has fewer than two points or the sample
/// standard deviation is zero (a constant curve) — deliberately *not* the
/// teacher's `Decimal::MAX`-on-zero-stdev convention, per the spec's fixed
/// edge-case behaviour (documented in `DESIGN.md`).
pub fn sharpe_ratio(returns: &[Decimal], risk_free_per_period: Decimal, annualisation_factor: u32) -> Decimal {
    if returns.len() < 2 {
        return Decimal::ZERO;
    }

    let n = Decimal::from(returns.len());
    let mean = returns.iter().sum::<Decimal>() / n;

    let variance = returns
        .iter()
        .map(|r| (*r - mean) * (*r - mean))
        .sum::<Decimal>()
        / (n - Decimal::ONE);

    let Some(stdev) = variance.sqrt() else {
        return Decimal::ZERO;
    };
    if stdev.is_zero() {
        return Decimal::ZERO;
    }

    let Some(sqrt_n) = Decimal::from(annualisation_factor).sqrt() else {
        return Decimal::ZERO;
    };

    (mean - risk_free_per_period) / stdev * sqrt_n
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn constant_curve_returns_are_all_zero_so_sharpe_is_zero() {
        let returns = vec![Decimal::ZERO; 10];
        assert_eq!(sharpe_ratio(&returns, Decimal::ZERO, 252), Decimal::ZERO);
    }

    #[test]
    fn strictly_increasing_returns_yield_positive_sharpe() {
        let returns = vec![dec!(0.01), dec!(0.02), dec!(0.015), dec!(0.03)];
        assert!(sharpe_ratio(&returns, Decimal::ZERO, 252) > Decimal::ZERO);
    }

    #[test]
    fn strictly_decreasing_returns_yield_negative_sharpe() {
        let returns = vec![dec!(-0.01), dec!(-0.02), dec!(-0.015), dec!(-0.03)];
        assert!(sharpe_ratio(&returns, Decimal::ZERO, 252) < Decimal::ZERO);
    }

    #[test]
    fn fewer_than_two_points_is_zero() {
        assert_eq!(sharpe_ratio(&[dec!(0.1)], Decimal::ZERO, 252), Decimal::ZERO);
        assert_eq!(sharpe_ratio(&[], Decimal::ZERO, 252), Decimal::ZERO);
    }
}
