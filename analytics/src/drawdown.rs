use ferrotrade_types::CurvePoint;
use rust_decimal::Decimal;

/// Scans the equity curve keeping a running peak; at each point
/// `dd = peak - value`, `dd_pct = dd / peak` (0 when `peak <= 0`). Reports
/// the largest such `dd_pct` as a **non-positive** percentage (`spec.md`
/// §4.J.metrics, §9 Open Question resolved in `DESIGN.md`).
pub fn max_drawdown(equity_curve: &[CurvePoint]) -> Decimal {
    let mut peak: Option<Decimal> = None;
    let mut worst = Decimal::ZERO;

    for point in equity_curve {
        let current_peak = match peak {
            Some(p) if p >= point.value => p,
            _ => {
                peak = Some(point.value);
                point.value
            }
        };

        if current_peak <= Decimal::ZERO {
            continue;
        }
        let dd_pct = (current_peak - point.value) / current_peak;
        if dd_pct > worst {
            worst = dd_pct;
        }
    }

    -worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(ts: i64, value: Decimal) -> CurvePoint {
        CurvePoint { timestamp: ts, value }
    }

    #[test]
    fn monotonically_non_decreasing_curve_has_zero_drawdown() {
        let curve = vec![point(0, dec!(100)), point(1, dec!(100)), point(2, dec!(110))];
        assert_eq!(max_drawdown(&curve), Decimal::ZERO);
    }

    #[test]
    fn a_dip_is_reported_as_a_negative_percentage() {
        let curve = vec![point(0, dec!(100)), point(1, dec!(80)), point(2, dec!(120))];
        assert_eq!(max_drawdown(&curve), dec!(-0.2));
    }

    #[test]
    fn worst_of_multiple_dips_is_reported() {
        let curve = vec![
            point(0, dec!(100)),
            point(1, dec!(90)),
            point(2, dec!(100)),
            point(3, dec!(50)),
            point(4, dec!(70)),
        ];
        assert_eq!(max_drawdown(&curve), dec!(-0.5));
    }
}
