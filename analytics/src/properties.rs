use crate::max_drawdown;
use ferrotrade_types::CurvePoint;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn curve_of(values: &[i64]) -> Vec<CurvePoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| CurvePoint {
            timestamp: i as i64,
            value: Decimal::from(*v),
        })
        .collect()
}

/// Brute-force reference: largest `(peak - trough) / peak` over every
/// `i <= j` pair, for comparison against the running-peak implementation.
fn naive_max_drawdown(curve: &[CurvePoint]) -> Decimal {
    let mut worst = Decimal::ZERO;
    for i in 0..curve.len() {
        if curve[i].value <= Decimal::ZERO {
            continue;
        }
        for j in i..curve.len() {
            let dd = (curve[i].value - curve[j].value) / curve[i].value;
            if dd > worst {
                worst = dd;
            }
        }
    }
    -worst
}

proptest! {
    #[test]
    fn monotonically_non_decreasing_curve_has_zero_drawdown(
        deltas in proptest::collection::vec(0i64..1000, 1..50),
    ) {
        let mut value = 1000i64;
        let mut values = vec![value];
        for d in deltas {
            value += d;
            values.push(value);
        }
        prop_assert_eq!(max_drawdown(&curve_of(&values)), Decimal::ZERO);
    }

    #[test]
    fn matches_brute_force_reference(
        values in proptest::collection::vec(1i64..10_000, 2..40),
    ) {
        let curve = curve_of(&values);
        prop_assert_eq!(max_drawdown(&curve), naive_max_drawdown(&curve));
    }
}
