use ferrotrade_types::{OrderResponse, OrderSide, OrderStatus};
use rust_decimal::Decimal;

/// `Σ(sell fills · price) - Σ(buy fills · price)` over filled orders only
/// (`spec.md` §4.J.metrics). Uses each fill's `avg_fill_price` and
/// `filled_quantity`, so partial fills contribute only their filled portion.
pub fn realised_pnl(orders: &[OrderResponse]) -> Decimal {
    orders
        .iter()
        .filter(|o| o.status == OrderStatus::Filled)
        .filter_map(|o| o.avg_fill_price.map(|price| (o.side, price * o.filled_quantity)))
        .fold(Decimal::ZERO, |acc, (side, notional)| match side {
            OrderSide::Sell => acc + notional,
            OrderSide::Buy => acc - notional,
        })
}

/// `net_open_qty * last_close - net_open_qty * avg_entry_price`
/// (`spec.md` §4.J.metrics): the mark-to-market gain/loss on the position
/// still open at the end of the run.
pub fn unrealised_pnl(net_open_qty: Decimal, last_close: Decimal, avg_entry_price: Decimal) -> Decimal {
    net_open_qty * last_close - net_open_qty * avg_entry_price
}

/// `count(status == filled)` (`spec.md` §4.J.metrics).
pub fn total_trades(orders: &[OrderResponse]) -> u64 {
    orders.iter().filter(|o| o.status == OrderStatus::Filled).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferrotrade_types::{OrderType, TimeInForce};
    use rust_decimal_macros::dec;

    fn filled(side: OrderSide, qty: Decimal, price: Decimal) -> OrderResponse {
        OrderResponse {
            order_id: "x".into(),
            client_order_id: None,
            symbol: "X".into(),
            side,
            order_type: OrderType::Market,
            quantity: qty,
            filled_quantity: qty,
            limit_price: None,
            stop_price: None,
            status: OrderStatus::Filled,
            created_at: Utc::now(),
            filled_at: Some(Utc::now()),
            avg_fill_price: Some(price),
            time_in_force: TimeInForce::Day,
            broker_metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn buy_then_sell_scenario_matches_spec_numbers() {
        let orders = vec![filled(OrderSide::Buy, dec!(10), dec!(100)), filled(OrderSide::Sell, dec!(10), dec!(105))];
        assert_eq!(realised_pnl(&orders), dec!(50));
        assert_eq!(total_trades(&orders), 2);
    }

    #[test]
    fn unrealised_pnl_matches_scenario_numbers() {
        assert_eq!(unrealised_pnl(dec!(10), dec!(101), dec!(100)), dec!(10));
    }
}
