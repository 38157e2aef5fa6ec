use super::ast::{Action, ArithOp, CompareOp, Condition, Expr, Field, Indicator, Program};
use super::indicators;
use crate::{Strategy, StrategyContext, StrategyError};
use async_trait::async_trait;
use ferrotrade_types::{Ohlcv, OrderRequest, OrderSide, OrderType, TimeInForce};
use rust_decimal::Decimal;
use std::collections::VecDeque;

const MAX_HISTORY: usize = 512;

/// A [`Strategy`] driven by a parsed [`Program`] instead of native Rust
/// code. Maintains a trailing window of candles so indicators and
/// `crossover` can look back.
pub struct DslStrategy {
    program: Program,
    history: VecDeque<Ohlcv>,
}

impl DslStrategy {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            history: VecDeque::with_capacity(MAX_HISTORY),
        }
    }

    fn push_history(&mut self, candle: Ohlcv) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(candle);
    }

    fn history_slice(&self) -> Vec<Ohlcv> {
        self.history.iter().cloned().collect()
    }

    fn eval_expr(&self, expr: &Expr, history: &[Ohlcv]) -> Option<Decimal> {
        match expr {
            Expr::Number(n) => Some(*n),
            Expr::Field(field) => history.last().map(|c| field_of(c, *field)),
            Expr::Indicator(Indicator::Sma { period }) => indicators::sma(history, *period),
            Expr::Indicator(Indicator::Rsi { period }) => indicators::rsi(history, *period),
            Expr::Arith(op, lhs, rhs) => {
                let l = self.eval_expr(lhs, history)?;
                let r = self.eval_expr(rhs, history)?;
                Some(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div if r != Decimal::ZERO => l / r,
                    ArithOp::Div => return None,
                })
            }
        }
    }

    fn eval_condition(&self, condition: &Condition, history: &[Ohlcv]) -> bool {
        match condition {
            Condition::Compare(op, lhs, rhs) => {
                let (Some(l), Some(r)) = (self.eval_expr(lhs, history), self.eval_expr(rhs, history)) else {
                    return false;
                };
                match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Lte => l <= r,
                    CompareOp::Gt => l > r,
                    CompareOp::Gte => l >= r,
                    CompareOp::Eq => l == r,
                }
            }
            Condition::Crossover(a, b) => {
                if history.len() < 2 {
                    return false;
                }
                let prev = &history[..history.len() - 1];
                let (Some(a_now), Some(b_now)) = (self.eval_expr(a, history), self.eval_expr(b, history))
                else {
                    return false;
                };
                let (Some(a_prev), Some(b_prev)) = (self.eval_expr(a, prev), self.eval_expr(b, prev))
                else {
                    return false;
                };
                a_prev <= b_prev && a_now > b_now
            }
            Condition::And(l, r) => self.eval_condition(l, history) && self.eval_condition(r, history),
            Condition::Or(l, r) => self.eval_condition(l, history) || self.eval_condition(r, history),
        }
    }
}

fn field_of(candle: &Ohlcv, field: Field) -> Decimal {
    match field {
        Field::Open => candle.open,
        Field::High => candle.high,
        Field::Low => candle.low,
        Field::Close => candle.close,
        Field::Volume => candle.volume,
    }
}

#[async_trait]
impl Strategy for DslStrategy {
    async fn on_candle(&mut self, ctx: &StrategyContext) -> Result<(), StrategyError> {
        self.push_history(ctx.candle.clone());
        let history = self.history_slice();

        for rule in self.program.rules.clone() {
            if self.eval_condition(&rule.condition, &history) {
                let side = match rule.action {
                    Action::Buy => OrderSide::Buy,
                    Action::Sell => OrderSide::Sell,
                };
                let request = OrderRequest {
                    symbol: ctx.candle.symbol.clone(),
                    side,
                    order_type: OrderType::Market,
                    quantity: Some(rule.quantity),
                    notional: None,
                    limit_price: None,
                    stop_price: None,
                    time_in_force: TimeInForce::Day,
                    client_order_id: None,
                };
                ctx.submit_order(request).await?;
            }
        }
        Ok(())
    }
}
