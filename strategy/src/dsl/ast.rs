use rust_decimal::Decimal;

/// A field read off the candle currently being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// An indicator computed over the trailing window of candles (inclusive of
/// the current one), matching the handful of indicators
/// `original_source/src/engine/context/indicators.py` exposes to strategy
/// code: a simple moving average, an RSI-style average-gain/loss ratio, and
/// a two-series crossover test.
#[derive(Debug, Clone, PartialEq)]
pub enum Indicator {
    Sma { period: usize },
    Rsi { period: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Field(Field),
    Indicator(Indicator),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(CompareOp, Expr, Expr),
    /// `crossover(a, b)`: true exactly when `a` was `<= b` on the previous
    /// candle and is `> b` on this one.
    Crossover(Expr, Expr),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
}

/// One `IF <condition> THEN <action> <quantity>` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub action: Action,
    pub quantity: Decimal,
}

/// A complete strategy program: an ordered list of rules, all evaluated
/// against every candle (first matching rule per action fires; nothing
/// stops a buy rule and a sell rule both firing on the same candle, which
/// mirrors how independent `if` statements behave in the original source).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub rules: Vec<Rule>,
}
