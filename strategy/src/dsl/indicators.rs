use ferrotrade_types::Ohlcv;
use rust_decimal::Decimal;

/// Simple moving average of `close` over the trailing `period` candles
/// (inclusive of the most recent one). `None` until at least `period`
/// candles have been observed.
pub fn sma(history: &[Ohlcv], period: usize) -> Option<Decimal> {
    if period == 0 || history.len() < period {
        return None;
    }
    let window = &history[history.len() - period..];
    let sum: Decimal = window.iter().map(|c| c.close).sum();
    Some(sum / Decimal::from(period))
}

/// Wilder-style RSI over the trailing `period` close-to-close changes.
/// Requires `period + 1` candles. A zero average loss yields `100`
/// (all gains, no losses), matching the conventional RSI edge case.
pub fn rsi(history: &[Ohlcv], period: usize) -> Option<Decimal> {
    if period == 0 || history.len() < period + 1 {
        return None;
    }
    let window = &history[history.len() - (period + 1)..];
    let mut gain_sum = Decimal::ZERO;
    let mut loss_sum = Decimal::ZERO;
    for pair in window.windows(2) {
        let change = pair[1].close - pair[0].close;
        if change > Decimal::ZERO {
            gain_sum += change;
        } else {
            loss_sum += -change;
        }
    }
    let avg_gain = gain_sum / Decimal::from(period);
    let avg_loss = loss_sum / Decimal::from(period);
    if avg_loss == Decimal::ZERO {
        return Some(Decimal::from(100));
    }
    let rs = avg_gain / avg_loss;
    Some(Decimal::from(100) - (Decimal::from(100) / (Decimal::ONE + rs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotrade_types::Timeframe;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Ohlcv {
        Ohlcv {
            source: "x".into(),
            symbol: "y".into(),
            timeframe: Timeframe::M1,
            timestamp: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[test]
    fn sma_averages_the_trailing_window() {
        let history = vec![candle(dec!(10)), candle(dec!(20)), candle(dec!(30))];
        assert_eq!(sma(&history, 2), Some(dec!(25)));
        assert_eq!(sma(&history, 4), None);
    }

    #[test]
    fn rsi_is_100_when_there_are_no_losses() {
        let history = vec![candle(dec!(10)), candle(dec!(11)), candle(dec!(12))];
        assert_eq!(rsi(&history, 2), Some(dec!(100)));
    }
}
