use crate::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// An aggregated price-and-volume summary over a fixed-width time bucket.
///
/// Created by the aggregator on the first tick of a bucket, mutated by
/// subsequent ticks in the same bucket, then frozen and emitted once a later
/// tick crosses the next bucket boundary. Read-only once stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ohlcv {
    pub source: SmolStr,
    pub symbol: SmolStr,
    pub timeframe: Timeframe,
    /// Start of the bucket, UTC seconds. Always a multiple of `timeframe.seconds()`.
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CandleInvariantError {
    #[error("timestamp {timestamp} is not aligned to timeframe {timeframe} ({seconds}s buckets)")]
    Unaligned {
        timestamp: i64,
        timeframe: Timeframe,
        seconds: i64,
    },
    #[error("high {high} is below one of open/close/low")]
    HighTooLow { high: Decimal },
    #[error("low {low} is above one of open/close/high")]
    LowTooHigh { low: Decimal },
    #[error("volume {volume} is negative")]
    NegativeVolume { volume: Decimal },
}

impl Ohlcv {
    /// Opens a brand-new single-tick candle for `bucket_start`.
    pub fn open_from_tick(
        source: impl Into<SmolStr>,
        symbol: impl Into<SmolStr>,
        timeframe: Timeframe,
        bucket_start: i64,
        price: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            timeframe,
            timestamp: bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Folds a same-bucket tick into this candle, per the aggregator's update rule.
    pub fn apply_tick(&mut self, price: Decimal, volume: Decimal) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.volume += volume;
    }

    /// Checks the candle invariants from the data model: `low <= min(open,close) <=
    /// max(open,close) <= high`, `volume >= 0`, and bucket alignment.
    pub fn validate(&self) -> Result<(), CandleInvariantError> {
        let seconds = self.timeframe.seconds();
        if self.timestamp.rem_euclid(seconds) != 0 {
            return Err(CandleInvariantError::Unaligned {
                timestamp: self.timestamp,
                timeframe: self.timeframe,
                seconds,
            });
        }
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if self.high < body_high {
            return Err(CandleInvariantError::HighTooLow { high: self.high });
        }
        if self.low > body_low {
            return Err(CandleInvariantError::LowTooHigh { low: self.low });
        }
        if self.volume < Decimal::ZERO {
            return Err(CandleInvariantError::NegativeVolume {
                volume: self.volume,
            });
        }
        Ok(())
    }

    /// Unique key used for idempotent storage and subscriber-side dedup.
    pub fn key(&self) -> (SmolStr, SmolStr, Timeframe, i64) {
        (
            self.source.clone(),
            self.symbol.clone(),
            self.timeframe,
            self.timestamp,
        )
    }
}
