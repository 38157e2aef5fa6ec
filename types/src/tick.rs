use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The kind of market a tick was observed on. The original source only ever
/// distinguished spot trades; the spread is carried here so a single `Tick`
/// shape covers venues that also report derivatives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    Future,
    Perpetual,
    Option,
}

/// A single executed trade observation from a venue.
///
/// Insert-only. Uniqueness is on `(source, key)`, where `key` deduplicates
/// identical trades replayed by a reconnecting feed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    pub source: SmolStr,
    pub symbol: SmolStr,
    pub market_type: MarketType,
    pub price: Decimal,
    pub size: Decimal,
    /// Seconds since epoch, UTC.
    pub timestamp: i64,
}

impl Tick {
    /// Dedup key: `"timestamp:price:size"`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.timestamp, self.price, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn key_is_deterministic() {
        let t = Tick {
            source: "binance".into(),
            symbol: "BTCUSDT".into(),
            market_type: MarketType::Spot,
            price: dec!(65000.5),
            size: dec!(0.01),
            timestamp: 1_700_000_000,
        };
        assert_eq!(t.key(), "1700000000:65000.5:0.01");
    }
}
