use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed set of candle bucket widths.
///
/// The set is closed by design: the aggregator iterates every member for each
/// incoming tick, so adding a variant here is the only way to widen coverage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All members of the closed set, in ascending order.
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Width of this bucket in seconds.
    pub const fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    /// Start-of-bucket timestamp (UTC seconds) that `ts` falls into.
    pub const fn bucket_start(self, ts: i64) -> i64 {
        let secs = self.seconds();
        (ts.div_euclid(secs)) * secs
    }

    /// Number of periods per year, used to annualise a Sharpe ratio computed
    /// from returns sampled at this timeframe. Trading-day convention (252).
    pub const fn annualisation_factor(self) -> u32 {
        match self {
            Timeframe::M1 => 252 * 24 * 60,
            Timeframe::M5 => 252 * 24 * 12,
            Timeframe::M15 => 252 * 24 * 4,
            Timeframe::M30 => 252 * 24 * 2,
            Timeframe::H1 => 252 * 24,
            Timeframe::H4 => 252 * 6,
            Timeframe::D1 => 252,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| UnknownTimeframe(s.to_owned()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown timeframe: {0}")]
pub struct UnknownTimeframe(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_start_aligns_to_width() {
        assert_eq!(Timeframe::M1.bucket_start(59), 0);
        assert_eq!(Timeframe::M1.bucket_start(60), 60);
        assert_eq!(Timeframe::M1.bucket_start(119), 60);
    }

    #[test]
    fn round_trips_through_str() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }
}
