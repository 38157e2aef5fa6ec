//! Bus channel names. All channels carry JSON payloads (`spec.md` §6).

pub const TICKS_RAW: &str = "ticks.raw";
pub const CANDLES_CLOSE: &str = "candles.close";
pub const ORDERS_EVENTS: &str = "orders.events";
pub const SNAPSHOTS_EVENTS: &str = "snapshots.events";
pub const DEPLOYMENTS_EVENTS: &str = "deployments.events";

/// Recovery cache key for an in-progress candle.
pub fn ohlc_recovery_key(source: &str, symbol: &str, timeframe: &str) -> String {
    format!("ohlc:{source}:{symbol}:{timeframe}")
}

/// Cache key for the latest observed trade price.
pub fn latest_price_key(source: &str, symbol: &str) -> String {
    format!("price:{source}:{symbol}")
}
