use chrono::{DateTime, Utc};
use ferrotrade_types::{MarketType, Ohlcv, OrderResponse, SnapshotType, Tick, Timeframe};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

/// Wire shape of `ticks.raw`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickEvent {
    pub broker: SmolStr,
    pub market_type: MarketType,
    pub symbol: SmolStr,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: i64,
}

impl From<&Tick> for TickEvent {
    fn from(t: &Tick) -> Self {
        Self {
            broker: t.source.clone(),
            market_type: t.market_type,
            symbol: t.symbol.clone(),
            price: t.price,
            size: t.size,
            timestamp: t.timestamp,
        }
    }
}

impl From<TickEvent> for Tick {
    fn from(e: TickEvent) -> Self {
        Tick {
            source: e.broker,
            symbol: e.symbol,
            market_type: e.market_type,
            price: e.price,
            size: e.size,
            timestamp: e.timestamp,
        }
    }
}

/// Wire shape of `candles.close`. Unlike the stored [`Ohlcv`], the timestamp
/// travels as ISO-8601 on this channel (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CandleCloseEvent {
    pub broker: SmolStr,
    pub symbol: SmolStr,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<&Ohlcv> for CandleCloseEvent {
    fn from(c: &Ohlcv) -> Self {
        Self {
            broker: c.source.clone(),
            symbol: c.symbol.clone(),
            timeframe: c.timeframe,
            timestamp: DateTime::from_timestamp(c.timestamp, 0).unwrap_or(DateTime::UNIX_EPOCH),
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        }
    }
}

/// `orders.events` payloads. Carries a ULID/UUID `id` for subscriber-side
/// dedup; a single order's events are published in submission order but may
/// be observed out of order, so subscribers rely on idempotent mutation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderPlaced {
        id: Uuid,
        deployment_id: Uuid,
        timestamp: i64,
        order: OrderResponse,
    },
    OrderModified {
        id: Uuid,
        deployment_id: Uuid,
        timestamp: i64,
        order: OrderResponse,
        success: bool,
    },
    OrderCancelled {
        id: Uuid,
        deployment_id: Uuid,
        timestamp: i64,
        order_id: String,
        success: bool,
    },
}

impl OrderEvent {
    pub fn id(&self) -> Uuid {
        match self {
            OrderEvent::OrderPlaced { id, .. }
            | OrderEvent::OrderModified { id, .. }
            | OrderEvent::OrderCancelled { id, .. } => *id,
        }
    }

    pub fn deployment_id(&self) -> Uuid {
        match self {
            OrderEvent::OrderPlaced { deployment_id, .. }
            | OrderEvent::OrderModified { deployment_id, .. }
            | OrderEvent::OrderCancelled { deployment_id, .. } => *deployment_id,
        }
    }
}

/// `snapshots.events` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename = "snapshot_created")]
pub struct SnapshotEvent {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub snapshot_type: SnapshotType,
    pub value: Decimal,
    pub timestamp: i64,
}

/// `deployments.events` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentEvent {
    Stop {
        id: Uuid,
        deployment_id: Uuid,
        timestamp: i64,
    },
    #[serde(rename = "strategy_error")]
    StrategyError {
        id: Uuid,
        deployment_id: Uuid,
        timestamp: i64,
        error_msg: String,
    },
}

impl DeploymentEvent {
    pub fn deployment_id(&self) -> Uuid {
        match self {
            DeploymentEvent::Stop { deployment_id, .. }
            | DeploymentEvent::StrategyError { deployment_id, .. } => *deployment_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_event_roundtrips_through_json() {
        let event = OrderEvent::OrderCancelled {
            id: Uuid::nil(),
            deployment_id: Uuid::nil(),
            timestamp: 1,
            order_id: "abc".into(),
            success: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn deployment_event_tags_strategy_error_correctly() {
        let event = DeploymentEvent::StrategyError {
            id: Uuid::nil(),
            deployment_id: Uuid::nil(),
            timestamp: 1,
            error_msg: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "strategy_error");
    }
}
