//! Candle data structures shared across the app

use chrono::{DateTime, Utc};

use crate::binance::types::{KlineEvent, KlineRow, WebSocketError};

/// One OHLC bar for a fixed time bucket
///
/// `timestamp` is the bucket start in epoch milliseconds. The usual
/// `high >= max(open, close)` / `low <= min(open, close)` relation is expected
/// from the source but not enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Bucket start as a UTC datetime, if the timestamp is representable
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

impl From<KlineRow> for Candle {
    fn from(row: KlineRow) -> Self {
        Self::new(row.open_time, row.open, row.high, row.low, row.close)
    }
}

/// A partial bar update received from the live stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleUpdate {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Exchange event time in epoch milliseconds, when the message carried one
    pub event_time: Option<u64>,
}

impl CandleUpdate {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            event_time: None,
        }
    }

    pub fn to_candle(&self) -> Candle {
        Candle::new(self.timestamp, self.open, self.high, self.low, self.close)
    }
}

impl TryFrom<&KlineEvent> for CandleUpdate {
    type Error = WebSocketError;

    fn try_from(event: &KlineEvent) -> Result<Self, Self::Error> {
        let (open, high, low, close) = event.kline.prices()?;

        Ok(Self {
            timestamp: event.kline.open_time,
            open,
            high,
            low,
            close,
            event_time: event.event_time,
        })
    }
}
