//! Market data processing and management module
//!
//! Candle windows keyed by (instrument, interval), the backfill fetcher, and
//! the live stream client. Producers never touch the windows directly: they
//! post [`MarketEvent`]s to the session queue, and the session applies them.

pub mod backfill;
pub mod candle;
pub mod feed;
pub mod stream_client;
pub mod window;

use std::fmt;
use std::str::FromStr;

pub use backfill::BackfillFetcher;
pub use candle::{Candle, CandleUpdate};
pub use feed::{BinanceFeed, MarketFeed};
pub use stream_client::{ReconnectPolicy, StreamClient, StreamHandle};
pub use window::{CandleWindow, MergeOutcome, WindowStore};

/// Maximum number of candles kept per window
pub const WINDOW_CAPACITY: usize = 100;

/// Number of bars requested by a backfill
pub const BACKFILL_LIMIT: usize = 100;

/// Fixed delay before re-opening a dropped stream
pub const RECONNECT_DELAY_MS: u64 = 1000;

/// Selection epoch; bumped on every selection change
pub type Generation = u64;

/// Errors raised while parsing selection identifiers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("Unknown instrument: {0} (expected one of: ethusdt, bnbusdt, dotusdt)")]
    UnknownInstrument(String),
    #[error("Unknown interval: {0} (expected one of: 1m, 3m, 5m)")]
    UnknownInterval(String),
}

/// Supported trading pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    EthUsdt,
    BnbUsdt,
    DotUsdt,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::EthUsdt, Instrument::BnbUsdt, Instrument::DotUsdt];

    /// Lower-case stream code, e.g. `ethusdt`
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::EthUsdt => "ethusdt",
            Instrument::BnbUsdt => "bnbusdt",
            Instrument::DotUsdt => "dotusdt",
        }
    }

    /// Upper-case REST symbol, e.g. `ETHUSDT`
    pub fn rest_symbol(&self) -> &'static str {
        match self {
            Instrument::EthUsdt => "ETHUSDT",
            Instrument::BnbUsdt => "BNBUSDT",
            Instrument::DotUsdt => "DOTUSDT",
        }
    }
}

impl FromStr for Instrument {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept BTC-USDT style input as well
        let normalized = s.trim().replace(['-', '/'], "").to_ascii_lowercase();
        Instrument::ALL
            .into_iter()
            .find(|instrument| instrument.as_str() == normalized)
            .ok_or_else(|| SelectionError::UnknownInstrument(s.to_string()))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported candle granularities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
}

impl Interval {
    pub const ALL: [Interval; 3] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
    ];

    /// Binance interval code, e.g. `1m`
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::OneMinute => 60_000,
            Interval::ThreeMinutes => 180_000,
            Interval::FiveMinutes => 300_000,
        }
    }
}

impl FromStr for Interval {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == normalized)
            .ok_or_else(|| SelectionError::UnknownInterval(s.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one candle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub instrument: Instrument,
    pub interval: Interval,
}

impl WindowKey {
    pub fn new(instrument: Instrument, interval: Interval) -> Self {
        Self {
            instrument,
            interval,
        }
    }

    /// Parse a key from user-facing identifiers
    pub fn parse(instrument: &str, interval: &str) -> Result<Self, SelectionError> {
        Ok(Self::new(instrument.parse()?, interval.parse()?))
    }

    /// Raw stream name, e.g. `ethusdt@kline_1m`
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.instrument.as_str(), self.interval.as_str())
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.instrument, self.interval)
    }
}

/// Events posted by the stream client, the backfill fetcher and reconnect timers
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Parsed partial bar from the stream opened under `generation`
    KlineUpdate {
        key: WindowKey,
        generation: Generation,
        update: CandleUpdate,
    },
    /// Stream frame that could not be decoded
    MalformedMessage {
        key: WindowKey,
        generation: Generation,
        error: String,
    },
    StreamConnected {
        key: WindowKey,
        generation: Generation,
    },
    /// Transport failed or closed without being asked to
    StreamDisconnected {
        key: WindowKey,
        generation: Generation,
        reason: String,
    },
    /// Reconnect delay elapsed
    ReconnectDue {
        key: WindowKey,
        generation: Generation,
    },
    BackfillLoaded {
        key: WindowKey,
        candles: Vec<Candle>,
    },
    BackfillFailed {
        key: WindowKey,
        error: String,
    },
}

impl MarketEvent {
    pub fn key(&self) -> WindowKey {
        match self {
            MarketEvent::KlineUpdate { key, .. }
            | MarketEvent::MalformedMessage { key, .. }
            | MarketEvent::StreamConnected { key, .. }
            | MarketEvent::StreamDisconnected { key, .. }
            | MarketEvent::ReconnectDue { key, .. }
            | MarketEvent::BackfillLoaded { key, .. }
            | MarketEvent::BackfillFailed { key, .. } => *key,
        }
    }
}
