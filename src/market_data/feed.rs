//! Seam between the session and the exchange transports

use std::time::Duration;

use super::{BackfillFetcher, Generation, StreamClient, StreamHandle, WindowKey};
use crate::binance::BinanceRestClient;
use crate::config::Config;
use crate::session::ActionChannel;

/// Source of backfills and live subscriptions
///
/// Both operations return immediately; results arrive later as
/// [`MarketEvent`](super::MarketEvent)s on `events`.
pub trait MarketFeed: Send + 'static {
    /// Start a one-shot history load for `key`
    fn spawn_backfill(&self, key: WindowKey, events: ActionChannel);

    /// Open a live subscription for `key` stamped with `generation`
    fn open_stream(
        &self,
        key: WindowKey,
        generation: Generation,
        events: ActionChannel,
    ) -> StreamHandle;
}

/// Production feed backed by Binance REST and WebSocket endpoints
pub struct BinanceFeed {
    fetcher: BackfillFetcher,
    ws_url: String,
}

impl BinanceFeed {
    pub fn new(rest_url: impl Into<String>, ws_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fetcher: BackfillFetcher::new(BinanceRestClient::with_timeout(rest_url.into(), timeout)),
            ws_url: ws_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.binance.rest_url.clone(),
            config.binance.ws_url.clone(),
            Duration::from_secs(config.binance.timeout_seconds),
        )
    }

    pub fn fetcher(&self) -> &BackfillFetcher {
        &self.fetcher
    }
}

impl MarketFeed for BinanceFeed {
    fn spawn_backfill(&self, key: WindowKey, events: ActionChannel) {
        self.fetcher.spawn(key, events);
    }

    fn open_stream(
        &self,
        key: WindowKey,
        generation: Generation,
        events: ActionChannel,
    ) -> StreamHandle {
        StreamClient::new(key, generation, self.ws_url.clone(), events).spawn()
    }
}
