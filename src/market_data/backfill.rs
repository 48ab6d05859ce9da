//! One-shot historical candle loading

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BACKFILL_LIMIT, Candle, MarketEvent, WindowKey};
use crate::binance::BinanceRestClient;
use crate::binance::types::RestApiError;
use crate::session::ActionChannel;

/// Fetches the most recent bars for a window key
#[derive(Clone)]
pub struct BackfillFetcher {
    rest_client: Arc<BinanceRestClient>,
    limit: usize,
}

impl BackfillFetcher {
    pub fn new(rest_client: BinanceRestClient) -> Self {
        Self {
            rest_client: Arc::new(rest_client),
            limit: BACKFILL_LIMIT,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch up to `limit` candles for `key`, oldest first
    pub async fn fetch_history(
        &self,
        key: WindowKey,
        limit: usize,
    ) -> Result<Vec<Candle>, RestApiError> {
        let rows = self
            .rest_client
            .get_klines(key.instrument.rest_symbol(), key.interval.as_str(), limit)
            .await?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }

    /// Run a fetch in the background and post the outcome to the session queue
    pub fn spawn(&self, key: WindowKey, events: ActionChannel) -> JoinHandle<()> {
        let fetcher = self.clone();

        tokio::spawn(async move {
            info!("Starting backfill for {}", key);

            let event = match fetcher.fetch_history(key, fetcher.limit).await {
                Ok(candles) => {
                    info!("Backfill for {} returned {} candles", key, candles.len());
                    MarketEvent::BackfillLoaded { key, candles }
                }
                Err(e) => {
                    warn!("Backfill for {} failed: {}", key, e);
                    MarketEvent::BackfillFailed {
                        key,
                        error: e.to_string(),
                    }
                }
            };

            if let Err(e) = events.send_market_event(event) {
                debug!("Session gone before backfill for {} completed: {}", key, e);
            }
        })
    }
}
