//! Binance REST API client implementation

use std::time::Duration;

use tracing::{debug, info};

use super::types::{KlineRow, RestApiError};

/// Binance REST API client
pub struct BinanceRestClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl BinanceRestClient {
    pub fn new(base_url: String) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Get the most recent klines for a symbol and interval, oldest first
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<KlineRow>, RestApiError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        debug!("Fetching klines from: {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RestApiError::NetworkError(format!("Failed to send HTTP request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RestApiError::HttpStatusError(status.as_u16(), body));
        }

        let raw_rows: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| RestApiError::ParseError(format!("Failed to parse klines: {}", e)))?;

        let rows = raw_rows
            .iter()
            .map(|row| KlineRow::from_values(row))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Successfully fetched {} klines for {} {}",
            rows.len(),
            symbol,
            interval
        );

        Ok(rows)
    }
}
