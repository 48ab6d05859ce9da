//! Binance API data types and structures

use serde::Deserialize;

/// Connection status for WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error(String),
}

/// Kline stream event from Binance (`<symbol>@kline_<interval>`)
#[derive(Debug, Clone, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "E")]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: Option<String>,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// Nested bar record carried by a kline event
///
/// Prices arrive as decimal strings. Fields such as volume, close time and the
/// "is closed" flag are present on the wire but not consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
}

impl KlinePayload {
    /// Parse the string prices into `(open, high, low, close)`
    pub fn prices(&self) -> Result<(f64, f64, f64, f64), WebSocketError> {
        let parse = |field: &str, raw: &str| {
            raw.parse::<f64>().map_err(|e| {
                WebSocketError::ParseError(format!("Invalid kline {} '{}': {}", field, raw, e))
            })
        };

        Ok((
            parse("open", &self.open)?,
            parse("high", &self.high)?,
            parse("low", &self.low)?,
            parse("close", &self.close)?,
        ))
    }
}

/// One row of the REST `/api/v3/klines` response, reduced to the consumed fields
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRow {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl KlineRow {
    /// Decode a raw REST row `[openTime, open, high, low, close, ...]`
    pub fn from_values(row: &[serde_json::Value]) -> Result<Self, RestApiError> {
        if row.len() < 5 {
            return Err(RestApiError::ParseError(format!(
                "Kline row has {} fields, expected at least 5",
                row.len()
            )));
        }

        let open_time = row[0].as_i64().ok_or_else(|| {
            RestApiError::ParseError(format!("Invalid kline open time: {}", row[0]))
        })?;

        Ok(Self {
            open_time,
            open: Self::price(&row[1], "open")?,
            high: Self::price(&row[2], "high")?,
            low: Self::price(&row[3], "low")?,
            close: Self::price(&row[4], "close")?,
        })
    }

    fn price(value: &serde_json::Value, field: &str) -> Result<f64, RestApiError> {
        let parsed = match value {
            serde_json::Value::String(raw) => raw.parse::<f64>().ok(),
            serde_json::Value::Number(number) => number.as_f64(),
            _ => None,
        };

        parsed.ok_or_else(|| RestApiError::ParseError(format!("Invalid kline {}: {}", field, value)))
    }
}

/// Message delivered by the WebSocket reader
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// A partial bar update
    Kline(KlineEvent),
    /// Any other JSON frame (subscription acks, unknown events)
    Control(serde_json::Value),
    Ping,
    Pong,
}

/// Error types for WebSocket operations
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("WebSocket connection error: {0}")]
    ConnectionError(String),
    #[error("WebSocket message error: {0}")]
    MessageError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl WebSocketError {
    /// Whether the error means the transport is gone (as opposed to one bad frame)
    pub fn is_transport_failure(&self) -> bool {
        match self {
            WebSocketError::ConnectionError(_) => true,
            WebSocketError::MessageError(_) => true,
            WebSocketError::ParseError(_) => false,
        }
    }
}

/// Error types for REST API operations
#[derive(Debug, thiserror::Error)]
pub enum RestApiError {
    #[error("HTTP status error: {0} - {1}")]
    HttpStatusError(u16, String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kline_event_deserialization() {
        let raw = json!({
            "e": "kline",
            "E": 1_700_000_000_123u64,
            "s": "ETHUSDT",
            "k": {
                "t": 1_700_000_000_000i64,
                "T": 1_700_000_059_999i64,
                "s": "ETHUSDT",
                "i": "1m",
                "o": "2000.10",
                "c": "2001.50",
                "h": "2002.00",
                "l": "1999.90",
                "v": "12.5",
                "x": false
            }
        });

        let event: KlineEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_time, Some(1_700_000_000_123));
        assert_eq!(event.kline.open_time, 1_700_000_000_000);

        let (open, high, low, close) = event.kline.prices().unwrap();
        assert_eq!(open, 2000.10);
        assert_eq!(high, 2002.00);
        assert_eq!(low, 1999.90);
        assert_eq!(close, 2001.50);
    }

    #[test]
    fn test_kline_event_missing_field_rejected() {
        let raw = json!({ "e": "kline", "k": { "t": 1, "o": "1", "h": "2", "l": "0.5" } });
        assert!(serde_json::from_value::<KlineEvent>(raw).is_err());
    }

    #[test]
    fn test_kline_payload_bad_price() {
        let payload = KlinePayload {
            open_time: 1,
            open: "abc".to_string(),
            high: "2".to_string(),
            low: "1".to_string(),
            close: "1.5".to_string(),
        };
        assert!(matches!(
            payload.prices(),
            Err(WebSocketError::ParseError(_))
        ));
    }

    #[test]
    fn test_kline_row_from_rest_values() {
        let row = vec![
            json!(1_700_000_000_000i64),
            json!("10.0"),
            json!("12.0"),
            json!("9.5"),
            json!("11.0"),
            json!("100.0"),
            json!(1_700_000_059_999i64),
        ];

        let parsed = KlineRow::from_values(&row).unwrap();
        assert_eq!(
            parsed,
            KlineRow {
                open_time: 1_700_000_000_000,
                open: 10.0,
                high: 12.0,
                low: 9.5,
                close: 11.0,
            }
        );
    }

    #[test]
    fn test_kline_row_short_row_rejected() {
        let row = vec![json!(1), json!("1.0"), json!("1.0")];
        assert!(matches!(
            KlineRow::from_values(&row),
            Err(RestApiError::ParseError(_))
        ));
    }

    #[test]
    fn test_transport_failure_classification() {
        assert!(WebSocketError::ConnectionError("closed".into()).is_transport_failure());
        assert!(!WebSocketError::ParseError("bad".into()).is_transport_failure());
    }
}
