//! Binance API integration module
//!
//! Handles the kline WebSocket stream, the klines REST endpoint, and wire parsing.

pub mod rest;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use rest::BinanceRestClient;
pub use types::*;
pub use websocket::BinanceWebSocket;
