//! User Interface module
//!
//! The session publishes [`RenderEvent`]s; a renderer owns all display logic.
//! Only a plain terminal renderer is provided.

/// Simple CLI output functions
pub mod cli;

use colored::Colorize;

use crate::config::Config;
use crate::market_data::{Candle, Generation, WindowKey};
use crate::metrics::MetricsSnapshot;
use crate::session::SessionStats;

/// Notifications from the session to the renderer
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// The active window changed to `key`
    SelectionChanged { key: WindowKey },
    /// The active window was merged into or replaced; `candles` is its full content
    WindowChanged { key: WindowKey, candles: Vec<Candle> },
    /// Tail of the active window, requested with /show
    RecentCandles { key: WindowKey, candles: Vec<Candle> },
    /// Session status, requested with /status
    Status { info: StatusInfo },
    /// Informational message
    Notice { message: String },
    /// Error message
    Error { message: String },
    /// Help lines
    Help { lines: Vec<String> },
    /// The session is shutting down
    Shutdown,
}

/// Status information for the session
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub version: String,
    pub state: String,
    pub active_key: Option<WindowKey>,
    pub generation: Generation,
    pub windows: Vec<(WindowKey, usize)>,
    pub metrics: MetricsSnapshot,
    pub session_stats: SessionStats,
}

/// Print the startup banner
pub fn display_welcome_page(config: &Config, key: &WindowKey) {
    println!();
    println!("{}", "XCandle - live candlestick monitor".bold());
    println!("  Window:   {}", key);
    println!("  Stream:   {}", config.binance.ws_url);
    println!("  History:  {}", config.binance.rest_url);
    println!("  Log file: {}", config.log.file_path);
    println!("  Type /help for commands.");
    println!();
}
