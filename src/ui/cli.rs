//! Simple CLI output implementation
//!
//! Prints candle updates and session messages line by line.

use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{RenderEvent, StatusInfo};
use crate::market_data::{Candle, WindowKey};

/// Terminal renderer driven by [`RenderEvent`]s
pub struct CliRenderer {
    enable_colors: bool,
}

impl CliRenderer {
    pub fn new(enable_colors: bool) -> Self {
        if !enable_colors {
            colored::control::set_override(false);
        }
        Self { enable_colors }
    }

    /// Render events until the session shuts down or the channel closes
    pub fn spawn(self, mut render_rx: mpsc::UnboundedReceiver<RenderEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = render_rx.recv().await {
                let done = matches!(event, RenderEvent::Shutdown);
                for line in self.render(&event) {
                    println!("{}", line);
                }
                if done {
                    break;
                }
            }
        })
    }

    /// Lines to print for one event
    pub fn render(&self, event: &RenderEvent) -> Vec<String> {
        match event {
            RenderEvent::SelectionChanged { key } => {
                vec![format!("{} {}", "▶ Watching".bold(), key)]
            }
            RenderEvent::WindowChanged { key, candles } => match candles.last() {
                Some(last) => vec![format!(
                    "{} {} [{} candles]",
                    key.to_string().bold(),
                    self.format_candle(last),
                    candles.len()
                )],
                None => vec![format!("{} (no candles yet)", key.to_string().bold())],
            },
            RenderEvent::RecentCandles { key, candles } => {
                let mut lines = vec![format!("Recent candles for {}:", key)];
                if candles.is_empty() {
                    lines.push("   (window is empty)".to_string());
                }
                lines.extend(candles.iter().map(|c| format!("   {}", self.format_candle(c))));
                lines
            }
            RenderEvent::Status { info } => Self::format_status(info),
            RenderEvent::Notice { message } => vec![format!("ℹ {}", message)],
            RenderEvent::Error { message } => vec![format!("{} {}", "✗".red(), message.red())],
            RenderEvent::Help { lines } => lines.clone(),
            RenderEvent::Shutdown => vec!["Goodbye.".to_string()],
        }
    }

    /// One-line OHLC summary, green for up candles and red for down candles
    pub fn format_candle(&self, candle: &Candle) -> String {
        let time = candle
            .open_time()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| candle.timestamp.to_string());
        let body = format!(
            "O {:.4} H {:.4} L {:.4} C {:.4}",
            candle.open, candle.high, candle.low, candle.close
        );

        let body = if !self.enable_colors {
            body
        } else if candle.is_bullish() {
            body.green().to_string()
        } else {
            body.red().to_string()
        };

        format!("{} {}", time, body)
    }

    fn format_status(info: &StatusInfo) -> Vec<String> {
        let active = info
            .active_key
            .as_ref()
            .map(WindowKey::to_string)
            .unwrap_or_else(|| "none".to_string());
        let counters = &info.metrics.counters;

        let mut lines = vec![
            format!("🔍 XCandle {} status: {}", info.version, info.state),
            format!("   Active window: {} (generation {})", active, info.generation),
            format!("   Connection: {:?}", info.metrics.status),
            format!(
                "   Merges: {} | appends: {} | evictions: {}",
                counters.merges, counters.appends, counters.evictions
            ),
            format!(
                "   Dropped: {} malformed, {} stale | reconnects: {}",
                counters.malformed_dropped, counters.stale_dropped, counters.reconnects
            ),
            format!(
                "   Backfills: {} loaded, {} failed",
                counters.backfills_loaded, counters.backfills_failed
            ),
            format!(
                "   Latency p50/p95/p99: {}/{}/{}ms | {:.1} msg/s",
                info.metrics.latency_p50,
                info.metrics.latency_p95,
                info.metrics.latency_p99,
                info.metrics.messages_per_second
            ),
            format!(
                "   Events processed: {} | commands: {} | errors: {}",
                info.session_stats.events_processed,
                info.session_stats.commands_processed,
                info.session_stats.errors_encountered
            ),
        ];

        for (key, len) in &info.windows {
            lines.push(format!("   • {}: {} candles", key, len));
        }

        lines
    }
}
