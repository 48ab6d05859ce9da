//! Command Router for interactive command processing

use anyhow::{Result, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::action_channel::ActionChannel;
use crate::market_data::{Instrument, Interval, WindowKey};

/// Interactive commands for the terminal session
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveCommand {
    /// Switch instrument and interval together
    Select { key: WindowKey },
    /// Switch instrument, keeping the current interval
    Symbol { instrument: Instrument },
    /// Switch interval, keeping the current instrument
    Interval { interval: Interval },
    /// Re-fetch history for the active window
    Refresh,
    /// Restart the live stream for the active window
    Reconnect,
    /// Show recent candles of the active window
    Show,
    /// Show session statistics
    Status,
    /// Show command help
    Help,
    /// Quit the application
    Quit,
}

/// Turns user input lines into session events
pub struct CommandRouter {
    events: ActionChannel,
}

impl CommandRouter {
    /// Create a new CommandRouter
    pub fn new(events: ActionChannel) -> Self {
        Self { events }
    }

    /// Parse interactive command from string input
    pub fn parse_interactive_command(input: &str) -> Result<Option<InteractiveCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = input.split_whitespace().collect();

        match parts[0] {
            "/select" | "/s" => {
                if parts.len() != 3 {
                    return Err(anyhow!("Usage: /select <instrument> <interval>"));
                }
                let key = WindowKey::parse(parts[1], parts[2])?;
                Ok(Some(InteractiveCommand::Select { key }))
            }
            "/symbol" => {
                if parts.len() != 2 {
                    return Err(anyhow!("Usage: /symbol <instrument>"));
                }
                Ok(Some(InteractiveCommand::Symbol {
                    instrument: parts[1].parse()?,
                }))
            }
            "/interval" => {
                if parts.len() != 2 {
                    return Err(anyhow!("Usage: /interval <1m|3m|5m>"));
                }
                Ok(Some(InteractiveCommand::Interval {
                    interval: parts[1].parse()?,
                }))
            }
            "/refresh" => Ok(Some(InteractiveCommand::Refresh)),
            "/reconnect" => Ok(Some(InteractiveCommand::Reconnect)),
            "/show" => Ok(Some(InteractiveCommand::Show)),
            "/status" => Ok(Some(InteractiveCommand::Status)),
            "/help" | "?" => Ok(Some(InteractiveCommand::Help)),
            "/quit" | "/exit" | "/q" => Ok(Some(InteractiveCommand::Quit)),
            _ => Err(anyhow!(
                "Unknown command: {}. Type '/help' for available commands.",
                parts[0]
            )),
        }
    }

    /// Help lines for interactive commands
    pub fn help_messages() -> &'static [&'static str] {
        &[
            "XCandle Interactive Commands:",
            "  /select <instrument> <interval> - Switch window (e.g. /select ethusdt 1m)",
            "  /symbol <instrument>            - Switch instrument (ethusdt, bnbusdt, dotusdt)",
            "  /interval <interval>            - Switch interval (1m, 3m, 5m)",
            "  /refresh                        - Reload history for the active window",
            "  /reconnect                      - Restart the live stream",
            "  /show                           - Show recent candles",
            "  /status                         - Show session statistics",
            "  /help                           - Show this help",
            "  /quit                           - Exit the application",
        ]
    }

    /// Parse one input line and forward the result to the session
    pub fn handle_line(&self, line: &str) -> Result<()> {
        match Self::parse_interactive_command(line) {
            Ok(Some(command)) => {
                debug!("Parsed command: {:?}", command);
                self.events.send_command(command)
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("Rejected input '{}': {}", line.trim(), e);
                self.events.send_error(e.to_string())
            }
        }
    }

    /// Read commands from stdin until EOF, then request shutdown
    pub fn spawn_stdin_reader(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if self.handle_line(&line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed, requesting shutdown");
                        let _ = self.events.request_shutdown();
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        let _ = self.events.request_shutdown();
                        break;
                    }
                }
            }
        })
    }
}
