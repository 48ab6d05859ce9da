//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for XCandle.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::market_data::WindowKey;

#[derive(Parser, Debug, Clone)]
#[command(name = "xcandle")]
#[command(about = "XCandle live candlestick monitor")]
#[command(long_about = "Keeps a bounded window of Binance candles, seeded by history and updated live")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml", global = true)]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error), overrides config
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Instrument to select at startup (overrides config)
    #[arg(long, global = true)]
    pub symbol: Option<String>,

    /// Candle interval to select at startup (overrides config)
    #[arg(long, global = true)]
    pub interval: Option<String>,

    /// Dry-run mode: show the resolved configuration without connecting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch the live candle window (default)
    Watch,

    /// Fetch one history snapshot, print it and exit
    History,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Watch
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Adjust log level based on verbose flag, falling back to the configured level
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }

    /// Check if we're running in dry-run mode
    pub fn is_dry_run_mode(&self) -> bool {
        self.dry_run
    }

    /// Resolve the startup window from CLI overrides and config
    pub fn initial_key(&self, config: &Config) -> Result<WindowKey> {
        let symbol = self.symbol.as_deref().unwrap_or(&config.selection.symbol);
        let interval = self
            .interval
            .as_deref()
            .unwrap_or(&config.selection.interval);
        Ok(WindowKey::parse(symbol, interval)?)
    }
}
