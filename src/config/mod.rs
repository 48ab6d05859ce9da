//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::market_data::{Instrument, Interval, WindowKey};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Window selected at startup
    pub selection: SelectionConfig,

    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Binance-specific configuration
    pub binance: BinanceConfig,

    /// Terminal output configuration
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Instrument stream code (ethusdt, bnbusdt, dotusdt)
    pub symbol: String,

    /// Candle interval (1m, 3m, 5m)
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BinanceConfig {
    /// WebSocket base URL
    pub ws_url: String,

    /// REST API base URL
    pub rest_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    /// Enable colors in terminal output
    pub enable_colors: bool,

    /// Number of candles listed by /show
    pub recent_candles: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the log file
    pub file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            log_level: "info".to_string(),
            log: LogConfig::default(),
            binance: BinanceConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            symbol: "ethusdt".to_string(),
            interval: "1m".to_string(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.com:9443".to_string(),
            rest_url: "https://api.binance.com".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enable_colors: true,
            recent_candles: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/xcandle.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // XCANDLE_SYMBOL - initial instrument
        if let Ok(symbol) = env::var("XCANDLE_SYMBOL") {
            self.selection.symbol = symbol;
        }

        // XCANDLE_INTERVAL - initial interval
        if let Ok(interval) = env::var("XCANDLE_INTERVAL") {
            self.selection.interval = interval;
        }

        // XCANDLE_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("XCANDLE_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // XCANDLE_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("XCANDLE_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // XCANDLE_BINANCE_WS_URL - WebSocket URL
        if let Ok(ws_url) = env::var("XCANDLE_BINANCE_WS_URL") {
            self.binance.ws_url = ws_url;
        }

        // XCANDLE_BINANCE_REST_URL - REST API URL
        if let Ok(rest_url) = env::var("XCANDLE_BINANCE_REST_URL") {
            self.binance.rest_url = rest_url;
        }

        // XCANDLE_BINANCE_TIMEOUT_SECONDS - timeout
        if let Ok(timeout) = env::var("XCANDLE_BINANCE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.binance.timeout_seconds = value;
            }
        }

        // XCANDLE_UI_ENABLE_COLORS - enable colors
        if let Ok(enable_colors) = env::var("XCANDLE_UI_ENABLE_COLORS") {
            self.ui.enable_colors = enable_colors.parse().unwrap_or(self.ui.enable_colors);
        }

        // XCANDLE_UI_RECENT_CANDLES - candles listed by /show
        if let Ok(count) = env::var("XCANDLE_UI_RECENT_CANDLES") {
            if let Ok(value) = count.parse::<usize>() {
                self.ui.recent_candles = value;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    ///
    /// Runs before logging is installed, so problems are returned as warnings
    /// for the caller to report. A missing file is not a problem.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Vec<String>) {
        let path = path.as_ref();
        let mut warnings = Vec::new();

        if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => return (config, warnings),
                Err(e) => warnings.push(format!("Failed to load config: {:#}, using defaults", e)),
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        if let Err(e) = config.validate() {
            warnings.push(format!("Ignoring invalid environment overrides: {:#}", e));
            config = Self::default();
        }
        (config, warnings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.initial_key()?;

        if self.binance.timeout_seconds == 0 {
            anyhow::bail!("Timeout must be greater than 0");
        }

        if self.binance.ws_url.trim().is_empty() || self.binance.rest_url.trim().is_empty() {
            anyhow::bail!("Binance endpoints must not be empty");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        if self.ui.recent_candles == 0 {
            anyhow::bail!("ui.recent_candles must be greater than 0");
        }

        Ok(())
    }

    /// Window key described by the `selection` section
    pub fn initial_key(&self) -> Result<WindowKey> {
        let instrument: Instrument = self
            .selection
            .symbol
            .parse()
            .context("Invalid selection.symbol")?;
        let interval: Interval = self
            .selection
            .interval
            .parse()
            .context("Invalid selection.interval")?;
        Ok(WindowKey::new(instrument, interval))
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!(
            "{}",
            toml::to_string_pretty(self).context("Failed to serialize configuration")?
        );
        Ok(())
    }

    /// Display configuration management help
    pub fn display_help() -> Result<()> {
        println!("Configuration management commands:");
        println!("  xcandle config show   - Show current configuration");
        println!("  xcandle config reset  - Write default configuration to the config file");
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command<P: AsRef<Path>>(
        action: &Option<crate::cli::ConfigAction>,
        path: P,
    ) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) => {
                // Load warnings were already reported at startup
                let (config, _) = Config::load_or_default(&path);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(&path)?;
                println!("Configuration reset: {}", path.as_ref().display());
                default_config.display()?;
            }
            None => {
                Config::display_help()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.initial_key().unwrap(),
            WindowKey::new(Instrument::EthUsdt, Interval::OneMinute)
        );
    }

    #[test]
    fn test_invalid_selection_rejected() {
        let mut config = Config::default();
        config.selection.interval = "1h".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selection.symbol = "btcusdt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.selection.symbol, deserialized.selection.symbol);
        assert_eq!(config.binance.rest_url, deserialized.binance.rest_url);
    }

    #[test]
    fn test_ui_section_defaults_when_partial() {
        let content = r#"
            log_level = "debug"

            [selection]
            symbol = "dotusdt"
            interval = "5m"

            [log]
            file_path = "logs/test.log"

            [binance]
            ws_url = "wss://example.test"
            rest_url = "https://example.test"
            timeout_seconds = 3

            [ui]
            enable_colors = false
        "#;
        let config: Config = toml::from_str(content).unwrap();
        assert!(!config.ui.enable_colors);
        assert_eq!(config.ui.recent_candles, 10);
        assert_eq!(
            config.initial_key().unwrap(),
            WindowKey::new(Instrument::DotUsdt, Interval::FiveMinutes)
        );
    }

    #[test]
    fn test_malformed_file_falls_back_with_warning() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[selection\nsymbol = ").unwrap();

        let (config, warnings) = Config::load_or_default(temp_file.path());

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Failed to load config"));
        assert!(warnings[0].contains("Failed to parse config file"));
        assert_eq!(config.binance.rest_url, BinanceConfig::default().rest_url);
    }

    #[test]
    fn test_invalid_file_values_reported() {
        let mut config = Config::default();
        config.selection.interval = "1h".to_string();
        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();

        let (loaded, warnings) = Config::load_or_default(temp_file.path());

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("selection.interval"));
        assert_eq!(loaded.selection.interval, "1m");
    }

    #[test]
    fn test_missing_file_uses_defaults_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_or_default(dir.path().join("absent.toml"));

        assert!(warnings.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.selection.symbol = "bnbusdt".to_string();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.selection.symbol, "bnbusdt");
    }
}
