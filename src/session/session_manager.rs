//! Session Manager: owns the window store and drains the session queue
//!
//! Every mutation of the candle windows happens here, in the order events
//! were posted. Transports, backfills and reconnect timers only post events;
//! anything stamped with an older generation is dropped.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::binance::types::ConnectionStatus;
use crate::config::Config;
use crate::market_data::{
    BACKFILL_LIMIT, Candle, CandleUpdate, Generation, MarketEvent, MarketFeed, MergeOutcome,
    ReconnectPolicy, StreamHandle, WindowKey, WindowStore,
};
use crate::metrics::StreamMetrics;
use crate::ui::{RenderEvent, StatusInfo};

use super::action_channel::{ActionChannel, SessionEvent};
use super::command_router::{CommandRouter, InteractiveCommand};
use super::selection::ActiveSelection;

const LATENCY_SAMPLES: usize = 1000;

/// Session state tracking
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// Session statistics for monitoring
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub start_time: u64,
    pub commands_processed: u64,
    pub events_processed: u64,
    pub errors_encountered: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            start_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            commands_processed: 0,
            events_processed: 0,
            errors_encountered: 0,
        }
    }
}

/// Selection controller and event loop for one terminal session
pub struct SessionManager<F: MarketFeed> {
    /// Application configuration
    config: Config,
    /// Session state
    state: SessionState,
    /// Session statistics
    stats: SessionStats,
    /// Active key and its generation
    selection: ActiveSelection,
    /// Candle windows, one per key ever selected
    store: WindowStore,
    /// Backfill and stream source
    feed: F,
    /// Subscription for the active key
    stream: Option<StreamHandle>,
    /// Session event queue
    action_channel: ActionChannel,
    /// Renderer sender (Session -> UI)
    render_tx: Option<mpsc::UnboundedSender<RenderEvent>>,
    /// Counters and latency
    metrics: StreamMetrics,
    /// Fixed reconnect delay
    reconnect_policy: ReconnectPolicy,
}

impl<F: MarketFeed> SessionManager<F> {
    /// Create a new SessionManager
    pub fn new(config: Config, feed: F) -> Self {
        info!("Creating new SessionManager");

        Self {
            config,
            state: SessionState::Starting,
            stats: SessionStats::default(),
            selection: ActiveSelection::new(),
            store: WindowStore::new(),
            feed,
            stream: None,
            action_channel: ActionChannel::new(),
            render_tx: None,
            metrics: StreamMetrics::new(LATENCY_SAMPLES),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }

    /// Attach the renderer
    pub fn with_render_sender(mut self, render_tx: mpsc::UnboundedSender<RenderEvent>) -> Self {
        self.render_tx = Some(render_tx);
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Producer handle onto the session queue
    pub fn action_channel(&self) -> ActionChannel {
        self.action_channel.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn selection(&self) -> &ActiveSelection {
        &self.selection
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Candles currently held for `key`
    pub fn window(&self, key: &WindowKey) -> Vec<Candle> {
        self.store.snapshot(key)
    }

    /// Candles of the active key, empty before the first selection
    pub fn active_window(&self) -> Vec<Candle> {
        self.selection
            .key()
            .map(|key| self.store.snapshot(&key))
            .unwrap_or_default()
    }

    /// Select the startup window and mark the session running
    pub fn start(&mut self, key: WindowKey) {
        info!("Starting session with {}", key);
        self.state = SessionState::Running;
        self.select(key);
    }

    /// Make `key` the active window. Returns `false` when it already is.
    pub fn select(&mut self, key: WindowKey) -> bool {
        let Some(generation) = self.selection.switch_to(key) else {
            debug!("{} is already active, ignoring selection", key);
            return false;
        };

        info!("Selected {} (generation {})", key, generation);

        // The old transport must be told to stop before the new one exists
        self.close_stream();
        self.feed.spawn_backfill(key, self.action_channel.clone());
        self.open_stream(key, generation);

        self.forward_to_ui(RenderEvent::SelectionChanged { key });
        self.publish_window(key);
        true
    }

    /// Reload history for the active window
    pub fn refresh(&mut self) -> bool {
        match self.selection.key() {
            Some(key) => {
                info!("Refreshing history for {}", key);
                self.feed.spawn_backfill(key, self.action_channel.clone());
                self.notice(format!("Reloading history for {}", key));
                true
            }
            None => {
                self.report_error("No active window to refresh".to_string());
                false
            }
        }
    }

    /// Restart the live stream for the active window under a new generation
    pub fn restart_stream(&mut self) -> bool {
        let Some(key) = self.selection.key() else {
            self.report_error("No active window to reconnect".to_string());
            return false;
        };

        let generation = self.selection.bump();
        info!("Restarting stream for {} (generation {})", key, generation);

        self.close_stream();
        self.open_stream(key, generation);
        self.notice(format!("Reconnecting {}", key));
        true
    }

    /// Run the main session loop
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting session loop");

        while self.state != SessionState::Terminated {
            match self.action_channel.next_event().await {
                Some(event) => self.handle_event(event)?,
                None => {
                    warn!("Session queue closed");
                    self.shutdown();
                }
            }
        }

        info!("Session loop terminated");
        Ok(())
    }

    /// Handle every event already queued, without waiting for new ones
    pub fn drain_pending(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(event) = self.action_channel.try_next_event() {
            self.handle_event(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle session event
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        self.stats.events_processed += 1;

        match event {
            SessionEvent::ShutdownRequested => self.shutdown(),
            SessionEvent::Error { message } => self.report_error(message),
            SessionEvent::UserCommand { command } => self.handle_command(command),
            SessionEvent::MarketEvent(market_event) => self.handle_market_event(market_event),
        }

        Ok(())
    }

    /// Handle user command
    fn handle_command(&mut self, command: InteractiveCommand) {
        debug!("Handling command: {:?}", command);

        self.stats.commands_processed += 1;

        match command {
            InteractiveCommand::Select { key } => self.handle_select(key),
            InteractiveCommand::Symbol { instrument } => match self.selection.key() {
                Some(active) => self.handle_select(WindowKey::new(instrument, active.interval)),
                None => self.report_error("No active window".to_string()),
            },
            InteractiveCommand::Interval { interval } => match self.selection.key() {
                Some(active) => self.handle_select(WindowKey::new(active.instrument, interval)),
                None => self.report_error("No active window".to_string()),
            },
            InteractiveCommand::Refresh => {
                self.refresh();
            }
            InteractiveCommand::Reconnect => {
                self.restart_stream();
            }
            InteractiveCommand::Show => self.handle_show(),
            InteractiveCommand::Status => self.handle_status(),
            InteractiveCommand::Help => {
                let lines = CommandRouter::help_messages()
                    .iter()
                    .map(|line| (*line).to_string())
                    .collect();
                self.forward_to_ui(RenderEvent::Help { lines });
            }
            InteractiveCommand::Quit => {
                info!("User requested quit");
                self.shutdown();
            }
        }
    }

    fn handle_select(&mut self, key: WindowKey) {
        if !self.select(key) {
            self.notice(format!("Already watching {}", key));
        }
    }

    fn handle_show(&self) {
        match self.selection.key() {
            Some(key) => {
                let candles = self
                    .store
                    .get(&key)
                    .map(|window| window.recent(self.config.ui.recent_candles))
                    .unwrap_or_default();
                self.forward_to_ui(RenderEvent::RecentCandles { key, candles });
            }
            None => self.notice("No active window".to_string()),
        }
    }

    fn handle_status(&self) {
        let mut windows: Vec<(WindowKey, usize)> = self
            .store
            .keys()
            .map(|key| (*key, self.store.get(key).map(|w| w.len()).unwrap_or(0)))
            .collect();
        windows.sort_by_key(|(key, _)| key.to_string());

        let info = StatusInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: format!("{:?}", self.state),
            active_key: self.selection.key(),
            generation: self.selection.generation(),
            windows,
            metrics: self.metrics.snapshot(),
            session_stats: self.stats.clone(),
        };

        self.forward_to_ui(RenderEvent::Status { info });
    }

    /// Handle market event
    fn handle_market_event(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::KlineUpdate {
                key,
                generation,
                update,
            } => self.apply_update(key, generation, update),
            MarketEvent::MalformedMessage {
                key,
                generation,
                error,
            } => {
                if self.selection.matches(key, generation) {
                    debug!("Dropped malformed message for {}: {}", key, error);
                    self.metrics.record_malformed(&key);
                } else {
                    self.drop_stale("malformed message", key, generation);
                }
            }
            MarketEvent::StreamConnected { key, generation } => {
                if self.selection.matches(key, generation) {
                    info!("Stream connected for {} (generation {})", key, generation);
                    self.metrics.set_status(ConnectionStatus::Connected);
                } else {
                    self.drop_stale("connect", key, generation);
                }
            }
            MarketEvent::StreamDisconnected {
                key,
                generation,
                reason,
            } => {
                if self.selection.matches(key, generation) {
                    warn!("Stream for {} lost: {}", key, reason);
                    self.metrics.set_status(ConnectionStatus::Reconnecting);
                    self.reconnect_policy
                        .schedule(key, generation, self.action_channel.clone());
                } else {
                    self.drop_stale("disconnect", key, generation);
                }
            }
            MarketEvent::ReconnectDue { key, generation } => {
                if self.selection.matches(key, generation) {
                    self.metrics.record_reconnect(&key);
                    self.close_stream();
                    self.open_stream(key, generation);
                } else {
                    self.drop_stale("reconnect timer", key, generation);
                }
            }
            MarketEvent::BackfillLoaded { key, candles } => {
                debug!("Replacing {} with {} backfilled candles", key, candles.len());
                self.metrics.record_backfill(&key, true);
                self.store.replace(key, candles, BACKFILL_LIMIT);
                if self.selection.is_active(&key) {
                    self.publish_window(key);
                }
            }
            MarketEvent::BackfillFailed { key, error } => {
                self.metrics.record_backfill(&key, false);
                warn!("History for {} unavailable: {}", key, error);
                if self.selection.is_active(&key) {
                    self.forward_to_ui(RenderEvent::Error {
                        message: format!("Failed to load history for {}: {}", key, error),
                    });
                }
            }
        }
    }

    fn apply_update(&mut self, key: WindowKey, generation: Generation, update: CandleUpdate) {
        if !self.selection.matches(key, generation) {
            self.drop_stale("update", key, generation);
            return;
        }

        let outcome = self.store.merge(key, &update);
        if let MergeOutcome::Evicted { timestamp } = outcome {
            debug!("Evicted candle {} from {}", timestamp, key);
        }
        self.metrics.record_merge(&key, outcome, update.event_time);
        self.publish_window(key);
    }

    fn drop_stale(&mut self, what: &str, key: WindowKey, generation: Generation) {
        debug!(
            "Ignoring stale {} for {} (generation {}, current {})",
            what,
            key,
            generation,
            self.selection.generation()
        );
        self.metrics.record_stale();
    }

    fn open_stream(&mut self, key: WindowKey, generation: Generation) {
        self.metrics.set_status(ConnectionStatus::Connecting);
        self.stream = Some(
            self.feed
                .open_stream(key, generation, self.action_channel.clone()),
        );
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.metrics.set_status(ConnectionStatus::Disconnected);
    }

    /// Send the full window for `key` to the renderer
    fn publish_window(&self, key: WindowKey) {
        self.forward_to_ui(RenderEvent::WindowChanged {
            key,
            candles: self.store.snapshot(&key),
        });
    }

    fn notice(&self, message: String) {
        info!("{}", message);
        self.forward_to_ui(RenderEvent::Notice { message });
    }

    fn report_error(&mut self, message: String) {
        error!("Session error: {}", message);
        self.stats.errors_encountered += 1;
        self.forward_to_ui(RenderEvent::Error { message });
    }

    /// Forward an event to the UI if the channel is available
    fn forward_to_ui(&self, event: RenderEvent) {
        if let Some(render_tx) = &self.render_tx {
            if let Err(e) = render_tx.send(event) {
                error!("Failed to forward event to UI: {}", e);
            }
        }
    }

    /// Shutdown the session
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }

        info!("Shutting down session");
        self.state = SessionState::ShuttingDown;
        self.close_stream();
        self.forward_to_ui(RenderEvent::Shutdown);
        self.state = SessionState::Terminated;
        info!("Session shutdown complete");
    }
}
