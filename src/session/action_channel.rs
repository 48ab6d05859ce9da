//! Action Channel: the single-consumer session event queue

use anyhow::Result;
use tokio::sync::mpsc;

use crate::market_data::MarketEvent;
use crate::session::command_router::InteractiveCommand;

/// Events drained in arrival order by the session loop
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Shutdown request
    ShutdownRequested,
    /// Error event
    Error { message: String },
    /// Market data event
    MarketEvent(MarketEvent),
    /// User command from interactive input
    UserCommand { command: InteractiveCommand },
}

/// Action channel for event processing
pub struct ActionChannel {
    /// Event sender
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    /// Event receiver
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Clone for ActionChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None, // Receivers cannot be cloned
        }
    }
}

impl ActionChannel {
    /// Create a new ActionChannel
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Send event to channel
    pub fn send_event(&self, event: SessionEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    /// Get next event from channel
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if let Some(event_rx) = &mut self.event_rx {
            event_rx.recv().await
        } else {
            None
        }
    }

    /// Take the next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Send error event
    pub fn send_error(&self, message: String) -> Result<()> {
        self.send_event(SessionEvent::Error { message })
    }

    /// Send shutdown request
    pub fn request_shutdown(&self) -> Result<()> {
        self.send_event(SessionEvent::ShutdownRequested)
    }

    /// Send market event
    pub fn send_market_event(&self, event: MarketEvent) -> Result<()> {
        self.send_event(SessionEvent::MarketEvent(event))
    }

    /// Send user command
    pub fn send_command(&self, command: InteractiveCommand) -> Result<()> {
        self.send_event(SessionEvent::UserCommand { command })
    }

    /// Check if channel is closed
    pub fn is_closed(&self) -> bool {
        self.event_tx.is_closed()
    }
}

impl Default for ActionChannel {
    fn default() -> Self {
        Self::new()
    }
}
