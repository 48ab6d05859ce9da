//! Live kline subscription for a single window key

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CandleUpdate, Generation, MarketEvent, RECONNECT_DELAY_MS, WindowKey};
use crate::binance::BinanceWebSocket;
use crate::binance::types::{KlineEvent, StreamMessage, WebSocketError};
use crate::session::ActionChannel;

/// Handle to a running subscription
///
/// Closing only signals the transport task; messages it already posted stay in
/// the queue and are discarded by the session's generation check.
pub struct StreamHandle {
    key: WindowKey,
    generation: Generation,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(
        key: WindowKey,
        generation: Generation,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            key,
            generation,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// A handle with no transport behind it
    pub fn detached(key: WindowKey, generation: Generation) -> Self {
        Self {
            key,
            generation,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn key(&self) -> WindowKey {
        self.key
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Ask the transport task to stop
    pub fn close(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
            debug!(
                "Closed stream for {} (generation {})",
                self.key, self.generation
            );
        }
        self.task = None;
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown_tx.is_none()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fixed-delay reconnect schedule
///
/// Every attempt waits the same interval; there is no attempt limit.
pub struct ReconnectPolicy {
    backoff: Constant,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Constant::new(delay),
            delay,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_backoff().unwrap_or(self.delay)
    }

    /// Post a `ReconnectDue` event for `key` once the delay has elapsed
    pub fn schedule(
        &mut self,
        key: WindowKey,
        generation: Generation,
        events: ActionChannel,
    ) -> JoinHandle<()> {
        let delay = self.next_delay();
        info!(
            "Reconnecting {} (generation {}) in {}ms",
            key,
            generation,
            delay.as_millis()
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = events.send_market_event(MarketEvent::ReconnectDue { key, generation }) {
                debug!("Session gone before reconnect of {} fired: {}", key, e);
            }
        })
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(RECONNECT_DELAY_MS))
    }
}

/// Kline stream subscription stamped with the generation it was opened under
pub struct StreamClient {
    key: WindowKey,
    generation: Generation,
    ws_base_url: String,
    events: ActionChannel,
}

impl StreamClient {
    pub fn new(
        key: WindowKey,
        generation: Generation,
        ws_base_url: impl Into<String>,
        events: ActionChannel,
    ) -> Self {
        Self {
            key,
            generation,
            ws_base_url: ws_base_url.into(),
            events,
        }
    }

    pub fn url(&self) -> String {
        BinanceWebSocket::stream_url(&self.ws_base_url, &self.key.stream_name())
    }

    /// Start the subscription in the background
    pub fn spawn(self) -> StreamHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let key = self.key;
        let generation = self.generation;
        let task = tokio::spawn(self.run(shutdown_rx));

        StreamHandle::new(key, generation, shutdown_tx, task)
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Opening stream for {} (generation {}) at {}",
            self.key,
            self.generation,
            self.url()
        );

        match self.stream_until_closed(&mut shutdown_rx).await {
            Ok(()) => {
                info!(
                    "Stream for {} (generation {}) closed by session",
                    self.key, self.generation
                );
            }
            Err(e) => {
                warn!(
                    "Stream for {} (generation {}) dropped: {}",
                    self.key, self.generation, e
                );
                self.post(MarketEvent::StreamDisconnected {
                    key: self.key,
                    generation: self.generation,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Pump messages until the session closes us (`Ok`) or the transport fails (`Err`)
    async fn stream_until_closed(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), WebSocketError> {
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let (mut ws, mut message_rx) = BinanceWebSocket::new(self.url());

        tokio::select! {
            result = ws.connect() => result?,
            _ = shutdown_rx.changed() => return Ok(()),
        }
        ws.start_listening()?;

        self.post(MarketEvent::StreamConnected {
            key: self.key,
            generation: self.generation,
        });

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                message = message_rx.recv() => match message {
                    Some(Ok(StreamMessage::Kline(event))) => self.handle_kline(&event),
                    Some(Ok(StreamMessage::Control(value))) => {
                        debug!("Ignoring control frame on {}: {}", self.key, value);
                    }
                    Some(Ok(StreamMessage::Ping | StreamMessage::Pong)) => {}
                    Some(Err(e)) if e.is_transport_failure() => break Err(e),
                    Some(Err(e)) => {
                        debug!("Dropping malformed message on {}: {}", self.key, e);
                        self.post(MarketEvent::MalformedMessage {
                            key: self.key,
                            generation: self.generation,
                            error: e.to_string(),
                        });
                    }
                    None => {
                        break Err(WebSocketError::ConnectionError(
                            "Message channel closed".to_string(),
                        ));
                    }
                },
            }
        };

        // Unblocks a reader parked on a full channel so shutdown can join it
        drop(message_rx);
        ws.shutdown().await;
        result
    }

    fn handle_kline(&self, event: &KlineEvent) {
        let market_event = match CandleUpdate::try_from(event) {
            Ok(update) => MarketEvent::KlineUpdate {
                key: self.key,
                generation: self.generation,
                update,
            },
            Err(e) => MarketEvent::MalformedMessage {
                key: self.key,
                generation: self.generation,
                error: e.to_string(),
            },
        };

        self.post(market_event);
    }

    fn post(&self, event: MarketEvent) {
        if let Err(e) = self.events.send_market_event(event) {
            debug!("Session queue closed for {}: {}", self.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Instrument, Interval};
    use crate::session::SessionEvent;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

    fn key() -> WindowKey {
        WindowKey::new(Instrument::DotUsdt, Interval::FiveMinutes)
    }

    fn kline_frame(open_time: i64, open: &str, close: &str) -> String {
        format!(
            r#"{{"e":"kline","E":1,"s":"DOTUSDT","k":{{"t":{},"o":"{}","h":"9","l":"0.1","c":"{}","x":false}}}}"#,
            open_time, open, close
        )
    }

    /// Accept one connection, send `frames`, then close it or keep it open
    async fn serve_frames(frames: Vec<String>, close_after: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame)).await.unwrap();
            }
            if close_after {
                let _ = ws.close(None).await;
            }
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{}", addr)
    }

    async fn next_market_event(channel: &mut ActionChannel) -> MarketEvent {
        let event = tokio::time::timeout(Duration::from_secs(5), channel.next_event())
            .await
            .expect("stream posted no event");
        match event {
            Some(SessionEvent::MarketEvent(event)) => event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_posts_updates_until_peer_closes() {
        let url = serve_frames(
            vec![
                kline_frame(60_000, "1.0", "1.5"),
                kline_frame(60_000, "abc", "1.5"),
                r#"{"result":null,"id":1}"#.to_string(),
            ],
            true,
        )
        .await;
        let mut channel = ActionChannel::new();
        let _handle = StreamClient::new(key(), 4, url, channel.clone()).spawn();

        assert!(matches!(
            next_market_event(&mut channel).await,
            MarketEvent::StreamConnected { generation: 4, .. }
        ));
        match next_market_event(&mut channel).await {
            MarketEvent::KlineUpdate {
                key: got,
                generation,
                update,
            } => {
                assert_eq!(got, key());
                assert_eq!(generation, 4);
                assert_eq!(update.timestamp, 60_000);
                assert_eq!(update.close, 1.5);
                assert_eq!(update.event_time, Some(1));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            next_market_event(&mut channel).await,
            MarketEvent::MalformedMessage { generation: 4, .. }
        ));
        // The control frame is skipped; the close frame ends the stream
        assert!(matches!(
            next_market_event(&mut channel).await,
            MarketEvent::StreamDisconnected { generation: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_posts_disconnect() {
        let mut channel = ActionChannel::new();
        let _handle = StreamClient::new(key(), 1, "ws://127.0.0.1:1", channel.clone()).spawn();

        match next_market_event(&mut channel).await {
            MarketEvent::StreamDisconnected {
                key: got,
                generation,
                reason,
            } => {
                assert_eq!(got, key());
                assert_eq!(generation, 1);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_before_connect_posts_nothing() {
        let url = serve_frames(vec![kline_frame(60_000, "1", "1")], false).await;
        let mut channel = ActionChannel::new();

        let mut handle = StreamClient::new(key(), 2, url, channel.clone()).spawn();
        handle.close();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(channel.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_close_while_streaming_posts_no_disconnect() {
        let url = serve_frames(vec![kline_frame(60_000, "1", "1")], false).await;
        let mut channel = ActionChannel::new();
        let mut handle = StreamClient::new(key(), 3, url, channel.clone()).spawn();

        assert!(matches!(
            next_market_event(&mut channel).await,
            MarketEvent::StreamConnected { .. }
        ));
        assert!(matches!(
            next_market_event(&mut channel).await,
            MarketEvent::KlineUpdate { .. }
        ));

        handle.close();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(channel.try_next_event().is_none());
    }

    #[test]
    fn test_reconnect_delay_is_constant() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..5 {
            assert_eq!(policy.next_delay(), Duration::from_millis(RECONNECT_DELAY_MS));
        }
    }

    #[test]
    fn test_stream_url_for_key() {
        let client = StreamClient::new(key(), 1, "wss://stream.binance.com:9443", ActionChannel::new());
        assert_eq!(
            client.url(),
            "wss://stream.binance.com:9443/ws/dotusdt@kline_5m"
        );
    }

    #[test]
    fn test_detached_handle_close() {
        let mut handle = StreamHandle::detached(key(), 7);
        assert!(handle.is_closed());
        handle.close();
        assert_eq!(handle.generation(), 7);
        assert_eq!(handle.key(), key());
    }

    #[tokio::test]
    async fn test_scheduled_reconnect_posts_event() {
        let mut channel = ActionChannel::new();
        let mut policy = ReconnectPolicy::fixed(Duration::from_millis(10));

        policy.schedule(key(), 3, channel.clone()).await.unwrap();

        match channel.next_event().await {
            Some(crate::session::SessionEvent::MarketEvent(MarketEvent::ReconnectDue {
                key: fired,
                generation,
            })) => {
                assert_eq!(fired, key());
                assert_eq!(generation, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
