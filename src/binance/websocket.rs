//! Binance WebSocket client implementation

use futures_util::stream::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, info, warn};

use super::types::{ConnectionStatus, KlineEvent, StreamMessage, WebSocketError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Binance WebSocket client bound to a single raw stream
pub struct BinanceWebSocket {
    url: String,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    connection: Option<WsStream>,
    message_tx: mpsc::Sender<Result<StreamMessage, WebSocketError>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl BinanceWebSocket {
    /// Create a new Binance WebSocket client
    pub fn new(
        url: impl Into<String>,
    ) -> (Self, mpsc::Receiver<Result<StreamMessage, WebSocketError>>) {
        let (message_tx, message_rx) = mpsc::channel(1000);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let ws = Self {
            url: url.into(),
            status_tx,
            status_rx,
            connection: None,
            message_tx,
            shutdown_tx: None,
            reader: None,
        };

        (ws, message_rx)
    }

    /// Build a raw stream URL such as `wss://host:9443/ws/ethusdt@kline_1m`
    pub fn stream_url(base_url: &str, stream_name: &str) -> String {
        format!("{}/ws/{}", base_url.trim_end_matches('/'), stream_name)
    }

    /// Get current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Connect to the stream URL
    pub async fn connect(&mut self) -> Result<(), WebSocketError> {
        self.status_tx.send_replace(ConnectionStatus::Connecting);

        match connect_async(&self.url).await {
            Ok((ws_stream, _)) => {
                self.connection = Some(ws_stream);
                self.status_tx.send_replace(ConnectionStatus::Connected);
                info!("Connected to Binance WebSocket at {}", self.url);
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("Failed to connect to WebSocket: {}", e);
                self.status_tx
                    .send_replace(ConnectionStatus::Error(error_msg.clone()));
                error!("{}", error_msg);
                Err(WebSocketError::ConnectionError(error_msg))
            }
        }
    }

    /// Start forwarding incoming frames to the message channel
    ///
    /// The reader task ends after the first transport failure, after the peer
    /// closes the stream, or when [`shutdown`](Self::shutdown) is called.
    pub fn start_listening(&mut self) -> Result<(), WebSocketError> {
        let mut ws_stream = self.connection.take().ok_or_else(|| {
            WebSocketError::ConnectionError("WebSocket not connected".to_string())
        })?;
        let message_tx = self.message_tx.clone();
        let status_tx = self.status_tx.clone();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                let result = Self::process_message(msg);
                                let closing =
                                    matches!(&result, Err(e) if e.is_transport_failure());

                                if message_tx.send(result).await.is_err() {
                                    debug!("Message receiver dropped, stopping reader");
                                    break;
                                }
                                if closing {
                                    status_tx.send_replace(ConnectionStatus::Disconnected);
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                let error_msg = format!("WebSocket message error: {}", e);
                                error!("{}", error_msg);
                                status_tx.send_replace(ConnectionStatus::Error(error_msg.clone()));
                                let _ = message_tx
                                    .send(Err(WebSocketError::MessageError(error_msg)))
                                    .await;
                                break;
                            }
                            None => {
                                info!("WebSocket connection closed");
                                status_tx.send_replace(ConnectionStatus::Disconnected);
                                let _ = message_tx
                                    .send(Err(WebSocketError::ConnectionError(
                                        "Stream ended".to_string(),
                                    )))
                                    .await;
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        if let Err(e) = ws_stream.close(None).await {
                            warn!("Error closing WebSocket connection: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        self.reader = Some(reader);
        Ok(())
    }

    /// Process incoming WebSocket message
    fn process_message(msg: Message) -> Result<StreamMessage, WebSocketError> {
        match msg {
            Message::Text(text) => {
                debug!("Received WebSocket message: {}", text);

                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    WebSocketError::ParseError(format!("Failed to parse JSON: {}", e))
                })?;

                if value.get("k").is_none() {
                    return Ok(StreamMessage::Control(value));
                }

                let event: KlineEvent = serde_json::from_value(value).map_err(|e| {
                    WebSocketError::ParseError(format!("Failed to parse kline event: {}", e))
                })?;

                Ok(StreamMessage::Kline(event))
            }
            Message::Close(_) => {
                info!("WebSocket close frame received");
                Err(WebSocketError::ConnectionError(
                    "Connection closed".to_string(),
                ))
            }
            Message::Ping(_) => {
                debug!("Received ping");
                Ok(StreamMessage::Ping)
            }
            Message::Pong(_) => {
                debug!("Received pong");
                Ok(StreamMessage::Pong)
            }
            _ => Err(WebSocketError::ParseError(
                "Unsupported message type".to_string(),
            )),
        }
    }

    /// Gracefully stop listening and close the transport
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            if let Err(e) = shutdown_tx.send(()).await {
                debug!("Reader already stopped: {}", e);
            }
        }
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!("WebSocket reader task failed: {}", e);
            }
        }
        self.connection = None;

        self.status_tx.send_replace(ConnectionStatus::Disconnected);
        info!("WebSocket client shutdown for {}", self.url);
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self.status(), ConnectionStatus::Connected)
    }
}
