//! WebSocket client for joining a session.
//!
//! The credential and session id travel in the upgrade request; every frame
//! after that is a [`ClientMessage`] or [`ServerMessage`].

use thiserror::Error;

use crate::protocol::ServerMessage;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server, with the close reason if the server gave one
    Disconnected { reason: Option<String> },
    /// A relayed message
    Message(ServerMessage),
    /// Error occurred
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("send failed: {0}")]
    Send(String),
}

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands to the WebSocket thread
    enum WsCommand {
        Send(String),
        Close,
    }

    /// Build the upgrade URL carrying the admission parameters.
    pub fn session_url(server: &str, credential: &str, session_id: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(server).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut()
            .append_pair("sessionId", session_id)
            .append_pair("token", credential);
        Ok(url)
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeClient {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<SyncEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeClient {
        /// Create a new disconnected client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to `server` (e.g. `ws://localhost:3001/ws`) and join `session_id`.
        pub fn connect(
            &mut self,
            server: &str,
            credential: &str,
            session_id: &str,
        ) -> Result<(), ClientError> {
            if self.cmd_tx.is_some() {
                return Err(ClientError::AlreadyConnected);
            }
            let url = session_url(server, credential, session_id)?;

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url.path());

                let (mut socket, response) = match connect(url.as_str()) {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let _ = event_tx.send(SyncEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                        return;
                    }
                };
                log::info!("WebSocket connected, status: {}", response.status());
                let _ = event_tx.send(SyncEvent::Connected);

                if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }

                let mut reason = None;
                'session: loop {
                    // Flush every queued command before blocking on a read
                    loop {
                        match cmd_rx.try_recv() {
                            Ok(WsCommand::Send(msg)) => {
                                if let Err(e) = socket.write(Message::Text(msg)) {
                                    log::error!("WebSocket send error: {}", e);
                                    break 'session;
                                }
                            }
                            Ok(WsCommand::Close) => {
                                let _ = socket.close(None);
                                break 'session;
                            }
                            Err(TryRecvError::Disconnected) => break 'session,
                            Err(TryRecvError::Empty) => break,
                        }
                    }
                    if let Err(e) = socket.flush() {
                        log::error!("WebSocket flush error: {}", e);
                        break;
                    }

                    match socket.read() {
                        Ok(Message::Text(txt)) => match ServerMessage::decode(&txt) {
                            Ok(msg) => {
                                let _ = event_tx.send(SyncEvent::Message(msg));
                            }
                            Err(e) => log::warn!("Failed to parse server message: {}", e),
                        },
                        Ok(Message::Ping(data)) => {
                            let _ = socket.send(Message::Pong(data));
                        }
                        Ok(Message::Close(frame)) => {
                            reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            log::info!("WebSocket closed by server: {:?}", reason);
                            break;
                        }
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(ref e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            log::error!("WebSocket read error: {}", e);
                            break;
                        }
                    }
                }

                let _ = event_tx.send(SyncEvent::Disconnected { reason });
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Send a text frame.
        pub fn send(&self, msg: &str) -> Result<(), ClientError> {
            let tx = self.cmd_tx.as_ref().ok_or(ClientError::NotConnected)?;
            tx.send(WsCommand::Send(msg.to_string()))
                .map_err(|e| ClientError::Send(e.to_string()))
        }

        /// Poll for pending events (non-blocking).
        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected { .. } => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        SyncEvent::Message(_) => {}
                    }
                    self.events.push(event);
                }
            }
            std::mem::take(&mut self.events)
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeClient {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::{NativeClient, session_url};
