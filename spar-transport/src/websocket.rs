use crate::registry::ListenerRegistry;
use crate::transport::{ConnectionState, Listener, ReplyCallback, Transport, TransportError};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spar_core::{Method, Reply};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, trace, warn};

/// JSON text frame exchanged with the socket server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Request {
        seq: u64,
        method: Method,
        url: String,
        #[serde(default)]
        data: Value,
    },
    Reply {
        seq: u64,
        #[serde(default)]
        body: Value,
    },
    Event {
        name: String,
        #[serde(default)]
        message: Value,
    },
}

struct Shared {
    connected: AtomicBool,
    connecting: AtomicBool,
    pending: Mutex<HashMap<u64, ReplyCallback>>,
    listeners: ListenerRegistry,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.connecting.store(state.connecting, Ordering::SeqCst);
        self.connected.store(state.connected, Ordering::SeqCst);
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, ReplyCallback>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.connected.load(Ordering::SeqCst),
            connecting: self.connecting.load(Ordering::SeqCst),
        }
    }

    fn handle_text(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to decode socket frame: {}", e);
                return;
            }
        };

        match frame {
            Frame::Reply { seq, body } => {
                let callback = self.pending().remove(&seq);
                match callback {
                    Some(callback) => callback(Reply::new(body)),
                    None => trace!("Reply for unknown request {}", seq),
                }
            }
            Frame::Event { name, message } => {
                let delivered = self.listeners.emit(&name, &message);
                trace!("Event '{}' delivered to {} listeners", name, delivered);
            }
            Frame::Request { seq, .. } => {
                warn!("Ignoring request frame {} sent by server", seq);
            }
        }
    }
}

/// Transport over a single WebSocket connection.
///
/// The connection is opened in the background; until the handshake finishes
/// the transport reports `connecting` and queues outgoing requests. Once the
/// socket closes the transport reports neither state, and callbacks still
/// waiting for a reply are dropped without being called.
pub struct WebSocketTransport {
    url: String,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl WebSocketTransport {
    /// Start connecting to `url`. Must be called inside a tokio runtime.
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
        });
        let (outgoing, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection(url.clone(), shared.clone(), rx));

        Self {
            url,
            shared,
            next_seq: AtomicU64::new(1),
            outgoing,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }
}

async fn run_connection(url: String, shared: Arc<Shared>, mut outgoing: mpsc::UnboundedReceiver<Frame>) {
    let stream = match tokio_tungstenite::connect_async(&url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            shutdown(&shared, &mut outgoing, &url);
            return;
        }
    };
    shared.set_state(ConnectionState::connected());
    debug!("Socket connected to {}", url);

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    break;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode socket frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    warn!("Failed to send socket frame: {}", e);
                    break;
                }
            }
            message = source.next() => match message {
                Some(Ok(WsMessage::Text(text))) => shared.handle_text(text.as_str()),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket error on {}: {}", url, e);
                    break;
                }
            }
        }
    }

    shutdown(&shared, &mut outgoing, &url);
}

/// Stop accepting requests, then drop every callback still waiting.
///
/// The queue is closed before `pending` is cleared: a `send` racing with
/// shutdown either inserted before the clear, or fails to queue its frame
/// and removes its own entry.
fn shutdown(shared: &Shared, outgoing: &mut mpsc::UnboundedReceiver<Frame>, url: &str) {
    outgoing.close();
    shared.set_state(ConnectionState::disconnected());
    let dropped = {
        let mut pending = shared.pending();
        let dropped = pending.len();
        pending.clear();
        dropped
    };
    debug!("Socket to {} closed, dropped {} pending requests", url, dropped);
}

impl Transport for WebSocketTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        data: Value,
        callback: ReplyCallback,
    ) -> Result<(), TransportError> {
        if !self.shared.state().is_available() {
            return Err(TransportError::ConnectionClosed);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.shared.pending().insert(seq, callback);

        let frame = Frame::Request {
            seq,
            method,
            url: url.to_string(),
            data,
        };
        if self.outgoing.send(frame).is_err() {
            self.shared.pending().remove(&seq);
            return Err(TransportError::ConnectionClosed);
        }
        trace!("Queued {} {} as request {}", method, url, seq);
        Ok(())
    }

    fn on(&self, event: &str, listener: Listener) {
        self.shared.listeners.add(event, listener);
    }

    fn remove_listener(&self, event: &str, listener: &Listener) {
        self.shared.listeners.remove(event, listener);
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("state", &self.shared.state())
            .field("pending", &self.shared.pending().len())
            .finish()
    }
}
