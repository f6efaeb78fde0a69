// In-process transport
//
// Used as the default connection when no socket URL is configured, and by
// tests to drive request/reply and event delivery by hand.

use crate::registry::ListenerRegistry;
use crate::transport::{ConnectionState, Listener, ReplyCallback, Transport, TransportError};
use serde_json::Value;
use spar_core::{Method, Reply};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// A request as it was handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub data: Value,
}

/// Answers a request synchronously, or `None` to leave it pending
pub type Responder = Arc<dyn Fn(&SentRequest) -> Option<Reply> + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    connection: ConnectionState,
    responder: Option<Responder>,
    pending: VecDeque<(SentRequest, ReplyCallback)>,
    sent: Vec<SentRequest>,
}

/// Loopback transport with scriptable replies and manual event injection
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    listeners: ListenerRegistry,
}

impl MemoryTransport {
    /// A transport that reports itself connected
    pub fn new() -> Self {
        Self::with_state(ConnectionState::connected())
    }

    /// A transport that reports neither connected nor connecting
    pub fn disconnected() -> Self {
        Self::with_state(ConnectionState::disconnected())
    }

    pub fn with_state(connection: ConnectionState) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                connection,
                ..Default::default()
            }),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Answer every request with `responder`
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&SentRequest) -> Option<Reply> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connection_state(&self, connection: ConnectionState) {
        debug!("Memory transport state -> {:?}", connection);
        self.lock().connection = connection;
    }

    /// Deliver an inbound message to every listener on `event`
    pub fn emit(&self, event: &str, message: Value) -> usize {
        self.listeners.emit(event, &message)
    }

    /// Settle the oldest pending request with `reply`
    pub fn reply_next(&self, reply: Reply) -> Option<SentRequest> {
        let (request, callback) = self.lock().pending.pop_front()?;
        callback(reply);
        Some(request)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Every request sent so far, oldest first
    pub fn sent(&self) -> Vec<SentRequest> {
        self.lock().sent.clone()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.listener_count(event)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        data: Value,
        callback: ReplyCallback,
    ) -> Result<(), TransportError> {
        let request = SentRequest {
            method,
            url: url.to_string(),
            data,
        };

        let responder = {
            let mut state = self.lock();
            if !state.connection.is_available() {
                return Err(TransportError::ConnectionClosed);
            }
            state.sent.push(request.clone());
            state.responder.clone()
        };
        trace!("Memory transport {} {}", request.method, request.url);

        match responder.and_then(|respond| respond(&request)) {
            Some(reply) => callback(reply),
            None => self.lock().pending.push_back((request, callback)),
        }
        Ok(())
    }

    fn on(&self, event: &str, listener: Listener) {
        self.listeners.add(event, listener);
    }

    fn remove_listener(&self, event: &str, listener: &Listener) {
        self.listeners.remove(event, listener);
    }

    fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryTransport")
            .field("connection", &state.connection)
            .field("pending", &state.pending.len())
            .field("sent", &state.sent.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn test_responder_answers_inline() {
        let transport = MemoryTransport::new()
            .with_responder(|request| Some(Reply::new(json!({"echo": request.url, "status": 200}))));
        let (tx, rx) = mpsc::channel();

        transport
            .get("/orders", json!({}), Box::new(move |reply: Reply| tx.send(reply).unwrap()))
            .unwrap();

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.get("echo"), Some(&json!("/orders")));
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_unanswered_requests_stay_pending() {
        let transport = MemoryTransport::new();
        let (tx, rx) = mpsc::channel();

        transport
            .post("/orders", json!({"qty": 1}), Box::new(move |reply: Reply| tx.send(reply).unwrap()))
            .unwrap();
        assert_eq!(transport.pending_count(), 1);
        assert!(rx.try_recv().is_err());

        let request = transport.reply_next(Reply::new(json!({"status": 200}))).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.data, json!({"qty": 1}));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_fails_when_disconnected() {
        let transport = MemoryTransport::disconnected();
        let err = transport
            .delete("/orders/1", json!({}), Box::new(|_: Reply| {}))
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectionClosed);
        assert!(transport.sent().is_empty());
    }
}
