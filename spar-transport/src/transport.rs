use serde_json::Value;
use spar_core::{Method, Reply, SparError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<TransportError> for SparError {
    fn from(err: TransportError) -> Self {
        SparError::Transport(err.to_string())
    }
}

/// Snapshot of the connection, read by the executor before every request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub connecting: bool,
}

impl ConnectionState {
    pub const fn connected() -> Self {
        Self {
            connected: true,
            connecting: false,
        }
    }

    pub const fn connecting() -> Self {
        Self {
            connected: false,
            connecting: true,
        }
    }

    pub const fn disconnected() -> Self {
        Self {
            connected: false,
            connecting: false,
        }
    }

    /// Requests may go over the transport while it is up or coming up
    pub fn is_available(&self) -> bool {
        self.connected || self.connecting
    }
}

/// One-shot callback the transport invokes with the peer's reply
pub type ReplyCallback = Box<dyn FnOnce(Reply) + Send>;

/// A handler registered on a named event.
///
/// Identity is the handler allocation: clones of a listener compare equal,
/// two listeners built from the same closure body do not. Removal matches
/// on that identity.
#[derive(Clone)]
pub struct Listener {
    handler: Arc<dyn Fn(&Value) + Send + Sync>,
}

impl Listener {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn call(&self, message: &Value) {
        (self.handler)(message)
    }

    pub fn same(&self, other: &Listener) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(&other.handler))
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.handler).cast::<()>())
            .finish()
    }
}

/// The duplex connection surface the client needs.
///
/// Requests are fire-and-callback: `send` hands the payload to the peer and
/// the transport later calls `callback` exactly once with the reply, or never
/// if the peer does not answer.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        method: Method,
        url: &str,
        data: Value,
        callback: ReplyCallback,
    ) -> Result<(), TransportError>;

    /// Register `listener` for `event`
    fn on(&self, event: &str, listener: Listener);

    /// Remove one registration of exactly this listener
    fn remove_listener(&self, event: &str, listener: &Listener);

    fn connection_state(&self) -> ConnectionState;

    fn get(&self, url: &str, data: Value, callback: ReplyCallback) -> Result<(), TransportError> {
        self.send(Method::Get, url, data, callback)
    }

    fn post(&self, url: &str, data: Value, callback: ReplyCallback) -> Result<(), TransportError> {
        self.send(Method::Post, url, data, callback)
    }

    fn put(&self, url: &str, data: Value, callback: ReplyCallback) -> Result<(), TransportError> {
        self.send(Method::Put, url, data, callback)
    }

    fn delete(&self, url: &str, data: Value, callback: ReplyCallback) -> Result<(), TransportError> {
        self.send(Method::Delete, url, data, callback)
    }
}
