pub mod memory;
pub mod registry;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryTransport, Responder, SentRequest};
pub use registry::{normalize, ListenerRegistry};
pub use transport::{ConnectionState, Listener, ReplyCallback, Transport, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::{Frame, WebSocketTransport};
