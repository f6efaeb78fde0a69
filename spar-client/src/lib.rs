pub mod client;
pub mod config;
pub mod context;
pub mod executor;
pub mod fallback;
pub mod forwarding;
pub mod subscription;

pub use client::{default_transport, Client, ClientBuilder};
pub use config::{ClientConfig, DEFAULT_PREFIX};
pub use context::{ContextRef, EventContext, Scope, ScopeEvent, TeardownHook};
pub use executor::{settle, RequestExecutor, TransportCore};
pub use fallback::{HttpFallback, ReqwestFallback};
pub use forwarding::{forwarded_event_name, ForwardingManager};
pub use subscription::{IdFilter, Subscription, SubscriptionManager};

pub use spar_core::{
    Interceptor, InterceptorRegistry, InterceptorSource, Method, Params, Reply, ReplyFuture,
    RequestDescriptor, SparError,
};
pub use spar_transport::{ConnectionState, MemoryTransport, Transport};
