// Spar Client
// Drop-in replacement for an HTTP client that speaks over one socket:
// - get/post/put/delete through the interceptor chain, or the HTTP fallback
//   while the socket is down
// - `on` subscriptions with explicit unsubscribe handles
// - `forward` rebroadcasts onto an event context, cleaned up on teardown

use crate::config::ClientConfig;
use crate::context::{ContextRef, Scope};
use crate::executor::RequestExecutor;
use crate::fallback::{HttpFallback, ReqwestFallback};
use crate::forwarding::ForwardingManager;
use crate::subscription::{IdFilter, Subscription, SubscriptionManager};
use anyhow::Result;
use serde_json::Value;
use spar_core::{
    Immediate, Interceptor, InterceptorPipeline, InterceptorRegistry, InterceptorSource, Params,
    ReplyFuture, RequestDescriptor, UpdateCycle,
};
use spar_transport::{ConnectionState, MemoryTransport, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Connection used when the builder is given no transport: a socket to
/// `socket_url` if one is configured, otherwise a transport that is never
/// connected, so every request goes over HTTP.
#[cfg(feature = "websocket")]
pub fn default_transport(config: &ClientConfig) -> Arc<dyn Transport> {
    match &config.socket_url {
        Some(url) => Arc::new(spar_transport::WebSocketTransport::connect(url.clone())),
        None => Arc::new(MemoryTransport::disconnected()),
    }
}

#[cfg(not(feature = "websocket"))]
pub fn default_transport(_config: &ClientConfig) -> Arc<dyn Transport> {
    Arc::new(MemoryTransport::disconnected())
}

/// Main client struct
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    executor: RequestExecutor,
    subscriptions: SubscriptionManager,
    forwarding: ForwardingManager,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client from configuration alone, using default collaborators
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Drop-in for an HTTP GET; `params` become the request data.
    ///
    /// Must be called inside a tokio runtime.
    pub fn get(&self, url: &str, params: Option<Params>) -> ReplyFuture {
        self.executor.execute(RequestDescriptor::get(url, params))
    }

    /// Drop-in for an HTTP POST with an explicit JSON body.
    ///
    /// Must be called inside a tokio runtime.
    pub fn post(&self, url: &str, data: Value, params: Option<Params>) -> ReplyFuture {
        self.executor.execute(RequestDescriptor::post(url, data, params))
    }

    /// Drop-in for an HTTP PUT with an explicit JSON body.
    ///
    /// Must be called inside a tokio runtime.
    pub fn put(&self, url: &str, data: Value, params: Option<Params>) -> ReplyFuture {
        self.executor.execute(RequestDescriptor::put(url, data, params))
    }

    /// Drop-in for an HTTP DELETE; `params` become the request data.
    ///
    /// Must be called inside a tokio runtime.
    pub fn delete(&self, url: &str, params: Option<Params>) -> ReplyFuture {
        self.executor.execute(RequestDescriptor::delete(url, params))
    }

    /// Listen for every message on `channel`
    pub fn on<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.subscriptions.subscribe(channel, IdFilter::any(), callback)
    }

    /// Listen for messages on `channel` whose `id` equals `id`
    pub fn on_id<F>(&self, channel: &str, id: impl Into<Value>, callback: F) -> Subscription
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.subscriptions.subscribe(channel, IdFilter::id(id), callback)
    }

    /// Rebroadcast every message on `channel` as `<prefix><channel>`
    pub fn forward(&self, channel: &str, context: Option<ContextRef>) {
        self.forwarding.forward(channel, IdFilter::any(), context)
    }

    /// Rebroadcast messages on `channel` with a matching `id` as
    /// `<prefix><channel>:<id>`
    pub fn forward_id(&self, channel: &str, id: impl Into<Value>, context: Option<ContextRef>) {
        self.forwarding.forward(channel, IdFilter::id(id), context)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn default_context(&self) -> &ContextRef {
        self.forwarding.default_context()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Client`] from configuration and collaborators.
///
/// Anything left unset falls back to a default: the transport from
/// [`default_transport`], a fresh root [`Scope`], a [`ReqwestFallback`]
/// built from the config, and the [`Immediate`] update cycle.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    default_context: Option<ContextRef>,
    fallback: Option<Arc<dyn HttpFallback>>,
    update_cycle: Option<Arc<dyn UpdateCycle>>,
    registry: InterceptorRegistry,
    interceptors: Vec<InterceptorSource>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn default_context(mut self, context: ContextRef) -> Self {
        self.default_context = Some(context);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn HttpFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn update_cycle(mut self, cycle: Arc<dyn UpdateCycle>) -> Self {
        self.update_cycle = Some(cycle);
        self
    }

    /// Registry that named interceptors are resolved against
    pub fn registry(mut self, registry: InterceptorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn register_interceptor<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Interceptor + Send + Sync + 'static,
    {
        self.registry.register(name, factory);
        self
    }

    /// Append an interceptor; the first one added is the outermost layer
    pub fn interceptor(mut self, source: impl Into<InterceptorSource>) -> Self {
        self.interceptors.push(source.into());
        self
    }

    /// Must be called inside a tokio runtime when the default transport
    /// opens a socket.
    pub fn build(self) -> Result<Client> {
        let pipeline = InterceptorPipeline::from_sources(&self.interceptors, &self.registry)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.config),
        };
        let default_context: ContextRef = match self.default_context {
            Some(context) => context,
            None => Arc::new(Scope::root()),
        };
        let fallback: Arc<dyn HttpFallback> = match self.fallback {
            Some(fallback) => fallback,
            None => Arc::new(ReqwestFallback::new(&self.config)?),
        };
        let cycle: Arc<dyn UpdateCycle> = match self.update_cycle {
            Some(cycle) => cycle,
            None => Arc::new(Immediate),
        };

        debug!(
            "Building client with {} interceptors, prefix '{}'",
            pipeline.len(),
            self.config.prefix
        );

        let executor = RequestExecutor::new(transport.clone(), fallback, pipeline, cycle);
        let subscriptions = SubscriptionManager::new(transport.clone());
        let forwarding = ForwardingManager::new(transport.clone(), self.config.prefix.clone(), default_context);

        Ok(Client {
            config: self.config,
            transport,
            executor,
            subscriptions,
            forwarding,
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("interceptors", &self.interceptors)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = Client::new(ClientConfig::default());
        assert!(client.is_ok());
        let client = client.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::disconnected());
        assert_eq!(client.config().prefix, "spar:");
    }

    #[tokio::test]
    async fn test_prefix_override() {
        let client = Client::builder().prefix("app:").build().unwrap();
        assert_eq!(client.config().prefix, "app:");
    }
}
