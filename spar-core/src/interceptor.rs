// Interceptor records and the name -> factory registry used to assemble them

use crate::error::SparError;
use crate::message::{Reply, RequestDescriptor};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handler run when the previous step fulfilled with a `T`
pub type FulfillHook<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<T, SparError>> + Send + Sync>;

/// Handler run when the previous step rejected; may recover into a `T`
pub type RejectHook<T> =
    Arc<dyn Fn(SparError) -> BoxFuture<'static, Result<T, SparError>> + Send + Sync>;

/// A pluggable transformer around the request/response lifecycle.
///
/// Each of the four hooks is optional. A missing hook passes the value or
/// error through unchanged.
#[derive(Clone, Default)]
pub struct Interceptor {
    pub request: Option<FulfillHook<RequestDescriptor>>,
    pub request_error: Option<RejectHook<RequestDescriptor>>,
    pub response: Option<FulfillHook<Reply>>,
    pub response_error: Option<RejectHook<Reply>>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RequestDescriptor, SparError>> + Send + 'static,
    {
        self.request = Some(Arc::new(move |request| f(request).boxed()));
        self
    }

    pub fn on_request_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SparError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RequestDescriptor, SparError>> + Send + 'static,
    {
        self.request_error = Some(Arc::new(move |error| f(error).boxed()));
        self
    }

    pub fn on_response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, SparError>> + Send + 'static,
    {
        self.response = Some(Arc::new(move |reply| f(reply).boxed()));
        self
    }

    pub fn on_response_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SparError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, SparError>> + Send + 'static,
    {
        self.response_error = Some(Arc::new(move |error| f(error).boxed()));
        self
    }

    pub fn has_request_phase(&self) -> bool {
        self.request.is_some() || self.request_error.is_some()
    }

    pub fn has_response_phase(&self) -> bool {
        self.response.is_some() || self.response_error.is_some()
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("request", &self.request.is_some())
            .field("request_error", &self.request_error.is_some())
            .field("response", &self.response.is_some())
            .field("response_error", &self.response_error.is_some())
            .finish()
    }
}

/// Produces a fresh interceptor; invoked once when a client is built
pub type InterceptorFactory = Arc<dyn Fn() -> Interceptor + Send + Sync>;

/// Where an interceptor comes from: a registered name or an inline factory
#[derive(Clone)]
pub enum InterceptorSource {
    Named(String),
    Inline(InterceptorFactory),
}

impl InterceptorSource {
    pub fn named(name: impl Into<String>) -> Self {
        InterceptorSource::Named(name.into())
    }

    pub fn inline<F>(factory: F) -> Self
    where
        F: Fn() -> Interceptor + Send + Sync + 'static,
    {
        InterceptorSource::Inline(Arc::new(factory))
    }
}

impl From<Interceptor> for InterceptorSource {
    fn from(interceptor: Interceptor) -> Self {
        InterceptorSource::inline(move || interceptor.clone())
    }
}

impl fmt::Debug for InterceptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorSource::Named(name) => f.debug_tuple("Named").field(name).finish(),
            InterceptorSource::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// Interceptor factories looked up by name, in registration order
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    factories: IndexMap<String, InterceptorFactory>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Interceptor + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the interceptor a source refers to
    pub fn resolve(&self, source: &InterceptorSource) -> Result<Interceptor, SparError> {
        match source {
            InterceptorSource::Named(name) => self
                .factories
                .get(name)
                .map(|factory| factory())
                .ok_or_else(|| SparError::UnknownInterceptor(name.clone())),
            InterceptorSource::Inline(factory) => Ok(factory()),
        }
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_detection() {
        let empty = Interceptor::new();
        assert!(!empty.has_request_phase());
        assert!(!empty.has_response_phase());

        let request_only = Interceptor::new().on_request_error(|e| async move { Err(e) });
        assert!(request_only.has_request_phase());
        assert!(!request_only.has_response_phase());

        let response_only = Interceptor::new().on_response(|reply| async move { Ok(reply) });
        assert!(!response_only.has_request_phase());
        assert!(response_only.has_response_phase());
    }

    #[test]
    fn test_registry_resolves_named_and_inline() {
        let mut registry = InterceptorRegistry::new();
        registry.register("auth", || Interceptor::new().on_request(|r| async move { Ok(r) }));

        assert!(registry.contains("auth"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["auth"]);

        let named = registry.resolve(&InterceptorSource::named("auth")).unwrap();
        assert!(named.has_request_phase());

        let inline = registry
            .resolve(&InterceptorSource::from(
                Interceptor::new().on_response(|r| async move { Ok(r) }),
            ))
            .unwrap();
        assert!(inline.has_response_phase());
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let registry = InterceptorRegistry::new();
        let err = registry
            .resolve(&InterceptorSource::named("missing"))
            .unwrap_err();
        assert_eq!(err, SparError::UnknownInterceptor("missing".to_string()));
    }
}
