// Onion-style interceptor pipeline around a core request executor
//
// Interceptors are kept in reverse registration order. Walking that list,
// request-phase pairs are pushed on the front of the chain and
// response-phase pairs on the back, so the first registered interceptor
// is the outermost layer in both directions.

use crate::error::SparError;
use crate::interceptor::{FulfillHook, Interceptor, InterceptorRegistry, InterceptorSource, RejectHook};
use crate::message::{Reply, RequestDescriptor};
use crate::reply_future::ReplyResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// The innermost step of every chain: actually issue the request
#[async_trait]
pub trait CoreExecutor: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> ReplyResult;
}

/// One (fulfill, reject) handler pair
pub struct Step<T> {
    fulfill: Option<FulfillHook<T>>,
    reject: Option<RejectHook<T>>,
}

impl<T: Send + 'static> Step<T> {
    pub fn new(fulfill: Option<FulfillHook<T>>, reject: Option<RejectHook<T>>) -> Self {
        Self { fulfill, reject }
    }

    /// Apply this pair to the previous settlement
    pub async fn settle(&self, previous: Result<T, SparError>) -> Result<T, SparError> {
        match previous {
            Ok(value) => match &self.fulfill {
                Some(fulfill) => fulfill(value).await,
                None => Ok(value),
            },
            Err(error) => match &self.reject {
                Some(reject) => reject(error).await,
                None => Err(error),
            },
        }
    }
}

/// Handler pairs built for one request: request phase, core, response phase
pub struct Chain {
    request: Vec<Step<RequestDescriptor>>,
    core: Arc<dyn CoreExecutor>,
    response: Vec<Step<Reply>>,
}

impl Chain {
    /// Number of handler slots; the core pair accounts for the fixed two
    pub fn slot_count(&self) -> usize {
        2 + 2 * (self.request.len() + self.response.len())
    }

    pub fn request_steps(&self) -> usize {
        self.request.len()
    }

    pub fn response_steps(&self) -> usize {
        self.response.len()
    }

    /// Drive `request` through every pair in order.
    ///
    /// A rejection skips fulfil handlers until the next reject handler. A
    /// request that is still rejected when it reaches the core pair is never
    /// sent.
    pub async fn run(&self, request: RequestDescriptor) -> ReplyResult {
        let mut outgoing = Ok(request);
        for step in &self.request {
            outgoing = step.settle(outgoing).await;
        }

        let mut reply = match outgoing {
            Ok(request) => {
                trace!("Dispatching {} {} to core executor", request.method, request.url);
                self.core.send(request).await
            }
            Err(error) => {
                trace!("Request rejected before reaching the core executor: {}", error);
                Err(error)
            }
        };

        for step in &self.response {
            reply = step.settle(reply).await;
        }
        reply
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("request_steps", &self.request.len())
            .field("response_steps", &self.response.len())
            .field("slots", &self.slot_count())
            .finish()
    }
}

/// Ordered interceptor set, consumed once at client construction
#[derive(Clone, Default)]
pub struct InterceptorPipeline {
    reversed: Vec<Interceptor>,
}

impl InterceptorPipeline {
    /// Build from interceptors in registration order
    pub fn new(interceptors: impl IntoIterator<Item = Interceptor>) -> Self {
        let mut reversed: Vec<Interceptor> = interceptors.into_iter().collect();
        reversed.reverse();
        Self { reversed }
    }

    /// Resolve each source against `registry`, preserving order
    pub fn from_sources(
        sources: &[InterceptorSource],
        registry: &InterceptorRegistry,
    ) -> Result<Self, SparError> {
        let interceptors = sources
            .iter()
            .map(|source| registry.resolve(source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(interceptors))
    }

    pub fn len(&self) -> usize {
        self.reversed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reversed.is_empty()
    }

    pub fn build(&self, core: Arc<dyn CoreExecutor>) -> Chain {
        let mut request = VecDeque::new();
        let mut response = Vec::new();

        for interceptor in &self.reversed {
            if interceptor.has_request_phase() {
                request.push_front(Step::new(
                    interceptor.request.clone(),
                    interceptor.request_error.clone(),
                ));
            }
            if interceptor.has_response_phase() {
                response.push(Step::new(
                    interceptor.response.clone(),
                    interceptor.response_error.clone(),
                ));
            }
        }

        let chain = Chain {
            request: request.into(),
            core,
            response,
        };
        trace!("Built interceptor chain with {} slots", chain.slot_count());
        chain
    }

    pub async fn run(&self, core: Arc<dyn CoreExecutor>, request: RequestDescriptor) -> ReplyResult {
        self.build(core).run(request).await
    }
}

impl fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("interceptors", &self.reversed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CoreExecutor for Echo {
        async fn send(&self, request: RequestDescriptor) -> ReplyResult {
            Ok(Reply::new(json!({"url": request.url, "status": 200})))
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_core() {
        let pipeline = InterceptorPipeline::default();
        let chain = pipeline.build(Arc::new(Echo));
        assert_eq!(chain.slot_count(), 2);

        let reply = chain.run(RequestDescriptor::get("/ping", None)).await.unwrap();
        assert_eq!(reply.get("url"), Some(&json!("/ping")));
    }

    #[tokio::test]
    async fn test_request_rewrite_reaches_core() {
        let pipeline = InterceptorPipeline::new([Interceptor::new().on_request(|mut r: RequestDescriptor| async move {
            r.url = format!("/api{}", r.url);
            Ok(r)
        })]);

        let reply = pipeline
            .run(Arc::new(Echo), RequestDescriptor::get("/ping", None))
            .await
            .unwrap();
        assert_eq!(reply.get("url"), Some(&json!("/api/ping")));
    }

    #[tokio::test]
    async fn test_response_error_recovers() {
        let pipeline = InterceptorPipeline::new([
            Interceptor::new().on_response_error(|_| async { Ok(Reply::new(json!({"recovered": true}))) }),
            Interceptor::new().on_request(|_| async { Err(SparError::Interceptor(json!("nope"))) }),
        ]);

        let reply = pipeline
            .run(Arc::new(Echo), RequestDescriptor::get("/ping", None))
            .await
            .unwrap();
        assert_eq!(reply.get("recovered"), Some(&json!(true)));
    }
}
