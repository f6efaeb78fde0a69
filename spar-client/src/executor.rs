// Request executor: correlates one outgoing request with its eventual reply
//
// While the socket is up (or coming up) every request runs through the
// interceptor chain with `TransportCore` at its centre. Otherwise the whole
// call is handed to the HTTP fallback and its future is returned directly,
// bypassing the interceptors.

use crate::fallback::HttpFallback;
use async_trait::async_trait;
use spar_core::{
    CoreExecutor, InterceptorPipeline, Method, Reply, ReplyFuture, ReplyResult,
    RequestDescriptor, SparError, UpdateCycle,
};
use spar_transport::{ReplyCallback, Transport};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Pass/fail policy applied to every socket reply
pub fn settle(reply: Reply) -> ReplyResult {
    if reply.is_failure() {
        Err(SparError::Rejected(reply))
    } else {
        Ok(reply)
    }
}

/// Core chain step: one request over the socket
pub struct TransportCore {
    transport: Arc<dyn Transport>,
    cycle: Arc<dyn UpdateCycle>,
}

impl TransportCore {
    pub fn new(transport: Arc<dyn Transport>, cycle: Arc<dyn UpdateCycle>) -> Self {
        Self { transport, cycle }
    }
}

#[async_trait]
impl CoreExecutor for TransportCore {
    async fn send(&self, request: RequestDescriptor) -> ReplyResult {
        let (tx, rx) = oneshot::channel();
        let cycle = self.cycle.clone();
        let callback: ReplyCallback = Box::new(move |reply: Reply| {
            cycle.apply(Box::new(move || {
                let _ = tx.send(settle(reply));
            }));
        });

        trace!("Socket {} {}", request.method, request.url);
        self.transport
            .send(request.method, &request.url, request.data, callback)?;

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                // The transport dropped the callback without answering. There
                // is no timeout, so the request stays pending.
                debug!("Reply callback dropped, request will never settle");
                futures::future::pending().await
            }
        }
    }
}

impl fmt::Debug for TransportCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCore").finish_non_exhaustive()
    }
}

/// Chooses socket or HTTP fallback and returns the settle-once future
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    fallback: Arc<dyn HttpFallback>,
    pipeline: Arc<InterceptorPipeline>,
    cycle: Arc<dyn UpdateCycle>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        fallback: Arc<dyn HttpFallback>,
        pipeline: InterceptorPipeline,
        cycle: Arc<dyn UpdateCycle>,
    ) -> Self {
        Self {
            transport,
            fallback,
            pipeline: Arc::new(pipeline),
            cycle,
        }
    }

    pub fn execute(&self, request: RequestDescriptor) -> ReplyFuture {
        if !self.transport.connection_state().is_available() {
            debug!(
                "Socket unavailable, sending {} {} over HTTP fallback",
                request.method, request.url
            );
            return self.execute_fallback(request);
        }

        let core: Arc<dyn CoreExecutor> = Arc::new(TransportCore::new(
            self.transport.clone(),
            self.cycle.clone(),
        ));
        let pipeline = self.pipeline.clone();
        ReplyFuture::spawn(async move { pipeline.run(core, request).await })
    }

    fn execute_fallback(&self, request: RequestDescriptor) -> ReplyFuture {
        let fallback = self.fallback.clone();
        ReplyFuture::spawn(async move {
            let RequestDescriptor {
                method,
                url,
                data,
                params,
            } = request;
            match method {
                Method::Get => fallback.get(&url, params).await,
                Method::Delete => fallback.delete(&url, params).await,
                Method::Post => fallback.post(&url, data, params).await,
                Method::Put => fallback.put(&url, data, params).await,
            }
        })
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("pipeline", &self.pipeline)
            .field("connection", &self.transport.connection_state())
            .finish()
    }
}
