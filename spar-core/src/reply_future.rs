// Settle-once future handed back to callers of every request verb

use crate::error::SparError;
use crate::message::Reply;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

pub type ReplyResult = Result<Reply, SparError>;

/// A single-assignment result container.
///
/// Clones observe the same settlement. Awaiting a `ReplyFuture` yields the
/// canonical settled value; [`ReplyFuture::success`] and
/// [`ReplyFuture::error`] attach observers without changing it.
#[derive(Clone)]
pub struct ReplyFuture {
    inner: Shared<BoxFuture<'static, ReplyResult>>,
}

impl ReplyFuture {
    /// Start `fut` on the tokio runtime right away, so the request goes out
    /// even if nobody awaits the returned future.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ReplyResult> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        Self::from_future(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Request task failed before settling: {}", e);
                    Err(SparError::Aborted(e.to_string()))
                }
            }
        })
    }

    /// Wrap a lazy future; it only runs once polled or observed
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = ReplyResult> + Send + 'static,
    {
        Self {
            inner: fut.boxed().shared(),
        }
    }

    pub fn fulfilled(reply: Reply) -> Self {
        Self::from_future(futures::future::ready(Ok(reply)))
    }

    pub fn rejected(error: SparError) -> Self {
        Self::from_future(futures::future::ready(Err(error)))
    }

    /// Run `f` with the reply if this future fulfills
    pub fn success<F>(self, f: F) -> Self
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let observed = self.clone();
        tokio::spawn(async move {
            if let Ok(reply) = observed.await {
                f(reply);
            }
        });
        self
    }

    /// Run `f` with `(errors, status)` if this future rejects
    pub fn error<F>(self, f: F) -> Self
    where
        F: FnOnce(Option<Value>, Option<u16>) + Send + 'static,
    {
        let observed = self.clone();
        tokio::spawn(async move {
            if let Err(error) = observed.await {
                f(error.errors().cloned(), error.status());
            }
        });
        self
    }

    /// The settled value, if settlement has already been observed
    pub fn peek(&self) -> Option<&ReplyResult> {
        self.inner.peek()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("settled", &self.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Observed {
        Success(Reply),
        Error(Option<Value>, Option<u16>),
    }

    fn observe(future: ReplyFuture) -> mpsc::UnboundedReceiver<Observed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_error = tx.clone();
        let _ = future
            .success(move |reply| {
                let _ = tx.send(Observed::Success(reply));
            })
            .error(move |errors, status| {
                let _ = on_error.send(Observed::Error(errors, status));
            });
        rx
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<Observed>) -> Vec<Observed> {
        let mut seen = Vec::new();
        while let Ok(Some(observed)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            seen.push(observed);
        }
        seen
    }

    #[tokio::test]
    async fn test_success_only_on_fulfilment() {
        let reply = Reply::new(json!({"status": 200, "id": 1}));
        let seen = drain(observe(ReplyFuture::fulfilled(reply.clone()))).await;
        assert_eq!(seen, vec![Observed::Success(reply)]);
    }

    #[tokio::test]
    async fn test_error_unpacks_errors_and_status() {
        let reply = Reply::new(json!({"errors": ["bad"], "status": 400}));
        let seen = drain(observe(ReplyFuture::rejected(SparError::Rejected(reply)))).await;
        assert_eq!(seen, vec![Observed::Error(Some(json!(["bad"])), Some(400))]);
    }

    #[tokio::test]
    async fn test_observers_do_not_change_settled_value() {
        let reply = Reply::new(json!({"status": 200}));
        let future = ReplyFuture::fulfilled(reply.clone())
            .success(|_| {})
            .error(|_, _| {});
        assert_eq!(future.await, Ok(reply));
    }

    #[tokio::test]
    async fn test_spawned_future_runs_without_being_awaited() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let future = ReplyFuture::spawn(async move {
            let _ = tx.send(());
            Ok(Reply::new(json!({})))
        });

        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(future.clone().await.is_ok());
        assert!(future.is_settled());
    }
}
