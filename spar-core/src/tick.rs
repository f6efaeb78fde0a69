use tokio::sync::mpsc;
use tracing::trace;

/// Delivers values to a handler one scheduling hop after they are queued.
///
/// Each dispatcher owns a single draining task, so values reach the handler
/// in the order they were queued. Dispatchers are independent of each other.
/// The task ends once every clone of the dispatcher is dropped.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct DeferredDispatch<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for DeferredDispatch<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> DeferredDispatch<T> {
    pub fn new<F>(mut handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                handler(value);
            }
        });
        Self { tx }
    }

    /// Queue `value` for the handler
    pub fn dispatch(&self, value: T) {
        if self.tx.send(value).is_err() {
            trace!("Deferred handler is gone, dropping value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatch = DeferredDispatch::new(move |n: u32| {
            let _ = tx.send(n);
        });

        for n in 0..50 {
            dispatch.dispatch(n);
        }

        let mut seen = Vec::new();
        while seen.len() < 50 {
            let n = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(n);
        }
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_handler_does_not_run_inline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatch = DeferredDispatch::new(move |n: u32| {
            let _ = tx.send(n);
        });

        dispatch.dispatch(7);
        assert!(rx.try_recv().is_err());

        let n = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(n, Some(7));
    }
}
