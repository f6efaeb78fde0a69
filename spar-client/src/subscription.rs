use serde_json::Value;
use spar_core::{is_truthy, DeferredDispatch};
use spar_transport::{normalize, Listener, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Optional correlation id a listener filters inbound messages by.
///
/// Falsy ids (null, false, 0, "") mean no filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdFilter(Option<Value>);

impl IdFilter {
    /// Accept every message
    pub fn any() -> Self {
        IdFilter(None)
    }

    /// Accept only messages whose `id` equals `id`
    pub fn id(id: impl Into<Value>) -> Self {
        let id = id.into();
        IdFilter(is_truthy(&id).then_some(id))
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Numbers compare by value, so `42` and `42.0` are the same id
    pub fn matches(&self, message: &Value) -> bool {
        let Some(id) = &self.0 else {
            return true;
        };
        match (message.get("id"), id) {
            (Some(Value::Number(got)), Value::Number(want)) => got.as_f64() == want.as_f64(),
            (got, want) => got == Some(want),
        }
    }

    /// The id as it appears in an event name: strings unquoted, anything
    /// else in its JSON form
    pub fn segment(&self) -> Option<String> {
        self.0.as_ref().map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl From<Option<Value>> for IdFilter {
    fn from(id: Option<Value>) -> Self {
        id.map(IdFilter::id).unwrap_or_default()
    }
}

/// Wrap `deliver` in a transport listener that drops non-matching messages
/// and hands the rest over one scheduling hop later.
pub(crate) fn filtered_listener<F>(filter: IdFilter, deliver: F) -> Listener
where
    F: FnMut(Value) + Send + 'static,
{
    let dispatch = DeferredDispatch::new(deliver);
    Listener::new(move |message| {
        if filter.matches(message) {
            dispatch.dispatch(message.clone());
        }
    })
}

/// Registers filtered message callbacks on named channels
#[derive(Clone)]
pub struct SubscriptionManager {
    transport: Arc<dyn Transport>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Call `callback` with every message on `channel` that passes `filter`.
    ///
    /// Must be called inside a tokio runtime. Callbacks run on a task of
    /// their own, in delivery order.
    pub fn subscribe<F>(&self, channel: &str, filter: IdFilter, callback: F) -> Subscription
    where
        F: FnMut(Value) + Send + 'static,
    {
        let channel = normalize(channel);
        debug!("Subscribing to '{}' (id filter: {:?})", channel, filter.value());

        let listener = filtered_listener(filter.clone(), callback);
        self.transport.on(&channel, listener.clone());

        Subscription {
            transport: self.transport.clone(),
            channel,
            filter,
            listener,
        }
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager").finish_non_exhaustive()
    }
}

/// Handle to one registered subscription.
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "a subscription can only be removed through its handle"]
pub struct Subscription {
    transport: Arc<dyn Transport>,
    channel: String,
    filter: IdFilter,
    listener: Listener,
}

impl Subscription {
    /// The normalized channel name the listener is registered under
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn filter(&self) -> &IdFilter {
        &self.filter
    }

    /// Remove exactly this subscription's listener from the transport
    pub fn unsubscribe(self) {
        debug!("Unsubscribing from '{}'", self.channel);
        self.transport.remove_listener(&self.channel, &self.listener);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("filter", &self.filter)
            .field("listener", &self.listener)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spar_transport::MemoryTransport;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_id_filter_matching() {
        let filter = IdFilter::id(42);
        assert!(filter.matches(&json!({"id": 42})));
        assert!(!filter.matches(&json!({"id": 7})));
        assert!(!filter.matches(&json!({"id": "42"})));
        assert!(!filter.matches(&json!("not an object")));
        assert!(IdFilter::any().matches(&json!({"id": 7})));
    }

    #[test]
    fn test_numeric_ids_match_by_value() {
        assert!(IdFilter::id(42).matches(&json!({"id": 42.0})));
        assert!(IdFilter::id(42.0).matches(&json!({"id": 42})));
        assert!(!IdFilter::id(42).matches(&json!({"id": 42.5})));
        assert!(!IdFilter::id(42).matches(&json!({"id": null})));
    }

    #[test]
    fn test_falsy_ids_disable_filter() {
        assert!(!IdFilter::id(0).is_set());
        assert!(!IdFilter::id("").is_set());
        assert!(!IdFilter::from(None).is_set());
        assert!(IdFilter::from(Some(json!("abc"))).is_set());
    }

    #[test]
    fn test_segment_formatting() {
        assert_eq!(IdFilter::id(42).segment().as_deref(), Some("42"));
        assert_eq!(IdFilter::id("a1").segment().as_deref(), Some("a1"));
        assert_eq!(IdFilter::any().segment(), None);
    }

    #[tokio::test]
    async fn test_same_callback_twice_removes_one() {
        let transport = Arc::new(MemoryTransport::new());
        let manager = SubscriptionManager::new(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first_tx = tx.clone();
        let first = manager.subscribe("Order", IdFilter::any(), move |m| {
            let _ = first_tx.send(m);
        });
        let _second = manager.subscribe("order", IdFilter::any(), move |m| {
            let _ = tx.send(m);
        });
        assert_eq!(transport.listener_count("order"), 2);

        first.unsubscribe();
        assert_eq!(transport.listener_count("order"), 1);

        transport.emit("order", json!({"id": 1}));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got, Some(json!({"id": 1})));
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }
}
