// Rebroadcasts channel messages onto an event context
//
// Unlike subscriptions, forwards have no handle. The only way a forward is
// removed is by tearing down the context it targets.

use crate::context::{ContextRef, EventContext};
use crate::subscription::{filtered_listener, IdFilter};
use spar_transport::{normalize, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Event name a forwarded message is rebroadcast under:
/// `prefix + channel`, plus `":" + id` when the forward filters by id
pub fn forwarded_event_name(prefix: &str, channel: &str, filter: &IdFilter) -> String {
    match filter.segment() {
        Some(id) => format!("{}{}:{}", prefix, channel, id),
        None => format!("{}{}", prefix, channel),
    }
}

#[derive(Clone)]
pub struct ForwardingManager {
    transport: Arc<dyn Transport>,
    prefix: String,
    default_context: ContextRef,
}

impl ForwardingManager {
    pub fn new(transport: Arc<dyn Transport>, prefix: impl Into<String>, default_context: ContextRef) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
            default_context,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_context(&self) -> &ContextRef {
        &self.default_context
    }

    /// Rebroadcast every message on `channel` that passes `filter` onto
    /// `context` (or the default context), until that context is destroyed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn forward(&self, channel: &str, filter: IdFilter, context: Option<ContextRef>) {
        let context = context.unwrap_or_else(|| self.default_context.clone());
        let channel = normalize(channel);
        let event = forwarded_event_name(&self.prefix, &channel, &filter);
        debug!("Forwarding '{}' as '{}'", channel, event);

        let target = context.clone();
        let listener = filtered_listener(filter, move |message| {
            target.broadcast(&event, &message);
        });
        self.transport.on(&channel, listener.clone());

        // Registered after the listener so a context that is already gone
        // removes it straight away
        let transport = self.transport.clone();
        context.on_destroy(Box::new(move || {
            debug!("Context destroyed, removing forward on '{}'", channel);
            transport.remove_listener(&channel, &listener);
        }));
    }
}

impl fmt::Debug for ForwardingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingManager")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
