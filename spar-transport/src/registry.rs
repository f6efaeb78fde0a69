// Named mailboxes of listeners, shared by every transport implementation

use crate::transport::Listener;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

/// Event names are matched case-insensitively
pub fn normalize(event: &str) -> String {
    event.to_lowercase()
}

/// Listener sets keyed by normalized event name
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    mailboxes: DashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, listener: Listener) {
        let event = normalize(event);
        trace!("Adding listener on '{}'", event);
        self.mailboxes.entry(event).or_default().push(listener);
    }

    /// Remove one registration of `listener`. Returns false if it was not
    /// registered under `event`.
    pub fn remove(&self, event: &str, listener: &Listener) -> bool {
        let event = normalize(event);
        let removed = match self.mailboxes.get_mut(&event) {
            Some(mut listeners) => match listeners.iter().position(|l| l.same(listener)) {
                Some(index) => {
                    listeners.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };
        self.mailboxes.remove_if(&event, |_, listeners| listeners.is_empty());
        trace!("Removing listener on '{}': found = {}", event, removed);
        removed
    }

    /// Deliver `message` to every listener on `event`; returns how many ran.
    ///
    /// Listeners are called on a snapshot taken before the first call, so a
    /// listener may add or remove registrations without deadlocking.
    pub fn emit(&self, event: &str, message: &Value) -> usize {
        let event = normalize(event);
        let listeners = match self.mailboxes.get(&event) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };
        for listener in &listeners {
            listener.call(message);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.mailboxes
            .get(&normalize(event))
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<String> {
        self.mailboxes.iter().map(|entry| entry.key().clone()).collect()
    }
}
