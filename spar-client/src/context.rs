// Event surfaces targeted by forwarding, and the scope tree that implements them

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, trace};

const SCOPE_CHANNEL_CAPACITY: usize = 256;

/// Runs once when a context is torn down
pub type TeardownHook = Box<dyn FnOnce() + Send>;

/// Shared handle to an event context
pub type ContextRef = Arc<dyn EventContext>;

/// The surface forwarded messages are rebroadcast on.
///
/// A context also owns the lifetime of the forwards targeting it: hooks
/// registered with `on_destroy` run when it is torn down.
pub trait EventContext: Send + Sync {
    fn broadcast(&self, event: &str, payload: &Value);

    /// Register a teardown hook. On an already destroyed context the hook
    /// runs immediately.
    fn on_destroy(&self, hook: TeardownHook);
}

impl fmt::Debug for dyn EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventContext")
    }
}

/// An event delivered to a scope's receivers
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEvent {
    pub name: String,
    pub payload: Value,
}

#[derive(Default)]
struct ScopeState {
    destroyed: bool,
    teardown: Vec<TeardownHook>,
    children: Vec<Scope>,
}

struct ScopeInner {
    sender: broadcast::Sender<ScopeEvent>,
    state: Mutex<ScopeState>,
}

/// A node in a tree of event scopes.
///
/// Broadcasts reach this scope's receivers and then every live descendant.
/// Destroying a scope destroys its children first, then runs its own
/// teardown hooks, each exactly once.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub fn root() -> Self {
        let (sender, _) = broadcast::channel(SCOPE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ScopeInner {
                sender,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a child scope. A child of a destroyed scope starts destroyed.
    pub fn child(&self) -> Scope {
        let child = Scope::root();
        let parent_destroyed = {
            let mut state = self.state();
            state.children.retain(|c| !c.is_destroyed());
            if !state.destroyed {
                state.children.push(child.clone());
            }
            state.destroyed
        };
        if parent_destroyed {
            child.destroy();
        }
        child
    }

    /// Receive every event broadcast on this scope from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.inner.sender.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    pub fn destroy(&self) {
        let (children, hooks) = {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.teardown),
            )
        };

        for child in &children {
            child.destroy();
        }
        debug!("Destroying scope, running {} teardown hooks", hooks.len());
        for hook in hooks {
            hook();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl EventContext for Scope {
    fn broadcast(&self, event: &str, payload: &Value) {
        let children = {
            let state = self.state();
            if state.destroyed {
                trace!("Ignoring '{}' broadcast on destroyed scope", event);
                return;
            }
            state.children.clone()
        };

        // No receivers is not an error for a broadcast
        let _ = self.inner.sender.send(ScopeEvent {
            name: event.to_string(),
            payload: payload.clone(),
        });
        for child in &children {
            child.broadcast(event, payload);
        }
    }

    fn on_destroy(&self, hook: TeardownHook) {
        let mut state = self.state();
        if state.destroyed {
            drop(state);
            hook();
            return;
        }
        state.teardown.push(hook);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Scope")
            .field("destroyed", &state.destroyed)
            .field("children", &state.children.len())
            .field("teardown_hooks", &state.teardown.len())
            .finish()
    }
}
