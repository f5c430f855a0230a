//! In-process event dispatcher.
//!
//! Maps an [`EventKind`] to the handlers registered for it. Every handler
//! registered for a kind is invoked, in registration order, for each event of that
//! kind. Events with no registered handler are dropped.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
};

use super::event::{EventKind, InboundEvent};

/// A registered event handler
pub type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

struct Entry {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl Registry {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handler table bound to one connection.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.entries().push(Entry {
            id,
            kind,
            handler: Arc::new(handler),
        });
        tracing::debug!("Subscribed handler #{} to '{}'", id, kind);

        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// The handler list is snapshotted before invocation, so handlers may
    /// subscribe or unsubscribe freely; changes apply from the next event.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .registry
            .entries()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.handler.clone())
            .collect();

        if handlers.is_empty() {
            tracing::debug!("No handler for '{}', dropping event", kind);
        }
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .entries()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Detach every handler. Outstanding subscriptions become inert.
    pub fn clear(&self) {
        let mut entries = self.registry.entries();
        if !entries.is_empty() {
            tracing::debug!("Detaching {} handler(s)", entries.len());
        }
        entries.clear();
    }
}

/// Capability that removes exactly one registered handler.
#[must_use = "dropping a Subscription leaves the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<Registry>,
}

impl Subscription {
    /// A subscription not bound to any dispatcher (e.g. no live connection)
    pub fn detached(kind: EventKind) -> Self {
        Self {
            id: u64::MAX,
            kind,
            registry: Weak::new(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether the handler is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.entries().iter().any(|entry| entry.id == self.id))
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut entries = registry.entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != self.id);
        before != entries.len()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
