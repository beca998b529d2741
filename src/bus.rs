//! Multi-listener event dispatch.
//!
//! [`EventBus`] lets several independent consumers observe the same category
//! of [`PlazaEvent`] without interfering with each other. Registration
//! returns a [`ListenerHandle`] used for removal, so callers never need to
//! keep the exact closure reference around. A panicking handler is caught
//! and logged per-handler; it cannot block delivery to the others.
//!
//! Each session owns its own bus instance — there is no process-global
//! listener table.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::event::{EventCategory, PlazaEvent};

type Handler = Arc<dyn Fn(&PlazaEvent) + Send + Sync + 'static>;

/// Opaque registration handle returned by [`EventBus::on`].
///
/// Pass it to [`EventBus::off`] to unregister. Removing a handle twice, or a
/// handle whose listener is already gone, is a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    category: EventCategory,
    id: u64,
}

struct Inner {
    listeners: Mutex<HashMap<EventCategory, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

/// Per-session event dispatcher. Cheap to clone; clones share listeners.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler for one event category.
    ///
    /// The handler is invoked for every emission in that category, in
    /// registration order. Handlers must be independent: no handler may rely
    /// on another having run first.
    pub fn on(
        &self,
        category: EventCategory,
        handler: impl Fn(&PlazaEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners
                .entry(category)
                .or_default()
                .push((id, Arc::new(handler)));
        }
        ListenerHandle { category, id }
    }

    /// Unregister a handler. Idempotent: unknown or already-removed handles
    /// are ignored.
    pub fn off(&self, handle: &ListenerHandle) {
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            if let Some(entries) = listeners.get_mut(&handle.category) {
                entries.retain(|(id, _)| *id != handle.id);
            }
        }
    }

    /// Deliver an event to every handler registered for its category.
    ///
    /// Handlers run outside the registration lock, so a handler may itself
    /// call [`on`](Self::on) or [`off`](Self::off).
    pub fn emit(&self, event: &PlazaEvent) {
        let category = event.category();
        let handlers: Vec<Handler> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .get(&category)
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };

        if handlers.is_empty() {
            debug!(?category, "no listeners for event");
            return;
        }

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(?category, "event handler panicked; continuing delivery");
            }
        }
    }

    /// Number of handlers currently registered for a category.
    pub fn listener_count(&self, category: EventCategory) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|listeners| listeners.get(&category).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;
    use std::sync::atomic::AtomicUsize;

    fn connection_event() -> PlazaEvent {
        PlazaEvent::Connection(ConnectionState::Connected)
    }

    #[test]
    fn every_registered_handler_receives_the_event() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = Arc::clone(&a);
        let b2 = Arc::clone(&b);
        let _h1 = bus.on(EventCategory::Connection, move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let _h2 = bus.on(EventCategory::Connection, move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&connection_event());
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_is_idempotent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let handle = bus.on(EventCategory::Connection, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        bus.off(&handle);
        bus.off(&handle); // second removal is a no-op
        bus.emit(&connection_event());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let _bad = bus.on(EventCategory::Connection, |_| {
            panic!("listener bug");
        });
        let delivered2 = Arc::clone(&delivered);
        let _good = bus.on(EventCategory::Connection, move |_| {
            delivered2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&connection_event());
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_only_fire_for_their_category() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let _h = bus.on(EventCategory::RoomList, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&connection_event());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(EventCategory::RoomList), 1);
    }

    #[test]
    fn handler_may_register_another_during_emit() {
        let bus = EventBus::new();
        let bus2 = bus.clone();
        let _h = bus.on(EventCategory::Connection, move |_| {
            let _ = bus2.on(EventCategory::Chat, |_| {});
        });

        bus.emit(&connection_event());
        assert_eq!(bus.listener_count(EventCategory::Chat), 1);
    }
}
