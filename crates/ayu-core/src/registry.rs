//! Handler registry -- one active callback per event kind.
//!
//! The dispatch loop looks up the slot for each decoded event's kind and
//! calls it inline. Kinds without a handler are dropped silently.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::{Event, EventKind};

/// Callback invoked with each decoded event of the kind it is registered for.
///
/// Handlers run on the channel's read loop and must only do bounded,
/// non-blocking work.
pub type Handler = Box<dyn FnMut(&Event) + Send>;

/// Fixed table of handler slots, one per [`EventKind`].
///
/// # Example
///
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register(EventKind::Outcome, Box::new(|event| println!("{event:?}")));
/// registry.dispatch(&Event::outcome("t::a", Outcome::Passed));
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    slots: [Option<Handler>; EventKind::ALL.len()],
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `kind`.
    ///
    /// Last write wins: a handler already registered for the kind is
    /// replaced and returned.
    pub fn register(&mut self, kind: EventKind, handler: Handler) -> Option<Handler> {
        self.slots[kind.index()].replace(handler)
    }

    /// Remove the handler for `kind`. Later events of that kind are dropped.
    pub fn unregister(&mut self, kind: EventKind) -> Option<Handler> {
        self.slots[kind.index()].take()
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Kinds that currently have a handler, in [`EventKind::ALL`] order.
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.is_registered(*kind))
            .collect()
    }

    /// Route `event` to the handler for its kind.
    ///
    /// Returns `true` if a handler ran.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        match self.slots[event.kind().index()].as_mut() {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                tracing::trace!(kind = %event.kind(), "no handler registered, dropping event");
                false
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered", &self.registered_kinds())
            .finish()
    }
}

/// A registry shared between its owner and the channel's read loop.
///
/// Handlers are invoked while the lock is held, so a handler must never
/// call back into the registry.
#[derive(Clone, Default, Debug)]
pub struct SharedRegistry {
    inner: Arc<Mutex<HandlerRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, kind: EventKind, handler: Handler) -> Option<Handler> {
        self.lock().register(kind, handler)
    }

    pub fn unregister(&self, kind: EventKind) -> Option<Handler> {
        self.lock().unregister(kind)
    }

    pub fn dispatch(&self, event: &Event) -> bool {
        self.lock().dispatch(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::Outcome;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = Arc::clone(counter);
        Box::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn registry_starts_empty() {
        let registry = HandlerRegistry::new();
        assert!(registry.registered_kinds().is_empty());
        for kind in EventKind::ALL {
            assert!(!registry.is_registered(kind));
        }
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let outcomes = Arc::new(AtomicUsize::new(0));
        let scheduled = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(EventKind::Outcome, counting_handler(&outcomes));
        registry.register(EventKind::Scheduled, counting_handler(&scheduled));

        assert!(registry.dispatch(&Event::outcome("t::a", Outcome::Passed)));
        assert!(registry.dispatch(&Event::outcome("t::b", Outcome::Failed)));
        assert!(registry.dispatch(&Event::scheduled(["t::a"])));

        assert_eq!(outcomes.load(Ordering::SeqCst), 2);
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_replaces_existing() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();

        assert!(registry.register(EventKind::Outcome, counting_handler(&first)).is_none());
        assert!(registry.register(EventKind::Outcome, counting_handler(&second)).is_some());

        registry.dispatch(&Event::outcome("t::a", Outcome::Passed));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.registered_kinds(), vec![EventKind::Outcome]);
    }

    #[test]
    fn unregistered_kind_is_dropped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(EventKind::Outcome, counting_handler(&counter));
        assert!(registry.unregister(EventKind::Outcome).is_some());

        assert!(!registry.dispatch(&Event::outcome("t::a", Outcome::Passed)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(registry.unregister(EventKind::Outcome).is_none());
    }

    #[test]
    fn shared_registry_is_one_table() {
        let counter = Arc::new(AtomicUsize::new(0));
        let shared = SharedRegistry::new();
        let clone = shared.clone();
        shared.register(EventKind::Debug, counting_handler(&counter));

        assert!(clone.dispatch(&Event::Debug(serde_json::json!("x"))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_lists_registered_kinds() {
        let mut registry = HandlerRegistry::new();
        registry.register(EventKind::Coverage, Box::new(|_| {}));
        let debug = format!("{registry:?}");
        assert!(debug.contains("Coverage"), "unexpected debug output: {debug}");
    }
}
