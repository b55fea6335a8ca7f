use crate::event::Event;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Implemented by anything that wants to observe engine events.
///
/// Dispatch is synchronous, on the worker (or engine) thread that raised
/// the event: a handler that blocks stalls that thread.
/// Handlers must not mutate the engine.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        (self)(event)
    }
}

/// A subscription handle returned by [`EventBus::subscribe`], used to
/// [`EventBus::unsubscribe`] later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Central synchronous event bus. The handler list is read-mostly: reads
/// (one per emitted event) take a shared lock, subscribe/unsubscribe take
/// an exclusive one.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler for every event kind. Returns an id usable with
    /// [`EventBus::unsubscribe`].
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.handlers.write().push((id, handler));
        id
    }

    /// Remove a previously registered handler. No-op if `id` is unknown
    /// (already unsubscribed, or from a different bus instance).
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.write().retain(|(hid, _)| *hid != id);
    }

    /// Deliver `event` to every registered handler, in subscription order.
    /// A panicking handler is caught and logged so one bad handler cannot
    /// bring down the worker emitting the event.
    pub fn emit(&self, event: Event) {
        let handlers = self.handlers.read();
        for (id, handler) in handlers.iter() {
            let handler = handler.clone();
            let event_ref = &event;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle(event_ref);
            }));
            if result.is_err() {
                warn!(subscription = ?id, "event handler panicked");
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlkit_types::CrawlerStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_all_subscribed_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe(Arc::new(move |_: &Event| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = count.clone();
        bus.subscribe(Arc::new(move |_: &Event| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(Event::completed("https://a.test/", 0, 200, 10));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let id = bus.subscribe(Arc::new(move |_: &Event| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(Event::completed("https://a.test/", 0, 200, 10));
        bus.unsubscribe(id);
        bus.emit(Event::completed("https://a.test/", 0, 200, 10));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_later_handlers() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(|_: &Event| panic!("boom")));

        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        bus.subscribe(Arc::new(move |_: &Event| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(Event::status_changed(CrawlerStatus::Idle, CrawlerStatus::Running, None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
