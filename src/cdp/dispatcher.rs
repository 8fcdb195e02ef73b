//! Event dispatcher
//!
//! Routes unsolicited CDP events to the handlers registered for their exact name
//! (and to wildcard handlers). A failing or panicking handler is isolated: the
//! failure is logged and published on a broadcast channel, and delivery continues.

use super::types::CdpEvent;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

/// Event name that matches every event
pub const WILDCARD: &str = "*";

/// Event handler callback.
///
/// Handlers run on the connection's read loop, so no reply is correlated while one
/// runs. They must not block; hand slow work to an [`EventStream`] from `events()`.
pub type EventHandler = Arc<dyn Fn(&CdpEvent) -> anyhow::Result<()> + Send + Sync>;

/// Unique identifier of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Handle returned by `subscribe`, used to remove exactly that registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event: String,
    id: SubscriptionId,
}

impl SubscriptionHandle {
    /// Event name this handle is registered under
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Report of a handler that failed while processing an event
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Registration that failed
    pub subscription: SubscriptionHandle,
    /// Name of the event being dispatched
    pub event: String,
    /// Error or panic message
    pub error: String,
    /// When the failure happened
    pub at: DateTime<Utc>,
}

impl From<&HandlerFailure> for Error {
    fn from(failure: &HandlerFailure) -> Self {
        Error::handler(format!("{}: {}", failure.event, failure.error))
    }
}

struct Registration {
    id: SubscriptionId,
    handler: EventHandler,
}

#[derive(Default)]
struct SubscriptionTable {
    /// Set when the owning connection closes
    closed: bool,
    handlers: HashMap<String, Vec<Registration>>,
}

/// Subscription table and dispatch for one connection
pub struct EventDispatcher {
    next_id: AtomicU64,
    /// Never held while a handler runs
    table: Mutex<SubscriptionTable>,
    failures: broadcast::Sender<HandlerFailure>,
    event_buffer: usize,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscription_count())
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl EventDispatcher {
    /// Create a dispatcher.
    ///
    /// # Arguments
    /// * `event_buffer` - capacity of each stream subscription
    /// * `failure_buffer` - capacity of the failure broadcast channel
    pub fn new(event_buffer: usize, failure_buffer: usize) -> Self {
        let (failures, _) = broadcast::channel(failure_buffer.max(1));
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(SubscriptionTable::default()),
            failures,
            event_buffer: event_buffer.max(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `handler` for events named `event` (or [`WILDCARD`]).
    ///
    /// `handler` must return promptly; see [`EventHandler`].
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&CdpEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler(event, Arc::new(handler))
    }

    pub fn subscribe_handler(&self, event: &str, handler: EventHandler) -> Result<SubscriptionHandle> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut table = self.table();
        if table.closed {
            return Err(Error::ConnectionClosed);
        }
        table
            .handlers
            .entry(event.to_string())
            .or_default()
            .push(Registration { id, handler });
        drop(table);

        debug!("Subscribed {:?} to {}", id, event);

        Ok(SubscriptionHandle {
            event: event.to_string(),
            id,
        })
    }

    /// Remove exactly the registration behind `handle`.
    ///
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut table = self.table();
        let Some(registrations) = table.handlers.get_mut(&handle.event) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|r| r.id != handle.id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            table.handlers.remove(&handle.event);
        }

        if removed {
            debug!("Unsubscribed {:?} from {}", handle.id, handle.event);
        }
        removed
    }

    /// Stream of events named `event`, buffered up to the configured capacity.
    ///
    /// Dropping the stream unsubscribes it.
    pub fn events(self: &Arc<Self>, event: &str) -> Result<EventStream> {
        let (sender, receiver) = mpsc::channel(self.event_buffer);

        let handle = self.subscribe(event, move |event: &CdpEvent| {
            sender.try_send(event.clone()).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    anyhow::anyhow!("event stream buffer full, event dropped")
                }
                mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("event stream closed"),
            })
        })?;

        Ok(EventStream {
            inner: ReceiverStream::new(receiver),
            handle,
            dispatcher: Arc::downgrade(self),
        })
    }

    /// Receiver for handler failure reports
    pub fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }

    fn is_registered(&self, event: &str, id: SubscriptionId) -> bool {
        self.table()
            .handlers
            .get(event)
            .is_some_and(|regs| regs.iter().any(|r| r.id == id))
    }

    /// Deliver `event` to every live registration.
    ///
    /// Returns the number of handlers that were invoked.
    pub fn dispatch(&self, event: &CdpEvent) -> usize {
        let snapshot: Vec<(String, SubscriptionId, EventHandler)> = {
            let table = self.table();
            if table.closed {
                return 0;
            }

            let exact = table.handlers.get(&event.method).into_iter().flatten();
            let wildcard = if event.method == WILDCARD {
                None
            } else {
                table.handlers.get(WILDCARD)
            };

            exact
                .map(|r| (event.method.clone(), r.id, Arc::clone(&r.handler)))
                .chain(
                    wildcard
                        .into_iter()
                        .flatten()
                        .map(|r| (WILDCARD.to_string(), r.id, Arc::clone(&r.handler))),
                )
                .collect()
        };

        if snapshot.is_empty() {
            trace!("No subscribers for {}, dropping event", event.method);
            return 0;
        }

        let mut invoked = 0;
        for (name, id, handler) in snapshot {
            // Unsubscribed after the snapshot was taken
            if !self.is_registered(&name, id) {
                continue;
            }

            invoked += 1;
            let error = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic.as_ref()),
            };

            self.report(HandlerFailure {
                subscription: SubscriptionHandle { event: name, id },
                event: event.method.clone(),
                error,
                at: Utc::now(),
            });
        }

        invoked
    }

    fn report(&self, failure: HandlerFailure) {
        warn!(
            "Event handler {:?} failed on {}: {}",
            failure.subscription.id, failure.event, failure.error
        );
        // No diagnostics listener is fine
        let _ = self.failures.send(failure);
    }

    /// Drop all registrations and refuse further dispatch
    pub fn close(&self) {
        let mut table = self.table();
        table.closed = true;
        table.handlers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Number of live registrations across all event names
    pub fn subscription_count(&self) -> usize {
        self.table().handlers.values().map(Vec::len).sum()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

/// Buffered stream subscription returned by [`EventDispatcher::events`]
#[derive(Debug)]
pub struct EventStream {
    inner: ReceiverStream<CdpEvent>,
    handle: SubscriptionHandle,
    dispatcher: Weak<EventDispatcher>,
}

impl EventStream {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Next event, or `None` once the connection closed
    pub async fn recv(&mut self) -> Option<CdpEvent> {
        futures::StreamExt::next(self).await
    }
}

impl Stream for EventStream {
    type Item = CdpEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unsubscribe(&self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&CdpEvent) -> anyhow::Result<()> + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &CdpEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_two_handlers_then_unsubscribe_one() {
        let dispatcher = EventDispatcher::new(8, 8);
        let (a_count, a) = counter();
        let (b_count, b) = counter();

        let a_handle = dispatcher.subscribe("DOM.documentUpdated", a).unwrap();
        dispatcher.subscribe("DOM.documentUpdated", b).unwrap();

        let event = CdpEvent::new("DOM.documentUpdated", json!({}));
        assert_eq!(dispatcher.dispatch(&event), 2);
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);

        assert!(dispatcher.unsubscribe(&a_handle));
        assert!(!dispatcher.unsubscribe(&a_handle));

        assert_eq!(dispatcher.dispatch(&event), 1);
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_handler_does_not_block_siblings() {
        let dispatcher = EventDispatcher::new(8, 8);
        let mut failures = dispatcher.failures();

        dispatcher
            .subscribe("Page.loadEventFired", |_| Err(anyhow::anyhow!("boom")))
            .unwrap();
        dispatcher
            .subscribe("Page.loadEventFired", |_| panic!("handler exploded"))
            .unwrap();
        let (count, c) = counter();
        dispatcher.subscribe("Page.loadEventFired", c).unwrap();

        let invoked = dispatcher.dispatch(&CdpEvent::new("Page.loadEventFired", json!({})));
        assert_eq!(invoked, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let first = failures.try_recv().unwrap();
        assert_eq!(first.event, "Page.loadEventFired");
        assert_eq!(first.error, "boom");
        let second = failures.try_recv().unwrap();
        assert!(second.error.contains("handler exploded"));
        assert!(matches!(Error::from(&second), Error::Handler(_)));
    }

    #[test]
    fn test_wildcard_and_unknown_events() {
        let dispatcher = EventDispatcher::new(8, 8);
        let (all_count, all) = counter();
        dispatcher.subscribe(WILDCARD, all).unwrap();

        dispatcher.dispatch(&CdpEvent::new("Network.requestWillBeSent", json!({})));
        dispatcher.dispatch(&CdpEvent::new("DOM.setChildNodes", json!({})));
        assert_eq!(all_count.load(Ordering::SeqCst), 2);

        let lonely = EventDispatcher::new(8, 8);
        assert_eq!(lonely.dispatch(&CdpEvent::new("Nobody.listens", json!({}))), 0);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new(8, 8));
        let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let (victim_count, v) = counter();

        let d = Arc::clone(&dispatcher);
        let slot = Arc::clone(&victim);
        dispatcher
            .subscribe("Runtime.consoleAPICalled", move |_| {
                if let Some(handle) = slot.lock().unwrap().take() {
                    d.unsubscribe(&handle);
                }
                Ok(())
            })
            .unwrap();
        let handle = dispatcher.subscribe("Runtime.consoleAPICalled", v).unwrap();
        *victim.lock().unwrap() = Some(handle);

        // The first handler removes the second before it runs
        let invoked = dispatcher.dispatch(&CdpEvent::new("Runtime.consoleAPICalled", json!({})));
        assert_eq!(invoked, 1);
        assert_eq!(victim_count.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_event_stream() {
        let dispatcher = Arc::new(EventDispatcher::new(1, 8));
        let mut failures = dispatcher.failures();
        let mut stream = dispatcher.events("DOM.attributeModified").unwrap();

        dispatcher.dispatch(&CdpEvent::new("DOM.attributeModified", json!({ "nodeId": 1 })));
        // Buffer of one: the second event is reported, not queued
        dispatcher.dispatch(&CdpEvent::new("DOM.attributeModified", json!({ "nodeId": 2 })));

        let event = stream.recv().await.unwrap();
        assert_eq!(event.params["nodeId"], 1);
        assert!(failures.try_recv().unwrap().error.contains("buffer full"));

        drop(stream);
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new(4, 4));
        let mut stream = dispatcher.events(WILDCARD).unwrap();

        dispatcher.close();
        assert!(stream.recv().await.is_none());
        assert_eq!(dispatcher.dispatch(&CdpEvent::new("DOM.documentUpdated", json!({}))), 0);
        assert!(matches!(
            dispatcher.subscribe("DOM.documentUpdated", |_| Ok(())),
            Err(Error::ConnectionClosed)
        ));
    }
}
