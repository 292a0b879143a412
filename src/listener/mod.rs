//! Fire-and-forget notification bus for receiver lifecycle events (spec
//! §4.E): a fixed set of subscribers is told when a receiver starts,
//! errors, or stops, with no acknowledgement and no effect on the
//! tracker/supervisor's own state machines.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::StreamId;

/// A single lifecycle notification, delivered to every registered
/// [`ReceiverStateListener`] in registration order.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    ReceiverStarted { stream_id: StreamId, name: String },
    ReceiverError { stream_id: StreamId, message: String },
    ReceiverStopped { stream_id: StreamId, reason: Option<String> },
}

/// Implemented by diagnostics/metrics subscribers. A panic or slow
/// implementation here must never be allowed to block block ingestion;
/// [`ListenerBus`] dispatches each event to each listener independently.
#[async_trait]
pub trait ReceiverStateListener: Send + Sync {
    async fn on_event(&self, event: ListenerEvent);
}

/// Holds the fixed set of listeners registered at tracker startup and
/// fans out every event to all of them, logging (not propagating) any
/// listener that is slow or fails.
#[derive(Default, Clone)]
pub struct ListenerBus {
    listeners: Arc<Vec<Arc<dyn ReceiverStateListener>>>,
}

impl ListenerBus {
    pub fn new(listeners: Vec<Arc<dyn ReceiverStateListener>>) -> Self {
        Self { listeners: Arc::new(listeners) }
    }

    /// Dispatches `event` to every registered listener concurrently. This
    /// is genuinely fire-and-forget: callers do not await completion of
    /// individual listeners failing or running long.
    pub fn notify(&self, event: ListenerEvent) {
        for listener in self.listeners.iter().cloned() {
            let event = event.clone();
            tokio::spawn(async move {
                listener.on_event(event).await;
            });
        }
    }
}

/// A listener that appends every event to an in-memory log, used by
/// tracker tests to assert on emitted notifications without a real
/// metrics sink.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingListener {
        pub events: Mutex<Vec<ListenerEvent>>,
    }

    #[async_trait]
    impl ReceiverStateListener for RecordingListener {
        async fn on_event(&self, event: ListenerEvent) {
            self.events.lock().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingListener;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn notifies_every_registered_listener() {
        let a = Arc::new(RecordingListener::default());
        let b = Arc::new(RecordingListener::default());
        let bus = ListenerBus::new(vec![a.clone(), b.clone()]);

        bus.notify(ListenerEvent::ReceiverStarted { stream_id: 0, name: "x".to_string() });
        // notify() detaches onto spawned tasks; give them a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(a.events.lock().len(), 1);
        assert_eq!(b.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn empty_bus_is_a_no_op() {
        let bus = ListenerBus::default();
        bus.notify(ListenerEvent::ReceiverStopped { stream_id: 0, reason: None });
    }
}
