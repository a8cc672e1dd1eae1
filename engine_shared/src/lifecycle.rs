//! Lifecycle & connection events.
//!
//! Connection lifecycle observers are registered against the client handler
//! (or server session registry); notifications are enqueued from I/O tasks
//! and executed exclusively by the game thread's poll step, ahead of message
//! dispatch.

use tokio::sync::mpsc;

use crate::wire::ClientId;

/// A connection lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected { client_id: ClientId },
    Disconnected { client_id: ClientId, reason: Option<String> },
}

/// Producer half, held by I/O tasks.
pub type LifecycleSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Consumer half, drained once per frame by the game thread's poll step.
pub struct LifecycleQueue {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl LifecycleQueue {
    pub fn channel() -> (LifecycleSender, LifecycleQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, LifecycleQueue { rx })
    }

    /// Drains every pending lifecycle event without blocking.
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_events_in_order() {
        let (tx, mut queue) = LifecycleQueue::channel();
        tx.send(ConnectionEvent::Connected { client_id: ClientId(1) }).unwrap();
        tx.send(ConnectionEvent::Disconnected { client_id: ClientId(1), reason: None }).unwrap();

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ConnectionEvent::Connected { client_id: ClientId(1) });
    }

    #[test]
    fn drain_on_empty_queue_is_empty_not_blocking() {
        let (_tx, mut queue) = LifecycleQueue::channel();
        assert!(queue.drain().is_empty());
    }
}
