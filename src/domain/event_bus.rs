//! Broadcast channel for appointment events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Services
//! publish after a transition is persisted; view-layer subscribers
//! re-fetch on receipt.

use tokio::sync::broadcast;

use super::AppointmentEvent;

/// Broadcast bus for [`AppointmentEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppointmentEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event; zero
    /// when nobody is listening.
    pub fn publish(&self, event: AppointmentEvent) -> usize {
        tracing::debug!(
            appointment_id = %event.appointment_id(),
            event_type = event.event_type_str(),
            "publishing appointment event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
