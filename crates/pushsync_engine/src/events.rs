//! Client notifications.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Something observable happened inside the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingEvent {
    /// Delivery reports reached the server for these messages.
    DeliveryReportSent {
        /// Reported message ids.
        message_ids: Vec<String>,
    },
    /// The server assigned or confirmed the installation id.
    RegistrationUpdated {
        /// Internal registration id.
        internal_id: String,
    },
    /// Seen status reached the server for these messages.
    SeenReported {
        /// Message ids.
        message_ids: Vec<String>,
    },
    /// Mobile-originated messages were accepted by the server.
    MoMessagesSent {
        /// Message ids.
        message_ids: Vec<String>,
    },
}

/// Fan-out of [`MessagingEvent`]s to any number of subscribers.
///
/// Publishing never blocks; slow subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MessagingEvent>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Returns a new subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<MessagingEvent> {
        self.sender.subscribe()
    }

    /// Sends `event` to current subscribers.
    pub fn publish(&self, event: MessagingEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(MessagingEvent::DeliveryReportSent {
            message_ids: vec!["m1".into()],
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            MessagingEvent::DeliveryReportSent {
                message_ids: vec!["m1".into()]
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish(MessagingEvent::RegistrationUpdated {
            internal_id: "inst".into(),
        });
    }
}
