//! Outbound event channel.

use tokio::sync::broadcast;

use blockwright_types::BuildEvent;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast channel the executor publishes [`BuildEvent`]s on.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BuildEvent>,
}

impl EventBus {
    /// Bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    /// Bus holding `capacity` unread events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }

    /// Publish `event`. Having no subscribers is not an error.
    pub fn publish(&self, event: BuildEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Build event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
