use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, InstructorId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-instructor change feed. Every committed week write and booking change is
/// published here; delivery to email/SMS/push lives in whatever subscribes.
pub struct NotifyHub {
    channels: DashMap<InstructorId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, instructor_id: InstructorId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(instructor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let instructor_id = event.instructor_id();
        let Some(sender) = self.channels.get(&instructor_id).map(|s| s.clone()) else {
            return;
        };
        if sender.send(event.clone()).is_err() {
            // Every receiver is gone.
            self.channels
                .remove_if(&instructor_id, |_, s| s.receiver_count() == 0);
        }
    }

    pub fn subscriber_channels(&self) -> usize {
        self.channels.len()
    }
}
