//! Typed playback notifications, published on a broadcast bus.

use crate::orchestration::{DuckState, TriggerKind};
use crate::stream::{AudioCategory, Priority, StreamId};
use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CAPACITY: usize = 256;

/// Events emitted by the audio orchestration layer
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    StreamStarted {
        id: StreamId,
        category: AudioCategory,
        priority: Priority,
    },

    StreamStopped {
        id: StreamId,
        category: AudioCategory,
    },

    /// Playing/ducked state or volume of a stream changed.
    PlaybackStatusUpdate {
        id: StreamId,
        playing: bool,
        ducked: bool,
        volume: f32,
    },

    TriggerStateChanged {
        trigger: TriggerKind,
        state: DuckState,
    },
}

/// Publish/subscribe fan-out of `AudioEvent`s. Publishing with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AudioEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: AudioEvent) {
        if self.tx.send(event).is_err() {
            trace!("audio event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(AudioEvent::StreamStopped {
            id: StreamId(3),
            category: AudioCategory::Music,
        });
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, AudioEvent::StreamStopped { id: StreamId(3), .. }));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(AudioEvent::TriggerStateChanged {
            trigger: TriggerKind::NavigationInstruction,
            state: DuckState::Ducking,
        });
    }
}
