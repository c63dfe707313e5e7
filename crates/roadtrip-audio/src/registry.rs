//! Audio Stream Registry: the single owner of every active stream and its sound.

use crate::sound::SoundHandle;
use crate::stream::{AudioCategory, AudioStream, Priority, StreamId};
use std::collections::BTreeMap;
use tracing::debug;

/// Tracks active streams. Ids are never reused, so each id maps to at most one sound.
#[derive(Debug, Default)]
pub struct AudioStreamRegistry {
    streams: BTreeMap<StreamId, AudioStream>,
    next_id: u64,
}

impl AudioStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream. `initial_volume` is clamped into [0, 1].
    pub fn register(
        &mut self,
        category: AudioCategory,
        priority: Priority,
        initial_volume: f32,
        sound: Box<dyn SoundHandle>,
    ) -> StreamId {
        self.next_id += 1;
        let id = StreamId(self.next_id);
        let stream = AudioStream::new(id, category, priority, initial_volume, sound);
        debug!(stream = %id, %category, %priority, volume = stream.volume(), "stream registered");
        self.streams.insert(id, stream);
        id
    }

    /// Release the stream's sound, then drop the entry. Returns false for unknown ids.
    pub fn unregister(&mut self, id: StreamId) -> bool {
        match self.streams.get_mut(&id) {
            Some(stream) => {
                stream.release();
                self.streams.remove(&id);
                debug!(stream = %id, "stream unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: StreamId) -> Option<&AudioStream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut AudioStream> {
        self.streams.get_mut(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Streams in id (registration) order.
    pub fn iter(&self) -> impl Iterator<Item = &AudioStream> {
        self.streams.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AudioStream> {
        self.streams.values_mut()
    }

    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    pub fn ids_in(&self, category: AudioCategory) -> Vec<StreamId> {
        self.streams
            .values()
            .filter(|s| s.category() == category)
            .map(AudioStream::id)
            .collect()
    }

    /// Highest priority among streams of `category`, if any are registered.
    pub fn highest_priority(&self, category: AudioCategory) -> Option<Priority> {
        self.streams
            .values()
            .filter(|s| s.category() == category)
            .map(AudioStream::priority)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::MemorySound;

    #[test]
    fn register_assigns_unique_ids() {
        let mut registry = AudioStreamRegistry::new();
        let (a, _) = MemorySound::new();
        let (b, _) = MemorySound::new();
        let first = registry.register(AudioCategory::Music, Priority(2), 0.8, Box::new(a));
        let second = registry.register(AudioCategory::Music, Priority(2), 0.8, Box::new(b));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids_in(AudioCategory::Music), vec![first, second]);
    }

    #[test]
    fn unregister_releases_before_removal() {
        let mut registry = AudioStreamRegistry::new();
        let (sound, monitor) = MemorySound::new();
        let id = registry.register(AudioCategory::Ambient, Priority(1), 0.4, Box::new(sound));
        assert!(registry.unregister(id));
        assert!(monitor.is_released());
        assert_eq!(monitor.release_count(), 1);
        assert!(registry.get(id).is_none());
        assert!(!registry.unregister(id));
    }

    #[test]
    fn unregister_after_external_release_still_cleans_up() {
        let mut registry = AudioStreamRegistry::new();
        let (sound, monitor) = MemorySound::new();
        let id = registry.register(AudioCategory::Voice, Priority(4), 1.0, Box::new(sound));
        monitor.release_externally();
        assert!(registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn initial_volume_is_clamped() {
        let mut registry = AudioStreamRegistry::new();
        let (sound, _) = MemorySound::new();
        let id = registry.register(AudioCategory::Effect, Priority(3), 1.7, Box::new(sound));
        assert_eq!(registry.get(id).unwrap().volume(), 1.0);
    }

    #[test]
    fn highest_priority_per_category() {
        let mut registry = AudioStreamRegistry::new();
        let (a, _) = MemorySound::new();
        let (b, _) = MemorySound::new();
        registry.register(AudioCategory::Navigation, Priority(5), 1.0, Box::new(a));
        registry.register(AudioCategory::Navigation, Priority(7), 1.0, Box::new(b));
        assert_eq!(registry.highest_priority(AudioCategory::Navigation), Some(Priority(7)));
        assert_eq!(registry.highest_priority(AudioCategory::Music), None);
    }
}
