//! Ducking/Mixing Engine
//!
//! Computes per-stream target volumes from the static `DuckingRule` table and drives timed
//! linear fades toward them. The engine never owns streams: the registry is passed in by
//! reference so all mutation stays on the caller's scheduling context.
//!
//! A stream that is already fading ignores a new duck request. A restore request that lands
//! while the duck fade is still running is deferred until that fade completes, so duck
//! followed by restore always lands back on the pre-duck volume.

use crate::config::{CategoryVolumeTable, MixerConfig};
use crate::error::{AudioError, AudioResult};
use crate::fade::{Fade, FadePurpose};
use crate::registry::AudioStreamRegistry;
use crate::stream::{clamp_volume, AudioCategory, AudioStream, Priority, StreamId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Volumes closer than this count as equal when deciding whether to fade.
const VOLUME_EPSILON: f32 = 1e-6;

/// A fade that finished during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeCompletion {
    pub id: StreamId,
    pub purpose: FadePurpose,
}

pub struct DuckingEngine {
    config: MixerConfig,
    active_triggers: BTreeMap<AudioCategory, Priority>,
}

impl DuckingEngine {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            config,
            active_triggers: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn volumes(&self) -> &CategoryVolumeTable {
        &self.config.volumes
    }

    pub fn is_trigger_active(&self, trigger: AudioCategory) -> bool {
        self.active_triggers.contains_key(&trigger)
    }

    /// Priority a trigger ducks with: the loudest-ranked active stream of its category,
    /// else the configured default for the category.
    pub fn trigger_priority(
        &self,
        registry: &AudioStreamRegistry,
        trigger: AudioCategory,
    ) -> Priority {
        registry
            .highest_priority(trigger)
            .unwrap_or_else(|| self.config.default_priority(trigger))
    }

    /// Duck every lower-priority stream the trigger's rule suppresses. Returns how many
    /// streams started a duck fade.
    pub fn apply_ducking(
        &mut self,
        registry: &mut AudioStreamRegistry,
        trigger: AudioCategory,
        now: Instant,
    ) -> usize {
        let rule = match self.config.rule_for(trigger) {
            Some(rule) => rule.clone(),
            None => {
                debug!(%trigger, "no ducking rule for trigger");
                return 0;
            }
        };
        let priority = self.trigger_priority(registry, trigger);
        self.active_triggers.insert(trigger, priority);

        let mut ducked = 0;
        for stream in registry.iter_mut() {
            if !rule.suppresses(stream.category()) || stream.priority() >= priority {
                continue;
            }
            if stream.is_fading() {
                if stream.restore_pending && stream.ducked_by == Some(trigger) {
                    stream.restore_pending = false;
                }
                trace!(stream = %stream.id(), "already fading; duck ignored");
                continue;
            }
            // A stream already down under another trigger only moves for a stricter rule.
            let pre_duck = stream.pre_duck_volume.unwrap_or_else(|| stream.volume());
            let target = clamp_volume(pre_duck * rule.target_fraction);
            if stream.is_ducked() && target >= stream.volume() - VOLUME_EPSILON {
                trace!(
                    stream = %stream.id(),
                    holder = ?stream.ducked_by,
                    "already ducked at least as far"
                );
                continue;
            }
            stream.pre_duck_volume = Some(pre_duck);
            stream.ducked_by = Some(trigger);
            self.start_fade(stream, target, rule.fade_time(), FadePurpose::Duck(trigger), now);
            ducked += 1;
        }
        debug!(%trigger, %priority, ducked, "ducking applied");
        ducked
    }

    /// Release one trigger: streams it ducked are restored, unless another still-active
    /// trigger also suppresses them. Those move to that trigger's level instead.
    pub fn release(
        &mut self,
        registry: &mut AudioStreamRegistry,
        trigger: AudioCategory,
        now: Instant,
    ) -> usize {
        self.active_triggers.remove(&trigger);
        let mut restored = 0;
        for stream in registry.iter_mut() {
            if stream.ducked_by != Some(trigger) {
                continue;
            }
            if let Some(holder) = self.holding_trigger(stream) {
                trace!(stream = %stream.id(), from = %trigger, to = %holder, "duck handed over");
                stream.ducked_by = Some(holder);
                self.hand_over(stream, trigger, holder, now);
                continue;
            }
            self.begin_restore(stream, now);
            restored += 1;
        }
        debug!(%trigger, restored, "trigger released");
        restored
    }

    /// Restore every ducked stream to its pre-duck volume and forget all triggers.
    pub fn restore(&mut self, registry: &mut AudioStreamRegistry, now: Instant) -> usize {
        self.active_triggers.clear();
        let mut restored = 0;
        for stream in registry.iter_mut().filter(|s| s.is_ducked()) {
            self.begin_restore(stream, now);
            restored += 1;
        }
        debug!(restored, "all streams restored");
        restored
    }

    /// Fade one stream to `target`. Returns `Ok(false)` when the stream is already fading.
    pub fn fade_to(
        &self,
        registry: &mut AudioStreamRegistry,
        id: StreamId,
        target: f32,
        duration: Duration,
        now: Instant,
    ) -> AudioResult<bool> {
        let stream = registry.get_mut(id).ok_or(AudioError::StreamNotFound(id))?;
        if stream.is_fading() {
            return Ok(false);
        }
        self.start_fade(stream, clamp_volume(target), duration, FadePurpose::Manual, now);
        Ok(true)
    }

    /// Advance every running fade by the steps due at `now`.
    pub fn tick(&self, registry: &mut AudioStreamRegistry, now: Instant) -> Vec<FadeCompletion> {
        let mut completed = Vec::new();
        for stream in registry.iter_mut() {
            let (step, done, purpose) = match stream.fade.as_mut() {
                Some(fade) => {
                    let step = fade.advance(now);
                    (step, fade.is_complete(), fade.purpose())
                }
                None => continue,
            };
            if let Some(volume) = step {
                let scale = self.config.volumes.scale(stream.category());
                stream.write_volume(volume, scale);
            }
            if !done {
                continue;
            }
            stream.fade = None;
            match purpose {
                FadePurpose::Restore => {
                    stream.ducked_by = None;
                    stream.pre_duck_volume = None;
                    stream.restore_pending = false;
                }
                _ if stream.restore_pending => {
                    stream.restore_pending = false;
                    self.begin_restore(stream, now);
                }
                FadePurpose::Duck(_) | FadePurpose::Manual => {}
            }
            completed.push(FadeCompletion {
                id: stream.id(),
                purpose,
            });
        }
        completed
    }

    /// Push the current effective volume of one stream to its sound.
    pub fn refresh(&self, registry: &mut AudioStreamRegistry, id: StreamId) {
        if let Some(stream) = registry.get_mut(id) {
            let scale = self.config.volumes.scale(stream.category());
            stream.write_volume(stream.volume(), scale);
        }
    }

    pub fn set_master_volume(&mut self, registry: &mut AudioStreamRegistry, volume: f32) -> f32 {
        let stored = self.config.volumes.set_master(volume);
        for stream in registry.iter_mut() {
            let scale = self.config.volumes.scale(stream.category());
            stream.write_volume(stream.volume(), scale);
        }
        stored
    }

    pub fn set_category_volume(
        &mut self,
        registry: &mut AudioStreamRegistry,
        category: AudioCategory,
        volume: f32,
    ) -> f32 {
        let stored = self.config.volumes.set_base(category, volume);
        let scale = self.config.volumes.scale(category);
        for stream in registry.iter_mut().filter(|s| s.category() == category) {
            stream.write_volume(stream.volume(), scale);
        }
        stored
    }

    /// Strictest other active trigger that suppresses this stream at a higher priority.
    fn holding_trigger(&self, stream: &AudioStream) -> Option<AudioCategory> {
        self.active_triggers
            .iter()
            .filter(|(_, priority)| **priority > stream.priority())
            .filter_map(|(trigger, _)| self.config.rule_for(*trigger))
            .filter(|rule| rule.suppresses(stream.category()))
            .min_by(|a, b| a.target_fraction.total_cmp(&b.target_fraction))
            .map(|rule| rule.trigger)
    }

    /// Move a stream from a released trigger's level to `holder`'s level. Any fade still
    /// running for the released trigger is replaced.
    fn hand_over(
        &self,
        stream: &mut AudioStream,
        released: AudioCategory,
        holder: AudioCategory,
        now: Instant,
    ) {
        let fraction = match self.config.rule_for(holder) {
            Some(rule) => rule.target_fraction,
            None => return,
        };
        let pre_duck = stream.pre_duck_volume.unwrap_or_else(|| stream.volume());
        let target = clamp_volume(pre_duck * fraction);
        stream.restore_pending = false;
        if !stream.is_fading() && (target - stream.volume()).abs() <= VOLUME_EPSILON {
            return;
        }
        let duration = if target > stream.volume() {
            self.config.rule_for(released).map(|r| r.restore_fade_time())
        } else {
            self.config.rule_for(holder).map(|r| r.fade_time())
        };
        let duration = duration.unwrap_or_default();
        self.start_fade(stream, target, duration, FadePurpose::Duck(holder), now);
    }

    fn start_fade(
        &self,
        stream: &mut AudioStream,
        target: f32,
        duration: Duration,
        purpose: FadePurpose,
        now: Instant,
    ) {
        stream.set_target(target);
        stream.fade = Some(Fade::new(
            stream.volume(),
            target,
            duration,
            self.config.fade_tick(),
            self.config.min_fade_steps,
            now,
            purpose,
        ));
    }

    fn begin_restore(&self, stream: &mut AudioStream, now: Instant) {
        if let Some(fade) = stream.fade.as_ref() {
            if fade.purpose() != FadePurpose::Restore {
                stream.restore_pending = true;
                trace!(stream = %stream.id(), "restore deferred until current fade completes");
            }
            return;
        }
        let fade_time = stream
            .ducked_by
            .and_then(|trigger| self.config.rule_for(trigger))
            .map(|rule| rule.restore_fade_time())
            .unwrap_or_default();
        let original = stream.pre_duck_volume.unwrap_or_else(|| stream.volume());
        self.start_fade(stream, original, fade_time, FadePurpose::Restore, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::{MemorySound, MemorySoundMonitor};

    const TOL: f32 = 1e-6;

    fn add(
        registry: &mut AudioStreamRegistry,
        category: AudioCategory,
        priority: u8,
        volume: f32,
    ) -> (StreamId, MemorySoundMonitor) {
        let (sound, monitor) = MemorySound::new();
        let id = registry.register(category, Priority(priority), volume, Box::new(sound));
        (id, monitor)
    }

    fn settle(engine: &DuckingEngine, registry: &mut AudioStreamRegistry, now: Instant) -> Instant {
        let later = now + Duration::from_secs(10);
        engine.tick(registry, later);
        later
    }

    fn volume(registry: &AudioStreamRegistry, id: StreamId) -> f32 {
        registry.get(id).unwrap().volume()
    }

    #[test]
    fn navigation_ducks_lower_priority_music_only() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (nav, _) = add(&mut registry, AudioCategory::Navigation, 5, 1.0);
        let (music, monitor) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Navigation, now), 1);
        settle(&engine, &mut registry, now);

        assert!((volume(&registry, music) - 0.16).abs() < TOL);
        assert!((monitor.volume() - 0.16).abs() < TOL);
        assert!((volume(&registry, nav) - 1.0).abs() < TOL);
        assert!(registry.get(music).unwrap().is_ducked());
    }

    #[test]
    fn higher_priority_streams_are_left_alone() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (music, _) = add(&mut registry, AudioCategory::Music, 9, 0.8);

        let now = Instant::now();
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Navigation, now), 0);
        assert!((volume(&registry, music) - 0.8).abs() < TOL);
    }

    #[test]
    fn duck_on_fading_stream_is_a_noop() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (music, _) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        engine.apply_ducking(&mut registry, AudioCategory::Navigation, now);
        let target_before = registry.get(music).unwrap().target_volume();
        assert!(registry.get(music).unwrap().is_fading());

        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Navigation, now), 0);
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Voice, now), 0);
        let stream = registry.get(music).unwrap();
        assert_eq!(stream.target_volume(), target_before);
        assert_eq!(stream.pre_duck_volume(), Some(0.8));
        assert_eq!(stream.ducked_by(), Some(AudioCategory::Navigation));
    }

    #[test]
    fn duck_then_immediate_restore_returns_pre_duck_volume() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (music, _) = add(&mut registry, AudioCategory::Music, 2, 0.8);
        let (ambient, _) = add(&mut registry, AudioCategory::Ambient, 1, 0.37);

        let now = Instant::now();
        engine.apply_ducking(&mut registry, AudioCategory::Navigation, now);
        assert_eq!(engine.restore(&mut registry, now), 2);

        let later = settle(&engine, &mut registry, now);
        settle(&engine, &mut registry, later);

        for (id, expected) in [(music, 0.8), (ambient, 0.37)] {
            let stream = registry.get(id).unwrap();
            assert!((stream.volume() - expected).abs() < TOL);
            assert!(!stream.is_ducked());
            assert!(!stream.is_fading());
        }
    }

    #[test]
    fn release_hands_over_to_remaining_trigger() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        add(&mut registry, AudioCategory::Navigation, 5, 1.0);
        add(&mut registry, AudioCategory::Voice, 4, 1.0);
        let (music, _) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        engine.apply_ducking(&mut registry, AudioCategory::Navigation, now);
        let now = settle(&engine, &mut registry, now);
        // Music is already below the voice level.
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Voice, now), 0);
        assert_eq!(registry.get(music).unwrap().ducked_by(), Some(AudioCategory::Navigation));

        // The story stream comes back up; music rises only to the voice level.
        assert_eq!(engine.release(&mut registry, AudioCategory::Navigation, now), 1);
        assert_eq!(registry.get(music).unwrap().ducked_by(), Some(AudioCategory::Voice));
        let now = settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.24).abs() < TOL);
        assert_eq!(registry.get(music).unwrap().pre_duck_volume(), Some(0.8));

        engine.release(&mut registry, AudioCategory::Voice, now);
        settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.8).abs() < TOL);
        assert!(!registry.get(music).unwrap().is_ducked());
    }

    #[test]
    fn stricter_trigger_pulls_ducked_stream_further_down() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (story, _) = add(&mut registry, AudioCategory::Voice, 4, 1.0);
        let (music, monitor) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Voice, now), 1);
        let now = settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.24).abs() < TOL);

        // Story narration and music both go down under navigation.
        assert_eq!(engine.apply_ducking(&mut registry, AudioCategory::Navigation, now), 2);
        let now = settle(&engine, &mut registry, now);
        let stream = registry.get(music).unwrap();
        assert!((stream.volume() - 0.16).abs() < TOL);
        assert!((monitor.volume() - 0.16).abs() < TOL);
        assert_eq!(stream.ducked_by(), Some(AudioCategory::Navigation));
        assert_eq!(stream.pre_duck_volume(), Some(0.8));

        // Navigation ends first: back to the story level, not all the way up.
        engine.release(&mut registry, AudioCategory::Navigation, now);
        let now = settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.24).abs() < TOL);
        assert!((volume(&registry, story) - 1.0).abs() < TOL);

        engine.release(&mut registry, AudioCategory::Voice, now);
        settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.8).abs() < TOL);
    }

    #[test]
    fn lenient_trigger_ending_leaves_stricter_duck_in_place() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        add(&mut registry, AudioCategory::Voice, 4, 1.0);
        let (music, _) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        engine.apply_ducking(&mut registry, AudioCategory::Voice, now);
        let now = settle(&engine, &mut registry, now);
        engine.apply_ducking(&mut registry, AudioCategory::Navigation, now);
        let now = settle(&engine, &mut registry, now);

        assert_eq!(engine.release(&mut registry, AudioCategory::Voice, now), 0);
        let now = settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.16).abs() < TOL);

        engine.release(&mut registry, AudioCategory::Navigation, now);
        settle(&engine, &mut registry, now);
        assert!((volume(&registry, music) - 0.8).abs() < TOL);
    }

    #[test]
    fn fade_to_reaches_target_exactly() {
        let mut registry = AudioStreamRegistry::new();
        let engine = DuckingEngine::new(MixerConfig::default());
        let (id, monitor) = add(&mut registry, AudioCategory::Music, 2, 0.1);

        let now = Instant::now();
        assert!(engine
            .fade_to(&mut registry, id, 0.73, Duration::from_millis(250), now)
            .unwrap());
        assert!(!engine
            .fade_to(&mut registry, id, 0.2, Duration::from_millis(250), now)
            .unwrap());
        for ms in (0..=250).step_by(5) {
            engine.tick(&mut registry, now + Duration::from_millis(ms));
        }
        assert!((volume(&registry, id) - 0.73).abs() < TOL);
        assert!(monitor.volume_writes().len() >= 15);
    }

    #[test]
    fn fade_to_unknown_stream_errors() {
        let mut registry = AudioStreamRegistry::new();
        let engine = DuckingEngine::new(MixerConfig::default());
        let result =
            engine.fade_to(&mut registry, StreamId(99), 0.5, Duration::ZERO, Instant::now());
        assert!(matches!(result, Err(AudioError::StreamNotFound(StreamId(99)))));
    }

    #[test]
    fn category_volume_scales_output_not_stream_volume() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (id, monitor) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        engine.set_category_volume(&mut registry, AudioCategory::Music, 0.5);
        assert!((monitor.volume() - 0.4).abs() < TOL);
        engine.set_master_volume(&mut registry, 0.5);
        assert!((monitor.volume() - 0.2).abs() < TOL);
        assert!((volume(&registry, id) - 0.8).abs() < TOL);
    }

    #[test]
    fn fade_on_released_sound_is_silent() {
        let mut registry = AudioStreamRegistry::new();
        let mut engine = DuckingEngine::new(MixerConfig::default());
        let (music, monitor) = add(&mut registry, AudioCategory::Music, 2, 0.8);

        let now = Instant::now();
        engine.apply_ducking(&mut registry, AudioCategory::Navigation, now);
        monitor.release_externally();
        let completed = engine.tick(&mut registry, now + Duration::from_secs(1));
        assert_eq!(completed.len(), 1);
        assert!(monitor.volume_writes().is_empty());
        assert!((volume(&registry, music) - 0.16).abs() < TOL);
    }
}
