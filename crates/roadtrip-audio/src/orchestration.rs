//! Audio Orchestration Service
//!
//! Ties semantic playback events (a navigation instruction starts, a story begins) to the
//! Ducking/Mixing Engine. Each trigger kind runs its own state machine:
//!
//! ```text
//!   Idle ──start──▶ Ducking ──fades done──▶ Ducked
//!    ▲                 │                      │
//!    │                 └────────end───────────┤
//!    │                                        ▼
//!    └──────────nothing left ducked────── Restoring
//! ```
//!
//! The service owns the registry and the engine and is driven from a single task
//! (see `runtime`), so every volume write for a stream happens in order.

use crate::config::{MixerConfig, PriorityMode};
use crate::error::AudioResult;
use crate::events::{AudioEvent, EventBus};
use crate::fade::FadePurpose;
use crate::mixer::DuckingEngine;
use crate::registry::AudioStreamRegistry;
use crate::sound::SoundHandle;
use crate::stream::{AudioCategory, Priority, StreamId, StreamSnapshot};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Semantic event that ducks other audio while it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    NavigationInstruction,
    StoryPlayback,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 2] = [
        TriggerKind::NavigationInstruction,
        TriggerKind::StoryPlayback,
    ];

    /// Category whose ducking rule the trigger applies.
    pub fn category(&self) -> AudioCategory {
        match self {
            TriggerKind::NavigationInstruction => AudioCategory::Navigation,
            TriggerKind::StoryPlayback => AudioCategory::Voice,
        }
    }

    pub fn for_category(category: AudioCategory) -> Option<TriggerKind> {
        match category {
            AudioCategory::Navigation => Some(TriggerKind::NavigationInstruction),
            AudioCategory::Voice => Some(TriggerKind::StoryPlayback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuckState {
    #[default]
    Idle,
    Ducking,
    Ducked,
    Restoring,
}

pub struct AudioOrchestrationService {
    registry: AudioStreamRegistry,
    mixer: DuckingEngine,
    events: EventBus,
    navigation: DuckState,
    story: DuckState,
    paused_for_navigation: Vec<StreamId>,
}

impl AudioOrchestrationService {
    pub fn new(config: MixerConfig) -> AudioResult<Self> {
        Self::with_events(config, EventBus::new())
    }

    pub fn with_events(config: MixerConfig, events: EventBus) -> AudioResult<Self> {
        config.validate()?;
        info!(
            "🎚️ Audio orchestration ready ({:?} priority mode, {} ducking rules)",
            config.priority_mode,
            config.ducking_rules.len()
        );
        Ok(Self {
            registry: AudioStreamRegistry::new(),
            mixer: DuckingEngine::new(config),
            events,
            navigation: DuckState::Idle,
            story: DuckState::Idle,
            paused_for_navigation: Vec::new(),
        })
    }

    pub fn registry(&self) -> &AudioStreamRegistry {
        &self.registry
    }

    pub fn mixer(&self) -> &DuckingEngine {
        &self.mixer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, trigger: TriggerKind) -> DuckState {
        match trigger {
            TriggerKind::NavigationInstruction => self.navigation,
            TriggerKind::StoryPlayback => self.story,
        }
    }

    pub fn snapshot(&self, id: StreamId) -> Option<StreamSnapshot> {
        self.registry.get(id).map(|s| s.snapshot())
    }

    pub fn snapshots(&self) -> Vec<StreamSnapshot> {
        self.registry.iter().map(|s| s.snapshot()).collect()
    }

    /// Register a stream and start its trigger, if its category has one. A stream that starts
    /// under an already-active trigger is ducked (or paused) right away.
    pub fn start_stream(
        &mut self,
        category: AudioCategory,
        priority: Priority,
        volume: f32,
        sound: Box<dyn SoundHandle>,
        now: Instant,
    ) -> StreamId {
        let id = self.registry.register(category, priority, volume, sound);
        self.mixer.refresh(&mut self.registry, id);
        self.events.publish(AudioEvent::StreamStarted { id, category, priority });
        info!(stream = %id, %category, %priority, "▶️ stream started");

        let own_trigger = TriggerKind::for_category(category);
        let mut active: Vec<TriggerKind> = TriggerKind::ALL
            .into_iter()
            .filter(|t| Some(*t) != own_trigger && self.is_active(*t))
            .collect();
        // Strictest first; a laxer trigger never raises a ducked stream.
        active.sort_by(|a, b| self.duck_fraction(*a).total_cmp(&self.duck_fraction(*b)));
        for trigger in active {
            self.mixer.apply_ducking(&mut self.registry, trigger.category(), now);
            if trigger == TriggerKind::NavigationInstruction {
                self.pause_story_for_navigation();
            }
        }
        if let Some(trigger) = own_trigger {
            self.begin(trigger, now);
        }
        id
    }

    /// Stop a stream. Its fade is cancelled before the sound is released.
    ///
    /// Ends the category's trigger when this was its last stream.
    pub fn stop_stream(&mut self, id: StreamId, now: Instant) -> bool {
        let category = match self.registry.get(id) {
            Some(stream) => stream.category(),
            None => return false,
        };
        self.registry.unregister(id);
        self.paused_for_navigation.retain(|paused| *paused != id);
        self.events.publish(AudioEvent::StreamStopped { id, category });
        info!(stream = %id, %category, "⏹️ stream stopped");

        if let Some(trigger) = TriggerKind::for_category(category) {
            if self.registry.ids_in(category).is_empty() {
                self.end(trigger, now);
            }
        }
        true
    }

    pub fn stop_all(&mut self, now: Instant) {
        for id in self.registry.ids() {
            self.stop_stream(id, now);
        }
    }

    pub fn on_navigation_instruction_start(&mut self, now: Instant) {
        self.begin(TriggerKind::NavigationInstruction, now);
    }

    pub fn on_navigation_instruction_end(&mut self, now: Instant) {
        self.end(TriggerKind::NavigationInstruction, now);
    }

    pub fn on_story_playback_start(&mut self, now: Instant) {
        self.begin(TriggerKind::StoryPlayback, now);
    }

    pub fn on_story_playback_end(&mut self, now: Instant) {
        self.end(TriggerKind::StoryPlayback, now);
    }

    /// Un-duck everything, resume paused narration and move every active trigger to Restoring.
    pub fn restore_all(&mut self, now: Instant) {
        self.mixer.restore(&mut self.registry, now);
        self.resume_paused_story();
        for trigger in TriggerKind::ALL {
            if self.is_active(trigger) {
                self.set_state(trigger, DuckState::Restoring);
            }
        }
        self.advance_states();
    }

    /// Returns false when the stream is already fading.
    pub fn fade_stream(
        &mut self,
        id: StreamId,
        target: f32,
        duration: Duration,
        now: Instant,
    ) -> AudioResult<bool> {
        self.mixer.fade_to(&mut self.registry, id, target, duration, now)
    }

    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.mixer.set_master_volume(&mut self.registry, volume)
    }

    pub fn set_category_volume(&mut self, category: AudioCategory, volume: f32) -> f32 {
        self.mixer.set_category_volume(&mut self.registry, category, volume)
    }

    /// One timer step: advance fades, reap finished sounds, advance state machines.
    pub fn tick(&mut self, now: Instant) {
        for completion in self.mixer.tick(&mut self.registry, now) {
            if let Some(stream) = self.registry.get(completion.id) {
                self.events.publish(AudioEvent::PlaybackStatusUpdate {
                    id: stream.id(),
                    playing: stream.is_playing(),
                    ducked: stream.is_ducked(),
                    volume: stream.volume(),
                });
            }
        }

        let finished: Vec<StreamId> = self
            .registry
            .iter()
            .filter(|s| s.is_finished())
            .map(|s| s.id())
            .collect();
        for id in finished {
            debug!(stream = %id, "playback finished");
            self.stop_stream(id, now);
        }

        self.advance_states();
    }

    fn duck_fraction(&self, trigger: TriggerKind) -> f32 {
        self.mixer
            .config()
            .rule_for(trigger.category())
            .map(|rule| rule.target_fraction)
            .unwrap_or(1.0)
    }

    fn is_active(&self, trigger: TriggerKind) -> bool {
        matches!(self.state(trigger), DuckState::Ducking | DuckState::Ducked)
    }

    fn begin(&mut self, trigger: TriggerKind, now: Instant) {
        if self.is_active(trigger) {
            trace!(?trigger, "trigger already active");
            return;
        }
        self.set_state(trigger, DuckState::Ducking);
        self.mixer.apply_ducking(&mut self.registry, trigger.category(), now);
        if trigger == TriggerKind::NavigationInstruction {
            self.pause_story_for_navigation();
        }
        self.advance_states();
    }

    fn end(&mut self, trigger: TriggerKind, now: Instant) {
        if !self.is_active(trigger) {
            trace!(?trigger, "trigger not active");
            return;
        }
        self.set_state(trigger, DuckState::Restoring);
        self.mixer.release(&mut self.registry, trigger.category(), now);
        if trigger == TriggerKind::NavigationInstruction {
            self.resume_paused_story();
        }
        self.advance_states();
    }

    fn pause_story_for_navigation(&mut self) {
        if self.mixer.config().priority_mode != PriorityMode::Navigation {
            return;
        }
        let nav_priority = self
            .mixer
            .trigger_priority(&self.registry, AudioCategory::Navigation);
        for stream in self.registry.iter_mut() {
            if stream.category() != AudioCategory::Voice
                || stream.priority() >= nav_priority
                || !stream.is_playing()
            {
                continue;
            }
            stream.pause();
            stream.paused_by = Some(AudioCategory::Navigation);
            self.paused_for_navigation.push(stream.id());
            self.events.publish(AudioEvent::PlaybackStatusUpdate {
                id: stream.id(),
                playing: false,
                ducked: stream.is_ducked(),
                volume: stream.volume(),
            });
            debug!(stream = %stream.id(), "⏸️ story paused for navigation");
        }
    }

    fn resume_paused_story(&mut self) {
        for id in std::mem::take(&mut self.paused_for_navigation) {
            // Gone streams were stopped by the user in the meantime.
            if let Some(stream) = self.registry.get_mut(id) {
                stream.resume();
                stream.paused_by = None;
                self.events.publish(AudioEvent::PlaybackStatusUpdate {
                    id,
                    playing: true,
                    ducked: stream.is_ducked(),
                    volume: stream.volume(),
                });
                debug!(stream = %id, "story resumed");
            }
        }
    }

    fn advance_states(&mut self) {
        for trigger in TriggerKind::ALL {
            let category = trigger.category();
            let next = match self.state(trigger) {
                DuckState::Ducking => {
                    let still_fading = self
                        .registry
                        .iter()
                        .any(|s| s.fade_purpose() == Some(FadePurpose::Duck(category)));
                    (!still_fading).then_some(DuckState::Ducked)
                }
                DuckState::Restoring => {
                    let still_held = self
                        .registry
                        .iter()
                        .any(|s| s.ducked_by() == Some(category));
                    (!still_held).then_some(DuckState::Idle)
                }
                DuckState::Idle | DuckState::Ducked => None,
            };
            if let Some(state) = next {
                self.set_state(trigger, state);
            }
        }
    }

    fn set_state(&mut self, trigger: TriggerKind, state: DuckState) {
        let slot = match trigger {
            TriggerKind::NavigationInstruction => &mut self.navigation,
            TriggerKind::StoryPlayback => &mut self.story,
        };
        if *slot == state {
            return;
        }
        debug!(?trigger, from = ?*slot, to = ?state, "trigger state changed");
        *slot = state;
        self.events
            .publish(AudioEvent::TriggerStateChanged { trigger, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::MemorySound;

    fn service(mode: PriorityMode) -> AudioOrchestrationService {
        AudioOrchestrationService::new(MixerConfig {
            priority_mode: mode,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn navigation_cycle_walks_every_state() {
        let mut svc = service(PriorityMode::Navigation);
        let (music, _) = MemorySound::new();
        let now = Instant::now();
        svc.start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music), now);

        svc.on_navigation_instruction_start(now);
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Ducking);

        let now = now + Duration::from_secs(1);
        svc.tick(now);
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Ducked);

        svc.on_navigation_instruction_end(now);
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Restoring);

        svc.tick(now + Duration::from_secs(1));
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Idle);
    }

    #[test]
    fn start_without_anything_to_duck_settles_immediately() {
        let mut svc = service(PriorityMode::Navigation);
        svc.on_navigation_instruction_start(Instant::now());
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Ducked);
        svc.on_navigation_instruction_end(Instant::now());
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Idle);
    }

    #[test]
    fn navigation_mode_pauses_and_resumes_story() {
        let mut svc = service(PriorityMode::Navigation);
        let (story, monitor) = MemorySound::new();
        let now = Instant::now();
        let id = svc.start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story), now);

        svc.on_navigation_instruction_start(now);
        assert!(monitor.is_paused());
        assert!(!svc.snapshot(id).unwrap().playing);

        svc.on_navigation_instruction_end(now + Duration::from_secs(1));
        assert!(!monitor.is_paused());
        assert!(svc.snapshot(id).unwrap().playing);
    }

    #[test]
    fn balanced_mode_only_ducks_story() {
        let mut svc = service(PriorityMode::Balanced);
        let (story, monitor) = MemorySound::new();
        let now = Instant::now();
        let id = svc.start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story), now);

        svc.on_navigation_instruction_start(now);
        assert!(!monitor.is_paused());
        svc.tick(now + Duration::from_secs(1));
        let snap = svc.snapshot(id).unwrap();
        assert!(snap.ducked);
        assert!((snap.volume - 0.2).abs() < 1e-6);
    }

    #[test]
    fn stream_started_under_both_triggers_takes_the_stricter_level() {
        let mut svc = service(PriorityMode::Balanced);
        let now = Instant::now();
        svc.on_story_playback_start(now);
        svc.on_navigation_instruction_start(now);

        let (music, monitor) = MemorySound::new();
        let id = svc.start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music), now);
        let now = now + Duration::from_secs(1);
        svc.tick(now);
        assert!((svc.snapshot(id).unwrap().volume - 0.16).abs() < 1e-6);
        assert!((monitor.volume() - 0.16).abs() < 1e-6);

        svc.on_navigation_instruction_end(now);
        let now = now + Duration::from_secs(1);
        svc.tick(now);
        assert!((svc.snapshot(id).unwrap().volume - 0.24).abs() < 1e-6);
        assert_eq!(svc.state(TriggerKind::NavigationInstruction), DuckState::Idle);
        assert_eq!(svc.state(TriggerKind::StoryPlayback), DuckState::Ducked);
    }

    #[test]
    fn voice_stream_starts_story_trigger_and_stop_ends_it() {
        let mut svc = service(PriorityMode::Navigation);
        let (music, _) = MemorySound::new();
        let (voice, _) = MemorySound::new();
        let now = Instant::now();
        let music_id =
            svc.start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music), now);
        let voice = Box::new(voice);
        let voice_id = svc.start_stream(AudioCategory::Voice, Priority::HIGHEST, 1.0, voice, now);
        assert_eq!(svc.state(TriggerKind::StoryPlayback), DuckState::Ducking);

        let now = now + Duration::from_secs(1);
        svc.tick(now);
        assert!((svc.snapshot(music_id).unwrap().volume - 0.24).abs() < 1e-6);

        assert!(svc.stop_stream(voice_id, now));
        assert_eq!(svc.state(TriggerKind::StoryPlayback), DuckState::Restoring);
        svc.tick(now + Duration::from_secs(2));
        assert!((svc.snapshot(music_id).unwrap().volume - 0.8).abs() < 1e-6);
        assert_eq!(svc.state(TriggerKind::StoryPlayback), DuckState::Idle);
    }

    #[test]
    fn finished_sounds_are_reaped_on_tick() {
        let mut svc = service(PriorityMode::Navigation);
        let (sound, monitor) = MemorySound::new();
        let mut events = svc.subscribe();
        let now = Instant::now();
        let id = svc.start_stream(AudioCategory::Effect, Priority(3), 1.0, Box::new(sound), now);
        monitor.finish();
        svc.tick(now);
        assert!(svc.snapshot(id).is_none());
        assert!(monitor.is_released());

        let mut saw_stop = false;
        while let Ok(event) = events.try_recv() {
            if event == (AudioEvent::StreamStopped { id, category: AudioCategory::Effect }) {
                saw_stop = true;
            }
        }
        assert!(saw_stop);
    }

    #[test]
    fn stop_cancels_inflight_fade() {
        let mut svc = service(PriorityMode::Navigation);
        let (music, monitor) = MemorySound::new();
        let now = Instant::now();
        let id = svc.start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music), now);
        svc.on_navigation_instruction_start(now);
        assert!(svc.snapshot(id).unwrap().fading);

        let writes_before = monitor.volume_writes().len();
        assert!(svc.stop_stream(id, now));
        svc.tick(now + Duration::from_secs(1));
        assert_eq!(monitor.volume_writes().len(), writes_before);
        assert_eq!(monitor.release_count(), 1);
        assert!(!svc.stop_stream(id, now));
    }
}
