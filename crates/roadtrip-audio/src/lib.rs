//! # Road Trip Audio - Stream Registry, Ducking Mixer and Playback Orchestration
//!
//! Every sound the companion makes (music, narration, turn-by-turn instructions, ambient
//! beds, effects) is a registered stream. Semantic triggers duck lower-priority streams
//! with timed fades and restore them afterwards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Audio Runtime (one tokio task)               │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────┐   │
//! │  │ AudioHandle  │→ │  Orchestration   │→ │   Ducking    │   │
//! │  │  (commands)  │  │ (trigger states) │  │   Engine     │   │
//! │  └──────────────┘  └──────────────────┘  └──────────────┘   │
//! │         ↑                   ↓                    ↓           │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────┐   │
//! │  │  EventBus    │← │ Stream Registry  │← │ Fades (tick) │   │
//! │  │ (broadcast)  │  │  (owns sounds)   │  │  20ms steps  │   │
//! │  └──────────────┘  └──────────────────┘  └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod fade;
pub mod mixer;
pub mod orchestration;
pub mod registry;
pub mod runtime;
pub mod sound;
pub mod stream;
pub mod tts;

pub use config::{CategoryVolumeTable, DuckingRule, MixerConfig, PriorityMode};
pub use error::{AudioError, AudioResult};
pub use events::{AudioEvent, EventBus};
pub use fade::{Fade, FadePurpose};
pub use mixer::{DuckingEngine, FadeCompletion};
pub use orchestration::{AudioOrchestrationService, DuckState, TriggerKind};
pub use registry::AudioStreamRegistry;
pub use runtime::{spawn, AudioHandle};
pub use sound::{HeadlessBackend, MemorySound, MemorySoundMonitor, PlaybackBackend, SoundHandle};
#[cfg(feature = "playback")]
pub use sound::{RodioBackend, RodioSound};
pub use stream::{AudioCategory, AudioStream, Priority, StreamId, StreamSnapshot};
pub use tts::{
    estimate_speech_duration, OpenAiTts, PlaceholderTts, SynthesizedAudio, TtsBackend, VoiceProfile,
};
