//! Audio streams: one active playback instance tracked by category, priority and volume.

use crate::error::{AudioError, AudioResult};
use crate::fade::{Fade, FadePurpose};
use crate::sound::SoundHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{trace, warn};

/// Identifier of a registered stream. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// What a stream carries. Drives ducking rules and per-category base volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCategory {
    /// Spoken narration and assistant replies (story playback).
    Voice,
    Music,
    /// Turn-by-turn instructions.
    Navigation,
    Ambient,
    Effect,
}

impl AudioCategory {
    pub const ALL: [AudioCategory; 5] = [
        AudioCategory::Voice,
        AudioCategory::Music,
        AudioCategory::Navigation,
        AudioCategory::Ambient,
        AudioCategory::Effect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCategory::Voice => "voice",
            AudioCategory::Music => "music",
            AudioCategory::Navigation => "navigation",
            AudioCategory::Ambient => "ambient",
            AudioCategory::Effect => "effect",
        }
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCategory {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voice" | "story" | "narration" => Ok(AudioCategory::Voice),
            "music" => Ok(AudioCategory::Music),
            "navigation" | "nav" => Ok(AudioCategory::Navigation),
            "ambient" => Ok(AudioCategory::Ambient),
            "effect" | "effects" => Ok(AudioCategory::Effect),
            other => Err(AudioError::Config(format!("unknown audio category: {}", other))),
        }
    }
}

/// Ordinal playback priority. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const LOWEST: Priority = Priority(0);
    pub const HIGHEST: Priority = Priority(u8::MAX);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Clamp a volume into [0, 1]. NaN collapses to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Owns the underlying sound for exactly one stream and releases it exactly once,
/// either explicitly on unregister or when dropped.
pub(crate) struct ActiveSound {
    id: StreamId,
    handle: Box<dyn SoundHandle>,
    released: bool,
}

impl ActiveSound {
    pub(crate) fn new(id: StreamId, handle: Box<dyn SoundHandle>) -> Self {
        Self {
            id,
            handle,
            released: false,
        }
    }

    fn guard(&self) -> AudioResult<()> {
        if self.released || self.handle.is_released() {
            Err(AudioError::StreamNotFound(self.id))
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f32) -> AudioResult<()> {
        self.guard()?;
        self.handle.set_volume(volume)
    }

    pub(crate) fn pause(&mut self) -> AudioResult<()> {
        self.guard()?;
        self.handle.pause()
    }

    pub(crate) fn resume(&mut self) -> AudioResult<()> {
        self.guard()?;
        self.handle.resume()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.released || self.handle.is_finished()
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.handle.release();
            trace!(stream = %self.id, "sound released");
        }
    }
}

impl Drop for ActiveSound {
    fn drop(&mut self) {
        self.release();
    }
}

/// A single active playback instance.
pub struct AudioStream {
    id: StreamId,
    category: AudioCategory,
    priority: Priority,
    volume: f32,
    target_volume: f32,
    playing: bool,
    pub(crate) ducked_by: Option<AudioCategory>,
    pub(crate) pre_duck_volume: Option<f32>,
    pub(crate) paused_by: Option<AudioCategory>,
    pub(crate) fade: Option<Fade>,
    pub(crate) restore_pending: bool,
    sound: ActiveSound,
}

impl AudioStream {
    pub(crate) fn new(
        id: StreamId,
        category: AudioCategory,
        priority: Priority,
        volume: f32,
        handle: Box<dyn SoundHandle>,
    ) -> Self {
        let volume = clamp_volume(volume);
        Self {
            id,
            category,
            priority,
            volume,
            target_volume: volume,
            playing: true,
            ducked_by: None,
            pre_duck_volume: None,
            paused_by: None,
            fade: None,
            restore_pending: false,
            sound: ActiveSound::new(id, handle),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn category(&self) -> AudioCategory {
        self.category
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Current stream volume, before category and master scaling.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Volume the stream is heading to (equals `volume` when not fading).
    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_ducked(&self) -> bool {
        self.ducked_by.is_some()
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Trigger category that currently holds this stream ducked.
    pub fn ducked_by(&self) -> Option<AudioCategory> {
        self.ducked_by
    }

    pub fn pre_duck_volume(&self) -> Option<f32> {
        self.pre_duck_volume
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            id: self.id,
            category: self.category,
            priority: self.priority,
            volume: self.volume,
            target_volume: self.target_volume,
            playing: self.playing,
            ducked: self.is_ducked(),
            fading: self.is_fading(),
        }
    }

    pub(crate) fn fade_purpose(&self) -> Option<FadePurpose> {
        self.fade.as_ref().map(Fade::purpose)
    }

    pub(crate) fn set_target(&mut self, target: f32) {
        self.target_volume = clamp_volume(target);
    }

    /// Write a new stream volume and push `volume * scale` to the sound.
    /// A released sound is dropped silently.
    pub(crate) fn write_volume(&mut self, volume: f32, scale: f32) {
        self.volume = clamp_volume(volume);
        let effective = clamp_volume(self.volume * scale);
        self.push(|sound| sound.set_volume(effective), "set_volume");
    }

    pub(crate) fn pause(&mut self) {
        self.playing = false;
        self.push(ActiveSound::pause, "pause");
    }

    pub(crate) fn resume(&mut self) {
        self.playing = true;
        self.push(ActiveSound::resume, "resume");
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.sound.is_finished()
    }

    pub(crate) fn release(&mut self) {
        self.fade = None;
        self.restore_pending = false;
        self.playing = false;
        self.sound.release();
    }

    fn push<F>(&mut self, op: F, what: &str)
    where
        F: FnOnce(&mut ActiveSound) -> AudioResult<()>,
    {
        match op(&mut self.sound) {
            Ok(()) => {}
            Err(AudioError::StreamNotFound(id)) => {
                trace!(stream = %id, op = what, "sound already released; dropping call");
            }
            Err(e) => {
                warn!(stream = %self.id, op = what, "sound call failed: {}", e);
            }
        }
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("volume", &self.volume)
            .field("target_volume", &self.target_volume)
            .field("playing", &self.playing)
            .field("ducked_by", &self.ducked_by)
            .field("fading", &self.is_fading())
            .finish()
    }
}

/// Cloneable read-only view of a stream, safe to hand across the runtime boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub id: StreamId,
    pub category: AudioCategory,
    pub priority: Priority,
    pub volume: f32,
    pub target_volume: f32,
    pub playing: bool,
    pub ducked: bool,
    pub fading: bool,
}
