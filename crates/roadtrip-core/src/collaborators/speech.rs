//! Speech synthesis: a TTS backend feeding a playback backend.

use super::SpeechSynthesizer;
use crate::error::{Collaborator, CollaboratorError, CollaboratorResult};
use async_trait::async_trait;
use roadtrip_audio::{
    HeadlessBackend, OpenAiTts, PlaceholderTts, PlaybackBackend, SoundHandle, TtsBackend,
    VoiceProfile,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TtsSpeechSynthesizer {
    tts: Arc<dyn TtsBackend>,
    playback: Arc<dyn PlaybackBackend>,
}

impl TtsSpeechSynthesizer {
    pub fn new(tts: Arc<dyn TtsBackend>, playback: Arc<dyn PlaybackBackend>) -> Self {
        Self { tts, playback }
    }

    /// Placeholder speech on headless sounds that last as long as the text would take to say.
    pub fn headless() -> Self {
        Self::new(Arc::new(PlaceholderTts), Arc::new(HeadlessBackend))
    }

    /// OpenAI-compatible TTS when configured, otherwise the placeholder. Plays on `playback`.
    pub fn from_env(playback: Arc<dyn PlaybackBackend>) -> Self {
        let tts: Arc<dyn TtsBackend> = match OpenAiTts::from_env() {
            Ok(tts) => Arc::new(tts),
            Err(e) => {
                warn!("TTS unavailable ({}); using placeholder speech", e);
                Arc::new(PlaceholderTts)
            }
        };
        Self::new(tts, playback)
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> CollaboratorResult<Box<dyn SoundHandle>> {
        let audio = self
            .tts
            .synthesize(text, voice)
            .await
            .map_err(|e| CollaboratorError::failure(Collaborator::Speech, e.to_string()))?;
        debug!(
            voice = %audio.voice,
            bytes = audio.bytes.len(),
            duration_ms = audio.estimated_duration.as_millis() as u64,
            "speech synthesized"
        );
        self.playback
            .open(&audio)
            .map_err(|e| CollaboratorError::failure(Collaborator::Speech, e.to_string()))
    }
}
