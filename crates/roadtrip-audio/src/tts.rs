//! **Text-to-speech backends**: turn merged narration text into audio bytes.
//!
//! `OpenAiTts` talks to any OpenAI-compatible `/audio/speech` endpoint; `PlaceholderTts`
//! returns no audio and only estimates the speaking time so headless playback behaves
//! like real speech.

use crate::error::{AudioError, AudioResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Average speaking rate used to estimate playback length at speed 1.0.
const WORDS_PER_SECOND: f32 = 2.5;

/// Voice parameters handed to the TTS backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Backend voice id (e.g. shimmer, nova, fable).
    pub voice: String,
    /// Speaking speed multiplier; 1.0 is normal.
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    1.0
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice: "shimmer".to_string(),
            speed: 1.0,
        }
    }
}

/// Output of a TTS call.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Encoded audio (MP3/WAV). Empty when the backend produced nothing.
    pub bytes: Vec<u8>,
    pub voice: String,
    pub estimated_duration: Duration,
}

/// Estimate how long `text` takes to speak at `speed`.
pub fn estimate_speech_duration(text: &str, speed: f32) -> Duration {
    let words = text.split_whitespace().count() as f32;
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    Duration::from_secs_f32(words / (WORDS_PER_SECOND * speed))
}

/// Backend that turns text into audio bytes.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> AudioResult<SynthesizedAudio>;
}

/// Placeholder TTS: no audio, only a duration estimate.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> AudioResult<SynthesizedAudio> {
        Ok(SynthesizedAudio {
            bytes: Vec::new(),
            voice: voice.voice.clone(),
            estimated_duration: estimate_speech_duration(text, voice.speed),
        })
    }
}

/// Production TTS backend: OpenAI-compatible API (OpenAI, OpenRouter, etc.).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    /// tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    /// Build from environment: TTS_API_URL, TTS_API_KEY (or OPENROUTER_API_KEY), TTS_MODEL.
    pub fn from_env() -> AudioResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                AudioError::Config("TTS requires TTS_API_KEY or OPENROUTER_API_KEY".to_string())
            })?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AudioResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TtsBackend for OpenAiTts {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> AudioResult<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SynthesizedAudio {
                bytes: Vec::new(),
                voice: voice.voice.clone(),
                estimated_duration: Duration::ZERO,
            });
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice.voice,
            "speed": voice.speed,
        });
        debug!(voice = %voice.voice, chars = text.len(), "requesting speech");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AudioError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await?;
        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            voice: voice.voice.clone(),
            estimated_duration: estimate_speech_duration(text, voice.speed),
        })
    }
}
