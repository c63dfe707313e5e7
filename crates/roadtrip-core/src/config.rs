//! Road trip configuration: blender timeouts, mixer settings and personality source.
//!
//! Precedence: environment (`ROADTRIP__BLENDER__ROUTE_TIMEOUT_MS=1500`) > TOML file (path from
//! `ROADTRIP_CONFIG`, default `config/roadtrip`) > built-in defaults.

use crate::error::{CoreError, CoreResult};
use crate::personality::{PersonalityRegistry, DEFAULT_PERSONALITY};
use roadtrip_audio::MixerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const ENV_PREFIX: &str = "ROADTRIP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlenderConfig {
    pub route_timeout_ms: u64,
    pub narrative_timeout_ms: u64,
    pub booking_timeout_ms: u64,
    pub tts_timeout_ms: u64,
    pub default_personality: String,
    /// Turns kept in each conversation context.
    pub history_limit: usize,
    /// Route origin when the context has no current location.
    pub origin_fallback: String,
}

impl Default for BlenderConfig {
    fn default() -> Self {
        Self {
            route_timeout_ms: 3_000,
            narrative_timeout_ms: 5_000,
            booking_timeout_ms: 3_000,
            tts_timeout_ms: 5_000,
            default_personality: DEFAULT_PERSONALITY.to_string(),
            history_limit: 20,
            origin_fallback: "Current Location".to_string(),
        }
    }
}

impl BlenderConfig {
    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }

    pub fn narrative_timeout(&self) -> Duration {
        Duration::from_millis(self.narrative_timeout_ms)
    }

    pub fn booking_timeout(&self) -> Duration {
        Duration::from_millis(self.booking_timeout_ms)
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_millis(self.tts_timeout_ms)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let timeouts = [
            ("route_timeout_ms", self.route_timeout_ms),
            ("narrative_timeout_ms", self.narrative_timeout_ms),
            ("booking_timeout_ms", self.booking_timeout_ms),
            ("tts_timeout_ms", self.tts_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(CoreError::Config(format!(
                    "blender.{} must be greater than zero",
                    name
                )));
            }
        }
        if self.history_limit == 0 {
            return Err(CoreError::Config("blender.history_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadTripConfig {
    pub blender: BlenderConfig,
    pub audio: MixerConfig,
    /// TOML file of extra personalities; built-ins only when unset.
    pub personalities_path: Option<PathBuf>,
}

impl RoadTripConfig {
    /// Load from file and environment. File path: env `ROADTRIP_CONFIG`, else
    /// `config/roadtrip`; defaults fill whatever neither sets.
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("ROADTRIP_CONFIG").unwrap_or_else(|_| "config/roadtrip".to_string());
        let config = Self::build(config::File::with_name(&config_path).required(false))?;
        info!("⚙️ Configuration loaded (file: {})", config_path);
        Ok(config)
    }

    /// Load from an explicit TOML file (must exist), with environment overrides on top.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<F>(file: F) -> CoreResult<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let built = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.blender.validate()?;
        self.audio.validate()?;
        Ok(())
    }

    /// Built-in personalities, overlaid with `personalities_path` when set. The configured
    /// default personality must exist.
    pub fn personalities(&self) -> CoreResult<PersonalityRegistry> {
        let mut registry = match &self.personalities_path {
            Some(path) => PersonalityRegistry::load(path)?,
            None => PersonalityRegistry::builtin()?,
        };
        registry.set_default(&self.blender.default_personality)?;
        Ok(registry)
    }
}
