//! Mixer configuration: ducking rules, category priorities and the category volume table.
//!
//! Everything here deserializes with defaults, so a partial TOML section (or none at all)
//! still yields a working mixer.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | fade_tick_ms | 20 | Interval of the fade timer in the audio runtime. |
//! | min_fade_steps | 15 | Lower bound on discrete steps per fade. |
//! | priority_mode | navigation | `navigation` pauses story narration; `balanced` ducks it. |
//! | priorities | see `default_priorities` | Trigger priority when no stream of it plays. |
//! | ducking_rules | navigation + voice | Static `DuckingRule` table. |
//! | volumes | all 1.0 | Master and per-category base volume. |

use crate::error::{AudioError, AudioResult};
use crate::stream::{clamp_volume, AudioCategory, Priority};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Fewest discrete steps a fade may use.
pub const MIN_FADE_STEPS: u32 = 15;

/// How a trigger suppresses lower-priority audio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuckingRule {
    /// Category whose playback triggers the rule.
    pub trigger: AudioCategory,
    /// Suppressed streams fade to `pre_duck_volume * target_fraction`.
    pub target_fraction: f32,
    pub fade_ms: u64,
    pub restore_fade_ms: u64,
    /// Categories the rule suppresses.
    pub categories: Vec<AudioCategory>,
}

impl DuckingRule {
    pub fn fade_time(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }

    pub fn restore_fade_time(&self) -> Duration {
        Duration::from_millis(self.restore_fade_ms)
    }

    pub fn suppresses(&self, category: AudioCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Navigation instructions: drop music, ambience and story narration hard.
/// Story playback: lower music, ambience and effects under the voice.
pub fn default_ducking_rules() -> Vec<DuckingRule> {
    vec![
        DuckingRule {
            trigger: AudioCategory::Navigation,
            target_fraction: 0.2,
            fade_ms: 300,
            restore_fade_ms: 600,
            categories: vec![AudioCategory::Music, AudioCategory::Ambient, AudioCategory::Voice],
        },
        DuckingRule {
            trigger: AudioCategory::Voice,
            target_fraction: 0.3,
            fade_ms: 500,
            restore_fade_ms: 800,
            categories: vec![AudioCategory::Music, AudioCategory::Ambient, AudioCategory::Effect],
        },
    ]
}

pub fn default_priorities() -> BTreeMap<AudioCategory, Priority> {
    BTreeMap::from([
        (AudioCategory::Navigation, Priority(5)),
        (AudioCategory::Voice, Priority(4)),
        (AudioCategory::Effect, Priority(3)),
        (AudioCategory::Music, Priority(2)),
        (AudioCategory::Ambient, Priority(1)),
    ])
}

/// Per-category base volume plus a master volume. Mutated only by user-settings calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryVolumeTable {
    #[serde(default = "unity")]
    master: f32,
    #[serde(default)]
    categories: BTreeMap<AudioCategory, f32>,
}

fn unity() -> f32 {
    1.0
}

impl Default for CategoryVolumeTable {
    fn default() -> Self {
        Self {
            master: 1.0,
            categories: AudioCategory::ALL.iter().map(|c| (*c, 1.0)).collect(),
        }
    }
}

impl CategoryVolumeTable {
    pub fn master(&self) -> f32 {
        self.master
    }

    /// Base volume of `category`; unlisted categories play at 1.0.
    pub fn base(&self, category: AudioCategory) -> f32 {
        self.categories.get(&category).copied().unwrap_or(1.0)
    }

    /// Multiplier applied to every stream of `category`.
    pub fn scale(&self, category: AudioCategory) -> f32 {
        clamp_volume(self.base(category) * self.master)
    }

    /// Returns the stored (clamped) value.
    pub fn set_master(&mut self, volume: f32) -> f32 {
        self.master = clamp_volume(volume);
        self.master
    }

    /// Returns the stored (clamped) value.
    pub fn set_base(&mut self, category: AudioCategory, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.categories.insert(category, volume);
        volume
    }

    pub fn validate(&self) -> AudioResult<()> {
        check_unit("volumes.master", self.master)?;
        for (category, volume) in &self.categories {
            check_unit(&format!("volumes.categories.{}", category), *volume)?;
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> AudioResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AudioError::InvalidVolume {
            field: field.to_string(),
            value,
        })
    }
}

/// `Navigation` pauses story narration outright while an instruction plays; `Balanced` ducks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    #[default]
    Navigation,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixerConfig {
    pub fade_tick_ms: u64,
    pub min_fade_steps: u32,
    pub priority_mode: PriorityMode,
    pub priorities: BTreeMap<AudioCategory, Priority>,
    pub ducking_rules: Vec<DuckingRule>,
    pub volumes: CategoryVolumeTable,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            fade_tick_ms: 20,
            min_fade_steps: MIN_FADE_STEPS,
            priority_mode: PriorityMode::default(),
            priorities: default_priorities(),
            ducking_rules: default_ducking_rules(),
            volumes: CategoryVolumeTable::default(),
        }
    }
}

impl MixerConfig {
    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms)
    }

    pub fn default_priority(&self, category: AudioCategory) -> Priority {
        self.priorities
            .get(&category)
            .copied()
            .unwrap_or(Priority::LOWEST)
    }

    pub fn rule_for(&self, trigger: AudioCategory) -> Option<&DuckingRule> {
        self.ducking_rules.iter().find(|r| r.trigger == trigger)
    }

    pub fn validate(&self) -> AudioResult<()> {
        if self.fade_tick_ms == 0 {
            return Err(AudioError::Config("fade_tick_ms must be greater than zero".to_string()));
        }
        if self.min_fade_steps < MIN_FADE_STEPS {
            return Err(AudioError::Config(format!(
                "min_fade_steps must be at least {} (got {})",
                MIN_FADE_STEPS, self.min_fade_steps
            )));
        }
        let mut seen = HashSet::new();
        for rule in &self.ducking_rules {
            if !seen.insert(rule.trigger) {
                return Err(AudioError::Config(format!(
                    "duplicate ducking rule for trigger {}",
                    rule.trigger
                )));
            }
            if rule.categories.contains(&rule.trigger) {
                return Err(AudioError::Config(format!(
                    "ducking rule for {} cannot suppress its own category",
                    rule.trigger
                )));
            }
            check_unit(
                &format!("ducking_rules.{}.target_fraction", rule.trigger),
                rule.target_fraction,
            )?;
        }
        self.volumes.validate()
    }
}
