//! Error types for the road trip core

use roadtrip_audio::AudioError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// External services the blender fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    Route,
    Narrative,
    Booking,
    Speech,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Route => "route",
            Collaborator::Narrative => "narrative",
            Collaborator::Booking => "booking",
            Collaborator::Speech => "speech",
        };
        f.write_str(name)
    }
}

/// Failure of one collaborator call. Never escapes the blender.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {after:?}")]
    Timeout {
        collaborator: Collaborator,
        after: Duration,
    },

    #[error("{collaborator} failed: {message}")]
    Failure {
        collaborator: Collaborator,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CollaboratorError {
    pub fn failure(collaborator: Collaborator, message: impl Into<String>) -> Self {
        CollaboratorError::Failure {
            collaborator,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout { .. })
    }
}

/// Errors from configuration, personality loading and audio wiring
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error in {field}: {message}")]
    Template { field: String, message: String },

    #[error("Unknown personality: {0}")]
    UnknownPersonality(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}
