//! Collaborator interfaces consumed by the blender, plus the provided implementations.
//!
//! Every call is made under a timeout by the caller; implementations only report their own
//! failures.

pub mod booking;
pub mod directions;
pub mod narrative;
pub mod speech;

use crate::error::CollaboratorResult;
use crate::personality::PersonalityProfile;
use async_trait::async_trait;
use roadtrip_audio::{SoundHandle, VoiceProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use booking::CatalogBookingService;
pub use directions::DirectionsRouteService;
pub use narrative::OpenRouterNarrative;
pub use speech::TtsSpeechSynthesizer;

/// Route summary as spoken to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Human-readable distance (e.g. "5 mi").
    pub distance: String,
    /// Human-readable duration (e.g. "12 min").
    pub duration: String,
    /// Plain-text turn instructions, first step first.
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    Lodging,
    Dining,
    Camping,
    Activity,
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingKind::Lodging => "lodging",
            BookingKind::Dining => "dining",
            BookingKind::Camping => "camping",
            BookingKind::Activity => "activity",
        };
        f.write_str(name)
    }
}

/// Something the traveler might book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCandidate {
    pub kind: BookingKind,
    pub location: String,
}

/// An available offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOffer {
    pub name: String,
    pub kind: BookingKind,
    pub location: String,
    #[serde(default)]
    pub price: Option<String>,
}

impl fmt::Display for BookingOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.price {
            Some(price) => write!(f, "{} ({})", self.name, price),
            None => f.write_str(&self.name),
        }
    }
}

#[async_trait]
pub trait RouteService: Send + Sync {
    async fn get_route(&self, origin: &str, destination: &str) -> CollaboratorResult<RouteInfo>;
}

#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate_story(
        &self,
        location: &str,
        personality: &PersonalityProfile,
    ) -> CollaboratorResult<String>;
}

#[async_trait]
pub trait BookingService: Send + Sync {
    async fn check_availability(
        &self,
        candidates: &[BookingCandidate],
    ) -> CollaboratorResult<Vec<BookingOffer>>;
}

/// Text to a playable sound.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> CollaboratorResult<Box<dyn SoundHandle>>;
}
