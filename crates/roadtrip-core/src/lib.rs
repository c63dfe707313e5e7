//! # Road Trip Core - Master Response Blender
//!
//! Turns a traveler's utterance (or a proactive trigger) into one spoken response: intent
//! classification, concurrent collaborator fan-out under independent timeouts, personality
//! templated merge, speech synthesis and playback through the audio runtime.
//!
//! Shared types: [`ConversationContext`], [`SpokenResponse`], [`RoadTripConfig`].

pub mod blender;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod intent;
pub mod personality;

pub use blender::{MasterBlender, ProactiveTrigger, ResponseBundle, SpokenResponse};
pub use collaborators::{
    BookingCandidate, BookingKind, BookingOffer, BookingService, CatalogBookingService,
    DirectionsRouteService, NarrativeService, OpenRouterNarrative, RouteInfo, RouteService,
    SpeechSynthesizer, TtsSpeechSynthesizer,
};
pub use config::{BlenderConfig, RoadTripConfig};
pub use context::{ConversationContext, PendingDecision, TurnRecord};
pub use error::{Collaborator, CollaboratorError, CollaboratorResult, CoreError, CoreResult};
pub use intent::{Intent, IntentClassifier, IntentKind, KeywordIntentClassifier};
pub use personality::{PersonalityProfile, PersonalityRegistry, Template, ToneTemplate};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
