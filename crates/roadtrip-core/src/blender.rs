//! Master Response Blender
//!
//! One user turn in, one spoken response out:
//!
//! ```text
//!  utterance ─▶ classify ─▶ ┌ route     (timeout) ┐
//!                           ├ narrative (timeout) ┼─▶ merge (route → narrative → booking)
//!                           └ booking   (timeout) ┘        │ tone template
//!                                                          ▼
//!                                  speech (timeout) ─▶ voice stream @ highest priority
//! ```
//!
//! Collaborator failures never escape: each one becomes its fallback phrase and lowers the
//! response confidence.

use crate::collaborators::{
    BookingCandidate, BookingOffer, BookingService, NarrativeService, RouteInfo, RouteService,
    SpeechSynthesizer,
};
use crate::config::BlenderConfig;
use crate::context::{ConversationContext, PendingDecision, TurnRecord};
use crate::error::{Collaborator, CollaboratorError, CollaboratorResult, CoreResult};
use crate::intent::{Intent, IntentClassifier, IntentKind, KeywordIntentClassifier};
use crate::personality::{PersonalityProfile, PersonalityRegistry, Template};
use chrono::Utc;
use futures::future::OptionFuture;
use roadtrip_audio::{AudioCategory, AudioHandle, Priority, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Spoken when nothing else produced text.
const IDLE_RESPONSE: &str = "I'm here whenever you need me.";

/// Outcome per collaborator for one turn. `None` means not dispatched.
#[derive(Debug, Default)]
pub struct ResponseBundle {
    pub route: Option<CollaboratorResult<RouteInfo>>,
    pub narrative: Option<CollaboratorResult<String>>,
    pub booking: Option<CollaboratorResult<Vec<BookingOffer>>>,
}

impl ResponseBundle {
    pub fn dispatched(&self) -> usize {
        [self.route.is_some(), self.narrative.is_some(), self.booking.is_some()]
            .into_iter()
            .filter(|d| *d)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        [
            matches!(self.route, Some(Ok(_))),
            matches!(self.narrative, Some(Ok(_))),
            matches!(self.booking, Some(Ok(_))),
        ]
        .into_iter()
        .filter(|s| *s)
        .count()
    }

    /// Share of dispatched collaborators that succeeded; 1.0 when none were needed.
    pub fn confidence(&self) -> f32 {
        match self.dispatched() {
            0 => 1.0,
            n => self.succeeded() as f32 / n as f32,
        }
    }

    /// Collaborators that were dispatched and failed, in merge order.
    pub fn degraded(&self) -> Vec<Collaborator> {
        let mut degraded = Vec::new();
        if matches!(self.route, Some(Err(_))) {
            degraded.push(Collaborator::Route);
        }
        if matches!(self.narrative, Some(Err(_))) {
            degraded.push(Collaborator::Narrative);
        }
        if matches!(self.booking, Some(Err(_))) {
            degraded.push(Collaborator::Booking);
        }
        degraded
    }
}

/// Semantic events the companion speaks about without being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProactiveTrigger {
    /// Passing a point of interest.
    PointOfInterest { name: String },
    /// Reached the active destination.
    Arrival { destination: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpokenResponse {
    /// Never empty.
    pub text: String,
    pub intent: IntentKind,
    pub confidence: f32,
    pub personality: String,
    /// Collaborators whose fallback phrase was used.
    pub degraded: Vec<Collaborator>,
    /// Voice stream carrying the speech, when synthesis and playback succeeded.
    pub stream: Option<StreamId>,
}

/// What one turn asks of the collaborators.
#[derive(Debug, Default)]
struct Plan {
    route: Option<(String, String)>,
    narrative: Option<String>,
    booking: Option<Vec<BookingCandidate>>,
}

pub struct MasterBlender {
    config: BlenderConfig,
    personalities: PersonalityRegistry,
    classifier: Box<dyn IntentClassifier>,
    route: Option<Arc<dyn RouteService>>,
    narrative: Option<Arc<dyn NarrativeService>>,
    booking: Option<Arc<dyn BookingService>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    audio: Option<AudioHandle>,
}

impl MasterBlender {
    pub fn new(config: BlenderConfig, personalities: PersonalityRegistry) -> Self {
        Self {
            config,
            personalities,
            classifier: Box::new(KeywordIntentClassifier::new()),
            route: None,
            narrative: None,
            booking: None,
            speech: None,
            audio: None,
        }
    }

    /// Built-in personalities and default timeouts.
    pub fn with_defaults() -> CoreResult<Self> {
        Ok(Self::new(BlenderConfig::default(), PersonalityRegistry::builtin()?))
    }

    pub fn with_classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_route(mut self, route: Arc<dyn RouteService>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_narrative(mut self, narrative: Arc<dyn NarrativeService>) -> Self {
        self.narrative = Some(narrative);
        self
    }

    pub fn with_booking(mut self, booking: Arc<dyn BookingService>) -> Self {
        self.booking = Some(booking);
        self
    }

    /// Speech is only synthesized when an audio runtime is attached as well.
    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>, audio: AudioHandle) -> Self {
        self.speech = Some(speech);
        self.audio = Some(audio);
        self
    }

    pub fn config(&self) -> &BlenderConfig {
        &self.config
    }

    pub fn personalities(&self) -> &PersonalityRegistry {
        &self.personalities
    }

    /// Fresh context for a session using the configured default personality.
    pub fn new_context(&self) -> ConversationContext {
        ConversationContext::new(self.personalities.default_name(), self.config.history_limit)
    }

    pub async fn handle_user_utterance(
        &self,
        text: &str,
        ctx: &mut ConversationContext,
    ) -> SpokenResponse {
        let intent = self.classifier.classify(text, ctx);
        let profile = self.personalities.resolve(&ctx.personality);
        info!(
            session = %ctx.session_id,
            intent = ?intent.kind,
            destination = intent.destination.as_deref().unwrap_or("-"),
            location = intent.location.as_deref().unwrap_or("-"),
            "🧭 Handling utterance"
        );

        let (text_out, bundle) = match intent.kind {
            IntentKind::Confirm | IntentKind::Decline => {
                (self.answer_decision(profile, &intent, ctx), ResponseBundle::default())
            }
            _ => {
                let plan = self.plan(&intent, ctx);
                let bundle = self.fan_out(&plan, profile).await;
                (self.compose(profile, &plan, &bundle), bundle)
            }
        };

        let offers: Vec<BookingOffer> = match &bundle.booking {
            Some(Ok(offers)) => offers.clone(),
            _ => Vec::new(),
        };
        let response = self.finish(text, intent.kind, text_out, bundle, profile).await;
        self.record(ctx, text, &intent, &offers, &response);
        response
    }

    /// Narrative-only turn for a proactive trigger.
    pub async fn handle_proactive(
        &self,
        trigger: &ProactiveTrigger,
        ctx: &mut ConversationContext,
    ) -> SpokenResponse {
        let place = match trigger {
            ProactiveTrigger::PointOfInterest { name } => name.clone(),
            ProactiveTrigger::Arrival { destination } => {
                ctx.set_location(destination.clone());
                if ctx.active_destination.as_deref() == Some(destination.as_str()) {
                    ctx.active_destination = None;
                }
                destination.clone()
            }
        };
        info!(session = %ctx.session_id, ?trigger, "📍 Proactive narration");

        let profile = self.personalities.resolve(&ctx.personality);
        let plan = Plan {
            narrative: Some(place.clone()),
            ..Default::default()
        };
        let bundle = self.fan_out(&plan, profile).await;
        let text = self.compose(profile, &plan, &bundle);
        let response = self
            .finish(&place, IntentKind::Informational, text, bundle, profile)
            .await;

        ctx.topic = Some(place.clone());
        ctx.record_turn(TurnRecord {
            at: Utc::now(),
            utterance: format!("[{}]", place),
            intent: IntentKind::Informational,
            response: response.text.clone(),
            confidence: response.confidence,
        });
        response
    }

    fn plan(&self, intent: &Intent, ctx: &ConversationContext) -> Plan {
        let place = intent
            .location
            .clone()
            .or_else(|| ctx.active_destination.clone())
            .or_else(|| ctx.current_location.clone());
        match intent.kind {
            IntentKind::Navigation => {
                let destination = intent
                    .destination
                    .clone()
                    .or_else(|| ctx.active_destination.clone());
                let origin = ctx
                    .current_location
                    .clone()
                    .unwrap_or_else(|| self.config.origin_fallback.clone());
                Plan {
                    route: destination.clone().map(|d| (origin, d)),
                    narrative: destination.or(place),
                    booking: None,
                }
            }
            IntentKind::Booking => {
                let location = place.clone().unwrap_or_else(|| self.config.origin_fallback.clone());
                Plan {
                    route: None,
                    narrative: place,
                    booking: Some(
                        intent
                            .booking_kinds
                            .iter()
                            .map(|kind| BookingCandidate {
                                kind: *kind,
                                location: location.clone(),
                            })
                            .collect(),
                    ),
                }
            }
            IntentKind::Informational => Plan {
                narrative: place.or_else(|| ctx.topic.clone()),
                ..Default::default()
            },
            IntentKind::Confirm | IntentKind::Decline => Plan::default(),
        }
    }

    /// Dispatch every planned call concurrently, each under its own deadline.
    async fn fan_out(&self, plan: &Plan, profile: &PersonalityProfile) -> ResponseBundle {
        let route = OptionFuture::from(plan.route.as_ref().map(|(origin, destination)| {
            call(Collaborator::Route, self.config.route_timeout(), async move {
                match &self.route {
                    Some(service) => service.get_route(origin, destination).await,
                    None => Err(not_configured(Collaborator::Route)),
                }
            })
        }));
        let narrative = OptionFuture::from(plan.narrative.as_ref().map(|location| {
            call(Collaborator::Narrative, self.config.narrative_timeout(), async move {
                match &self.narrative {
                    Some(service) => service.generate_story(location, profile).await,
                    None => Err(not_configured(Collaborator::Narrative)),
                }
            })
        }));
        let booking = OptionFuture::from(plan.booking.as_ref().map(|candidates| {
            call(Collaborator::Booking, self.config.booking_timeout(), async move {
                match &self.booking {
                    Some(service) => service.check_availability(candidates).await,
                    None => Err(not_configured(Collaborator::Booking)),
                }
            })
        }));

        let (route, narrative, booking) = tokio::join!(route, narrative, booking);
        let narrative = narrative.map(|result| {
            result.and_then(|story| {
                let story = story.trim().to_string();
                if story.is_empty() {
                    Err(CollaboratorError::failure(Collaborator::Narrative, "empty story"))
                } else {
                    Ok(story)
                }
            })
        });
        ResponseBundle {
            route,
            narrative,
            booking,
        }
    }

    /// Merge in fixed order: opener, route, narrative, booking, closer.
    fn compose(
        &self,
        profile: &PersonalityProfile,
        plan: &Plan,
        bundle: &ResponseBundle,
    ) -> String {
        let tone = &profile.tone;
        let mut fragments = vec![render(&tone.opener, &[("name", profile.display_name.clone())])];

        let destination = plan.route.as_ref().map(|(_, d)| d.clone()).unwrap_or_default();
        match &bundle.route {
            Some(Ok(route)) => fragments.push(render(
                &tone.route,
                &[
                    ("destination", destination),
                    ("distance", route.distance.clone()),
                    ("duration", route.duration.clone()),
                    ("next_step", route.steps.first().cloned().unwrap_or_default()),
                ],
            )),
            Some(Err(_)) => {
                fragments.push(render(&tone.route_fallback, &[("destination", destination)]))
            }
            None => {}
        }

        let location = plan.narrative.clone().unwrap_or_default();
        match &bundle.narrative {
            Some(Ok(story)) => fragments.push(render(
                &tone.narrative,
                &[("narrative", story.clone()), ("location", location)],
            )),
            Some(Err(_)) => {
                fragments.push(render(&tone.narrative_fallback, &[("location", location)]))
            }
            None => {}
        }

        let booking_location = plan
            .booking
            .as_ref()
            .and_then(|c| c.first())
            .map(|c| c.location.clone())
            .unwrap_or_default();
        match &bundle.booking {
            Some(Ok(offers)) if offers.is_empty() => {
                fragments.push(render(&tone.no_offers, &[("location", booking_location)]))
            }
            Some(Ok(offers)) => fragments.push(render(
                &tone.booking,
                &[
                    (
                        "offers",
                        offers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                    ),
                    ("offer_count", offers.len().to_string()),
                    ("top_offer", offers[0].name.clone()),
                    ("location", booking_location),
                ],
            )),
            Some(Err(_)) => {
                fragments.push(render(&tone.booking_fallback, &[("location", booking_location)]))
            }
            None => {}
        }

        fragments.push(render(&tone.closer, &[]));
        join_fragments(&fragments, profile)
    }

    fn answer_decision(
        &self,
        profile: &PersonalityProfile,
        intent: &Intent,
        ctx: &mut ConversationContext,
    ) -> String {
        let decision = match ctx.take_pending_decision() {
            Some(decision) => decision,
            None => return IDLE_RESPONSE.to_string(),
        };
        let template = if intent.kind == IntentKind::Confirm {
            &profile.tone.confirmed
        } else {
            &profile.tone.declined
        };
        info!(
            decision = %decision.description,
            confirmed = intent.kind == IntentKind::Confirm,
            "✅ Decision answered"
        );
        join_fragments(&[render(template, &[("decision", decision.description)])], profile)
    }

    /// Speak the text and assemble the response.
    async fn finish(
        &self,
        utterance: &str,
        intent: IntentKind,
        text: String,
        bundle: ResponseBundle,
        profile: &PersonalityProfile,
    ) -> SpokenResponse {
        let degraded = bundle.degraded();
        let confidence = bundle.confidence();
        if !degraded.is_empty() {
            debug!(?degraded, confidence, utterance, "degraded response");
        }
        let stream = self.speak(&text, profile).await;
        SpokenResponse {
            text,
            intent,
            confidence,
            personality: profile.name.clone(),
            degraded,
            stream,
        }
    }

    /// Synthesize under the TTS deadline and register the sound as the top-priority voice stream.
    async fn speak(&self, text: &str, profile: &PersonalityProfile) -> Option<StreamId> {
        let (speech, audio) = match (&self.speech, &self.audio) {
            (Some(speech), Some(audio)) => (speech, audio),
            _ => return None,
        };
        let sound = match call(
            Collaborator::Speech,
            self.config.tts_timeout(),
            speech.synthesize(text, &profile.voice),
        )
        .await
        {
            Ok(sound) => sound,
            Err(_) => return None,
        };
        match audio
            .start_stream(AudioCategory::Voice, Priority::HIGHEST, 1.0, sound)
            .await
        {
            Ok(id) => {
                debug!(
                    stream = %id,
                    voice = %profile.voice.voice,
                    "🔊 response queued for playback"
                );
                Some(id)
            }
            Err(e) => {
                warn!("Audio runtime rejected response stream: {}", e);
                None
            }
        }
    }

    fn record(
        &self,
        ctx: &mut ConversationContext,
        utterance: &str,
        intent: &Intent,
        offers: &[BookingOffer],
        response: &SpokenResponse,
    ) {
        // Questions left unanswered by a new request lapse.
        if !matches!(intent.kind, IntentKind::Confirm | IntentKind::Decline) {
            ctx.clear_pending_decisions();
        }
        for offer in offers {
            ctx.push_suggestion(offer.name.clone());
        }
        // The spoken booking fragment asks about the top offer.
        if let Some(top) = offers.first() {
            ctx.add_pending_decision(PendingDecision::booking(top.clone()));
        }
        let navigating = intent.kind == IntentKind::Navigation;
        if let Some(destination) = intent.destination.clone().filter(|_| navigating) {
            ctx.active_destination = Some(destination);
        }
        if let Some(topic) = intent.location.clone().or_else(|| intent.destination.clone()) {
            ctx.topic = Some(topic);
        }
        ctx.record_turn(TurnRecord {
            at: Utc::now(),
            utterance: utterance.to_string(),
            intent: intent.kind,
            response: response.text.clone(),
            confidence: response.confidence,
        });
    }
}

/// Run one collaborator call under `after`. Failures are logged here and returned as values.
async fn call<T, F>(collaborator: Collaborator, after: Duration, fut: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    let result = match timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout { collaborator, after }),
    };
    if let Err(e) = &result {
        warn!(%collaborator, "Collaborator degraded: {}", e);
    }
    result
}

fn not_configured(collaborator: Collaborator) -> CollaboratorError {
    CollaboratorError::failure(collaborator, "not configured")
}

fn render(template: &Template, values: &[(&'static str, String)]) -> String {
    let values: HashMap<&str, String> = values.iter().cloned().collect();
    template.render(&values)
}

/// Join non-empty fragments and collapse whitespace. Never returns an empty string.
fn join_fragments(fragments: &[String], profile: &PersonalityProfile) -> String {
    let text = fragments
        .iter()
        .flat_map(|f| f.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        debug!(personality = %profile.name, "empty merge; using idle response");
        IDLE_RESPONSE.to_string()
    } else {
        text
    }
}
