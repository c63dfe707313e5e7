//! Personality profiles: a TTS voice plus a tone template that shapes merged narration.
//!
//! Templates use `{slot}` placeholders and `{{` / `}}` for literal braces. Every template
//! field has a fixed set of allowed slots; anything else is rejected at load time.
//!
//! | Field | Slots |
//! |-------|-------|
//! | opener | `{name}` |
//! | route | `{destination}` `{distance}` `{duration}` `{next_step}` |
//! | narrative | `{narrative}` `{location}` |
//! | booking | `{offers}` `{offer_count}` `{top_offer}` `{location}` |
//! | no_offers | `{location}` |
//! | route_fallback | `{destination}` |
//! | narrative_fallback | `{location}` |
//! | booking_fallback | `{location}` |
//! | confirmed / declined | `{decision}` |
//! | closer | none |

use crate::error::{CoreError, CoreResult};
use roadtrip_audio::VoiceProfile;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_PERSONALITY: &str = "calm_companion";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Slot(String),
}

/// A parsed template. Rendering never fails; missing slot values render as empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parse `source`, accepting only slots listed in `allowed`. `field` names the template in
    /// errors.
    pub fn parse(field: &str, source: &str, allowed: &[&str]) -> CoreResult<Self> {
        let err = |message: String| CoreError::Template {
            field: field.to_string(),
            message,
        };
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(err(format!("unclosed '{{' in {:?}", source)));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(err("empty slot".to_string()));
                    }
                    if !allowed.contains(&name) {
                        return Err(err(format!(
                            "unknown slot {{{}}} (allowed: {})",
                            name,
                            allowed.join(", ")
                        )));
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Slot(name.to_string()));
                }
                '}' => return Err(err(format!("unmatched '}}' in {:?}", source))),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Slot(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Slot(name) => {
                    if let Some(value) = values.get(name.as_str()) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Allowed slots per tone-template field.
pub const SLOT_TABLE: &[(&str, &[&str])] = &[
    ("opener", &["name"]),
    ("route", &["destination", "distance", "duration", "next_step"]),
    ("narrative", &["narrative", "location"]),
    ("booking", &["offers", "offer_count", "top_offer", "location"]),
    ("no_offers", &["location"]),
    ("route_fallback", &["destination"]),
    ("narrative_fallback", &["location"]),
    ("booking_fallback", &["location"]),
    ("confirmed", &["decision"]),
    ("declined", &["decision"]),
    ("closer", &[]),
];

fn allowed_slots(field: &str) -> &'static [&'static str] {
    SLOT_TABLE
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, slots)| *slots)
        .unwrap_or(&[])
}

/// Raw template strings as written in TOML. Missing fields inherit from a base profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToneSource {
    pub opener: Option<String>,
    pub route: Option<String>,
    pub narrative: Option<String>,
    pub booking: Option<String>,
    pub no_offers: Option<String>,
    pub route_fallback: Option<String>,
    pub narrative_fallback: Option<String>,
    pub booking_fallback: Option<String>,
    pub confirmed: Option<String>,
    pub declined: Option<String>,
    pub closer: Option<String>,
}

/// Compiled tone template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneTemplate {
    pub opener: Template,
    pub route: Template,
    pub narrative: Template,
    pub booking: Template,
    pub no_offers: Template,
    pub route_fallback: Template,
    pub narrative_fallback: Template,
    pub booking_fallback: Template,
    pub confirmed: Template,
    pub declined: Template,
    pub closer: Template,
}

impl ToneTemplate {
    /// Compile `source`, taking any field it leaves out from `base`.
    pub fn compile(source: &ToneSource, base: Option<&ToneTemplate>) -> CoreResult<Self> {
        let field = |name: &str,
                     raw: &Option<String>,
                     inherited: Option<&Template>|
         -> CoreResult<Template> {
            match (raw, inherited) {
                (Some(raw), _) => Template::parse(name, raw, allowed_slots(name)),
                (None, Some(template)) => Ok(template.clone()),
                (None, None) => Err(CoreError::Template {
                    field: name.to_string(),
                    message: "missing template".to_string(),
                }),
            }
        };
        Ok(Self {
            opener: field("opener", &source.opener, base.map(|b| &b.opener))?,
            route: field("route", &source.route, base.map(|b| &b.route))?,
            narrative: field("narrative", &source.narrative, base.map(|b| &b.narrative))?,
            booking: field("booking", &source.booking, base.map(|b| &b.booking))?,
            no_offers: field("no_offers", &source.no_offers, base.map(|b| &b.no_offers))?,
            route_fallback: field(
                "route_fallback",
                &source.route_fallback,
                base.map(|b| &b.route_fallback),
            )?,
            narrative_fallback: field(
                "narrative_fallback",
                &source.narrative_fallback,
                base.map(|b| &b.narrative_fallback),
            )?,
            booking_fallback: field(
                "booking_fallback",
                &source.booking_fallback,
                base.map(|b| &b.booking_fallback),
            )?,
            confirmed: field("confirmed", &source.confirmed, base.map(|b| &b.confirmed))?,
            declined: field("declined", &source.declined, base.map(|b| &b.declined))?,
            closer: field("closer", &source.closer, base.map(|b| &b.closer))?,
        })
    }
}

/// Named tone and voice configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalityProfile {
    pub name: String,
    pub display_name: String,
    /// Style guidance handed to the narrative service.
    pub style: String,
    pub voice: VoiceProfile,
    pub tone: ToneTemplate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileSource {
    name: String,
    display_name: Option<String>,
    style: Option<String>,
    voice: Option<VoiceProfile>,
    #[serde(default)]
    tone: ToneSource,
}

#[derive(Debug, Deserialize)]
struct PersonalityFile {
    #[serde(default)]
    default: Option<String>,
    #[serde(default, rename = "personality")]
    personalities: Vec<ProfileSource>,
}

fn builtin_source(name: &str) -> Option<(&'static str, &'static str, VoiceProfile, ToneSource)> {
    let s = |v: &str| Some(v.to_string());
    match name {
        "calm_companion" => Some((
            "Calm Companion",
            "Warm, unhurried and reassuring. Short sentences, no exclamation marks.",
            VoiceProfile {
                voice: "shimmer".to_string(),
                speed: 0.95,
            },
            ToneSource {
                opener: s(""),
                route: s("{destination} is {distance} away, about {duration}. {next_step}"),
                narrative: s("{narrative}"),
                booking: s(
                    "I found {offer_count} options near {location}. \
                     {top_offer} looks like the best fit. Would you like me to book it?",
                ),
                no_offers: s("I couldn't find anything available near {location}."),
                route_fallback: s("I couldn't get directions to {destination} right now."),
                narrative_fallback: s(
                    "I don't have a story about {location} right now, \
                     but I'll keep an eye out along the way.",
                ),
                booking_fallback: s("I couldn't check bookings right now."),
                confirmed: s("Done. {decision} is booked."),
                declined: s("No problem, I'll skip {decision}."),
                closer: s(""),
            },
        )),
        "enthusiastic_guide" => Some((
            "Enthusiastic Guide",
            "Upbeat and energetic. \
             Celebrate the road ahead and point out what makes each place special.",
            VoiceProfile {
                voice: "nova".to_string(),
                speed: 1.1,
            },
            ToneSource {
                opener: s("Great news!"),
                route: s("We're {distance} from {destination}, just {duration} to go! {next_step}"),
                narrative: s("Here's something fun: {narrative}"),
                booking: s(
                    "I found {offer_count} great spots near {location}: {offers}. \
                     Want me to grab {top_offer}?",
                ),
                no_offers: s("Everything near {location} is booked up, but we'll find something!"),
                route_fallback: s("Directions to {destination} aren't loading yet, hang tight!"),
                narrative_fallback: s("I'm still digging up stories about {location}!"),
                booking_fallback: s(
                    "I couldn't check bookings right now, let's try again in a bit!",
                ),
                confirmed: s("You got it! {decision} is all booked!"),
                declined: s("Okay, skipping {decision}!"),
                closer: s("Let's roll!"),
            },
        )),
        "history_buff" => Some((
            "History Buff",
            "Measured and curious. Favor historical context, dates and the people behind a place.",
            VoiceProfile {
                voice: "fable".to_string(),
                speed: 1.0,
            },
            ToneSource {
                opener: s(""),
                route: s(
                    "{destination} lies {distance} ahead, roughly {duration} by road. {next_step}",
                ),
                narrative: s("A bit of history: {narrative}"),
                booking: s(
                    "There are {offer_count} places near {location}, among them {offers}. \
                     {top_offer} stands out. Shall I reserve it?",
                ),
                no_offers: s("Nothing near {location} has availability at the moment."),
                route_fallback: s("The route to {destination} is unavailable for now."),
                narrative_fallback: s("The archives on {location} are quiet for the moment."),
                booking_fallback: s("I couldn't check bookings right now."),
                confirmed: s("Very well, {decision} is reserved."),
                declined: s("Understood, we'll pass on {decision}."),
                closer: s(""),
            },
        )),
        _ => None,
    }
}

pub const BUILTIN_PERSONALITIES: [&str; 3] =
    ["calm_companion", "enthusiastic_guide", "history_buff"];

impl PersonalityProfile {
    /// One of the built-in profiles.
    pub fn builtin(name: &str) -> CoreResult<Self> {
        let (display_name, style, voice, tone) =
            builtin_source(name).ok_or_else(|| CoreError::UnknownPersonality(name.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            style: style.to_string(),
            voice,
            tone: ToneTemplate::compile(&tone, None)?,
        })
    }
}

/// Profiles by name plus the default used for unknown selections.
#[derive(Debug, Clone)]
pub struct PersonalityRegistry {
    profiles: BTreeMap<String, PersonalityProfile>,
    default: String,
}

impl PersonalityRegistry {
    pub fn builtin() -> CoreResult<Self> {
        let profiles = BUILTIN_PERSONALITIES
            .iter()
            .map(|name| PersonalityProfile::builtin(name).map(|p| (name.to_string(), p)))
            .collect::<CoreResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            profiles,
            default: DEFAULT_PERSONALITY.to_string(),
        })
    }

    /// Built-ins overlaid with the profiles in a TOML document. A profile that shares a
    /// built-in's name inherits its unspecified fields; new profiles inherit from the default.
    pub fn from_toml_str(raw: &str) -> CoreResult<Self> {
        let file: PersonalityFile = toml::from_str(raw)?;
        let mut registry = Self::builtin()?;
        for source in file.personalities {
            let base = registry
                .profiles
                .get(&source.name)
                .or_else(|| registry.profiles.get(&registry.default))
                .cloned();
            let tone = ToneTemplate::compile(&source.tone, base.as_ref().map(|b| &b.tone))?;
            let profile = PersonalityProfile {
                display_name: source
                    .display_name
                    .or_else(|| base.as_ref().map(|b| b.display_name.clone()))
                    .unwrap_or_else(|| source.name.clone()),
                style: source
                    .style
                    .or_else(|| base.as_ref().map(|b| b.style.clone()))
                    .unwrap_or_default(),
                voice: source
                    .voice
                    .or_else(|| base.as_ref().map(|b| b.voice.clone()))
                    .unwrap_or_default(),
                tone,
                name: source.name.clone(),
            };
            debug!(personality = %profile.name, voice = %profile.voice.voice, "personality loaded");
            registry.profiles.insert(source.name, profile);
        }
        if let Some(default) = file.default {
            registry.set_default(&default)?;
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&raw)?;
        info!("🎭 Loaded {} personalities from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn set_default(&mut self, name: &str) -> CoreResult<()> {
        if !self.profiles.contains_key(name) {
            return Err(CoreError::UnknownPersonality(name.to_string()));
        }
        self.default = name.to_string();
        Ok(())
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn get(&self, name: &str) -> Option<&PersonalityProfile> {
        self.profiles.get(name)
    }

    /// The named profile, or the default when the name is unknown.
    pub fn resolve(&self, name: &str) -> &PersonalityProfile {
        match self.profiles.get(name) {
            Some(profile) => profile,
            None => {
                debug!(personality = name, fallback = %self.default, "unknown personality");
                &self.profiles[&self.default]
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
