//! Intent classification for spoken utterances.
//!
//! `IntentClassifier` is the seam for smarter classifiers; `KeywordIntentClassifier` is a
//! phrase matcher that covers navigation, questions about places, bookings and yes/no
//! answers to a pending question.

use crate::collaborators::BookingKind;
use crate::context::ConversationContext;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Navigation,
    Informational,
    Booking,
    /// "Yes" to the pending decision.
    Confirm,
    /// "No" to the pending decision.
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub kind: IntentKind,
    pub destination: Option<String>,
    /// Place the utterance is about (for stories and bookings).
    pub location: Option<String>,
    pub booking_kinds: Vec<BookingKind>,
}

impl Intent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            destination: None,
            location: None,
            booking_kinds: Vec::new(),
        }
    }
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, utterance: &str, ctx: &ConversationContext) -> Intent;
}

const NAVIGATION_PHRASES: &[&str] = &[
    "navigate", "directions", "take me", "drive to", "route to", "go to", "get to", "head to",
    "how far", "how long to",
];

const DESTINATION_MARKERS: &[&str] = &[
    "navigate to ", "directions to ", "take me to ", "drive to ", "route to ", "go to ",
    "get to ", "head to ", "how far is ", "how far to ", "how long to ", "navigate ",
];

const LOCATION_MARKERS: &[&str] = &[" near ", " in ", " at ", " around ", "about "];

const BOOKING_PHRASES: &[&str] = &[
    "book",
    "reserve",
    "reservation",
    "availability",
    "available",
    "vacancy",
];

const BOOKING_KINDS: &[(BookingKind, &[&str])] = &[
    (BookingKind::Lodging, &["hotel", "motel", "room", "stay", "lodging", "inn", "place to sleep"]),
    (BookingKind::Dining, &["restaurant", "table", "dinner", "lunch", "breakfast", "eat", "food"]),
    (BookingKind::Camping, &["campsite", "camping", "campground", "camp"]),
    (BookingKind::Activity, &["tour", "tickets", "ticket", "activity", "cruise"]),
];

const CONFIRM_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "sure", "ok", "okay", "please do", "book it", "do it", "sounds good",
];

const DECLINE_WORDS: &[&str] = &[
    "no", "nope", "nah", "skip", "not now", "cancel", "never mind", "don't",
];

/// Trailing words trimmed off an extracted place.
const TRAILING_NOISE: &[&str] = &[
    "tonight", "today", "tomorrow", "now", "please", "for", "this", "evening",
];

#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

/// Whole-word (or whole-phrase) match on an ASCII-lowercased utterance.
fn has_phrase(lower: &str, phrase: &str) -> bool {
    lower.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = lower[..start].chars().next_back();
        let after = lower[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn has_any(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| has_phrase(lower, p))
}

/// Text after the earliest (then longest) marker, cut back to a clean place name.
/// ASCII lowercasing keeps byte offsets aligned with the original utterance.
fn extract_after(original: &str, lower: &str, markers: &[&str]) -> Option<String> {
    markers
        .iter()
        .filter_map(|m| lower.find(m).map(|i| (i, i + m.len())))
        .min_by_key(|(at, end)| (*at, Reverse(*end)))
        .and_then(|(_, start)| clean_place(&original[start..]))
}

fn clean_place(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_end_matches(|c: char| matches!(c, '.' | '?' | '!' | ','));
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while let Some(last) = words.last() {
        if TRAILING_NOISE.contains(&last.to_ascii_lowercase().as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    while let Some(first) = words.first() {
        if matches!(first.to_ascii_lowercase().as_str(), "the" | "a" | "an") && words.len() > 1 {
            words.remove(0);
        } else {
            break;
        }
    }
    let place = words.join(" ");
    (!place.is_empty()).then_some(place)
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, utterance: &str, ctx: &ConversationContext) -> Intent {
        let lower = utterance.trim().to_ascii_lowercase();

        let booking_kinds: Vec<BookingKind> = BOOKING_KINDS
            .iter()
            .filter(|(_, words)| has_any(&lower, words))
            .map(|(kind, _)| *kind)
            .collect();
        let location = extract_after(utterance.trim(), &lower, LOCATION_MARKERS);
        let navigating = has_any(&lower, NAVIGATION_PHRASES);

        // A bare answer only: "okay, take me to Carmel" is a new request.
        let answer_only = !navigating && booking_kinds.is_empty() && location.is_none();
        if answer_only && ctx.has_pending_decision() {
            // Decline first so "no, don't book it" is not read as a confirmation.
            if has_any(&lower, DECLINE_WORDS) {
                return Intent::new(IntentKind::Decline);
            }
            if has_any(&lower, CONFIRM_WORDS) {
                return Intent::new(IntentKind::Confirm);
            }
        }

        if navigating {
            let destination = extract_after(utterance.trim(), &lower, DESTINATION_MARKERS);
            return Intent {
                kind: IntentKind::Navigation,
                location: destination.clone(),
                destination,
                booking_kinds: Vec::new(),
            };
        }

        if has_any(&lower, BOOKING_PHRASES) || !booking_kinds.is_empty() {
            return Intent {
                kind: IntentKind::Booking,
                destination: None,
                location,
                booking_kinds: if booking_kinds.is_empty() {
                    vec![BookingKind::Lodging]
                } else {
                    booking_kinds
                },
            };
        }

        Intent {
            kind: IntentKind::Informational,
            destination: None,
            location,
            booking_kinds: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::BookingOffer;
    use crate::context::PendingDecision;

    fn ctx() -> ConversationContext {
        ConversationContext::new("calm_companion", 10)
    }

    #[test]
    fn navigation_extracts_destination() {
        let intent = KeywordIntentClassifier.classify("Navigate to Golden Gate Bridge", &ctx());
        assert_eq!(intent.kind, IntentKind::Navigation);
        assert_eq!(intent.destination.as_deref(), Some("Golden Gate Bridge"));
        assert_eq!(intent.location.as_deref(), Some("Golden Gate Bridge"));

        let intent = KeywordIntentClassifier.classify("How far is Big Sur?", &ctx());
        assert_eq!(intent.kind, IntentKind::Navigation);
        assert_eq!(intent.destination.as_deref(), Some("Big Sur"));
    }

    #[test]
    fn booking_extracts_kinds_and_location() {
        let intent =
            KeywordIntentClassifier.classify("Find me a hotel near Monterey tonight", &ctx());
        assert_eq!(intent.kind, IntentKind::Booking);
        assert_eq!(intent.booking_kinds, vec![BookingKind::Lodging]);
        assert_eq!(intent.location.as_deref(), Some("Monterey"));

        let intent = KeywordIntentClassifier.classify("Can you book dinner in Big Sur?", &ctx());
        assert_eq!(intent.booking_kinds, vec![BookingKind::Dining]);
        assert_eq!(intent.location.as_deref(), Some("Big Sur"));
    }

    #[test]
    fn questions_are_informational() {
        let intent = KeywordIntentClassifier.classify("Tell me about the Bixby Bridge", &ctx());
        assert_eq!(intent.kind, IntentKind::Informational);
        assert_eq!(intent.location.as_deref(), Some("Bixby Bridge"));
    }

    #[test]
    fn substrings_do_not_match_words() {
        // "inn" inside "Pinnacles" is not a word.
        let intent = KeywordIntentClassifier.classify("What's the story behind Pinnacles", &ctx());
        assert_eq!(intent.kind, IntentKind::Informational);
        assert!(intent.booking_kinds.is_empty());
    }

    #[test]
    fn yes_and_no_only_count_with_a_pending_decision() {
        let mut ctx = ctx();
        assert_eq!(KeywordIntentClassifier.classify("yes", &ctx).kind, IntentKind::Informational);

        ctx.add_pending_decision(PendingDecision::booking(BookingOffer {
            name: "Cypress Inn".to_string(),
            kind: BookingKind::Lodging,
            location: "Carmel".to_string(),
            price: None,
        }));
        let kind = |text: &str| KeywordIntentClassifier.classify(text, &ctx).kind;
        assert_eq!(kind("Yes, book it"), IntentKind::Confirm);
        assert_eq!(kind("No thanks"), IntentKind::Decline);
        assert_eq!(kind("don't book it"), IntentKind::Decline);
    }

    #[test]
    fn new_requests_win_over_a_pending_decision() {
        let mut ctx = ctx();
        ctx.add_pending_decision(PendingDecision::booking(BookingOffer {
            name: "Cypress Inn".to_string(),
            kind: BookingKind::Lodging,
            location: "Carmel".to_string(),
            price: None,
        }));

        let intent = KeywordIntentClassifier.classify("Okay, take me to Carmel", &ctx);
        assert_eq!(intent.kind, IntentKind::Navigation);
        assert_eq!(intent.destination.as_deref(), Some("Carmel"));

        let intent = KeywordIntentClassifier.classify("Sure, tell me about Bixby Bridge", &ctx);
        assert_eq!(intent.kind, IntentKind::Informational);
        assert_eq!(intent.location.as_deref(), Some("Bixby Bridge"));

        let intent = KeywordIntentClassifier.classify("I don't know, navigate to Big Sur", &ctx);
        assert_eq!(intent.kind, IntentKind::Navigation);
        assert_eq!(intent.destination.as_deref(), Some("Big Sur"));

        let intent = KeywordIntentClassifier.classify("No, find me a campsite instead", &ctx);
        assert_eq!(intent.kind, IntentKind::Booking);
        assert_eq!(intent.booking_kinds, vec![BookingKind::Camping]);
    }

    #[test]
    fn answer_words_match_whole_words_only() {
        let mut ctx = ctx();
        ctx.add_pending_decision(PendingDecision::booking(BookingOffer {
            name: "Nepenthe".to_string(),
            kind: BookingKind::Dining,
            location: "Big Sur".to_string(),
            price: None,
        }));
        // "no" inside "know" is not a refusal.
        let kind = |text: &str| KeywordIntentClassifier.classify(text, &ctx).kind;
        assert_eq!(kind("Know what, yes"), IntentKind::Confirm);
        assert_eq!(kind("Please don't"), IntentKind::Decline);
    }
}
