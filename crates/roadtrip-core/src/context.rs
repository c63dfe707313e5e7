//! Per-session conversation state, carried turn to turn.

use crate::collaborators::BookingOffer;
use crate::intent::IntentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

const SUGGESTION_LIMIT: usize = 10;
const PENDING_DECISION_LIMIT: usize = 5;

/// A question the companion asked and is waiting on (e.g. "Would you like me to book it?").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub id: Uuid,
    /// Spoken name of what is being decided.
    pub description: String,
    #[serde(default)]
    pub offer: Option<BookingOffer>,
    pub created_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn booking(offer: BookingOffer) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: offer.name.clone(),
            offer: Some(offer),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub at: DateTime<Utc>,
    pub utterance: String,
    pub intent: IntentKind,
    pub response: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub personality: String,
    pub current_location: Option<String>,
    pub active_destination: Option<String>,
    pub topic: Option<String>,
    recent_suggestions: VecDeque<String>,
    pending_decisions: VecDeque<PendingDecision>,
    history: VecDeque<TurnRecord>,
    history_limit: usize,
}

impl ConversationContext {
    pub fn new(personality: impl Into<String>, history_limit: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            personality: personality.into(),
            current_location: None,
            active_destination: None,
            topic: None,
            recent_suggestions: VecDeque::new(),
            pending_decisions: VecDeque::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.current_location = Some(location.into());
        self
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.current_location = Some(location.into());
    }

    pub fn history(&self) -> impl Iterator<Item = &TurnRecord> {
        self.history.iter()
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.history.back()
    }

    pub fn recent_suggestions(&self) -> impl Iterator<Item = &str> {
        self.recent_suggestions.iter().map(String::as_str)
    }

    pub fn pending_decisions(&self) -> impl Iterator<Item = &PendingDecision> {
        self.pending_decisions.iter()
    }

    pub fn has_pending_decision(&self) -> bool {
        !self.pending_decisions.is_empty()
    }

    /// Newest suggestion last; the oldest falls off past the limit.
    pub fn push_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        self.recent_suggestions.retain(|s| *s != suggestion);
        self.recent_suggestions.push_back(suggestion);
        while self.recent_suggestions.len() > SUGGESTION_LIMIT {
            self.recent_suggestions.pop_front();
        }
    }

    /// A newer question replaces any earlier one on the same subject.
    pub fn add_pending_decision(&mut self, decision: PendingDecision) {
        self.pending_decisions
            .retain(|d| d.description != decision.description);
        self.pending_decisions.push_back(decision);
        while self.pending_decisions.len() > PENDING_DECISION_LIMIT {
            self.pending_decisions.pop_front();
        }
    }

    /// Drop every open question; the traveler moved on without answering.
    pub fn clear_pending_decisions(&mut self) {
        self.pending_decisions.clear();
    }

    /// The most recent open question, removed from the queue.
    pub fn take_pending_decision(&mut self) -> Option<PendingDecision> {
        self.pending_decisions.pop_back()
    }

    pub fn record_turn(&mut self, turn: TurnRecord) {
        self.history.push_back(turn);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}
