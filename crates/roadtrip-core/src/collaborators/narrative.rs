//! Narrative generation via OpenRouter chat completions.
//! The personality's style line shapes the system prompt; stories stay short enough to speak.

use super::NarrativeService;
use crate::error::{Collaborator, CollaboratorError, CollaboratorResult};
use crate::personality::PersonalityProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
const STORYTELLER_PROMPT: &str = "\
You are a road trip companion speaking to a driver through the car speakers. \
Tell one short story or fact about the place you are given, in two or three spoken sentences. \
Do not use markdown, lists or emoji. Never give driving instructions.";

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenRouterNarrative {
    pub url: String,
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterNarrative {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: OPENROUTER_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// OPENROUTER_API_KEY is required; OPENROUTER_MODEL overrides the model.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let model = std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, model))
    }

    fn request(&self, location: &str, personality: &PersonalityProfile) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(personality),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Tell me about {}.", location),
                },
            ],
            stream: Some(false),
        }
    }
}

fn system_prompt(personality: &PersonalityProfile) -> String {
    format!(
        "{}\n\nYou are the {}. {}",
        STORYTELLER_PROMPT, personality.display_name, personality.style
    )
}

/// First choice's content, trimmed. An empty story is a failure.
fn parse_completion(body: &str) -> CollaboratorResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        CollaboratorError::failure(Collaborator::Narrative, format!("bad completion JSON: {}", e))
    })?;
    parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CollaboratorError::failure(Collaborator::Narrative, "empty story"))
}

#[async_trait]
impl NarrativeService for OpenRouterNarrative {
    async fn generate_story(
        &self,
        location: &str,
        personality: &PersonalityProfile,
    ) -> CollaboratorResult<String> {
        tracing::debug!(location, personality = %personality.name, "requesting story");
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request(location, personality))
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(CollaboratorError::failure(
                Collaborator::Narrative,
                format!("OpenRouter {}: {}", status.as_u16(), text),
            ));
        }
        parse_completion(&text)
    }
}
