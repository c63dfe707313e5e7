//! Route lookups against a Directions-style JSON API.

use super::{RouteInfo, RouteService};
use crate::error::{Collaborator, CollaboratorError, CollaboratorResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

#[derive(Debug, Clone)]
pub struct DirectionsRouteService {
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DirectionsRouteService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// MAPS_API_KEY is required; DIRECTIONS_API_URL overrides the endpoint.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MAPS_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        let base_url = std::env::var("DIRECTIONS_API_URL")
            .unwrap_or_else(|_| DEFAULT_DIRECTIONS_URL.to_string());
        Some(Self::new(base_url, api_key))
    }
}

#[async_trait]
impl RouteService for DirectionsRouteService {
    async fn get_route(&self, origin: &str, destination: &str) -> CollaboratorResult<RouteInfo> {
        debug!(origin, destination, "requesting directions");
        let res = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(CollaboratorError::failure(
                Collaborator::Route,
                format!("directions {}: {}", status.as_u16(), body),
            ));
        }
        parse_directions(&body)
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: TextValue,
    duration: TextValue,
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsStep {
    #[serde(default)]
    html_instructions: String,
}

/// Parse the first leg of the first route.
pub fn parse_directions(body: &str) -> CollaboratorResult<RouteInfo> {
    let parsed: DirectionsResponse = serde_json::from_str(body).map_err(|e| {
        CollaboratorError::failure(Collaborator::Route, format!("bad directions JSON: {}", e))
    })?;
    if let Some(status) = parsed.status.as_deref() {
        if status != "OK" {
            return Err(CollaboratorError::failure(
                Collaborator::Route,
                format!("directions status {}", status),
            ));
        }
    }
    let leg = parsed
        .routes
        .into_iter()
        .next()
        .and_then(|r| r.legs.into_iter().next())
        .ok_or_else(|| CollaboratorError::failure(Collaborator::Route, "no route found"))?;
    Ok(RouteInfo {
        distance: leg.distance.text,
        duration: leg.duration.text,
        steps: leg
            .steps
            .iter()
            .map(|s| strip_html(&s.html_instructions))
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

/// Spoken text of an HTML instruction fragment, with whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            strip_html(
                "Turn <b>left</b> onto <b>Lombard St</b><div style=\"x\">Toll&nbsp;road</div>"
            ),
            "Turn left onto Lombard St Toll road"
        );
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(
            strip_html(
                "Turn <b>right</b> onto <b>Hwy 1</b> &ndash; Caf&eacute; on the &#x27;left&#x27;"
            ),
            "Turn right onto Hwy 1 \u{2013} Caf\u{e9} on the 'left'"
        );
        assert_eq!(
            strip_html("Pass <b>Bixby&#160;Bridge</b> &amp; continue"),
            "Pass Bixby Bridge & continue"
        );
    }

    #[test]
    fn parses_first_leg() {
        let body = r#"{
            "status": "OK",
            "routes": [{"legs": [{
                "distance": {"text": "5 mi", "value": 8046},
                "duration": {"text": "12 min", "value": 720},
                "steps": [
                    {"html_instructions": "Head <b>north</b> on <b>Van Ness Ave</b>"},
                    {"html_instructions": "Take the ramp onto <b>US-101 N</b>"}
                ]
            }]}]
        }"#;
        let route = parse_directions(body).unwrap();
        assert_eq!(route.distance, "5 mi");
        assert_eq!(route.duration, "12 min");
        assert_eq!(route.steps[0], "Head north on Van Ness Ave");
    }

    #[test]
    fn zero_results_is_a_failure() {
        let err = parse_directions(r#"{"status": "ZERO_RESULTS", "routes": []}"#).unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Failure { collaborator: Collaborator::Route, .. }
        ));
    }
}
