use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{AssistantError, RecommendationRequest, Role};

/// External reasoning service that turns a conversation into a reply.
#[async_trait]
pub trait RecommendationClient: Send + Sync {
    async fn recommend(&self, request: &RecommendationRequest) -> Result<String, AssistantError>;
}

const SYSTEM_PROMPT: &str = "You help patients find a suitable doctor. Keep the tone warm and \
conversational. Ask about symptoms, the kind of specialist they want, and any preferences such as \
availability, before recommending anyone. Recommend only doctors from the roster below, matching \
specialty first and then distance from the patient when their location is known. Mention the \
doctor's name, specialty, and approximate distance. If the patient has concerns, offer alternatives \
from the roster.";

/// Gemini `generateContent` client.
pub struct HttpRecommendationClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpRecommendationClient {
    pub fn new(config: &AppConfig) -> Result<Self, AssistantError> {
        Self::with_timeout(config, config.recommendation_timeout())
    }

    pub fn with_timeout(config: &AppConfig, timeout: Duration) -> Result<Self, AssistantError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::ExternalService(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.recommendation_api_url.trim_end_matches('/').to_string(),
            api_key: config.recommendation_api_key.clone(),
            model: config.recommendation_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Shape the contract into a `generateContent` body: the roster and location
/// go into the system instruction, history plus the new message into `contents`.
pub fn build_request_body(request: &RecommendationRequest) -> Value {
    let roster = serde_json::to_string(&request.doctor_roster).unwrap_or_else(|_| "[]".to_string());
    let location = match request.requester_location {
        Some(point) => format!(
            "The patient's location is latitude {}, longitude {}.",
            point.latitude, point.longitude
        ),
        None => "The patient's location is unknown; do not assume one.".to_string(),
    };

    let mut contents: Vec<Value> = request
        .conversation_history
        .iter()
        .map(|turn| content(turn.role, &turn.text))
        .collect();
    contents.push(content(Role::Patient, &request.new_message));

    json!({
        "system_instruction": {
            "parts": [{
                "text": format!("{}\n\nAvailable doctors: {}\n\n{}", SYSTEM_PROMPT, roster, location)
            }]
        },
        "contents": contents
    })
}

fn content(role: Role, text: &str) -> Value {
    let role = match role {
        Role::Patient => "user",
        Role::Assistant => "model",
    };
    json!({ "role": role, "parts": [{ "text": text }] })
}

/// Text of the first candidate; an empty or missing candidate is an error.
pub fn extract_reply(data: &Value) -> Result<String, AssistantError> {
    let parts = data["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| AssistantError::ExternalService("Recommendation service returned no candidates".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(AssistantError::ExternalService(
            "Recommendation service returned an empty reply".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl RecommendationClient for HttpRecommendationClient {
    async fn recommend(&self, request: &RecommendationRequest) -> Result<String, AssistantError> {
        if self.api_key.is_empty() {
            return Err(AssistantError::ExternalService(
                "Recommendation service is not configured".to_string(),
            ));
        }

        debug!(
            "Requesting recommendation: {} doctors, {} prior turns",
            request.doctor_roster.len(),
            request.conversation_history.len()
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::ExternalService("Recommendation service timed out".to_string())
                } else {
                    AssistantError::ExternalService(format!("Recommendation request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Recommendation API error ({}): {}", status, error_text);
            return Err(AssistantError::ExternalService(format!(
                "Recommendation service returned {}",
                status
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AssistantError::ExternalService(format!("Invalid recommendation response: {}", e)))?;

        extract_reply(&data)
    }
}
