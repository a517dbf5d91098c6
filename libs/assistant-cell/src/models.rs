use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::{Doctor, DoctorError, GeoPoint};
use shared_models::error::AppError;

// ==============================================================================
// CONVERSATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// One conversation, held in memory for as long as the session is open.
///
/// Turns alternate strictly, starting with the patient. The only way to end
/// on a patient turn is a failed reply, which `retry_pending` resolves.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
}

impl ConversationSession {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Text of the trailing patient turn that never got a reply.
    pub fn pending_message(&self) -> Option<&str> {
        self.turns
            .last()
            .filter(|turn| turn.role == Role::Patient)
            .map(|turn| turn.text.as_str())
    }

    pub fn append_patient(&mut self, text: impl Into<String>) -> Result<(), AssistantError> {
        if self.pending_message().is_some() {
            return Err(AssistantError::ReplyPending(self.id));
        }
        self.turns.push(ConversationTurn::new(Role::Patient, text));
        Ok(())
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) -> Result<(), AssistantError> {
        if self.pending_message().is_none() {
            return Err(AssistantError::NothingPending(self.id));
        }
        self.turns.push(ConversationTurn::new(Role::Assistant, text));
        Ok(())
    }

    /// Turns before the pending patient turn, or all turns when none is pending.
    pub fn answered_history(&self) -> &[ConversationTurn] {
        match self.pending_message() {
            Some(_) => &self.turns[..self.turns.len() - 1],
            None => &self.turns,
        }
    }
}

// ==============================================================================
// RECOMMENDATION CONTRACT
// ==============================================================================

/// Everything the external reasoner gets for one reply.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationRequest {
    pub doctor_roster: Vec<Doctor>,
    /// Full ordered history before `new_message`; never truncated.
    pub conversation_history: Vec<ConversationTurn>,
    pub new_message: String,
    pub requester_location: Option<GeoPoint>,
}

// ==============================================================================
// HTTP MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: Uuid,
    pub reply: String,
    pub turns: Vec<ConversationTurn>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AssistantError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conversation session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Conversation session belongs to another user")]
    Forbidden,

    #[error("Session {0} is waiting for a reply; retry it before sending a new message")]
    ReplyPending(Uuid),

    #[error("Session {0} has no message waiting for a reply")]
    NothingPending(Uuid),

    #[error("Recommendation service error: {0}")]
    ExternalService(String),

    #[error("Doctor roster unavailable: {0}")]
    Roster(String),
}

impl From<DoctorError> for AssistantError {
    fn from(err: DoctorError) -> Self {
        AssistantError::Roster(err.to_string())
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::ValidationError(msg) => AppError::ValidationError(msg),
            AssistantError::SessionNotFound(_) => AppError::NotFound(err.to_string()),
            AssistantError::Forbidden => AppError::Forbidden(err.to_string()),
            AssistantError::ReplyPending(_) | AssistantError::NothingPending(_) => {
                AppError::Conflict(err.to_string())
            }
            AssistantError::ExternalService(msg) => AppError::ExternalService(msg),
            AssistantError::Roster(msg) => AppError::Database(msg),
        }
    }
}
