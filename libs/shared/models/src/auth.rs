use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-request identity handed explicitly to every mutating operation.
///
/// Built by the auth middleware from a validated bearer token; the raw token
/// is kept so store calls can be made on behalf of the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub access_token: String,
}

impl AuthContext {
    pub fn new(user: User, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
        }
    }

    /// The caller's id as a patient reference.
    pub fn patient_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.user.id)
            .map_err(|_| AppError::Auth(format!("Subject {} is not a valid user id", self.user.id)))
    }

    pub fn token(&self) -> &str {
        &self.access_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: None,
            role: Some("patient".to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn patient_id_parses_uuid_subject() {
        let id = Uuid::new_v4();
        let ctx = AuthContext::new(user(&id.to_string()), "token");
        assert_eq!(ctx.patient_id().unwrap(), id);
        assert_eq!(ctx.token(), "token");
    }

    #[test]
    fn patient_id_rejects_non_uuid_subject() {
        let ctx = AuthContext::new(user("not-a-uuid"), "token");
        assert!(matches!(ctx.patient_id(), Err(AppError::Auth(_))));
    }
}
