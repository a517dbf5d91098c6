use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{AuthContext, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn to_context(&self) -> AuthContext {
        AuthContext::new(self.to_user(), "test-access-token")
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// JSON rows shaped like the Supabase tables the cells read.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(
        doctor_id: &str,
        full_name: &str,
        specialty: &str,
        location: Option<(f64, f64)>,
    ) -> Value {
        json!({
            "id": doctor_id,
            "full_name": full_name,
            "specialty": specialty,
            "bio": format!("{} specialist", specialty),
            "latitude": location.map(|(lat, _)| lat),
            "longitude": location.map(|(_, lng)| lng),
            "rating": 4.5,
            "consultation_fee": 120.0,
            "is_verified": true,
            "profile_image": null
        })
    }

    pub fn slot_response(slot_id: &str, doctor_id: &str, slot_date: DateTime<Utc>, is_booked: bool) -> Value {
        json!({
            "id": slot_id,
            "doctor_id": doctor_id,
            "slot_date": slot_date.to_rfc3339(),
            "is_booked": is_booked
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        user_id: &str,
        doctor_id: &str,
        slot_id: &str,
        appointment_date: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "user_id": user_id,
            "doctor_id": doctor_id,
            "slot_id": slot_id,
            "appointment_date": appointment_date.to_rfc3339(),
            "appointment_type": "video",
            "reason": "fever",
            "status": status,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn review_response(doctor_id: &str, rating: u8, comment: &str, created_at: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "user_id": Uuid::new_v4(),
            "rating": rating,
            "comment": comment,
            "created_at": created_at,
            "users": { "full_name": format!("Reviewer of {}", comment) }
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_jwt_secret, config.jwt_secret);
        assert_eq!(app_config.supabase_url, config.supabase_url);
        assert!(app_config.is_configured());
    }

    #[test]
    fn test_user_context_uses_uuid_subject() {
        let user = TestUser::patient("p@example.com");
        let ctx = user.to_context();
        assert_eq!(ctx.patient_id().unwrap(), user.uuid());
    }

    #[test]
    fn doctor_fixture_without_location_has_null_coordinates() {
        let doctor = MockSupabaseResponses::doctor_response("d1", "Dr. A", "Cardiology", None);
        assert!(doctor["latitude"].is_null());
        assert_eq!(doctor["specialty"], "Cardiology");
    }
}
