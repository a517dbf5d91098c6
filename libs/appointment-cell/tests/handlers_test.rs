// libs/appointment-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::AvailableSlot;
use appointment_cell::router::{appointment_routes, AppointmentState};
use appointment_cell::services::InMemoryAppointmentStore;
use doctor_cell::models::Doctor;
use doctor_cell::services::InMemoryDoctorRepository;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct Harness {
    app: Router,
    store: Arc<InMemoryAppointmentStore>,
    doctor_id: Uuid,
    config: TestConfig,
}

impl Harness {
    fn new() -> Self {
        let config = TestConfig::default();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Booked".to_string(),
            specialty: "General Practice".to_string(),
            bio: None,
            latitude: None,
            longitude: None,
            rating: 4.8,
            consultation_fee: 60.0,
            is_verified: true,
            profile_image: None,
        };
        let doctor_id = doctor.id;
        let store = Arc::new(InMemoryAppointmentStore::new());
        let state = AppointmentState::new(
            config.to_arc(),
            store.clone(),
            Arc::new(InMemoryDoctorRepository::new(vec![doctor])),
        );

        Self {
            app: Router::new().nest("/appointments", appointment_routes(Arc::new(state))),
            store,
            doctor_id,
            config,
        }
    }

    async fn slot_in(&self, hours: i64) -> AvailableSlot {
        self.store.add_slot(self.doctor_id, Utc::now() + Duration::hours(hours)).await
    }

    fn token(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.jwt_secret, None)
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn book(&self, token: &str, slot_id: Uuid, kind: &str, reason: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/appointments",
            Some(token),
            Some(json!({ "slot_id": slot_id, "appointment_type": kind, "reason": reason })),
        )
        .await
    }
}

#[tokio::test]
async fn slots_are_public_and_exclude_booked_ones() {
    let h = Harness::new();
    let first = h.slot_in(2).await;
    let second = h.slot_in(4).await;

    let patient = TestUser::patient("slots@example.com");
    let (status, _) = h.book(&h.token(&patient), first.id, "video", "fever").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h
        .call(Method::GET, &format!("/appointments/doctors/{}/slots", h.doctor_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["slots"][0]["id"], second.id.to_string());
}

#[tokio::test]
async fn slots_for_unknown_doctor_are_404() {
    let h = Harness::new();
    let (status, body) = h
        .call(Method::GET, &format!("/appointments/doctors/{}/slots", Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn inverted_slot_range_is_rejected() {
    let h = Harness::new();
    let uri = format!(
        "/appointments/doctors/{}/slots?from=2024-05-02T00:00:00Z&to=2024-05-01T00:00:00Z",
        h.doctor_id
    );
    let (status, body) = h.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn booking_requires_a_token() {
    let h = Harness::new();
    let slot = h.slot_in(2).await;
    let (status, _) = h
        .call(
            Method::POST,
            "/appointments",
            None,
            Some(json!({ "slot_id": slot.id, "appointment_type": "video", "reason": "fever" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_then_rebooking_same_slot_conflicts() {
    let h = Harness::new();
    let slot = h.slot_in(3).await;
    let alice = TestUser::patient("alice@example.com");
    let bob = TestUser::patient("bob@example.com");

    let (status, body) = h.book(&h.token(&alice), slot.id, "video", "fever").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["status"], "scheduled");
    assert_eq!(body["appointment"]["reason"], "fever");
    assert_eq!(body["appointment"]["patient_id"], alice.id);

    for user in [&alice, &bob] {
        let (status, body) = h.book(&h.token(user), slot.id, "in_person", "fever").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");
    }
    assert_eq!(h.store.appointments_for_slot(slot.id).await.len(), 1);
}

#[tokio::test]
async fn booking_an_unknown_slot_is_404_not_409() {
    let h = Harness::new();
    let patient = TestUser::patient("nobody@example.com");
    let (status, body) = h.book(&h.token(&patient), Uuid::new_v4(), "video", "fever").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn booking_validation_errors_are_400() {
    let h = Harness::new();
    let slot = h.slot_in(2).await;
    let token = h.token(&TestUser::patient("v@example.com"));

    let (status, body) = h.book(&token, slot.id, "video", "  ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = h.book(&token, slot.id, "carrier_pigeon", "fever").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // nothing was claimed
    let stored = h.store.appointments_for_slot(slot.id).await;
    assert!(stored.is_empty());
}

#[tokio::test]
async fn cancel_then_cancel_again_is_invalid_transition() {
    let h = Harness::new();
    let slot = h.slot_in(5).await;
    let patient = TestUser::patient("cancel@example.com");
    let token = h.token(&patient);

    let (_, body) = h.book(&token, slot.id, "video", "fever").await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = h
        .call(Method::POST, &format!("/appointments/{}/cancel", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled");

    let (status, body) = h
        .call(Method::POST, &format!("/appointments/{}/cancel", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn other_patients_cannot_cancel_or_view() {
    let h = Harness::new();
    let slot = h.slot_in(5).await;
    let owner = TestUser::patient("owner@example.com");
    let intruder = TestUser::patient("intruder@example.com");

    let (_, body) = h.book(&h.token(&owner), slot.id, "video", "fever").await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, _) = h
        .call(Method::POST, &format!("/appointments/{}/cancel", id), Some(&h.token(&intruder)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call(Method::GET, &format!("/appointments/{}", id), Some(&h.token(&intruder)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h
        .call(Method::GET, &format!("/appointments/{}", id), Some(&h.token(&owner)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_status"], "scheduled");
    assert_eq!(body["doctor"]["full_name"], "Dr. Booked");
}

#[tokio::test]
async fn listing_splits_upcoming_and_past() {
    let h = Harness::new();
    let patient = TestUser::patient("list@example.com");
    let token = h.token(&patient);

    let past_missed = h.slot_in(-3).await;
    let past_cancelled = h.slot_in(-2).await;
    let future = h.slot_in(6).await;

    for slot in [&past_missed, &past_cancelled, &future] {
        let (status, _) = h.book(&token, slot.id, "in_person", "checkup").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, list) = h.call(Method::GET, "/appointments", Some(&token), None).await;
    let cancelled_id = list["upcoming"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["slot_id"] == past_cancelled.id.to_string())
        .map(|a| a["id"].as_str().unwrap().to_string())
        .unwrap();
    h.call(Method::POST, &format!("/appointments/{}/cancel", cancelled_id), Some(&token), None)
        .await;

    let (status, list) = h.call(Method::GET, "/appointments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let upcoming: Vec<&str> = list["upcoming"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["display_status"].as_str().unwrap())
        .collect();
    assert_eq!(upcoming, vec!["missed", "scheduled"]);

    let past: Vec<&str> = list["past"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["display_status"].as_str().unwrap())
        .collect();
    assert_eq!(past, vec!["cancelled"]);
}

#[tokio::test]
async fn listing_shows_who_each_appointment_is_with() {
    let h = Harness::new();
    let patient = TestUser::patient("withdoctor@example.com");
    let token = h.token(&patient);
    let slot = h.slot_in(3).await;
    h.book(&token, slot.id, "video", "headache").await;

    let (status, list) = h.call(Method::GET, "/appointments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let doctor = &list["upcoming"][0]["doctor"];
    assert_eq!(doctor["id"], h.doctor_id.to_string());
    assert_eq!(doctor["full_name"], "Dr. Booked");
    assert_eq!(doctor["specialty"], "General Practice");
}
