use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{DoctorError, DoctorSearchFilters, GeoPoint};
use crate::router::DoctorState;
use crate::services::location::{resolve_location, RequestLocation};

// Query parameters arrive as raw strings so malformed numbers surface as
// validation errors rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct DoctorSearchQuery {
    pub specialty: Option<String>,
    pub search_term: Option<String>,
    pub max_distance_km: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub limit: Option<usize>,
}

fn parse_max_distance(raw: Option<&str>) -> Result<Option<f64>, DoctorError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| DoctorError::ValidationError(format!("max_distance_km must be numeric, got {:?}", v))),
    }
}

/// Turn optional lat/lng params into a resolved requester location.
async fn requester_location(
    state: &DoctorState,
    lat: Option<&str>,
    lng: Option<&str>,
) -> Result<Option<GeoPoint>, DoctorError> {
    let supplied = GeoPoint::from_params(lat, lng)?;
    Ok(resolve_location(&RequestLocation(supplied), state.config.location_timeout()).await)
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_doctors(
    State(state): State<Arc<DoctorState>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let requester = requester_location(&state, query.lat.as_deref(), query.lng.as_deref()).await?;

    let max_distance_km = match parse_max_distance(query.max_distance_km.as_deref())? {
        Some(max) => Some(max),
        // only meaningful when there is a location to measure from
        None if requester.is_some() => Some(state.config.default_max_distance_km),
        None => None,
    };

    let filters = DoctorSearchFilters {
        specialty: query.specialty,
        search_term: query.search_term,
        max_distance_km,
    };
    debug!("Doctor search request: {:?}, location known: {}", filters, requester.is_some());

    let doctors = state.service().search_doctors(filters, requester).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len(),
        "location_known": requester.is_some()
    })))
}

#[axum::debug_handler]
pub async fn list_specialties(State(state): State<Arc<DoctorState>>) -> Result<Json<Value>, AppError> {
    let specialties = state.service().list_specialties().await?;

    Ok(Json(json!({ "specialties": specialties })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<DoctorState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Value>, AppError> {
    let requester = requester_location(&state, query.lat.as_deref(), query.lng.as_deref()).await?;
    let doctor = state.service().get_doctor(doctor_id, requester).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn list_reviews(
    State(state): State<Arc<DoctorState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Value>, AppError> {
    let reviews = state.service().list_reviews(doctor_id, query.limit).await?;

    Ok(Json(json!({
        "reviews": reviews,
        "total": reviews.len()
    })))
}
