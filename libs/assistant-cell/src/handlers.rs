use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use doctor_cell::models::GeoPoint;
use doctor_cell::services::{resolve_location, RequestLocation};
use shared_models::auth::AuthContext;
use shared_models::error::AppError;

use crate::models::{ChatReply, SendMessageRequest};
use crate::router::AssistantState;

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

async fn requester_location(state: &AssistantState, query: &LocationQuery) -> Result<Option<GeoPoint>, AppError> {
    let supplied = GeoPoint::from_params(query.lat.as_deref(), query.lng.as_deref())?;
    Ok(resolve_location(&RequestLocation(supplied), state.config.location_timeout()).await)
}

async fn reply_body(
    state: &AssistantState,
    session_id: Uuid,
    owner_id: &str,
    reply: String,
) -> Result<Json<Value>, AppError> {
    let turns = state.service.get_history(session_id, owner_id).await?;
    Ok(Json(json!(ChatReply { session_id, reply, turns })))
}

#[axum::debug_handler]
pub async fn create_session(
    State(state): State<Arc<AssistantState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let session_id = state.service.create_session(&ctx.user.id).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session_id,
            "turns": []
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<Arc<AssistantState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let turns = state.service.get_history(session_id, &ctx.user.id).await?;

    Ok(Json(json!({
        "session_id": session_id,
        "turns": turns,
        "total": turns.len()
    })))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AssistantState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<LocationQuery>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let location = requester_location(&state, &query).await?;
    let reply = state
        .service
        .send_message(session_id, &ctx.user.id, &request.text, location)
        .await?;

    reply_body(&state, session_id, &ctx.user.id, reply).await
}

#[axum::debug_handler]
pub async fn retry_pending(
    State(state): State<Arc<AssistantState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Value>, AppError> {
    let location = requester_location(&state, &query).await?;
    let reply = state
        .service
        .retry_pending(session_id, &ctx.user.id, location)
        .await?;

    reply_body(&state, session_id, &ctx.user.id, reply).await
}

#[axum::debug_handler]
pub async fn close_session(
    State(state): State<Arc<AssistantState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.close_session(session_id, &ctx.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
