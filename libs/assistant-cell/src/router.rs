use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use doctor_cell::services::{DoctorRepository, DoctorService};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{AssistantService, RecommendationClient};

/// Sessions live inside the service, so one instance is shared by every request.
pub struct AssistantState {
    pub config: Arc<AppConfig>,
    pub service: Arc<AssistantService>,
}

impl AssistantState {
    pub fn new(
        config: Arc<AppConfig>,
        doctors: Arc<dyn DoctorRepository>,
        client: Arc<dyn RecommendationClient>,
    ) -> Self {
        let service = AssistantService::new(DoctorService::new(doctors), client);
        Self {
            config,
            service: Arc::new(service),
        }
    }
}

pub fn assistant_routes(state: Arc<AssistantState>) -> Router {
    Router::new()
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{session_id}",
            get(handlers::get_history).delete(handlers::close_session),
        )
        .route("/sessions/{session_id}/messages", post(handlers::send_message))
        .route("/sessions/{session_id}/retry", post(handlers::retry_pending))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
