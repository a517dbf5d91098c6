use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::doctor::DoctorService;
use crate::services::repository::DoctorRepository;

/// Shared state behind every doctor route.
pub struct DoctorState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn DoctorRepository>,
}

impl DoctorState {
    pub fn new(config: Arc<AppConfig>, repository: Arc<dyn DoctorRepository>) -> Self {
        Self { config, repository }
    }

    pub fn service(&self) -> DoctorService {
        DoctorService::new(self.repository.clone())
    }
}

pub fn doctor_routes(state: Arc<DoctorState>) -> Router {
    // Public routes (no authentication required)
    Router::new()
        .route("/search", get(handlers::search_doctors))
        .route("/specialties", get(handlers::list_specialties))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/reviews", get(handlers::list_reviews))
        .with_state(state)
}
