// libs/appointment-cell/src/router.rs
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
use crate::services::{AppointmentBookingService, AppointmentLifecycleService, AppointmentStore};

pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AppointmentStore>,
    pub doctors: Arc<dyn DoctorRepository>,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn AppointmentStore>,
        doctors: Arc<dyn DoctorRepository>,
    ) -> Self {
        Self { config, store, doctors }
    }

    pub fn booking_service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(
            self.store.clone(),
            DoctorService::new(self.doctors.clone()),
            self.config.slot_window_days,
        )
    }

    pub fn lifecycle_service(&self) -> AppointmentLifecycleService {
        AppointmentLifecycleService::new(self.store.clone(), DoctorService::new(self.doctors.clone()))
    }
}

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    // Slot browsing is public
    let public_routes = Router::new().route("/doctors/{doctor_id}/slots", get(handlers::get_available_slots));

    // Everything that reads or changes a patient's appointments requires authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
