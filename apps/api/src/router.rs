use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use tracing::info;

use appointment_cell::router::{appointment_routes, AppointmentState};
use appointment_cell::services::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
use assistant_cell::router::{assistant_routes, AssistantState};
use assistant_cell::services::{HttpRecommendationClient, RecommendationClient};
use doctor_cell::router::{doctor_routes, DoctorState};
use doctor_cell::services::{DoctorRepository, InMemoryDoctorRepository, SupabaseDoctorRepository};
use shared_config::AppConfig;

/// Backing collaborators shared by every cell.
pub struct Stores {
    pub doctors: Arc<dyn DoctorRepository>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub recommender: Arc<dyn RecommendationClient>,
}

impl Stores {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let (doctors, appointments): (Arc<dyn DoctorRepository>, Arc<dyn AppointmentStore>) =
            if config.is_configured() {
                info!("Using Supabase at {}", config.supabase_url);
                (
                    Arc::new(SupabaseDoctorRepository::new(config)),
                    Arc::new(SupabaseAppointmentStore::new(config)),
                )
            } else {
                (
                    Arc::new(InMemoryDoctorRepository::default()),
                    Arc::new(InMemoryAppointmentStore::new()),
                )
            };

        let recommender =
            HttpRecommendationClient::new(config).context("failed to build recommendation client")?;

        Ok(Self {
            doctors,
            appointments,
            recommender: Arc::new(recommender),
        })
    }
}

pub fn create_router(config: Arc<AppConfig>, stores: Stores) -> Router {
    let doctor_state = DoctorState::new(config.clone(), stores.doctors.clone());
    let appointment_state = AppointmentState::new(config.clone(), stores.appointments, stores.doctors.clone());
    let assistant_state = AssistantState::new(config, stores.doctors, stores.recommender);

    Router::new()
        .route("/", get(|| async { "CareMatch API is running!" }))
        .nest("/doctors", doctor_routes(Arc::new(doctor_state)))
        .nest("/appointments", appointment_routes(Arc::new(appointment_state)))
        .nest("/chat", assistant_routes(Arc::new(assistant_state)))
}
