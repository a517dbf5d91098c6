// libs/doctor-cell/src/services/doctor.rs
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Doctor, DoctorError, DoctorQuery, DoctorSearchFilters, GeoPoint, RankedDoctor, Review};
use crate::services::geo::haversine_km;
use crate::services::matching::{list_specialties, rank_doctors};
use crate::services::repository::DoctorRepository;

pub const DEFAULT_REVIEW_LIMIT: usize = 5;

/// Read-side operations over the doctor roster.
#[derive(Clone)]
pub struct DoctorService {
    repository: Arc<dyn DoctorRepository>,
}

impl DoctorService {
    pub fn new(repository: Arc<dyn DoctorRepository>) -> Self {
        Self { repository }
    }

    /// Search the roster and rank the result for the requester.
    pub async fn search_doctors(
        &self,
        filters: DoctorSearchFilters,
        requester: Option<GeoPoint>,
    ) -> Result<Vec<RankedDoctor>, DoctorError> {
        filters.validate()?;
        debug!("Searching doctors with filters: {:?}", filters);

        // specialty is an exact match, so it is safe to push down to the store
        let query = DoctorQuery {
            specialty: filters.specialty().map(str::to_string),
            name: None,
        };
        let doctors = self.repository.list_doctors(&query).await?;

        let ranked = rank_doctors(doctors, &filters, requester)?;
        info!("Doctor search returned {} results", ranked.len());
        Ok(ranked)
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        requester: Option<GeoPoint>,
    ) -> Result<RankedDoctor, DoctorError> {
        let doctor = self.require_doctor(doctor_id).await?;
        let distance_km = requester
            .zip(doctor.geolocation())
            .map(|(from, to)| haversine_km(&from, &to));

        Ok(RankedDoctor { doctor, distance_km })
    }

    /// Fails with `NotFound` for an unknown id.
    pub async fn require_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        self.repository
            .get_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound(doctor_id))
    }

    pub async fn list_reviews(&self, doctor_id: Uuid, limit: Option<usize>) -> Result<Vec<Review>, DoctorError> {
        self.require_doctor(doctor_id).await?;
        let limit = limit.unwrap_or(DEFAULT_REVIEW_LIMIT).clamp(1, 50);
        self.repository.list_reviews(doctor_id, limit).await
    }

    pub async fn list_specialties(&self) -> Result<Vec<String>, DoctorError> {
        let doctors = self.roster().await?;
        Ok(list_specialties(&doctors))
    }

    /// The whole roster, unfiltered.
    pub async fn roster(&self) -> Result<Vec<Doctor>, DoctorError> {
        self.repository.list_doctors(&DoctorQuery::default()).await
    }
}
