use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorError, DoctorQuery, Review};

/// Read access to the doctor roster owned by the profile collaborator.
#[async_trait]
pub trait DoctorRepository: Send + Sync {
    /// Doctors ordered by name, optionally prefiltered by specialty/name.
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<Doctor>, DoctorError>;

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError>;

    /// Newest first.
    async fn list_reviews(&self, doctor_id: Uuid, limit: usize) -> Result<Vec<Review>, DoctorError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseDoctorRepository {
    supabase: SupabaseClient,
}

impl SupabaseDoctorRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch_rows(&self, path: &str) -> Result<Vec<Value>, DoctorError> {
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, DoctorError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse {}: {}", what, e)))
        })
        .collect()
}

#[async_trait]
impl DoctorRepository for SupabaseDoctorRepository {
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<Doctor>, DoctorError> {
        let mut query_parts = vec!["select=*".to_string(), "order=full_name.asc".to_string()];

        if let Some(specialty) = query.specialty.as_deref().filter(|s| !s.is_empty()) {
            query_parts.push(format!("specialty=eq.{}", urlencoding::encode(specialty)));
        }
        if let Some(name) = query.name.as_deref().filter(|s| !s.is_empty()) {
            query_parts.push(format!("full_name=ilike.*{}*", urlencoding::encode(name)));
        }

        let path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        let rows = self.fetch_rows(&path).await?;
        debug!("Fetched {} doctor rows", rows.len());

        parse_rows(rows, "doctor")
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=*", doctor_id);
        let rows = self.fetch_rows(&path).await?;

        Ok(parse_rows(rows, "doctor")?.into_iter().next())
    }

    async fn list_reviews(&self, doctor_id: Uuid, limit: usize) -> Result<Vec<Review>, DoctorError> {
        let path = format!(
            "/rest/v1/reviews?select=*,users:user_id(full_name)&doctor_id=eq.{}&order=created_at.desc&limit={}",
            doctor_id, limit
        );
        let rows = self.fetch_rows(&path).await?;

        parse_rows(rows, "review")
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Roster held in process; used when no Supabase project is configured and in tests.
#[derive(Default)]
pub struct InMemoryDoctorRepository {
    doctors: RwLock<Vec<Doctor>>,
    reviews: RwLock<Vec<Review>>,
}

impl InMemoryDoctorRepository {
    pub fn new(doctors: Vec<Doctor>) -> Self {
        Self {
            doctors: RwLock::new(doctors),
            reviews: RwLock::new(Vec::new()),
        }
    }

    pub fn with_reviews(self, reviews: Vec<Review>) -> Self {
        Self {
            reviews: RwLock::new(reviews),
            ..self
        }
    }
}

#[async_trait]
impl DoctorRepository for InMemoryDoctorRepository {
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<Doctor>, DoctorError> {
        let doctors = self
            .doctors
            .read()
            .map_err(|_| DoctorError::DatabaseError("doctor roster lock poisoned".to_string()))?;

        let name = query.name.as_deref().map(str::to_lowercase);
        let mut matching: Vec<Doctor> = doctors
            .iter()
            .filter(|d| {
                query
                    .specialty
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map_or(true, |s| d.specialty == s)
            })
            .filter(|d| {
                name.as_deref()
                    .filter(|n| !n.is_empty())
                    .map_or(true, |n| d.full_name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.full_name.cmp(&b.full_name));

        Ok(matching)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        let doctors = self
            .doctors
            .read()
            .map_err(|_| DoctorError::DatabaseError("doctor roster lock poisoned".to_string()))?;

        Ok(doctors.iter().find(|d| d.id == doctor_id).cloned())
    }

    async fn list_reviews(&self, doctor_id: Uuid, limit: usize) -> Result<Vec<Review>, DoctorError> {
        let reviews = self
            .reviews
            .read()
            .map_err(|_| DoctorError::DatabaseError("review lock poisoned".to_string()))?;

        let mut for_doctor: Vec<Review> = reviews.iter().filter(|r| r.doctor_id == doctor_id).cloned().collect();
        for_doctor.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for_doctor.truncate(limit);

        Ok(for_doctor)
    }
}
