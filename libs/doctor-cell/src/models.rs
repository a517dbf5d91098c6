use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// DOCTOR PROFILE MODELS
// ==============================================================================

/// Doctor profile as stored by the profile-management collaborator.
///
/// Store rows are loosely typed: every optional column defaults instead of
/// failing deserialization. A doctor with no coordinates is still a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub profile_image: Option<String>,
}

impl Doctor {
    /// Usable coordinates, if the profile has both halves and they are valid.
    pub fn geolocation(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DoctorError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(DoctorError::ValidationError(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(DoctorError::ValidationError(format!(
                "Latitude {} is outside [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(DoctorError::ValidationError(format!(
                "Longitude {} is outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Parse coordinates as they arrive from a query string.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, DoctorError> {
        let lat = parse_coordinate("latitude", latitude)?;
        let lng = parse_coordinate("longitude", longitude)?;
        Self::new(lat, lng)
    }

    /// Both halves or neither; one without the other is malformed input.
    pub fn from_params(latitude: Option<&str>, longitude: Option<&str>) -> Result<Option<Self>, DoctorError> {
        match (blank_to_none(latitude), blank_to_none(longitude)) {
            (Some(lat), Some(lng)) => Self::parse(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(DoctorError::ValidationError(
                "Both lat and lng must be provided together".to_string(),
            )),
        }
    }
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f64, DoctorError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DoctorError::ValidationError(format!("{} must be numeric, got {:?}", name, raw)))
}

/// The few doctor fields shown next to an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

impl From<&Doctor> for DoctorSummary {
    fn from(doctor: &Doctor) -> Self {
        Self {
            id: doctor.id,
            full_name: doctor.full_name.clone(),
            specialty: doctor.specialty.clone(),
            profile_image: doctor.profile_image.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reviewer {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub rating: f32,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Embedded from `users` when the store supports it.
    #[serde(default, alias = "users")]
    pub reviewer: Option<Reviewer>,
}

// ==============================================================================
// SEARCH MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorSearchFilters {
    /// Exact, case-sensitive specialty; empty means any.
    pub specialty: Option<String>,
    /// Case-insensitive substring over name, specialty and bio.
    pub search_term: Option<String>,
    pub max_distance_km: Option<f64>,
}

impl DoctorSearchFilters {
    pub fn specialty(&self) -> Option<&str> {
        self.specialty.as_deref().filter(|s| !s.is_empty())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        if let Some(max) = self.max_distance_km {
            if !max.is_finite() || max < 0.0 {
                return Err(DoctorError::ValidationError(format!(
                    "max_distance_km must be a non-negative number, got {}",
                    max
                )));
            }
        }
        Ok(())
    }
}

/// Store-side prefilter; the ranking engine applies the full filter set.
#[derive(Debug, Clone, Default)]
pub struct DoctorQuery {
    pub specialty: Option<String>,
    pub name: Option<String>,
}

/// A doctor as returned by search, with distance when it could be computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedDoctor {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub distance_km: Option<f64>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound(_) => AppError::NotFound(err.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doctor_row_with_missing_columns_deserializes() {
        let row = json!({
            "id": Uuid::new_v4(),
            "full_name": "Dr. Ada",
            "specialty": "Cardiology"
        });
        let doctor: Doctor = serde_json::from_value(row).unwrap();
        assert!(doctor.geolocation().is_none());
        assert!(!doctor.is_verified);
        assert_eq!(doctor.rating, 0.0);
    }

    #[test]
    fn half_a_location_is_no_location() {
        let row = json!({
            "id": Uuid::new_v4(),
            "full_name": "Dr. Ada",
            "specialty": "Cardiology",
            "latitude": 10.0,
            "longitude": null
        });
        let doctor: Doctor = serde_json::from_value(row).unwrap();
        assert!(doctor.geolocation().is_none());
    }

    #[test]
    fn geopoint_rejects_non_numeric_and_out_of_range() {
        assert!(matches!(GeoPoint::parse("abc", "1.0"), Err(DoctorError::ValidationError(_))));
        assert!(matches!(GeoPoint::new(91.0, 0.0), Err(DoctorError::ValidationError(_))));
        assert!(matches!(GeoPoint::new(0.0, f64::NAN), Err(DoctorError::ValidationError(_))));
        assert_eq!(GeoPoint::parse(" 1.5 ", "-2").unwrap(), GeoPoint { latitude: 1.5, longitude: -2.0 });
    }

    #[test]
    fn from_params_requires_both_halves() {
        assert_eq!(GeoPoint::from_params(None, None).unwrap(), None);
        assert_eq!(GeoPoint::from_params(Some(""), Some(" ")).unwrap(), None);
        assert!(GeoPoint::from_params(Some("1.0"), None).is_err());
        assert!(GeoPoint::from_params(Some("1.0"), Some("2.0")).unwrap().is_some());
    }

    #[test]
    fn negative_max_distance_is_invalid() {
        let filters = DoctorSearchFilters {
            max_distance_km: Some(-1.0),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn ranked_doctor_serializes_flat() {
        let ranked = RankedDoctor {
            doctor: Doctor {
                id: Uuid::nil(),
                full_name: "Dr. Flat".to_string(),
                specialty: "Dermatology".to_string(),
                bio: None,
                latitude: None,
                longitude: None,
                rating: 4.0,
                consultation_fee: 80.0,
                is_verified: true,
                profile_image: None,
            },
            distance_km: None,
        };
        let value = serde_json::to_value(&ranked).unwrap();
        assert_eq!(value["full_name"], "Dr. Flat");
        assert!(value["distance_km"].is_null());
    }
}
