// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::{DoctorError, DoctorSummary};
use shared_models::error::AppError;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A single bookable point in time for one doctor.
///
/// Created by the doctor-side scheduling collaborator; only the reservation
/// engine ever flips `is_booked`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: DateTime<Utc>,
    #[serde(default)]
    pub is_booked: bool,
}

/// Inclusive time window for slot listing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SlotRange {
    /// Fill in missing bounds from `now` and the configured window.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Result<Self, AppointmentError> {
        let from = from.unwrap_or(now);
        let to = to.unwrap_or_else(|| from + Duration::days(window_days));

        if from > to {
            return Err(AppointmentError::ValidationError(format!(
                "Range start {} is after range end {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(alias = "user_id")]
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    /// Copied from the slot at booking time.
    pub appointment_date: DateTime<Utc>,
    pub appointment_type: VisitType,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    /// Who the appointment is with. Embedded by the store when it can join,
    /// otherwise filled in by the lifecycle service on read.
    #[serde(default, alias = "doctors", skip_serializing_if = "Option::is_none")]
    pub doctor: Option<DoctorSummary>,
}

impl Appointment {
    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        display_status(&self.status, self.appointment_date, now)
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        now > self.appointment_date
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Video,
    #[serde(alias = "in-person")]
    InPerson,
}

impl VisitType {
    pub fn parse(raw: &str) -> Result<Self, AppointmentError> {
        match raw.trim() {
            "video" => Ok(VisitType::Video),
            "in_person" | "in-person" => Ok(VisitType::InPerson),
            other => Err(AppointmentError::ValidationError(format!(
                "Unknown visit type {:?}; expected \"video\" or \"in_person\"",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::Video => "video",
            VisitType::InPerson => "in_person",
        }
    }
}

/// Persisted lifecycle state. `Scheduled` is initial; the other two are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-time label. `Missed` is never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Scheduled,
    Missed,
    Cancelled,
    Completed,
}

pub fn display_status(status: &AppointmentStatus, appointment_date: DateTime<Utc>, now: DateTime<Utc>) -> DisplayStatus {
    match status {
        AppointmentStatus::Scheduled if now > appointment_date => DisplayStatus::Missed,
        AppointmentStatus::Scheduled => DisplayStatus::Scheduled,
        AppointmentStatus::Cancelled => DisplayStatus::Cancelled,
        AppointmentStatus::Completed => DisplayStatus::Completed,
    }
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub slot_id: Uuid,
    /// "video" or "in_person"; kept raw so a bad value is a validation error.
    pub appointment_type: String,
    pub reason: String,
}

/// A booking that passed validation and is ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub slot_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type: VisitType,
    pub reason: String,
}

impl NewAppointment {
    pub fn validate(patient_id: Uuid, request: BookAppointmentRequest) -> Result<Self, AppointmentError> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Reason for the visit is required".to_string(),
            ));
        }
        let appointment_type = VisitType::parse(&request.appointment_type)?;

        Ok(Self {
            slot_id: request.slot_id,
            patient_id,
            appointment_type,
            reason: reason.to_string(),
        })
    }

    /// The appointment this booking becomes once its slot is claimed.
    pub fn into_appointment(self, slot: &AvailableSlot, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            doctor_id: slot.doctor_id,
            slot_id: slot.id,
            appointment_date: slot.slot_date,
            appointment_type: self.appointment_type,
            reason: self.reason,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            doctor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub display_status: DisplayStatus,
}

impl AppointmentView {
    pub fn at(appointment: Appointment, now: DateTime<Utc>) -> Self {
        let display_status = appointment.display_status(now);
        Self {
            appointment,
            display_status,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatientAppointments {
    pub upcoming: Vec<AppointmentView>,
    pub past: Vec<AppointmentView>,
}

impl PatientAppointments {
    /// Partition by time. A past appointment that is still scheduled stays in
    /// `upcoming` (shown as missed) until something moves it out of `scheduled`.
    pub fn partition(mut appointments: Vec<Appointment>, now: DateTime<Utc>) -> Self {
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));

        let (past, upcoming): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|a| a.is_past(now) && a.status != AppointmentStatus::Scheduled);

        Self {
            upcoming: upcoming.into_iter().map(|a| AppointmentView::at(a, now)).collect(),
            past: past.into_iter().map(|a| AppointmentView::at(a, now)).collect(),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Doctor not found: {0}")]
    DoctorNotFound(Uuid),

    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Slot {0} is no longer available")]
    SlotUnavailable(Uuid),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound(id) => AppointmentError::DoctorNotFound(id),
            DoctorError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DoctorNotFound(_)
            | AppointmentError::SlotNotFound(_)
            | AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::SlotUnavailable(_) => AppError::Conflict(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
