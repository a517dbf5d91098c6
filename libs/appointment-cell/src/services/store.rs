// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{ApiRejection, SupabaseClient};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, AvailableSlot, NewAppointment, SlotRange};

/// Persistence for slots and appointments.
///
/// `reserve_slot` is one operation so each implementation owns its atomicity:
/// either the slot is claimed and the appointment exists, or neither happened.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Unbooked slots for a doctor within `range`, ascending by time.
    async fn list_open_slots(
        &self,
        doctor_id: Uuid,
        range: SlotRange,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, AppointmentError>;

    async fn get_slot(&self, slot_id: Uuid, auth_token: Option<&str>) -> Result<Option<AvailableSlot>, AppointmentError>;

    /// Claim the slot if it is still open and create the appointment.
    ///
    /// Fails with `SlotNotFound` when the slot does not exist and
    /// `SlotUnavailable` when it exists but is already booked, including
    /// when another caller claimed it first.
    async fn reserve_slot(
        &self,
        booking: &NewAppointment,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError>;

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Move `appointment_id` from `from` to `to` only if it is currently in
    /// `from`. `Ok(None)` means the condition did not hold.
    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

/// Appointment columns plus the embedded doctor summary.
const WITH_DOCTOR: &str = "*,doctors:doctor_id(id,full_name,specialty,profile_image)";

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<Value>, AppointmentError> {
        self.supabase
            .request(Method::GET, path, auth_token, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// PATCH with `Prefer: return=representation`; the rows that matched the
    /// filter come back, so an empty result means nothing was updated.
    async fn patch_returning(
        &self,
        path: &str,
        body: Value,
        auth_token: Option<&str>,
    ) -> Result<Vec<Value>, AppointmentError> {
        self.supabase
            .request_with_headers(
                Method::PATCH,
                path,
                auth_token,
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// The insert may have been applied even though we never saw the answer.
    /// The appointment id was generated here, so look the row up: release the
    /// claim only once the row is known to be absent.
    async fn settle_unknown_insert(
        &self,
        appointment: Appointment,
        cause: anyhow::Error,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        warn!("Outcome of appointment {} insert unknown: {}", appointment.id, cause);

        match self.get_appointment(appointment.id, auth_token).await {
            Ok(Some(stored)) => {
                info!("Appointment {} was committed despite the failed response", stored.id);
                Ok(stored)
            }
            Ok(None) => {
                self.release_claim(appointment.slot_id, auth_token).await;
                Err(AppointmentError::DatabaseError(format!("Failed to create appointment: {}", cause)))
            }
            Err(lookup) => {
                // The claim is only released once the row is known to be absent.
                error!(
                    "Could not confirm appointment {}; slot {} stays claimed: {}",
                    appointment.id, appointment.slot_id, lookup
                );
                Err(AppointmentError::DatabaseError(format!(
                    "Appointment {} outcome unknown: {}",
                    appointment.id, cause
                )))
            }
        }
    }

    /// Undo a claim whose appointment insert failed.
    async fn release_claim(&self, slot_id: Uuid, auth_token: Option<&str>) {
        let path = format!("/rest/v1/available_slots?id=eq.{}&is_booked=eq.true", slot_id);
        match self.patch_returning(&path, json!({ "is_booked": false }), auth_token).await {
            Ok(_) => warn!("Released slot {} after failed appointment insert", slot_id),
            Err(e) => error!("Failed to release slot {} after failed appointment insert: {}", slot_id, e),
        }
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, AppointmentError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse {}: {}", what, e)))
        })
        .collect()
}

fn first_row<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Option<T>, AppointmentError> {
    Ok(parse_rows(rows, what)?.into_iter().next())
}

/// The row PostgREST echoed for a committed insert, or the locally built
/// appointment when the echo is missing or unreadable.
fn accepted_row(rows: Vec<Value>, local: Appointment) -> Appointment {
    match first_row::<Appointment>(rows, "appointment") {
        Ok(Some(stored)) => stored,
        Ok(None) => local,
        Err(e) => {
            warn!("Appointment {} committed but echo unreadable: {}", local.id, e);
            local
        }
    }
}

fn timestamp_param(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339()).into_owned()
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list_open_slots(
        &self,
        doctor_id: Uuid,
        range: SlotRange,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let path = format!(
            "/rest/v1/available_slots?doctor_id=eq.{}&is_booked=eq.false&slot_date=gte.{}&slot_date=lte.{}&order=slot_date.asc",
            doctor_id,
            timestamp_param(range.from),
            timestamp_param(range.to)
        );
        let rows = self.fetch(&path, auth_token).await?;
        debug!("Fetched {} open slots for doctor {}", rows.len(), doctor_id);

        parse_rows(rows, "slot")
    }

    async fn get_slot(&self, slot_id: Uuid, auth_token: Option<&str>) -> Result<Option<AvailableSlot>, AppointmentError> {
        let path = format!("/rest/v1/available_slots?id=eq.{}", slot_id);
        first_row(self.fetch(&path, auth_token).await?, "slot")
    }

    async fn reserve_slot(
        &self,
        booking: &NewAppointment,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let slot_id = booking.slot_id;

        // Conditional flip: only matches while the slot is still open.
        let claim_path = format!("/rest/v1/available_slots?id=eq.{}&is_booked=eq.false", slot_id);
        let claimed = self
            .patch_returning(&claim_path, json!({ "is_booked": true }), auth_token)
            .await?;

        let slot: AvailableSlot = match first_row(claimed, "slot")? {
            Some(slot) => slot,
            None => {
                return match self.get_slot(slot_id, auth_token).await? {
                    Some(_) => Err(AppointmentError::SlotUnavailable(slot_id)),
                    None => Err(AppointmentError::SlotNotFound(slot_id)),
                };
            }
        };

        let appointment = booking.clone().into_appointment(&slot, Utc::now());
        let insert_body = json!({
            "id": appointment.id,
            "user_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "slot_id": appointment.slot_id,
            "appointment_date": appointment.appointment_date.to_rfc3339(),
            "appointment_type": appointment.appointment_type.as_str(),
            "reason": appointment.reason,
            "status": appointment.status.as_str(),
            "created_at": appointment.created_at.to_rfc3339(),
        });

        let inserted: Result<Vec<Value>, _> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                auth_token,
                Some(insert_body),
                Some(SupabaseClient::representation_headers()),
            )
            .await;

        match inserted {
            Ok(rows) => Ok(accepted_row(rows, appointment)),
            Err(e) if ApiRejection::is_rejection(&e) => {
                self.release_claim(slot_id, auth_token).await;
                Err(AppointmentError::DatabaseError(format!("Failed to create appointment: {}", e)))
            }
            Err(e) => self.settle_unknown_insert(appointment, e, auth_token).await,
        }
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?select={}&id=eq.{}", WITH_DOCTOR, appointment_id);
        first_row(self.fetch(&path, auth_token).await?, "appointment")
    }

    async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select={}&user_id=eq.{}&order=appointment_date.asc",
            WITH_DOCTOR, patient_id
        );
        parse_rows(self.fetch(&path, auth_token).await?, "appointment")
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            from.as_str()
        );
        let rows = self
            .patch_returning(&path, json!({ "status": to.as_str() }), auth_token)
            .await?;

        first_row(rows, "appointment")
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
struct Tables {
    slots: HashMap<Uuid, AvailableSlot>,
    appointments: Vec<Appointment>,
}

/// Process-local store; the slot flip and the insert happen under one guard.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    tables: Mutex<Tables>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new open slot, as the doctor-side scheduler would.
    pub async fn add_slot(&self, doctor_id: Uuid, slot_date: DateTime<Utc>) -> AvailableSlot {
        let slot = AvailableSlot {
            id: Uuid::new_v4(),
            doctor_id,
            slot_date,
            is_booked: false,
        };
        self.tables.lock().await.slots.insert(slot.id, slot.clone());
        slot
    }

    pub async fn appointments_for_slot(&self, slot_id: Uuid) -> Vec<Appointment> {
        self.tables
            .lock()
            .await
            .appointments
            .iter()
            .filter(|a| a.slot_id == slot_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn list_open_slots(
        &self,
        doctor_id: Uuid,
        range: SlotRange,
        _auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<AvailableSlot> = tables
            .slots
            .values()
            .filter(|s| s.doctor_id == doctor_id && !s.is_booked && range.contains(s.slot_date))
            .cloned()
            .collect();
        slots.sort_by(|a, b| a.slot_date.cmp(&b.slot_date));
        Ok(slots)
    }

    async fn get_slot(&self, slot_id: Uuid, _auth_token: Option<&str>) -> Result<Option<AvailableSlot>, AppointmentError> {
        Ok(self.tables.lock().await.slots.get(&slot_id).cloned())
    }

    async fn reserve_slot(
        &self,
        booking: &NewAppointment,
        _auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let mut tables = self.tables.lock().await;

        let slot = tables
            .slots
            .get_mut(&booking.slot_id)
            .ok_or(AppointmentError::SlotNotFound(booking.slot_id))?;
        if slot.is_booked {
            return Err(AppointmentError::SlotUnavailable(booking.slot_id));
        }
        slot.is_booked = true;

        let appointment = booking.clone().into_appointment(slot, Utc::now());
        tables.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        _auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let tables = self.tables.lock().await;
        Ok(tables.appointments.iter().find(|a| a.id == appointment_id).cloned())
    }

    async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        _auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let tables = self.tables.lock().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));
        Ok(appointments)
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        _auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut tables = self.tables.lock().await;
        match tables
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment_id && a.status == from)
        {
            Some(appointment) => {
                appointment.status = to;
                Ok(Some(appointment.clone()))
            }
            None => Ok(None),
        }
    }
}
