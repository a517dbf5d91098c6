// libs/appointment-cell/src/services/lifecycle.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::DoctorSummary;
use doctor_cell::services::DoctorService;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, AppointmentView, PatientAppointments};
use crate::services::store::AppointmentStore;

/// Valid next statuses for a given current status.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Scheduled => &[AppointmentStatus::Cancelled, AppointmentStatus::Completed],
        // Terminal states - no transitions allowed
        AppointmentStatus::Cancelled | AppointmentStatus::Completed => &[],
    }
}

pub fn validate_transition(current: AppointmentStatus, next: AppointmentStatus) -> Result<(), AppointmentError> {
    if valid_transitions(current).contains(&next) {
        Ok(())
    } else {
        Err(AppointmentError::InvalidTransition { from: current, to: next })
    }
}

/// Status changes after creation, plus patient-scoped reads.
///
/// Cancelling leaves the slot booked; released capacity has to be published
/// again as a new slot by the doctor-side scheduler.
pub struct AppointmentLifecycleService {
    store: Arc<dyn AppointmentStore>,
    doctors: DoctorService,
}

impl AppointmentLifecycleService {
    pub fn new(store: Arc<dyn AppointmentStore>, doctors: DoctorService) -> Self {
        Self { store, doctors }
    }

    #[instrument(skip_all, fields(appointment_id = %appointment_id, patient_id = %patient_id))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, patient_id, auth_token).await?;

        let cancelled = self
            .transition(appointment, AppointmentStatus::Cancelled, auth_token)
            .await?;
        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// Entry point for the fulfillment side; not reachable by patients.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id, auth_token).await?;

        let completed = self
            .transition(appointment, AppointmentStatus::Completed, auth_token)
            .await?;
        info!("Appointment {} completed", appointment_id);
        Ok(completed)
    }

    /// Owner-only read.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id, auth_token).await?;
        if appointment.patient_id != patient_id {
            warn!("Patient {} attempted to access appointment {}", patient_id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }
        Ok(appointment)
    }

    pub async fn get_appointment_view(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<AppointmentView, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id, patient_id, auth_token).await?;
        self.attach_doctors(std::slice::from_mut(&mut appointment)).await;
        Ok(AppointmentView::at(appointment, now))
    }

    pub async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<PatientAppointments, AppointmentError> {
        let mut appointments = self.store.list_patient_appointments(patient_id, auth_token).await?;
        debug!("Patient {} has {} appointments", patient_id, appointments.len());
        self.attach_doctors(&mut appointments).await;

        Ok(PatientAppointments::partition(appointments, now))
    }

    /// Fill in the doctor summary for rows the store returned without one.
    /// A doctor that can't be resolved leaves the summary empty.
    async fn attach_doctors(&self, appointments: &mut [Appointment]) {
        let mut resolved: HashMap<Uuid, Option<DoctorSummary>> = HashMap::new();

        for appointment in appointments.iter_mut().filter(|a| a.doctor.is_none()) {
            if !resolved.contains_key(&appointment.doctor_id) {
                let summary = match self.doctors.require_doctor(appointment.doctor_id).await {
                    Ok(doctor) => Some(DoctorSummary::from(&doctor)),
                    Err(e) => {
                        warn!("No doctor summary for appointment {}: {}", appointment.id, e);
                        None
                    }
                };
                resolved.insert(appointment.doctor_id, summary);
            }
            appointment.doctor = resolved.get(&appointment.doctor_id).cloned().flatten();
        }
    }

    async fn load(&self, appointment_id: Uuid, auth_token: Option<&str>) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id, auth_token)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    async fn transition(
        &self,
        appointment: Appointment,
        next: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        validate_transition(appointment.status, next)?;

        match self
            .store
            .transition_status(appointment.id, appointment.status, next, auth_token)
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                // Someone else moved it between our read and the conditional update.
                let current = self.load(appointment.id, auth_token).await?;
                warn!(
                    "Appointment {} changed to {} concurrently; {} rejected",
                    appointment.id, current.status, next
                );
                Err(AppointmentError::InvalidTransition {
                    from: current.status,
                    to: next,
                })
            }
        }
    }
}
