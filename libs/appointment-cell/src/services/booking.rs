// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::services::DoctorService;

use crate::models::{
    Appointment, AppointmentError, AvailableSlot, BookAppointmentRequest, NewAppointment, SlotRange,
};
use crate::services::store::AppointmentStore;

/// Slot listing and reservation.
///
/// The booking invariant (one appointment per slot) is enforced by the
/// store's conditional claim, never by a read-then-write here.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    doctors: DoctorService,
    slot_window_days: i64,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, doctors: DoctorService, slot_window_days: i64) -> Self {
        Self {
            store,
            doctors,
            slot_window_days,
        }
    }

    /// Open slots for a doctor, ascending by time.
    ///
    /// Missing bounds default to `[now, now + slot_window_days]`.
    pub async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let range = SlotRange::resolve(from, to, now, self.slot_window_days)?;
        self.doctors.require_doctor(doctor_id).await?;

        let mut slots = self.store.list_open_slots(doctor_id, range, auth_token).await?;
        slots.retain(|slot| !slot.is_booked);
        slots.sort_by(|a, b| a.slot_date.cmp(&b.slot_date));

        debug!("Doctor {} has {} open slots in range", doctor_id, slots.len());
        Ok(slots)
    }

    /// Claim a slot for the patient and create the scheduled appointment.
    ///
    /// Input is validated before the store is touched. A lost race surfaces
    /// as `SlotUnavailable`; retrying with another slot is the caller's call.
    #[instrument(skip_all, fields(slot_id = %request.slot_id, patient_id = %patient_id))]
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let booking = NewAppointment::validate(patient_id, request)?;

        match self.store.reserve_slot(&booking, auth_token).await {
            Ok(appointment) => {
                info!(
                    "Appointment {} booked for slot {} with doctor {}",
                    appointment.id, appointment.slot_id, appointment.doctor_id
                );
                Ok(appointment)
            }
            Err(AppointmentError::SlotUnavailable(slot_id)) => {
                warn!("Slot {} already booked; reservation rejected", slot_id);
                Err(AppointmentError::SlotUnavailable(slot_id))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, VisitType};
    use crate::services::store::InMemoryAppointmentStore;
    use chrono::Duration;
    use doctor_cell::models::Doctor;
    use doctor_cell::services::InMemoryDoctorRepository;

    fn doctor() -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Slot".to_string(),
            specialty: "GP".to_string(),
            bio: None,
            latitude: None,
            longitude: None,
            rating: 4.0,
            consultation_fee: 50.0,
            is_verified: true,
            profile_image: None,
        }
    }

    fn service(store: Arc<InMemoryAppointmentStore>, doctors: Vec<Doctor>) -> AppointmentBookingService {
        let repository = Arc::new(InMemoryDoctorRepository::new(doctors));
        AppointmentBookingService::new(store, DoctorService::new(repository), 7)
    }

    fn request(slot_id: Uuid, kind: &str, reason: &str) -> BookAppointmentRequest {
        BookAppointmentRequest {
            slot_id,
            appointment_type: kind.to_string(),
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn booking_yields_scheduled_appointment() {
        let d = doctor();
        let store = Arc::new(InMemoryAppointmentStore::new());
        let slot = store.add_slot(d.id, Utc::now() + Duration::days(1)).await;
        let service = service(store, vec![d.clone()]);

        let patient = Uuid::new_v4();
        let appointment = service
            .book_appointment(patient, request(slot.id, "video", "fever"), None)
            .await
            .unwrap();

        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(appointment.patient_id, patient);
        assert_eq!(appointment.doctor_id, d.id);
        assert_eq!(appointment.appointment_type, VisitType::Video);
        assert_eq!(appointment.reason, "fever");
    }

    #[tokio::test]
    async fn second_booking_of_same_slot_conflicts_for_any_patient() {
        let d = doctor();
        let store = Arc::new(InMemoryAppointmentStore::new());
        let slot = store.add_slot(d.id, Utc::now() + Duration::days(1)).await;
        let service = service(store.clone(), vec![d]);

        let patient = Uuid::new_v4();
        service
            .book_appointment(patient, request(slot.id, "video", "fever"), None)
            .await
            .unwrap();

        for who in [patient, Uuid::new_v4()] {
            let again = service.book_appointment(who, request(slot.id, "in_person", "fever"), None).await;
            assert!(matches!(again, Err(AppointmentError::SlotUnavailable(_))));
        }
        assert_eq!(store.appointments_for_slot(slot.id).await.len(), 1);
    }

    #[tokio::test]
    async fn validation_happens_before_store_access() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let service = service(store, vec![]);

        // the slot does not exist, yet validation is what fails
        let missing_slot = Uuid::new_v4();
        let result = service
            .book_appointment(Uuid::new_v4(), request(missing_slot, "video", ""), None)
            .await;
        assert!(matches!(result, Err(AppointmentError::ValidationError(_))));

        let result = service
            .book_appointment(Uuid::new_v4(), request(missing_slot, "phone", "cough"), None)
            .await;
        assert!(matches!(result, Err(AppointmentError::ValidationError(_))));

        let result = service
            .book_appointment(Uuid::new_v4(), request(missing_slot, "video", "cough"), None)
            .await;
        assert!(matches!(result, Err(AppointmentError::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn slot_listing_checks_doctor_and_range() {
        let d = doctor();
        let now = Utc::now();
        let store = Arc::new(InMemoryAppointmentStore::new());
        let inside = store.add_slot(d.id, now + Duration::days(2)).await;
        store.add_slot(d.id, now + Duration::days(9)).await;
        let service = service(store, vec![d.clone()]);

        let slots = service.list_available_slots(d.id, None, None, now, None).await.unwrap();
        assert_eq!(slots, vec![inside]);

        let unknown = service
            .list_available_slots(Uuid::new_v4(), None, None, now, None)
            .await;
        assert!(matches!(unknown, Err(AppointmentError::DoctorNotFound(_))));

        let inverted = service
            .list_available_slots(d.id, Some(now), Some(now - Duration::hours(1)), now, None)
            .await;
        assert!(matches!(inverted, Err(AppointmentError::ValidationError(_))));
    }
}
