// libs/doctor-cell/src/services/matching.rs
use std::cmp::Ordering;

use tracing::debug;

use crate::models::{Doctor, DoctorError, DoctorSearchFilters, GeoPoint, RankedDoctor};
use crate::services::geo::haversine_km;

/// Filter and order doctors for a requester.
///
/// Filters are conjunctive. The distance cut only applies to doctors that have
/// coordinates, and only when the requester's location is known; doctors with
/// no coordinates stay in the results and sort after every doctor that has a
/// distance. With no requester location the order is by name.
pub fn rank_doctors(
    doctors: Vec<Doctor>,
    filters: &DoctorSearchFilters,
    requester: Option<GeoPoint>,
) -> Result<Vec<RankedDoctor>, DoctorError> {
    filters.validate()?;

    let specialty = filters.specialty();
    let term = filters.search_term().map(str::to_lowercase);
    let candidates = doctors.len();

    let mut ranked: Vec<RankedDoctor> = doctors
        .into_iter()
        .filter(|doctor| specialty.map_or(true, |s| doctor.specialty == s))
        .filter(|doctor| term.as_deref().map_or(true, |t| matches_term(doctor, t)))
        .filter_map(|doctor| {
            let distance_km = requester
                .zip(doctor.geolocation())
                .map(|(from, to)| haversine_km(&from, &to));

            match (distance_km, filters.max_distance_km) {
                (Some(d), Some(max)) if d > max => None,
                _ => Some(RankedDoctor { doctor, distance_km }),
            }
        })
        .collect();

    if requester.is_some() {
        ranked.sort_by(by_distance_then_name);
    } else {
        ranked.sort_by(|a, b| a.doctor.full_name.cmp(&b.doctor.full_name));
    }

    debug!("Ranked {} of {} doctors (location known: {})", ranked.len(), candidates, requester.is_some());
    Ok(ranked)
}

fn matches_term(doctor: &Doctor, term: &str) -> bool {
    doctor.full_name.to_lowercase().contains(term)
        || doctor.specialty.to_lowercase().contains(term)
        || doctor
            .bio
            .as_deref()
            .is_some_and(|bio| bio.to_lowercase().contains(term))
}

fn by_distance_then_name(a: &RankedDoctor, b: &RankedDoctor) -> Ordering {
    let by_distance = match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_distance.then_with(|| a.doctor.full_name.cmp(&b.doctor.full_name))
}

/// Distinct specialties present in the roster, sorted.
pub fn list_specialties(doctors: &[Doctor]) -> Vec<String> {
    let mut specialties: Vec<String> = doctors
        .iter()
        .map(|d| d.specialty.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    specialties.sort();
    specialties.dedup();
    specialties
}
