pub mod doctor;
pub mod geo;
pub mod location;
pub mod matching;
pub mod repository;

pub use doctor::DoctorService;
pub use geo::haversine_km;
pub use location::{resolve_location, LocationError, LocationProvider, RequestLocation};
pub use matching::{list_specialties, rank_doctors};
pub use repository::{DoctorRepository, InMemoryDoctorRepository, SupabaseDoctorRepository};
