use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::GeoPoint;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("location was not provided")]
    NotProvided,

    #[error("location access denied")]
    Denied,

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Source of the requester's current coordinates (device, browser, request).
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<GeoPoint, LocationError>;
}

/// Acquire a location without ever blocking past `timeout`.
///
/// Every failure mode degrades to `None` ("location unknown"); ranking treats
/// that as a search without a distance filter.
pub async fn resolve_location(provider: &dyn LocationProvider, timeout: Duration) -> Option<GeoPoint> {
    match tokio::time::timeout(timeout, provider.current_location()).await {
        Ok(Ok(point)) => Some(point),
        Ok(Err(LocationError::NotProvided)) => {
            debug!("Requester location not provided");
            None
        }
        Ok(Err(e)) => {
            warn!("Requester location unavailable, continuing without it: {}", e);
            None
        }
        Err(_) => {
            warn!("Location acquisition timed out after {:?}", timeout);
            None
        }
    }
}

/// Location supplied by the client alongside the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLocation(pub Option<GeoPoint>);

#[async_trait]
impl LocationProvider for RequestLocation {
    async fn current_location(&self) -> Result<GeoPoint, LocationError> {
        self.0.ok_or(LocationError::NotProvided)
    }
}
