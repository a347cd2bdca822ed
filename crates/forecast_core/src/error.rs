//! Error taxonomy for the forecasting engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Opaque transport failure reported by a collaborator store.
///
/// The engine never inspects the payload; it either swallows the error with a
/// neutral default (best-effort collaborators) or maps it to
/// [`ForecastError::StoreUnavailable`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the engine's inbound operations.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("invalid location: ({lat}, {lng}) outside WGS84 bounds")]
    InvalidLocation { lat: f64, lng: f64 },

    #[error("invalid bounding box: {0}")]
    InvalidBBox(String),

    #[error("invalid time range: start {start} must precede end {end}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ForecastError {
    pub fn invalid_location(lat: f64, lng: f64) -> Self {
        Self::InvalidLocation { lat, lng }
    }
}
