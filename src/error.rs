//! Unified error handling for the road-familiarity library.
//!
//! Input problems that have a safe default (empty track, unknown segment)
//! never reach this type; callers get an empty or neutral result instead.
//! What remains are failures a caller has to see: undecodable input, store
//! outages, and bad configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for road-familiarity operations.
#[derive(Debug, Clone, Error)]
pub enum FamiliarityError {
    /// Encoded polyline could not be decoded
    #[error("Invalid polyline: {message}")]
    InvalidPolyline { message: String },

    /// Coordinates outside the WGS84 range or non-finite
    #[error("Invalid coordinates: {message}")]
    InvalidCoordinates { message: String },

    /// Segment store or activity source failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Activity source has no such activity for the user
    #[error("Activity '{activity_id}' not found")]
    ActivityNotFound { activity_id: String },

    /// Activity exists but carries no GPS track
    #[error("Activity '{activity_id}' has no GPS track")]
    MissingTrack { activity_id: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl FamiliarityError {
    /// Shorthand for a store failure.
    pub fn store(message: impl Into<String>) -> Self {
        FamiliarityError::Store {
            message: message.into(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for FamiliarityError {
    fn from(err: rusqlite::Error) -> Self {
        FamiliarityError::store(err.to_string())
    }
}

impl From<serde_json::Error> for FamiliarityError {
    fn from(err: serde_json::Error) -> Self {
        FamiliarityError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for road-familiarity operations.
pub type Result<T> = std::result::Result<T, FamiliarityError>;

/// A failure on one item of a batch (a segment or an activity).
///
/// Batches collect these instead of aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    /// Segment hash or activity id the failure belongs to
    pub item_id: String,
    pub message: String,
}

impl ItemError {
    pub fn new(item_id: impl Into<String>, err: &FamiliarityError) -> Self {
        Self {
            item_id: item_id.into(),
            message: err.to_string(),
        }
    }
}
