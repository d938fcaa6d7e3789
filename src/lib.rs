//! # Road Familiarity
//!
//! Turns GPS traces into stable, direction-independent road segments and uses a
//! rider's history on those segments to score candidate routes and to pick
//! waypoints for loops over familiar roads.
//!
//! This library provides:
//! - Polyline decoding and Douglas-Peucker track simplification
//! - Fixed-length segment extraction with content-addressed segment hashes
//! - Decay-weighted familiarity scoring per segment and per route
//! - Quadrant-based loop waypoint selection
//!
//! Persistence is injected through the [`SegmentStore`] and [`ActivitySource`]
//! traits. An in-process store is always available; a SQLite store is compiled
//! with the `persistence` feature.
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite-backed segment store
//! - **`parallel`** - Extract candidate routes in parallel with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use road_familiarity::{Coordinate, SegmentConfig, SegmentExtractor};
//!
//! // ~1.1 km due north
//! let track: Vec<Coordinate> = (0..=10)
//!     .map(|i| Coordinate::new(51.5000 + i as f64 * 0.001, -0.1278))
//!     .collect();
//!
//! let extractor = SegmentExtractor::new(SegmentConfig::default());
//! let segments = extractor.extract_from_points(&track);
//!
//! assert!(!segments.is_empty());
//! for segment in &segments {
//!     println!("{} {:.0}m", segment.segment_hash, segment.length_meters);
//! }
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{FamiliarityError, ItemError, Result};

// Geographic primitives (distance, bearing, projection)
pub mod geo_utils;

// Encoded polyline decoding/encoding
pub mod polyline_codec;
pub use polyline_codec::{decode_track, encode_track};

// Douglas-Peucker track simplification
pub mod simplify;
pub use simplify::simplify_track;

// Segment extraction and hashing
pub mod segments;
pub use segments::{segment_hash, RoadSegment, SegmentConfig, SegmentExtractor};

// Familiarity scoring for a single segment
pub mod preferences;
pub use preferences::{
    calculate_preference_score, calculate_preference_score_at, get_confidence_level,
    ConfidenceLevel, PreferencesUpdate, UserRoadPreferences,
};

// Storage boundary (traits and typed rows)
pub mod store;
pub use store::{
    ActivityFilter, ActivitySource, ActivitySummary, ActivityTrack, PreferenceRow,
    SegmentRow, SegmentStats, SegmentStore, SegmentUpsert,
};

// In-process store
pub mod memory_store;
pub use memory_store::MemorySegmentStore;

// SQLite store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteSegmentStore;

// Route-level scoring
pub mod scoring;
pub use scoring::{RouteInput, RoutePreferenceScore, RouteScorer, ScoringConfig};

// Loop waypoint selection
pub mod loops;
pub use loops::{
    LoopConfig, LoopRequest, LoopWaypointSelector, LoopWaypoints, Quadrant, SelectedSegment,
};

// Engine tying extraction, storage and scoring together
pub mod engine;
pub use engine::{
    BatchConfig, BatchOptions, BatchOutcome, EngineConfig, ExtractionContext, ExtractionOutcome,
    FamiliarityEngine, RankedRoute,
};

// Algorithm toolbox - standalone access to the pure algorithms
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees. No altitude.
///
/// # Example
/// ```
/// use road_familiarity::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Box roughly containing a circle of `radius_km` around `center`.
    ///
    /// One degree of latitude is taken as 111 km; longitude degrees are
    /// widened by `1 / cos(latitude)`.
    pub fn around(center: Coordinate, radius_km: f64) -> Self {
        let lat_delta = radius_km / geo_utils::KM_PER_DEGREE_LAT;
        // Near the poles cos(lat) collapses; cap the widening at the full circle.
        let cos_lat = center.latitude.to_radians().cos().abs().max(1e-6);
        let lng_delta = (radius_km / (geo_utils::KM_PER_DEGREE_LAT * cos_lat)).min(180.0);

        Self {
            min_lat: (center.latitude - lat_delta).max(-90.0),
            max_lat: (center.latitude + lat_delta).min(90.0),
            min_lng: center.longitude - lng_delta,
            max_lng: center.longitude + lng_delta,
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Whether the point lies inside (inclusive).
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5074, -0.1278).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![
            Coordinate::new(51.50, -0.13),
            Coordinate::new(51.51, -0.12),
            Coordinate::new(51.505, -0.125),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounds_around_equator() {
        let bounds = Bounds::around(Coordinate::new(0.0, 10.0), 11.1);
        assert!((bounds.max_lat - 0.1).abs() < 1e-9);
        assert!((bounds.min_lat + 0.1).abs() < 1e-9);
        assert!((bounds.max_lng - 10.1).abs() < 1e-9);
        assert!(bounds.contains(&Coordinate::new(0.05, 10.05)));
        assert!(!bounds.contains(&Coordinate::new(0.2, 10.0)));
    }

    #[test]
    fn test_bounds_around_widens_longitude_at_latitude() {
        let bounds = Bounds::around(Coordinate::new(60.0, 0.0), 11.1);
        // cos(60°) = 0.5 doubles the longitude span
        assert!((bounds.max_lng - 0.2).abs() < 1e-9);
        assert!((bounds.max_lat - 60.1).abs() < 1e-9);
    }
}
