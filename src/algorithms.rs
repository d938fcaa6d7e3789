//! # Algorithm Toolbox
//!
//! Direct access to the pure algorithms of this crate, for hosts that want
//! them without a store or engine.
//!
//! ## Core Algorithms
//!
//! - **Segment Extraction**: fixed-length segments with direction-independent hashes
//! - **Preference Scoring**: ride-count curve with strength and decay
//! - **Route Scoring**: length-weighted familiarity of a route
//! - **Loop Selection**: quadrant-based waypoint selection
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: Great-circle distance between coordinates
//! - **Bearing / Destination**: Initial bearing and projection
//! - **Polyline Codec**: Encoded polyline decoding and encoding
//! - **Douglas-Peucker**: Track simplification
//!
//! # Example
//!
//! ```rust
//! use road_familiarity::algorithms::{bearing_degrees, haversine_distance, Coordinate};
//!
//! let london = Coordinate::new(51.5074, -0.1278);
//! let paris = Coordinate::new(48.8566, 2.3522);
//! let distance = haversine_distance(&london, &paris);
//! assert!((distance / 1000.0 - 343.5).abs() < 2.0);
//! assert!(bearing_degrees(&london, &paris) > 90.0);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Bounds, Coordinate};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    bearing_degrees, destination_point, haversine_distance, midpoint, normalize_bearing,
    round_coordinate, track_length, EARTH_RADIUS_METERS,
};

pub use crate::polyline_codec::{decode_track, encode_track};

pub use crate::simplify::{simplify_track, DEFAULT_TOLERANCE};

// =============================================================================
// Segments
// =============================================================================

pub use crate::segments::{
    segment_hash, segment_hash_with_precision, RoadSegment, SegmentConfig, SegmentExtractor,
};

// =============================================================================
// Scoring
// =============================================================================

pub use crate::preferences::{
    base_score, calculate_preference_score, calculate_preference_score_at,
    get_confidence_level, ConfidenceLevel, UserRoadPreferences,
};

pub use crate::scoring::{RouteInput, RoutePreferenceScore, RouteScorer, ScoringConfig};

// =============================================================================
// Loops
// =============================================================================

pub use crate::loops::{
    LoopConfig, LoopRequest, LoopWaypointSelector, LoopWaypoints, Quadrant, SelectedSegment,
};
