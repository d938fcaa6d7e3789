//! # Segment Extraction
//!
//! Cuts a GPS track into road segments of roughly fixed length and gives each
//! one a content-addressed identity.
//!
//! ## Algorithm
//!
//! 1. Decode (if encoded) and drop invalid points
//! 2. Douglas-Peucker simplification
//! 3. Walk the simplified points accumulating great-circle distance; cut a
//!    segment whenever the accumulated length reaches `target_length`
//! 4. A leg that would push a segment past `max_length` first closes the
//!    pending segment at its start point, then is cut into equal pieces of
//!    about `target_length`; cut points are interpolated from the leg's
//!    smaller endpoint so both directions of travel cut at the same bits
//! 5. A final remainder shorter than `min_length` is folded into the
//!    previous segment
//!
//! ## Identity
//!
//! Endpoints are rounded to `coordinate_precision` decimals (8 by default,
//! sub-millimeter), formatted, sorted, and hashed with SHA-256. The first 16
//! hex characters (64 bits) are the segment hash, so the same stretch of road
//! gets the same hash whichever way it was ridden.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FamiliarityError, Result};
use crate::geo_utils::{bearing_degrees, destination_point, haversine_distance, round_coordinate};
use crate::polyline_codec::decode_track;
use crate::simplify::{simplify_track, DEFAULT_TOLERANCE};
use crate::Coordinate;

/// Hex characters kept from the SHA-256 digest (64 bits).
pub const SEGMENT_HASH_LENGTH: usize = 16;

/// Default rounding applied to endpoints before hashing.
pub const DEFAULT_COORDINATE_PRECISION: u32 = 8;

/// Configuration for segment extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentConfig {
    /// Shortest segment ever stored, in meters.
    /// Default: 50.0
    pub min_length: f64,

    /// Length at which a segment is cut, in meters.
    /// Default: 200.0
    pub target_length: f64,

    /// Longest segment allowed before a leg is split, in meters.
    /// Default: 500.0
    pub max_length: f64,

    /// Douglas-Peucker tolerance in degrees.
    /// Default: 0.0001 (~11 meters)
    pub simplification_tolerance: f64,

    /// Decimal places endpoints are rounded to before hashing.
    /// Default: 8
    pub coordinate_precision: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_length: 50.0,
            target_length: 200.0,
            max_length: 500.0,
            simplification_tolerance: DEFAULT_TOLERANCE,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
        }
    }
}

impl SegmentConfig {
    /// Check that `0 <= min_length <= target_length <= max_length`.
    pub fn validate(&self) -> Result<()> {
        let lengths = [self.min_length, self.target_length, self.max_length];
        if lengths.iter().any(|l| !l.is_finite()) || self.target_length <= 0.0 {
            return Err(FamiliarityError::ConfigError {
                message: "segment lengths must be finite and target_length positive".to_string(),
            });
        }
        if self.min_length < 0.0 || self.min_length > self.target_length {
            return Err(FamiliarityError::ConfigError {
                message: format!(
                    "min_length {} must be within [0, target_length {}]",
                    self.min_length, self.target_length
                ),
            });
        }
        if self.target_length > self.max_length {
            return Err(FamiliarityError::ConfigError {
                message: format!(
                    "target_length {} exceeds max_length {}",
                    self.target_length, self.max_length
                ),
            });
        }
        if !(self.simplification_tolerance >= 0.0) {
            return Err(FamiliarityError::ConfigError {
                message: "simplification_tolerance must be non-negative".to_string(),
            });
        }
        Ok(())
    }

    /// Coerce an invalid configuration into the nearest usable one.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.target_length.is_finite() || self.target_length <= 0.0 {
            self.target_length = defaults.target_length;
        }
        if !self.min_length.is_finite() || self.min_length < 0.0 {
            self.min_length = defaults.min_length;
        }
        self.min_length = self.min_length.min(self.target_length);
        if !self.max_length.is_finite() || self.max_length < self.target_length {
            self.max_length = self.target_length;
        }
        if !(self.simplification_tolerance >= 0.0) {
            self.simplification_tolerance = defaults.simplification_tolerance;
        }
        self
    }
}

/// A stretch of road cut from a track.
///
/// Two segments with the same `segment_hash` are the same physical segment,
/// whichever track produced them and whichever direction was ridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSegment {
    /// Rounded start point
    pub start_coord: Coordinate,
    /// Rounded end point
    pub end_coord: Coordinate,
    /// Direction-independent 16 hex character identity
    pub segment_hash: String,
    /// Along-track length in meters (not straight-line)
    pub length_meters: f64,
    /// Initial bearing from start to end, [0, 360)
    pub bearing_degrees: f64,
    /// Simplified track points spanned, including both ends
    pub point_count: u32,
    /// Along-track distance of the start from the beginning of the track
    pub start_distance: f64,
    /// Along-track distance of the end from the beginning of the track
    pub end_distance: f64,
}

impl RoadSegment {
    fn between(
        start: &Coordinate,
        end: &Coordinate,
        length_meters: f64,
        point_count: u32,
        start_distance: f64,
        precision: u32,
    ) -> Self {
        let start_coord = round_coordinate(start, precision);
        let end_coord = round_coordinate(end, precision);
        Self {
            segment_hash: segment_hash_with_precision(&start_coord, &end_coord, precision),
            bearing_degrees: bearing_degrees(&start_coord, &end_coord),
            start_coord,
            end_coord,
            length_meters,
            point_count,
            start_distance,
            end_distance: start_distance + length_meters,
        }
    }

    /// Length in kilometers.
    pub fn length_km(&self) -> f64 {
        self.length_meters / 1000.0
    }
}

/// Direction-independent hash of a segment's endpoints (8 decimal rounding).
///
/// # Example
/// ```
/// use road_familiarity::{segment_hash, Coordinate};
///
/// let a = Coordinate::new(51.5, -0.12);
/// let b = Coordinate::new(51.501, -0.121);
/// assert_eq!(segment_hash(&a, &b), segment_hash(&b, &a));
/// assert_eq!(segment_hash(&a, &b).len(), 16);
/// ```
pub fn segment_hash(a: &Coordinate, b: &Coordinate) -> String {
    segment_hash_with_precision(a, b, DEFAULT_COORDINATE_PRECISION)
}

/// [`segment_hash`] with an explicit rounding precision.
pub fn segment_hash_with_precision(a: &Coordinate, b: &Coordinate, precision: u32) -> String {
    let mut keys = [coordinate_key(a, precision), coordinate_key(b, precision)];
    keys.sort();

    let mut hasher = Sha256::new();
    hasher.update(keys[0].as_bytes());
    hasher.update(b"|");
    hasher.update(keys[1].as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(SEGMENT_HASH_LENGTH);
    digest
}

fn coordinate_key(point: &Coordinate, precision: u32) -> String {
    let rounded = round_coordinate(point, precision);
    let decimals = precision as usize;
    // + 0.0 folds -0.0 into 0.0 so both print the same
    format!(
        "{:.*},{:.*}",
        decimals,
        rounded.latitude + 0.0,
        decimals,
        rounded.longitude + 0.0
    )
}

/// Extracts road segments from tracks.
#[derive(Debug, Clone, Default)]
pub struct SegmentExtractor {
    config: SegmentConfig,
}

impl SegmentExtractor {
    /// Create an extractor. An inconsistent configuration is coerced into a
    /// usable one; call [`SegmentConfig::validate`] first to reject it instead.
    pub fn new(config: SegmentConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("[SegmentExtractor] {}; adjusting configuration", e);
        }
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Decode and extract, treating malformed input as an empty track.
    pub fn extract_from_polyline(&self, encoded: &str) -> Vec<RoadSegment> {
        match self.try_extract_from_polyline(encoded) {
            Ok(segments) => segments,
            Err(e) => {
                warn!("[SegmentExtractor] Skipping undecodable track: {}", e);
                Vec::new()
            }
        }
    }

    /// Decode and extract, reporting malformed input.
    pub fn try_extract_from_polyline(&self, encoded: &str) -> Result<Vec<RoadSegment>> {
        let points = decode_track(encoded)?;
        Ok(self.extract_from_points(&points))
    }

    /// Extract segments from an already-decoded track, in track order.
    pub fn extract_from_points(&self, points: &[Coordinate]) -> Vec<RoadSegment> {
        let valid: Vec<Coordinate> = points.iter().copied().filter(|p| p.is_valid()).collect();
        if valid.len() < points.len() {
            debug!(
                "[SegmentExtractor] Dropped {} invalid points",
                points.len() - valid.len()
            );
        }
        if valid.len() < 2 {
            return Vec::new();
        }

        let simplified = simplify_track(&valid, self.config.simplification_tolerance);
        let segments = self.walk(&simplified);

        debug!(
            "[SegmentExtractor] {} points -> {} simplified -> {} segments",
            points.len(),
            simplified.len(),
            segments.len()
        );
        segments
    }

    fn walk(&self, points: &[Coordinate]) -> Vec<RoadSegment> {
        let SegmentConfig {
            min_length,
            target_length,
            max_length,
            coordinate_precision: precision,
            ..
        } = self.config;

        let mut segments: Vec<RoadSegment> = Vec::new();
        let mut cut_start = points[0];
        let mut cut_distance = 0.0;
        let mut accumulated = 0.0;
        let mut point_count: u32 = 1;
        let last_index = points.len() - 1;

        for i in 1..points.len() {
            let from = points[i - 1];
            let to = points[i];
            let leg = haversine_distance(&from, &to);

            // A long leg starts its own run of segments at a track point
            if accumulated + leg > max_length && accumulated >= min_length {
                segments.push(RoadSegment::between(
                    &cut_start,
                    &from,
                    accumulated,
                    point_count,
                    cut_distance,
                    precision,
                ));
                cut_distance += accumulated;
                cut_start = from;
                accumulated = 0.0;
                point_count = 1;
            }

            if accumulated + leg > max_length {
                let pieces = split_count(leg, accumulated, target_length, max_length);
                let piece_length = leg / pieces as f64;
                for k in 1..=pieces {
                    let end = if k == pieces {
                        to
                    } else {
                        canonical_cut(&from, &to, k, pieces, leg)
                    };
                    let length = accumulated + piece_length;
                    segments.push(RoadSegment::between(
                        &cut_start,
                        &end,
                        length,
                        point_count + 1,
                        cut_distance,
                        precision,
                    ));
                    cut_distance += length;
                    cut_start = end;
                    accumulated = 0.0;
                    point_count = 1;
                }
                continue;
            }

            accumulated += leg;
            point_count += 1;

            if (accumulated >= target_length || i == last_index) && accumulated >= min_length {
                segments.push(RoadSegment::between(
                    &cut_start,
                    &to,
                    accumulated,
                    point_count,
                    cut_distance,
                    precision,
                ));
                cut_distance += accumulated;
                cut_start = to;
                accumulated = 0.0;
                point_count = 1;
            }
        }

        // Leftover shorter than min_length: extend the last segment to the track end
        if accumulated > 0.0 {
            if let Some(previous) = segments.pop() {
                let start = previous.start_coord;
                segments.push(RoadSegment::between(
                    &start,
                    &points[last_index],
                    previous.length_meters + accumulated,
                    previous.point_count + point_count - 1,
                    previous.start_distance,
                    precision,
                ));
            }
        }

        segments
    }
}

/// Number of equal pieces a long leg is cut into: close to `target_length`
/// each, and short enough that the first piece plus `accumulated` stays
/// within `max_length`.
fn split_count(leg: f64, accumulated: f64, target_length: f64, max_length: f64) -> u32 {
    let by_target = (leg / target_length).round().max(1.0);
    let room = max_length - accumulated;
    let by_max = if room > 0.0 { (leg / room).ceil() } else { by_target };
    by_target.max(by_max) as u32
}

/// Point `k / n` of the way from `a` to `b`.
///
/// Always projected from the lexicographically smaller endpoint, so the
/// reversed leg (`b` to `a`, piece `n - k`) lands on the same bits.
fn canonical_cut(a: &Coordinate, b: &Coordinate, k: u32, n: u32, leg_meters: f64) -> Coordinate {
    let a_first = (a.latitude, a.longitude) <= (b.latitude, b.longitude);
    let (origin, other, steps) = if a_first { (a, b, k) } else { (b, a, n - k) };
    let distance_km = leg_meters * steps as f64 / n as f64 / 1000.0;
    destination_point(origin, bearing_degrees(origin, other), distance_km)
}
