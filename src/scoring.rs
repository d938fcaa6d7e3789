//! # Route Scoring
//!
//! Scores an arbitrary candidate route against a user's ride history.
//!
//! ## Algorithm
//!
//! 1. Re-extract segments from the route (nothing is persisted)
//! 2. Fetch stored preference rows for all segment hashes in one batch
//! 3. Weight each segment's score by its length in km: known segments
//!    (`ride_count > 0`) use their stored preference score, the rest use
//!    `unknown_segment_score`
//! 4. `overall_score` is the length-weighted mean; `confidence` follows the
//!    share of route length on known segments

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::preferences::{ConfidenceLevel, NEUTRAL_SCORE};
use crate::segments::{RoadSegment, SegmentConfig, SegmentExtractor};
use crate::store::{PreferenceRow, SegmentStore};
use crate::Coordinate;

/// Share of route length on known segments for each confidence level.
const HIGH_CONFIDENCE_SHARE: f64 = 0.7;
const MEDIUM_CONFIDENCE_SHARE: f64 = 0.4;

/// Configuration for route scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Score weighted in for segments the user has never ridden.
    /// Default: 1.0 (neutral)
    pub unknown_segment_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            unknown_segment_score: NEUTRAL_SCORE,
        }
    }
}

/// A route to score, either encoded or as a coordinate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteInput {
    Encoded(String),
    Coordinates(Vec<Coordinate>),
}

impl From<&str> for RouteInput {
    fn from(encoded: &str) -> Self {
        RouteInput::Encoded(encoded.to_string())
    }
}

impl From<Vec<Coordinate>> for RouteInput {
    fn from(points: Vec<Coordinate>) -> Self {
        RouteInput::Coordinates(points)
    }
}

/// Familiarity of a whole route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePreferenceScore {
    /// Length-weighted mean of per-segment scores
    pub overall_score: f64,
    pub familiar_segments: u32,
    pub unknown_segments: u32,
    pub familiar_km: f64,
    pub unknown_km: f64,
    pub confidence: ConfidenceLevel,
}

impl RoutePreferenceScore {
    /// Score of a route too short to yield any segment.
    pub fn neutral() -> Self {
        Self {
            overall_score: NEUTRAL_SCORE,
            familiar_segments: 0,
            unknown_segments: 0,
            familiar_km: 0.0,
            unknown_km: 0.0,
            confidence: ConfidenceLevel::Unknown,
        }
    }

    pub fn total_km(&self) -> f64 {
        self.familiar_km + self.unknown_km
    }
}

/// Confidence label from the share of route length on known segments.
fn confidence_for_share(familiar_share: f64) -> ConfidenceLevel {
    if familiar_share >= HIGH_CONFIDENCE_SHARE {
        ConfidenceLevel::High
    } else if familiar_share >= MEDIUM_CONFIDENCE_SHARE {
        ConfidenceLevel::Medium
    } else if familiar_share > 0.0 {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::Unknown
    }
}

/// Scores candidate routes.
#[derive(Debug, Clone, Default)]
pub struct RouteScorer {
    extractor: SegmentExtractor,
    config: ScoringConfig,
}

impl RouteScorer {
    pub fn new(segment_config: SegmentConfig, config: ScoringConfig) -> Self {
        Self {
            extractor: SegmentExtractor::new(segment_config),
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Segments of a candidate route. Undecodable input yields none.
    pub fn extract(&self, route: &RouteInput) -> Vec<RoadSegment> {
        match route {
            RouteInput::Encoded(encoded) => self.extractor.extract_from_polyline(encoded),
            RouteInput::Coordinates(points) => self.extractor.extract_from_points(points),
        }
    }

    /// Score a route for a user, reading history from `store`.
    pub fn score<S: SegmentStore + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
        route: &RouteInput,
    ) -> Result<RoutePreferenceScore> {
        let segments = self.extract(route);
        if segments.is_empty() {
            return Ok(RoutePreferenceScore::neutral());
        }

        let hashes: Vec<String> = segments.iter().map(|s| s.segment_hash.clone()).collect();
        let rows = store.get_segment_preferences(user_id, &hashes)?;
        Ok(self.aggregate(&segments, &rows))
    }

    /// Combine extracted segments with their stored rows.
    pub fn aggregate(&self, segments: &[RoadSegment], rows: &[PreferenceRow]) -> RoutePreferenceScore {
        if segments.is_empty() {
            return RoutePreferenceScore::neutral();
        }

        let by_hash: HashMap<&str, &PreferenceRow> = rows
            .iter()
            .filter(|row| row.ride_count > 0)
            .map(|row| (row.segment_hash.as_str(), row))
            .collect();

        let mut result = RoutePreferenceScore::neutral();
        let mut weighted_sum = 0.0;

        for segment in segments {
            let km = segment.length_km();
            match by_hash.get(segment.segment_hash.as_str()) {
                Some(row) => {
                    weighted_sum += row.preference_score * km;
                    result.familiar_segments += 1;
                    result.familiar_km += km;
                }
                None => {
                    weighted_sum += self.config.unknown_segment_score * km;
                    result.unknown_segments += 1;
                    result.unknown_km += km;
                }
            }
        }

        let total_km = result.total_km();
        if total_km > 0.0 {
            result.overall_score = weighted_sum / total_km;
            result.confidence = confidence_for_share(result.familiar_km / total_km);
        }

        debug!(
            "[RouteScorer] {} segments ({} familiar), score {:.3}",
            segments.len(),
            result.familiar_segments,
            result.overall_score
        );
        result
    }
}
