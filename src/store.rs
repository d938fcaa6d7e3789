//! Storage boundary.
//!
//! The engine never owns persistence. Segment rows, per-user ride aggregates
//! and preferences live behind [`SegmentStore`]; activity tracks come from an
//! [`ActivitySource`]. Rows crossing the boundary are strongly typed.
//!
//! Implementations must make [`SegmentStore::upsert_user_segment`] safe to
//! repeat: the same `(user_id, segment_hash, activity_id)` counts as one ride
//! no matter how often it is upserted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::preferences::{PreferencesUpdate, UserRoadPreferences};
use crate::segments::RoadSegment;
use crate::Coordinate;

/// One segment ridden during one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentUpsert {
    pub user_id: String,
    pub activity_id: String,
    pub segment_hash: String,
    pub start_coord: Coordinate,
    pub end_coord: Coordinate,
    pub length_meters: f64,
    pub bearing_degrees: f64,
    /// Average speed of the activity in m/s
    pub avg_speed_ms: Option<f64>,
    /// Estimated time spent on the segment in seconds
    pub time_seconds: Option<f64>,
    pub activity_date: DateTime<Utc>,
}

impl SegmentUpsert {
    /// Build the upsert for a freshly extracted segment.
    pub fn from_segment(
        user_id: &str,
        activity_id: &str,
        segment: &RoadSegment,
        avg_speed_ms: Option<f64>,
        activity_date: DateTime<Utc>,
    ) -> Self {
        let time_seconds = avg_speed_ms
            .filter(|speed| *speed > 0.0)
            .map(|speed| segment.length_meters / speed);
        Self {
            user_id: user_id.to_string(),
            activity_id: activity_id.to_string(),
            segment_hash: segment.segment_hash.clone(),
            start_coord: segment.start_coord,
            end_coord: segment.end_coord,
            length_meters: segment.length_meters,
            bearing_degrees: segment.bearing_degrees,
            avg_speed_ms,
            time_seconds,
            activity_date,
        }
    }
}

/// A user's history on one segment, as returned by a batch lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRow {
    pub segment_hash: String,
    pub ride_count: u32,
    /// Familiarity multiplier computed with the user's preferences
    pub preference_score: f64,
    pub last_ridden_at: Option<DateTime<Utc>>,
}

/// A ridden segment found by a bounding-box query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRow {
    /// Segment hash
    pub id: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
    pub ride_count: u32,
    pub last_ridden_at: Option<DateTime<Utc>>,
    pub road_name: Option<String>,
    pub road_type: Option<String>,
}

impl SegmentRow {
    pub fn start(&self) -> Coordinate {
        Coordinate::new(self.start_lat, self.start_lng)
    }

    pub fn end(&self) -> Coordinate {
        Coordinate::new(self.end_lat, self.end_lng)
    }
}

/// Summary of a user's segment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    pub total_segments: u32,
    pub total_rides: u32,
    pub unique_km: f64,
    pub most_ridden_count: u32,
    /// Segment counts keyed by ride-count bucket ("1", "2-4", "5-9", "10+")
    pub segments_by_ride_count: BTreeMap<String, u32>,
    /// Segments first ridden within the last [`RECENT_SEGMENT_DAYS`] days
    pub recent_new_segments: u32,
}

/// Window for [`SegmentStats::recent_new_segments`].
pub const RECENT_SEGMENT_DAYS: i64 = 30;

/// Ride-count bucket label used in [`SegmentStats`].
pub fn ride_count_bucket(ride_count: u32) -> &'static str {
    match ride_count {
        0..=1 => "1",
        2..=4 => "2-4",
        5..=9 => "5-9",
        _ => "10+",
    }
}

/// Persistence of segments, ride aggregates and preferences.
pub trait SegmentStore: Send + Sync {
    /// Record a ride on a segment. Idempotent per activity.
    fn upsert_user_segment(&self, upsert: &SegmentUpsert) -> Result<()>;

    /// Batch lookup of a user's history. Unknown hashes are simply absent.
    fn get_segment_preferences(
        &self,
        user_id: &str,
        segment_hashes: &[String],
    ) -> Result<Vec<PreferenceRow>>;

    /// Segments whose start lies in the box and with at least `min_ride_count` rides.
    fn get_user_segments_in_bbox(
        &self,
        user_id: &str,
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
        min_ride_count: u32,
    ) -> Result<Vec<SegmentRow>>;

    fn get_user_segment_stats(&self, user_id: &str) -> Result<SegmentStats>;

    /// Stored preferences, or the defaults when the user has none.
    fn get_user_preferences(&self, user_id: &str) -> Result<UserRoadPreferences>;

    /// Merge a partial update and return the result.
    fn upsert_user_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<UserRoadPreferences>;
}

/// Filter for listing a user's activities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityFilter {
    /// Include activities whose segments were already extracted
    pub include_processed: bool,
    pub after_date: Option<DateTime<Utc>>,
    pub before_date: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &ActivitySummary) -> bool {
        (self.include_processed || !activity.segments_processed)
            && self.after_date.map_or(true, |after| activity.start_date >= after)
            && self.before_date.map_or(true, |before| activity.start_date <= before)
    }
}

/// Lightweight activity listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub activity_id: String,
    pub start_date: DateTime<Utc>,
    pub segments_processed: bool,
}

/// An activity's track plus the context needed to derive speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTrack {
    pub activity_id: String,
    /// Encoded polyline; `None` for activities without GPS
    pub polyline: Option<String>,
    pub start_date: DateTime<Utc>,
    /// Moving time in seconds
    pub moving_time: Option<u32>,
    /// Distance in meters
    pub distance: Option<f64>,
}

impl ActivityTrack {
    /// distance / moving_time, when both are known and positive.
    pub fn average_speed(&self) -> Option<f64> {
        match (self.distance, self.moving_time) {
            (Some(distance), Some(time)) if distance > 0.0 && time > 0 => {
                Some(distance / time as f64)
            }
            _ => None,
        }
    }
}

/// Where a user's recorded activities come from.
pub trait ActivitySource {
    /// Activities matching the filter, oldest first.
    fn list_activities(&self, user_id: &str, filter: &ActivityFilter)
        -> Result<Vec<ActivitySummary>>;

    fn get_activity_track(&self, activity_id: &str, user_id: &str) -> Result<ActivityTrack>;

    /// Flag the activity so later batches skip it.
    fn mark_processed(&self, activity_id: &str, user_id: &str) -> Result<()>;
}
