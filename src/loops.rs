//! # Loop Waypoint Selection
//!
//! Picks a handful of familiar segments around a start point and turns them
//! into an ordered waypoint list that a router can thread a loop through.
//!
//! ## Algorithm
//!
//! 1. Search a box of radius `target_distance_km / 2` around the start
//! 2. Fetch the user's segments there with at least `min_ride_count` rides;
//!    none found means the caller should fall back to a random loop
//! 3. Measure each segment's midpoint from the start (distance and bearing)
//!    and bin it into a compass quadrant
//! 4. Rank each quadrant by closeness to a quarter of the target distance,
//!    preferring more-ridden segments when two are within 1 km of each other
//! 5. Keep the best two per quadrant (one in explore mode), order them
//!    clockwise by bearing and emit start, midpoint and end of each
//! 6. Drop waypoints within 100 m of one already kept

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FamiliarityError, Result};
use crate::geo_utils::{bearing_degrees, haversine_distance, midpoint};
use crate::store::{SegmentRow, SegmentStore};
use crate::{Bounds, Coordinate};

/// Configuration for loop waypoint selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoopConfig {
    /// Segments kept per quadrant.
    /// Default: 2
    pub segments_per_quadrant: usize,

    /// Segments kept per quadrant in explore mode.
    /// Default: 1
    pub explore_segments_per_quadrant: usize,

    /// Waypoints closer than this to a kept waypoint are dropped, in meters.
    /// Default: 100.0
    pub waypoint_dedup_meters: f64,

    /// Ranking distances closer than this fall back to ride count, in meters.
    /// Default: 1000.0
    pub ride_count_tie_break_meters: f64,

    /// Preferred distance from the start as a fraction of the loop length.
    /// Default: 0.25
    pub target_radius_fraction: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            segments_per_quadrant: 2,
            explore_segments_per_quadrant: 1,
            waypoint_dedup_meters: 100.0,
            ride_count_tie_break_meters: 1000.0,
            target_radius_fraction: 0.25,
        }
    }
}

fn default_min_ride_count() -> u32 {
    1
}

/// A request for loop waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRequest {
    pub start: Coordinate,
    /// Total loop length in km
    pub target_distance_km: f64,
    /// Rides needed for a segment to count as familiar
    #[serde(default = "default_min_ride_count")]
    pub min_ride_count: u32,
    /// Fewer anchors per quadrant, leaving the router more freedom
    #[serde(default)]
    pub explore_mode: bool,
}

impl LoopRequest {
    pub fn new(start: Coordinate, target_distance_km: f64) -> Self {
        Self {
            start,
            target_distance_km,
            min_ride_count: default_min_ride_count(),
            explore_mode: false,
        }
    }
}

/// Compass quadrant around the loop start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    North,
    East,
    South,
    West,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::North,
        Quadrant::East,
        Quadrant::South,
        Quadrant::West,
    ];

    /// North is [315, 45) and wraps through 0.
    pub fn from_bearing(bearing: f64) -> Self {
        let bearing = bearing.rem_euclid(360.0);
        if !(45.0..315.0).contains(&bearing) {
            Quadrant::North
        } else if bearing < 135.0 {
            Quadrant::East
        } else if bearing < 225.0 {
            Quadrant::South
        } else {
            Quadrant::West
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::North => "north",
            Quadrant::East => "east",
            Quadrant::South => "south",
            Quadrant::West => "west",
        }
    }
}

/// A familiar segment chosen as a loop anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSegment {
    /// Segment hash
    pub id: String,
    pub start: Coordinate,
    pub end: Coordinate,
    pub midpoint: Coordinate,
    pub ride_count: u32,
    pub quadrant: Quadrant,
    /// Bearing from the loop start to the segment midpoint
    pub bearing_from_start: f64,
    /// Meters from the loop start to the segment midpoint
    pub distance_from_start: f64,
    pub road_name: Option<String>,
    pub road_type: Option<String>,
}

impl SelectedSegment {
    fn from_row(row: SegmentRow, origin: &Coordinate) -> Self {
        let start = row.start();
        let end = row.end();
        let mid = midpoint(&start, &end);
        let bearing = bearing_degrees(origin, &mid);
        Self {
            distance_from_start: haversine_distance(origin, &mid),
            quadrant: Quadrant::from_bearing(bearing),
            bearing_from_start: bearing,
            midpoint: mid,
            ride_count: row.ride_count,
            id: row.id,
            road_name: row.road_name,
            road_type: row.road_type,
            start,
            end,
        }
    }
}

/// Result of loop waypoint selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopWaypoints {
    /// Ordered, deduplicated waypoints
    pub waypoints: Vec<Coordinate>,
    /// Chosen anchor segments, clockwise from north
    pub segments: Vec<SelectedSegment>,
    /// Familiar segments found in the search box before selection
    pub total_familiar_segments: u32,
    /// No familiar segment nearby; generate a random loop instead
    pub fallback_to_random: bool,
}

impl LoopWaypoints {
    fn fallback() -> Self {
        Self {
            waypoints: Vec::new(),
            segments: Vec::new(),
            total_familiar_segments: 0,
            fallback_to_random: true,
        }
    }
}

/// Stable insertion sort.
///
/// `before(a, b)` must say whether `a` strictly precedes `b`. It does not need
/// to be transitive, which rules out the std sorts.
fn insertion_sort_by<T, F>(items: &mut [T], mut before: F)
where
    F: FnMut(&T, &T) -> bool,
{
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && before(&items[j], &items[j - 1]) {
            items.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Selects loop waypoints over familiar segments.
#[derive(Debug, Clone, Default)]
pub struct LoopWaypointSelector {
    config: LoopConfig,
}

impl LoopWaypointSelector {
    pub fn new(config: LoopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Box searched for familiar segments.
    pub fn search_bounds(&self, request: &LoopRequest) -> Bounds {
        Bounds::around(request.start, request.target_distance_km / 2.0)
    }

    /// Query `store` and select waypoints for the user.
    pub fn select_from_store<S: SegmentStore + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
        request: &LoopRequest,
    ) -> Result<LoopWaypoints> {
        validate_request(request)?;
        let bounds = self.search_bounds(request);
        let rows = store.get_user_segments_in_bbox(
            user_id,
            bounds.min_lat,
            bounds.max_lat,
            bounds.min_lng,
            bounds.max_lng,
            request.min_ride_count,
        )?;
        Ok(self.select(request, rows))
    }

    /// Select waypoints from already-fetched familiar segments.
    pub fn select(&self, request: &LoopRequest, rows: Vec<SegmentRow>) -> LoopWaypoints {
        if rows.is_empty() {
            debug!("[LoopWaypointSelector] No familiar segments near start, falling back");
            return LoopWaypoints::fallback();
        }

        let total_familiar_segments = rows.len() as u32;
        let target_meters =
            request.target_distance_km * 1000.0 * self.config.target_radius_fraction;
        let per_quadrant = if request.explore_mode {
            self.config.explore_segments_per_quadrant
        } else {
            self.config.segments_per_quadrant
        };

        let candidates: Vec<SelectedSegment> = rows
            .into_iter()
            .map(|row| SelectedSegment::from_row(row, &request.start))
            .collect();

        let mut selected = Vec::new();
        for quadrant in Quadrant::ALL {
            let mut in_quadrant: Vec<&SelectedSegment> = candidates
                .iter()
                .filter(|c| c.quadrant == quadrant)
                .collect();
            insertion_sort_by(&mut in_quadrant, |a, b| {
                self.ranks_before(a, b, target_meters)
            });
            selected.extend(in_quadrant.into_iter().take(per_quadrant).cloned());
        }

        selected.sort_by(|a, b| a.bearing_from_start.total_cmp(&b.bearing_from_start));

        let waypoints = self.dedup_waypoints(
            selected
                .iter()
                .flat_map(|s| [s.start, s.midpoint, s.end]),
        );

        debug!(
            "[LoopWaypointSelector] {} of {} familiar segments selected, {} waypoints",
            selected.len(),
            total_familiar_segments,
            waypoints.len()
        );

        LoopWaypoints {
            waypoints,
            segments: selected,
            total_familiar_segments,
            fallback_to_random: false,
        }
    }

    fn ranks_before(&self, a: &SelectedSegment, b: &SelectedSegment, target_meters: f64) -> bool {
        let diff_a = (a.distance_from_start - target_meters).abs();
        let diff_b = (b.distance_from_start - target_meters).abs();
        if (diff_a - diff_b).abs() < self.config.ride_count_tie_break_meters {
            a.ride_count > b.ride_count
        } else {
            diff_a < diff_b
        }
    }

    /// Keep waypoints in order, skipping any near one already kept.
    fn dedup_waypoints(&self, candidates: impl Iterator<Item = Coordinate>) -> Vec<Coordinate> {
        let mut kept: Vec<Coordinate> = Vec::new();
        for point in candidates {
            let near_kept = kept
                .iter()
                .any(|k| haversine_distance(k, &point) < self.config.waypoint_dedup_meters);
            if !near_kept {
                kept.push(point);
            }
        }
        kept
    }
}

fn validate_request(request: &LoopRequest) -> Result<()> {
    if !request.start.is_valid() {
        return Err(FamiliarityError::InvalidCoordinates {
            message: format!(
                "loop start ({}, {}) is not a valid coordinate",
                request.start.latitude, request.start.longitude
            ),
        });
    }
    if !request.target_distance_km.is_finite() || request.target_distance_km <= 0.0 {
        return Err(FamiliarityError::ConfigError {
            message: format!(
                "target distance must be positive, got {} km",
                request.target_distance_km
            ),
        });
    }
    Ok(())
}
