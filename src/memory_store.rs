//! In-process segment store.
//!
//! Keeps segment geometry, per-user ride aggregates, preferences and
//! activities in memory behind a single mutex. Segment start points are held
//! in an R-tree so bounding-box queries don't scan every segment.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use crate::error::{FamiliarityError, Result};
use crate::preferences::{calculate_preference_score, PreferencesUpdate, UserRoadPreferences};
use crate::store::{
    ride_count_bucket, ActivityFilter, ActivitySource, ActivitySummary, ActivityTrack,
    PreferenceRow, SegmentRow, SegmentStats, SegmentStore, SegmentUpsert, RECENT_SEGMENT_DAYS,
};
use crate::Coordinate;

/// Segment start point keyed by segment hash, as `[lng, lat]`.
type SegmentStart = GeomWithData<[f64; 2], String>;

#[derive(Debug, Clone)]
struct StoredSegment {
    start: Coordinate,
    end: Coordinate,
    length_meters: f64,
    road_name: Option<String>,
    road_type: Option<String>,
}

#[derive(Debug, Clone)]
struct UserSegment {
    ride_count: u32,
    first_ridden_at: DateTime<Utc>,
    last_ridden_at: DateTime<Utc>,
    avg_speed_ms: Option<f64>,
    best_time_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
struct StoredActivity {
    user_id: String,
    track: ActivityTrack,
    processed: bool,
}

#[derive(Default)]
struct Inner {
    segments: HashMap<String, StoredSegment>,
    spatial_index: RTree<SegmentStart>,
    user_segments: HashMap<(String, String), UserSegment>,
    /// (user, segment, activity) triples already counted
    rides: HashSet<(String, String, String)>,
    preferences: HashMap<String, UserRoadPreferences>,
    activities: HashMap<String, StoredActivity>,
}

/// Mutex-guarded in-memory implementation of [`SegmentStore`] and
/// [`ActivitySource`].
#[derive(Default)]
pub struct MemorySegmentStore {
    inner: Mutex<Inner>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| FamiliarityError::store("memory store lock poisoned"))
    }

    /// Register an activity for batch extraction.
    pub fn add_activity(&self, user_id: &str, track: ActivityTrack) -> Result<()> {
        let mut inner = self.lock()?;
        inner.activities.insert(
            track.activity_id.clone(),
            StoredActivity {
                user_id: user_id.to_string(),
                track,
                processed: false,
            },
        );
        Ok(())
    }

    /// Attach road metadata to a stored segment. Returns false if unknown.
    pub fn set_road_info(
        &self,
        segment_hash: &str,
        road_name: Option<&str>,
        road_type: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(match inner.segments.get_mut(segment_hash) {
            Some(segment) => {
                segment.road_name = road_name.map(str::to_string);
                segment.road_type = road_type.map(str::to_string);
                true
            }
            None => false,
        })
    }

    /// Number of distinct segments across all users.
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.lock()?.segments.len())
    }

    /// Whether an activity has been marked processed. Unknown ids are not.
    pub fn is_processed(&self, activity_id: &str) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner
            .activities
            .get(activity_id)
            .map(|a| a.processed)
            .unwrap_or(false))
    }
}

impl SegmentStore for MemorySegmentStore {
    fn upsert_user_segment(&self, upsert: &SegmentUpsert) -> Result<()> {
        let mut inner = self.lock()?;

        if !inner.segments.contains_key(&upsert.segment_hash) {
            inner.segments.insert(
                upsert.segment_hash.clone(),
                StoredSegment {
                    start: upsert.start_coord,
                    end: upsert.end_coord,
                    length_meters: upsert.length_meters,
                    road_name: None,
                    road_type: None,
                },
            );
            inner.spatial_index.insert(GeomWithData::new(
                [upsert.start_coord.longitude, upsert.start_coord.latitude],
                upsert.segment_hash.clone(),
            ));
        }

        let ride_key = (
            upsert.user_id.clone(),
            upsert.segment_hash.clone(),
            upsert.activity_id.clone(),
        );
        if !inner.rides.insert(ride_key) {
            debug!(
                "[MemorySegmentStore] Ride on {} by activity {} already counted",
                upsert.segment_hash, upsert.activity_id
            );
            return Ok(());
        }

        let key = (upsert.user_id.clone(), upsert.segment_hash.clone());
        match inner.user_segments.get_mut(&key) {
            Some(existing) => {
                existing.avg_speed_ms = match (existing.avg_speed_ms, upsert.avg_speed_ms) {
                    (Some(avg), Some(speed)) => Some(
                        (avg * existing.ride_count as f64 + speed)
                            / (existing.ride_count + 1) as f64,
                    ),
                    (avg, speed) => avg.or(speed),
                };
                existing.best_time_seconds = match (existing.best_time_seconds, upsert.time_seconds)
                {
                    (Some(best), Some(time)) => Some(best.min(time)),
                    (best, time) => best.or(time),
                };
                existing.ride_count += 1;
                existing.first_ridden_at = existing.first_ridden_at.min(upsert.activity_date);
                existing.last_ridden_at = existing.last_ridden_at.max(upsert.activity_date);
            }
            None => {
                inner.user_segments.insert(
                    key,
                    UserSegment {
                        ride_count: 1,
                        first_ridden_at: upsert.activity_date,
                        last_ridden_at: upsert.activity_date,
                        avg_speed_ms: upsert.avg_speed_ms,
                        best_time_seconds: upsert.time_seconds,
                    },
                );
            }
        }
        Ok(())
    }

    fn get_segment_preferences(
        &self,
        user_id: &str,
        segment_hashes: &[String],
    ) -> Result<Vec<PreferenceRow>> {
        let inner = self.lock()?;
        let prefs = inner.preferences.get(user_id).cloned().unwrap_or_default();

        let unique: HashSet<&String> = segment_hashes.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|hash| {
                let history = inner
                    .user_segments
                    .get(&(user_id.to_string(), hash.clone()))?;
                Some(PreferenceRow {
                    segment_hash: hash.clone(),
                    ride_count: history.ride_count,
                    preference_score: calculate_preference_score(
                        history.ride_count,
                        Some(history.last_ridden_at),
                        &prefs,
                    ),
                    last_ridden_at: Some(history.last_ridden_at),
                })
            })
            .collect())
    }

    fn get_user_segments_in_bbox(
        &self,
        user_id: &str,
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
        min_ride_count: u32,
    ) -> Result<Vec<SegmentRow>> {
        let inner = self.lock()?;
        let envelope = AABB::from_corners([min_lng, min_lat], [max_lng, max_lat]);

        let mut rows: Vec<SegmentRow> = inner
            .spatial_index
            .locate_in_envelope(&envelope)
            .filter_map(|entry| {
                let hash = &entry.data;
                let history = inner
                    .user_segments
                    .get(&(user_id.to_string(), hash.clone()))?;
                if history.ride_count < min_ride_count {
                    return None;
                }
                let segment = inner.segments.get(hash)?;
                Some(SegmentRow {
                    id: hash.clone(),
                    start_lat: segment.start.latitude,
                    start_lng: segment.start.longitude,
                    end_lat: segment.end.latitude,
                    end_lng: segment.end.longitude,
                    ride_count: history.ride_count,
                    last_ridden_at: Some(history.last_ridden_at),
                    road_name: segment.road_name.clone(),
                    road_type: segment.road_type.clone(),
                })
            })
            .collect();

        // R-tree iteration order is unspecified
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn get_user_segment_stats(&self, user_id: &str) -> Result<SegmentStats> {
        let inner = self.lock()?;
        let recent_cutoff = Utc::now() - Duration::days(RECENT_SEGMENT_DAYS);

        let mut stats = SegmentStats::default();
        let mut unique_meters = 0.0;
        for ((owner, hash), history) in &inner.user_segments {
            if owner != user_id {
                continue;
            }
            stats.total_segments += 1;
            stats.total_rides += history.ride_count;
            stats.most_ridden_count = stats.most_ridden_count.max(history.ride_count);
            *stats
                .segments_by_ride_count
                .entry(ride_count_bucket(history.ride_count).to_string())
                .or_insert(0) += 1;
            if history.first_ridden_at >= recent_cutoff {
                stats.recent_new_segments += 1;
            }
            if let Some(segment) = inner.segments.get(hash) {
                unique_meters += segment.length_meters;
            }
        }
        stats.unique_km = unique_meters / 1000.0;
        Ok(stats)
    }

    fn get_user_preferences(&self, user_id: &str) -> Result<UserRoadPreferences> {
        let inner = self.lock()?;
        Ok(inner.preferences.get(user_id).cloned().unwrap_or_default())
    }

    fn upsert_user_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<UserRoadPreferences> {
        let mut inner = self.lock()?;
        let prefs = inner.preferences.entry(user_id.to_string()).or_default();
        prefs.apply(update);
        Ok(prefs.clone())
    }
}

impl ActivitySource for MemorySegmentStore {
    fn list_activities(
        &self,
        user_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivitySummary>> {
        let inner = self.lock()?;
        let mut activities: Vec<ActivitySummary> = inner
            .activities
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| ActivitySummary {
                activity_id: a.track.activity_id.clone(),
                start_date: a.track.start_date,
                segments_processed: a.processed,
            })
            .filter(|summary| filter.matches(summary))
            .collect();

        activities.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.activity_id.cmp(&b.activity_id))
        });
        Ok(activities)
    }

    fn get_activity_track(&self, activity_id: &str, user_id: &str) -> Result<ActivityTrack> {
        let inner = self.lock()?;
        inner
            .activities
            .get(activity_id)
            .filter(|a| a.user_id == user_id)
            .map(|a| a.track.clone())
            .ok_or_else(|| FamiliarityError::ActivityNotFound {
                activity_id: activity_id.to_string(),
            })
    }

    fn mark_processed(&self, activity_id: &str, user_id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.activities.get_mut(activity_id) {
            Some(activity) if activity.user_id == user_id => {
                activity.processed = true;
                Ok(())
            }
            _ => Err(FamiliarityError::ActivityNotFound {
                activity_id: activity_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn upsert(user: &str, activity: &str, hash: &str, lat: f64, day: u32) -> SegmentUpsert {
        SegmentUpsert {
            user_id: user.to_string(),
            activity_id: activity.to_string(),
            segment_hash: hash.to_string(),
            start_coord: Coordinate::new(lat, 8.0),
            end_coord: Coordinate::new(lat + 0.002, 8.0),
            length_meters: 222.0,
            bearing_degrees: 0.0,
            avg_speed_ms: Some(8.0),
            time_seconds: Some(27.75),
            activity_date: Utc.with_ymd_and_hms(2024, 6, day, 7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_counts_one_ride_per_activity() {
        let store = MemorySegmentStore::new();
        store.upsert_user_segment(&upsert("u1", "a1", "h1", 47.0, 1)).unwrap();
        store.upsert_user_segment(&upsert("u1", "a1", "h1", 47.0, 1)).unwrap();
        store.upsert_user_segment(&upsert("u1", "a2", "h1", 47.0, 3)).unwrap();

        let rows = store
            .get_segment_preferences("u1", &["h1".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ride_count, 2);
        assert_eq!(
            rows[0].last_ridden_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap())
        );
        assert_eq!(store.segment_count().unwrap(), 1);
    }

    #[test]
    fn test_histories_are_per_user() {
        let store = MemorySegmentStore::new();
        store.upsert_user_segment(&upsert("u1", "a1", "h1", 47.0, 1)).unwrap();

        assert!(store
            .get_segment_preferences("u2", &["h1".to_string()])
            .unwrap()
            .is_empty());
        assert_eq!(store.get_user_segment_stats("u2").unwrap().total_segments, 0);
    }

    #[test]
    fn test_bbox_query_filters_by_area_and_rides() {
        let store = MemorySegmentStore::new();
        store.upsert_user_segment(&upsert("u1", "a1", "near", 47.0, 1)).unwrap();
        store.upsert_user_segment(&upsert("u1", "a2", "near", 47.0, 2)).unwrap();
        store.upsert_user_segment(&upsert("u1", "a1", "once", 47.001, 1)).unwrap();
        store.upsert_user_segment(&upsert("u1", "a1", "far", 48.0, 1)).unwrap();
        store.set_road_info("near", Some("Seestrasse"), Some("secondary")).unwrap();

        let rows = store
            .get_user_segments_in_bbox("u1", 46.9, 47.1, 7.9, 8.1, 1)
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "once"]);
        assert_eq!(rows[0].road_name.as_deref(), Some("Seestrasse"));

        let familiar = store
            .get_user_segments_in_bbox("u1", 46.9, 47.1, 7.9, 8.1, 2)
            .unwrap();
        assert_eq!(familiar.len(), 1);
        assert_eq!(familiar[0].ride_count, 2);
    }

    #[test]
    fn test_preferences_default_then_update() {
        let store = MemorySegmentStore::new();
        assert_eq!(
            store.get_user_preferences("u1").unwrap(),
            UserRoadPreferences::default()
        );
        let updated = store
            .upsert_user_preferences(
                "u1",
                &PreferencesUpdate {
                    familiarity_strength: Some(80),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.familiarity_strength, 80);
        assert_eq!(store.get_user_preferences("u1").unwrap().familiarity_strength, 80);
    }

    #[test]
    fn test_stats_buckets() {
        let store = MemorySegmentStore::new();
        for (i, activity) in ["a1", "a2", "a3"].iter().enumerate() {
            store
                .upsert_user_segment(&upsert("u1", activity, "busy", 47.0, i as u32 + 1))
                .unwrap();
        }
        store.upsert_user_segment(&upsert("u1", "a1", "quiet", 47.01, 1)).unwrap();

        let stats = store.get_user_segment_stats("u1").unwrap();
        assert_eq!(stats.total_segments, 2);
        assert_eq!(stats.total_rides, 4);
        assert_eq!(stats.most_ridden_count, 3);
        assert!((stats.unique_km - 0.444).abs() < 1e-9);
        assert_eq!(stats.segments_by_ride_count.get("1"), Some(&1));
        assert_eq!(stats.segments_by_ride_count.get("2-4"), Some(&1));
    }

    #[test]
    fn test_activity_source_roundtrip() {
        let store = MemorySegmentStore::new();
        let track = ActivityTrack {
            activity_id: "a1".to_string(),
            polyline: Some(String::new()),
            start_date: Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap(),
            moving_time: Some(600),
            distance: Some(5000.0),
        };
        store.add_activity("u1", track).unwrap();

        let listed = store.list_activities("u1", &ActivityFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.get_activity_track("a1", "u2").is_err());

        store.mark_processed("a1", "u1").unwrap();
        assert!(store.is_processed("a1").unwrap());
        assert!(store
            .list_activities("u1", &ActivityFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        use std::sync::Arc;

        let store = Arc::new(MemorySegmentStore::new());
        store.upsert_user_segment(&upsert("u1", "a1", "h1", 47.0, 1)).unwrap();

        let holder = Arc::clone(&store);
        let crashed = std::thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            panic!("writer crashed while holding the lock");
        })
        .join();
        assert!(crashed.is_err());

        assert!(matches!(store.segment_count(), Err(FamiliarityError::Store { .. })));
        assert!(store.is_processed("a1").is_err());
        assert!(store.get_user_preferences("u1").is_err());
    }
}
