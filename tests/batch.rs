//! Resumable batch extraction over an activity source.

mod common;

use common::{day, init_logging, ride, ZURICH};
use road_familiarity::{
    ActivitySource, ActivityTrack, BatchOptions, FamiliarityEngine, FamiliarityError,
    MemorySegmentStore, PreferenceRow, PreferencesUpdate, Result, SegmentRow, SegmentStats,
    SegmentStore, SegmentUpsert, UserRoadPreferences,
};

/// Store whose upserts fail for one activity.
struct FlakyStore {
    inner: MemorySegmentStore,
    failing_activity: String,
}

impl SegmentStore for FlakyStore {
    fn upsert_user_segment(&self, upsert: &SegmentUpsert) -> Result<()> {
        if upsert.activity_id == self.failing_activity {
            return Err(FamiliarityError::store("connection reset"));
        }
        self.inner.upsert_user_segment(upsert)
    }

    fn get_segment_preferences(&self, user_id: &str, hashes: &[String]) -> Result<Vec<PreferenceRow>> {
        self.inner.get_segment_preferences(user_id, hashes)
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
        self.inner
            .get_user_segments_in_bbox(user_id, min_lat, max_lat, min_lng, max_lng, min_ride_count)
    }

    fn get_user_segment_stats(&self, user_id: &str) -> Result<SegmentStats> {
        self.inner.get_user_segment_stats(user_id)
    }

    fn get_user_preferences(&self, user_id: &str) -> Result<UserRoadPreferences> {
        self.inner.get_user_preferences(user_id)
    }

    fn upsert_user_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<UserRoadPreferences> {
        self.inner.upsert_user_preferences(user_id, update)
    }
}

fn source_with_rides(count: u32) -> MemorySegmentStore {
    let source = MemorySegmentStore::new();
    for i in 0..count {
        let track = ride(&format!("ride-{}", i), ZURICH, 90.0, 1000.0, i + 1);
        source.add_activity("u1", track).unwrap();
    }
    source
}

#[test]
fn test_batches_resume_until_done() {
    init_logging();
    let source = source_with_rides(5);
    let engine = FamiliarityEngine::new(MemorySegmentStore::new());
    let options = BatchOptions {
        limit: Some(2),
        ..Default::default()
    };

    let first = engine.extract_segments_for_user_batch(&source, "u1", &options).unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.remaining, 3);
    assert!(first.segments_stored > 0);
    assert!(first.errors.is_empty());
    assert!(source.is_processed("ride-0").unwrap());
    assert!(source.is_processed("ride-1").unwrap());

    let second = engine.extract_segments_for_user_batch(&source, "u1", &options).unwrap();
    assert_eq!((second.processed, second.remaining), (2, 1));

    let third = engine.extract_segments_for_user_batch(&source, "u1", &options).unwrap();
    assert_eq!((third.processed, third.remaining), (1, 0));

    let done = engine.extract_segments_for_user_batch(&source, "u1", &options).unwrap();
    assert_eq!(done.processed, 0);
    assert_eq!(done.segments_stored, 0);

    // Five rides over the same road
    let stats = engine.get_user_segment_stats("u1").unwrap();
    assert_eq!(stats.most_ridden_count, 5);
}

#[test]
fn test_reprocessing_does_not_double_count() {
    init_logging();
    let source = source_with_rides(2);
    let engine = FamiliarityEngine::new(MemorySegmentStore::new());

    engine
        .extract_segments_for_user_batch(&source, "u1", &BatchOptions::default())
        .unwrap();
    let again = engine
        .extract_segments_for_user_batch(
            &source,
            "u1",
            &BatchOptions {
                include_processed: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(again.processed, 2);

    let stats = engine.get_user_segment_stats("u1").unwrap();
    assert_eq!(stats.most_ridden_count, 2);
    assert_eq!(stats.total_rides, stats.total_segments * 2);
}

#[test]
fn test_store_failure_leaves_activity_unprocessed() {
    init_logging();
    let source = source_with_rides(3);
    let engine = FamiliarityEngine::new(FlakyStore {
        inner: MemorySegmentStore::new(),
        failing_activity: "ride-1".to_string(),
    });

    let outcome = engine
        .extract_segments_for_user_batch(&source, "u1", &BatchOptions::default())
        .unwrap();

    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.remaining, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].item_id, "ride-1");
    assert!(outcome.errors[0].message.contains("connection reset"));
    assert!(!source.is_processed("ride-1").unwrap());
    assert!(source.is_processed("ride-2").unwrap());
}

#[test]
fn test_failing_activity_does_not_stall_later_batches() {
    init_logging();
    let source = source_with_rides(3);
    let engine = FamiliarityEngine::new(FlakyStore {
        inner: MemorySegmentStore::new(),
        failing_activity: "ride-0".to_string(),
    });
    let options = BatchOptions {
        limit: Some(1),
        ..Default::default()
    };

    let mut rounds = Vec::new();
    for _ in 0..3 {
        let outcome = engine.extract_segments_for_user_batch(&source, "u1", &options).unwrap();
        rounds.push((outcome.processed, outcome.failed, outcome.remaining));
    }

    assert_eq!(rounds, vec![(1, 1, 1), (1, 1, 0), (0, 1, 0)]);
    assert!(!source.is_processed("ride-0").unwrap());
    assert!(source.is_processed("ride-1").unwrap());
    assert!(source.is_processed("ride-2").unwrap());
}

#[test]
fn test_activity_without_track_is_reported_and_skipped() {
    init_logging();
    let source = MemorySegmentStore::new();
    source
        .add_activity(
            "u1",
            ActivityTrack {
                activity_id: "trainer".to_string(),
                polyline: None,
                start_date: day(1),
                moving_time: Some(3600),
                distance: None,
            },
        )
        .unwrap();
    let engine = FamiliarityEngine::new(MemorySegmentStore::new());

    let outcome = engine
        .extract_segments_for_user_batch(&source, "u1", &BatchOptions::default())
        .unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert!(source.is_processed("trainer").unwrap());
    assert!(source
        .list_activities("u1", &Default::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_date_window_limits_candidates() {
    let source = source_with_rides(4);
    let engine = FamiliarityEngine::new(MemorySegmentStore::new());

    let outcome = engine
        .extract_segments_for_user_batch(
            &source,
            "u1",
            &BatchOptions {
                after_date: Some(day(2)),
                before_date: Some(day(3)),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(outcome.processed, 2);
    assert!(!source.is_processed("ride-0").unwrap());
    assert!(source.is_processed("ride-1").unwrap());
    assert!(source.is_processed("ride-2").unwrap());
    assert!(!source.is_processed("ride-3").unwrap());
}
