//! SQLite store round trips through the engine.

#![cfg(feature = "persistence")]

mod common;

use common::{init_logging, ride, ZURICH};
use road_familiarity::{
    BatchOptions, ConfidenceLevel, FamiliarityEngine, PreferencesUpdate, RouteInput,
    SqliteSegmentStore,
};
use tempfile::TempDir;

#[test]
fn test_history_survives_reopen() {
    init_logging();
    let tmp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp_dir.path().join("familiarity.db");

    let commute = ride("commute-1", ZURICH, 45.0, 3000.0, 1);
    let encoded = commute.polyline.clone().unwrap();

    {
        let store = SqliteSegmentStore::new(&db_path).expect("failed to open store");
        for i in 0..6 {
            let mut track = commute.clone();
            track.activity_id = format!("commute-{}", i);
            track.start_date = common::day(i + 1);
            store.add_activity("u1", &track).unwrap();
        }

        let engine = FamiliarityEngine::new(store);
        let outcome = engine
            .extract_segments_for_user_batch(engine.store(), "u1", &BatchOptions::default())
            .unwrap();
        assert_eq!(outcome.processed, 6);
        assert_eq!(outcome.remaining, 0);
        assert!(outcome.errors.is_empty());
    }

    let store = SqliteSegmentStore::new(&db_path).expect("failed to reopen store");
    let engine = FamiliarityEngine::new(store);

    let stats = engine.get_user_segment_stats("u1").unwrap();
    assert_eq!(stats.total_segments, 15);
    assert_eq!(stats.most_ridden_count, 6);
    assert_eq!(stats.segments_by_ride_count.get("5-9"), Some(&15));
    assert!((stats.unique_km - 3.0).abs() < 0.05);

    let score = engine
        .score_route(&RouteInput::Encoded(encoded), "u1")
        .unwrap();
    assert_eq!(score.familiar_segments, 15);
    assert_eq!(score.confidence, ConfidenceLevel::High);
    assert!(score.overall_score > 1.0);
}

#[test]
fn test_preferences_change_scores() {
    init_logging();
    let engine = FamiliarityEngine::new(SqliteSegmentStore::in_memory().unwrap());
    let commute = ride("commute", ZURICH, 0.0, 1000.0, 1);
    engine.store().add_activity("u1", &commute).unwrap();
    engine
        .extract_segments_for_user_batch(engine.store(), "u1", &BatchOptions::default())
        .unwrap();

    let route = RouteInput::Encoded(commute.polyline.clone().unwrap());
    let before = engine.score_route(&route, "u1").unwrap();

    let prefs = engine
        .update_user_preferences(
            "u1",
            &PreferencesUpdate {
                familiarity_strength: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(prefs.familiarity_strength, 0);

    let after = engine.score_route(&route, "u1").unwrap();
    assert!(before.overall_score > after.overall_score);
    assert_eq!(after.overall_score, 1.0);
    // Familiarity is still known, only its weight changed
    assert_eq!(after.familiar_segments, before.familiar_segments);
}
