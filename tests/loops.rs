//! Loop waypoint selection against stored ride history.

mod common;

use common::{init_logging, ride, ZURICH};
use road_familiarity::geo_utils::{destination_point, haversine_distance};
use road_familiarity::{
    BatchOptions, FamiliarityEngine, LoopRequest, MemorySegmentStore, Quadrant,
};

/// Engine whose user has ridden a 2 km stretch in each compass direction,
/// starting 4 km out from Zurich.
fn engine_with_spokes() -> FamiliarityEngine<MemorySegmentStore> {
    let source = MemorySegmentStore::new();
    for (i, bearing) in [0.0, 90.0, 180.0, 270.0].iter().enumerate() {
        let origin = destination_point(&ZURICH, *bearing, 4.0);
        for repeat in 0..2 {
            let id = format!("spoke-{}-{}", i, repeat);
            source
                .add_activity("u1", ride(&id, origin, *bearing, 2000.0, (i * 2 + repeat + 1) as u32))
                .unwrap();
        }
    }

    let engine = FamiliarityEngine::new(MemorySegmentStore::new());
    engine
        .extract_segments_for_user_batch(&source, "u1", &BatchOptions::default())
        .unwrap();
    engine
}

#[test]
fn test_waypoints_cover_all_quadrants() {
    init_logging();
    let engine = engine_with_spokes();
    let result = engine
        .get_loop_waypoints("u1", &LoopRequest::new(ZURICH, 20.0))
        .unwrap();

    assert!(!result.fallback_to_random);
    assert_eq!(result.segments.len(), 8);
    assert!(result.total_familiar_segments >= 8);
    for quadrant in Quadrant::ALL {
        let in_quadrant = result.segments.iter().filter(|s| s.quadrant == quadrant).count();
        assert_eq!(in_quadrant, 2, "{:?}", quadrant);
    }

    // Clockwise
    for pair in result.segments.windows(2) {
        assert!(pair[0].bearing_from_start <= pair[1].bearing_from_start);
    }

    for (i, a) in result.waypoints.iter().enumerate() {
        for b in &result.waypoints[i + 1..] {
            assert!(haversine_distance(a, b) >= 100.0);
        }
    }
}

#[test]
fn test_explore_mode_takes_one_per_quadrant() {
    let engine = engine_with_spokes();
    let request = LoopRequest {
        explore_mode: true,
        ..LoopRequest::new(ZURICH, 20.0)
    };
    let result = engine.get_loop_waypoints("u1", &request).unwrap();
    assert_eq!(result.segments.len(), 4);
    // Closest to the 5 km preferred radius
    for segment in &result.segments {
        assert!((segment.distance_from_start - 5000.0).abs() < 1000.0);
    }
}

#[test]
fn test_ride_threshold_and_unknown_area_fall_back() {
    let engine = engine_with_spokes();

    let strict = LoopRequest {
        min_ride_count: 3,
        ..LoopRequest::new(ZURICH, 20.0)
    };
    let result = engine.get_loop_waypoints("u1", &strict).unwrap();
    assert!(result.fallback_to_random);
    assert!(result.waypoints.is_empty());

    let elsewhere = road_familiarity::Coordinate::new(40.0, -3.7);
    let result = engine
        .get_loop_waypoints("u1", &LoopRequest::new(elsewhere, 20.0))
        .unwrap();
    assert!(result.fallback_to_random);
}

#[test]
fn test_invalid_request_is_an_error() {
    let engine = engine_with_spokes();
    assert!(engine
        .get_loop_waypoints("u1", &LoopRequest::new(ZURICH, -5.0))
        .is_err());
}
