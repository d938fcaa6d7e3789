//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use road_familiarity::geo_utils::destination_point;
use road_familiarity::{encode_track, ActivityTrack, Coordinate};

pub const ZURICH: Coordinate = Coordinate {
    latitude: 47.3769,
    longitude: 8.5417,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Straight track from `start` along `bearing`, one point every `step_m`.
pub fn straight_track(start: Coordinate, bearing: f64, length_m: f64, step_m: f64) -> Vec<Coordinate> {
    let steps = (length_m / step_m).round() as usize;
    (0..=steps)
        .map(|i| destination_point(&start, bearing, i as f64 * step_m / 1000.0))
        .collect()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()
}

/// Activity riding a straight line out from `start`.
pub fn ride(id: &str, start: Coordinate, bearing: f64, length_m: f64, d: u32) -> ActivityTrack {
    let points = straight_track(start, bearing, length_m, 50.0);
    ActivityTrack {
        activity_id: id.to_string(),
        polyline: Some(encode_track(&points).unwrap()),
        start_date: day(d),
        moving_time: Some((length_m / 7.0) as u32),
        distance: Some(length_m),
    }
}
