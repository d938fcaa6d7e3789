//! Geographic primitives on a spherical Earth.
//!
//! Distances use the haversine formula with a 6,371 km radius. All angles are
//! in degrees.

use crate::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Kilometers per degree of latitude, as used for bounding boxes.
pub const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Clamp guards asin against h drifting just above 1.0 for antipodes
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `p1` towards `p2`, normalized to [0, 360).
///
/// The result for coincident points is unspecified (currently 0).
pub fn bearing_degrees(p1: &Coordinate, p2: &Coordinate) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Point reached travelling `distance_km` from `origin` along `bearing`.
pub fn destination_point(origin: &Coordinate, bearing: f64, distance_km: f64) -> Coordinate {
    let angular = distance_km * 1000.0 / EARTH_RADIUS_METERS;
    let theta = bearing.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(lat2.to_degrees(), normalize_longitude(lon2.to_degrees()))
}

/// Total along-path length of a polyline in meters.
pub fn track_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Arithmetic midpoint of two coordinates.
///
/// Good enough for road segments, which are a few hundred meters long.
pub fn midpoint(a: &Coordinate, b: &Coordinate) -> Coordinate {
    Coordinate::new(
        (a.latitude + b.latitude) / 2.0,
        (a.longitude + b.longitude) / 2.0,
    )
}

/// Round both components to `decimals` decimal places.
pub fn round_coordinate(point: &Coordinate, decimals: u32) -> Coordinate {
    let factor = 10f64.powi(decimals as i32);
    Coordinate::new(
        (point.latitude * factor).round() / factor,
        (point.longitude * factor).round() / factor,
    )
}

/// Normalize any angle in degrees to [0, 360).
pub fn normalize_bearing(degrees: f64) -> f64 {
    let b = degrees.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

fn normalize_longitude(degrees: f64) -> f64 {
    (degrees + 540.0).rem_euclid(360.0) - 180.0
}
