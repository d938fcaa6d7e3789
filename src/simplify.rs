//! Douglas-Peucker track simplification.
//!
//! Keeps the point of maximum perpendicular deviation from the chord between
//! the first and last point whenever that deviation exceeds the tolerance,
//! recursing on both halves; otherwise the span collapses to its endpoints.
//! Tolerance is in degrees (0.0001° is about 11 m at the equator).

use geo::{algorithm::simplify::Simplify, Coord, LineString};

use crate::Coordinate;

/// Default simplification tolerance in degrees.
pub const DEFAULT_TOLERANCE: f64 = 0.0001;

/// Simplify a track, always keeping its first and last point.
///
/// Tracks of two or fewer points are returned unchanged.
///
/// # Example
/// ```rust
/// use road_familiarity::{simplify_track, Coordinate};
///
/// let track = vec![
///     Coordinate::new(51.5000, -0.1200),
///     Coordinate::new(51.5005, -0.1200),
///     Coordinate::new(51.5010, -0.1200),
/// ];
/// let simplified = simplify_track(&track, 0.0001);
/// assert_eq!(simplified.len(), 2);
/// ```
pub fn simplify_track(points: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    let line = LineString::new(coords);
    let simplified = line.simplify(&tolerance);

    simplified
        .coords()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect()
}
