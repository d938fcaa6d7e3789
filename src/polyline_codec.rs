//! Encoded polyline codec.
//!
//! Tracks arrive as Google encoded polylines (precision 5): delta-coded
//! varints in 5-bit groups with the sign folded into the low bit. Input is
//! untrusted, so malformed strings surface as
//! [`FamiliarityError::InvalidPolyline`] rather than a panic.

use geo::Coord;

use crate::error::{FamiliarityError, Result};
use crate::Coordinate;

/// Decimal precision of the encoding (1e-5 degrees, ~1.1 m).
pub const POLYLINE_PRECISION: u32 = 5;

/// Decode an encoded polyline into coordinates.
///
/// The empty string decodes to an empty track.
///
/// # Example
/// ```
/// use road_familiarity::decode_track;
///
/// let track = decode_track("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
/// assert_eq!(track.len(), 3);
/// assert!((track[0].latitude - 38.5).abs() < 1e-9);
/// assert!((track[0].longitude + 120.2).abs() < 1e-9);
/// ```
pub fn decode_track(encoded: &str) -> Result<Vec<Coordinate>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).map_err(|e| {
        FamiliarityError::InvalidPolyline {
            message: e.to_string(),
        }
    })?;

    Ok(line
        .coords()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect())
}

/// Encode coordinates as a polyline string.
pub fn encode_track(points: &[Coordinate]) -> Result<String> {
    if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
        return Err(FamiliarityError::InvalidCoordinates {
            message: format!("({}, {})", bad.latitude, bad.longitude),
        });
    }

    let coords = points.iter().map(|p| Coord {
        x: p.longitude,
        y: p.latitude,
    });

    polyline::encode_coordinates(coords, POLYLINE_PRECISION).map_err(|e| {
        FamiliarityError::InvalidCoordinates {
            message: e.to_string(),
        }
    })
}
