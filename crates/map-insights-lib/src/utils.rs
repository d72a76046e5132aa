//! Coordinate conversions between geographic degrees and Web Mercator meters
//!
//! All helpers take and return coordinates in GeoJSON axis order (x = longitude, y = latitude).

use geo::Coord;

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;
pub const EARTH_SIZE_METERS: f64 = EARTH_MERCATOR_MAX - EARTH_MERCATOR_MIN;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert a longitude/latitude pair in degrees to Web Mercator meters
///
/// Latitude is clamped to the representable Web Mercator range first.
#[inline(always)]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> Coord<f64> {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: lon * LON_TO_X_FACTOR,
        y: (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR,
    }
}

/// Convert Web Mercator meters back to a longitude/latitude pair in degrees
#[inline(always)]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> Coord<f64> {
    Coord {
        x: x * X_TO_LON_FACTOR,
        y: (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees(),
    }
}

/// Check if a coordinate lies within Web Mercator bounds
#[inline(always)]
pub fn is_valid_mercator(coord: Coord<f64>) -> bool {
    (EARTH_MERCATOR_MIN..=EARTH_MERCATOR_MAX).contains(&coord.x)
        && (EARTH_MERCATOR_MIN..=EARTH_MERCATOR_MAX).contains(&coord.y)
}

/// Check if a coordinate is a plausible longitude/latitude pair
#[inline(always)]
pub fn is_valid_lon_lat(coord: Coord<f64>) -> bool {
    (-180.0..=180.0).contains(&coord.x) && (-90.0..=90.0).contains(&coord.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lon_lat_to_mercator_origin() {
        let c = lon_lat_to_mercator(0.0, 0.0);
        assert!(c.x.abs() < 0.01);
        assert!(c.y.abs() < 0.01);
    }

    #[test]
    fn test_lon_lat_to_mercator_bounds() {
        let west = lon_lat_to_mercator(-180.0, 0.0);
        assert!((west.x - EARTH_MERCATOR_MIN).abs() < 1.0);

        let east = lon_lat_to_mercator(180.0, 0.0);
        assert!((east.x - EARTH_MERCATOR_MAX).abs() < 1.0);
    }

    #[test]
    fn test_mercator_roundtrip_sydney() {
        let (lon, lat) = (151.2110, -33.8614);
        let m = lon_lat_to_mercator(lon, lat);
        let back = mercator_to_lon_lat(m.x, m.y);
        assert!((back.x - lon).abs() < 1e-6);
        assert!((back.y - lat).abs() < 1e-6);
    }

    #[test]
    fn test_latitude_is_clamped() {
        let pole = lon_lat_to_mercator(0.0, 90.0);
        assert!(pole.y.is_finite());
        assert!((pole.y - EARTH_MERCATOR_MAX).abs() < 1.0);
    }

    #[test]
    fn test_validity_checks() {
        assert!(is_valid_mercator(Coord { x: 0.0, y: 0.0 }));
        assert!(!is_valid_mercator(Coord {
            x: EARTH_MERCATOR_MAX + 1.0,
            y: 0.0
        }));
        assert!(is_valid_lon_lat(Coord { x: -0.1278, y: 51.5074 }));
        assert!(!is_valid_lon_lat(Coord { x: 200.0, y: 0.0 }));
    }
}
