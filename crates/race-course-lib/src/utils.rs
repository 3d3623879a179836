//! Utility functions for coordinate conversions
//!
//! Checkpoints are printed on Dutch topographic maps, so coordinates are
//! projected into the Rijksdriehoek grid (RD, EPSG:28992). The conversion uses
//! the published polynomial approximation around Amersfoort, which is accurate
//! to well under a metre inside the Netherlands.

use crate::GridCoordinate;
use geo::Point;

/// RD easting of the Amersfoort reference point in meters
pub const RD_ORIGIN_X: f64 = 155000.0;
/// RD northing of the Amersfoort reference point in meters
pub const RD_ORIGIN_Y: f64 = 463000.0;

/// WGS84 latitude of the Amersfoort reference point in degrees
pub const REF_LATITUDE: f64 = 52.15517440;
/// WGS84 longitude of the Amersfoort reference point in degrees
pub const REF_LONGITUDE: f64 = 5.38720621;

/// Nominal RD validity box in meters (min_x, min_y, max_x, max_y)
pub const RD_BOUNDS: (f64, f64, f64, f64) = (-7000.0, 289000.0, 300000.0, 629000.0);

/// Easting coefficients as (power of dphi, power of dlambda, coefficient)
const R_PQ: [(i32, i32, f64); 9] = [
    (0, 1, 190094.945),
    (1, 1, -11832.228),
    (2, 1, -114.221),
    (0, 3, -32.391),
    (1, 0, -0.705),
    (3, 1, -2.340),
    (1, 3, -0.608),
    (0, 2, -0.008),
    (2, 3, 0.148),
];

/// Northing coefficients as (power of dphi, power of dlambda, coefficient)
const S_PQ: [(i32, i32, f64); 10] = [
    (1, 0, 309056.544),
    (0, 2, 3638.893),
    (2, 0, 73.077),
    (1, 2, -157.984),
    (3, 0, 59.788),
    (0, 1, 0.433),
    (2, 2, -6.439),
    (1, 1, -0.032),
    (0, 4, 0.092),
    (1, 4, -0.054),
];

/// Latitude coefficients (arc seconds) as (power of dx, power of dy, coefficient)
const K_PQ: [(i32, i32, f64); 11] = [
    (0, 1, 3235.65389),
    (2, 0, -32.58297),
    (0, 2, -0.24750),
    (2, 1, -0.84978),
    (0, 3, -0.06550),
    (2, 2, -0.01709),
    (1, 0, -0.00738),
    (4, 0, 0.00530),
    (2, 3, -0.00039),
    (4, 1, 0.00033),
    (1, 1, -0.00012),
];

/// Longitude coefficients (arc seconds) as (power of dx, power of dy, coefficient)
const L_PQ: [(i32, i32, f64); 12] = [
    (1, 0, 5260.52916),
    (1, 1, 105.94684),
    (1, 2, 2.45656),
    (3, 0, -0.81885),
    (1, 3, 0.05594),
    (3, 1, -0.05607),
    (0, 1, 0.01199),
    (3, 2, -0.00256),
    (1, 4, 0.00128),
    (0, 2, 0.00022),
    (2, 0, -0.00022),
    (5, 0, 0.00026),
];

#[inline(always)]
fn polynomial(coefficients: &[(i32, i32, f64)], a: f64, b: f64) -> f64 {
    coefficients
        .iter()
        .map(|&(p, q, c)| c * a.powi(p) * b.powi(q))
        .sum()
}

/// Convert WGS84 (lat, lon) to RD (x, y) in meters
///
/// # Arguments
/// * `lat` - Latitude in degrees
/// * `lon` - Longitude in degrees
///
/// # Returns
/// A `Point<f64>` with x (easting) and y (northing) in meters
#[inline]
pub fn wgs84_to_rd(lat: f64, lon: f64) -> Point<f64> {
    let d_phi = 0.36 * (lat - REF_LATITUDE);
    let d_lambda = 0.36 * (lon - REF_LONGITUDE);

    let x = RD_ORIGIN_X + polynomial(&R_PQ, d_phi, d_lambda);
    let y = RD_ORIGIN_Y + polynomial(&S_PQ, d_phi, d_lambda);

    Point::new(x, y)
}

/// Convert RD (x, y) in meters to WGS84 (lat, lon)
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline]
pub fn rd_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let dx = (x - RD_ORIGIN_X) * 1e-5;
    let dy = (y - RD_ORIGIN_Y) * 1e-5;

    let lat = REF_LATITUDE + polynomial(&K_PQ, dx, dy) / 3600.0;
    let lon = REF_LONGITUDE + polynomial(&L_PQ, dx, dy) / 3600.0;

    (lat, lon)
}

/// Project a longitude/latitude pair onto the integer RD grid
///
/// Note the argument order: this follows the (x, y) order of KML coordinates.
/// Input outside the Netherlands is not rejected, it just yields meaningless
/// grid values.
#[inline]
pub fn to_projected(longitude: f64, latitude: f64) -> GridCoordinate {
    let point = wgs84_to_rd(latitude, longitude);
    GridCoordinate::new(point.x().round() as i64, point.y().round() as i64)
}

/// Check if a grid coordinate lies inside the nominal RD validity box
#[inline]
pub fn is_within_rd_bounds(coordinate: &GridCoordinate) -> bool {
    let (min_x, min_y, max_x, max_y) = RD_BOUNDS;
    let x = coordinate.x() as f64;
    let y = coordinate.y() as f64;
    x >= min_x && x <= max_x && y >= min_y && y <= max_y
}
