//! # Geographic Utilities
//!
//! Distance and containment helpers shared by the position resolver and the
//! geofence.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`distance_to_line`] | Distance from a point to a route line |
//! | [`distance_to_polygon`] | Distance from a point to a field polygon (0 inside) |
//! | [`multi_polygon_contains`] | Containment test for forbidden areas |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use linker_engine::{GpsPoint, geo_utils};
//! use geo::{line_string, LineString};
//!
//! let route: LineString<f64> = line_string![
//!     (x: 4.4000, y: 50.9000),
//!     (x: 4.4100, y: 50.9000),
//! ];
//!
//! // ~111m north of the route
//! let walker = GpsPoint::new(50.9010, 4.4050);
//! let d = geo_utils::distance_to_line(&walker, &route);
//! assert!((d - 111.0).abs() < 2.0);
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates. `geo` geometries use `x` for
//! longitude and `y` for latitude.

use geo::{Closest, ClosestPoint, Contains, Distance, Haversine, LineString, MultiPolygon, Polygon};
use crate::GpsPoint;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a spherical Earth
/// with radius 6,371 km).
///
/// # Example
///
/// ```rust
/// use linker_engine::{GpsPoint, geo_utils};
///
/// let brussels = GpsPoint::new(50.8503, 4.3517);
/// let antwerp = GpsPoint::new(51.2194, 4.4025);
///
/// let distance = geo_utils::haversine_distance(&brussels, &antwerp);
/// assert!((distance - 41_200.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Haversine::distance(p1.to_point(), p2.to_point())
}

/// Distance in meters from a point to the closest point of a line.
///
/// The closest point is found in planar lon/lat space and the distance to it is
/// measured with haversine, which is accurate at event scale (a few km).
/// Returns `f64::INFINITY` for an empty line.
pub fn distance_to_line(point: &GpsPoint, line: &LineString<f64>) -> f64 {
    closest_distance(point, line.closest_point(&point.to_point()))
}

/// Distance in meters from a point to a polygon. Points inside the polygon
/// (holes excluded) are at distance 0.
pub fn distance_to_polygon(point: &GpsPoint, polygon: &Polygon<f64>) -> f64 {
    let p = point.to_point();
    if polygon.contains(&p) {
        return 0.0;
    }

    let exterior = closest_distance(point, polygon.exterior().closest_point(&p));
    polygon
        .interiors()
        .iter()
        .map(|ring| closest_distance(point, ring.closest_point(&p)))
        .fold(exterior, f64::min)
}

/// Check whether any polygon of a multipolygon contains the point.
#[inline]
pub fn multi_polygon_contains(area: &MultiPolygon<f64>, point: &GpsPoint) -> bool {
    area.contains(&point.to_point())
}

fn closest_distance(point: &GpsPoint, closest: Closest<f64>) -> f64 {
    match closest {
        Closest::Intersection(_) => 0.0,
        Closest::SinglePoint(p) => Haversine::distance(point.to_point(), p),
        Closest::Indeterminate => f64::INFINITY,
    }
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale at the given latitude, which is always the larger
/// of the two, so a square search area of this half-width covers the circle.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    // At the equator, 1 degree ≈ 111,320 meters
    // This decreases with cos(latitude) for longitude
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Unit Tests
// =============================================================================
