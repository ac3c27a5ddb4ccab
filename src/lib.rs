//! # Linker Engine
//!
//! Position resolution and checkpoint timing statistics for live event tracking.
//!
//! Teams and staff of a tracing game carry GPS trackers. This library turns
//! their tracker state and the event's reference geography (base, fields,
//! checkpoints, routes, forbidden areas) into:
//! - a human-readable place description per tracker
//! - checkpoint logs traced from a team's raw GPS history
//! - per-checkpoint and per-route transit averages by walking direction
//! - per-team deviations against those averages, formatted and colour-coded
//!
//! ## Features
//!
//! - **`parallel`** - Compute per-team statistics in parallel with rayon
//! - **`http`** - Async client for the event REST API
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use linker_engine::{describe_position, EventMap, Fiche, GpsPoint, Tracker, TrackerFix};
//! use chrono::Utc;
//!
//! let mut map = EventMap::default();
//! map.fiches.insert(Fiche::new(1, 1, 10, GpsPoint::new(50.9000, 4.4000), "A1"));
//!
//! let tracker = Tracker {
//!     id: 7,
//!     fiche: Some(1),
//!     last_fix: Some(TrackerFix::new(Utc::now(), GpsPoint::new(50.9001, 4.4001))),
//!     ..Tracker::default()
//! };
//!
//! assert_eq!(describe_position(&tracker, &map).to_string(), "Checkpoint A1");
//! ```

use geo::{Coord, Point};

pub mod geo_utils;

pub mod model;
pub use model::{
    Basis, CheckpointLog, Direction, Entities, Entity, EventMap, Fiche, ForbiddenArea,
    MemberType, Team, Tocht, Tracker, TrackerConfig, TrackerFix, Weide, Zone,
    BasisId, CheckpointLogId, FicheId, ForbiddenAreaId, TeamId, TochtId, TrackerId, WeideId,
};

// Place descriptions for trackers
pub mod position;
pub use position::{describe_position, describe_zone, PositionDescription};

// Checkpoint sequence and log lookups
pub mod checkpoints;
pub use checkpoints::{checkpoint_log, last_checkpoint_log, Course};

// Transit averages and team deviations
pub mod stats;
pub use stats::{calculate_stats, DirectionStats, SingleStat, Stats, TeamStat};

#[cfg(feature = "parallel")]
pub use stats::calculate_stats_parallel;

pub mod format;
pub use format::{average_minutes_label, seconds_to_hours_minutes, to_hours_minutes};

pub mod colors;
pub use colors::{
    deviation_color, fiche_deviation_color, fiche_time_to_color, route_deviation_color,
    ColorProps,
};

// Client-side zone evaluation when the backend zones are unavailable
pub mod geofence;
pub use geofence::{Geofence, GeofenceConfig};

// Checkpoint logs from GPS history
pub mod trace;
pub use trace::{trace_team, MERGE_WINDOW_MINUTES};

// REST client for the event API
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, ClientError, LinkerClient, Snapshot};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("LinkerRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use linker_engine::GpsPoint;
/// let point = GpsPoint::new(50.8503, 4.3517); // Brussels
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Convert to a `geo` point (`x` = longitude, `y` = latitude).
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl From<Point<f64>> for GpsPoint {
    fn from(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }
}

impl From<Coord<f64>> for GpsPoint {
    fn from(coord: Coord<f64>) -> Self {
        Self::new(coord.y, coord.x)
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use chrono::{DateTime, Utc};
    use log::{debug, info};

    /// Tracker state as sent by the native client.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiTracker {
        pub id: u32,
        pub tracker_code: String,
        pub tracker_name: Option<String>,
        /// Unix timestamp (seconds) of the last fix
        pub fix_timestamp: Option<i64>,
        pub fix_point: Option<GpsPoint>,
        pub basis: Option<u32>,
        pub weide: Option<u32>,
        pub fiche: Option<u32>,
        pub tocht: Option<u32>,
        pub forbidden_area: Option<u32>,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiFiche {
        pub id: u32,
        pub order: u32,
        pub tocht: u32,
        pub point: GpsPoint,
        pub display_name: String,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiTocht {
        pub id: u32,
        pub identifier: String,
        pub order: Option<u32>,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiWeide {
        pub id: u32,
        pub display_name: String,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiForbiddenArea {
        pub id: u32,
        pub description: String,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiColorProps {
        pub background: String,
        pub text: String,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiPosition {
        pub tracker_id: u32,
        pub description: String,
        pub is_warning: bool,
    }

    impl From<ColorProps> for FfiColorProps {
        fn from(props: ColorProps) -> Self {
            Self {
                background: props.background.to_string(),
                text: props.text.to_string(),
            }
        }
    }

    fn to_tracker(tracker: FfiTracker) -> Tracker {
        let last_fix = match (tracker.fix_timestamp, tracker.fix_point) {
            (Some(ts), Some(point)) => DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|at| TrackerFix::new(at, point)),
            _ => None,
        };
        Tracker {
            id: tracker.id,
            tracker_code: tracker.tracker_code,
            tracker_name: tracker.tracker_name,
            last_fix,
            basis: tracker.basis,
            weide: tracker.weide,
            fiche: tracker.fiche,
            tocht: tracker.tocht,
            forbidden_area: tracker.forbidden_area,
        }
    }

    // Geometry is not needed for describing backend-resolved zones.
    fn to_event_map(
        fiches: Vec<FfiFiche>,
        tochten: Vec<FfiTocht>,
        weides: Vec<FfiWeide>,
        forbidden_areas: Vec<FfiForbiddenArea>,
    ) -> EventMap {
        EventMap {
            fiches: fiches
                .into_iter()
                .map(|f| Fiche::new(f.id, f.order, f.tocht, f.point, f.display_name))
                .collect(),
            tochten: tochten
                .into_iter()
                .map(|t| Tocht {
                    id: t.id,
                    identifier: t.identifier,
                    order: t.order,
                    route: geo::LineString::new(vec![]),
                    is_alternative: false,
                })
                .collect(),
            weides: weides
                .into_iter()
                .map(|w| Weide {
                    id: w.id,
                    tocht: None,
                    polygon: geo::Polygon::new(geo::LineString::new(vec![]), vec![]),
                    display_name: w.display_name,
                })
                .collect(),
            basis: None,
            forbidden_areas: forbidden_areas
                .into_iter()
                .map(|a| ForbiddenArea {
                    id: a.id,
                    description: a.description,
                    area: geo::MultiPolygon::new(vec![]),
                })
                .collect(),
        }
    }

    /// Describe where each tracker is.
    #[uniffi::export]
    pub fn ffi_describe_positions(
        trackers: Vec<FfiTracker>,
        fiches: Vec<FfiFiche>,
        tochten: Vec<FfiTocht>,
        weides: Vec<FfiWeide>,
        forbidden_areas: Vec<FfiForbiddenArea>,
    ) -> Vec<FfiPosition> {
        init_logging();
        info!(
            "[LinkerRust] describe_positions: {} trackers, {} fiches",
            trackers.len(),
            fiches.len()
        );

        let map = to_event_map(fiches, tochten, weides, forbidden_areas);

        trackers
            .into_iter()
            .map(|t| {
                let tracker = to_tracker(t);
                let description = describe_position(&tracker, &map);
                debug!("[LinkerRust] tracker {} -> {}", tracker.id, description);
                FfiPosition {
                    tracker_id: tracker.id,
                    is_warning: description.is_warning(),
                    description: description.to_string(),
                }
            })
            .collect()
    }

    /// Format a duration or deviation in seconds.
    #[uniffi::export]
    pub fn ffi_seconds_to_hours_minutes(seconds: Option<i64>, signed: bool) -> String {
        seconds_to_hours_minutes(seconds, signed)
    }

    /// Colour for a deviation on a scale saturating at `max_value`.
    #[uniffi::export]
    pub fn ffi_deviation_color(value: f64, max_value: f64) -> FfiColorProps {
        deviation_color(value, max_value).into()
    }

    /// Colour for a team's average route deviation.
    #[uniffi::export]
    pub fn ffi_route_deviation_color(seconds: i64) -> FfiColorProps {
        route_deviation_color(seconds).into()
    }

    /// Colour for a team's average checkpoint deviation.
    #[uniffi::export]
    pub fn ffi_fiche_deviation_color(seconds: i64) -> FfiColorProps {
        fiche_deviation_color(seconds).into()
    }

    /// Get default geofence configuration.
    #[uniffi::export]
    pub fn default_geofence_config() -> GeofenceConfig {
        GeofenceConfig::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(50.8503, 4.3517).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_geo_point_conversion_swaps_axes() {
        let p = GpsPoint::new(50.85, 4.35);
        let geo_point = p.to_point();
        assert_eq!(geo_point.x(), 4.35);
        assert_eq!(geo_point.y(), 50.85);
        assert_eq!(GpsPoint::from(geo_point), p);
    }

    #[test]
    fn test_bounds() {
        let points = vec![
            GpsPoint::new(50.90, 4.40),
            GpsPoint::new(50.92, 4.44),
            GpsPoint::new(50.91, 4.42),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 50.90);
        assert_eq!(bounds.max_lng, 4.44);
        assert_eq!(bounds.min_lng, 4.40);
        assert_eq!(bounds.max_lat, 50.92);

        assert!(Bounds::from_points(&[]).is_none());
    }
}
