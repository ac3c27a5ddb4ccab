//! # Geofence
//!
//! Client-side zone evaluation for a raw GPS point.
//!
//! The tracking backend resolves each tracker's zone and those references are
//! authoritative. When they are missing (offline replays, raw fixes from a
//! device) this module derives a zone from the event map with the same
//! thresholds the backend applies:
//!
//! | Zone | Match |
//! |------|-------|
//! | Basis | within 100 m of the base point |
//! | Weide | within 100 m of the field polygon |
//! | Fiche | within 100 m of the checkpoint |
//! | Forbidden area | inside the area |
//! | Tocht | within 60 m of the route line |
//!
//! The first matching row wins; within a row the nearest entity wins.
//! Checkpoints are indexed in an R-tree so the radius query stays cheap for
//! large events.

use log::debug;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::{
    distance_to_line, distance_to_polygon, haversine_distance, meters_to_degrees,
    multi_polygon_contains,
};
use crate::model::{EventMap, Fiche, FicheId, ForbiddenArea, Tocht, Tracker, Weide, Zone};
use crate::GpsPoint;

/// Match radii in meters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeofenceConfig {
    /// Default: 100m
    pub fiche_radius: f64,
    /// Default: 60m
    pub tocht_radius: f64,
    /// Distance to the polygon edge. Default: 100m
    pub weide_radius: f64,
    /// Default: 100m
    pub basis_radius: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            fiche_radius: 100.0,
            tocht_radius: 60.0,
            weide_radius: 100.0,
            basis_radius: 100.0,
        }
    }
}

/// A checkpoint in the R-tree.
#[derive(Debug, Clone, Copy)]
struct IndexedFiche {
    id: FicheId,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedFiche {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedFiche {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// Zone evaluator over one event map.
pub struct Geofence<'a> {
    map: &'a EventMap,
    config: GeofenceConfig,
    fiche_tree: RTree<IndexedFiche>,
}

impl<'a> Geofence<'a> {
    pub fn new(map: &'a EventMap, config: GeofenceConfig) -> Self {
        let indexed: Vec<IndexedFiche> = map
            .fiches
            .iter()
            .map(|f| IndexedFiche { id: f.id, lat: f.point.latitude, lng: f.point.longitude })
            .collect();
        debug!("[Geofence] indexed {} fiches", indexed.len());
        Self { map, config, fiche_tree: RTree::bulk_load(indexed) }
    }

    pub fn config(&self) -> &GeofenceConfig {
        &self.config
    }

    /// The zone `point` falls in, or `None` when it matches nothing.
    ///
    /// ```
    /// use linker_engine::{EventMap, Fiche, Geofence, GeofenceConfig, GpsPoint, Zone};
    ///
    /// let mut map = EventMap::default();
    /// map.fiches.insert(Fiche::new(3, 1, 1, GpsPoint::new(50.9000, 4.4000), "A1"));
    /// let fence = Geofence::new(&map, GeofenceConfig::default());
    ///
    /// // ~55m north of A1
    /// assert_eq!(fence.locate(&GpsPoint::new(50.9005, 4.4000)), Some(Zone::Fiche(3)));
    /// assert_eq!(fence.locate(&GpsPoint::new(50.9100, 4.4000)), None);
    /// ```
    pub fn locate(&self, point: &GpsPoint) -> Option<Zone> {
        if !point.is_valid() {
            debug!("[Geofence] ignoring invalid point {:?}", point);
            return None;
        }

        if let Some(basis) = &self.map.basis {
            if haversine_distance(point, &basis.point) <= self.config.basis_radius {
                return Some(Zone::Basis(basis.id));
            }
        }
        if let Some((weide, _)) = self.nearest_weide(point) {
            return Some(Zone::Weide(weide.id));
        }
        if let Some((fiche, _)) = self.nearest_fiche(point) {
            return Some(Zone::Fiche(fiche.id));
        }
        if let Some(area) = self.forbidden_area_at(point) {
            return Some(Zone::ForbiddenArea(area.id));
        }
        self.nearest_tocht(point).map(|(tocht, _)| Zone::Tocht(tocht.id))
    }

    /// Nearest checkpoint within the checkpoint radius, with its distance.
    pub fn nearest_fiche(&self, point: &GpsPoint) -> Option<(&'a Fiche, f64)> {
        let radius_deg = meters_to_degrees(self.config.fiche_radius, point.latitude);
        let query = [point.latitude, point.longitude];

        self.fiche_tree
            .locate_within_distance(query, radius_deg * radius_deg)
            .filter_map(|indexed| self.map.fiches.get(indexed.id))
            .map(|fiche| (fiche, haversine_distance(point, &fiche.point)))
            .filter(|(_, d)| *d <= self.config.fiche_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
    }

    fn nearest_weide(&self, point: &GpsPoint) -> Option<(&'a Weide, f64)> {
        self.map
            .weides
            .iter()
            .map(|weide| (weide, distance_to_polygon(point, &weide.polygon)))
            .filter(|(_, d)| *d <= self.config.weide_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn nearest_tocht(&self, point: &GpsPoint) -> Option<(&'a Tocht, f64)> {
        self.map
            .tochten
            .iter()
            .map(|tocht| (tocht, distance_to_line(point, &tocht.route)))
            .filter(|(_, d)| *d <= self.config.tocht_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn forbidden_area_at(&self, point: &GpsPoint) -> Option<&'a ForbiddenArea> {
        self.map
            .forbidden_areas
            .iter()
            .find(|area| multi_polygon_contains(&area.area, point))
    }

    /// Fill in the zone of a tracker the backend left unresolved.
    ///
    /// Trackers that already carry a zone, or have no fix, are returned unchanged.
    pub fn annotate(&self, tracker: &Tracker) -> Tracker {
        let mut annotated = tracker.clone();
        if tracker.zone().is_some() {
            return annotated;
        }
        if let Some(point) = tracker.last_point() {
            let zone = self.locate(&point);
            debug!("[Geofence] tracker {} resolved to {:?}", tracker.id, zone);
            annotated.set_zone(zone);
        }
        annotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Basis, TrackerFix};
    use crate::position::describe_position;
    use chrono::{TimeZone, Utc};
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(min_lng: f64, min_lat: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_lng, min_lat),
                (min_lng + size, min_lat),
                (min_lng + size, min_lat + size),
                (min_lng, min_lat + size),
                (min_lng, min_lat),
            ]),
            vec![],
        )
    }

    /// Route A runs east along latitude 50.900 from 4.400 to 4.420, with
    /// checkpoints at both ends. A field sits north of the route start and
    /// a forbidden area south of the middle. The base is far to the west.
    fn event_map() -> EventMap {
        let mut map = EventMap::default();
        map.basis = Some(Basis { id: 1, point: GpsPoint::new(50.900, 4.300) });
        map.tochten.insert(Tocht {
            id: 1,
            identifier: "A".to_string(),
            order: Some(1),
            route: LineString::from(vec![(4.400, 50.900), (4.420, 50.900)]),
            is_alternative: false,
        });
        map.fiches.insert(Fiche::new(11, 1, 1, GpsPoint::new(50.900, 4.400), "A1"));
        map.fiches.insert(Fiche::new(12, 2, 1, GpsPoint::new(50.900, 4.420), "A2"));
        map.weides.insert(Weide {
            id: 5,
            tocht: Some(1),
            polygon: square(4.398, 50.903, 0.004),
            display_name: "Weide A".to_string(),
        });
        map.forbidden_areas.insert(ForbiddenArea {
            id: 8,
            description: "Spoorweg".to_string(),
            area: MultiPolygon::new(vec![square(4.409, 50.8995, 0.002)]),
        });
        map
    }

    #[test]
    fn test_basis_radius() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        assert_eq!(fence.locate(&GpsPoint::new(50.9005, 4.300)), Some(Zone::Basis(1)));
        assert_eq!(fence.locate(&GpsPoint::new(50.9020, 4.300)), None);
    }

    #[test]
    fn test_weide_beats_fiche() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        // ~22m from A1 and ~311m below the field's southern edge
        assert_eq!(fence.locate(&GpsPoint::new(50.9002, 4.400)), Some(Zone::Fiche(11)));
        // ~89m from A1 and ~244m from the field
        assert_eq!(fence.locate(&GpsPoint::new(50.9008, 4.400)), Some(Zone::Fiche(11)));
        // Inside the field
        assert_eq!(fence.locate(&GpsPoint::new(50.9040, 4.400)), Some(Zone::Weide(5)));
        // ~56m south of the field edge and ~278m from A1
        assert_eq!(fence.locate(&GpsPoint::new(50.9025, 4.400)), Some(Zone::Weide(5)));
    }

    #[test]
    fn test_nearest_fiche_within_radius() {
        let mut map = event_map();
        map.fiches.insert(Fiche::new(13, 3, 1, GpsPoint::new(50.900, 4.4008), "A3"));
        let fence = Geofence::new(&map, GeofenceConfig::default());

        let (fiche, distance) = fence.nearest_fiche(&GpsPoint::new(50.900, 4.4006)).unwrap();
        assert_eq!(fiche.id, 13);
        assert!(distance < 20.0);
        assert!(fence.nearest_fiche(&GpsPoint::new(50.900, 4.410)).is_none());
    }

    #[test]
    fn test_forbidden_area_beats_route() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        assert_eq!(fence.locate(&GpsPoint::new(50.900, 4.410)), Some(Zone::ForbiddenArea(8)));
    }

    #[test]
    fn test_route_radius() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        // ~33m north of the route, far from both checkpoints
        assert_eq!(fence.locate(&GpsPoint::new(50.9003, 4.405)), Some(Zone::Tocht(1)));
        // ~111m north of the route
        assert_eq!(fence.locate(&GpsPoint::new(50.9010, 4.405)), None);
    }

    #[test]
    fn test_custom_radius() {
        let map = event_map();
        let config = GeofenceConfig { tocht_radius: 150.0, ..GeofenceConfig::default() };
        let fence = Geofence::new(&map, config);
        assert_eq!(fence.config().tocht_radius, 150.0);
        assert_eq!(fence.locate(&GpsPoint::new(50.9010, 4.405)), Some(Zone::Tocht(1)));
    }

    #[test]
    fn test_invalid_point() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        assert_eq!(fence.locate(&GpsPoint::new(f64::NAN, 4.4)), None);
    }

    #[test]
    fn test_annotate_unresolved_tracker() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        let fix = TrackerFix::new(
            Utc.with_ymd_and_hms(2024, 7, 20, 14, 0, 0).unwrap(),
            GpsPoint::new(50.9003, 4.405),
        );
        let tracker = Tracker { id: 4, last_fix: Some(fix), ..Tracker::default() };

        let annotated = fence.annotate(&tracker);
        assert_eq!(annotated.tocht, Some(1));
        assert_eq!(
            describe_position(&annotated, &map).to_string(),
            "Route A (between A1 and A2)"
        );
    }

    #[test]
    fn test_annotate_keeps_backend_zone() {
        let map = event_map();
        let fence = Geofence::new(&map, GeofenceConfig::default());
        let fix = TrackerFix::new(
            Utc.with_ymd_and_hms(2024, 7, 20, 14, 0, 0).unwrap(),
            GpsPoint::new(50.9003, 4.405),
        );
        let tracker = Tracker { id: 4, last_fix: Some(fix), weide: Some(5), ..Tracker::default() };
        assert_eq!(fence.annotate(&tracker), tracker);

        let no_fix = Tracker { id: 5, ..Tracker::default() };
        assert_eq!(fence.annotate(&no_fix), no_fix);
    }
}
