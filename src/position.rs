//! # Position Descriptions
//!
//! Turns a tracker's resolved zone into a place a person can read off a list:
//! "Basis", "Field B", "Checkpoint C3" or, for a tracker walking a route,
//! the two checkpoints it is between.
//!
//! Map data and tracker data are fetched independently and can be briefly
//! inconsistent. A zone referring to an entity that is not in the map
//! degrades to [`PositionDescription::Lost`]; nothing here panics.
//!
//! ## Example
//!
//! ```rust
//! use linker_engine::{describe_position, EventMap, Fiche, GpsPoint, Tocht, Tracker, TrackerFix};
//! use chrono::Utc;
//! use geo::LineString;
//!
//! let mut map = EventMap::default();
//! map.tochten.insert(Tocht {
//!     id: 1,
//!     identifier: "A".to_string(),
//!     order: Some(1),
//!     route: LineString::from(vec![(4.400, 50.900), (4.420, 50.900)]),
//!     is_alternative: false,
//! });
//! map.fiches.insert(Fiche::new(1, 1, 1, GpsPoint::new(50.900, 4.400), "A1"));
//! map.fiches.insert(Fiche::new(2, 2, 1, GpsPoint::new(50.900, 4.410), "A2"));
//! map.fiches.insert(Fiche::new(3, 3, 1, GpsPoint::new(50.900, 4.420), "A3"));
//!
//! let tracker = Tracker {
//!     id: 1,
//!     tocht: Some(1),
//!     last_fix: Some(TrackerFix::new(Utc::now(), GpsPoint::new(50.900, 4.414))),
//!     ..Tracker::default()
//! };
//!
//! let description = describe_position(&tracker, &map);
//! assert_eq!(description.to_string(), "Route A (between A2 and A3)");
//! ```

use std::cmp::Ordering;
use std::fmt;

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::model::{EventMap, Fiche, TochtId, Tracker, Zone};
use crate::GpsPoint;

/// Where a tracker is, in human terms.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionDescription {
    /// At the event base
    Basis,
    /// In a safe field
    Field { name: String },
    /// At a checkpoint
    Checkpoint { name: String },
    /// Inside a forbidden area
    ForbiddenArea { description: String },
    /// Walking a route, between two checkpoints (in route order)
    EnRoute { route: String, first: String, second: String },
    /// No fix, no zone, or the zone could not be resolved against the map
    Lost,
}

impl PositionDescription {
    /// Descriptions that call for attention from the organizers.
    pub fn is_warning(&self) -> bool {
        matches!(self, PositionDescription::ForbiddenArea { .. } | PositionDescription::Lost)
    }
}

impl fmt::Display for PositionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionDescription::Basis => write!(f, "Basis"),
            PositionDescription::Field { name } => write!(f, "Field {}", name),
            PositionDescription::Checkpoint { name } => write!(f, "Checkpoint {}", name),
            PositionDescription::ForbiddenArea { description } => {
                write!(f, "⚠️ Forbidden area: {}", description)
            }
            PositionDescription::EnRoute { route, first, second } => {
                write!(f, "Route {} (between {} and {})", route, first, second)
            }
            PositionDescription::Lost => write!(f, "⚠️ Lost"),
        }
    }
}

/// Describe a tracker's position from its backend-resolved zone.
pub fn describe_position(tracker: &Tracker, map: &EventMap) -> PositionDescription {
    let zone = tracker.zone();
    let description = describe_zone(zone, tracker.last_point(), map);
    if description == PositionDescription::Lost {
        debug!(
            "[Position] tracker {} is lost (fix: {}, zone: {:?})",
            tracker.id,
            tracker.last_fix.is_some(),
            zone
        );
    }
    description
}

/// Describe a zone computed elsewhere (e.g. by the [`Geofence`](crate::Geofence)).
///
/// `fix` is only needed for [`Zone::Tocht`], to find the surrounding checkpoints.
pub fn describe_zone(zone: Option<Zone>, fix: Option<GpsPoint>, map: &EventMap) -> PositionDescription {
    resolve(zone, fix, map).unwrap_or(PositionDescription::Lost)
}

fn resolve(zone: Option<Zone>, fix: Option<GpsPoint>, map: &EventMap) -> Option<PositionDescription> {
    let description = match zone? {
        Zone::Basis(_) => PositionDescription::Basis,
        Zone::Weide(id) => PositionDescription::Field {
            name: map.weides.get(id)?.display_name.clone(),
        },
        Zone::Fiche(id) => PositionDescription::Checkpoint {
            name: map.fiches.get(id)?.display_name.clone(),
        },
        Zone::ForbiddenArea(id) => PositionDescription::ForbiddenArea {
            description: map.forbidden_areas.get(id)?.description.clone(),
        },
        Zone::Tocht(id) => {
            let tocht = map.tochten.get(id)?;
            let (first, second) = surrounding_fiches(&fix?, id, map)?;
            PositionDescription::EnRoute {
                route: tocht.identifier.clone(),
                first: first.display_name.clone(),
                second: second.display_name.clone(),
            }
        }
    };
    Some(description)
}

/// The two checkpoints nearest to `point`, ordered along the route.
///
/// Candidates are the checkpoints of the tocht. A tocht with fewer than two
/// checkpoints is bracketed by the checkpoints of its neighbours, so all
/// checkpoints become candidates.
pub fn surrounding_fiches<'a>(
    point: &GpsPoint,
    tocht: TochtId,
    map: &'a EventMap,
) -> Option<(&'a Fiche, &'a Fiche)> {
    let on_route: Vec<&Fiche> = map.fiches_on(tocht).collect();
    let candidates = if on_route.len() >= 2 {
        on_route
    } else {
        map.fiches.iter().collect()
    };

    let mut ranked: Vec<(f64, &Fiche)> = candidates
        .into_iter()
        .map(|fiche| (haversine_distance(point, &fiche.point), fiche))
        .collect();
    ranked.sort_by(|a, b| compare_ranked(a, b));

    let mut first = ranked.first()?.1;
    let mut second = ranked.get(1)?.1;

    if (first.tocht == second.tocht && first.order > second.order) || first.tocht > second.tocht {
        std::mem::swap(&mut first, &mut second);
    }

    Some((first, second))
}

// Equal distances fall back to route order
fn compare_ranked(a: &(f64, &Fiche), b: &(f64, &Fiche)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| a.1.tocht.cmp(&b.1.tocht))
        .then_with(|| a.1.order.cmp(&b.1.order))
}
