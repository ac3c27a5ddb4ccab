//! Event entities as supplied by the tracking backend.
//!
//! All entities are read-only snapshots. Collections are kept in an
//! [`Entities`] map that preserves the order the backend sent them in.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use geo::{LineString, MultiPolygon, Polygon};
use log::debug;

use crate::{Bounds, GpsPoint};

pub type TrackerId = u32;
pub type TeamId = u32;
pub type FicheId = u32;
pub type TochtId = u32;
pub type WeideId = u32;
pub type BasisId = u32;
pub type ForbiddenAreaId = u32;
pub type CheckpointLogId = u32;

// ============================================================================
// Entity Collections
// ============================================================================

/// Anything addressable by a numeric id.
pub trait Entity {
    fn id(&self) -> u32;
}

/// Ordered id → entity collection.
///
/// Iteration follows insertion order; lookups are O(1). Re-inserting an
/// existing id replaces the entity in place.
///
/// ```
/// use linker_engine::{Entities, Basis, GpsPoint};
///
/// let bases: Entities<Basis> = vec![
///     Basis { id: 3, point: GpsPoint::new(50.9, 4.4) },
///     Basis { id: 1, point: GpsPoint::new(50.8, 4.3) },
/// ].into_iter().collect();
///
/// assert_eq!(bases.ids(), &[3, 1]);
/// assert!(bases.get(1).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Entities<T> {
    ids: Vec<u32>,
    entities: HashMap<u32, T>,
}

impl<T: Entity> Entities<T> {
    pub fn new() -> Self {
        Self { ids: Vec::new(), entities: HashMap::new() }
    }

    /// Insert an entity, returning the one it replaced.
    pub fn insert(&mut self, entity: T) -> Option<T> {
        let id = entity.id();
        let previous = self.entities.insert(id, entity);
        if previous.is_none() {
            self.ids.push(id);
        }
        previous
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Iterate entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ids.iter().filter_map(move |id| self.entities.get(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<T: Entity> Default for Entities<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> FromIterator<T> for Entities<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut entities = Self::new();
        for entity in iter {
            entities.insert(entity);
        }
        entities
    }
}

macro_rules! impl_entity {
    ($($ty:ty),* $(,)?) => {
        $(impl Entity for $ty {
            fn id(&self) -> u32 {
                self.id
            }
        })*
    };
}

impl_entity!(Tracker, Team, Fiche, Tocht, Weide, Basis, ForbiddenArea, CheckpointLog);

// ============================================================================
// Teams
// ============================================================================

/// Walking direction of a team cohort. Red walks the checkpoint sequence
/// forwards, Blue walks it backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Red,
    Blue,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Red, Direction::Blue];

    /// Single-letter code used on the wire ("R" / "B").
    pub fn code(&self) -> &'static str {
        match self {
            Direction::Red => "R",
            Direction::Blue => "B",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Direction::Red),
            "B" => Some(Direction::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: TeamId,
    pub direction: Direction,
    pub number: u32,
    pub name: String,
    pub tracker: Option<TrackerId>,
}

/// Role of an organization member carrying a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Agenda,
    Coordinatie,
    RodeKruis,
    HandigeHarry,
    Weide,
}

impl MemberType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Agenda" => Some(MemberType::Agenda),
            "Coordinatie" => Some(MemberType::Coordinatie),
            "Rode Kruis" => Some(MemberType::RodeKruis),
            "Handige Harry" => Some(MemberType::HandigeHarry),
            "Weide" => Some(MemberType::Weide),
            _ => None,
        }
    }
}

// ============================================================================
// Map Entities
// ============================================================================

/// A checkpoint on a tocht.
#[derive(Debug, Clone, PartialEq)]
pub struct Fiche {
    pub id: FicheId,
    /// Position within its tocht, starting at 1
    pub order: u32,
    pub tocht: TochtId,
    pub point: GpsPoint,
    pub display_name: String,
}

impl Fiche {
    pub fn new(
        id: FicheId,
        order: u32,
        tocht: TochtId,
        point: GpsPoint,
        display_name: impl Into<String>,
    ) -> Self {
        Self { id, order, tocht, point, display_name: display_name.into() }
    }
}

/// A route segment between two fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Tocht {
    pub id: TochtId,
    pub identifier: String,
    /// Position in the event's route sequence; unordered tochten sort last
    pub order: Option<u32>,
    pub route: LineString<f64>,
    /// Detours and variants that are not part of the main circuit
    pub is_alternative: bool,
}

/// A safe holding field.
#[derive(Debug, Clone, PartialEq)]
pub struct Weide {
    pub id: WeideId,
    pub tocht: Option<TochtId>,
    pub polygon: Polygon<f64>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Basis {
    pub id: BasisId,
    pub point: GpsPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForbiddenArea {
    pub id: ForbiddenAreaId,
    pub description: String,
    pub area: MultiPolygon<f64>,
}

/// The reference geography of an event.
#[derive(Debug, Clone, Default)]
pub struct EventMap {
    pub fiches: Entities<Fiche>,
    pub tochten: Entities<Tocht>,
    pub weides: Entities<Weide>,
    pub basis: Option<Basis>,
    pub forbidden_areas: Entities<ForbiddenArea>,
}

impl EventMap {
    /// Checkpoints of one tocht, in collection order.
    pub fn fiches_on(&self, tocht: TochtId) -> impl Iterator<Item = &Fiche> {
        self.fiches.iter().filter(move |f| f.tocht == tocht)
    }

    /// Bounding box of all checkpoints, routes and the base.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut points: Vec<GpsPoint> = self.fiches.iter().map(|f| f.point).collect();
        points.extend(
            self.tochten
                .iter()
                .flat_map(|t| t.route.coords().map(|c| GpsPoint::from(*c))),
        );
        points.extend(self.basis.iter().map(|b| b.point));
        Bounds::from_points(&points)
    }
}

// ============================================================================
// Trackers
// ============================================================================

/// A timestamped GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerFix {
    pub gps_datetime: DateTime<Utc>,
    pub point: GpsPoint,
}

impl TrackerFix {
    pub fn new(gps_datetime: DateTime<Utc>, point: GpsPoint) -> Self {
        Self { gps_datetime, point }
    }
}

/// The zone a tracker has been resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Basis(BasisId),
    Weide(WeideId),
    Fiche(FicheId),
    ForbiddenArea(ForbiddenAreaId),
    /// On a route, between checkpoints
    Tocht(TochtId),
}

/// A GPS tracker with its last fix and backend-resolved zone references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tracker {
    pub id: TrackerId,
    pub tracker_code: String,
    /// Optional human-friendly name set by the organisers
    pub tracker_name: Option<String>,
    pub last_fix: Option<TrackerFix>,
    pub basis: Option<BasisId>,
    pub weide: Option<WeideId>,
    pub fiche: Option<FicheId>,
    pub tocht: Option<TochtId>,
    pub forbidden_area: Option<ForbiddenAreaId>,
}

/// Tracker status thresholds.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// A tracker whose last fix is older than this is offline.
    /// Default: 12 minutes
    pub offline_minutes: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { offline_minutes: 12 }
    }
}

impl Tracker {
    /// The single zone this tracker is in.
    ///
    /// The backend evaluates every zone kind independently, so more than one
    /// reference can be set. Precedence is basis, weide, fiche, forbidden
    /// area, tocht.
    pub fn zone(&self) -> Option<Zone> {
        let zones = [
            self.basis.map(Zone::Basis),
            self.weide.map(Zone::Weide),
            self.fiche.map(Zone::Fiche),
            self.forbidden_area.map(Zone::ForbiddenArea),
            self.tocht.map(Zone::Tocht),
        ];
        let mut resolved = zones.into_iter().flatten();
        let zone = resolved.next();
        let others = resolved.count();
        if others > 0 {
            debug!(
                "[Tracker {}] {} extra zone references set, using {:?}",
                self.id, others, zone
            );
        }
        zone
    }

    /// Overwrite all zone references with a single zone.
    pub fn set_zone(&mut self, zone: Option<Zone>) {
        self.basis = None;
        self.weide = None;
        self.fiche = None;
        self.forbidden_area = None;
        self.tocht = None;
        match zone {
            Some(Zone::Basis(id)) => self.basis = Some(id),
            Some(Zone::Weide(id)) => self.weide = Some(id),
            Some(Zone::Fiche(id)) => self.fiche = Some(id),
            Some(Zone::ForbiddenArea(id)) => self.forbidden_area = Some(id),
            Some(Zone::Tocht(id)) => self.tocht = Some(id),
            None => {}
        }
    }

    /// Name to show for the tracker: its name when set, its code otherwise.
    pub fn label(&self) -> &str {
        match self.tracker_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.tracker_code,
        }
    }

    pub fn last_point(&self) -> Option<GpsPoint> {
        self.last_fix.map(|fix| fix.point)
    }

    /// Whether the last fix is recent enough for the tracker to count as online.
    pub fn is_online(&self, now: DateTime<Utc>, config: &TrackerConfig) -> bool {
        match self.last_fix {
            Some(fix) => fix.gps_datetime >= now - Duration::minutes(config.offline_minutes),
            None => false,
        }
    }
}

// ============================================================================
// Checkpoint Logs
// ============================================================================

/// A team's visit to a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointLog {
    pub id: CheckpointLogId,
    pub team: TeamId,
    pub fiche: FicheId,
    pub arrived: DateTime<Utc>,
    pub left: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================
