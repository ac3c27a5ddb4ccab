//! Checkpoint sequence and checkpoint log lookups.
//!
//! The event is one cycle of checkpoints: every tocht's fiches in order, the
//! tochten themselves in order, and the last fiche of the last tocht leading
//! back to the first fiche of the first tocht. Red teams walk the cycle
//! forwards, Blue teams backwards.

use std::collections::HashMap;

use log::warn;

use crate::model::{CheckpointLog, Direction, Entities, EventMap, Fiche, FicheId, TeamId, Tocht, TochtId};

/// Find the earliest-arrived log of `team` at `fiche`.
///
/// Teams can be registered at the same checkpoint more than once; the first
/// arrival is the one that counts. When arrival times are equal the log that
/// comes first in `logs` wins.
///
/// ```
/// use linker_engine::{checkpoint_log, CheckpointLog};
/// use chrono::{TimeZone, Utc};
///
/// let logs = vec![
///     CheckpointLog { id: 1, team: 4, fiche: 2, arrived: Utc.with_ymd_and_hms(2024, 7, 20, 15, 30, 0).unwrap(), left: None },
///     CheckpointLog { id: 2, team: 4, fiche: 2, arrived: Utc.with_ymd_and_hms(2024, 7, 20, 14, 10, 0).unwrap(), left: None },
/// ];
///
/// assert_eq!(checkpoint_log(4, 2, &logs).map(|l| l.id), Some(2));
/// assert!(checkpoint_log(4, 3, &logs).is_none());
/// ```
pub fn checkpoint_log(team: TeamId, fiche: FicheId, logs: &[CheckpointLog]) -> Option<&CheckpointLog> {
    logs.iter()
        .filter(|log| log.team == team && log.fiche == fiche)
        .min_by_key(|log| log.arrived)
}

/// The most recently arrived log of `team`, at any checkpoint.
pub fn last_checkpoint_log(team: TeamId, logs: &[CheckpointLog]) -> Option<&CheckpointLog> {
    logs.iter()
        .filter(|log| log.team == team)
        .max_by_key(|log| log.arrived)
}

/// The cyclic checkpoint sequence of an event.
#[derive(Debug, Clone, Default)]
pub struct Course {
    /// Fiche ids ordered by (tocht order, fiche order)
    sequence: Vec<FicheId>,
    position: HashMap<FicheId, usize>,
    /// Per tocht, its fiches in order
    tochten: Vec<(TochtId, Vec<FicheId>)>,
    tocht_of: HashMap<FicheId, TochtId>,
}

impl Course {
    /// Build the sequence from fiches and tochten.
    ///
    /// Tochten without an order come after the ordered ones. Fiches whose
    /// tocht is unknown are left out.
    pub fn new(fiches: &Entities<Fiche>, tochten: &Entities<Tocht>) -> Self {
        let mut ordered: Vec<(&Tocht, &Fiche)> = Vec::with_capacity(fiches.len());
        for fiche in fiches.iter() {
            match tochten.get(fiche.tocht) {
                Some(tocht) => ordered.push((tocht, fiche)),
                None => warn!(
                    "[Course] fiche {} refers to unknown tocht {}, skipping",
                    fiche.id, fiche.tocht
                ),
            }
        }

        ordered.sort_by_key(|(tocht, fiche)| {
            (tocht.order.is_none(), tocht.order, tocht.id, fiche.order, fiche.id)
        });

        let sequence: Vec<FicheId> = ordered.iter().map(|(_, fiche)| fiche.id).collect();
        let position = sequence.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut per_tocht: Vec<(TochtId, Vec<FicheId>)> = Vec::new();
        for (tocht, fiche) in &ordered {
            match per_tocht.last_mut() {
                Some((id, ids)) if *id == tocht.id => ids.push(fiche.id),
                _ => per_tocht.push((tocht.id, vec![fiche.id])),
            }
        }

        let tocht_of = ordered.iter().map(|(tocht, fiche)| (fiche.id, tocht.id)).collect();

        Self { sequence, position, tochten: per_tocht, tocht_of }
    }

    pub fn from_map(map: &EventMap) -> Self {
        Self::new(&map.fiches, &map.tochten)
    }

    pub fn sequence(&self) -> &[FicheId] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn contains(&self, fiche: FicheId) -> bool {
        self.position.contains_key(&fiche)
    }

    /// The fiche after `fiche`, wrapping from the last to the first.
    pub fn next_fiche(&self, fiche: FicheId) -> Option<FicheId> {
        let index = *self.position.get(&fiche)?;
        let next = (index + 1) % self.sequence.len();
        Some(self.sequence[next])
    }

    /// The fiche before `fiche`, wrapping from the first to the last.
    pub fn previous_fiche(&self, fiche: FicheId) -> Option<FicheId> {
        let index = *self.position.get(&fiche)?;
        let previous = (index + self.sequence.len() - 1) % self.sequence.len();
        Some(self.sequence[previous])
    }

    /// The fiche a team walking in `direction` should reach after `fiche`.
    pub fn expected_next(&self, fiche: FicheId, direction: Direction) -> Option<FicheId> {
        match direction {
            Direction::Red => self.next_fiche(fiche),
            Direction::Blue => self.previous_fiche(fiche),
        }
    }

    /// Tochten in sequence order with their fiches.
    pub fn tochten(&self) -> impl Iterator<Item = (TochtId, &[FicheId])> {
        self.tochten.iter().map(|(id, fiches)| (*id, fiches.as_slice()))
    }

    pub fn tocht_fiches(&self, tocht: TochtId) -> Option<&[FicheId]> {
        self.tochten
            .iter()
            .find(|(id, _)| *id == tocht)
            .map(|(_, fiches)| fiches.as_slice())
    }

    pub fn tocht_of(&self, fiche: FicheId) -> Option<TochtId> {
        self.tocht_of.get(&fiche).copied()
    }

    /// The tocht a team walking in `direction` starts when it leaves `fiche`,
    /// together with the fiche that ends it. Red starts a tocht at its first
    /// fiche, Blue at its last.
    pub fn tocht_starting_at(&self, fiche: FicheId, direction: Direction) -> Option<(TochtId, FicheId)> {
        let tocht = self.tocht_of(fiche)?;
        let fiches = self.tocht_fiches(tocht)?;
        let (first, last) = (*fiches.first()?, *fiches.last()?);
        match direction {
            Direction::Red if fiche == first => Some((tocht, last)),
            Direction::Blue if fiche == last => Some((tocht, first)),
            _ => None,
        }
    }

    /// Column label for the segment starting at `fiche`: "A1‑A2".
    ///
    /// Uses a non-breaking hyphen (U+2011) so the label never wraps.
    pub fn segment_label(&self, fiche: FicheId, fiches: &Entities<Fiche>) -> Option<String> {
        let from = fiches.get(fiche)?;
        let to = fiches.get(self.next_fiche(fiche)?)?;
        Some(format!("{}\u{2011}{}", from.display_name, to.display_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;
    use chrono::{DateTime, TimeZone, Utc};
    use geo::LineString;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, hour, minute, 0).unwrap()
    }

    fn log(id: u32, team: u32, fiche: u32, arrived: DateTime<Utc>) -> CheckpointLog {
        CheckpointLog { id, team, fiche, arrived, left: None }
    }

    fn tocht(id: u32, identifier: &str, order: Option<u32>) -> Tocht {
        Tocht {
            id,
            identifier: identifier.to_string(),
            order,
            route: LineString::new(vec![]),
            is_alternative: false,
        }
    }

    fn fiche(id: u32, order: u32, tocht: u32, name: &str) -> Fiche {
        Fiche::new(id, order, tocht, GpsPoint::new(50.9, 4.4), name)
    }

    /// Tocht B (order 2) is listed before A (order 1), fiches shuffled.
    fn sample_course() -> (Entities<Fiche>, Entities<Tocht>, Course) {
        let tochten: Entities<Tocht> = vec![tocht(2, "B", Some(2)), tocht(1, "A", Some(1))]
            .into_iter()
            .collect();
        let fiches: Entities<Fiche> = vec![
            fiche(21, 1, 2, "B1"),
            fiche(12, 2, 1, "A2"),
            fiche(11, 1, 1, "A1"),
            fiche(22, 2, 2, "B2"),
            fiche(13, 3, 1, "A3"),
        ]
        .into_iter()
        .collect();
        let course = Course::new(&fiches, &tochten);
        (fiches, tochten, course)
    }

    #[test]
    fn test_checkpoint_log_earliest_arrival_wins() {
        let logs = vec![
            log(1, 7, 3, at(15, 0)),
            log(2, 7, 3, at(14, 0)),
            log(3, 8, 3, at(13, 0)),
        ];
        assert_eq!(checkpoint_log(7, 3, &logs).unwrap().id, 2);
        assert_eq!(checkpoint_log(8, 3, &logs).unwrap().id, 3);
        assert!(checkpoint_log(9, 3, &logs).is_none());
    }

    #[test]
    fn test_checkpoint_log_equal_arrival_keeps_first() {
        let logs = vec![log(1, 7, 3, at(14, 0)), log(2, 7, 3, at(14, 0))];
        assert_eq!(checkpoint_log(7, 3, &logs).unwrap().id, 1);
    }

    #[test]
    fn test_last_checkpoint_log() {
        let logs = vec![
            log(1, 7, 3, at(14, 0)),
            log(2, 7, 4, at(15, 30)),
            log(3, 7, 5, at(15, 0)),
            log(4, 8, 6, at(16, 0)),
        ];
        assert_eq!(last_checkpoint_log(7, &logs).unwrap().id, 2);
        assert!(last_checkpoint_log(9, &logs).is_none());
    }

    #[test]
    fn test_course_sequence_follows_tocht_then_fiche_order() {
        let (_, _, course) = sample_course();
        assert_eq!(course.sequence(), &[11, 12, 13, 21, 22]);
        assert_eq!(course.len(), 5);
    }

    #[test]
    fn test_unordered_tochten_come_last() {
        let tochten: Entities<Tocht> = vec![tocht(9, "Z", None), tocht(1, "A", Some(1))]
            .into_iter()
            .collect();
        let fiches: Entities<Fiche> = vec![fiche(91, 1, 9, "Z1"), fiche(11, 1, 1, "A1")]
            .into_iter()
            .collect();
        let course = Course::new(&fiches, &tochten);
        assert_eq!(course.sequence(), &[11, 91]);
    }

    #[test]
    fn test_fiche_with_unknown_tocht_is_skipped() {
        let tochten: Entities<Tocht> = vec![tocht(1, "A", Some(1))].into_iter().collect();
        let fiches: Entities<Fiche> = vec![fiche(11, 1, 1, "A1"), fiche(55, 1, 5, "X1")]
            .into_iter()
            .collect();
        let course = Course::new(&fiches, &tochten);
        assert_eq!(course.sequence(), &[11]);
        assert!(!course.contains(55));
        assert_eq!(course.next_fiche(55), None);
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let (_, _, course) = sample_course();
        assert_eq!(course.next_fiche(12), Some(13));
        assert_eq!(course.next_fiche(13), Some(21));
        assert_eq!(course.next_fiche(22), Some(11));
        assert_eq!(course.previous_fiche(11), Some(22));
        assert_eq!(course.previous_fiche(21), Some(13));

        assert_eq!(course.expected_next(13, Direction::Red), Some(21));
        assert_eq!(course.expected_next(13, Direction::Blue), Some(12));
    }

    #[test]
    fn test_tocht_boundaries() {
        let (_, _, course) = sample_course();
        assert_eq!(course.tocht_fiches(1), Some(&[11, 12, 13][..]));
        assert_eq!(course.tocht_of(22), Some(2));

        assert_eq!(course.tocht_starting_at(11, Direction::Red), Some((1, 13)));
        assert_eq!(course.tocht_starting_at(13, Direction::Red), None);
        assert_eq!(course.tocht_starting_at(13, Direction::Blue), Some((1, 11)));
        assert_eq!(course.tocht_starting_at(12, Direction::Blue), None);

        let ids: Vec<TochtId> = course.tochten().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_segment_label() {
        let (fiches, _, course) = sample_course();
        assert_eq!(course.segment_label(12, &fiches).unwrap(), "A2\u{2011}A3");
        assert_eq!(course.segment_label(22, &fiches).unwrap(), "B2\u{2011}A1");
        assert!(course.segment_label(99, &fiches).is_none());
    }
}
