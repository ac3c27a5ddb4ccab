//! # Transit Statistics
//!
//! Average checkpoint and route transit times per walking direction, and how
//! far each team deviates from them.
//!
//! ## Algorithm
//!
//! 1. Order the checkpoints into a [`Course`]
//! 2. Per team, walk its logs by arrival time, visiting each checkpoint once
//! 3. A fiche duration runs from leaving a checkpoint to arriving at the next
//!    one in the team's direction; Blue durations are booked on the checkpoint
//!    they arrive at so both directions measure the same stretch
//! 4. A tocht duration runs from leaving the tocht's entry checkpoint to
//!    arriving at its exit checkpoint
//! 5. Averages per checkpoint/tocht and direction, then per-team deviations
//!    against those averages
//!
//! All averages and deviations are whole seconds, rounded half to even.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::checkpoints::Course;
use crate::model::{CheckpointLog, Direction, Entities, FicheId, Team, TeamId, TochtId};

/// Average transit time of one checkpoint or tocht in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SingleStat {
    /// Whole seconds; `None` when no team contributed
    pub average: Option<i64>,
    pub nb_teams: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectionStats {
    pub red: SingleStat,
    pub blue: SingleStat,
}

impl DirectionStats {
    pub fn get(&self, direction: Direction) -> &SingleStat {
        match direction {
            Direction::Red => &self.red,
            Direction::Blue => &self.blue,
        }
    }
}

/// Measured durations of one team and its deviation from the averages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamStat {
    /// Seconds per checkpoint
    pub fiches: HashMap<FicheId, f64>,
    /// Seconds per tocht
    pub tochten: HashMap<TochtId, f64>,
    /// Mean of (duration - average) over `fiches`, whole seconds
    pub avg_fiche_deviation: Option<i64>,
    /// Mean of (duration - average) over `tochten`, whole seconds
    pub avg_tocht_deviation: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stats {
    pub fiches: HashMap<FicheId, DirectionStats>,
    pub tochten: HashMap<TochtId, DirectionStats>,
    pub teams: HashMap<TeamId, TeamStat>,
}

impl Stats {
    pub fn fiche_average(&self, fiche: FicheId, direction: Direction) -> Option<i64> {
        self.fiches.get(&fiche)?.get(direction).average
    }

    pub fn tocht_average(&self, tocht: TochtId, direction: Direction) -> Option<i64> {
        self.tochten.get(&tocht)?.get(direction).average
    }

    pub fn team(&self, team: TeamId) -> Option<&TeamStat> {
        self.teams.get(&team)
    }
}

/// Durations measured for a single team.
#[derive(Debug, Default)]
struct TeamDurations {
    fiches: HashMap<FicheId, f64>,
    tochten: HashMap<TochtId, f64>,
}

/// Compute transit averages and team deviations.
///
/// Every team appears in the result, including teams without logs. Logs of
/// unknown teams or checkpoints outside the course are ignored.
///
/// ```
/// use linker_engine::{calculate_stats, CheckpointLog, Course, Direction, Entities, Fiche, GpsPoint, Team, Tocht};
/// use chrono::{TimeZone, Utc};
/// use geo::LineString;
///
/// let tochten: Entities<Tocht> = vec![Tocht {
///     id: 1, identifier: "A".into(), order: Some(1), route: LineString::new(vec![]), is_alternative: false,
/// }].into_iter().collect();
/// let fiches: Entities<Fiche> = vec![
///     Fiche::new(1, 1, 1, GpsPoint::new(50.90, 4.40), "A1"),
///     Fiche::new(2, 2, 1, GpsPoint::new(50.91, 4.40), "A2"),
/// ].into_iter().collect();
/// let teams: Entities<Team> = vec![Team {
///     id: 1, direction: Direction::Red, number: 1, name: "De Vossen".into(), tracker: None,
/// }].into_iter().collect();
///
/// let t = |h, m| Utc.with_ymd_and_hms(2024, 7, 20, h, m, 0).unwrap();
/// let logs = vec![
///     CheckpointLog { id: 1, team: 1, fiche: 1, arrived: t(10, 0), left: Some(t(10, 5)) },
///     CheckpointLog { id: 2, team: 1, fiche: 2, arrived: t(10, 35), left: Some(t(10, 40)) },
/// ];
///
/// let stats = calculate_stats(&teams, &logs, &Course::new(&fiches, &tochten));
/// assert_eq!(stats.fiche_average(1, Direction::Red), Some(1800));
/// assert_eq!(stats.team(1).unwrap().avg_fiche_deviation, Some(0));
/// ```
pub fn calculate_stats(teams: &Entities<Team>, logs: &[CheckpointLog], course: &Course) -> Stats {
    let start = std::time::Instant::now();
    let by_team = logs_by_team(teams, logs);

    let durations: Vec<(&Team, TeamDurations)> = teams
        .iter()
        .map(|team| {
            let team_logs = by_team.get(&team.id).map(Vec::as_slice).unwrap_or(&[]);
            (team, team_durations(team, team_logs, course))
        })
        .collect();

    let stats = aggregate(durations, course);
    info!(
        "[Stats] {} teams, {} logs, {} checkpoints in {}ms",
        teams.len(),
        logs.len(),
        course.len(),
        start.elapsed().as_millis()
    );
    stats
}

/// [`calculate_stats`] with the per-team walk spread over the rayon pool.
#[cfg(feature = "parallel")]
pub fn calculate_stats_parallel(teams: &Entities<Team>, logs: &[CheckpointLog], course: &Course) -> Stats {
    use rayon::prelude::*;

    let start = std::time::Instant::now();
    let by_team = logs_by_team(teams, logs);

    let team_list: Vec<&Team> = teams.iter().collect();
    let durations: Vec<(&Team, TeamDurations)> = team_list
        .into_par_iter()
        .map(|team| {
            let team_logs = by_team.get(&team.id).map(Vec::as_slice).unwrap_or(&[]);
            (team, team_durations(team, team_logs, course))
        })
        .collect();

    let stats = aggregate(durations, course);
    info!(
        "[Stats] {} teams, {} logs, {} checkpoints in {}ms (parallel)",
        teams.len(),
        logs.len(),
        course.len(),
        start.elapsed().as_millis()
    );
    stats
}

/// Group logs per known team, each group sorted by arrival.
fn logs_by_team<'a>(
    teams: &Entities<Team>,
    logs: &'a [CheckpointLog],
) -> HashMap<TeamId, Vec<&'a CheckpointLog>> {
    let mut by_team: HashMap<TeamId, Vec<&CheckpointLog>> = HashMap::new();
    for log in logs {
        if teams.contains(log.team) {
            by_team.entry(log.team).or_default().push(log);
        } else {
            debug!("[Stats] log {} belongs to unknown team {}", log.id, log.team);
        }
    }
    for team_logs in by_team.values_mut() {
        team_logs.sort_by_key(|log| log.arrived);
    }
    by_team
}

fn team_durations(team: &Team, logs: &[&CheckpointLog], course: &Course) -> TeamDurations {
    let mut durations = TeamDurations::default();
    let mut done: HashSet<FicheId> = HashSet::new();

    for (index, current) in logs.iter().enumerate() {
        if done.contains(&current.fiche) {
            continue;
        }
        let Some(left) = current.left else {
            debug!("[Stats] team {} log {} has no departure, skipping", team.id, current.id);
            continue;
        };
        let Some(expected) = course.expected_next(current.fiche, team.direction) else {
            debug!(
                "[Stats] team {} log {} is at fiche {} outside the course",
                team.id, current.id, current.fiche
            );
            continue;
        };

        let later = &logs[index..];
        let seconds_until = |fiche: FicheId| {
            later
                .iter()
                .find(|log| log.fiche == fiche)
                .map(|log| seconds_between(left, log.arrived))
        };

        if let Some(seconds) = seconds_until(expected) {
            let booked_on = match team.direction {
                Direction::Red => current.fiche,
                Direction::Blue => expected,
            };
            durations.fiches.insert(booked_on, seconds);
        }

        if let Some((tocht, exit)) = course.tocht_starting_at(current.fiche, team.direction) {
            if let Some(seconds) = seconds_until(exit) {
                durations.tochten.insert(tocht, seconds);
            }
        }

        done.insert(current.fiche);
    }

    durations
}

/// Fractional seconds from `from` to `to`, to the microsecond.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

fn aggregate(durations: Vec<(&Team, TeamDurations)>, course: &Course) -> Stats {
    let mut fiche_samples: HashMap<FicheId, [Vec<f64>; 2]> = course
        .sequence()
        .iter()
        .map(|fiche| (*fiche, [Vec::new(), Vec::new()]))
        .collect();
    let mut tocht_samples: HashMap<TochtId, [Vec<f64>; 2]> = course
        .tochten()
        .map(|(tocht, _)| (tocht, [Vec::new(), Vec::new()]))
        .collect();

    for (team, team_durations) in &durations {
        let slot = direction_slot(team.direction);
        for (fiche, seconds) in &team_durations.fiches {
            if let Some(samples) = fiche_samples.get_mut(fiche) {
                samples[slot].push(*seconds);
            }
        }
        for (tocht, seconds) in &team_durations.tochten {
            if let Some(samples) = tocht_samples.get_mut(tocht) {
                samples[slot].push(*seconds);
            }
        }
    }

    let fiches: HashMap<FicheId, DirectionStats> = fiche_samples
        .into_iter()
        .map(|(fiche, samples)| (fiche, direction_stats(&samples)))
        .collect();
    let tochten: HashMap<TochtId, DirectionStats> = tocht_samples
        .into_iter()
        .map(|(tocht, samples)| (tocht, direction_stats(&samples)))
        .collect();

    let teams = durations
        .into_iter()
        .map(|(team, team_durations)| {
            let avg_fiche_deviation =
                average_deviation(&team_durations.fiches, &fiches, team.direction);
            let avg_tocht_deviation =
                average_deviation(&team_durations.tochten, &tochten, team.direction);
            let stat = TeamStat {
                fiches: team_durations.fiches,
                tochten: team_durations.tochten,
                avg_fiche_deviation,
                avg_tocht_deviation,
            };
            (team.id, stat)
        })
        .collect();

    Stats { fiches, tochten, teams }
}

fn direction_slot(direction: Direction) -> usize {
    match direction {
        Direction::Red => 0,
        Direction::Blue => 1,
    }
}

fn direction_stats(samples: &[Vec<f64>; 2]) -> DirectionStats {
    let single = |values: &Vec<f64>| SingleStat {
        average: rounded_mean(values.iter().copied()),
        nb_teams: values.len() as u32,
    };
    DirectionStats { red: single(&samples[0]), blue: single(&samples[1]) }
}

fn average_deviation(
    durations: &HashMap<u32, f64>,
    averages: &HashMap<u32, DirectionStats>,
    direction: Direction,
) -> Option<i64> {
    let deviations = durations.iter().filter_map(|(id, seconds)| {
        let average = averages.get(id)?.get(direction).average?;
        Some(seconds - average as f64)
    });
    rounded_mean(deviations)
}

/// Mean rounded half to even, `None` for no values.
fn rounded_mean(values: impl Iterator<Item = f64>) -> Option<i64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    Some((sum / count as f64).round_ties_even() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fiche, Tocht};
    use crate::GpsPoint;
    use chrono::{DateTime, TimeZone, Utc};
    use geo::LineString;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, hour, minute, 0).unwrap()
    }

    fn tocht(id: u32, identifier: &str, order: u32) -> Tocht {
        Tocht {
            id,
            identifier: identifier.to_string(),
            order: Some(order),
            route: LineString::new(vec![]),
            is_alternative: false,
        }
    }

    fn team(id: u32, direction: Direction) -> Team {
        Team { id, direction, number: id, name: format!("Team {}", id), tracker: None }
    }

    fn visit(id: u32, team: u32, fiche: u32, arrived: (u32, u32), left: (u32, u32)) -> CheckpointLog {
        CheckpointLog {
            id,
            team,
            fiche,
            arrived: at(arrived.0, arrived.1),
            left: Some(at(left.0, left.1)),
        }
    }

    /// Tocht A: fiches 1, 2, 3. Tocht B: fiches 4, 5.
    fn course() -> Course {
        let tochten: Entities<Tocht> = vec![tocht(1, "A", 1), tocht(2, "B", 2)].into_iter().collect();
        let fiches: Entities<Fiche> = vec![
            Fiche::new(1, 1, 1, GpsPoint::new(50.90, 4.40), "A1"),
            Fiche::new(2, 2, 1, GpsPoint::new(50.91, 4.40), "A2"),
            Fiche::new(3, 3, 1, GpsPoint::new(50.92, 4.40), "A3"),
            Fiche::new(4, 1, 2, GpsPoint::new(50.93, 4.40), "B1"),
            Fiche::new(5, 2, 2, GpsPoint::new(50.94, 4.40), "B2"),
        ]
        .into_iter()
        .collect();
        Course::new(&fiches, &tochten)
    }

    #[test]
    fn test_red_team_durations() {
        let teams: Entities<Team> = vec![team(1, Direction::Red)].into_iter().collect();
        let logs = vec![
            visit(1, 1, 1, (10, 0), (10, 5)),
            visit(2, 1, 2, (10, 25), (10, 30)),
            visit(3, 1, 3, (11, 0), (11, 10)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());
        let team = stats.team(1).unwrap();

        assert_eq!(team.fiches.get(&1), Some(&1200.0));
        assert_eq!(team.fiches.get(&2), Some(&1800.0));
        // No log at B1 yet
        assert_eq!(team.fiches.get(&3), None);
        // A1 leave 10:05 → A3 arrive 11:00
        assert_eq!(team.tochten.get(&1), Some(&3300.0));

        assert_eq!(stats.fiche_average(1, Direction::Red), Some(1200));
        assert_eq!(stats.fiches[&1].red.nb_teams, 1);
        assert_eq!(stats.fiche_average(1, Direction::Blue), None);
        assert_eq!(stats.fiches[&1].blue.nb_teams, 0);
        assert_eq!(stats.tocht_average(1, Direction::Red), Some(3300));
        assert_eq!(stats.tocht_average(2, Direction::Red), None);
    }

    #[test]
    fn test_sub_millisecond_precision() {
        let teams: Entities<Team> = vec![team(1, Direction::Red)].into_iter().collect();
        let mut second = visit(2, 1, 2, (10, 30), (10, 35));
        second.arrived = at(10, 30) + chrono::Duration::microseconds(500_400);
        let logs = vec![visit(1, 1, 1, (9, 55), (10, 0)), second];

        let stats = calculate_stats(&teams, &logs, &course());
        assert_eq!(stats.team(1).unwrap().fiches.get(&1), Some(&1800.5004));
        // 1800.5004 rounds up; millisecond truncation would give a tie and round to 1800
        assert_eq!(stats.fiche_average(1, Direction::Red), Some(1801));
    }

    #[test]
    fn test_blue_team_books_on_arrival_checkpoint() {
        let teams: Entities<Team> = vec![team(2, Direction::Blue)].into_iter().collect();
        let logs = vec![
            visit(1, 2, 3, (10, 0), (10, 5)),
            visit(2, 2, 2, (10, 20), (10, 25)),
            visit(3, 2, 1, (10, 55), (11, 0)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());
        let team = stats.team(2).unwrap();

        // A3 → A2 is the stretch A2‑A3, booked on A2
        assert_eq!(team.fiches.get(&2), Some(&900.0));
        assert_eq!(team.fiches.get(&1), Some(&1800.0));
        assert_eq!(team.fiches.get(&3), None);
        // Blue enters tocht A at A3 and exits at A1
        assert_eq!(team.tochten.get(&1), Some(&3000.0));
        assert_eq!(stats.fiche_average(2, Direction::Blue), Some(900));
    }

    #[test]
    fn test_course_wraps_for_last_checkpoint() {
        let teams: Entities<Team> = vec![team(1, Direction::Red)].into_iter().collect();
        let logs = vec![
            visit(1, 1, 5, (9, 0), (9, 10)),
            visit(2, 1, 1, (9, 40), (9, 45)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());
        assert_eq!(stats.team(1).unwrap().fiches.get(&5), Some(&1800.0));
    }

    #[test]
    fn test_first_visit_counts_and_missing_departure_is_skipped() {
        let teams: Entities<Team> = vec![team(1, Direction::Red)].into_iter().collect();
        let logs = vec![
            CheckpointLog { id: 1, team: 1, fiche: 1, arrived: at(10, 0), left: None },
            visit(2, 1, 2, (10, 20), (10, 25)),
            visit(3, 1, 3, (10, 45), (10, 50)),
            // Second pass over A2 is ignored
            visit(4, 1, 2, (12, 0), (12, 5)),
            visit(5, 1, 3, (12, 10), (12, 15)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());
        let team = stats.team(1).unwrap();
        assert_eq!(team.fiches.get(&1), None);
        assert_eq!(team.fiches.get(&2), Some(&1200.0));
        assert!(team.tochten.is_empty());
    }

    #[test]
    fn test_logs_are_sorted_by_arrival() {
        let teams: Entities<Team> = vec![team(1, Direction::Red)].into_iter().collect();
        let logs = vec![
            visit(2, 1, 2, (10, 25), (10, 30)),
            visit(1, 1, 1, (10, 0), (10, 5)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());
        assert_eq!(stats.team(1).unwrap().fiches.get(&1), Some(&1200.0));
    }

    #[test]
    fn test_averages_and_deviations() {
        let teams: Entities<Team> = vec![
            team(1, Direction::Red),
            team(2, Direction::Red),
            team(3, Direction::Red),
        ]
        .into_iter()
        .collect();
        let logs = vec![
            // 20, 30 and 31 minutes from A1 to A2
            visit(1, 1, 1, (10, 0), (10, 0)),
            visit(2, 1, 2, (10, 20), (10, 20)),
            visit(3, 2, 1, (10, 0), (10, 0)),
            visit(4, 2, 2, (10, 30), (10, 30)),
            visit(5, 3, 1, (10, 0), (10, 0)),
            visit(6, 3, 2, (10, 31), (10, 31)),
        ];
        let stats = calculate_stats(&teams, &logs, &course());

        // (1200 + 1800 + 1860) / 3 = 1620
        assert_eq!(stats.fiche_average(1, Direction::Red), Some(1620));
        assert_eq!(stats.fiches[&1].red.nb_teams, 3);
        assert_eq!(stats.team(1).unwrap().avg_fiche_deviation, Some(-420));
        assert_eq!(stats.team(2).unwrap().avg_fiche_deviation, Some(180));
        assert_eq!(stats.team(3).unwrap().avg_fiche_deviation, Some(240));
        assert_eq!(stats.team(1).unwrap().avg_tocht_deviation, None);
    }

    #[test]
    fn test_team_without_logs_is_listed() {
        let teams: Entities<Team> = vec![team(1, Direction::Red), team(9, Direction::Blue)]
            .into_iter()
            .collect();
        let logs = vec![visit(1, 42, 1, (10, 0), (10, 5))];
        let stats = calculate_stats(&teams, &logs, &course());
        let idle = stats.team(9).unwrap();
        assert!(idle.fiches.is_empty());
        assert_eq!(idle.avg_fiche_deviation, None);
        assert!(!stats.teams.contains_key(&42));
        assert_eq!(stats.fiches.len(), 5);
        assert_eq!(stats.tochten.len(), 2);
    }

    #[test]
    fn test_rounded_mean_ties_to_even() {
        assert_eq!(rounded_mean([1.0, 2.0].into_iter()), Some(2));
        assert_eq!(rounded_mean([2.0, 3.0].into_iter()), Some(2));
        assert_eq!(rounded_mean([-0.5].into_iter()), Some(0));
        assert_eq!(rounded_mean([-1.5].into_iter()), Some(-2));
        assert_eq!(rounded_mean(std::iter::empty()), None);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let teams: Entities<Team> = vec![team(1, Direction::Red), team(2, Direction::Blue)]
            .into_iter()
            .collect();
        let logs = vec![
            visit(1, 1, 1, (10, 0), (10, 5)),
            visit(2, 1, 2, (10, 25), (10, 30)),
            visit(3, 2, 3, (10, 0), (10, 5)),
            visit(4, 2, 2, (10, 20), (10, 25)),
        ];
        let course = course();
        assert_eq!(
            calculate_stats(&teams, &logs, &course),
            calculate_stats_parallel(&teams, &logs, &course)
        );
    }
}
