//! # Checkpoint Tracing
//!
//! Builds checkpoint logs from a team's GPS history.
//!
//! Every fix is matched to the nearest checkpoint within the checkpoint
//! radius of the [`Geofence`]. Consecutive fixes at the same checkpoint form
//! one visit, arriving at the first fix and leaving at the last. A visit that
//! starts at most [`MERGE_WINDOW_MINUTES`] after an earlier log at the same
//! checkpoint was left (or while that log is still open) extends that log
//! instead of creating a new one.
//!
//! Tracing is incremental: only fixes from the arrival of the team's most
//! recent log onwards are considered, so calling it again with a longer
//! history extends the current visit rather than duplicating it.
//!
//! ```
//! use linker_engine::{trace_team, EventMap, Fiche, Geofence, GeofenceConfig, GpsPoint, TrackerFix};
//! use chrono::{TimeZone, Utc};
//!
//! let mut map = EventMap::default();
//! map.fiches.insert(Fiche::new(1, 1, 1, GpsPoint::new(50.900, 4.400), "A1"));
//! let geofence = Geofence::new(&map, GeofenceConfig::default());
//!
//! let t = |h, m| Utc.with_ymd_and_hms(2024, 7, 20, h, m, 0).unwrap();
//! let fixes = vec![
//!     TrackerFix::new(t(10, 0), GpsPoint::new(50.9001, 4.4001)),
//!     TrackerFix::new(t(10, 4), GpsPoint::new(50.9002, 4.4000)),
//!     TrackerFix::new(t(10, 6), GpsPoint::new(50.9100, 4.4000)),
//! ];
//!
//! let logs = trace_team(3, &fixes, &[], &geofence);
//! assert_eq!(logs.len(), 1);
//! assert_eq!(logs[0].fiche, 1);
//! assert_eq!(logs[0].arrived, t(10, 0));
//! assert_eq!(logs[0].left, Some(t(10, 4)));
//! ```

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::geofence::Geofence;
use crate::model::{CheckpointLog, FicheId, TeamId, TrackerFix};

/// A visit starting within this many minutes of the end of an earlier log at
/// the same checkpoint extends that log.
pub const MERGE_WINDOW_MINUTES: i64 = 5;

/// Consecutive fixes sharing the same nearest checkpoint, or none.
#[derive(Debug, Clone, Copy)]
struct Run {
    fiche: Option<FicheId>,
    arrived: DateTime<Utc>,
    left: DateTime<Utc>,
}

/// Update `logs` with the checkpoint visits found in `team`'s GPS `fixes`.
///
/// Returns every log of `logs` (other teams' untouched) with extended
/// departures applied, followed by the newly created logs. New logs get ids
/// above the highest id in `logs`.
pub fn trace_team(
    team: TeamId,
    fixes: &[TrackerFix],
    logs: &[CheckpointLog],
    geofence: &Geofence,
) -> Vec<CheckpointLog> {
    let start = std::time::Instant::now();
    let mut logs = logs.to_vec();

    let since = trace_start(team, &logs);
    let mut fixes: Vec<&TrackerFix> = fixes
        .iter()
        .filter(|fix| since.map_or(true, |since| fix.gps_datetime >= since))
        .collect();
    fixes.sort_by_key(|fix| fix.gps_datetime);

    let runs = runs(&fixes, geofence);
    let mut next_id = logs.iter().map(|log| log.id).max().map_or(1, |id| id + 1);
    let (mut created, mut extended) = (0, 0);

    for run in &runs {
        let Some(fiche) = run.fiche else { continue };

        match matching_log(team, fiche, run, &mut logs) {
            Some(log) => {
                let left = log.left.map_or(run.left, |left| left.max(run.left));
                debug!("[Trace] team {} log {} at fiche {} now left {}", team, log.id, fiche, left);
                log.left = Some(left);
                extended += 1;
            }
            None => {
                debug!(
                    "[Trace] team {} new log {} at fiche {} ({} - {})",
                    team, next_id, fiche, run.arrived, run.left
                );
                logs.push(CheckpointLog {
                    id: next_id,
                    team,
                    fiche,
                    arrived: run.arrived,
                    left: Some(run.left),
                });
                next_id += 1;
                created += 1;
            }
        }
    }

    info!(
        "[Trace] team {}: {} fixes, {} created, {} extended in {}ms",
        team,
        fixes.len(),
        created,
        extended,
        start.elapsed().as_millis()
    );
    logs
}

/// Arrival of the team's most recent log, ordering by departure with open
/// logs first.
fn trace_start(team: TeamId, logs: &[CheckpointLog]) -> Option<DateTime<Utc>> {
    logs.iter()
        .filter(|log| log.team == team)
        .max_by_key(|log| (log.left.is_none(), log.left))
        .map(|log| log.arrived)
}

fn runs(fixes: &[&TrackerFix], geofence: &Geofence) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for fix in fixes {
        let fiche = geofence.nearest_fiche(&fix.point).map(|(fiche, _)| fiche.id);
        match runs.last_mut() {
            Some(run) if run.fiche == fiche => run.left = fix.gps_datetime,
            _ => runs.push(Run { fiche, arrived: fix.gps_datetime, left: fix.gps_datetime }),
        }
    }
    runs
}

fn matching_log<'a>(
    team: TeamId,
    fiche: FicheId,
    run: &Run,
    logs: &'a mut [CheckpointLog],
) -> Option<&'a mut CheckpointLog> {
    let window_start = run.arrived - Duration::minutes(MERGE_WINDOW_MINUTES);
    logs.iter_mut().find(|log| {
        log.team == team
            && log.fiche == fiche
            && log.arrived <= run.left
            && log.left.map_or(true, |left| left >= window_start)
    })
}
