//! Compute transit statistics for a small event and print the team table.
//!
//! Run with: cargo run --example event_stats

use chrono::{DateTime, Duration, TimeZone, Utc};
use geo::LineString;
use linker_engine::colors::{direction_color, fiche_time_to_color};
use linker_engine::{
    average_minutes_label, calculate_stats, fiche_deviation_color, route_deviation_color,
    seconds_to_hours_minutes, to_hours_minutes, checkpoint_log, CheckpointLog, Course, Direction,
    Entities, Fiche, GpsPoint, Team, Tocht,
};

fn main() {
    let tochten: Entities<Tocht> = ["A", "B"]
        .iter()
        .enumerate()
        .map(|(i, identifier)| Tocht {
            id: i as u32 + 1,
            identifier: identifier.to_string(),
            order: Some(i as u32 + 1),
            route: LineString::new(vec![]),
            is_alternative: false,
        })
        .collect();

    let mut fiches: Entities<Fiche> = Entities::new();
    let mut next_id = 1;
    for tocht in tochten.iter() {
        for order in 1..=3 {
            let name = format!("{}{}", tocht.identifier, order);
            let point = GpsPoint::new(50.90 + next_id as f64 * 0.001, 4.40);
            fiches.insert(Fiche::new(next_id, order, tocht.id, point, name));
            next_id += 1;
        }
    }

    let teams: Entities<Team> = (1..=6)
        .map(|id| Team {
            id,
            direction: if id % 2 == 1 { Direction::Red } else { Direction::Blue },
            number: id,
            name: format!("Ploeg {}", id),
            tracker: None,
        })
        .collect();

    let course = Course::new(&fiches, &tochten);

    // Each team walks the whole course in its direction, a bit slower per team number
    let start: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 7, 20, 8, 0, 0).unwrap();
    let mut logs = Vec::new();
    for team in teams.iter() {
        let mut at = start;
        let mut fiche = course.sequence()[0];
        for _ in 0..course.len() {
            let left = at + Duration::minutes(5);
            logs.push(CheckpointLog {
                id: logs.len() as u32 + 1,
                team: team.id,
                fiche,
                arrived: at,
                left: Some(left),
            });
            at = left + Duration::minutes(20 + 3 * team.number as i64);
            match course.expected_next(fiche, team.direction) {
                Some(next) => fiche = next,
                None => break,
            }
        }
    }

    let stats = calculate_stats(&teams, &logs, &course);

    println!("Average per stretch\n");
    for direction in Direction::ALL {
        let averages: Vec<i64> = course
            .sequence()
            .iter()
            .filter_map(|id| stats.fiche_average(*id, direction))
            .collect();
        let min = averages.iter().copied().min().unwrap_or(0) as f64;
        let max = averages.iter().copied().max().unwrap_or(0) as f64;

        println!("  {:?} ({})", direction, direction_color(direction));
        for id in course.sequence() {
            let label = course.segment_label(*id, &fiches).unwrap_or_default();
            let average = stats.fiche_average(*id, direction);
            let color = average
                .map(|a| fiche_time_to_color(a as f64, min, max))
                .unwrap_or_default();
            println!("    {:8} {:>5} {}", label, average_minutes_label(average), color);
        }
    }

    println!("\nTeams\n");
    for team in teams.iter() {
        let Some(team_stats) = stats.team(team.id) else { continue };
        let route = team_stats.avg_tocht_deviation;
        let fiche = team_stats.avg_fiche_deviation;
        let first_arrival = course
            .sequence()
            .first()
            .and_then(|id| checkpoint_log(team.id, *id, &logs))
            .map(|log| log.arrived);
        println!(
            "  {:8} {:?} start {} route {:24} {} fiche {:24} {}",
            team.name,
            team.direction,
            to_hours_minutes(first_arrival.as_ref()),
            seconds_to_hours_minutes(route, true),
            route.map(|s| route_deviation_color(s).background).unwrap_or("-"),
            seconds_to_hours_minutes(fiche, true),
            fiche.map(|s| fiche_deviation_color(s).background).unwrap_or("-"),
        );
    }
}
