//! Fetch a live snapshot from an event server and print tracker positions.
//!
//! Run with: cargo run --example live_snapshot --features http -- http://localhost:8000
//!
//! Credentials are read from LINKER_USER and LINKER_PASSWORD when set.

use linker_engine::{
    calculate_stats, describe_position, ClientConfig, Course, Geofence, GeofenceConfig,
    LinkerClient, TrackerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8000".to_string());
    let credentials = match (std::env::var("LINKER_USER"), std::env::var("LINKER_PASSWORD")) {
        (Ok(user), Ok(password)) => Some((user, password)),
        _ => None,
    };

    let client = LinkerClient::new(ClientConfig {
        base_url,
        credentials,
        ..ClientConfig::default()
    })?;
    let snapshot = client.fetch_snapshot().await?;

    println!(
        "{} teams, {} trackers, {} checkpoints, {} logs\n",
        snapshot.teams.len(),
        snapshot.trackers.len(),
        snapshot.map.fiches.len(),
        snapshot.checkpoint_logs.len()
    );

    let fence = Geofence::new(&snapshot.map, GeofenceConfig::default());
    let status = TrackerConfig::default();
    for team in snapshot.teams.iter() {
        let Some(tracker) = team.tracker.and_then(|id| snapshot.trackers.get(id)) else {
            println!("  {:3} {:24} no tracker", team.number, team.name);
            continue;
        };
        let online = tracker.is_online(snapshot.fetched_at, &status);
        let description = describe_position(&fence.annotate(tracker), &snapshot.map);
        println!(
            "  {:3} {:24} {} {}",
            team.number,
            team.name,
            if online { "●" } else { "○" },
            description
        );
    }

    // Recompute the statistics locally and compare with the server
    let course = Course::from_map(&snapshot.map);
    let local = calculate_stats(&snapshot.teams, &snapshot.checkpoint_logs, &course);
    let differing = local
        .teams
        .iter()
        .filter(|(id, stat)| {
            snapshot
                .stats
                .team(**id)
                .map_or(true, |server| server.avg_fiche_deviation != stat.avg_fiche_deviation)
        })
        .count();
    println!("\n{} of {} team deviations differ from the server", differing, local.teams.len());

    Ok(())
}
