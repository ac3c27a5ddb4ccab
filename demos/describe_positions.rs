//! Describe where a handful of trackers are on a small event map.
//!
//! Run with: cargo run --example describe_positions

use chrono::{Duration, Utc};
use geo::{LineString, MultiPolygon, Polygon};
use linker_engine::{
    describe_position, Basis, EventMap, Fiche, ForbiddenArea, Geofence, GeofenceConfig, GpsPoint,
    Tocht, Tracker, TrackerConfig, TrackerFix, Weide,
};

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

fn main() {
    // Two routes east of the base, joined at a field
    let mut map = EventMap::default();
    map.basis = Some(Basis { id: 1, point: GpsPoint::new(50.9000, 4.3900) });
    map.tochten.insert(Tocht {
        id: 1,
        identifier: "A".to_string(),
        order: Some(1),
        route: LineString::from(vec![(4.400, 50.900), (4.420, 50.900)]),
        is_alternative: false,
    });
    map.tochten.insert(Tocht {
        id: 2,
        identifier: "B".to_string(),
        order: Some(2),
        route: LineString::from(vec![(4.420, 50.900), (4.420, 50.920)]),
        is_alternative: false,
    });
    for fiche in [
        Fiche::new(1, 1, 1, GpsPoint::new(50.900, 4.400), "A1"),
        Fiche::new(2, 2, 1, GpsPoint::new(50.900, 4.410), "A2"),
        Fiche::new(3, 3, 1, GpsPoint::new(50.900, 4.420), "A3"),
        Fiche::new(4, 1, 2, GpsPoint::new(50.910, 4.420), "B1"),
        Fiche::new(5, 2, 2, GpsPoint::new(50.920, 4.420), "B2"),
    ] {
        map.fiches.insert(fiche);
    }
    map.weides.insert(Weide {
        id: 1,
        tocht: Some(2),
        polygon: square(4.425, 50.905, 0.002),
        display_name: "Weide B".to_string(),
    });
    map.forbidden_areas.insert(ForbiddenArea {
        id: 1,
        description: "Privé domein".to_string(),
        area: MultiPolygon::new(vec![square(4.404, 50.902, 0.002)]),
    });

    let now = Utc::now();
    let fix = |minutes_ago: i64, lat: f64, lng: f64| {
        Some(TrackerFix::new(now - Duration::minutes(minutes_ago), GpsPoint::new(lat, lng)))
    };

    let trackers = vec![
        Tracker { id: 1, tracker_code: "T01".into(), last_fix: fix(1, 50.9001, 4.3901), basis: Some(1), ..Tracker::default() },
        Tracker { id: 2, tracker_code: "T02".into(), last_fix: fix(2, 50.9060, 4.4260), weide: Some(1), ..Tracker::default() },
        Tracker { id: 3, tracker_code: "T03".into(), last_fix: fix(3, 50.9003, 4.4140), tocht: Some(1), ..Tracker::default() },
        Tracker { id: 4, tracker_code: "T04".into(), last_fix: fix(30, 50.9030, 4.4050), ..Tracker::default() },
        Tracker { id: 5, tracker_code: "T05".into(), ..Tracker::default() },
    ];

    println!("Backend-resolved positions\n");
    let status = TrackerConfig::default();
    for tracker in &trackers {
        let online = if tracker.is_online(now, &status) { "online" } else { "offline" };
        println!(
            "  {} ({:7}) {}",
            tracker.label(),
            online,
            describe_position(tracker, &map)
        );
    }

    // Re-derive zones client-side for trackers the backend left unresolved
    println!("\nWith geofence fallback\n");
    let fence = Geofence::new(&map, GeofenceConfig::default());
    for tracker in &trackers {
        let annotated = fence.annotate(tracker);
        let description = describe_position(&annotated, &map);
        let marker = if description.is_warning() { "!" } else { " " };
        println!("{} {} {}", marker, tracker.label(), description);
    }
}
