//! HTTP client for the event REST API.
//!
//! This module fetches the live state of an event:
//! - Reference geography (fiches, tochten, weides, basis, forbidden areas)
//! - Teams, trackers and checkpoint logs
//! - Server-side statistics
//!
//! Geometries arrive as GeoJSON and are decoded into `geo` types. Requests
//! are retried with exponential backoff on transport errors and 429.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::{DateTime, Utc};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::model::{
    Basis, CheckpointLog, Direction, Entities, Entity, EventMap, Fiche, ForbiddenArea, Team,
    Tocht, Tracker, TrackerFix, Weide,
};
use crate::stats::{DirectionStats, SingleStat, Stats, TeamStat};
use crate::GpsPoint;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. "https://linker.example.org"
    pub base_url: String,
    /// Username and password for HTTP basic auth
    pub credentials: Option<(String, String)>,
    pub timeout: Duration,
    /// Retries after the first attempt. Default: 3
    pub max_retries: u32,
    /// Backoff before retry n is `retry_delay * 2^n`. Default: 200ms
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            credentials: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("giving up on {url} after {attempts} attempts (429)")]
    RetriesExhausted { url: String, attempts: u32 },
}

/// Everything needed to describe positions and compute statistics.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub map: EventMap,
    pub teams: Entities<Team>,
    pub trackers: Entities<Tracker>,
    pub checkpoint_logs: Vec<CheckpointLog>,
    pub stats: Stats,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// Wire format
// ============================================================================

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
struct PointGeometry {
    coordinates: Position,
}

#[derive(Debug, Deserialize)]
struct LineStringGeometry {
    coordinates: Vec<Position>,
}

#[derive(Debug, Deserialize)]
struct PolygonGeometry {
    coordinates: Vec<Vec<Position>>,
}

#[derive(Debug, Deserialize)]
struct MultiPolygonGeometry {
    coordinates: Vec<Vec<Vec<Position>>>,
}

fn coord(position: &[f64]) -> Result<Coord<f64>, String> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(format!("position needs at least 2 values, got {}", position.len())),
    }
}

fn line_string(positions: &[Position]) -> Result<LineString<f64>, String> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|r| line_string(r));
    let exterior = rings.next().ok_or("polygon without rings")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

impl PointGeometry {
    fn to_gps(&self) -> Result<GpsPoint, String> {
        coord(&self.coordinates).map(GpsPoint::from)
    }
}

/// Conversion from a wire record into a model entity.
trait IntoModel<T> {
    fn into_model(self) -> Result<T, String>;
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: u32,
    direction: String,
    number: u32,
    name: String,
    tracker: Option<u32>,
}

impl IntoModel<Team> for TeamDto {
    fn into_model(self) -> Result<Team, String> {
        let direction = Direction::from_code(&self.direction)
            .ok_or_else(|| format!("team {} has unknown direction {:?}", self.id, self.direction))?;
        Ok(Team {
            id: self.id,
            direction,
            number: self.number,
            name: self.name,
            tracker: self.tracker,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FicheDto {
    id: u32,
    order: u32,
    tocht: u32,
    point: PointGeometry,
    display_name: String,
}

impl IntoModel<Fiche> for FicheDto {
    fn into_model(self) -> Result<Fiche, String> {
        let point = self.point.to_gps()?;
        Ok(Fiche::new(self.id, self.order, self.tocht, point, self.display_name))
    }
}

#[derive(Debug, Deserialize)]
struct TochtDto {
    id: u32,
    identifier: String,
    order: Option<u32>,
    route: LineStringGeometry,
    #[serde(default)]
    is_alternative: bool,
}

impl IntoModel<Tocht> for TochtDto {
    fn into_model(self) -> Result<Tocht, String> {
        Ok(Tocht {
            id: self.id,
            identifier: self.identifier,
            order: self.order,
            route: line_string(&self.route.coordinates)?,
            is_alternative: self.is_alternative,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WeideDto {
    id: u32,
    tocht: Option<u32>,
    polygon: PolygonGeometry,
    display_name: Option<String>,
    identifier: Option<String>,
    name: Option<String>,
}

impl IntoModel<Weide> for WeideDto {
    fn into_model(self) -> Result<Weide, String> {
        let id = self.id;
        let identifier = self.identifier;
        let display_name = self
            .display_name
            .into_iter()
            .chain(self.name)
            .find(|name| !name.is_empty())
            .unwrap_or_else(|| match identifier {
                Some(identifier) => format!("Weide {}", identifier),
                None => format!("Weide {}", id),
            });
        Ok(Weide {
            id: self.id,
            tocht: self.tocht,
            polygon: polygon(&self.polygon.coordinates)?,
            display_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BasisDto {
    id: u32,
    point: PointGeometry,
}

impl IntoModel<Basis> for BasisDto {
    fn into_model(self) -> Result<Basis, String> {
        Ok(Basis { id: self.id, point: self.point.to_gps()? })
    }
}

#[derive(Debug, Deserialize)]
struct ForbiddenAreaDto {
    id: u32,
    description: String,
    area: MultiPolygonGeometry,
}

impl IntoModel<ForbiddenArea> for ForbiddenAreaDto {
    fn into_model(self) -> Result<ForbiddenArea, String> {
        let polygons = self
            .area
            .coordinates
            .iter()
            .map(|rings| polygon(rings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ForbiddenArea {
            id: self.id,
            description: self.description,
            area: MultiPolygon::new(polygons),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TrackerLogDto {
    gps_datetime: DateTime<Utc>,
    point: PointGeometry,
}

#[derive(Debug, Deserialize)]
struct TrackerDto {
    id: u32,
    tracker_code: Option<String>,
    tracker_id: Option<String>,
    #[serde(default)]
    tracker_name: Option<String>,
    last_log: Option<TrackerLogDto>,
    #[serde(default)]
    basis: Option<u32>,
    #[serde(default)]
    weide: Option<u32>,
    #[serde(default)]
    fiche: Option<u32>,
    #[serde(default)]
    tocht: Option<u32>,
    #[serde(default)]
    forbidden_area: Option<u32>,
}

impl IntoModel<Tracker> for TrackerDto {
    fn into_model(self) -> Result<Tracker, String> {
        let last_fix = match self.last_log {
            Some(log) => Some(TrackerFix::new(log.gps_datetime, log.point.to_gps()?)),
            None => None,
        };
        Ok(Tracker {
            id: self.id,
            tracker_code: self.tracker_code.or(self.tracker_id).unwrap_or_default(),
            tracker_name: self.tracker_name,
            last_fix,
            basis: self.basis,
            weide: self.weide,
            fiche: self.fiche,
            tocht: self.tocht,
            forbidden_area: self.forbidden_area,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CheckpointLogDto {
    id: u32,
    team: u32,
    fiche: u32,
    arrived: DateTime<Utc>,
    left: Option<DateTime<Utc>>,
}

impl From<CheckpointLogDto> for CheckpointLog {
    fn from(dto: CheckpointLogDto) -> Self {
        CheckpointLog {
            id: dto.id,
            team: dto.team,
            fiche: dto.fiche,
            arrived: dto.arrived,
            left: dto.left,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SingleStatDto {
    average: Option<i64>,
    nb_teams: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamStatDto {
    fiches: HashMap<String, f64>,
    tochten: HashMap<String, f64>,
    avg_fiche_deviation: Option<i64>,
    avg_tocht_deviation: Option<i64>,
}

/// JSON object keys are stringified ids, directions are "R" and "B".
#[derive(Debug, Deserialize)]
struct StatsDto {
    fiches: HashMap<String, HashMap<String, SingleStatDto>>,
    tochten: HashMap<String, HashMap<String, SingleStatDto>>,
    teams: HashMap<String, TeamStatDto>,
}

fn parse_id(key: &str) -> Result<u32, String> {
    key.parse().map_err(|_| format!("invalid id key {:?}", key))
}

fn parse_keys<V>(map: HashMap<String, V>) -> Result<HashMap<u32, V>, String> {
    map.into_iter()
        .map(|(k, v)| -> Result<(u32, V), String> { Ok((parse_id(&k)?, v)) })
        .collect()
}

fn direction_stats(mut by_code: HashMap<String, SingleStatDto>) -> DirectionStats {
    let mut single = |direction: Direction| {
        by_code
            .remove(direction.code())
            .map(|s| SingleStat { average: s.average, nb_teams: s.nb_teams })
            .unwrap_or_default()
    };
    DirectionStats { red: single(Direction::Red), blue: single(Direction::Blue) }
}

impl IntoModel<Stats> for StatsDto {
    fn into_model(self) -> Result<Stats, String> {
        let per_direction = |map: HashMap<String, HashMap<String, SingleStatDto>>| {
            parse_keys(map).map(|m| {
                m.into_iter()
                    .map(|(id, by_code)| (id, direction_stats(by_code)))
                    .collect::<HashMap<_, _>>()
            })
        };
        let teams = parse_keys(self.teams)?
            .into_iter()
            .map(|(id, team)| -> Result<(u32, TeamStat), String> {
                Ok((
                    id,
                    TeamStat {
                        fiches: parse_keys(team.fiches)?,
                        tochten: parse_keys(team.tochten)?,
                        avg_fiche_deviation: team.avg_fiche_deviation,
                        avg_tocht_deviation: team.avg_tocht_deviation,
                    },
                ))
            })
            .collect::<Result<HashMap<_, _>, String>>()?;

        Ok(Stats {
            fiches: per_direction(self.fiches)?,
            tochten: per_direction(self.tochten)?,
            teams,
        })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Async client for one event server.
pub struct LinkerClient {
    client: Client,
    auth_header: Option<String>,
    config: ClientConfig,
}

impl LinkerClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let auth_header = config.credentials.as_ref().map(|(user, password)| {
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", user, password));
            format!("Basic {}", encoded)
        });

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self { client, auth_header, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// GET a JSON document, retrying transport errors and 429 responses.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            let mut request = self.client.get(&url);
            if let Some(auth) = &self.auth_header {
                request = request.header("Authorization", auth);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(ClientError::RetriesExhausted { url, attempts: retries });
                        }
                        let wait = self.backoff(retries);
                        warn!("[Fetch {}] 429 Too Many Requests, retry {} with {:?} backoff", path, retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(ClientError::Status { url, status });
                    }

                    let bytes = match resp.bytes().await {
                        Ok(b) => b,
                        Err(source) => return Err(ClientError::Transport { url, source }),
                    };

                    let data = serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;

                    debug!(
                        "[Fetch {}] {:.1}KB in {:?}",
                        path,
                        bytes.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );
                    return Ok(data);
                }
                Err(source) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(ClientError::Transport { url, source });
                    }
                    let wait = self.backoff(retries);
                    warn!("[Fetch {}] Error: {}, retry {} after {:?}", path, source, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.config.retry_delay * (1 << retry.min(4))
    }

    async fn fetch_list<D, T>(&self, path: &str) -> Result<Vec<T>, ClientError>
    where
        D: DeserializeOwned + IntoModel<T>,
    {
        let records: Vec<D> = self.get_json(path).await?;
        records
            .into_iter()
            .map(|record| {
                record.into_model().map_err(|message| ClientError::Decode {
                    url: self.url(path),
                    message,
                })
            })
            .collect()
    }

    async fn fetch_entities<D, T>(&self, path: &str) -> Result<Entities<T>, ClientError>
    where
        D: DeserializeOwned + IntoModel<T>,
        T: Entity,
    {
        Ok(self.fetch_list::<D, T>(path).await?.into_iter().collect())
    }

    pub async fn fetch_teams(&self) -> Result<Entities<Team>, ClientError> {
        self.fetch_entities::<TeamDto, _>("teams/").await
    }

    pub async fn fetch_trackers(&self) -> Result<Entities<Tracker>, ClientError> {
        self.fetch_entities::<TrackerDto, _>("trackers/").await
    }

    pub async fn fetch_fiches(&self) -> Result<Entities<Fiche>, ClientError> {
        self.fetch_entities::<FicheDto, _>("fiches/").await
    }

    pub async fn fetch_tochten(&self) -> Result<Entities<Tocht>, ClientError> {
        self.fetch_entities::<TochtDto, _>("tochten/").await
    }

    pub async fn fetch_weides(&self) -> Result<Entities<Weide>, ClientError> {
        self.fetch_entities::<WeideDto, _>("weides/").await
    }

    pub async fn fetch_forbidden_areas(&self) -> Result<Entities<ForbiddenArea>, ClientError> {
        self.fetch_entities::<ForbiddenAreaDto, _>("forbidden-areas/").await
    }

    /// The event's base. The endpoint lists at most one.
    pub async fn fetch_basis(&self) -> Result<Option<Basis>, ClientError> {
        let bases = self.fetch_list::<BasisDto, Basis>("basis/").await?;
        if bases.len() > 1 {
            warn!("[LinkerClient] {} bases configured, using the first", bases.len());
        }
        Ok(bases.into_iter().next())
    }

    pub async fn fetch_checkpoint_logs(&self) -> Result<Vec<CheckpointLog>, ClientError> {
        let records: Vec<CheckpointLogDto> = self.get_json("checkpoint-logs/").await?;
        Ok(records.into_iter().map(CheckpointLog::from).collect())
    }

    pub async fn fetch_stats(&self) -> Result<Stats, ClientError> {
        let dto: StatsDto = self.get_json("stats/").await?;
        dto.into_model().map_err(|message| ClientError::Decode { url: self.url("stats/"), message })
    }

    pub async fn fetch_event_map(&self) -> Result<EventMap, ClientError> {
        let (fiches, tochten, weides, basis, forbidden_areas) = futures::try_join!(
            self.fetch_fiches(),
            self.fetch_tochten(),
            self.fetch_weides(),
            self.fetch_basis(),
            self.fetch_forbidden_areas()
        )?;
        Ok(EventMap { fiches, tochten, weides, basis, forbidden_areas })
    }

    /// Fetch all endpoints concurrently. Fails on the first error.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, ClientError> {
        let start = Instant::now();
        let (map, teams, trackers, checkpoint_logs, stats) = futures::try_join!(
            self.fetch_event_map(),
            self.fetch_teams(),
            self.fetch_trackers(),
            self.fetch_checkpoint_logs(),
            self.fetch_stats()
        )?;

        info!(
            "[LinkerClient] snapshot: {} teams, {} trackers, {} fiches, {} logs in {:.2}s",
            teams.len(),
            trackers.len(),
            map.fiches.len(),
            checkpoint_logs.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Snapshot {
            map,
            teams,
            trackers,
            checkpoint_logs,
            stats,
            fetched_at: Utc::now(),
        })
    }
}
