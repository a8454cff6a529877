//! Best-effort snapping of decorative loops onto the road network.
//!
//! Snapping is cosmetic. Any chunk the routing service cannot answer keeps its
//! straight-line input, and the caller always gets a usable path back.

pub mod osrm;

use crate::geo_math::{LatLng, close_ring, is_closed};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

pub use osrm::OsrmClient;

#[derive(Error, Debug)]
pub enum SnapError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing service answered with HTTP {0}")]
    Status(u16),
    #[error("malformed routing response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("routing service returned code '{code}': {}", message.as_deref().unwrap_or("no message"))]
    Service { code: String, message: Option<String> },
    #[error("routing response contained no route")]
    NoRoute,
    #[error("route geometry was empty")]
    EmptyGeometry,
    #[error("invalid routing url: {0}")]
    Url(#[from] url::ParseError),
    #[error("need at least two waypoints, got {0}")]
    TooFewWaypoints(usize),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub enabled: bool,
    pub base_url: String,
    pub profile: String,
    /// Per-request waypoint cap of the routing service.
    pub max_waypoints: usize,
    pub request_timeout_ms: u64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            max_waypoints: 25,
            request_timeout_ms: 4_000,
        }
    }
}

/// Anything that can turn a list of waypoints into a road-following path.
pub trait RouteGeometrySource {
    fn route_geometry(
        &self,
        waypoints: &[LatLng],
    ) -> impl Future<Output = Result<Vec<LatLng>, SnapError>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapReport {
    pub chunks: usize,
    pub snapped_chunks: usize,
}

impl SnapReport {
    pub fn fully_fell_back(&self) -> bool {
        self.snapped_chunks == 0
    }
}

pub struct RoadSnapper<S> {
    source: S,
    max_waypoints: usize,
}

impl<S: RouteGeometrySource + Sync> RoadSnapper<S> {
    pub fn new(source: S, max_waypoints: usize) -> Self {
        Self {
            source,
            max_waypoints: max_waypoints.max(2),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Snaps the path chunk by chunk. Consecutive chunks share their boundary
    /// waypoint so the result stays continuous. Requests are awaited one after
    /// another.
    pub async fn snap(&self, coords: &[LatLng]) -> (Vec<LatLng>, SnapReport) {
        let mut report = SnapReport::default();
        if coords.len() < 2 {
            return (coords.to_vec(), report);
        }

        let mut out: Vec<LatLng> = Vec::with_capacity(coords.len() * 4);
        for (index, chunk) in chunk_ranges(coords.len(), self.max_waypoints)
            .into_iter()
            .map(|(start, end)| &coords[start..=end])
            .enumerate()
        {
            report.chunks += 1;
            match self.source.route_geometry(chunk).await {
                Ok(snapped) if !snapped.is_empty() => {
                    report.snapped_chunks += 1;
                    for p in snapped {
                        if out.last() != Some(&p) {
                            out.push(p);
                        }
                    }
                }
                Ok(_) => {
                    tracing::warn!(
                        "chunk {} snapped to an empty path, keeping straight line",
                        index
                    );
                    push_straight(&mut out, chunk, index);
                }
                Err(e) => {
                    tracing::warn!("chunk {} not snapped, keeping straight line: {}", index, e);
                    push_straight(&mut out, chunk, index);
                }
            }
        }

        if is_closed(coords) {
            close_ring(&mut out);
        }
        (out, report)
    }
}

/// Straight-line fallback. Later chunks skip their first waypoint, which is
/// the previous chunk's last one.
fn push_straight(out: &mut Vec<LatLng>, chunk: &[LatLng], index: usize) {
    let skip = if index == 0 || out.is_empty() { 0 } else { 1 };
    if skip == 1 && out.last() != chunk.first() {
        // previous chunk was snapped and ended elsewhere; keep the join
        out.push(chunk[0]);
    }
    out.extend_from_slice(&chunk[skip..]);
}

/// Inclusive index ranges of at most `max` waypoints, overlapping by one.
fn chunk_ranges(len: usize, max: usize) -> Vec<(usize, usize)> {
    let max = max.max(2);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start + 1 < len {
        let end = (start + max - 1).min(len - 1);
        ranges.push((start, end));
        start = end;
    }
    ranges
}
