use super::{RouteGeometrySource, SnapConfig, SnapError};
use crate::geo_math::LatLng;
use itertools::Itertools;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Client for an OSRM-compatible `/route/v1` endpoint.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    pub fn new(config: &SnapConfig) -> Result<Self, SnapError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        // fail early on an unusable base url
        Url::parse(&config.base_url)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
        })
    }

    /// `{base}/route/v1/{profile}/{lng,lat;...}?overview=full&geometries=geojson`
    pub fn route_url(&self, waypoints: &[LatLng]) -> Result<Url, SnapError> {
        let coordinates = waypoints
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lng, p.lat))
            .join(";");
        let mut url = Url::parse(&format!(
            "{}/route/v1/{}/{}",
            self.base_url, self.profile, coordinates
        ))?;
        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "geojson");
        Ok(url)
    }
}

/// Decodes a route response body into lat-first coordinates.
pub fn parse_route_response(body: &[u8]) -> Result<Vec<LatLng>, SnapError> {
    let response: OsrmRouteResponse = serde_json::from_slice(body)?;
    if response.code != "Ok" {
        return Err(SnapError::Service {
            code: response.code,
            message: response.message,
        });
    }
    let route = response.routes.into_iter().next().ok_or(SnapError::NoRoute)?;
    let coords: Vec<LatLng> = route
        .geometry
        .coordinates
        .into_iter()
        .map(LatLng::from_lng_lat)
        .filter(LatLng::is_finite)
        .collect();
    if coords.is_empty() {
        return Err(SnapError::EmptyGeometry);
    }
    Ok(coords)
}

impl RouteGeometrySource for OsrmClient {
    async fn route_geometry(&self, waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
        if waypoints.len() < 2 {
            return Err(SnapError::TooFewWaypoints(waypoints.len()));
        }
        let url = self.route_url(waypoints)?;
        tracing::debug!("requesting road geometry for {} waypoints", waypoints.len());

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnapError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        parse_route_response(&body)
    }
}
