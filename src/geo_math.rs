// Copyright: Lastmile Dashboard contributors
// Geometry helpers shared by the shape synthesis pipeline

use geo::{Distance, Haversine};
use geo_types::{Coord, Point};
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude on the planar approximation used everywhere
/// in the dashboard.
pub const METRES_PER_DEGREE_LAT: f64 = 111_320.0;

/// A (latitude, longitude) pair in degrees.
///
/// The dashboard keeps lat-first order internally. `geo_types` and the routing
/// service both use (x = lng, y = lat), so conversions happen at those edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// `[lng, lat]`, the axis order of GeoJSON and OSRM.
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[1],
            lng: pair[0],
        }
    }

    /// Moves the coordinate by a metric offset (north, east).
    pub fn offset_m(self, north_m: f64, east_m: f64) -> Self {
        Self {
            lat: self.lat + metres_to_lat_deg(north_m),
            lng: self.lng + metres_to_lng_deg(east_m, self.lat),
        }
    }

    pub fn approx_eq(&self, other: &LatLng, tolerance_deg: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance_deg
            && (self.lng - other.lng).abs() <= tolerance_deg
    }
}

impl From<LatLng> for Coord<f64> {
    fn from(value: LatLng) -> Self {
        Coord {
            x: value.lng,
            y: value.lat,
        }
    }
}

impl From<Coord<f64>> for LatLng {
    fn from(value: Coord<f64>) -> Self {
        Self {
            lat: value.y,
            lng: value.x,
        }
    }
}

impl From<LatLng> for Point<f64> {
    fn from(value: LatLng) -> Self {
        Point::new(value.lng, value.lat)
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(Point::from(a), Point::from(b))
}

/// Haversine length of a polyline in metres.
pub fn path_length_m(coords: &[LatLng]) -> f64 {
    coords.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

pub fn metres_per_degree_lng(lat: f64) -> f64 {
    // never let the scale collapse near the poles
    METRES_PER_DEGREE_LAT * lat.to_radians().cos().max(1e-6)
}

pub fn metres_to_lat_deg(metres: f64) -> f64 {
    metres / METRES_PER_DEGREE_LAT
}

pub fn metres_to_lng_deg(metres: f64, lat: f64) -> f64 {
    metres / metres_per_degree_lng(lat)
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if min > max {
        return (min + max) / 2.0;
    }
    value.max(min).min(max)
}

/// Arithmetic mean of the points. A closed loop's repeated first point is
/// skipped so it does not pull the centroid toward the start.
pub fn centroid(coords: &[LatLng]) -> Option<LatLng> {
    let pts = open_ring(coords);
    if pts.is_empty() {
        return None;
    }
    let n = pts.len() as f64;
    let (lat, lng) = pts
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Some(LatLng::new(lat / n, lng / n))
}

/// Returns the loop without its closing coordinate when first == last.
pub fn open_ring(coords: &[LatLng]) -> &[LatLng] {
    if is_closed(coords) {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

pub fn is_closed(coords: &[LatLng]) -> bool {
    coords.len() >= 2 && coords[0].approx_eq(&coords[coords.len() - 1], 1e-12)
}

/// Appends the first coordinate if the path is not already closed.
pub fn close_ring(coords: &mut Vec<LatLng>) {
    if let Some(&first) = coords.first() {
        if !is_closed(coords) {
            coords.push(first);
        }
    }
}

/// Local equirectangular plane (metres) around an origin, for the few places
/// that need isotropic distances without paying for haversine.
#[derive(Debug, Clone, Copy)]
pub struct LocalPlane {
    origin: LatLng,
    m_per_deg_lng: f64,
}

impl LocalPlane {
    pub fn new(origin: LatLng) -> Self {
        Self {
            origin,
            m_per_deg_lng: metres_per_degree_lng(origin.lat),
        }
    }

    pub fn project(&self, p: LatLng) -> (f64, f64) {
        (
            (p.lng - self.origin.lng) * self.m_per_deg_lng,
            (p.lat - self.origin.lat) * METRES_PER_DEGREE_LAT,
        )
    }

    pub fn unproject(&self, x: f64, y: f64) -> LatLng {
        LatLng::new(
            self.origin.lat + y / METRES_PER_DEGREE_LAT,
            self.origin.lng + x / self.m_per_deg_lng,
        )
    }
}

/// Axis-aligned lat/lng box. Also used as the quadrant rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a LatLng>,
    {
        let mut iter = points.into_iter().filter(|p| p.is_finite());
        let first = iter.next()?;
        let mut bbox = Self::new(first.lat, first.lat, first.lng, first.lng);
        for p in iter {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lng = bbox.min_lng.min(p.lng);
            bbox.max_lng = bbox.max_lng.max(p.lng);
        }
        Some(bbox)
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lng, self.max_lng]
            .iter()
            .all(|v| v.is_finite())
            && self.max_lat > self.min_lat
            && self.max_lng > self.min_lng
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lng >= self.min_lng
            && p.lng <= self.max_lng
    }

    /// Grows (positive) or shrinks (negative) every side by `metres`.
    /// Longitude uses the metres-per-degree at the box centre latitude.
    /// Shrinking never inverts the box; it collapses onto the centre instead.
    pub fn expand_m(&self, metres: f64) -> Self {
        let center = self.center();
        let dlat = metres_to_lat_deg(metres);
        let dlng = metres_to_lng_deg(metres, center.lat);
        let mut out = Self::new(
            self.min_lat - dlat,
            self.max_lat + dlat,
            self.min_lng - dlng,
            self.max_lng + dlng,
        );
        if out.min_lat > out.max_lat {
            out.min_lat = center.lat;
            out.max_lat = center.lat;
        }
        if out.min_lng > out.max_lng {
            out.min_lng = center.lng;
            out.max_lng = center.lng;
        }
        out
    }

    /// Opens up a box that is flat along an axis (every point on one
    /// latitude or one longitude) by `metres` either side of that axis.
    /// Axes with real extent, and inverted axes, are left alone.
    pub fn pad_flat_axes_m(&self, metres: f64) -> Self {
        let mut out = *self;
        if self.lat_span() == 0.0 {
            let dlat = metres_to_lat_deg(metres);
            out.min_lat -= dlat;
            out.max_lat += dlat;
        }
        if self.lng_span() == 0.0 {
            let dlng = metres_to_lng_deg(metres, self.center().lat);
            out.min_lng -= dlng;
            out.max_lng += dlng;
        }
        out
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self::new(
            self.min_lat.min(other.min_lat),
            self.max_lat.max(other.max_lat),
            self.min_lng.min(other.min_lng),
            self.max_lng.max(other.max_lng),
        )
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lng >= self.min_lng
            && other.max_lng <= self.max_lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // one degree of latitude is ~111.2 km on the haversine sphere
        let d = haversine_m(LatLng::new(0.0, 0.0), LatLng::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 100.0, "{d}");
    }

    #[test]
    fn offset_round_trips_through_degree_conversion() {
        let origin = LatLng::new(52.37, 4.90);
        let moved = origin.offset_m(500.0, 0.0);
        let d = haversine_m(origin, moved);
        assert!((d - 500.0).abs() < 2.0, "{d}");
    }

    #[test]
    fn centroid_ignores_closing_point() {
        let ring = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 2.0),
            LatLng::new(2.0, 2.0),
            LatLng::new(2.0, 0.0),
            LatLng::new(0.0, 0.0),
        ];
        let c = centroid(&ring).unwrap();
        assert!(c.approx_eq(&LatLng::new(1.0, 1.0), 1e-12));
    }

    #[test]
    fn shrinking_never_inverts() {
        let bbox = BoundingBox::new(52.0, 52.001, 4.0, 4.001);
        let shrunk = bbox.expand_m(-5_000.0);
        assert!(shrunk.min_lat <= shrunk.max_lat);
        assert!(shrunk.min_lng <= shrunk.max_lng);
    }

    #[test]
    fn flat_boxes_are_opened_along_the_flat_axis_only() {
        let row = BoundingBox::new(52.37, 52.37, 4.88, 4.92);
        let padded = row.pad_flat_axes_m(900.0);
        assert!(padded.is_valid());
        assert!((padded.lat_span() * METRES_PER_DEGREE_LAT - 1_800.0).abs() < 1e-6);
        assert_eq!((padded.min_lng, padded.max_lng), (4.88, 4.92));

        let point = BoundingBox::new(52.37, 52.37, 4.9, 4.9).pad_flat_axes_m(900.0);
        assert!(point.is_valid());
        assert!(point.contains(LatLng::new(52.37, 4.9)));

        let inverted = BoundingBox::new(52.4, 52.3, 4.8, 4.9);
        assert_eq!(inverted.pad_flat_axes_m(900.0), inverted);
    }

    #[test]
    fn local_plane_round_trip() {
        let plane = LocalPlane::new(LatLng::new(52.37, 4.90));
        let p = LatLng::new(52.38, 4.93);
        let (x, y) = plane.project(p);
        assert!(plane.unproject(x, y).approx_eq(&p, 1e-12));
    }
}
