//! Distance computations used by the resolver.

use geo::{Closest, ClosestPoint, MultiPolygon, Point};

use crate::models::Boundary;

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Territorial sea limit according to UNCLOS (km)
pub const TERRITORIAL_THRESHOLD_KM: f64 = 22.2;

/// Contiguous zone limit according to UNCLOS (km)
pub const CONTIGUOUS_THRESHOLD_KM: f64 = 44.4;

/// Exclusive Economic Zone limit according to UNCLOS (km)
pub const EEZ_THRESHOLD_KM: f64 = 370.4;

/// Great-circle distance between two lon/lat points (km)
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let (lat_a, lat_b) = (a.y().to_radians(), b.y().to_radians());
    let d_lat = lat_b - lat_a;
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// How distance between a point and a geometry is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Cartesian distance in degrees
    Planar,
    /// Haversine distance in kilometres
    Haversine,
}

impl DistanceMetric {
    fn between(self, a: Point<f64>, b: Point<f64>) -> f64 {
        match self {
            DistanceMetric::Planar => (a.x() - b.x()).hypot(a.y() - b.y()),
            DistanceMetric::Haversine => haversine_km(a, b),
        }
    }
}

/// Distance from `point` to the closest point of `geometry`.
///
/// Every constituent polygon is checked on its own. Zero when the point lies
/// inside; `None` for empty geometries.
pub fn distance_to_geometry(
    point: Point<f64>,
    geometry: &MultiPolygon<f64>,
    metric: DistanceMetric,
) -> Option<f64> {
    geometry
        .iter()
        .filter_map(|polygon| match polygon.closest_point(&point) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => Some(metric.between(point, p)),
            Closest::Indeterminate => None,
        })
        .filter(|d| !d.is_nan())
        .min_by(|a, b| a.total_cmp(b))
}

/// A boundary together with its distance to the query point
#[derive(Debug, Clone, Copy)]
pub struct Nearest<'a> {
    pub boundary: &'a Boundary,
    pub distance: f64,
}

/// Pick the candidate closest to `point`.
///
/// Ties keep the first candidate in iteration order.
pub fn nearest_boundary<'a, I>(point: Point<f64>, candidates: I, metric: DistanceMetric) -> Option<Nearest<'a>>
where
    I: IntoIterator<Item = &'a Boundary>,
{
    let mut best: Option<Nearest<'a>> = None;

    for boundary in candidates {
        let Some(distance) = distance_to_geometry(point, &boundary.geometry, metric) else {
            continue;
        };
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(Nearest { boundary, distance });
        }
    }

    best
}
