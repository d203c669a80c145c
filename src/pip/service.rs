//! Reverse-geocoding service: point-in-polygon with coastal fallback.

use geo::{Contains, Point};
use tracing::debug;

use super::geometry::{nearest_boundary, DistanceMetric, EEZ_THRESHOLD_KM};
use super::{compute_mbrs, BoundarySpatialIndex, BoundaryStore};
use crate::error::{Error, Result};
use crate::models::{Boundary, Coordinate, QueryPoint, Resolution, Terrain};

/// Resolves points to (province, country) using a boundary store and its index
pub struct Resolver {
    store: BoundaryStore,
    index: BoundarySpatialIndex,
}

impl Resolver {
    /// Pair a store with an index built from its MBRs.
    ///
    /// Fails with [`Error::IndexUnavailable`] if the index does not describe
    /// exactly the boundaries of the store.
    pub fn new(store: BoundaryStore, index: BoundarySpatialIndex) -> Result<Self> {
        if index.len() != store.len() {
            return Err(Error::IndexUnavailable(format!(
                "index has {} entries but store has {} boundaries",
                index.len(),
                store.len()
            )));
        }
        if let Some(id) = index.ids().find(|id| store.get(*id).is_none()) {
            return Err(Error::IndexUnavailable(format!(
                "index entry {} has no boundary in the store",
                id
            )));
        }

        Ok(Self { store, index })
    }

    /// Compute MBRs, build the index and pair it with the store
    pub fn from_store(store: BoundaryStore) -> Result<Self> {
        let mbrs = compute_mbrs(&store);
        let index = BoundarySpatialIndex::build(&mbrs)?;
        Self::new(store, index)
    }

    /// Candidate boundaries for a point, land first, then by id
    pub fn candidates(&self, point: &QueryPoint) -> Result<Vec<&Boundary>> {
        let mut candidates = self
            .index
            .query_point(point)
            .into_iter()
            .map(|id| {
                self.store.get(id).ok_or_else(|| {
                    Error::IndexUnavailable(format!("index returned unknown boundary {}", id))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        candidates.sort_by_key(|b| (b.terrain, b.id));
        Ok(candidates)
    }

    /// Resolve a validated point
    pub fn resolve(&self, point: &QueryPoint) -> Result<Resolution> {
        let candidates = self.candidates(point)?;
        let p = point.point();

        debug!(
            "Reverse geocoding ({}, {}): {} candidates",
            point.longitude(),
            point.latitude(),
            candidates.len()
        );

        let Some(enclosing) = enclosing_boundary(p, &candidates) else {
            return Ok(Resolution::unresolved());
        };

        let enclosing = if enclosing.terrain == Terrain::Water {
            nearest_coastline(p, &candidates).unwrap_or(enclosing)
        } else {
            enclosing
        };

        debug!(
            "Resolved ({}, {}) to {} / {:?}",
            point.longitude(),
            point.latitude(),
            enclosing.name,
            enclosing.admin
        );
        Ok(Resolution::new(enclosing.name.clone(), enclosing.admin.clone()))
    }

    /// Validate a raw coordinate and resolve it
    pub fn resolve_coordinate(&self, coordinate: Coordinate) -> Result<Resolution> {
        let point = QueryPoint::try_from(coordinate)?;
        self.resolve(&point)
    }

    pub fn store(&self) -> &BoundaryStore {
        &self.store
    }

    /// The index built over the store's MBRs
    pub fn index(&self) -> &BoundarySpatialIndex {
        &self.index
    }
}

/// The first candidate strictly containing the point, else the closest one
fn enclosing_boundary<'a>(point: Point<f64>, candidates: &[&'a Boundary]) -> Option<&'a Boundary> {
    if let Some(boundary) = candidates.iter().find(|b| b.geometry.contains(&point)) {
        return Some(*boundary);
    }

    let nearest = nearest_boundary(point, candidates.iter().copied(), DistanceMetric::Planar)?;
    debug!(
        "No candidate contains the point, falling back to closest boundary {} ({:.6} deg)",
        nearest.boundary.name, nearest.distance
    );
    Some(nearest.boundary)
}

/// The nearest land candidate, if its coastline lies within the EEZ
fn nearest_coastline<'a>(point: Point<f64>, candidates: &[&'a Boundary]) -> Option<&'a Boundary> {
    let land = candidates.iter().copied().filter(|b| b.is_land());
    let nearest = nearest_boundary(point, land, DistanceMetric::Haversine)?;

    if nearest.distance < EEZ_THRESHOLD_KM {
        debug!(
            "Water point within EEZ of {} ({:.1} km), reassigning",
            nearest.boundary.name, nearest.distance
        );
        Some(nearest.boundary)
    } else {
        None
    }
}
