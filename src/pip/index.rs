//! Spatial index over boundary MBRs.

use geo::Rect;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use super::Mbr;
use crate::error::{Error, Result};
use crate::models::{BoundaryId, QueryPoint};

/// Wrapper for R-tree indexing of boundary MBRs
#[derive(Debug, Clone)]
pub struct IndexedMbr {
    pub id: BoundaryId,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedMbr {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedMbr {
    /// Fails for empty or non-finite boxes
    pub fn new(mbr: &Mbr) -> Result<Self> {
        let geometry_error = |reason| Error::Geometry {
            id: mbr.id,
            name: mbr.name.clone(),
            reason,
        };

        let rect = mbr.bbox.ok_or_else(|| geometry_error("empty geometry"))?;
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(geometry_error("non-finite coordinates"));
        }

        Ok(Self {
            id: mbr.id,
            envelope: AABB::from_corners([min.x, min.y], [max.x, max.y]),
        })
    }
}

/// Spatial index for boundary MBRs using R-tree
pub struct BoundarySpatialIndex {
    tree: RTree<IndexedMbr>,
}

impl BoundarySpatialIndex {
    /// Build spatial index from boundary MBRs
    pub fn build(mbrs: &[Mbr]) -> Result<Self> {
        info!("Building spatial index for {} boundaries...", mbrs.len());

        let indexed = mbrs
            .iter()
            .map(IndexedMbr::new)
            .collect::<Result<Vec<_>>>()?;

        let tree = RTree::bulk_load(indexed);

        info!("Spatial index built with {} entries", tree.size());
        Ok(Self { tree })
    }

    /// Ids of every boundary whose MBR intersects `bbox`
    pub fn query(&self, bbox: Rect<f64>) -> Vec<BoundaryId> {
        let (min, max) = (bbox.min(), bbox.max());
        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.id)
            .collect()
    }

    /// Candidates for a point: a query with a zero-area box
    pub fn query_point(&self, point: &QueryPoint) -> Vec<BoundaryId> {
        let query_envelope = AABB::from_point([point.longitude(), point.latitude()]);

        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|entry| entry.id)
            .collect()
    }

    /// Get total number of indexed boundaries
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Iterate over all indexed ids
    pub fn ids(&self) -> impl Iterator<Item = BoundaryId> + '_ {
        self.tree.iter().map(|entry| entry.id)
    }
}
