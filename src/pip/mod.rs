//! Point-in-Polygon (PIP) reverse geocoding.
//!
//! Merges land and marine boundaries into one store, indexes their MBRs in
//! an R-tree and resolves points to the enclosing province and country,
//! attributing near-shore water to the nearest coastline.

mod boundary;
pub mod geojson;
pub mod geometry;
mod index;
mod service;

pub use boundary::{compute_mbrs, write_mbrs_geojson, BoundaryStore, Mbr, SourceFields};
pub use geometry::{
    haversine_km, CONTIGUOUS_THRESHOLD_KM, EARTH_RADIUS_KM, EEZ_THRESHOLD_KM, TERRITORIAL_THRESHOLD_KM,
};
pub use index::BoundarySpatialIndex;
pub use service::Resolver;
