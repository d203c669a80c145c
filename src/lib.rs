//! Revgeocoder - batch reverse geocoding against land and marine boundaries
//!
//! This library provides the boundary store, spatial index and resolver
//! shared by the prepare and geocode binaries.

pub mod batch;
pub mod config;
pub mod error;
pub mod models;
pub mod pip;

pub use error::{Error, Result};
pub use models::{Boundary, BoundaryId, Coordinate, LocatedRow, QueryPoint, Resolution, Terrain};
pub use pip::{BoundarySpatialIndex, BoundaryStore, Resolver};
