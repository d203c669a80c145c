//! Core data models for the reverse geocoder.

pub mod boundary;
pub mod location;

pub use boundary::{Boundary, BoundaryId, Terrain};
pub use location::{Coordinate, LocatedRow, QueryPoint, Resolution};
