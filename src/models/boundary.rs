//! Boundary records shared by the store, the spatial index and the resolver.

use std::fmt;

use geo::BoundingRect;
use geo_types::{MultiPolygon, Rect};
use serde::{Deserialize, Serialize};

/// Stable key of a boundary in the boundary store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(pub usize);

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a boundary covers land or water. `Land < Water`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Terrain {
    Land,
    Water,
}

impl Terrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terrain::Land => "LAND",
            Terrain::Water => "WATER",
        }
    }

    /// Parse a terrain label as written in merged boundary files
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "LAND" => Some(Terrain::Land),
            "WATER" => Some(Terrain::Water),
            _ => None,
        }
    }
}

impl fmt::Display for Terrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single region polygon with its labels
#[derive(Debug, Clone)]
pub struct Boundary {
    pub id: BoundaryId,
    /// Province, state or marine zone name
    pub name: String,
    /// Country; `None` for marine zones
    pub admin: Option<String>,
    pub terrain: Terrain,
    pub geometry: MultiPolygon<f64>,
}

impl Boundary {
    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    pub fn is_land(&self) -> bool {
        self.terrain == Terrain::Land
    }
}
