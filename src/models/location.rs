//! Query points and the rows produced for them.

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A raw (longitude, latitude) row as fetched from an input source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// A validated point in EPSG:4326
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPoint {
    longitude: f64,
    latitude: f64,
}

impl QueryPoint {
    /// Validate a coordinate pair.
    ///
    /// Fails with [`Error::InvalidGeometry`] for non-finite or out-of-range
    /// coordinates.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        let invalid = |reason| Error::InvalidGeometry {
            longitude,
            latitude,
            reason,
        };

        if !longitude.is_finite() || !latitude.is_finite() {
            return Err(invalid("non-finite coordinate"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid("longitude outside [-180, 180]"));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid("latitude outside [-90, 90]"));
        }

        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl TryFrom<Coordinate> for QueryPoint {
    type Error = Error;

    fn try_from(coordinate: Coordinate) -> Result<Self> {
        Self::new(coordinate.longitude, coordinate.latitude)
    }
}

/// Province and country resolved for one query point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub province: Option<String>,
    pub country: Option<String>,
}

impl Resolution {
    pub fn new(province: impl Into<String>, country: Option<String>) -> Self {
        Self {
            province: Some(province.into()),
            country,
        }
    }

    /// Result for a point that hits no bounding box at all
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.province.is_some()
    }
}

/// A resolution tagged with the input row it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedRow {
    /// Zero-based position of the row in the input
    pub row: u64,
    pub province: Option<String>,
    pub country: Option<String>,
}

impl LocatedRow {
    pub fn new(row: u64, resolution: Resolution) -> Self {
        Self {
            row,
            province: resolution.province,
            country: resolution.country,
        }
    }
}
