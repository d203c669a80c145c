//! Error taxonomy for the reverse-geocoding core.

use crate::models::BoundaryId;

/// Boxed failure reported by an input source or output sink
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A boundary source feature lacks a required member or property
    #[error("{dataset} feature {feature} is missing required field `{field}`")]
    Schema {
        dataset: String,
        feature: usize,
        field: String,
    },

    /// A boundary geometry cannot produce a bounding box
    #[error("boundary {id} ({name}) has no usable bounding box: {reason}")]
    Geometry {
        id: BoundaryId,
        name: String,
        reason: &'static str,
    },

    /// A query point is malformed
    #[error("invalid query point ({longitude}, {latitude}): {reason}")]
    InvalidGeometry {
        longitude: f64,
        latitude: f64,
        reason: &'static str,
    },

    /// The spatial index cannot be queried consistently with the boundary store
    #[error("spatial index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("failed to fetch page at offset {offset}")]
    Fetch {
        offset: u64,
        #[source]
        source: CollaboratorError,
    },

    #[error("failed to write page at offset {offset}")]
    Write {
        offset: u64,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure concerns a single row and the run may continue
    pub fn is_row_local(&self) -> bool {
        matches!(self, Error::InvalidGeometry { .. })
    }
}
