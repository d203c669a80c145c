//! Boundary store: the arena of land and marine boundaries.

use std::path::Path;

use geo::{MultiPolygon, Rect};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::geojson::{to_feature, write_feature_collection, FeatureSet, SourceFeature};
use crate::error::{Error, Result};
use crate::models::{Boundary, BoundaryId, Terrain};

/// Property names to read from a source dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFields {
    pub name: String,
    /// Country field; `None` for datasets without one (marine zones)
    pub admin: Option<String>,
}

impl SourceFields {
    pub fn new(name: impl Into<String>, admin: Option<String>) -> Self {
        Self {
            name: name.into(),
            admin,
        }
    }

    /// Natural Earth admin-1 style land boundaries
    pub fn land() -> Self {
        Self::new("name", Some("admin".to_string()))
    }

    /// Marine regions carry a name only
    pub fn marine() -> Self {
        Self::new("name", None)
    }
}

/// Minimum bounding rectangle of one boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Mbr {
    pub id: BoundaryId,
    pub name: String,
    pub terrain: Terrain,
    /// `None` when the geometry is empty
    pub bbox: Option<Rect<f64>>,
}

/// Immutable, id-addressed collection of boundaries.
///
/// A boundary's [`BoundaryId`] is its position here; the spatial index stores
/// the same ids.
#[derive(Debug, Clone, Default)]
pub struct BoundaryStore {
    boundaries: Vec<Boundary>,
}

impl BoundaryStore {
    /// Merge land and marine datasets into one store, land first
    pub fn load(
        land: &FeatureSet,
        land_fields: &SourceFields,
        marine: &FeatureSet,
        marine_fields: &SourceFields,
    ) -> Result<Self> {
        let mut store = Self::default();
        store.extend_from(land, land_fields, Terrain::Land)?;
        store.extend_from(marine, marine_fields, Terrain::Water)?;

        info!(
            "Boundary store holds {} boundaries ({} land, {} water)",
            store.len(),
            store.count(Terrain::Land),
            store.count(Terrain::Water)
        );
        Ok(store)
    }

    /// Load a store previously written by [`BoundaryStore::write_geojson`]
    pub fn from_merged(merged: &FeatureSet) -> Result<Self> {
        let mut store = Self::default();

        for (i, feature) in merged.features.iter().enumerate() {
            let terrain = feature
                .text_property("terrain")
                .and_then(|label| Terrain::from_label(&label))
                .ok_or_else(|| schema_error(merged, i, "terrain"))?;
            let name = feature
                .text_property("name")
                .ok_or_else(|| schema_error(merged, i, "name"))?;
            let admin = feature.text_property("admin");

            store.push(name, admin, terrain, feature.geometry.clone());
        }

        info!(
            "Boundary store holds {} boundaries ({} land, {} water)",
            store.len(),
            store.count(Terrain::Land),
            store.count(Terrain::Water)
        );
        Ok(store)
    }

    fn extend_from(&mut self, set: &FeatureSet, fields: &SourceFields, terrain: Terrain) -> Result<()> {
        for (i, feature) in set.features.iter().enumerate() {
            let (name, admin) = project(set, i, feature, fields)?;
            self.push(name, admin, terrain, feature.geometry.clone());
        }
        Ok(())
    }

    /// Append a boundary, returning its id
    pub fn push(
        &mut self,
        name: impl Into<String>,
        admin: Option<String>,
        terrain: Terrain,
        geometry: MultiPolygon<f64>,
    ) -> BoundaryId {
        let id = BoundaryId(self.boundaries.len());
        self.boundaries.push(Boundary {
            id,
            name: name.into(),
            admin,
            terrain,
            geometry,
        });
        id
    }

    pub fn get(&self, id: BoundaryId) -> Option<&Boundary> {
        self.boundaries.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Boundary> {
        self.boundaries.iter()
    }

    pub fn count(&self, terrain: Terrain) -> usize {
        self.boundaries.iter().filter(|b| b.terrain == terrain).count()
    }

    /// Write the merged store as GeoJSON with `name`, `admin` and `terrain` properties
    pub fn write_geojson(&self, path: &Path) -> Result<()> {
        write_feature_collection(
            path,
            self.boundaries.iter().map(|b| {
                let mut properties = Map::new();
                properties.insert("name".to_string(), Value::from(b.name.clone()));
                properties.insert(
                    "admin".to_string(),
                    b.admin.clone().map_or(Value::Null, Value::from),
                );
                properties.insert("terrain".to_string(), Value::from(b.terrain.as_str()));
                to_feature(properties, Some(&b.geometry))
            }),
        )
    }
}

/// Project a source feature onto the common `(name, admin)` schema
fn project(
    set: &FeatureSet,
    index: usize,
    feature: &SourceFeature,
    fields: &SourceFields,
) -> Result<(String, Option<String>)> {
    let name = feature
        .text_property(&fields.name)
        .ok_or_else(|| schema_error(set, index, &fields.name))?;

    let admin = match &fields.admin {
        Some(field) => Some(
            feature
                .text_property(field)
                .ok_or_else(|| schema_error(set, index, field))?,
        ),
        None => None,
    };

    Ok((name, admin))
}

fn schema_error(set: &FeatureSet, feature: usize, field: &str) -> Error {
    Error::Schema {
        dataset: set.dataset.clone(),
        feature,
        field: field.to_string(),
    }
}

/// Compute the MBR of every boundary, in id order
pub fn compute_mbrs(store: &BoundaryStore) -> Vec<Mbr> {
    info!("Computing MBRs for {} boundaries...", store.len());

    store
        .iter()
        .map(|boundary| {
            debug!("Processing {}...", boundary.name);
            Mbr {
                id: boundary.id,
                name: boundary.name.clone(),
                terrain: boundary.terrain,
                bbox: boundary.bbox(),
            }
        })
        .collect()
}

/// Write MBRs as GeoJSON rectangles. Boundaries without a box get a `null` geometry.
pub fn write_mbrs_geojson(mbrs: &[Mbr], path: &Path) -> Result<()> {
    write_feature_collection(
        path,
        mbrs.iter().map(|mbr| {
            let mut properties = Map::new();
            properties.insert("id".to_string(), Value::from(mbr.id.0));
            properties.insert("name".to_string(), Value::from(mbr.name.clone()));
            properties.insert("terrain".to_string(), Value::from(mbr.terrain.as_str()));

            let geometry = mbr.bbox.map(|rect| MultiPolygon::new(vec![rect.to_polygon()]));
            to_feature(properties, geometry.as_ref())
        }),
    )
}
