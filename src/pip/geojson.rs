//! GeoJSON reading and writing for boundary datasets.
//!
//! Only `Polygon` and `MultiPolygon` features are accepted; everything is
//! normalized to `MultiPolygon` so the store holds a single geometry type.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ::geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use flate2::read::GzDecoder;
use geo::{MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};

/// A parsed feature: its properties plus its polygonal geometry
#[derive(Debug, Clone)]
pub struct SourceFeature {
    pub properties: JsonObject,
    pub geometry: MultiPolygon<f64>,
}

impl SourceFeature {
    /// Read a property as text. Numbers and booleans are stringified, `null` is absent.
    pub fn text_property(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// All features of one source dataset
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Dataset label used in error messages ("land", "marine", ...)
    pub dataset: String,
    pub features: Vec<SourceFeature>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Features are kept as raw objects first so errors can name their position
#[derive(Deserialize)]
struct RawCollection {
    features: Vec<JsonObject>,
}

/// Open a file, transparently decompressing `.gz`
pub fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Load a FeatureCollection from disk
pub fn read_feature_set(path: &Path, dataset: &str) -> Result<FeatureSet> {
    info!("Loading {} boundaries from {}", dataset, path.display());
    let set = parse_feature_set(open_reader(path)?, dataset)?;
    info!("Loaded {} {} features", set.len(), dataset);
    Ok(set)
}

/// Parse a FeatureCollection from any reader
pub fn parse_feature_set<R: Read>(reader: R, dataset: &str) -> Result<FeatureSet> {
    let raw: RawCollection = serde_json::from_reader(reader)?;

    let features = raw
        .features
        .into_iter()
        .enumerate()
        .map(|(i, object)| {
            let schema = |field: &str| Error::Schema {
                dataset: dataset.to_string(),
                feature: i,
                field: field.to_string(),
            };

            if !object.contains_key("geometry") {
                return Err(schema("geometry"));
            }
            let feature = Feature::from_json_object(object).map_err(|_| schema("geometry"))?;

            let geometry = match feature.geometry {
                None => MultiPolygon::new(vec![]),
                Some(geometry) => to_multi_polygon(geometry).ok_or_else(|| schema("geometry"))?,
            };

            Ok(SourceFeature {
                properties: feature.properties.unwrap_or_default(),
                geometry,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureSet {
        dataset: dataset.to_string(),
        features,
    })
}

/// `None` for unsupported types or positions without two ordinates
fn to_multi_polygon(geometry: Geometry) -> Option<MultiPolygon<f64>> {
    let polygons: Vec<Polygon<f64>> = match geometry.value {
        GeoValue::Polygon(rings) => {
            check_rings(&rings)?;
            vec![Polygon::try_from(GeoValue::Polygon(rings)).ok()?]
        }
        GeoValue::MultiPolygon(parts) => {
            parts.iter().try_for_each(|rings| check_rings(rings))?;
            MultiPolygon::try_from(GeoValue::MultiPolygon(parts)).ok()?.0
        }
        _ => return None,
    };

    // Parts without an exterior ring carry no area
    Some(MultiPolygon::new(
        polygons
            .into_iter()
            .filter(|p| !p.exterior().0.is_empty())
            .collect(),
    ))
}

fn check_rings(rings: &[Vec<Vec<f64>>]) -> Option<()> {
    rings
        .iter()
        .flatten()
        .all(|position| position.len() >= 2)
        .then_some(())
}

/// Build a feature; a missing geometry is written as `null`
pub fn to_feature(properties: JsonObject, geometry: Option<&MultiPolygon<f64>>) -> Feature {
    Feature {
        bbox: None,
        geometry: geometry.map(|g| Geometry::new(GeoValue::from(g))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Write features as a GeoJSON FeatureCollection
pub fn write_feature_collection<I>(path: &Path, features: I) -> Result<()>
where
    I: IntoIterator<Item = Feature>,
{
    let collection = FeatureCollection {
        bbox: None,
        features: features.into_iter().collect(),
        foreign_members: None,
    };
    let count = collection.features.len();

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;

    info!("Wrote {} features to {}", count, path.display());
    Ok(())
}
