use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::batch::sqlite::{self, is_valid_identifier};
use crate::batch::{csv, CoordinateSource, CsvSink, CsvSource, ResolutionSink, SqliteSink, SqliteSource};
use crate::models::LocatedRow;
use crate::pip::geojson::read_feature_set;
use crate::pip::{BoundaryStore, SourceFields};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub boundaries: BoundariesConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub input: EndpointConfig,
    pub output: EndpointConfig,
    #[serde(default)]
    pub merge: Option<MergeConfig>,
}

/// Boundary datasets: the two raw sources, or a merged `prepare` artifact
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum BoundariesConfig {
    Split { land: PathBuf, marine: PathBuf },
    Merged { merged: PathBuf },
}

/// Property names read from the raw datasets
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FieldsConfig {
    pub land_name: String,
    pub land_admin: String,
    pub marine_name: String,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            land_name: "name".to_string(),
            land_admin: "admin".to_string(),
            marine_name: "name".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub parallel: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            parallel: false,
        }
    }
}

/// Copy the results back onto the input rows after a run.
///
/// CSV input is copied to `path` with `province` and `country` appended.
/// SQLite input gains the two columns in place, and is also exported to
/// `path` when one is set.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct MergeConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EndpointConfig {
    Csv { path: PathBuf },
    Sqlite { path: PathBuf, table: String },
}

impl EndpointConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if let EndpointConfig::Sqlite { table, .. } = self {
            if !is_valid_identifier(table) {
                bail!("[{}] table {:?} is not a plain identifier", section, table);
            }
        }
        Ok(())
    }

    pub fn open_source(&self) -> Result<Box<dyn CoordinateSource>> {
        Ok(match self {
            EndpointConfig::Csv { path } => Box::new(CsvSource::open(path)?),
            EndpointConfig::Sqlite { path, table } => Box::new(SqliteSource::open(path, table)?),
        })
    }

    pub fn create_sink(&self) -> Result<Box<dyn ResolutionSink>> {
        Ok(match self {
            EndpointConfig::Csv { path } => Box::new(CsvSink::create(path)?),
            EndpointConfig::Sqlite { path, table } => Box::new(SqliteSink::create(path, table)?),
        })
    }

    /// Read back what a sink created from this endpoint wrote
    pub fn read_results(&self) -> Result<Vec<LocatedRow>> {
        match self {
            EndpointConfig::Csv { path } => csv::read_results(path),
            EndpointConfig::Sqlite { path, table } => sqlite::read_results(path, table),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.size == 0 {
            bail!("[batch] size must be greater than zero");
        }
        self.input.validate("input")?;
        self.output.validate("output")?;
        if let (Some(merge), EndpointConfig::Csv { .. }) = (&self.merge, &self.input) {
            if merge.path.is_none() {
                bail!("[merge] path is required for CSV input");
            }
        }
        Ok(())
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.batch.size).context("[batch] size must be greater than zero")
    }

    pub fn land_fields(&self) -> SourceFields {
        SourceFields::new(&self.fields.land_name, Some(self.fields.land_admin.clone()))
    }

    pub fn marine_fields(&self) -> SourceFields {
        SourceFields::new(&self.fields.marine_name, None)
    }

    /// Load the configured boundary datasets into a store
    pub fn load_boundaries(&self) -> Result<BoundaryStore> {
        let store = match &self.boundaries {
            BoundariesConfig::Split { land, marine } => {
                let land = read_feature_set(land, "land")?;
                let marine = read_feature_set(marine, "marine")?;
                BoundaryStore::load(&land, &self.land_fields(), &marine, &self.marine_fields())?
            }
            BoundariesConfig::Merged { merged } => {
                BoundaryStore::from_merged(&read_feature_set(merged, "merged")?)?
            }
        };
        Ok(store)
    }

    /// Merge the written results into the input, if `[merge]` is set.
    /// Returns the number of input rows that received a result.
    pub fn merge_results(&self) -> Result<Option<u64>> {
        let Some(merge) = &self.merge else {
            return Ok(None);
        };
        let results = self.output.read_results()?;

        let merged = match &self.input {
            EndpointConfig::Csv { path } => {
                let out = merge.path.as_deref().context("[merge] path is required for CSV input")?;
                csv::merge_into_csv(path, &results, out)?
            }
            EndpointConfig::Sqlite { path, table } => {
                let merged = sqlite::merge_into_table(path, table, &results)?;
                if let Some(out) = &merge.path {
                    sqlite::export_table_csv(path, table, out)?;
                }
                merged
            }
        };
        Ok(Some(merged))
    }
}
