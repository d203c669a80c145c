//! CSV file input and output.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{Reader, ReaderBuilder, Writer, WriterBuilder};
use tracing::{info, warn};

use super::{CoordinateSource, ResolutionSink, WriteMode};
use crate::models::{Coordinate, LocatedRow};

/// Reads `longitude`/`latitude` columns from a CSV file with headers.
///
/// Header names are matched case-insensitively and other columns are
/// ignored. Cells that do not parse as numbers become NaN so the row is
/// rejected at resolution time instead of shifting row numbers. Short rows
/// are read the same way, with the missing cells treated as unparsable.
pub struct CsvSource {
    rows: Vec<Coordinate>,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Loading coordinates from {:?}...", path);

        let mut reader = open_input(path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .with_context(|| format!("Column '{}' not found in {:?}", name, path))
        };
        let lon_idx = column("longitude")?;
        let lat_idx = column("latitude")?;

        let mut rows = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let record = result?;
            let cell = |idx: usize| {
                let raw = record.get(idx).unwrap_or("").trim();
                raw.parse::<f64>().unwrap_or_else(|_| {
                    warn!("Row {}: unparsable coordinate {:?}", i, raw);
                    f64::NAN
                })
            };
            rows.push(Coordinate::new(cell(lon_idx), cell(lat_idx)));
        }

        info!("Loaded {} coordinates", rows.len());
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ragged rows are accepted so one malformed line cannot fail the whole file
fn open_input(path: &Path) -> Result<Reader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    Ok(ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file))
}

impl CoordinateSource for CsvSource {
    fn fetch_page(&mut self, offset: u64, limit: usize) -> Result<Vec<Coordinate>> {
        let start = usize::try_from(offset)?.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        Ok(self.rows[start..end].to_vec())
    }
}

/// Writes `row,province,country` records, flushing after every page.
///
/// Unresolved fields are written as empty cells.
pub struct CsvSink {
    path: PathBuf,
    writer: Writer<File>,
}

impl CsvSink {
    /// Create (or truncate) `path` and write the header
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            writer: Self::open_writer(path)?,
        })
    }

    fn open_writer(path: &Path) -> Result<Writer<File>> {
        let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(["row", "province", "country"])?;
        writer.flush()?;
        Ok(writer)
    }
}

impl ResolutionSink for CsvSink {
    fn write_page(&mut self, rows: &[LocatedRow], mode: WriteMode) -> Result<()> {
        if mode == WriteMode::Replace {
            self.writer = Self::open_writer(&self.path)?;
        }
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Read back the rows written by a [`CsvSink`]
pub fn read_results(path: &Path) -> Result<Vec<LocatedRow>> {
    let mut reader = open_input(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Copy `input` to `output` with `province` and `country` columns appended.
///
/// Rows are matched on their position in `input`. Rows without a result
/// (dropped at resolution time) get empty cells. Returns the number of rows
/// that received a result.
pub fn merge_into_csv(input: &Path, results: &[LocatedRow], output: &Path) -> Result<u64> {
    info!("Merging {} results into a copy of {:?}...", results.len(), input);

    let by_row: HashMap<u64, &LocatedRow> = results.iter().map(|r| (r.row, r)).collect();

    let mut reader = open_input(input)?;
    let file = File::create(output).with_context(|| format!("failed to create {:?}", output))?;
    let mut writer = WriterBuilder::new().flexible(true).from_writer(file);

    let mut header = reader.headers()?.clone();
    header.push_field("province");
    header.push_field("country");
    writer.write_record(&header)?;

    let mut merged = 0;
    for (i, result) in reader.records().enumerate() {
        let mut record = result?;
        let located = by_row.get(&(i as u64));
        if located.is_some() {
            merged += 1;
        }
        record.push_field(located.and_then(|r| r.province.as_deref()).unwrap_or(""));
        record.push_field(located.and_then(|r| r.country.as_deref()).unwrap_or(""));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Wrote {:?} ({} rows with results)", output, merged);
    Ok(merged)
}
