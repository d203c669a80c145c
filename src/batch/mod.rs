//! Paged batch runner driving the resolver over an input source.
//!
//! Pages are fetched by offset until the source returns an empty page. Each
//! page is resolved and written before the next one is requested.

pub mod csv;
pub mod memory;
pub mod sqlite;

use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{Coordinate, LocatedRow, Resolution};
use crate::pip::Resolver;

pub use self::csv::{CsvSink, CsvSource};
pub use memory::{MemorySink, MemorySource};
pub use sqlite::{SqliteSink, SqliteSource};

/// Offset-paged supplier of coordinate rows
pub trait CoordinateSource {
    /// Fetch up to `limit` rows starting at `offset`.
    ///
    /// Returns an empty page exactly when the input is exhausted; errors are
    /// reserved for genuine I/O failures.
    fn fetch_page(&mut self, offset: u64, limit: usize) -> anyhow::Result<Vec<Coordinate>>;
}

/// How a sink treats rows already written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    /// Discard previous rows first
    Replace,
}

/// Destination for resolved rows
pub trait ResolutionSink {
    fn write_page(&mut self, rows: &[LocatedRow], mode: WriteMode) -> anyhow::Result<()>;
}

impl<S: CoordinateSource + ?Sized> CoordinateSource for Box<S> {
    fn fetch_page(&mut self, offset: u64, limit: usize) -> anyhow::Result<Vec<Coordinate>> {
        (**self).fetch_page(offset, limit)
    }
}

impl<W: ResolutionSink + ?Sized> ResolutionSink for Box<W> {
    fn write_page(&mut self, rows: &[LocatedRow], mode: WriteMode) -> anyhow::Result<()> {
        (**self).write_page(rows, mode)
    }
}

/// Statistics for a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pages: u64,
    pub fetches: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    /// Rows dropped because they could not be resolved
    pub rows_failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Resolved rows of one page
struct PageOutcome {
    rows: Vec<LocatedRow>,
    failed: u64,
}

/// Drives a [`Resolver`] over a [`CoordinateSource`] page by page
pub struct BatchRunner<'a> {
    resolver: &'a Resolver,
    batch_size: NonZeroUsize,
    parallel: bool,
    progress: Option<ProgressBar>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(resolver: &'a Resolver, batch_size: NonZeroUsize) -> Self {
        Self {
            resolver,
            batch_size,
            parallel: false,
            progress: None,
        }
    }

    /// Resolve the rows of each page on the rayon thread pool
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Advance `progress` by the number of rows read
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run until the source is exhausted.
    ///
    /// Rows that fail to resolve are logged and dropped. Fetch, write and
    /// index failures abort the run.
    pub fn run<S, W>(&self, source: &mut S, sink: &mut W) -> Result<RunSummary>
    where
        S: CoordinateSource + ?Sized,
        W: ResolutionSink + ?Sized,
    {
        let limit = self.batch_size.get();
        let mut summary = RunSummary {
            pages: 0,
            fetches: 0,
            rows_read: 0,
            rows_written: 0,
            rows_failed: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        info!("Reverse geocoding coordinates in pages of {}...", limit);

        let mut offset: u64 = 0;
        loop {
            let page = source.fetch_page(offset, limit).map_err(|e| Error::Fetch {
                offset,
                source: e.into(),
            })?;
            summary.fetches += 1;

            if page.is_empty() {
                break;
            }

            info!("Processing page {} ({} rows)...", summary.pages, page.len());
            let outcome = self.resolve_page(offset, &page)?;

            sink.write_page(&outcome.rows, WriteMode::Append)
                .map_err(|e| Error::Write {
                    offset,
                    source: e.into(),
                })?;

            summary.pages += 1;
            summary.rows_read += page.len() as u64;
            summary.rows_written += outcome.rows.len() as u64;
            summary.rows_failed += outcome.failed;
            if let Some(pb) = &self.progress {
                pb.inc(page.len() as u64);
            }

            offset += limit as u64;
        }

        summary.finished_at = Utc::now();
        info!(
            "Finished after {} pages: {} rows written, {} rows dropped",
            summary.pages, summary.rows_written, summary.rows_failed
        );
        Ok(summary)
    }

    fn resolve_page(&self, offset: u64, page: &[Coordinate]) -> Result<PageOutcome> {
        let results: Vec<(u64, Result<Resolution>)> = if self.parallel {
            page.par_iter()
                .enumerate()
                .map(|(i, c)| (offset + i as u64, self.resolver.resolve_coordinate(*c)))
                .collect()
        } else {
            page.iter()
                .enumerate()
                .map(|(i, c)| (offset + i as u64, self.resolver.resolve_coordinate(*c)))
                .collect()
        };

        let mut outcome = PageOutcome {
            rows: Vec::with_capacity(results.len()),
            failed: 0,
        };

        for (row, result) in results {
            match result {
                Ok(resolution) => outcome.rows.push(LocatedRow::new(row, resolution)),
                Err(e) if e.is_row_local() => {
                    warn!("Dropping row {}: {}", row, e);
                    outcome.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Terrain;
    use crate::pip::BoundaryStore;
    use geo::{LineString, MultiPolygon, Polygon};

    fn resolver() -> Resolver {
        let mut store = BoundaryStore::default();
        store.push(
            "Bavaria",
            Some("Germany".to_string()),
            Terrain::Land,
            MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![(9.0, 47.0), (13.0, 47.0), (13.0, 50.0), (9.0, 50.0), (9.0, 47.0)]),
                vec![],
            )]),
        );
        Resolver::from_store(store).unwrap()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn munich(n: usize) -> Vec<Coordinate> {
        (0..n).map(|_| Coordinate::new(11.57, 48.08)).collect()
    }

    #[test]
    fn test_pages_until_empty_fetch() {
        let resolver = resolver();
        let mut source = MemorySource::new(munich(5));
        let mut sink = MemorySink::default();

        let summary = BatchRunner::new(&resolver, size(2))
            .run(&mut source, &mut sink)
            .unwrap();

        assert_eq!(source.offsets(), &[0, 2, 4, 6]);
        assert_eq!(summary.fetches, 4);
        assert_eq!(summary.pages, 3);
        assert_eq!(
            sink.pages().iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(summary.rows_written, 5);

        let rows: Vec<u64> = sink.rows().map(|r| r.row).collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
        assert!(sink
            .rows()
            .all(|r| r.province.as_deref() == Some("Bavaria") && r.country.as_deref() == Some("Germany")));
    }

    #[test]
    fn test_empty_input_fetches_once() {
        let resolver = resolver();
        let mut source = MemorySource::new(vec![]);
        let mut sink = MemorySink::default();

        let summary = BatchRunner::new(&resolver, size(10))
            .run(&mut source, &mut sink)
            .unwrap();

        assert_eq!(summary.fetches, 1);
        assert_eq!(summary.pages, 0);
        assert!(sink.pages().is_empty());
    }

    #[test]
    fn test_bad_rows_are_dropped() {
        let resolver = resolver();
        let mut rows = munich(4);
        rows[1] = Coordinate::new(f64::NAN, 48.0);
        rows[2] = Coordinate::new(11.0, 123.0);
        let mut source = MemorySource::new(rows);
        let mut sink = MemorySink::default();

        let summary = BatchRunner::new(&resolver, size(3))
            .run(&mut source, &mut sink)
            .unwrap();

        assert_eq!(summary.rows_read, 4);
        assert_eq!(summary.rows_failed, 2);
        assert_eq!(summary.rows_written, 2);
        let rows: Vec<u64> = sink.rows().map(|r| r.row).collect();
        assert_eq!(rows, vec![0, 3]);
        // A page with dropped rows is still written
        assert_eq!(sink.pages()[0].len(), 1);
    }

    #[test]
    fn test_unresolved_rows_are_written() {
        let resolver = resolver();
        let mut source = MemorySource::new(vec![Coordinate::new(-40.0, -40.0)]);
        let mut sink = MemorySink::default();

        BatchRunner::new(&resolver, size(5))
            .run(&mut source, &mut sink)
            .unwrap();

        let row = sink.rows().next().unwrap();
        assert_eq!(row.province, None);
        assert_eq!(row.country, None);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let resolver = resolver();
        let mut rows = munich(7);
        rows.push(Coordinate::new(0.0, 0.0));
        rows.push(Coordinate::new(f64::INFINITY, 0.0));

        let mut sequential = MemorySink::default();
        BatchRunner::new(&resolver, size(4))
            .run(&mut MemorySource::new(rows.clone()), &mut sequential)
            .unwrap();

        let mut parallel = MemorySink::default();
        BatchRunner::new(&resolver, size(4))
            .parallel(true)
            .run(&mut MemorySource::new(rows), &mut parallel)
            .unwrap();

        assert_eq!(sequential.pages(), parallel.pages());
    }

    #[test]
    fn test_fetch_failure_aborts() {
        struct Broken;
        impl CoordinateSource for Broken {
            fn fetch_page(&mut self, _offset: u64, _limit: usize) -> anyhow::Result<Vec<Coordinate>> {
                anyhow::bail!("connection reset")
            }
        }

        let resolver = resolver();
        let mut sink = MemorySink::default();
        let err = BatchRunner::new(&resolver, size(2))
            .run(&mut Broken, &mut sink)
            .unwrap_err();

        assert!(matches!(err, Error::Fetch { offset: 0, .. }));
        assert!(sink.pages().is_empty());
    }

    #[test]
    fn test_write_failure_aborts() {
        struct Full {
            writes: usize,
        }
        impl ResolutionSink for Full {
            fn write_page(&mut self, _rows: &[LocatedRow], _mode: WriteMode) -> anyhow::Result<()> {
                self.writes += 1;
                anyhow::bail!("disk full")
            }
        }

        let resolver = resolver();
        let mut source = MemorySource::new(munich(6));
        let mut sink = Full { writes: 0 };
        let err = BatchRunner::new(&resolver, size(2))
            .run(&mut source, &mut sink)
            .unwrap_err();

        assert!(matches!(err, Error::Write { offset: 0, .. }));
        assert_eq!(sink.writes, 1);
        assert_eq!(source.offsets(), &[0]);
    }

    #[test]
    fn test_boxed_collaborators() {
        let resolver = resolver();
        let mut source: Box<dyn CoordinateSource> = Box::new(MemorySource::new(munich(3)));
        let mut sink: Box<dyn ResolutionSink> = Box::new(MemorySink::default());

        let summary = BatchRunner::new(&resolver, size(2))
            .run(&mut source, &mut sink)
            .unwrap();
        assert_eq!(summary.rows_written, 3);
    }
}
