//! In-memory collaborators, used for tests and embedding.

use super::{CoordinateSource, ResolutionSink, WriteMode};
use crate::models::{Coordinate, LocatedRow};

/// Serves pages out of a vector and records every requested offset
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<Coordinate>,
    offsets: Vec<u64>,
}

impl MemorySource {
    pub fn new(rows: Vec<Coordinate>) -> Self {
        Self {
            rows,
            offsets: Vec::new(),
        }
    }

    /// Offsets of every fetch so far, in call order
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl CoordinateSource for MemorySource {
    fn fetch_page(&mut self, offset: u64, limit: usize) -> anyhow::Result<Vec<Coordinate>> {
        self.offsets.push(offset);

        let start = usize::try_from(offset)?.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        Ok(self.rows[start..end].to_vec())
    }
}

/// Keeps written pages as they were received
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pages: Vec<Vec<LocatedRow>>,
}

impl MemorySink {
    pub fn pages(&self) -> &[Vec<LocatedRow>] {
        &self.pages
    }

    pub fn rows(&self) -> impl Iterator<Item = &LocatedRow> {
        self.pages.iter().flatten()
    }
}

impl ResolutionSink for MemorySink {
    fn write_page(&mut self, rows: &[LocatedRow], mode: WriteMode) -> anyhow::Result<()> {
        if mode == WriteMode::Replace {
            self.pages.clear();
        }
        self.pages.push(rows.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;

    #[test]
    fn test_source_pages_past_end() {
        let mut source = MemorySource::new(vec![Coordinate::new(1.0, 2.0); 3]);
        assert_eq!(source.fetch_page(0, 2).unwrap().len(), 2);
        assert_eq!(source.fetch_page(2, 2).unwrap().len(), 1);
        assert!(source.fetch_page(4, 2).unwrap().is_empty());
        assert_eq!(source.offsets(), &[0, 2, 4]);
    }

    #[test]
    fn test_sink_replace_discards_previous_pages() {
        let mut sink = MemorySink::default();
        let row = |n| LocatedRow::new(n, Resolution::unresolved());

        sink.write_page(&[row(0), row(1)], WriteMode::Append).unwrap();
        sink.write_page(&[row(2)], WriteMode::Append).unwrap();
        assert_eq!(sink.rows().count(), 3);

        sink.write_page(&[row(9)], WriteMode::Replace).unwrap();
        assert_eq!(sink.pages().len(), 1);
        assert_eq!(sink.rows().next().unwrap().row, 9);
    }
}
