//! SQLite table input and output.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::WriterBuilder;
use rusqlite::{params, types::ValueRef, Connection};
use tracing::info;

use super::{CoordinateSource, ResolutionSink, WriteMode};
use crate::models::{Coordinate, LocatedRow};

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_table(table: &str) -> Result<()> {
    if !is_valid_identifier(table) {
        bail!("invalid SQLite table name {:?}", table);
    }
    Ok(())
}

/// Numeric text is parsed; NULL, blobs and other text become NaN and are
/// rejected per row
fn read_coordinate(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Real(v) => v,
        ValueRef::Integer(v) => v as f64,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Pages through the `longitude` and `latitude` columns of a table in
/// `rowid` order
pub struct SqliteSource {
    conn: Connection,
    query: String,
}

impl SqliteSource {
    pub fn open(path: &Path, table: &str) -> Result<Self> {
        check_table(table)?;
        let conn = Connection::open(path).with_context(|| format!("failed to open {:?}", path))?;
        info!("Reading coordinates from {:?} table {}", path, table);

        Ok(Self {
            conn,
            query: format!(
                "SELECT longitude, latitude FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
                table
            ),
        })
    }
}

impl CoordinateSource for SqliteSource {
    fn fetch_page(&mut self, offset: u64, limit: usize) -> Result<Vec<Coordinate>> {
        let mut stmt = self.conn.prepare_cached(&self.query)?;
        let rows = stmt.query_map(params![i64::try_from(limit)?, i64::try_from(offset)?], |row| {
            Ok(Coordinate::new(
                read_coordinate(row.get_ref(0)?),
                read_coordinate(row.get_ref(1)?),
            ))
        })?;

        let mut page = Vec::with_capacity(limit);
        for row in rows {
            page.push(row?);
        }
        Ok(page)
    }
}

/// Writes `(row, province, country)` records, one transaction per page
pub struct SqliteSink {
    conn: Connection,
    table: String,
}

impl SqliteSink {
    /// Open `path` and (re)create an empty output table
    pub fn create(path: &Path, table: &str) -> Result<Self> {
        check_table(table)?;
        let conn = Connection::open(path).with_context(|| format!("failed to open {:?}", path))?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (row INTEGER NOT NULL, province TEXT, country TEXT);"
        ))?;
        info!("Writing results to {:?} table {}", path, table);

        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }
}

impl ResolutionSink for SqliteSink {
    fn write_page(&mut self, rows: &[LocatedRow], mode: WriteMode) -> Result<()> {
        let tx = self.conn.transaction()?;
        if mode == WriteMode::Replace {
            tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        }
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (row, province, country) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for row in rows {
                stmt.execute(params![i64::try_from(row.row)?, row.province, row.country])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Read back the rows written by a [`SqliteSink`], in row order
pub fn read_results(path: &Path, table: &str) -> Result<Vec<LocatedRow>> {
    check_table(table)?;
    let conn = Connection::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut stmt = conn.prepare(&format!(
        "SELECT row, province, country FROM {} ORDER BY row",
        table
    ))?;
    let rows = stmt.query_map([], |r| {
        Ok(LocatedRow {
            row: r.get::<_, i64>(0)? as u64,
            province: r.get(1)?,
            country: r.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Write `province` and `country` back onto the input table.
///
/// Result row `n` belongs to the `n`-th input row in `rowid` order, the order
/// [`SqliteSource`] pages in. Missing columns are added; rows without a
/// result are left NULL. Returns the number of rows updated.
pub fn merge_into_table(path: &Path, table: &str, results: &[LocatedRow]) -> Result<u64> {
    check_table(table)?;
    info!("Merging {} results into table {}...", results.len(), table);

    let mut conn = Connection::open(path).with_context(|| format!("failed to open {:?}", path))?;

    let columns = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt.query_map([], |r| r.get::<_, String>(1))?;
        names.collect::<rusqlite::Result<Vec<_>>>()?
    };
    if columns.is_empty() {
        bail!("table {} does not exist", table);
    }

    let tx = conn.transaction()?;
    for column in ["province", "country"] {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            tx.execute(&format!("ALTER TABLE {} ADD COLUMN {} TEXT", table, column), [])?;
        }
    }
    tx.execute(&format!("UPDATE {} SET province = NULL, country = NULL", table), [])?;

    let rowids = {
        let mut stmt = tx.prepare(&format!("SELECT rowid FROM {} ORDER BY rowid", table))?;
        let ids = stmt.query_map([], |r| r.get::<_, i64>(0))?;
        ids.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut merged = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "UPDATE {} SET province = ?1, country = ?2 WHERE rowid = ?3",
            table
        ))?;
        for result in results {
            let Some(rowid) = usize::try_from(result.row).ok().and_then(|i| rowids.get(i)) else {
                continue;
            };
            stmt.execute(params![result.province, result.country, rowid])?;
            merged += 1;
        }
    }
    tx.commit()?;

    info!("Merged results into {} of {} rows", merged, rowids.len());
    Ok(merged)
}

/// Export a whole table as CSV with a header row. NULLs become empty cells.
pub fn export_table_csv(path: &Path, table: &str, output: &Path) -> Result<u64> {
    check_table(table)?;
    let conn = Connection::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table))?;
    let header: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let file = File::create(output).with_context(|| format!("failed to create {:?}", output))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(&header)?;

    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(header.len());
        for i in 0..header.len() {
            record.push(match row.get_ref(i)? {
                ValueRef::Null | ValueRef::Blob(_) => String::new(),
                ValueRef::Integer(v) => v.to_string(),
                ValueRef::Real(v) => v.to_string(),
                ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            });
        }
        writer.write_record(&record)?;
        count += 1;
    }
    writer.flush()?;

    info!("Exported {} rows of {} to {:?}", count, table, output);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;

    fn seed(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE points (id TEXT, longitude REAL, latitude REAL);
             INSERT INTO points VALUES ('a', -77.197457, 38.81688);
             INSERT INTO points VALUES ('b', 11, 48);
             INSERT INTO points VALUES ('c', NULL, 48.0);",
        )
        .unwrap();
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("points"));
        assert!(is_valid_identifier("_geo_2024"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2points"));
        assert!(!is_valid_identifier("points; DROP TABLE x"));
        assert!(!is_valid_identifier("geo-points"));
    }

    #[test]
    fn test_source_pages_in_rowid_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.db");
        seed(&path);

        let mut source = SqliteSource::open(&path, "points").unwrap();
        let first = source.fetch_page(0, 2).unwrap();
        assert_eq!(
            first,
            vec![Coordinate::new(-77.197457, 38.81688), Coordinate::new(11.0, 48.0)]
        );

        let second = source.fetch_page(2, 2).unwrap();
        assert_eq!(second.len(), 1);
        assert!(second[0].longitude.is_nan());

        assert!(source.fetch_page(4, 2).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.db");
        assert!(SqliteSource::open(&path, "points where 1=1").is_err());
        assert!(SqliteSink::create(&path, "out;").is_err());
    }

    #[test]
    fn test_missing_table_fails_on_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let mut source = SqliteSource::open(&path, "points").unwrap();
        assert!(source.fetch_page(0, 10).is_err());
    }

    #[test]
    fn test_sink_appends_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let mut sink = SqliteSink::create(&path, "located").unwrap();

        sink.write_page(
            &[
                LocatedRow::new(0, Resolution::new("Virginia", Some("United States of America".into()))),
                LocatedRow::new(1, Resolution::unresolved()),
            ],
            WriteMode::Append,
        )
        .unwrap();
        sink.write_page(&[LocatedRow::new(2, Resolution::new("North Sea", None))], WriteMode::Append)
            .unwrap();

        let read_back = |conn: &Connection| -> Vec<(i64, Option<String>, Option<String>)> {
            let mut stmt = conn
                .prepare("SELECT row, province, country FROM located ORDER BY row")
                .unwrap();
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .unwrap()
                .collect::<rusqlite::Result<Vec<_>>>()
                .unwrap();
            rows
        };

        let conn = Connection::open(&path).unwrap();
        let rows = read_back(&conn);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], (0, Some("Virginia".into()), Some("United States of America".into())));
        assert_eq!(rows[1], (1, None, None));
        assert_eq!(rows[2], (2, Some("North Sea".into()), None));

        sink.write_page(&[LocatedRow::new(5, Resolution::unresolved())], WriteMode::Replace)
            .unwrap();
        assert_eq!(read_back(&conn), vec![(5, None, None)]);

        // Recreating the sink starts from an empty table
        drop(sink);
        SqliteSink::create(&path, "located").unwrap();
        assert!(read_back(&conn).is_empty());
    }

    #[test]
    fn test_numeric_text_coordinates_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE points (longitude, latitude);
             INSERT INTO points VALUES ('11.57', ' 48.08 ');
             INSERT INTO points VALUES ('east', '48.0');",
        )
        .unwrap();

        let mut source = SqliteSource::open(&path, "points").unwrap();
        let page = source.fetch_page(0, 10).unwrap();
        assert_eq!(page[0], Coordinate::new(11.57, 48.08));
        assert!(page[1].longitude.is_nan());
        assert_eq!(page[1].latitude, 48.0);
    }

    #[test]
    fn test_merge_results_back_into_input_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        seed(&path);
        // A gap in rowids must not shift the match
        Connection::open(&path)
            .unwrap()
            .execute_batch("DELETE FROM points WHERE id = 'a'; INSERT INTO points VALUES ('d', 0.0, 0.0);")
            .unwrap();

        let mut sink = SqliteSink::create(&path, "located").unwrap();
        sink.write_page(
            &[
                LocatedRow::new(0, Resolution::new("Bavaria", Some("Germany".into()))),
                LocatedRow::new(2, Resolution::new("Gulf of Guinea", None)),
            ],
            WriteMode::Append,
        )
        .unwrap();
        drop(sink);

        let results = read_results(&path, "located").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].row, 2);

        assert_eq!(merge_into_table(&path, "points", &results).unwrap(), 2);

        let conn = Connection::open(&path).unwrap();
        let mut stmt = conn
            .prepare("SELECT id, province, country FROM points ORDER BY rowid")
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<(String, Option<String>, Option<String>)>>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("b".to_string(), Some("Bavaria".to_string()), Some("Germany".to_string())),
                ("c".to_string(), None, None),
                ("d".to_string(), Some("Gulf of Guinea".to_string()), None),
            ]
        );

        // Merging again replaces earlier values instead of adding columns twice
        let again = vec![LocatedRow::new(1, Resolution::unresolved())];
        assert_eq!(merge_into_table(&path, "points", &again).unwrap(), 1);

        let out = dir.path().join("data_out.csv");
        assert_eq!(export_table_csv(&path, "points", &out).unwrap(), 3);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "id,longitude,latitude,province,country\nb,11,48,,\nc,,48,,\nd,0,0,,\n"
        );
    }

    #[test]
    fn test_merge_into_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        assert!(merge_into_table(&path, "points", &[]).is_err());
    }
}
