//! Headerless CSV tables with file locking.
//!
//! Every data file is a plain comma-separated table, one record per line,
//! no header. Tables are either rewritten whole (atomically, via temp file and
//! rename) or appended to under an exclusive lock.

use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Read every row of a table with a shared lock.
///
/// A missing file is an empty table. A malformed line is a validation error
/// naming the line; rows are never silently dropped.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(&file);

    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                let _ = file.unlock();
                return Err(classify(path, e));
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn classify(path: &Path, e: csv::Error) -> Error {
    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
        return Error::Csv(e);
    }
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    Error::Validation(format!("{}: line {}: {}", path.display(), line, e))
}

/// Rewrite a whole table atomically
///
/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the original. A failed write leaves the old table untouched.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "table path missing parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(temp.as_file());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Rewrote {:?} with {} rows", path, rows.len());
    Ok(())
}

/// Append a single row under an exclusive lock
pub fn append_row<T: Serialize>(path: &Path, row: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(&file);
        writer.serialize(row)?;
        writer.flush()?;
    }

    file.unlock()?;
    Ok(())
}

/// Exclusive advisory lock serialising read-modify-write cycles on one table.
///
/// The lock lives on a `<table>.lock` sidecar because the table itself is
/// replaced by rename on every rewrite. Released on drop.
pub struct TableLock {
    file: File,
    path: PathBuf,
}

impl TableLock {
    pub fn acquire(table: &Path) -> Result<Self> {
        let mut name = table.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(Self { file, path })
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release {:?}: {}", self.path, e);
        }
    }
}

/// Load a table, modify it, and rewrite it under the table lock
///
/// The closure sees the current on-disk rows. If it returns an error nothing
/// is written.
pub fn update_rows<T, F, R>(path: &Path, f: F) -> Result<R>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut Vec<T>) -> Result<R>,
{
    let _lock = TableLock::acquire(path)?;
    let mut rows = read_rows::<T>(path)?;
    let result = f(&mut rows)?;
    write_rows(path, &rows)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
        count: u32,
        note: Option<String>,
    }

    fn row(name: &str, count: u32) -> Row {
        Row {
            name: name.into(),
            count,
            note: None,
        }
    }

    #[test]
    fn test_missing_table_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let rows: Vec<Row> = read_rows(&temp_dir.path().join("nope.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_rows_are_headerless() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("rows.csv");

        write_rows(&path, &[row("a", 1), row("b", 2)]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a,1,\nb,2,\n");
        let rows: Vec<Row> = read_rows(&path).unwrap();
        assert_eq!(rows, vec![row("a", 1), row("b", 2)]);
    }

    #[test]
    fn test_append_preserves_existing_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("log.csv");

        append_row(&path, &row("first", 1)).unwrap();
        append_row(&path, &row("second", 2)).unwrap();

        let rows: Vec<Row> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "second");
    }

    #[test]
    fn test_malformed_line_is_validation_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.csv");
        std::fs::write(&path, "a,1,\nb,not-a-number,\n").unwrap();

        let result = read_rows::<Row>(&path);
        match result {
            Err(Error::Validation(msg)) => assert!(msg.contains("line 2"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_update_skips_write_on_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("rows.csv");
        write_rows(&path, &[row("a", 1)]).unwrap();

        let result: Result<()> = update_rows(&path, |rows: &mut Vec<Row>| {
            rows.clear();
            Err(Error::Precondition("nope".into()))
        });
        assert!(result.is_err());

        let rows: Vec<Row> = read_rows(&path).unwrap();
        assert_eq!(rows, vec![row("a", 1)]);
    }

    #[test]
    fn test_no_stray_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("rows.csv");

        update_rows(&path, |rows: &mut Vec<Row>| {
            rows.push(row("a", 1));
            Ok(())
        })
        .unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != "rows.csv" && n != "rows.csv.lock")
            .collect();
        assert!(extras.is_empty(), "unexpected files: {:?}", extras);
    }
}
