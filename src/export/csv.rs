//! CSV report: the query's columns in order, then `EXISTS` (`Y`/`N`).
//!
//! The file is written next to its destination under a temporary name and
//! renamed into place only once every row is flushed, so a failed run never
//! leaves a partial report behind.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{DdrError, Result};
use crate::export::RowSink;
use crate::reconcile::report::{EXISTS_COLUMN, ReconciledRow};

/// Write the header and rows to any writer.
pub fn write_csv<W: Write>(writer: W, columns: &[String], rows: &[ReconciledRow]) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(writer);

    let header = columns
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(EXISTS_COLUMN));
    csv.write_record(header)?;

    for row in rows {
        let record = row
            .record
            .fields
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(row.exists.as_str()));
        csv.write_record(record)?;
    }

    csv.flush().map_err(|e| DdrError::CsvExport {
        details: format!("flush: {e}"),
    })?;
    Ok(())
}

/// CSV report file with atomic replacement.
#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl RowSink for CsvFile {
    fn write_rows(&mut self, columns: &[String], rows: &[ReconciledRow]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| DdrError::io(parent, source))?;
        }

        let tmp = self.tmp_path();
        let file = File::create(&tmp).map_err(|source| DdrError::io(&tmp, source))?;
        if let Err(err) = write_csv(BufWriter::new(file), columns, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, &self.path).map_err(|source| DdrError::io(&self.path, source))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
