//! Plain-text run log: the operator-facing audit trail of one run.
//!
//! The file is truncated when the sink is opened (run start) and written in one
//! pass at run end, whether the run completed or failed.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{DdrError, Result};
use crate::logger::LogSink;

/// Run log backed by a text file.
#[derive(Debug)]
pub struct RunLogFile {
    path: PathBuf,
    file: Option<File>,
}

impl RunLogFile {
    /// Create (or truncate) the log file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| DdrError::io(parent, source))?;
        }
        let file = File::create(&path).map_err(|source| DdrError::io(&path, source))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for RunLogFile {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::create(&self.path).map_err(|source| DdrError::io(&self.path, source))?,
        };
        let mut out = BufWriter::new(file);
        for line in lines {
            writeln!(out, "{line}").map_err(|source| DdrError::io(&self.path, source))?;
        }
        out.flush().map_err(|source| DdrError::io(&self.path, source))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
