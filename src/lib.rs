#![forbid(unsafe_code)]

//! DocDir audit (ddr): reconcile the document paths stored in a practice
//! database against what is actually on disk.
//!
//! A run reads the configured document root and every document record, checks
//! each stored path, and writes a CSV report (the record's columns plus an
//! `EXISTS` flag) alongside a human-readable run log.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use docdir_audit::prelude::*;
//!
//! # fn main() -> docdir_audit::core::errors::Result<()> {
//! let config = Config::load(None)?;
//! let source = SqliteSource::open(&config.database)?;
//! let mut engine = ReconciliationEngine::new(source, EngineOptions::from(&config.reconcile));
//! let report = engine.run(
//!     &mut CsvFile::new(&config.output.csv_path),
//!     &mut RunLogFile::create(&config.output.log_path)?,
//! )?;
//! println!("{} of {} documents found", report.counts().found, report.counts().total);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod export;
pub mod logger;
pub mod reconcile;
pub mod source;
