//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use docdir_audit::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DdrError, Result};

// Sources
#[cfg(feature = "sqlite")]
pub use crate::source::sqlite::SqliteSource;
pub use crate::source::{DocumentRecord, EntityRef, MemorySource, RecordSet, RecordSource};

// Reconciliation
pub use crate::reconcile::checker::{ExistenceChecker, Presence, Strategy};
pub use crate::reconcile::engine::{EngineOptions, ReconciliationEngine, RunPhase};
pub use crate::reconcile::index::{DirectoryIndex, IndexConfig, IndexOutcome};
pub use crate::reconcile::report::{ExistsFlag, ReconciledRow, RunReport, RunSummary};

// Sinks
pub use crate::export::csv::CsvFile;
pub use crate::export::{RowBuffer, RowSink};
pub use crate::logger::jsonl::{JsonlConfig, JsonlWriter};
pub use crate::logger::run_log::RunLogFile;
pub use crate::logger::{LineBuffer, LogSink};
