//! Run report: per-record rows, counters, and the human-readable run log.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reconcile::checker::{LookupMethod, Presence, Probe};
use crate::reconcile::index::DirectoryIndex;
use crate::source::DocumentRecord;

/// Marker line closing a run that reached the end of the record loop.
pub const SUCCESS_MARKER: &str = "RUN COMPLETE";
/// Prefix of the single line describing a fatal error.
pub const FAILURE_MARKER: &str = "RUN FAILED";
/// Header of the derived column appended to every CSV row.
pub const EXISTS_COLUMN: &str = "EXISTS";

/// Derived existence flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExistsFlag {
    Yes,
    No,
}

impl ExistsFlag {
    /// CSV literal: `Y` or `N`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Y",
            Self::No => "N",
        }
    }
}

/// How a row's flag was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Stored path was NULL or blank; nothing was checked.
    NoPath,
    Checked {
        presence: Presence,
        method: LookupMethod,
    },
}

/// A fetched record plus its derived `EXISTS` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledRow {
    pub record: DocumentRecord,
    pub exists: ExistsFlag,
    pub outcome: RowOutcome,
}

impl ReconciledRow {
    pub fn skipped(record: DocumentRecord) -> Self {
        Self {
            record,
            exists: ExistsFlag::No,
            outcome: RowOutcome::NoPath,
        }
    }

    pub fn checked(record: DocumentRecord, probe: Probe) -> Self {
        let exists = if probe.presence.exists() {
            ExistsFlag::Yes
        } else {
            ExistsFlag::No
        };
        Self {
            record,
            exists,
            outcome: RowOutcome::Checked {
                presence: probe.presence,
                method: probe.method,
            },
        }
    }

    /// The run-log line for this row.
    pub fn log_line(&self) -> String {
        let record = &self.record;
        let subject = match &record.event_type {
            Some(event_type) => format!("{}, event type {event_type}", record.entity.label()),
            None => record.entity.label(),
        };
        let path = record.doc_dir.as_deref().unwrap_or_default();

        match &self.outcome {
            RowOutcome::NoPath => format!(
                "record {} ({subject}): {EXISTS_COLUMN}={} [no path]",
                record.id,
                self.exists.as_str()
            ),
            RowOutcome::Checked { presence, method } => {
                let how = match presence {
                    Presence::Unreadable { details } => {
                        format!("{}, unreadable: {details}", method.label())
                    }
                    Presence::Found | Presence::Missing => method.label().to_string(),
                };
                format!(
                    "record {} ({subject}): {EXISTS_COLUMN}={} [{how}] {path}",
                    record.id,
                    self.exists.as_str()
                )
            }
        }
    }
}

/// Snapshot of the index used for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub entries: usize,
    pub dirs_scanned: usize,
    pub opaque: usize,
    pub issues: usize,
    pub elapsed_ms: u64,
}

impl IndexSummary {
    pub fn of(index: &DirectoryIndex) -> Self {
        Self {
            entries: index.len(),
            dirs_scanned: index.dirs_scanned(),
            opaque: index.opaque_count(),
            issues: index.issues().len(),
            elapsed_ms: duration_ms(index.elapsed()),
        }
    }
}

/// Aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total: usize,
    /// `EXISTS = Y`.
    pub found: usize,
    /// `EXISTS = N`, including records without a path.
    pub missing: usize,
    pub no_path: usize,
    /// Subset of `missing` whose path could not be examined.
    pub unreadable: usize,
    pub via_index: usize,
    pub via_stat: usize,
}

/// Machine-readable summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub elapsed_ms: u64,
    pub root: Option<PathBuf>,
    pub strategy: String,
    pub index: Option<IndexSummary>,
    pub counts: RunCounts,
    pub fatal: Option<String>,
}

/// Everything a run produced, handed to the sinks at the end.
#[derive(Debug, Clone)]
pub struct RunReport {
    started_at: DateTime<Utc>,
    elapsed: Duration,
    root: Option<PathBuf>,
    strategy: String,
    index: Option<IndexSummary>,
    counts: RunCounts,
    columns: Vec<String>,
    rows: Vec<ReconciledRow>,
    log_lines: Vec<String>,
    fatal: Option<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            root: None,
            strategy: "direct-stat".to_string(),
            index: None,
            counts: RunCounts::default(),
            columns: Vec::new(),
            rows: Vec::new(),
            log_lines: Vec::new(),
            fatal: None,
        }
    }

    /// Record the root decision and log it.
    pub fn set_root(&mut self, root: Option<&Path>) {
        self.root = root.map(Path::to_path_buf);
        let line = root.map_or_else(
            || "Document root: not configured".to_string(),
            |r| format!("Document root: {}", r.display()),
        );
        self.log_lines.push(line);
    }

    pub fn set_strategy(&mut self, label: &str, index: Option<IndexSummary>) {
        self.strategy = label.to_string();
        let line = match &index {
            Some(s) => format!(
                "Strategy: {label} ({} entries in {} directories, {} opaque, {} issues, {} ms)",
                s.entries, s.dirs_scanned, s.opaque, s.issues, s.elapsed_ms
            ),
            None => format!("Strategy: {label}"),
        };
        self.index = index;
        self.log_lines.push(line);
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.log_lines.push(line.into());
    }

    /// Count a row, log it, and keep it for export.
    pub fn push_row(&mut self, row: ReconciledRow) {
        self.counts.total += 1;
        match row.exists {
            ExistsFlag::Yes => self.counts.found += 1,
            ExistsFlag::No => self.counts.missing += 1,
        }
        match &row.outcome {
            RowOutcome::NoPath => self.counts.no_path += 1,
            RowOutcome::Checked { presence, method } => {
                if matches!(presence, Presence::Unreadable { .. }) {
                    self.counts.unreadable += 1;
                }
                match method {
                    LookupMethod::Index => self.counts.via_index += 1,
                    LookupMethod::Stat => self.counts.via_stat += 1,
                }
            }
        }
        self.log_lines.push(row.log_line());
        self.rows.push(row);
    }

    /// Close the log with the success marker.
    pub fn complete(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        let c = &self.counts;
        let line = format!(
            "{SUCCESS_MARKER}: {} records, {} found, {} missing ({} without a path, {} unreadable)",
            c.total, c.found, c.missing, c.no_path, c.unreadable
        );
        self.log_lines.push(line);
    }

    /// Close the log with the single fatal-error line.
    pub fn fail(&mut self, message: &str, elapsed: Duration) {
        self.elapsed = elapsed;
        self.fatal = Some(message.to_string());
        self.log_lines.push(format!("{FAILURE_MARKER}: {message}"));
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ReconciledRow] {
        &self.rows
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }

    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.fatal.is_none() && self.log_lines.last().is_some_and(|l| l.starts_with(SUCCESS_MARKER))
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            started_at: self
                .started_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            elapsed_ms: duration_ms(self.elapsed),
            root: self.root.clone(),
            strategy: self.strategy.clone(),
            index: self.index.clone(),
            counts: self.counts.clone(),
            fatal: self.fatal.clone(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
