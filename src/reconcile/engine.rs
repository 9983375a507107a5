//! The reconciliation pass.
//!
//! `Init → RootCheck → (IndexBuild) → RecordLoop → Finalize`, once per run.
//! Fatal errors stop the pass, leave a single failure line at the end of the
//! run log, and skip the CSV export entirely.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel as channel;

use crate::core::config::ReconcileConfig;
use crate::core::errors::{DdrError, Result};
use crate::core::paths;
use crate::export::RowSink;
use crate::logger::LogSink;
use crate::logger::jsonl::{EventLog, EventType, LogEntry, Severity, emit};
use crate::reconcile::checker::{ExistenceChecker, Presence};
use crate::reconcile::index::{DirectoryIndex, IndexConfig, IndexOutcome};
use crate::reconcile::report::{IndexSummary, ReconciledRow, RunReport};
use crate::reconcile::resolver::{self, ResolvedPath};
use crate::source::{DocumentRecord, RecordSource};

/// Below this many records the loop stays on the calling thread.
const MIN_RECORDS_FOR_POOL: usize = 64;

/// Where the engine is in its single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    RootCheck,
    IndexBuild,
    RecordLoop,
    Finalize,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::RootCheck => "root_check",
            Self::IndexBuild => "index_build",
            Self::RecordLoop => "record_loop",
            Self::Finalize => "finalize",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Knobs that shape a run without changing its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub use_index: bool,
    pub parallelism: usize,
    pub max_index_entries: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for EngineOptions {
    fn from(cfg: &ReconcileConfig) -> Self {
        Self {
            use_index: cfg.use_index,
            parallelism: cfg.parallelism,
            max_index_entries: cfg.max_index_entries,
        }
    }
}

/// Drives one reconciliation run over a record source.
pub struct ReconciliationEngine<S: RecordSource> {
    source: S,
    options: EngineOptions,
    events: Option<EventLog>,
    config_hash: Option<String>,
    phase: RunPhase,
}

impl<S: RecordSource> ReconciliationEngine<S> {
    pub fn new(source: S, options: EngineOptions) -> Self {
        Self {
            source,
            options,
            events: None,
            config_hash: None,
            phase: RunPhase::Init,
        }
    }

    /// Mirror run milestones to a JSONL event log.
    #[must_use]
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run the full pass, writing rows to `rows` and the run log to `log`.
    ///
    /// On a fatal error the log still receives everything accumulated so far
    /// plus one failure line; `rows` is never touched.
    pub fn run(&mut self, rows: &mut dyn RowSink, log: &mut dyn LogSink) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new();
        self.phase = RunPhase::Init;

        let mut entry = LogEntry::new(EventType::RunStart, Severity::Info)
            .with_path(self.source.describe())
            .with_details(format!(
                "csv={} log={} parallelism={}",
                rows.describe(),
                log.describe(),
                self.options.parallelism
            ));
        entry.config_hash.clone_from(&self.config_hash);
        self.emit(&entry);

        let outcome = self.reconcile(&mut report).and_then(|()| {
            self.phase = RunPhase::Finalize;
            rows.write_rows(report.columns(), report.rows())
        });

        match outcome {
            Ok(()) => {
                report.complete(start.elapsed());
                if let Err(err) = log.write_lines(report.log_lines()) {
                    return Err(self.fail_event(err));
                }
                self.phase = RunPhase::Done;

                let mut entry = LogEntry::new(EventType::RunComplete, Severity::Info);
                entry.ok = Some(true);
                entry.count = Some(report.counts().total as u64);
                entry.duration_ms = Some(report.summary().elapsed_ms);
                entry.strategy = Some(report.strategy().to_string());
                entry.summary = serde_json::to_value(report.summary()).ok();
                self.emit(&entry);
                Ok(report)
            }
            Err(err) => {
                report.fail(&err.to_string(), start.elapsed());
                if let Err(log_err) = log.write_lines(report.log_lines()) {
                    eprintln!("[DDR-LOG] could not write run log: {log_err}");
                }
                Err(self.fail_event(err))
            }
        }
    }

    fn reconcile(&mut self, report: &mut RunReport) -> Result<()> {
        let root = self.source.root_directory()?;

        self.phase = RunPhase::RootCheck;
        let root = self.check_root(root.as_deref(), report)?;

        let checker = match &root {
            Some(root) if self.options.use_index => {
                self.phase = RunPhase::IndexBuild;
                self.build_checker(root, report)?
            }
            Some(_) => {
                report.note("Index disabled by configuration; checking every record directly");
                report.set_strategy(ExistenceChecker::direct().strategy().label(), None);
                ExistenceChecker::direct()
            }
            None => {
                report.set_strategy(ExistenceChecker::direct().strategy().label(), None);
                ExistenceChecker::direct()
            }
        };

        self.phase = RunPhase::RecordLoop;
        let set = self.source.fetch_records()?;
        report.set_columns(set.columns);
        let rows = self.check_records(set.records, root.as_deref(), &checker)?;
        for row in rows {
            report.push_row(row);
        }
        Ok(())
    }

    /// Blank root: no index. Non-blank root: must be an existing directory.
    fn check_root(&self, raw: Option<&str>, report: &mut RunReport) -> Result<Option<PathBuf>> {
        let root = match raw {
            Some(value) if !paths::is_blank(raw) => PathBuf::from(value),
            _ => {
                report.set_root(None);
                self.emit(
                    &LogEntry::new(EventType::RootCheck, Severity::Info)
                        .with_details("document root not configured"),
                );
                return Ok(None);
            }
        };
        report.set_root(Some(&root));

        let meta = fs::metadata(&root).map_err(|source| match source.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => DdrError::RootMissing {
                path: root.clone(),
            },
            _ => DdrError::io(&root, source),
        })?;
        if !meta.is_dir() {
            return Err(DdrError::RootNotDirectory { path: root });
        }

        let mut entry = LogEntry::new(EventType::RootCheck, Severity::Info)
            .with_path(root.display().to_string());
        entry.ok = Some(true);
        self.emit(&entry);
        Ok(Some(root))
    }

    fn build_checker(&self, root: &Path, report: &mut RunReport) -> Result<ExistenceChecker> {
        let outcome = DirectoryIndex::build(&IndexConfig {
            root: root.to_path_buf(),
            parallelism: self.options.parallelism,
            max_entries: self.options.max_index_entries,
        })?;

        match outcome {
            IndexOutcome::Built(index) => {
                for issue in index.issues() {
                    report.note(format!(
                        "Index: could not read {}: {}",
                        issue.path.display(),
                        issue.details
                    ));
                }
                let summary = IndexSummary::of(&index);
                let checker = ExistenceChecker::indexed(Arc::new(index));
                report.set_strategy(checker.strategy().label(), Some(summary.clone()));

                let mut entry = LogEntry::new(EventType::IndexBuilt, Severity::Info)
                    .with_path(root.display().to_string());
                entry.count = Some(summary.entries as u64);
                entry.duration_ms = Some(summary.elapsed_ms);
                if summary.issues > 0 || summary.opaque > 0 {
                    entry.severity = Severity::Warning;
                    entry.details = Some(format!(
                        "{} unreadable entries, {} opaque regions",
                        summary.issues, summary.opaque
                    ));
                }
                self.emit(&entry);
                Ok(checker)
            }
            IndexOutcome::Abandoned {
                entries_seen,
                elapsed,
            } => {
                report.note(format!(
                    "Index abandoned after {entries_seen} entries (limit {}); checking every record directly",
                    self.options.max_index_entries
                ));
                report.set_strategy(ExistenceChecker::direct().strategy().label(), None);

                let mut entry = LogEntry::new(EventType::IndexAbandoned, Severity::Warning)
                    .with_path(root.display().to_string());
                entry.count = Some(entries_seen as u64);
                entry.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
                self.emit(&entry);
                Ok(ExistenceChecker::direct())
            }
        }
    }

    /// Check every record, returning rows in fetch order.
    fn check_records(
        &self,
        records: Vec<DocumentRecord>,
        root: Option<&Path>,
        checker: &ExistenceChecker,
    ) -> Result<Vec<ReconciledRow>> {
        let workers = self.options.parallelism.max(1);
        let events = self.events.as_ref();
        if workers == 1 || records.len() < MIN_RECORDS_FOR_POOL {
            return Ok(records
                .into_iter()
                .map(|record| reconcile_record(record, root, checker, events))
                .collect());
        }

        let total = records.len();
        let (job_tx, job_rx) = channel::unbounded::<(usize, DocumentRecord)>();
        let (row_tx, row_rx) = channel::unbounded::<(usize, ReconciledRow)>();
        for job in records.into_iter().enumerate() {
            job_tx.send(job).map_err(|_| DdrError::ChannelClosed {
                component: "record loop",
            })?;
        }
        drop(job_tx);

        let mut slots: Vec<Option<ReconciledRow>> = vec![None; total];
        thread::scope(|scope| {
            for _ in 0..workers.min(total) {
                let job_rx = job_rx.clone();
                let row_tx = row_tx.clone();
                scope.spawn(move || {
                    for (position, record) in &job_rx {
                        let row = reconcile_record(record, root, checker, events);
                        if row_tx.send((position, row)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(row_tx);

            for (position, row) in &row_rx {
                slots[position] = Some(row);
            }
        });

        let rows: Vec<ReconciledRow> = slots.into_iter().flatten().collect();
        if rows.len() != total {
            return Err(DdrError::Runtime {
                details: format!("record loop produced {} of {total} rows", rows.len()),
            });
        }
        Ok(rows)
    }

    fn emit(&self, entry: &LogEntry) {
        emit(self.events.as_ref(), entry);
    }

    fn fail_event(&self, err: DdrError) -> DdrError {
        let mut entry = LogEntry::new(EventType::RunFailed, Severity::Critical)
            .with_error(&err)
            .with_details(format!("phase={}", self.phase));
        entry.config_hash.clone_from(&self.config_hash);
        self.emit(&entry);
        if let Some(events) = &self.events {
            events.lock().flush();
        }
        err
    }
}

/// Resolve and check one record. Never fails.
fn reconcile_record(
    record: DocumentRecord,
    root: Option<&Path>,
    checker: &ExistenceChecker,
    events: Option<&EventLog>,
) -> ReconciledRow {
    let path = match resolver::resolve(record.doc_dir.as_deref(), root) {
        ResolvedPath::NoPath => return ReconciledRow::skipped(record),
        ResolvedPath::Path(path) => path,
    };
    let probe = checker.check(&path);
    if let Presence::Unreadable { details } = &probe.presence {
        let mut entry = LogEntry::new(EventType::RecordUnreadable, Severity::Warning)
            .with_path(path.display().to_string())
            .with_details(details.clone());
        entry.record_id = Some(record.id.clone());
        emit(events, &entry);
    }
    ReconciledRow::checked(record, probe)
}
