//! Directory index: one parallel enumeration of the document root, answering
//! existence lookups by set membership afterwards.
//!
//! Enumeration is best-effort. Directories that cannot be read and symbolic
//! links are recorded as *opaque*: the index makes no claim at or below them,
//! and lookups there fall through to a direct stat. That keeps index answers in
//! agreement with `fs::metadata` while still skipping the syscall for the
//! common case.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use serde::Serialize;

use crate::core::errors::{DdrError, Result};
use crate::reconcile::resolver;

/// Index construction parameters.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub root: PathBuf,
    pub parallelism: usize,
    /// Enumeration stops and the index is abandoned past this many entries.
    pub max_entries: usize,
}

/// A directory entry the walker could not fully account for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexIssue {
    pub path: PathBuf,
    pub details: String,
}

/// Answer to an index lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLookup {
    Present,
    Absent,
    /// The index cannot answer; stat the path instead.
    NotCovered,
}

/// Read-only listing of everything under one root.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    root: PathBuf,
    entries: HashSet<PathBuf>,
    opaque: HashSet<PathBuf>,
    issues: Vec<IndexIssue>,
    dirs_scanned: usize,
    elapsed: Duration,
}

/// Result of an index build.
#[derive(Debug)]
pub enum IndexOutcome {
    Built(DirectoryIndex),
    /// The entry budget ran out; the run should stat every record instead.
    Abandoned {
        entries_seen: usize,
        elapsed: Duration,
    },
}

/// Per-directory output shipped from a walker thread to the collector.
#[derive(Debug, Default)]
struct WalkBatch {
    entries: Vec<PathBuf>,
    opaque: Vec<PathBuf>,
    issues: Vec<IndexIssue>,
}

impl DirectoryIndex {
    /// Enumerate `config.root` with `config.parallelism` walker threads.
    pub fn build(config: &IndexConfig) -> Result<IndexOutcome> {
        let start = Instant::now();
        let meta = fs::metadata(&config.root).map_err(|e| DdrError::io(&config.root, e))?;
        if !meta.is_dir() {
            return Err(DdrError::RootNotDirectory {
                path: config.root.clone(),
            });
        }

        let parallelism = config.parallelism.max(1);
        let (work_tx, work_rx) = channel::unbounded::<PathBuf>();
        let (result_tx, result_rx) = channel::unbounded::<WalkBatch>();
        let in_flight = AtomicUsize::new(1);
        let entries_seen = AtomicUsize::new(0);
        let abandoned = AtomicBool::new(false);

        work_tx
            .send(config.root.clone())
            .map_err(|_| DdrError::ChannelClosed {
                component: "index walker",
            })?;

        let mut index = Self {
            root: config.root.clone(),
            entries: HashSet::new(),
            opaque: HashSet::new(),
            issues: Vec::new(),
            dirs_scanned: 0,
            elapsed: Duration::ZERO,
        };
        index.entries.insert(config.root.clone());

        thread::scope(|scope| {
            for _ in 0..parallelism {
                let work_rx = work_rx.clone();
                let work_tx = work_tx.clone();
                let result_tx = result_tx.clone();
                let in_flight = &in_flight;
                let entries_seen = &entries_seen;
                let abandoned = &abandoned;
                let max_entries = config.max_entries;

                scope.spawn(move || {
                    walker_thread(
                        &work_rx,
                        &work_tx,
                        &result_tx,
                        in_flight,
                        entries_seen,
                        abandoned,
                        max_entries,
                    );
                });
            }
            // Workers hold the only remaining senders; the result channel closes
            // when the last one exits.
            drop(result_tx);
            drop(work_tx);

            for batch in &result_rx {
                index.dirs_scanned += 1;
                index.entries.extend(batch.entries);
                index.opaque.extend(batch.opaque);
                index.issues.extend(batch.issues);
            }
        });

        index.elapsed = start.elapsed();
        if abandoned.load(Ordering::Acquire) {
            return Ok(IndexOutcome::Abandoned {
                entries_seen: entries_seen.load(Ordering::Acquire),
                elapsed: index.elapsed,
            });
        }
        Ok(IndexOutcome::Built(index))
    }

    /// Answer whether `path` exists, as far as the listing can tell.
    pub fn lookup(&self, path: &Path) -> IndexLookup {
        if !resolver::is_index_key(path, &self.root) {
            return IndexLookup::NotCovered;
        }
        let shadowed = path
            .ancestors()
            .take_while(|ancestor| ancestor.starts_with(&self.root))
            .any(|ancestor| self.opaque.contains(ancestor));
        if shadowed {
            return IndexLookup::NotCovered;
        }
        if self.entries.contains(path) {
            IndexLookup::Present
        } else {
            IndexLookup::Absent
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of listed paths (root included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn opaque_count(&self) -> usize {
        self.opaque.len()
    }

    pub fn issues(&self) -> &[IndexIssue] {
        &self.issues
    }

    pub fn dirs_scanned(&self) -> usize {
        self.dirs_scanned
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Worker thread: pull directories, list them, ship results, queue subdirectories.
fn walker_thread(
    work_rx: &channel::Receiver<PathBuf>,
    work_tx: &channel::Sender<PathBuf>,
    result_tx: &channel::Sender<WalkBatch>,
    in_flight: &AtomicUsize,
    entries_seen: &AtomicUsize,
    abandoned: &AtomicBool,
    max_entries: usize,
) {
    loop {
        if abandoned.load(Ordering::Acquire) {
            return;
        }

        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(dir_path) => {
                let (batch, children) = list_directory(&dir_path);

                let seen = entries_seen.fetch_add(batch.entries.len(), Ordering::AcqRel)
                    + batch.entries.len();
                if seen > max_entries {
                    abandoned.store(true, Ordering::Release);
                }

                for child in children {
                    in_flight.fetch_add(1, Ordering::AcqRel);
                    if work_tx.send(child).is_err() {
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                    }
                }
                let _ = result_tx.send(batch);
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                if in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// List one directory. Returns the batch for the collector and the child
/// directories still to visit.
///
/// Child type comes from the directory entry (no per-child stat on most
/// filesystems). Symlinks are never followed.
fn list_directory(dir_path: &Path) -> (WalkBatch, Vec<PathBuf>) {
    let mut batch = WalkBatch::default();
    let mut children = Vec::new();

    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(err) => {
            batch.opaque.push(dir_path.to_path_buf());
            batch.issues.push(IndexIssue {
                path: dir_path.to_path_buf(),
                details: describe_io(&err),
            });
            return (batch, children);
        }
    };

    let mut access_checked = false;
    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                // The failing child is unknown, so the whole directory stops being authoritative.
                batch.opaque.push(dir_path.to_path_buf());
                batch.issues.push(IndexIssue {
                    path: dir_path.to_path_buf(),
                    details: format!("listing interrupted: {}", describe_io(&err)),
                });
                continue;
            }
        };

        // A listable directory without search permission still refuses a stat
        // of every child, so it cannot vouch for any of them.
        if !access_checked {
            access_checked = true;
            if let Err(err) = entry.metadata()
                && err.kind() == ErrorKind::PermissionDenied
            {
                let mut denied = WalkBatch::default();
                denied.opaque.push(dir_path.to_path_buf());
                denied.issues.push(IndexIssue {
                    path: dir_path.to_path_buf(),
                    details: "children cannot be examined: permission denied".to_string(),
                });
                return (denied, Vec::new());
            }
        }

        let child_path = entry.path();
        let Ok(ft) = entry.file_type() else {
            batch.opaque.push(child_path);
            continue;
        };

        if ft.is_symlink() {
            batch.opaque.push(child_path);
        } else if ft.is_dir() {
            batch.entries.push(child_path.clone());
            children.push(child_path);
        } else {
            batch.entries.push(child_path);
        }
    }

    (batch, children)
}

fn describe_io(err: &std::io::Error) -> String {
    match err.kind() {
        ErrorKind::PermissionDenied => "permission denied".to_string(),
        ErrorKind::NotFound => "vanished during enumeration".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &Path) -> IndexConfig {
        IndexConfig {
            root: root.to_path_buf(),
            parallelism: 2,
            max_entries: 10_000,
        }
    }

    fn built(outcome: IndexOutcome) -> DirectoryIndex {
        match outcome {
            IndexOutcome::Built(index) => index,
            IndexOutcome::Abandoned { entries_seen, .. } => {
                panic!("index unexpectedly abandoned after {entries_seen} entries")
            }
        }
    }

    fn tree() -> TempDir {
        // root/
        //   a.pdf
        //   matters/
        //     m1/
        //       b.docx
        //   contacts/
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        fs::create_dir_all(tmp.path().join("matters").join("m1")).unwrap();
        fs::write(tmp.path().join("matters").join("m1").join("b.docx"), b"b").unwrap();
        fs::create_dir_all(tmp.path().join("contacts")).unwrap();
        tmp
    }

    #[test]
    fn lists_every_entry() {
        let tmp = tree();
        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());

        let root = tmp.path();
        assert_eq!(index.lookup(&root.join("a.pdf")), IndexLookup::Present);
        assert_eq!(
            index.lookup(&root.join("matters").join("m1").join("b.docx")),
            IndexLookup::Present
        );
        assert_eq!(index.lookup(&root.join("contacts")), IndexLookup::Present);
        assert_eq!(index.lookup(root), IndexLookup::Present);
        // root + a.pdf + matters + m1 + b.docx + contacts
        assert_eq!(index.len(), 6);
        assert_eq!(index.dirs_scanned(), 4);
        assert!(index.issues().is_empty());
    }

    #[test]
    fn missing_files_are_absent() {
        let tmp = tree();
        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        assert_eq!(
            index.lookup(&tmp.path().join("missing.pdf")),
            IndexLookup::Absent
        );
        assert_eq!(
            index.lookup(&tmp.path().join("matters").join("m2").join("c.pdf")),
            IndexLookup::Absent
        );
    }

    #[test]
    fn paths_outside_root_are_not_covered() {
        let tmp = tree();
        let other = TempDir::new().unwrap();
        fs::write(other.path().join("x.pdf"), b"x").unwrap();

        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        assert_eq!(
            index.lookup(&other.path().join("x.pdf")),
            IndexLookup::NotCovered
        );
        assert_eq!(index.lookup(Path::new("a.pdf")), IndexLookup::NotCovered);
    }

    #[test]
    fn parent_segments_are_not_covered() {
        let tmp = tree();
        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        let sneaky = tmp.path().join("matters").join("..").join("a.pdf");
        assert_eq!(index.lookup(&sneaky), IndexLookup::NotCovered);
    }

    #[test]
    fn redundant_separators_still_match() {
        let tmp = tree();
        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        let doubled = PathBuf::from(format!("{}//a.pdf", tmp.path().display()));
        assert_eq!(index.lookup(&doubled), IndexLookup::Present);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_opaque() {
        let tmp = tree();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("linked.pdf"), b"l").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("shared")).unwrap();

        let index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        assert_eq!(index.opaque_count(), 1);
        assert_eq!(
            index.lookup(&tmp.path().join("shared").join("linked.pdf")),
            IndexLookup::NotCovered
        );
        assert_eq!(
            index.lookup(&tmp.path().join("shared")),
            IndexLookup::NotCovered
        );
    }

    #[test]
    fn vanished_directory_becomes_opaque() {
        let tmp = tree();
        let gone = tmp.path().join("matters").join("m1");
        let mut index = built(DirectoryIndex::build(&config(tmp.path())).unwrap());
        fs::remove_dir_all(&gone).unwrap();

        let (batch, children) = list_directory(&gone);
        assert!(children.is_empty());
        assert!(batch.entries.is_empty());
        assert_eq!(batch.opaque, vec![gone.clone()]);
        assert_eq!(batch.issues.len(), 1);
        assert_eq!(batch.issues[0].path, gone);
        assert_eq!(batch.issues[0].details, "vanished during enumeration");

        index.opaque.extend(batch.opaque);
        index.issues.extend(batch.issues);
        assert_eq!(index.lookup(&gone.join("b.docx")), IndexLookup::NotCovered);
        assert_eq!(index.lookup(&gone), IndexLookup::NotCovered);
        assert_eq!(index.lookup(&tmp.path().join("a.pdf")), IndexLookup::Present);
    }

    /// True when mode bits are not enforced for this process (running as root).
    #[cfg(unix)]
    fn permissions_ignored(dir: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o000)).unwrap();
        let ignored = fs::read_dir(dir).is_ok();
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
        ignored
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_opaque() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tree();
        let locked = tmp.path().join("matters");
        if permissions_ignored(&locked) {
            return;
        }
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let outcome = DirectoryIndex::build(&config(tmp.path()));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let index = built(outcome.unwrap());
        assert_eq!(index.issues().len(), 1);
        assert_eq!(index.issues()[0].path, locked);
        assert_eq!(
            index.lookup(&locked.join("m1").join("b.docx")),
            IndexLookup::NotCovered
        );
        assert_eq!(index.lookup(&tmp.path().join("a.pdf")), IndexLookup::Present);
    }

    #[cfg(unix)]
    #[test]
    fn listable_but_unsearchable_directory_is_opaque() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tree();
        let locked = tmp.path().join("matters");
        if permissions_ignored(&locked) {
            return;
        }
        // r-- : names can be listed, children cannot be stat'ed.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o444)).unwrap();
        let (batch, children) = list_directory(&locked);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(children.is_empty());
        assert!(batch.entries.is_empty());
        assert_eq!(batch.opaque, vec![locked.clone()]);
        assert_eq!(batch.issues.len(), 1);
    }

    #[test]
    fn single_worker_produces_same_listing() {
        let tmp = tree();
        let mut cfg = config(tmp.path());
        cfg.parallelism = 1;
        let one = built(DirectoryIndex::build(&cfg).unwrap());
        cfg.parallelism = 4;
        let four = built(DirectoryIndex::build(&cfg).unwrap());
        assert_eq!(one.entries, four.entries);
    }

    #[test]
    fn entry_budget_abandons_index() {
        let tmp = tree();
        let mut cfg = config(tmp.path());
        cfg.max_entries = 2;
        match DirectoryIndex::build(&cfg).unwrap() {
            IndexOutcome::Abandoned { entries_seen, .. } => assert!(entries_seen > 2),
            IndexOutcome::Built(_) => panic!("expected the index to be abandoned"),
        }
    }

    #[test]
    fn file_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        let err = DirectoryIndex::build(&config(&file)).unwrap_err();
        assert!(matches!(err, DdrError::RootNotDirectory { .. }));
    }
}
