//! Existence checks with a per-run strategy: direct stat, or index lookup with
//! stat fallback where the index is not authoritative.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::reconcile::index::{DirectoryIndex, IndexLookup};

/// Index misses are final only where path comparison is case-sensitive.
/// Elsewhere a miss is confirmed with a stat.
const INDEX_MISSES_ARE_AUTHORITATIVE: bool = !cfg!(any(windows, target_os = "macos"));

/// What the checker learned about one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Presence {
    Found,
    Missing,
    /// The path could not be examined (permissions, I/O). Reported as missing.
    Unreadable { details: String },
}

impl Presence {
    pub const fn exists(&self) -> bool {
        matches!(self, Self::Found)
    }
}

/// How an answer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMethod {
    Index,
    Stat,
}

impl LookupMethod {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Stat => "stat",
        }
    }
}

/// One existence answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub presence: Presence,
    pub method: LookupMethod,
}

/// Strategy selected once per run.
#[derive(Debug, Clone)]
pub enum Strategy {
    DirectStat,
    Indexed(Arc<DirectoryIndex>),
}

impl Strategy {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::DirectStat => "direct-stat",
            Self::Indexed(_) => "indexed",
        }
    }
}

/// Answers existence questions for the record loop. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct ExistenceChecker {
    strategy: Strategy,
}

impl ExistenceChecker {
    pub const fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    pub const fn direct() -> Self {
        Self::new(Strategy::DirectStat)
    }

    pub fn indexed(index: Arc<DirectoryIndex>) -> Self {
        Self::new(Strategy::Indexed(index))
    }

    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Boolean form of [`Self::check`].
    pub fn exists(&self, path: &Path) -> bool {
        self.check(path).presence.exists()
    }

    /// Check one path. Never fails: anything that prevents a definite answer
    /// is `Unreadable`, which counts as missing.
    pub fn check(&self, path: &Path) -> Probe {
        match &self.strategy {
            Strategy::DirectStat => stat_probe(path),
            Strategy::Indexed(index) => match index.lookup(path) {
                IndexLookup::Present => Probe {
                    presence: Presence::Found,
                    method: LookupMethod::Index,
                },
                IndexLookup::Absent if INDEX_MISSES_ARE_AUTHORITATIVE => Probe {
                    presence: Presence::Missing,
                    method: LookupMethod::Index,
                },
                IndexLookup::Absent | IndexLookup::NotCovered => stat_probe(path),
            },
        }
    }
}

/// Stat `path`, following symlinks.
pub fn stat_probe(path: &Path) -> Probe {
    let presence = match fs::metadata(path) {
        Ok(_) => Presence::Found,
        Err(err) => match err.kind() {
            // NotADirectory: a file sits where a parent directory was expected.
            ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::InvalidInput => {
                Presence::Missing
            }
            ErrorKind::PermissionDenied => Presence::Unreadable {
                details: "permission denied".to_string(),
            },
            _ => Presence::Unreadable {
                details: err.to_string(),
            },
        },
    };
    Probe {
        presence,
        method: LookupMethod::Stat,
    }
}
