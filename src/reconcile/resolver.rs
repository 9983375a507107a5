//! Path resolution: turn a record's stored `DocDir` value into the path that
//! gets checked.
//!
//! Stored values are used verbatim. They are never joined with, or rewritten
//! against, the document root; the root only decides whether an index lookup
//! can stand in for a filesystem call.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::paths;

/// Outcome of resolving one stored path value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// The record carries no location; no filesystem check is ever made.
    NoPath,
    /// The path to check, exactly as stored.
    Path(PathBuf),
}

impl ResolvedPath {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::NoPath => None,
            Self::Path(p) => Some(p),
        }
    }
}

/// Resolve a stored path value.
///
/// `root` is accepted for symmetry with the run-level strategy decision but
/// does not influence the result.
pub fn resolve(stored: Option<&str>, _root: Option<&Path>) -> ResolvedPath {
    match stored {
        Some(raw) if !paths::is_blank(stored) => ResolvedPath::Path(PathBuf::from(raw)),
        _ => ResolvedPath::NoPath,
    }
}

/// Whether `path` may be answered from an index of `root`.
///
/// Only absolute paths beneath the root with no `..` segments and no trailing
/// separator qualify; anything else goes to the filesystem.
pub fn is_index_key(path: &Path, root: &Path) -> bool {
    paths::is_lexically_clean(path)
        && !paths::ends_with_directory_marker(path)
        && paths::is_within(path, root)
}
