//! DDR-prefixed error types with structured error codes.
//!
//! Only run-level failures are errors. Per-record problems (an unreadable
//! document path) and index coverage gaps are reported through
//! [`crate::reconcile::checker::Presence`] and
//! [`crate::reconcile::index::IndexIssue`] and never abort a run.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DdrError>;

/// Top-level error type for the document-directory audit.
#[derive(Debug, Error)]
pub enum DdrError {
    #[error("[DDR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DDR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DDR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2001] configured document root does not exist: {path}")]
    RootMissing { path: PathBuf },

    #[error("[DDR-2002] configured document root is not a directory: {path}")]
    RootNotDirectory { path: PathBuf },

    #[error("[DDR-2101] record source failure in {context}: {details}")]
    Source {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2201] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2202] CSV export failure: {details}")]
    CsvExport { details: String },

    #[error("[DDR-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DDR-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DDR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DdrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DDR-1001",
            Self::MissingConfig { .. } => "DDR-1002",
            Self::ConfigParse { .. } => "DDR-1003",
            Self::RootMissing { .. } => "DDR-2001",
            Self::RootNotDirectory { .. } => "DDR-2002",
            Self::Source { .. } => "DDR-2101",
            Self::Sql { .. } => "DDR-2102",
            Self::Serialization { .. } => "DDR-2201",
            Self::CsvExport { .. } => "DDR-2202",
            Self::Io { .. } => "DDR-3002",
            Self::ChannelClosed { .. } => "DDR-3003",
            Self::Runtime { .. } => "DDR-3900",
        }
    }

    /// Whether the error aborts a reconciliation run.
    ///
    /// Everything except a serialization hiccup in an auxiliary sink is fatal:
    /// the run cannot produce a trustworthy report past any of them.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }

    /// Whether the failure originates from the document root precondition.
    #[must_use]
    pub const fn is_root_failure(&self) -> bool {
        matches!(self, Self::RootMissing { .. } | Self::RootNotDirectory { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DdrError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<csv::Error> for DdrError {
    fn from(value: csv::Error) -> Self {
        Self::CsvExport {
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DdrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DdrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
