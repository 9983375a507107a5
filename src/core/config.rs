//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DdrError, Result};

/// Full audit configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub reconcile: ReconcileConfig,
    pub output: OutputConfig,
    /// Location this config was loaded from (not serialized).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Where records and the document-root setting come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file holding the practice-management data.
    pub path: PathBuf,
    /// Key passed as `?1` to `root_query`.
    pub root_setting_key: String,
    /// Scalar query returning the configured document root (or no row / NULL).
    pub root_query: String,
    /// Query returning one row per document event.
    pub records_query: String,
}

/// Record-loop and index-strategy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Pre-list the document root and answer lookups from the listing.
    pub use_index: bool,
    /// Worker threads for both index construction and the record loop.
    pub parallelism: usize,
    /// Abandon the index (and stat every record) past this many entries.
    pub max_index_entries: usize,
}

/// Report destinations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub log_path: PathBuf,
    /// Optional append-only JSONL event log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,
}

/// Default records query against the `document_events` table.
pub const DEFAULT_RECORDS_QUERY: &str = "SELECT id, event_type, entity_type, matter_id, contact_id, \
     doc_dir, subject, notes FROM document_events ORDER BY id";

/// Default scalar query for the document root setting.
pub const DEFAULT_ROOT_QUERY: &str = "SELECT value FROM settings WHERE key = ?1";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("practice.sqlite3"),
            root_setting_key: "DocumentRoot".to_string(),
            root_query: DEFAULT_ROOT_QUERY.to_string(),
            records_query: DEFAULT_RECORDS_QUERY.to_string(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            use_index: true,
            parallelism: std::thread::available_parallelism()
                .map_or(2, |n| n.get().saturating_div(2).max(1)),
            max_index_entries: 5_000_000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("docdir_audit.csv"),
            log_path: PathBuf::from("docdir_audit.log"),
            event_log: None,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[DDR-CONFIG] WARNING: HOME not set, falling back to /tmp for config");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        home_dir.join(".config").join("ddr").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DdrError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str(&raw)?
        } else if is_explicit_path {
            return Err(DdrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the event log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // database
        if let Some(raw) = lookup("DDR_DATABASE_PATH") {
            self.database.path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DDR_DATABASE_ROOT_SETTING_KEY") {
            self.database.root_setting_key = raw;
        }
        if let Some(raw) = lookup("DDR_DATABASE_ROOT_QUERY") {
            self.database.root_query = raw;
        }
        if let Some(raw) = lookup("DDR_DATABASE_RECORDS_QUERY") {
            self.database.records_query = raw;
        }

        // reconcile
        if let Some(raw) = lookup("DDR_RECONCILE_USE_INDEX") {
            self.reconcile.use_index = parse_env_bool("DDR_RECONCILE_USE_INDEX", &raw)?;
        }
        if let Some(raw) = lookup("DDR_RECONCILE_PARALLELISM") {
            self.reconcile.parallelism = parse_env_usize("DDR_RECONCILE_PARALLELISM", &raw)?;
        }
        if let Some(raw) = lookup("DDR_RECONCILE_MAX_INDEX_ENTRIES") {
            self.reconcile.max_index_entries =
                parse_env_usize("DDR_RECONCILE_MAX_INDEX_ENTRIES", &raw)?;
        }

        // output
        if let Some(raw) = lookup("DDR_OUTPUT_CSV_PATH") {
            self.output.csv_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DDR_OUTPUT_LOG_PATH") {
            self.output.log_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DDR_OUTPUT_EVENT_LOG") {
            self.output.event_log = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    /// Strip trailing slashes from output paths so reports land where expected.
    fn normalize_paths(&mut self) {
        for path in [&mut self.output.csv_path, &mut self.output.log_path] {
            let trimmed = {
                let s = path.to_string_lossy();
                (s.len() > 1)
                    .then(|| s.strip_suffix('/').map(PathBuf::from))
                    .flatten()
            };
            if let Some(trimmed) = trimmed {
                *path = trimmed;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconcile.parallelism == 0 {
            return Err(DdrError::InvalidConfig {
                details: "reconcile.parallelism must be >= 1".to_string(),
            });
        }
        if self.reconcile.max_index_entries == 0 {
            return Err(DdrError::InvalidConfig {
                details: "reconcile.max_index_entries must be >= 1".to_string(),
            });
        }

        if self.database.root_query.trim().is_empty() {
            return Err(DdrError::InvalidConfig {
                details: "database.root_query must not be empty".to_string(),
            });
        }
        if self.database.records_query.trim().is_empty() {
            return Err(DdrError::InvalidConfig {
                details: "database.records_query must not be empty".to_string(),
            });
        }
        if !is_read_statement(&self.database.records_query) {
            return Err(DdrError::InvalidConfig {
                details: "database.records_query must be a SELECT (or WITH ... SELECT) statement"
                    .to_string(),
            });
        }
        if !is_read_statement(&self.database.root_query) {
            return Err(DdrError::InvalidConfig {
                details: "database.root_query must be a SELECT (or WITH ... SELECT) statement"
                    .to_string(),
            });
        }

        if self.output.csv_path.as_os_str().is_empty() || self.output.log_path.as_os_str().is_empty()
        {
            return Err(DdrError::InvalidConfig {
                details: "output.csv_path and output.log_path must be set".to_string(),
            });
        }
        if self.output.csv_path == self.output.log_path {
            return Err(DdrError::InvalidConfig {
                details: format!(
                    "output.csv_path and output.log_path must differ (both {})",
                    self.output.csv_path.display()
                ),
            });
        }

        Ok(())
    }
}

fn is_read_statement(sql: &str) -> bool {
    let head = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(head.as_str(), "SELECT" | "WITH")
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|error| DdrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| DdrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
