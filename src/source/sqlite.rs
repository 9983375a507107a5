//! SQLite record source: read-only connection, configurable root-setting and
//! records queries.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::core::config::DatabaseConfig;
use crate::core::errors::{DdrError, Result};
use crate::source::{DocumentRecord, EntityRef, RecordSet, RecordSource};

/// Column names recognized for each record role (compared case-insensitively).
const ID_COLUMNS: &[&str] = &["id", "event_id", "doc_id"];
const DOC_DIR_COLUMNS: &[&str] = &["doc_dir", "docdir", "document_dir"];
const EVENT_TYPE_COLUMNS: &[&str] = &["event_type", "event_type_id", "eventtypeid"];
const MATTER_COLUMNS: &[&str] = &["matter_id", "matterid", "matter"];
const CONTACT_COLUMNS: &[&str] = &["contact_id", "contactid", "contact"];
const ENTITY_TAG_COLUMNS: &[&str] = &["entity_type", "entity", "entity_tag"];

/// Positions of the columns the engine needs, resolved once per query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnRoles {
    id: usize,
    doc_dir: usize,
    event_type: Option<usize>,
    matter: Option<usize>,
    contact: Option<usize>,
    entity_tag: Option<usize>,
}

impl ColumnRoles {
    fn resolve(columns: &[String]) -> Result<Self> {
        let find = |candidates: &[&str]| {
            columns
                .iter()
                .position(|c| candidates.iter().any(|k| c.eq_ignore_ascii_case(k)))
        };
        let required = |candidates: &[&str]| {
            find(candidates).ok_or_else(|| DdrError::Source {
                context: "records query",
                details: format!(
                    "missing required column (one of {}); query returned [{}]",
                    candidates.join(", "),
                    columns.join(", ")
                ),
            })
        };

        Ok(Self {
            id: required(ID_COLUMNS)?,
            doc_dir: required(DOC_DIR_COLUMNS)?,
            event_type: find(EVENT_TYPE_COLUMNS),
            matter: find(MATTER_COLUMNS),
            contact: find(CONTACT_COLUMNS),
            entity_tag: find(ENTITY_TAG_COLUMNS),
        })
    }
}

/// Read-only SQLite connection to the practice-management database.
pub struct SqliteSource {
    conn: Connection,
    path: PathBuf,
    root_setting_key: String,
    root_query: String,
    records_query: String,
}

impl SqliteSource {
    /// Open the database read-only. A missing file is a fatal source error.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DdrError::Source {
            context: "connect",
            details: format!("{}: {e}", config.path.display()),
        })?;

        Ok(Self {
            conn,
            path: config.path.clone(),
            root_setting_key: config.root_setting_key.clone(),
            root_query: config.root_query.clone(),
            records_query: config.records_query.clone(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for SqliteSource {
    fn root_directory(&mut self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(&self.root_query, params![self.root_setting_key], |row| {
                Ok(render_nullable(row.get_ref(0)?))
            })
            .optional()
            .map_err(|e| sql_error("root query", &e))?;
        Ok(value.flatten())
    }

    fn fetch_records(&mut self) -> Result<RecordSet> {
        let mut stmt = self
            .conn
            .prepare(&self.records_query)
            .map_err(|e| sql_error("records query", &e))?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let roles = ColumnRoles::resolve(&columns)?;
        let width = columns.len();

        let mut rows = stmt.query([]).map_err(|e| sql_error("records query", &e))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|e| sql_error("records query", &e))? {
            let mut raw: Vec<Option<String>> = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row.get_ref(idx).map_err(|e| sql_error("records query", &e))?;
                raw.push(render_nullable(value));
            }
            records.push(build_record(&roles, raw));
        }

        Ok(RecordSet { columns, records })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

fn build_record(roles: &ColumnRoles, raw: Vec<Option<String>>) -> DocumentRecord {
    let at = |idx: Option<usize>| idx.and_then(|i| raw.get(i)).and_then(Option::as_deref);

    let entity = EntityRef::from_columns(
        at(roles.entity_tag),
        at(roles.matter),
        at(roles.contact),
    );
    let id = at(Some(roles.id)).unwrap_or_default().to_string();
    let event_type = at(roles.event_type).map(ToString::to_string);
    let doc_dir = at(Some(roles.doc_dir)).map(ToString::to_string);

    DocumentRecord {
        id,
        event_type,
        entity,
        doc_dir,
        fields: raw.into_iter().map(Option::unwrap_or_default).collect(),
    }
}

/// Render a SQLite value as text; NULL stays `None`.
fn render_nullable(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(hex, "{b:02x}");
            }
            Some(hex)
        }
    }
}

fn sql_error(context: &'static str, err: &rusqlite::Error) -> DdrError {
    DdrError::Sql {
        context,
        details: err.to_string(),
    }
}
