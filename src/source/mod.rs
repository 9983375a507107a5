//! Record source: the database collaborator that yields document events and the
//! configured document root.

#![allow(missing_docs)]

#[cfg(feature = "sqlite")]
pub mod sqlite;

use serde::Serialize;

use crate::core::errors::Result;

/// Which entity a document event is filed against.
///
/// The source data carries both a matter and a contact reference, but only the
/// one named by its entity tag is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Matter(String),
    Contact(String),
    Unlinked,
}

impl EntityRef {
    /// Pick the meaningful reference from the raw columns.
    ///
    /// With a tag, the tag decides (`Matters`/`Matter` or `Contacts`/`Contact`,
    /// case-insensitive). Without one, the matter reference wins when present.
    pub fn from_columns(tag: Option<&str>, matter: Option<&str>, contact: Option<&str>) -> Self {
        let matter = non_blank(matter);
        let contact = non_blank(contact);

        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("matters" | "matter") => matter.map_or(Self::Unlinked, Self::Matter),
            Some("contacts" | "contact") => contact.map_or(Self::Unlinked, Self::Contact),
            _ => match (matter, contact) {
                (Some(m), _) => Self::Matter(m),
                (None, Some(c)) => Self::Contact(c),
                (None, None) => Self::Unlinked,
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Matter(id) => format!("matter {id}"),
            Self::Contact(id) => format!("contact {id}"),
            Self::Unlinked => "unlinked".to_string(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(ToString::to_string)
}

/// One document event as fetched. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub event_type: Option<String>,
    pub entity: EntityRef,
    /// Stored document location (`DocDir`), exactly as the database holds it.
    pub doc_dir: Option<String>,
    /// Every column of the source row rendered as text, in query order.
    pub fields: Vec<String>,
}

/// Ordered result of the records query plus its column header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub records: Vec<DocumentRecord>,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read-only access to the practice-management database.
pub trait RecordSource {
    /// Configured document root, `None` when the setting is absent or NULL.
    fn root_directory(&mut self) -> Result<Option<String>>;

    /// Every document event, in the order the query returns them.
    fn fetch_records(&mut self) -> Result<RecordSet>;

    /// Short label for logs (database path, "memory", ...).
    fn describe(&self) -> String;
}

/// In-memory source for library callers that already hold the data.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub root: Option<String>,
    pub records: RecordSet,
}

impl MemorySource {
    pub fn new(root: Option<&str>, records: RecordSet) -> Self {
        Self {
            root: root.map(ToString::to_string),
            records,
        }
    }
}

impl RecordSource for MemorySource {
    fn root_directory(&mut self) -> Result<Option<String>> {
        Ok(self.root.clone())
    }

    fn fetch_records(&mut self) -> Result<RecordSet> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
