//! Report export: the row sink seam and its CSV implementation.

pub mod csv;

use crate::core::errors::Result;
use crate::reconcile::report::ReconciledRow;

/// Destination for the reconciled rows of a completed run.
pub trait RowSink {
    /// Write every row, in order, under the query's column header.
    fn write_rows(&mut self, columns: &[String], rows: &[ReconciledRow]) -> Result<()>;

    /// Short label for logs and summaries.
    fn describe(&self) -> String;
}

/// Collects rows in memory; for library callers that post-process results.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    pub columns: Vec<String>,
    pub rows: Vec<ReconciledRow>,
}

impl RowSink for RowBuffer {
    fn write_rows(&mut self, columns: &[String], rows: &[ReconciledRow]) -> Result<()> {
        self.columns = columns.to_vec();
        self.rows = rows.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
