//! Run logging: the plain-text run log and the optional JSONL event log.

pub mod jsonl;
pub mod run_log;

use crate::core::errors::Result;

/// Destination for the run log lines.
pub trait LogSink {
    /// Write every line in order, replacing anything previously written this run.
    fn write_lines(&mut self, lines: &[String]) -> Result<()>;

    fn describe(&self) -> String;
}

/// Keeps the lines in memory.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    pub lines: Vec<String>,
}

impl LogSink for LineBuffer {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        self.lines = lines.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
