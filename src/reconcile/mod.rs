//! Reconciliation: path resolution, existence checks, the run engine, and its
//! report.

pub mod checker;
pub mod engine;
pub mod index;
pub mod report;
pub mod resolver;
