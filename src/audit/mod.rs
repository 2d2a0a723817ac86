//! Audit trail for schema-guard
//!
//! Records every backup created, deleted or restored and the outcome of
//! every migration attempt in an append-only log next to the artifacts.
//!
//! # Architecture
//!
//! - `AuditEntry`: a single event with timestamp, operation, environment,
//!   subject (artifact filename or attempt id) and structured details.
//! - `AuditLogger`: appends entries to the audit log using a line-delimited
//!   JSON format (JSONL).

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation};
pub use logger::AuditLogger;
