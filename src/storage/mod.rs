//! Storage helpers for schema-guard
//!
//! Provides atomic JSON writes used for sidecar metadata, so a sidecar is
//! either completely written or absent.

pub mod file_io;

pub use file_io::{read_json_required, write_json_atomic};
