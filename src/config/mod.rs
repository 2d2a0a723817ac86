//! Configuration module for schema-guard
//!
//! This module provides configuration management including:
//! - Artifact directory resolution
//! - Settings loaded from the environment
//! - Environment policies (production vs development)

pub mod paths;
pub mod policy;
pub mod settings;

pub use paths::GuardPaths;
pub use policy::EnvironmentPolicy;
pub use settings::Settings;
