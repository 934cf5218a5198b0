// Jelly Migrator Library - Stapler include attribute migration
// This exposes the core components for testing and integration

pub mod config;
pub mod fs;
pub mod git;
pub mod migrate;
pub mod telemetry;
pub mod xml;

// Re-export key types for easy access
pub use crate::config::{MigratorConfig, ObservabilityConfig};
pub use fs::{FileSystemOperations, StandardFileSystem};
pub use git::{Git2Snapshot, RepositoryError, SnapshotFiles};
pub use migrate::{FileOutcome, MigrationError, MigrationReport, Migrator};
pub use telemetry::init_telemetry;
pub use xml::{Document, Element, ParseError};
