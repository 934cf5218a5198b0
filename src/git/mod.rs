//! Git snapshot module
//!
//! This module lists the files recorded by the commit a working copy has
//! checked out, using libgit2 bindings rather than shelling out to `git`.

pub mod snapshot;

pub use snapshot::{Git2Snapshot, RepositoryError, SnapshotFiles};
