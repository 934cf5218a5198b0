//! Stapler include migration
//!
//! Renames the `class` attribute of `<st:include>` tags to `clazz` in every
//! Jelly file committed to a repository. Files are only rewritten when at
//! least one attribute was renamed; everything else is left byte-identical.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::fs::{FileSystemOperations, StandardFileSystem};
use crate::git::{Git2Snapshot, RepositoryError};
use crate::xml::{Document, Element, ParseError};

/// Extension of the files the migration looks at
pub const JELLY_SUFFIX: &str = ".jelly";
/// Namespace URI of the Stapler tag library
pub const STAPLER_NAMESPACE: &str = "jelly:stapler";
pub const INCLUDE_ELEMENT: &str = "include";
pub const CLASS_ATTRIBUTE: &str = "class";
pub const CLAZZ_ATTRIBUTE: &str = "clazz";

/// Errors that abort a migration run
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What happened to a single file
#[derive(Debug)]
pub enum FileOutcome {
    /// Not well-formed XML; left alone
    Unparseable(ParseError),
    /// Root element binds no prefix to the Stapler namespace
    NoStaplerNamespace,
    /// Stapler namespace present but no include carried a `class` attribute
    Unchanged,
    Rewritten { renamed: usize },
}

/// Totals for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub scanned: usize,
    pub rewritten: usize,
    pub renamed_attributes: usize,
    pub unparseable: usize,
    pub without_namespace: usize,
    pub unchanged: usize,
}

impl MigrationReport {
    pub fn record(&mut self, outcome: &FileOutcome) {
        self.scanned += 1;
        match outcome {
            FileOutcome::Unparseable(_) => self.unparseable += 1,
            FileOutcome::NoStaplerNamespace => self.without_namespace += 1,
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Rewritten { renamed } => {
                self.rewritten += 1;
                self.renamed_attributes += renamed;
            }
        }
    }
}

/// Prefix the root element binds to the Stapler namespace.
///
/// When several prefixes are bound to it, the first one in declaration order wins.
pub fn stapler_prefix(root: &Element) -> Option<&str> {
    root.namespace_declarations()
        .find(|(_, uri)| *uri == STAPLER_NAMESPACE)
        .map(|(prefix, _)| prefix)
}

/// Rename `class` to `clazz` on every Stapler include element.
///
/// Returns `None` when the root element does not declare the Stapler
/// namespace, otherwise the number of attributes renamed. Elements are matched
/// by the namespace their name resolves to, so an include written with any
/// prefix bound to the Stapler namespace qualifies.
pub fn rename_class_attributes(document: &mut Document) -> Option<usize> {
    let prefix = stapler_prefix(document.root())?.to_string();
    debug!(%prefix, "found Stapler namespace declaration");

    let mut renamed = 0;
    for element in document.find_mut(INCLUDE_ELEMENT, STAPLER_NAMESPACE) {
        if element.attributes.rename(CLASS_ATTRIBUTE, CLAZZ_ATTRIBUTE) {
            debug!(element = %element.name, "renamed class attribute");
            renamed += 1;
        }
    }
    Some(renamed)
}

/// Applies the migration to files in a working copy
pub struct Migrator {
    fs: Arc<dyn FileSystemOperations>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(Arc::new(StandardFileSystem))
    }
}

impl Migrator {
    pub fn new(fs: Arc<dyn FileSystemOperations>) -> Self {
        Self { fs }
    }

    /// Migrate every Jelly file committed at HEAD of the working copy at `root`.
    ///
    /// Files are processed one at a time in tree order. Unparseable files are
    /// skipped with a warning; any repository or I/O error stops the run.
    pub fn run(&self, root: &Path) -> Result<MigrationReport, MigrationError> {
        let _span = info_span!("migration_run", root = %root.display()).entered();

        let snapshot = Git2Snapshot::open(root)?;
        let mut report = MigrationReport::default();
        for relative in snapshot.files_with_suffix(JELLY_SUFFIX)? {
            let outcome = self.migrate_file(&root.join(relative?))?;
            report.record(&outcome);
        }

        info!(
            scanned = report.scanned,
            rewritten = report.rewritten,
            renamed = report.renamed_attributes,
            unparseable = report.unparseable,
            "migration finished"
        );
        Ok(report)
    }

    /// Migrate a single file in the working copy.
    pub fn migrate_file(&self, path: &Path) -> Result<FileOutcome, MigrationError> {
        println!("Processing '{}'...", path.display());
        let _span = info_span!("migrate_file", path = %path.display()).entered();

        let source = self
            .fs
            .read_to_string(path)
            .map_err(|source| MigrationError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut document = match Document::parse(source) {
            Ok(document) => document,
            Err(error) => {
                eprintln!("Warning: failed to process {}: {error}", path.display());
                info!(%error, "skipped unparseable file");
                return Ok(FileOutcome::Unparseable(error));
            }
        };

        let outcome = match rename_class_attributes(&mut document) {
            None => FileOutcome::NoStaplerNamespace,
            Some(0) => FileOutcome::Unchanged,
            Some(renamed) => {
                self.fs
                    .write_atomic(path, &document.to_xml())
                    .map_err(|source| MigrationError::Write {
                        path: path.to_path_buf(),
                        source,
                    })?;
                FileOutcome::Rewritten { renamed }
            }
        };

        info!(?outcome, "processed file");
        Ok(outcome)
    }
}
