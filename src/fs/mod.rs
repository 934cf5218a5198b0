//! File system operations abstraction for testing
//!
//! The migrator only ever reads a working-copy file in full and replaces it
//! in full. Both go through this trait so tests can swap in the
//! `mockall`-generated `MockFileSystemOperations` and assert exactly how many
//! writes happened.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jelly_migrator::fs::{FileSystemOperations, StandardFileSystem};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> std::io::Result<()> {
//!     let fs_ops: Arc<dyn FileSystemOperations> = Arc::new(StandardFileSystem);
//!     let path = Path::new("core/src/main/resources/index.jelly");
//!
//!     let content = fs_ops.read_to_string(path)?;
//!     fs_ops.write_atomic(path, &content)?;
//!     Ok(())
//! }
//! ```
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Trait for file system operations that can be mocked in tests
#[cfg_attr(test, automock)]
pub trait FileSystemOperations: Send + Sync {
    /// Read a whole file as UTF-8 text
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace a file's content so readers only ever see the old or the new bytes
    ///
    /// # Arguments
    /// * `path` - An existing file to replace
    /// * `contents` - The complete new content
    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Standard implementation that uses actual file system operations
///
/// `write_atomic` writes to a temporary file created next to the target (so
/// both live on the same filesystem), syncs it, copies the target's
/// permissions onto it and renames it over the target. The temporary file is
/// removed if any step before the rename fails.
pub struct StandardFileSystem;

impl FileSystemOperations for StandardFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' does not name a file", path.display()),
            )
        })?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let permissions = fs::metadata(path)?.permissions();

        let mut temp = tempfile::Builder::new()
            .prefix(file_name)
            .suffix(".tmp")
            .tempfile_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.as_file().set_permissions(permissions)?;

        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
