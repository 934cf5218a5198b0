use git2::{ObjectType, Repository, Tree};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Git file mode of a symbolic link tree entry
const SYMLINK_MODE: i32 = 0o120000;

/// Errors raised while resolving the committed tree of a working copy
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("'{}' must be a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("'{}' is not a git working copy: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("'{}' is a bare repository and has no working copy to migrate", .0.display())]
    Bare(PathBuf),

    #[error("'{}' is not the root of its git working copy", .0.display())]
    NotWorkingCopyRoot(PathBuf),

    #[error("failed to resolve HEAD to a commit: {0}")]
    Head(#[source] git2::Error),

    #[error("failed to read tree '{path}' from the object database: {source}")]
    Tree {
        path: String,
        #[source]
        source: git2::Error,
    },
}

/// Read-only view of the commit checked out in a working copy
pub struct Git2Snapshot {
    repo: Repository,
}

impl Git2Snapshot {
    /// Open the repository whose working copy is `root`.
    ///
    /// Parent directories are never searched, so `root` itself must hold the
    /// `.git` metadata.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, RepositoryError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(RepositoryError::NotADirectory(root.to_path_buf()));
        }

        let repo = Repository::open(root).map_err(|source| RepositoryError::Open {
            path: root.to_path_buf(),
            source,
        })?;
        if repo.is_bare() {
            return Err(RepositoryError::Bare(root.to_path_buf()));
        }
        // A `.git` directory opens as its parent's repository
        if !repo.workdir().is_some_and(|workdir| same_directory(workdir, root)) {
            return Err(RepositoryError::NotWorkingCopyRoot(root.to_path_buf()));
        }

        Ok(Self { repo })
    }

    /// Paths of every blob in HEAD's tree whose path ends with `suffix`.
    ///
    /// HEAD is resolved eagerly; the tree itself is walked lazily, depth
    /// first in tree-entry order, as the iterator is consumed.
    pub fn files_with_suffix(&self, suffix: &str) -> Result<SnapshotFiles<'_>, RepositoryError> {
        let commit = self
            .repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(RepositoryError::Head)?;
        let tree = commit.tree().map_err(|source| RepositoryError::Tree {
            path: String::new(),
            source,
        })?;
        debug!(commit = %commit.id(), suffix, "walking committed tree");

        Ok(SnapshotFiles {
            repo: &self.repo,
            suffix: suffix.to_string(),
            pending: vec![(String::new(), tree, 0)],
        })
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Lazy walk over the blobs of a committed tree
///
/// Yields `/`-separated paths relative to the repository root. A subtree that
/// cannot be loaded is reported as an `Err` item.
pub struct SnapshotFiles<'repo> {
    repo: &'repo Repository,
    suffix: String,
    /// Directory prefix, tree, and index of the next entry to visit
    pending: Vec<(String, Tree<'repo>, usize)>,
}

impl Iterator for SnapshotFiles<'_> {
    type Item = Result<String, RepositoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = {
                let (directory, tree, index) = self.pending.last_mut()?;
                tree.get(*index).map(|entry| {
                    *index += 1;
                    let name = String::from_utf8_lossy(entry.name_bytes());
                    (
                        format!("{directory}{name}"),
                        entry.kind(),
                        entry.filemode(),
                        entry.id(),
                    )
                })
            };
            let Some((path, kind, mode, id)) = next else {
                self.pending.pop();
                continue;
            };

            match kind {
                Some(ObjectType::Tree) => match self.repo.find_tree(id) {
                    Ok(subtree) => self.pending.push((format!("{path}/"), subtree, 0)),
                    Err(source) => return Some(Err(RepositoryError::Tree { path, source })),
                },
                Some(ObjectType::Blob) if mode != SYMLINK_MODE && path.ends_with(&self.suffix) => {
                    debug!(%path, "selected committed file");
                    return Some(Ok(path));
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_repo(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        for (path, content) in files {
            let full_path = temp_dir.path().join(path);
            fs::create_dir_all(full_path.parent().unwrap()).unwrap();
            fs::write(full_path, content).unwrap();
        }
        commit_all(&repo);

        temp_dir
    }

    fn commit_all(repo: &Repository) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = Signature::now("Test", "test@example.com").unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parents: Vec<&git2::Commit> = parents.iter().collect();

        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Test commit",
            &tree,
            &parents,
        )
        .unwrap();
    }

    fn jelly_files(root: &Path) -> Vec<String> {
        let snapshot = Git2Snapshot::open(root).unwrap();
        let files = snapshot
            .files_with_suffix(".jelly")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        files
    }

    #[test]
    fn test_lists_jelly_files_depth_first_in_tree_order() {
        let temp_dir = create_test_repo(&[
            ("b.jelly", "<b/>"),
            ("a/z.jelly", "<z/>"),
            ("a/b/c.jelly", "<c/>"),
            ("a.jelly", "<a/>"),
            ("c.txt", "text"),
            ("README.jelly.txt", "text"),
            ("a/b/config.xml", "<config/>"),
        ]);

        assert_eq!(
            jelly_files(temp_dir.path()),
            vec!["a.jelly", "a/b/c.jelly", "a/z.jelly", "b.jelly"]
        );
    }

    #[test]
    fn test_ignores_files_missing_from_head() {
        let temp_dir = create_test_repo(&[("index.jelly", "<a/>")]);
        fs::write(temp_dir.path().join("untracked.jelly"), "<a/>").unwrap();

        assert_eq!(jelly_files(temp_dir.path()), vec!["index.jelly"]);
    }

    #[test]
    fn test_reads_head_commit_not_working_copy() {
        let temp_dir = create_test_repo(&[("old.jelly", "<a/>")]);
        fs::remove_file(temp_dir.path().join("old.jelly")).unwrap();

        assert_eq!(jelly_files(temp_dir.path()), vec!["old.jelly"]);
    }

    #[test]
    fn test_follows_later_commits() {
        let temp_dir = create_test_repo(&[("first.jelly", "<a/>")]);
        fs::write(temp_dir.path().join("second.jelly"), "<b/>").unwrap();
        commit_all(&Repository::open(temp_dir.path()).unwrap());

        assert_eq!(
            jelly_files(temp_dir.path()),
            vec!["first.jelly", "second.jelly"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_skips_symbolic_links() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("real.jelly"), "<a/>").unwrap();
        std::os::unix::fs::symlink("real.jelly", temp_dir.path().join("link.jelly")).unwrap();
        commit_all(&repo);

        assert_eq!(jelly_files(temp_dir.path()), vec!["real.jelly"]);
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.jelly");
        fs::write(&file, "<a/>").unwrap();

        let result = Git2Snapshot::open(&file);
        assert!(matches!(result, Err(RepositoryError::NotADirectory(_))));
    }

    #[test]
    fn test_open_rejects_directory_without_repository() {
        let temp_dir = TempDir::new().unwrap();

        let result = Git2Snapshot::open(temp_dir.path());
        assert!(matches!(result, Err(RepositoryError::Open { .. })));
    }

    #[test]
    fn test_open_does_not_search_parent_directories() {
        let temp_dir = create_test_repo(&[("index.jelly", "<a/>")]);
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();

        let result = Git2Snapshot::open(&nested);
        assert!(matches!(result, Err(RepositoryError::Open { .. })));
    }

    #[test]
    fn test_open_rejects_git_metadata_directory() {
        let temp_dir = create_test_repo(&[("index.jelly", "<a/>")]);

        let result = Git2Snapshot::open(temp_dir.path().join(".git"));
        assert!(matches!(result, Err(RepositoryError::NotWorkingCopyRoot(_))));
    }

    #[test]
    fn test_open_accepts_unnormalized_root_path() {
        let temp_dir = create_test_repo(&[("index.jelly", "<a/>")]);
        let relative = temp_dir.path().join("sub").join("..");
        fs::create_dir(temp_dir.path().join("sub")).unwrap();

        assert_eq!(jelly_files(&relative), vec!["index.jelly"]);
    }

    #[test]
    fn test_open_rejects_bare_repository() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init_bare(temp_dir.path()).unwrap();

        let result = Git2Snapshot::open(temp_dir.path());
        assert!(matches!(result, Err(RepositoryError::Bare(_))));
    }

    #[test]
    fn test_unborn_head_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path()).unwrap();

        let snapshot = Git2Snapshot::open(temp_dir.path()).unwrap();
        assert!(matches!(
            snapshot.files_with_suffix(".jelly"),
            Err(RepositoryError::Head(_))
        ));
    }
}
