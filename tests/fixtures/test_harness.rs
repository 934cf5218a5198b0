//! Test harness for building throwaway git working copies in integration tests
use anyhow::Result;
use git2::{IndexAddOption, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary git working copy, removed when dropped
pub struct TestHarness {
    temp_dir: TempDir,
    repo: Repository,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let repo = Repository::init(temp_dir.path())?;
        Ok(Self { temp_dir, repo })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file (and its parent directories) relative to the working copy
    pub fn create_file(&self, relative_path: &str, content: &str) -> Result<PathBuf> {
        let full_path = self.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, content)?;
        Ok(full_path)
    }

    pub fn read_file(&self, relative_path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path().join(relative_path))?)
    }

    /// Stage every file in the working copy and commit it on top of HEAD
    pub fn commit_all(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = Signature::now("Test", "test@example.com")?;
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(())
    }
}

/// Harness with the given files committed
pub fn committed_harness(files: &[(&str, &str)]) -> Result<TestHarness> {
    let harness = TestHarness::new()?;
    for (path, content) in files {
        harness.create_file(path, content)?;
    }
    harness.commit_all("Initial commit")?;
    Ok(harness)
}

/// Jelly page using includes that need migrating
pub const PAGE_WITH_CLASS: &str = r#"<?jelly escape-by-default='true'?>
<j:jelly xmlns:j="jelly:core" xmlns:st="jelly:stapler" xmlns:l="/lib/layout">
  <l:layout title="${it.displayName}">
    <st:include page="sidepanel.jelly" class="hudson.model.Job"/>
    <l:main-panel>
      <!-- keep this comment -->
      <st:include page="main.jelly"  class='hudson.model.AbstractItem' />
    </l:main-panel>
  </l:layout>
</j:jelly>
"#;

pub const PAGE_MIGRATED: &str = r#"<?jelly escape-by-default='true'?>
<j:jelly xmlns:j="jelly:core" xmlns:st="jelly:stapler" xmlns:l="/lib/layout">
  <l:layout title="${it.displayName}">
    <st:include page="sidepanel.jelly" clazz="hudson.model.Job"/>
    <l:main-panel>
      <!-- keep this comment -->
      <st:include page="main.jelly"  clazz='hudson.model.AbstractItem' />
    </l:main-panel>
  </l:layout>
</j:jelly>
"#;

/// Jelly page without the Stapler namespace
pub const PAGE_WITHOUT_STAPLER: &str = r#"<j:jelly xmlns:j="jelly:core">
  <include class="hudson.model.Job"/>
</j:jelly>
"#;

/// Jelly page whose Stapler tags have nothing to rename
pub const PAGE_WITHOUT_CLASS: &str = r#"<j:jelly xmlns:j="jelly:core" xmlns:st="jelly:stapler">
  <st:include page="index.jelly"/>
  <st:included class="hudson.model.Job"/>
</j:jelly>
"#;

pub const BROKEN_PAGE: &str = r#"<j:jelly xmlns:j="jelly:core" xmlns:st="jelly:stapler">
  <st:include class="hudson.model.Job">
</j:jelly>
"#;
