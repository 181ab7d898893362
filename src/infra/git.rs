//! Git operations
//!
//! The working tree holding the recipe repository is driven through plain git
//! commands. The [`Vcs`] trait is the seam the core uses; tests substitute
//! their own implementation.

use std::path::{Path, PathBuf};

use crate::error::VcsError;
use crate::infra::proc::{run_cmd, CmdError};

/// Revision of the empty tree, used as the first-run sentinel for the
/// last-processed commit.
pub const EMPTY_COMMIT: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Version-control operations the build cycle needs
pub trait Vcs {
    /// Current HEAD revision.
    fn head(&self) -> Result<String, VcsError>;

    /// Name of the currently checked-out branch.
    fn current_branch(&self) -> Result<String, VcsError>;

    /// Discard all working-tree changes.
    fn reset_hard(&self) -> Result<(), VcsError>;

    /// Force-sync the working tree to the remote state.
    fn pull_override(&self) -> Result<(), VcsError>;

    /// Push local commits.
    fn push(&self) -> Result<(), VcsError>;

    /// Paths touched between two revisions, relative to the repository root.
    fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<PathBuf>, VcsError>;

    /// Content of `path` at `rev`, or `None` when absent at that revision.
    fn file_at(&self, rev: &str, path: &Path) -> Result<Option<String>, VcsError>;
}

/// Git repository operations
#[derive(Debug)]
pub struct GitRepo {
    /// Working directory for git operations
    work_dir: PathBuf,

    /// Branch expected to be checked out
    branch: String,
}

impl GitRepo {
    /// Create a new git operations handler
    pub fn new(work_dir: PathBuf, branch: String) -> Self {
        Self { work_dir, branch }
    }

    /// Get the working directory
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn git(&self, args: &[&str]) -> Result<String, CmdError> {
        let mut argv = vec!["git"];
        argv.extend_from_slice(args);
        run_cmd(&argv, Some(&self.work_dir))
    }
}

impl Vcs for GitRepo {
    fn head(&self) -> Result<String, VcsError> {
        let out = self.git(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn current_branch(&self) -> Result<String, VcsError> {
        let out = self.git(&["symbolic-ref", "--short", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn reset_hard(&self) -> Result<(), VcsError> {
        self.git(&["reset", "--hard"])?;
        Ok(())
    }

    fn pull_override(&self) -> Result<(), VcsError> {
        self.git(&["fetch", "--quiet", "--prune"])?;
        let target = format!("origin/{}", self.branch);
        self.git(&["reset", "--hard", &target])?;
        Ok(())
    }

    fn push(&self) -> Result<(), VcsError> {
        self.git(&["push", "--quiet"])?;
        Ok(())
    }

    fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<PathBuf>, VcsError> {
        let range = format!("{from}..{to}");
        let out = self.git(&["diff", "--name-only", &range])?;
        Ok(out.lines().map(PathBuf::from).collect())
    }

    fn file_at(&self, rev: &str, path: &Path) -> Result<Option<String>, VcsError> {
        let spec = format!("{rev}:{}", path.display());
        match self.git(&["show", &spec]) {
            Ok(content) => Ok(Some(content)),
            // `git show` fails when the path does not exist at that revision;
            // that is an answer, not an error.
            Err(CmdError::Failed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
