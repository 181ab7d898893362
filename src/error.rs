//! Error types for pkgcycle
//!
//! Domain-specific error types using thiserror. Anything attributable to a
//! single package is recovered inside the per-package handling; the rest
//! escapes to the outer runtime-error reporter.

use std::path::PathBuf;
use thiserror::Error;

use crate::infra::proc::CmdError;

/// Recipe loading errors
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Recipe file missing from the package directory
    #[error("No recipe file found in '{path}'")]
    NotFound { path: PathBuf },

    /// IO error while reading the recipe
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Recipe file is not valid TOML
    #[error("Failed to parse recipe for '{pkgbase}': {error}")]
    ParseError { pkgbase: String, error: String },

    /// Maintainer list is empty
    #[error("Recipe for '{pkgbase}' declares no maintainers")]
    NoMaintainers { pkgbase: String },

    /// Time limit must be a positive number of hours
    #[error("Recipe for '{pkgbase}' declares a zero build time limit")]
    ZeroTimeLimit { pkgbase: String },
}

/// Planning errors (fatal for the whole invocation)
#[derive(Error, Debug)]
pub enum PlanError {
    /// Circular dependency among managed packages
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },
}

/// Version-control driver errors
#[derive(Error, Debug)]
pub enum VcsError {
    /// A git command failed
    #[error(transparent)]
    Cmd(#[from] CmdError),

    /// Command output was not understood
    #[error("Unexpected git output for {operation}: {output}")]
    BadOutput { operation: String, output: String },
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error reading or writing the store file
    #[error("IO error for store '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Store file is not valid JSON
    #[error("Failed to parse store '{path}': {error}")]
    ParseError { path: PathBuf, error: String },
}

/// Startup lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Another instance holds the lock
    #[error("Lock '{path}' is held by another instance")]
    Contended { path: PathBuf },

    /// IO error while locking
    #[error("Failed to acquire lock '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Version checker errors
#[derive(Error, Debug)]
pub enum CheckerError {
    /// Checker subprocess failed
    #[error(transparent)]
    Cmd(#[from] CmdError),

    /// IO error on a record file
    #[error("IO error for record file '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Record file is not valid JSON
    #[error("Failed to parse record file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },
}

/// Publisher errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Signing subprocess failed
    #[error("Failed to sign '{path}': {error}")]
    SignError { path: PathBuf, error: String },

    /// Could not link an artifact into the destination
    #[error("Failed to link '{path}' into '{dest}': {error}")]
    LinkError {
        path: PathBuf,
        dest: PathBuf,
        error: String,
    },

    /// IO error while scanning the build directory
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Outcome of a single package build that did not produce artifacts.
///
/// The builder backend reports every non-success as one of these variants;
/// the build supervisor matches on them to pick the recovery path.
#[derive(Error, Debug)]
pub enum BuildError {
    /// One or more dependencies could not be installed
    #[error("missing dependencies: {}", deps.join(", "))]
    MissingDependencies { deps: Vec<String> },

    /// The built package would conflict with the official repositories
    #[error("conflicts with official repositories (groups: {groups:?}, replaces: {replaces:?})")]
    ConflictWithOfficial {
        groups: Vec<String>,
        replaces: Vec<String>,
    },

    /// The built version is older than what the repository already has
    #[error("built version {built} is older than repository version {repo}")]
    Downgrading { built: String, repo: String },

    /// The builder declined to build, without this being a failure
    #[error("build skipped: {reason}")]
    Skipped { reason: String },

    /// The wall-clock limit expired and the process group was reaped
    #[error("build timed out after {limit_secs} seconds")]
    TimedOut { limit_secs: u64 },

    /// Any other build failure
    #[error("build failed: {message}")]
    Failed { message: String },
}

/// Top-level error for one build cycle
#[derive(Error, Debug)]
pub enum CycleError {
    /// Working tree is not on the primary branch
    #[error("Working tree is on branch '{found}', expected '{expected}'")]
    WrongBranch { expected: String, found: String },

    /// Planning error
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// VCS error
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    /// Version checker error
    #[error("Version checker error: {0}")]
    Checker(#[from] CheckerError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
