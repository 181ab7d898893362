//! Builder backend
//!
//! The actual compile happens outside the orchestrator, behind the
//! [`Builder`] trait. Every non-success comes back as a tagged
//! [`BuildError`] variant so the supervisor can pick the matching recovery
//! path. The shipped [`CommandBuilder`] runs a configured command in the
//! package directory inside its own process group, with output captured to
//! the build's log file.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::debug;

use crate::config::defaults::PKGBUILD_FILE;
use crate::core::recipe::{Dep, Recipe, SystemDb};
use crate::core::version::{self, NvResult, PackageVersion};
use crate::error::BuildError;
use crate::infra::proc::{self, WaitOutcome};

/// A host directory made available to the build, as `source:target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path, shared read-write across builds
    pub source: PathBuf,

    /// Path the build sees
    pub target: PathBuf,
}

impl BindMount {
    /// Parse a `source:target` pair; a bare path mounts to itself.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((source, target)) => Self {
                source: PathBuf::from(source),
                target: PathBuf::from(target),
            },
            None => Self {
                source: PathBuf::from(spec),
                target: PathBuf::from(spec),
            },
        }
    }
}

/// Everything one build needs to know
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Package being built
    pub pkgbase: &'a str,

    /// Its recipe
    pub recipe: &'a Recipe,

    /// Upstream version movement, when the checker produced one
    pub update: Option<&'a NvResult>,

    /// Dependencies to install before building
    pub depends: &'a BTreeSet<Dep>,

    /// Shared cache directories for the build
    pub bindmounts: &'a [BindMount],

    /// PACKAGER identity for this build
    pub packager: &'a str,

    /// Capture file for all build output
    pub log_file: &'a Path,

    /// Hard wall-clock limit
    pub deadline: Instant,
}

/// A successfully built package
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    /// The `[epoch:]pkgver-pkgrel` that was built, when determinable
    pub version: Option<PackageVersion>,
}

/// The external compile step
pub trait Builder {
    /// Build one package. Must not outlive `ctx.deadline`: on expiry the
    /// implementation reaps its whole process group and reports
    /// [`BuildError::TimedOut`].
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuiltPackage, BuildError>;
}

/// Runs a configured build command in the package directory
#[derive(Debug)]
pub struct CommandBuilder {
    program: Vec<String>,
}

impl CommandBuilder {
    pub fn new(program: Vec<String>) -> Self {
        Self { program }
    }
}

impl Builder for CommandBuilder {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuiltPackage, BuildError> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(ctx.log_file)
            .map_err(|e| BuildError::Failed {
                message: format!("cannot open log file: {e}"),
            })?;
        let log_err = log.try_clone().map_err(|e| BuildError::Failed {
            message: format!("cannot clone log handle: {e}"),
        })?;

        let dep_dirs: Vec<String> = ctx
            .depends
            .iter()
            .map(|d| d.pkgdir.display().to_string())
            .collect();
        let mounts: Vec<String> = ctx
            .bindmounts
            .iter()
            .map(|m| format!("{}:{}", m.source.display(), m.target.display()))
            .collect();

        let mut cmd = Command::new(&self.program[0]);
        cmd.args(&self.program[1..])
            .current_dir(&ctx.recipe.pkgdir)
            .env("PACKAGER", ctx.packager)
            .env("PKGCYCLE_DEPENDS", dep_dirs.join(" "))
            .env("PKGCYCLE_BINDMOUNTS", mounts.join(" "))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let mut child = proc::spawn_group(&mut cmd).map_err(|e| BuildError::Failed {
            message: format!("failed to spawn builder: {e}"),
        })?;

        let outcome = proc::wait_deadline(&mut child, ctx.deadline).map_err(|e| {
            proc::kill_group(&mut child);
            BuildError::Failed {
                message: format!("failed waiting for builder: {e}"),
            }
        })?;

        match outcome {
            WaitOutcome::TimedOut => {
                proc::kill_group(&mut child);
                Err(BuildError::TimedOut {
                    limit_secs: u64::from(ctx.recipe.time_limit_hours) * 3600,
                })
            }
            WaitOutcome::Exited(status) if status.success() => {
                let version = std::fs::read_to_string(ctx.recipe.pkgdir.join(PKGBUILD_FILE))
                    .ok()
                    .and_then(|content| version::extract_package_version(&content));
                debug!(pkgbase = ctx.pkgbase, "builder finished");
                Ok(BuiltPackage { version })
            }
            WaitOutcome::Exited(status) => Err(BuildError::Failed {
                message: format!("builder exited with {status}"),
            }),
        }
    }
}

/// System package database probe backed by pacman
#[derive(Debug, Default)]
pub struct PacmanDb;

impl SystemDb for PacmanDb {
    fn has_package(&self, name: &str) -> bool {
        Command::new("pacman")
            .args(["-Si", "--", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindmount_parse_pair() {
        let mount = BindMount::parse("/var/cache/cargo:/build/.cargo");
        assert_eq!(mount.source, PathBuf::from("/var/cache/cargo"));
        assert_eq!(mount.target, PathBuf::from("/build/.cargo"));
    }

    #[test]
    fn test_bindmount_parse_bare_path() {
        let mount = BindMount::parse("/var/cache/go");
        assert_eq!(mount.source, mount.target);
    }
}
