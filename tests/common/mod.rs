//! Common test utilities and helpers
//!
//! Shared fixtures for integration tests: a temporary recipe repository and
//! scripted stand-ins for the external collaborators (VCS, version checker,
//! builder, reporter, system package database).

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use tempfile::TempDir;

use pkgcycle::config::Config;
use pkgcycle::core::cycle::{Collaborators, Cycle};
use pkgcycle::core::recipe::{Recipe, SystemDb};
use pkgcycle::core::store::Store;
use pkgcycle::core::version::{CheckOutcome, NvResult};
use pkgcycle::error::{BuildError, CheckerError, CycleError, VcsError};
use pkgcycle::infra::builder::{BuildContext, Builder, BuiltPackage};
use pkgcycle::infra::git::Vcs;
use pkgcycle::infra::logfile::{BuildJournal, LogLayout};
use pkgcycle::infra::nvchecker::VersionChecker;
use pkgcycle::infra::report::Reporter;

/// Temporary recipe repository
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let repo = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        std::fs::create_dir_all(repo.repo_dir()).expect("Failed to create repo directory");
        repo
    }

    /// Base directory holding state files and the repository tree.
    pub fn base_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// The recipe tree.
    pub fn repo_dir(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Add a managed package with the given dependencies.
    pub fn add_package(&self, pkgbase: &str, deps: &[&str]) {
        let pkgdir = self.repo_dir().join(pkgbase);
        std::fs::create_dir_all(&pkgdir).expect("Failed to create package directory");

        let deps_toml = deps
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let recipe = format!(
            "maintainers = [{{ name = \"Test Person\", email = \"test@example.org\", \
             handle = \"tester\" }}]\nrepo_depends = [{deps_toml}]\n"
        );
        std::fs::write(pkgdir.join("recipe.toml"), recipe).expect("Failed to write recipe");
        std::fs::write(
            pkgdir.join("PKGBUILD"),
            format!("pkgname={pkgbase}\npkgver=1.0\npkgrel=1\n"),
        )
        .expect("Failed to write PKGBUILD");
    }

    /// Add a package whose recipe cannot be parsed.
    pub fn add_broken_package(&self, pkgbase: &str) {
        let pkgdir = self.repo_dir().join(pkgbase);
        std::fs::create_dir_all(&pkgdir).expect("Failed to create package directory");
        std::fs::write(pkgdir.join("recipe.toml"), "maintainers = [[[")
            .expect("Failed to write recipe");
    }

    /// A config rooted at this repository.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.pkgcycle.basedir = self.base_dir();
        config.pkgcycle.repodir = PathBuf::from("repo");
        config
    }
}

/// Scripted VCS
pub struct MockVcs {
    pub branch: String,
    pub head: String,
    pub changed: Vec<String>,
    pub old_files: HashMap<String, String>,
    pub resets: Mutex<u32>,
    pub pushes: Mutex<u32>,
}

impl Default for MockVcs {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
            head: "headrev".to_string(),
            changed: Vec::new(),
            old_files: HashMap::new(),
            resets: Mutex::new(0),
            pushes: Mutex::new(0),
        }
    }
}

impl Vcs for MockVcs {
    fn head(&self) -> Result<String, VcsError> {
        Ok(self.head.clone())
    }

    fn current_branch(&self) -> Result<String, VcsError> {
        Ok(self.branch.clone())
    }

    fn reset_hard(&self) -> Result<(), VcsError> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    fn pull_override(&self) -> Result<(), VcsError> {
        Ok(())
    }

    fn push(&self) -> Result<(), VcsError> {
        *self.pushes.lock().unwrap() += 1;
        Ok(())
    }

    fn changed_paths(&self, _from: &str, _to: &str) -> Result<Vec<PathBuf>, VcsError> {
        Ok(self.changed.iter().map(PathBuf::from).collect())
    }

    fn file_at(&self, _rev: &str, path: &Path) -> Result<Option<String>, VcsError> {
        Ok(self.old_files.get(&path.display().to_string()).cloned())
    }
}

/// Scripted version checker
#[derive(Default)]
pub struct MockChecker {
    pub outcome: CheckOutcome,
    pub taken: Mutex<Vec<BTreeSet<String>>>,
}

impl MockChecker {
    pub fn with_results(entries: &[(&str, Option<&str>, Option<&str>)]) -> Self {
        let mut outcome = CheckOutcome::default();
        for (name, old, new) in entries {
            outcome
                .results
                .insert(name.to_string(), NvResult::new(*old, *new));
            if new.is_none() {
                outcome.unknown.insert(name.to_string());
            }
        }
        Self {
            outcome,
            taken: Mutex::new(Vec::new()),
        }
    }

    /// All sets nv_take was called with, across the whole cycle.
    pub fn taken_sets(&self) -> Vec<BTreeSet<String>> {
        self.taken.lock().unwrap().clone()
    }
}

impl VersionChecker for MockChecker {
    fn check(&self, _recipes: &BTreeMap<String, Recipe>) -> Result<CheckOutcome, CheckerError> {
        Ok(self.outcome.clone())
    }

    fn take(
        &self,
        pkgs: &BTreeSet<String>,
        _results: &BTreeMap<String, NvResult>,
    ) -> Result<(), CheckerError> {
        self.taken.lock().unwrap().push(pkgs.clone());
        Ok(())
    }
}

/// What a scripted builder does for one package
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Skip(String),
    FailGeneric(String),
    FailMissingDeps(Vec<String>),
    Timeout,
}

/// Scripted builder recording the order packages were attempted in
#[derive(Default)]
pub struct ScriptedBuilder {
    outcomes: HashMap<String, ScriptedOutcome>,
    pub attempted: Mutex<Vec<String>>,
}

impl ScriptedBuilder {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, pkgbase: &str, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert(pkgbase.to_string(), outcome);
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }
}

impl Builder for ScriptedBuilder {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuiltPackage, BuildError> {
        self.attempted.lock().unwrap().push(ctx.pkgbase.to_string());

        match self
            .outcomes
            .get(ctx.pkgbase)
            .unwrap_or(&ScriptedOutcome::Succeed)
        {
            ScriptedOutcome::Succeed => Ok(BuiltPackage { version: None }),
            ScriptedOutcome::Skip(reason) => Err(BuildError::Skipped {
                reason: reason.clone(),
            }),
            ScriptedOutcome::FailGeneric(message) => Err(BuildError::Failed {
                message: message.clone(),
            }),
            ScriptedOutcome::FailMissingDeps(deps) => Err(BuildError::MissingDependencies {
                deps: deps.clone(),
            }),
            ScriptedOutcome::Timeout => Err(BuildError::TimedOut { limit_secs: 3600 }),
        }
    }
}

/// Reporter collecting subjects
#[derive(Default)]
pub struct RecordingReporter {
    pub subjects: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn seen(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn package_report(&self, _recipe: &Recipe, subject: &str, _body: &str) {
        self.subjects.lock().unwrap().push(subject.to_string());
    }

    fn recipe_load_error(&self, pkgbase: &str, _detail: &str) {
        self.subjects
            .lock()
            .unwrap()
            .push(format!("recipe load error: {pkgbase}"));
    }

    fn runtime_error(&self, subject: &str, _body: &str) {
        self.subjects.lock().unwrap().push(subject.to_string());
    }
}

/// System database stub
#[derive(Default)]
pub struct StubSysDb {
    pub known: BTreeSet<String>,
}

impl StubSysDb {
    pub fn with(names: &[&str]) -> Self {
        Self {
            known: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SystemDb for StubSysDb {
    fn has_package(&self, name: &str) -> bool {
        self.known.contains(name)
    }
}

/// Run one cycle against the mocks.
#[allow(clippy::too_many_arguments)]
pub fn run_cycle(
    repo: &TestRepo,
    store: &mut Store,
    vcs: &MockVcs,
    checker: &MockChecker,
    builder: &ScriptedBuilder,
    reporter: &RecordingReporter,
    sysdb: &StubSysDb,
    pkgs_to_build: &[String],
) -> Result<(), CycleError> {
    let config = repo.config();
    let logs = LogLayout::new(&config.log_base()).expect("Failed to create log layout");
    let mut journal = BuildJournal::open(
        &config.build_log_path(),
        &config.build_log_json_path(),
    )
    .expect("Failed to open journals");
    let interrupted = AtomicBool::new(false);

    let mut cycle = Cycle {
        config: &config,
        store,
        logs: &logs,
        journal: &mut journal,
        interrupted: &interrupted,
        pkgs_to_build,
    };

    cycle.run(&Collaborators {
        vcs,
        checker,
        builder,
        reporter,
        sysdb,
    })
}
