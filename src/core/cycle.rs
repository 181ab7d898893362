//! The build cycle
//!
//! One invocation, one [`Cycle`]: refresh the working tree, load recipes,
//! detect what needs building, plan the order, supervise the builds, then
//! record outcomes. Recording always runs, even when the main body errors or
//! the operator interrupts; the last processed revision only advances when
//! the body ran to completion.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use crate::config::Config;
use crate::core::build::{self, BuildSession};
use crate::core::depgraph::DepGraph;
use crate::core::detect::{self, ChangeSets};
use crate::core::plan::{self, Plan};
use crate::core::recipe::{self, Recipe, SystemDb};
use crate::core::record::{self, CycleOutcome};
use crate::core::store::Store;
use crate::core::version::NvResult;
use crate::error::CycleError;
use crate::infra::builder::{BindMount, Builder};
use crate::infra::git::Vcs;
use crate::infra::logfile::{BuildJournal, LogLayout};
use crate::infra::nvchecker::VersionChecker;
use crate::infra::report::Reporter;

/// External collaborators of one cycle
pub struct Collaborators<'a> {
    pub vcs: &'a dyn Vcs,
    pub checker: &'a dyn VersionChecker,
    pub builder: &'a dyn Builder,
    pub reporter: &'a dyn Reporter,
    pub sysdb: &'a dyn SystemDb,
}

/// One invocation's orchestration state
pub struct Cycle<'a> {
    pub config: &'a Config,
    pub store: &'a mut Store,
    pub logs: &'a LogLayout,
    pub journal: &'a mut BuildJournal,
    pub interrupted: &'a AtomicBool,

    /// Explicit packages for manual-rebuild mode; empty runs full detection
    pub pkgs_to_build: &'a [String],
}

/// Everything accumulated while the cycle body runs, available to the
/// recorder regardless of how far the body got.
#[derive(Default)]
struct CycleState {
    built: BTreeSet<String>,
    failed: BTreeSet<String>,
    nvdata: BTreeMap<String, NvResult>,
    need_update: BTreeSet<String>,
    rebuild: BTreeSet<String>,
}

impl<'a> Cycle<'a> {
    /// Run one full cycle.
    pub fn run(&mut self, collab: &Collaborators<'_>) -> Result<(), CycleError> {
        let mut state = CycleState::default();

        let result = self.run_body(collab, &mut state);

        record::record_outcomes(
            self.store,
            collab.checker,
            collab.vcs,
            &CycleOutcome {
                built: &state.built,
                failed: &state.failed,
                nvdata: &state.nvdata,
                need_update: &state.need_update,
                rebuild: &state.rebuild,
                rebuild_failed_only: self.config.pkgcycle.rebuild_failed_pkgs,
                push_enabled: self.config.pkgcycle.git_push,
            },
        );

        if result.is_ok() {
            match collab.vcs.head() {
                Ok(head) => self.store.last_commit = head,
                Err(e) => warn!("could not read HEAD, keeping last commit: {e}"),
            }
        }

        result
    }

    fn run_body(
        &mut self,
        collab: &Collaborators<'_>,
        state: &mut CycleState,
    ) -> Result<(), CycleError> {
        let branch = collab.vcs.current_branch()?;
        if branch != self.config.pkgcycle.primary_branch {
            return Err(CycleError::WrongBranch {
                expected: self.config.pkgcycle.primary_branch.clone(),
                found: branch,
            });
        }

        collab.vcs.reset_hard()?;
        collab.vcs.pull_override()?;

        let repodir = self.config.repo_dir();
        let (mut recipes, load_errors) = recipe::load_recipes(&repodir);
        for (pkgbase, err) in &load_errors {
            collab
                .reporter
                .recipe_load_error(pkgbase, &err.to_string());
            state.failed.insert(pkgbase.clone());
        }
        info!(
            "loaded {} recipes ({} failed to load)",
            recipes.len(),
            load_errors.len()
        );

        let graph = DepGraph::from_recipes(&recipes, &repodir);

        let manual = !self.pkgs_to_build.is_empty();
        if manual {
            narrow_recipes(&mut recipes, &graph, self.pkgs_to_build);
        }

        let check = collab.checker.check(&recipes)?;
        state.nvdata = check.results.clone();
        state.rebuild = check.rebuild.clone();

        let sets: ChangeSets = if manual {
            ChangeSets::manual(self.pkgs_to_build, &check)
        } else {
            detect::detect(
                &recipes,
                &check,
                &self.store.failed,
                collab.vcs,
                &self.store.last_commit,
            )?
        };
        state.need_update = sets.need_update.clone();

        let plan: Plan = plan::make_plan(
            &graph,
            &recipes,
            &sets.all_building,
            collab.sysdb,
            collab.reporter,
        )?;

        if manual {
            // An explicit request covers the dependencies it drags in: every
            // planned package advances its recorded version once handled.
            state.need_update = plan.order.iter().cloned().collect();
        }

        let bindmounts = prepare_bindmounts(&self.config.repository.bindmounts);
        let mut session = BuildSession {
            builder: collab.builder,
            reporter: collab.reporter,
            journal: &mut *self.journal,
            logs: self.logs,
            bindmounts: &bindmounts,
            builder_name: &self.config.pkgcycle.name,
            destdir: self.config.repository.destdir.as_deref(),
            package_suffixes: &self.config.repository.package_suffixes,
            interrupted: self.interrupted,
        };

        build::run_builds(
            &mut session,
            &plan,
            &recipes,
            &state.nvdata,
            &mut state.built,
            &mut state.failed,
        );

        Ok(())
    }
}

/// Manual mode works on the requested packages plus their direct deps.
fn narrow_recipes(
    recipes: &mut BTreeMap<String, Recipe>,
    graph: &DepGraph,
    pkgs_to_build: &[String],
) {
    let mut keep: BTreeSet<String> = pkgs_to_build.iter().cloned().collect();
    for pkg in pkgs_to_build {
        if let Some(deps) = graph.get(pkg) {
            keep.extend(deps.iter().map(|d| d.pkgname.clone()));
        }
    }
    recipes.retain(|pkgbase, _| keep.contains(pkgbase));
}

/// Bind-mount sources must exist before the first build.
fn prepare_bindmounts(specs: &[String]) -> Vec<BindMount> {
    let mounts: Vec<BindMount> = specs.iter().map(|s| BindMount::parse(s)).collect();
    for mount in &mounts {
        if let Err(e) = std::fs::create_dir_all(&mount.source) {
            warn!(
                "could not create bind mount source {}: {e}",
                mount.source.display()
            );
        }
    }
    mounts
}
