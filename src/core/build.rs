//! Build supervision
//!
//! Drives the planned builds one at a time. Each package gets its own log
//! file, PACKAGER identity and wall-clock deadline; every way a build can end
//! is routed to exactly one recovery path, and nothing a single package does
//! can take down the cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{info, warn};

use crate::core::plan::Plan;
use crate::core::recipe::Recipe;
use crate::core::version::NvResult;
use crate::error::BuildError;
use crate::infra::builder::{BindMount, BuildContext, Builder};
use crate::infra::logfile::{BuildEvent, BuildJournal, LogLayout};
use crate::infra::publish;
use crate::infra::report::Reporter;

/// Collaborators and settings shared by every build of one cycle
pub struct BuildSession<'a> {
    pub builder: &'a dyn Builder,
    pub reporter: &'a dyn Reporter,
    pub journal: &'a mut BuildJournal,
    pub logs: &'a LogLayout,
    pub bindmounts: &'a [BindMount],
    pub builder_name: &'a str,
    pub destdir: Option<&'a Path>,
    pub package_suffixes: &'a [String],
    pub interrupted: &'a AtomicBool,
}

/// Run every planned build in order.
///
/// `built` and `failed` are updated in place; `failed` arrives seeded with
/// the packages whose recipes already failed to load, and a package that is
/// in it by the time its turn comes is skipped, not attempted.
pub fn run_builds(
    session: &mut BuildSession<'_>,
    plan: &Plan,
    recipes: &BTreeMap<String, Recipe>,
    nvdata: &BTreeMap<String, NvResult>,
    built: &mut BTreeSet<String>,
    failed: &mut BTreeSet<String>,
) {
    for pkgbase in &plan.order {
        if session.interrupted.load(Ordering::SeqCst) {
            warn!("interrupted, stopping the build loop");
            break;
        }

        if failed.contains(pkgbase) {
            warn!("{pkgbase}: failed earlier this cycle, not attempting");
            session.journal.record(&BuildEvent::Skipped {
                pkgbase: pkgbase.clone(),
                reason: "failed earlier this cycle".to_string(),
            });
            continue;
        }

        let Some(recipe) = recipes.get(pkgbase) else {
            warn!("{pkgbase}: planned but no recipe loaded, skipping");
            continue;
        };

        build_one(session, pkgbase, recipe, plan, nvdata, built, failed);
    }
}

fn build_one(
    session: &mut BuildSession<'_>,
    pkgbase: &str,
    recipe: &Recipe,
    plan: &Plan,
    nvdata: &BTreeMap<String, NvResult>,
    built: &mut BTreeSet<String>,
    failed: &mut BTreeSet<String>,
) {
    let empty_deps = BTreeSet::new();
    let nv = nvdata.get(pkgbase);
    let newver = nv.and_then(|nv| nv.newver.clone());

    let maintainer = recipe.first_maintainer();
    let packager = format!(
        "{} (on behalf of {}) <{}>",
        session.builder_name, maintainer.name, maintainer.email
    );

    let log_file = session.logs.package_log(pkgbase);
    let deadline = Instant::now() + recipe.time_limit();

    session.journal.record(&BuildEvent::Start {
        pkgbase: pkgbase.to_string(),
        nv_version: newver.clone(),
    });
    info!("{pkgbase}: build started");
    let started = Instant::now();

    let ctx = BuildContext {
        pkgbase,
        recipe,
        update: nv,
        depends: plan.depends.get(pkgbase).unwrap_or(&empty_deps),
        bindmounts: session.bindmounts,
        packager: &packager,
        log_file: &log_file,
        deadline,
    };

    let mut result = session.builder.build(&ctx);
    let elapsed = started.elapsed().as_secs();

    // Artifacts that cannot be published are as good as not built.
    if result.is_ok() {
        if let Some(destdir) = session.destdir {
            if let Err(e) =
                publish::sign_and_copy(&recipe.pkgdir, destdir, session.package_suffixes)
            {
                result = Err(BuildError::Failed {
                    message: format!("publishing failed: {e}"),
                });
            }
        }
    }

    match result {
        Ok(package) => {
            let pkg_version = package.version.as_ref().map(ToString::to_string);
            info!(
                "{pkgbase}: built {} (upstream {}) in {elapsed}s",
                pkg_version.as_deref().unwrap_or("-"),
                newver.as_deref().unwrap_or("-"),
            );
            built.insert(pkgbase.to_string());
            session.journal.record(&BuildEvent::Successful {
                pkgbase: pkgbase.to_string(),
                nv_version: newver,
                pkg_version,
                elapsed,
            });
        }

        Err(BuildError::Skipped { reason }) => {
            warn!("{pkgbase}: build skipped: {reason}");
            session.journal.record(&BuildEvent::Skipped {
                pkgbase: pkgbase.to_string(),
                reason,
            });
        }

        Err(error) => {
            warn!("{pkgbase}: build failed: {error}");
            report_failure(session, pkgbase, recipe, &error, failed, &log_file);
            failed.insert(pkgbase.to_string());
            session.journal.record(&BuildEvent::Failed {
                pkgbase: pkgbase.to_string(),
                nv_version: newver,
                elapsed,
                reason: error.to_string(),
            });
        }
    }

    session.journal.record(&BuildEvent::End {
        pkgbase: pkgbase.to_string(),
        elapsed,
    });
}

fn report_failure(
    session: &BuildSession<'_>,
    pkgbase: &str,
    recipe: &Recipe,
    error: &BuildError,
    failed: &BTreeSet<String>,
    log_file: &Path,
) {
    match error {
        BuildError::MissingDependencies { deps } => {
            let failed_deps: Vec<&str> = deps
                .iter()
                .filter(|d| failed.contains(*d))
                .map(String::as_str)
                .collect();
            let body = if failed_deps.is_empty() {
                format!(
                    "{pkgbase} cannot be built because these dependencies are \
                     missing:\n\n  {}\n",
                    deps.join("\n  ")
                )
            } else {
                format!(
                    "After building {}, {pkgbase} still depends on {}; those \
                     packages failed this cycle and must be fixed first.\n",
                    deps.join(", "),
                    failed_deps.join(", ")
                )
            };
            session.reporter.package_report(
                recipe,
                &format!("{pkgbase} is missing dependencies"),
                &body,
            );
        }

        BuildError::ConflictWithOfficial { groups, replaces } => {
            session.reporter.package_report(
                recipe,
                &format!("{pkgbase} conflicts with official repositories"),
                &format!(
                    "The built package conflicts with the official repositories.\n\
                     groups: {groups:?}\nreplaces: {replaces:?}\n"
                ),
            );
        }

        BuildError::Downgrading { built, repo } => {
            session.reporter.package_report(
                recipe,
                &format!("{pkgbase} built an older version than the repository"),
                &format!(
                    "The build produced version {built}, but the repository \
                     already has {repo}. Not publishing a downgrade.\n"
                ),
            );
        }

        BuildError::TimedOut { limit_secs } => {
            session.reporter.package_report(
                recipe,
                &format!("{pkgbase} build timed out"),
                &format!(
                    "The build exceeded its time limit of {limit_secs} seconds \
                     and its process group was terminated.\n\nLog: {}\n",
                    log_file.display()
                ),
            );
        }

        BuildError::Failed { message } => {
            session.reporter.package_report(
                recipe,
                &format!("{pkgbase} failed to build"),
                &format!("{message}\n\nLog: {}\n", log_file.display()),
            );
        }

        // Handled before reaching here.
        BuildError::Skipped { .. } => {}
    }
}
