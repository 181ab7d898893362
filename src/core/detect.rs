//! Change detection
//!
//! Classifies every managed package by why it needs building this cycle:
//! upstream moved, a prior failure may be fixable, the recipe changed, or the
//! checker flagged it for unconditional rebuild. Packages the checker has no
//! verdict for are ineligible for any version-driven trigger.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, warn};

use crate::config::defaults::PKGBUILD_FILE;
use crate::core::recipe::Recipe;
use crate::core::version::{self, CheckOutcome};
use crate::error::VcsError;
use crate::infra::git::{Vcs, EMPTY_COMMIT};

/// The classification of one cycle's packages
#[derive(Debug, Default)]
pub struct ChangeSets {
    /// Upstream version moved
    pub updated: BTreeSet<String>,

    /// Previously failed, upstream moved past the failed attempt
    pub failed_updated: BTreeSet<String>,

    /// Recipe changed between the last processed commit and HEAD
    pub changed: BTreeSet<String>,

    /// Previously failed and the recipe changed; the edit may fix it
    pub need_rebuild_failed: BTreeSet<String>,

    /// Recipe changed its pkgrel without an upstream change
    pub need_rebuild_pkgrel: BTreeSet<String>,

    /// updated + failed_updated
    pub need_update: BTreeSet<String>,

    /// Everything to build this cycle
    pub all_building: BTreeSet<String>,
}

impl ChangeSets {
    /// Bypass detection for an explicit package list: build exactly those
    /// plus whatever the checker unconditionally flags.
    pub fn manual(pkgs_to_build: &[String], check: &CheckOutcome) -> Self {
        let mut all_building: BTreeSet<String> =
            pkgs_to_build.iter().cloned().collect();
        all_building.extend(check.rebuild.iter().cloned());

        Self {
            // Manually requested packages count as needing an update so
            // their upstream versions advance once handled.
            need_update: all_building.clone(),
            all_building,
            ..Self::default()
        }
    }
}

/// Classify managed packages for one cycle.
///
/// `prior_failed` is the persistent failure record; `last_commit` bounds the
/// VCS diff, with the empty-tree sentinel meaning "everything changed".
pub fn detect(
    recipes: &BTreeMap<String, Recipe>,
    check: &CheckOutcome,
    prior_failed: &BTreeMap<String, Option<String>>,
    vcs: &dyn Vcs,
    last_commit: &str,
) -> Result<ChangeSets, VcsError> {
    let mut sets = ChangeSets::default();

    for (pkg, nv) in &check.results {
        if !recipes.contains_key(pkg) {
            continue;
        }
        if nv.updated() {
            if check.unknown.contains(pkg) {
                warn!("{pkg}: version verdict unknown, not treating as updated");
                continue;
            }
            sets.updated.insert(pkg.clone());
        }
    }

    sets.changed = changed_packages(recipes, vcs, last_commit)?;

    for (pkg, last_attempt) in prior_failed {
        let Some(nv) = check.results.get(pkg) else {
            continue;
        };
        if check.unknown.contains(pkg) {
            warn!("{pkg}: version verdict unknown, not retrying prior failure");
            continue;
        }
        if nv.newver.is_some() && nv.newver != *last_attempt {
            sets.failed_updated.insert(pkg.clone());
        }
    }

    sets.need_rebuild_failed = prior_failed
        .keys()
        .filter(|pkg| sets.changed.contains(*pkg))
        .cloned()
        .collect();

    sets.need_rebuild_pkgrel = pkgrel_changed(&sets.changed, recipes, check, vcs, last_commit)?;

    sets.need_update = sets.updated.union(&sets.failed_updated).cloned().collect();

    sets.all_building = sets.need_update.clone();
    sets.all_building.extend(sets.need_rebuild_failed.iter().cloned());
    sets.all_building.extend(sets.need_rebuild_pkgrel.iter().cloned());
    sets.all_building
        .extend(check.rebuild.iter().filter(|p| recipes.contains_key(*p)).cloned());

    debug!(
        updated = sets.updated.len(),
        failed_updated = sets.failed_updated.len(),
        changed = sets.changed.len(),
        rebuild_failed = sets.need_rebuild_failed.len(),
        rebuild_pkgrel = sets.need_rebuild_pkgrel.len(),
        building = sets.all_building.len(),
        "change detection done"
    );

    Ok(sets)
}

/// Managed packages touched between `last_commit` and HEAD.
fn changed_packages(
    recipes: &BTreeMap<String, Recipe>,
    vcs: &dyn Vcs,
    last_commit: &str,
) -> Result<BTreeSet<String>, VcsError> {
    if last_commit == EMPTY_COMMIT {
        return Ok(recipes.keys().cloned().collect());
    }

    let mut changed = BTreeSet::new();
    for path in vcs.changed_paths(last_commit, "HEAD")? {
        let Some(first) = path.components().next() else {
            continue;
        };
        let name = first.as_os_str().to_string_lossy();
        if recipes.contains_key(name.as_ref()) {
            changed.insert(name.into_owned());
        }
    }
    Ok(changed)
}

/// Packages whose pkgrel differs between `last_commit` and HEAD, excluding
/// packages with an unknown version verdict.
fn pkgrel_changed(
    changed: &BTreeSet<String>,
    recipes: &BTreeMap<String, Recipe>,
    check: &CheckOutcome,
    vcs: &dyn Vcs,
    last_commit: &str,
) -> Result<BTreeSet<String>, VcsError> {
    // With no previous commit there is nothing to compare against.
    if last_commit == EMPTY_COMMIT {
        return Ok(BTreeSet::new());
    }

    let mut result = BTreeSet::new();
    for pkg in changed {
        let Some(recipe) = recipes.get(pkg) else {
            continue;
        };
        let rel_path = Path::new(pkg).join(PKGBUILD_FILE);

        let old_rel = vcs
            .file_at(last_commit, &rel_path)?
            .and_then(|c| version::extract_pkgver_pkgrel(&c).1);
        let new_rel = match std::fs::read_to_string(recipe.pkgdir.join(PKGBUILD_FILE)) {
            Ok(content) => version::extract_pkgver_pkgrel(&content).1,
            Err(_) => None,
        };

        if old_rel != new_rel {
            if check.unknown.contains(pkg) {
                warn!("{pkg}: pkgrel changed but version verdict unknown, not rebuilding");
                continue;
            }
            result.insert(pkg.clone());
        }
    }
    Ok(result)
}
