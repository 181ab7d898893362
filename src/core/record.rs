//! Outcome recording
//!
//! Runs after the build loop on every path out of it, including errors and
//! interrupts: reconciles the persistent failure record, advances recorded
//! upstream versions for correctly handled packages, and restores the
//! working tree. Nothing in here propagates an error; this is the cycle's
//! finally path.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info};

use crate::core::store::Store;
use crate::core::version::NvResult;
use crate::infra::git::Vcs;
use crate::infra::nvchecker::VersionChecker;

/// What one finished (or aborted) cycle hands to the recorder
pub struct CycleOutcome<'a> {
    /// Packages built and published this cycle
    pub built: &'a BTreeSet<String>,

    /// Packages failed this cycle (including recipe load errors)
    pub failed: &'a BTreeSet<String>,

    /// The checker's version results
    pub nvdata: &'a BTreeMap<String, NvResult>,

    /// Packages whose upstream moved this cycle
    pub need_update: &'a BTreeSet<String>,

    /// Packages flagged for unconditional rebuild
    pub rebuild: &'a BTreeSet<String>,

    /// Advance versions only for packages actually built
    pub rebuild_failed_only: bool,

    /// Push the working tree when done
    pub push_enabled: bool,
}

/// Reconcile state after the build loop.
pub fn record_outcomes(
    store: &mut Store,
    checker: &dyn VersionChecker,
    vcs: &dyn Vcs,
    outcome: &CycleOutcome<'_>,
) {
    for pkg in outcome.failed {
        let entry = store.failed.entry(pkg.clone()).or_insert(None);
        if let Some(newver) = outcome.nvdata.get(pkg).and_then(|nv| nv.newver.clone()) {
            *entry = Some(newver);
        }
    }
    for pkg in outcome.built {
        store.failed.remove(pkg);
    }

    let take_set = advance_set(outcome);
    if !take_set.is_empty() {
        if let Err(e) = checker.take(&take_set, outcome.nvdata) {
            error!("failed to advance recorded versions: {e}");
        }
    }

    if let Err(e) = vcs.reset_hard() {
        error!("failed to reset the working tree: {e}");
    }
    if outcome.push_enabled {
        if let Err(e) = vcs.push() {
            error!("failed to push: {e}");
        }
    }

    info!(
        built = outcome.built.len(),
        failed = outcome.failed.len(),
        advanced = take_set.len(),
        "cycle outcomes recorded"
    );
}

/// Which packages get their recorded upstream versions advanced.
///
/// Default policy: packages observed to succeed or fail on their own account,
/// restricted to those a version movement (or unconditional-rebuild flag)
/// actually triggered, never packages that were only dragged in as
/// dependencies or never attempted.
fn advance_set(outcome: &CycleOutcome<'_>) -> BTreeSet<String> {
    if outcome.rebuild_failed_only {
        return outcome.built.clone();
    }

    let handled: BTreeSet<String> = outcome.built.union(outcome.failed).cloned().collect();
    let triggered: BTreeSet<String> = outcome
        .need_update
        .union(outcome.rebuild)
        .cloned()
        .collect();
    handled.intersection(&triggered).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn nv(entries: &[(&str, &str, &str)]) -> BTreeMap<String, NvResult> {
        entries
            .iter()
            .map(|(name, old, new)| (name.to_string(), NvResult::new(Some(old), Some(new))))
            .collect()
    }

    #[test]
    fn test_advance_set_default_mode() {
        let built = set(&["a", "dep"]);
        let failed = set(&["b"]);
        let nvdata = nv(&[("a", "1", "2"), ("b", "3", "4")]);
        let need_update = set(&["a", "b"]);
        let rebuild = set(&[]);

        let outcome = CycleOutcome {
            built: &built,
            failed: &failed,
            nvdata: &nvdata,
            need_update: &need_update,
            rebuild: &rebuild,
            rebuild_failed_only: false,
            push_enabled: false,
        };

        // `dep` was only dragged in as a dependency and must not advance.
        assert_eq!(advance_set(&outcome), set(&["a", "b"]));
    }

    #[test]
    fn test_advance_set_rebuild_failed_mode() {
        let built = set(&["a"]);
        let failed = set(&["b"]);
        let nvdata = nv(&[("a", "1", "2"), ("b", "3", "4")]);
        let need_update = set(&["a", "b"]);
        let rebuild = set(&[]);

        let outcome = CycleOutcome {
            built: &built,
            failed: &failed,
            nvdata: &nvdata,
            need_update: &need_update,
            rebuild: &rebuild,
            rebuild_failed_only: true,
            push_enabled: false,
        };

        assert_eq!(advance_set(&outcome), set(&["a"]));
    }

    #[test]
    fn test_advance_set_includes_unconditional_rebuilds() {
        let built = set(&["u"]);
        let failed = set(&[]);
        let nvdata = nv(&[("u", "1", "1")]);
        let need_update = set(&[]);
        let rebuild = set(&["u"]);

        let outcome = CycleOutcome {
            built: &built,
            failed: &failed,
            nvdata: &nvdata,
            need_update: &need_update,
            rebuild: &rebuild,
            rebuild_failed_only: false,
            push_enabled: false,
        };

        assert_eq!(advance_set(&outcome), set(&["u"]));
    }
}
