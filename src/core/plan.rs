//! Build set planning
//!
//! Expands the detected build set by transitive closure over managed
//! dependencies, reports unresolvable external dependencies to maintainers,
//! and produces the ordered build list together with the effective
//! per-package dependency sets the builder installs beforehand.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::core::depgraph::DepGraph;
use crate::core::recipe::{Dep, Recipe, SystemDb};
use crate::error::PlanError;
use crate::infra::report::Reporter;

/// One cycle's ordered build plan
#[derive(Debug, Default)]
pub struct Plan {
    /// Packages in build order; dependencies precede dependents
    pub order: Vec<String>,

    /// Effective direct dependency set per planned package
    pub depends: BTreeMap<String, BTreeSet<Dep>>,
}

/// Plan the cycle's builds from the detected building set.
pub fn make_plan(
    graph: &DepGraph,
    recipes: &BTreeMap<String, Recipe>,
    all_building: &BTreeSet<String>,
    sysdb: &dyn SystemDb,
    reporter: &dyn Reporter,
) -> Result<Plan, PlanError> {
    let managed: BTreeSet<String> = recipes.keys().cloned().collect();

    let seed: BTreeSet<String> = all_building
        .iter()
        .filter(|pkg| {
            let known = managed.contains(*pkg);
            if !known {
                warn!("{pkg}: requested but not a managed package, ignoring");
            }
            known
        })
        .cloned()
        .collect();

    let building = graph.managed_closure(&seed, &managed);

    let mut depends = BTreeMap::new();
    for pkg in &building {
        let deps = graph.get(pkg).cloned().unwrap_or_default();

        let nonexistent: Vec<&Dep> = deps
            .iter()
            .filter(|d| !managed.contains(&d.pkgname) && !d.resolvable(sysdb))
            .collect();
        if !nonexistent.is_empty() {
            let names: Vec<&str> = nonexistent.iter().map(|d| d.pkgname.as_str()).collect();
            warn!("{pkg}: nonexistent dependencies: {}", names.join(", "));
            if let Some(recipe) = recipes.get(pkg) {
                reporter.package_report(
                    recipe,
                    &format!("{pkg} depends on nonexistent packages"),
                    &format!(
                        "The following dependencies of {pkg} are neither managed \
                         packages nor available from the system repositories:\n\n  {}\n",
                        names.join("\n  ")
                    ),
                );
            }
        }

        depends.insert(pkg.clone(), deps);
    }

    let order = graph.build_order(&building)?;
    info!("planned {} builds", order.len());

    Ok(Plan { order, depends })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::Maintainer;
    use std::path::{Path, PathBuf};

    struct StubDb {
        known: BTreeSet<String>,
    }

    impl SystemDb for StubDb {
        fn has_package(&self, name: &str) -> bool {
            self.known.contains(name)
        }
    }

    #[derive(Default)]
    struct CollectingReporter {
        reports: std::sync::Mutex<Vec<String>>,
    }

    impl Reporter for CollectingReporter {
        fn package_report(&self, _recipe: &Recipe, subject: &str, _body: &str) {
            self.reports.lock().unwrap().push(subject.to_string());
        }
        fn recipe_load_error(&self, _pkgbase: &str, _detail: &str) {}
        fn runtime_error(&self, _subject: &str, _body: &str) {}
    }

    fn recipe(pkgbase: &str, deps: &[&str]) -> Recipe {
        Recipe {
            pkgbase: pkgbase.to_string(),
            pkgdir: PathBuf::from("/nonexistent").join(pkgbase),
            maintainers: vec![Maintainer {
                name: "A".into(),
                email: "a@example.org".into(),
                handle: "a".into(),
            }],
            time_limit_hours: 1,
            repo_depends: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn setup(entries: &[(&str, &[&str])]) -> (DepGraph, BTreeMap<String, Recipe>) {
        let recipes: BTreeMap<String, Recipe> = entries
            .iter()
            .map(|(name, deps)| (name.to_string(), recipe(name, deps)))
            .collect();
        let graph = DepGraph::from_recipes(&recipes, Path::new("/nonexistent"));
        (graph, recipes)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sysdb(names: &[&str]) -> StubDb {
        StubDb { known: set(names) }
    }

    #[test]
    fn test_plan_expands_managed_deps() {
        let (graph, recipes) = setup(&[("app", &["lib"]), ("lib", &[]), ("idle", &[])]);
        let reporter = CollectingReporter::default();

        let plan = make_plan(&graph, &recipes, &set(&["app"]), &sysdb(&[]), &reporter).unwrap();
        assert_eq!(plan.order, vec!["lib", "app"]);
        assert!(plan.depends.contains_key("app"));
        assert!(plan.depends.contains_key("lib"));
        assert!(!plan.depends.contains_key("idle"));
    }

    #[test]
    fn test_system_deps_do_not_expand_plan() {
        let (graph, recipes) = setup(&[("app", &["syslib"])]);
        let reporter = CollectingReporter::default();

        let plan = make_plan(
            &graph,
            &recipes,
            &set(&["app"]),
            &sysdb(&["syslib"]),
            &reporter,
        )
        .unwrap();
        assert_eq!(plan.order, vec!["app"]);
        assert!(reporter.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nonexistent_dep_reported() {
        let (graph, recipes) = setup(&[("app", &["ghost"])]);
        let reporter = CollectingReporter::default();

        let plan = make_plan(&graph, &recipes, &set(&["app"]), &sysdb(&[]), &reporter).unwrap();
        // The package is still planned; the report is the surface.
        assert_eq!(plan.order, vec!["app"]);
        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("nonexistent"));
    }

    #[test]
    fn test_unmanaged_request_dropped() {
        let (graph, recipes) = setup(&[("app", &[])]);
        let reporter = CollectingReporter::default();

        let plan = make_plan(
            &graph,
            &recipes,
            &set(&["app", "stranger"]),
            &sysdb(&[]),
            &reporter,
        )
        .unwrap();
        assert_eq!(plan.order, vec!["app"]);
    }

    #[test]
    fn test_cycle_is_a_planning_error() {
        let (graph, recipes) = setup(&[("a", &["b"]), ("b", &["a"])]);
        let reporter = CollectingReporter::default();

        let result = make_plan(&graph, &recipes, &set(&["a", "b"]), &sysdb(&[]), &reporter);
        assert!(matches!(result, Err(PlanError::DependencyCycle { .. })));
    }
}
