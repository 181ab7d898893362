//! Dependency graph
//!
//! Maps each managed package to its direct dependencies, expands seed sets by
//! transitive closure over managed packages, and computes a deterministic
//! build order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::recipe::{Dep, Recipe};
use crate::error::PlanError;

/// Dependency map over the managed repository
#[derive(Debug, Default)]
pub struct DepGraph {
    /// Adjacency list: package -> direct dependencies
    deps: BTreeMap<String, BTreeSet<Dep>>,
}

impl DepGraph {
    /// Build the map from loaded recipes, resolving each declared dependency
    /// to a working directory under `repodir`.
    pub fn from_recipes(recipes: &BTreeMap<String, Recipe>, repodir: &Path) -> Self {
        let mut deps = BTreeMap::new();
        for (pkgbase, recipe) in recipes {
            let entry: BTreeSet<Dep> = recipe
                .repo_depends
                .iter()
                .map(|name| Dep::new(name, repodir))
                .collect();
            deps.insert(pkgbase.clone(), entry);
        }
        Self { deps }
    }

    /// Direct dependencies of a package.
    pub fn get(&self, pkgbase: &str) -> Option<&BTreeSet<Dep>> {
        self.deps.get(pkgbase)
    }

    /// Smallest superset of `seed` closed under managed dependencies: for
    /// every member, each dependency that is itself a managed package is also
    /// a member. Unmanaged dependencies never expand the set.
    pub fn managed_closure(
        &self,
        seed: &BTreeSet<String>,
        managed: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut closure: BTreeSet<String> = seed.iter().cloned().collect();
        let mut queue: Vec<String> = closure.iter().cloned().collect();

        while let Some(pkg) = queue.pop() {
            let Some(deps) = self.deps.get(&pkg) else {
                continue;
            };
            for dep in deps {
                if managed.contains(&dep.pkgname) && closure.insert(dep.pkgname.clone()) {
                    queue.push(dep.pkgname.clone());
                }
            }
        }

        closure
    }

    /// Compute the build order for `building`.
    ///
    /// The sort runs over the full vertex universe reachable from `building`
    /// (so transitively inserted managed dependencies are ordered correctly
    /// even when absent from the seed), then the result is filtered back to
    /// `building`. Dependencies precede dependents; ties resolve
    /// lexicographically, so equal inputs give equal output.
    pub fn build_order(&self, building: &BTreeSet<String>) -> Result<Vec<String>, PlanError> {
        let mut universe: BTreeSet<String> = building.clone();
        for pkg in building {
            if let Some(deps) = self.deps.get(pkg) {
                universe.extend(deps.iter().map(|d| d.pkgname.clone()));
            }
        }

        let mut visited = BTreeSet::new();
        let mut in_progress = BTreeSet::new();
        let mut sorted = Vec::new();
        let mut path = Vec::new();

        for node in &universe {
            if !visited.contains(node) {
                self.visit(
                    node,
                    building,
                    &mut visited,
                    &mut in_progress,
                    &mut sorted,
                    &mut path,
                )?;
            }
        }

        Ok(sorted
            .into_iter()
            .filter(|pkg| building.contains(pkg))
            .collect())
    }

    fn visit(
        &self,
        node: &str,
        building: &BTreeSet<String>,
        visited: &mut BTreeSet<String>,
        in_progress: &mut BTreeSet<String>,
        sorted: &mut Vec<String>,
        path: &mut Vec<String>,
    ) -> Result<(), PlanError> {
        if in_progress.contains(node) {
            path.push(node.to_string());
            return Err(PlanError::DependencyCycle {
                cycle: path.clone(),
            });
        }
        if visited.contains(node) {
            return Ok(());
        }

        in_progress.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = self.deps.get(node) {
            for dep in deps {
                // Edges only matter within the set being built; an edge to a
                // package that is neither built nor managed is inert here.
                if building.contains(&dep.pkgname) || self.deps.contains_key(&dep.pkgname) {
                    self.visit(&dep.pkgname, building, visited, in_progress, sorted, path)?;
                }
            }
        }

        path.pop();
        in_progress.remove(node);
        visited.insert(node.to_string());
        sorted.push(node.to_string());

        Ok(())
    }
}
