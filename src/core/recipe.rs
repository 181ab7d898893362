//! Recipe loading
//!
//! Each managed package lives in its own subdirectory of the repository tree
//! and carries a `recipe.toml` describing its maintainers, build time limit
//! and declared dependencies on other packages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::defaults::{DEFAULT_TIME_LIMIT_HOURS, RECIPE_FILE};
use crate::error::RecipeError;

/// A package maintainer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
    pub handle: String,
}

/// On-disk recipe shape
#[derive(Debug, Deserialize)]
struct RecipeFile {
    maintainers: Vec<Maintainer>,
    time_limit_hours: Option<u32>,
    repo_depends: Option<Vec<String>>,
}

/// A managed package's build metadata
#[derive(Debug, Clone)]
pub struct Recipe {
    /// Canonical package identifier
    pub pkgbase: String,

    /// Working directory of the package within the repository tree
    pub pkgdir: PathBuf,

    /// Ordered, non-empty maintainer list
    pub maintainers: Vec<Maintainer>,

    /// Wall-clock build limit in hours
    pub time_limit_hours: u32,

    /// Declared dependencies on other packages
    pub repo_depends: Vec<String>,
}

impl Recipe {
    /// Wall-clock build limit as a duration.
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_limit_hours) * 3600)
    }

    /// The maintainer responsible for this package's builds.
    pub fn first_maintainer(&self) -> &Maintainer {
        &self.maintainers[0]
    }
}

/// Probe for packages provided outside the managed repository.
pub trait SystemDb {
    /// True when the system package database can provide `name`.
    fn has_package(&self, name: &str) -> bool;
}

/// A reference from one package to another
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dep {
    /// Target package base
    pub pkgname: String,

    /// Resolved working directory for the target
    pub pkgdir: PathBuf,
}

impl Dep {
    /// Create a dependency on `pkgname` under `repodir`.
    pub fn new(pkgname: &str, repodir: &Path) -> Self {
        Self {
            pkgname: pkgname.to_string(),
            pkgdir: repodir.join(pkgname),
        }
    }

    /// True when the dependency currently exists, either as a managed
    /// package checkout or in the system package database.
    pub fn resolvable(&self, sysdb: &dyn SystemDb) -> bool {
        self.pkgdir.is_dir() || sysdb.has_package(&self.pkgname)
    }
}

/// Parse one recipe file into a validated [`Recipe`].
pub fn load_recipe(pkgbase: &str, pkgdir: &Path) -> Result<Recipe, RecipeError> {
    let path = pkgdir.join(RECIPE_FILE);
    if !path.exists() {
        return Err(RecipeError::NotFound { path });
    }

    let content = std::fs::read_to_string(&path).map_err(|e| RecipeError::IoError {
        path: path.clone(),
        error: e.to_string(),
    })?;

    let file: RecipeFile = toml::from_str(&content).map_err(|e| RecipeError::ParseError {
        pkgbase: pkgbase.to_string(),
        error: e.to_string(),
    })?;

    if file.maintainers.is_empty() {
        return Err(RecipeError::NoMaintainers {
            pkgbase: pkgbase.to_string(),
        });
    }

    let time_limit_hours = file.time_limit_hours.unwrap_or(DEFAULT_TIME_LIMIT_HOURS);
    if time_limit_hours == 0 {
        return Err(RecipeError::ZeroTimeLimit {
            pkgbase: pkgbase.to_string(),
        });
    }

    Ok(Recipe {
        pkgbase: pkgbase.to_string(),
        pkgdir: pkgdir.to_path_buf(),
        maintainers: file.maintainers,
        time_limit_hours,
        repo_depends: file.repo_depends.unwrap_or_default(),
    })
}

/// Scan the repository tree and load every package recipe.
///
/// A package that fails to load lands in the error map and does not abort
/// the scan; the cycle carries on without it.
pub fn load_recipes(
    repodir: &Path,
) -> (BTreeMap<String, Recipe>, BTreeMap<String, RecipeError>) {
    let mut recipes = BTreeMap::new();
    let mut errors = BTreeMap::new();

    for entry in WalkDir::new(repodir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let pkgbase = entry.file_name().to_string_lossy().into_owned();
        if pkgbase.starts_with('.') {
            continue;
        }
        if !entry.path().join(RECIPE_FILE).exists() {
            debug!("skipping {pkgbase}: no recipe file");
            continue;
        }

        match load_recipe(&pkgbase, entry.path()) {
            Ok(recipe) => {
                recipes.insert(pkgbase, recipe);
            }
            Err(err) => {
                errors.insert(pkgbase, err);
            }
        }
    }

    (recipes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_recipe(dir: &Path, pkgbase: &str, content: &str) {
        let pkgdir = dir.join(pkgbase);
        std::fs::create_dir_all(&pkgdir).unwrap();
        std::fs::write(pkgdir.join(RECIPE_FILE), content).unwrap();
    }

    const GOOD: &str = r#"
maintainers = [{ name = "A. Maintainer", email = "a@example.org", handle = "amaint" }]
time_limit_hours = 2
repo_depends = ["libfoo"]
"#;

    #[test]
    fn test_load_valid_recipe() {
        let dir = TempDir::new().unwrap();
        write_recipe(dir.path(), "demo", GOOD);

        let recipe = load_recipe("demo", &dir.path().join("demo")).unwrap();
        assert_eq!(recipe.pkgbase, "demo");
        assert_eq!(recipe.time_limit_hours, 2);
        assert_eq!(recipe.time_limit(), Duration::from_secs(7200));
        assert_eq!(recipe.repo_depends, vec!["libfoo"]);
        assert_eq!(recipe.first_maintainer().handle, "amaint");
    }

    #[test]
    fn test_time_limit_defaults_to_one_hour() {
        let dir = TempDir::new().unwrap();
        write_recipe(
            dir.path(),
            "demo",
            r#"maintainers = [{ name = "A", email = "a@e", handle = "a" }]"#,
        );

        let recipe = load_recipe("demo", &dir.path().join("demo")).unwrap();
        assert_eq!(recipe.time_limit_hours, 1);
    }

    #[test]
    fn test_empty_maintainers_rejected() {
        let dir = TempDir::new().unwrap();
        write_recipe(dir.path(), "demo", "maintainers = []\n");

        assert!(matches!(
            load_recipe("demo", &dir.path().join("demo")),
            Err(RecipeError::NoMaintainers { .. })
        ));
    }

    #[test]
    fn test_scan_collects_errors_without_aborting() {
        let dir = TempDir::new().unwrap();
        write_recipe(dir.path(), "good", GOOD);
        write_recipe(dir.path(), "bad", "maintainers = [[[");

        let (recipes, errors) = load_recipes(dir.path());
        assert!(recipes.contains_key("good"));
        assert!(errors.contains_key("bad"));
        assert_eq!(recipes.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_scan_skips_directories_without_recipes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("not-a-package")).unwrap();
        write_recipe(dir.path(), "good", GOOD);

        let (recipes, errors) = load_recipes(dir.path());
        assert_eq!(recipes.len(), 1);
        assert!(errors.is_empty());
    }

    struct NoDb;
    impl SystemDb for NoDb {
        fn has_package(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_dep_resolvable_via_checkout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("present")).unwrap();

        assert!(Dep::new("present", dir.path()).resolvable(&NoDb));
        assert!(!Dep::new("absent", dir.path()).resolvable(&NoDb));
    }
}
