//! Upstream version checker integration
//!
//! The checker itself is an external tool; the orchestrator talks to it
//! through its record files. The old-version records are what the repository
//! has handled; the new-version records are what the checker last detected.
//! Advancing the old records (`take`) is the only way recorded versions move.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::recipe::Recipe;
use crate::core::version::{CheckOutcome, NvResult};
use crate::error::CheckerError;
use crate::infra::proc::run_cmd;

/// The version checker as seen by the build cycle
pub trait VersionChecker {
    /// Produce old/new version pairs for the given recipes, plus the
    /// packages without a verdict and those flagged for unconditional
    /// rebuild.
    fn check(&self, recipes: &BTreeMap<String, Recipe>) -> Result<CheckOutcome, CheckerError>;

    /// Durably advance the recorded versions of `pkgs` to their detected
    /// new versions.
    fn take(
        &self,
        pkgs: &BTreeSet<String>,
        results: &BTreeMap<String, NvResult>,
    ) -> Result<(), CheckerError>;
}

/// New-version record file shape
#[derive(Debug, Default, Deserialize)]
struct NewRecords {
    #[serde(default)]
    versions: BTreeMap<String, String>,

    /// Packages to rebuild even without a version change
    #[serde(default)]
    rebuild: BTreeSet<String>,
}

/// Record-file-backed checker driver
#[derive(Debug)]
pub struct RecordChecker {
    oldver: PathBuf,
    newver: PathBuf,
    proxy: Option<String>,
    command: Option<Vec<String>>,
}

impl RecordChecker {
    pub fn new(
        oldver: PathBuf,
        newver: PathBuf,
        proxy: Option<String>,
        command: Option<Vec<String>>,
    ) -> Self {
        Self {
            oldver,
            newver,
            proxy,
            command,
        }
    }

    fn read_old(&self) -> Result<BTreeMap<String, String>, CheckerError> {
        read_json(&self.oldver)
    }

    fn read_new(&self) -> Result<NewRecords, CheckerError> {
        read_json(&self.newver)
    }

    /// Run the external checker to refresh the new-version records.
    fn refresh(&self) -> Result<(), CheckerError> {
        let Some(command) = &self.command else {
            return Ok(());
        };
        if let Some(proxy) = &self.proxy {
            std::env::set_var("https_proxy", proxy);
        }
        let argv: Vec<&str> = command.iter().map(String::as_str).collect();
        run_cmd(&argv, None)?;
        Ok(())
    }
}

fn read_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CheckerError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| CheckerError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| CheckerError::ParseError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

impl VersionChecker for RecordChecker {
    fn check(&self, recipes: &BTreeMap<String, Recipe>) -> Result<CheckOutcome, CheckerError> {
        self.refresh()?;

        let old = self.read_old()?;
        let new = self.read_new()?;

        let mut outcome = CheckOutcome::default();
        for pkgbase in recipes.keys() {
            let oldver = old.get(pkgbase).cloned();
            let newver = new.versions.get(pkgbase).cloned();
            if newver.is_none() {
                outcome.unknown.insert(pkgbase.clone());
            }
            outcome
                .results
                .insert(pkgbase.clone(), NvResult { oldver, newver });
        }
        outcome.rebuild = new
            .rebuild
            .into_iter()
            .filter(|p| recipes.contains_key(p))
            .collect();

        debug!(
            known = outcome.results.len() - outcome.unknown.len(),
            unknown = outcome.unknown.len(),
            rebuild = outcome.rebuild.len(),
            "version check done"
        );
        Ok(outcome)
    }

    fn take(
        &self,
        pkgs: &BTreeSet<String>,
        results: &BTreeMap<String, NvResult>,
    ) -> Result<(), CheckerError> {
        let mut old = self.read_old()?;
        for pkg in pkgs {
            if let Some(newver) = results.get(pkg).and_then(|nv| nv.newver.clone()) {
                old.insert(pkg.clone(), newver);
            }
        }

        let dir = self.oldver.parent().unwrap_or(Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| CheckerError::IoError {
                path: self.oldver.clone(),
                error: e.to_string(),
            })?;
        let content =
            serde_json::to_string_pretty(&old).map_err(|e| CheckerError::ParseError {
                path: self.oldver.clone(),
                error: e.to_string(),
            })?;
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.persist(&self.oldver).map(|_| ()).map_err(Into::into))
            .map_err(|e| CheckerError::IoError {
                path: self.oldver.clone(),
                error: e.to_string(),
            })?;

        info!("advanced recorded versions for {} packages", pkgs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::Maintainer;
    use tempfile::TempDir;

    fn recipe(pkgbase: &str) -> Recipe {
        Recipe {
            pkgbase: pkgbase.to_string(),
            pkgdir: PathBuf::from("/repo").join(pkgbase),
            maintainers: vec![Maintainer {
                name: "A".into(),
                email: "a@example.org".into(),
                handle: "a".into(),
            }],
            time_limit_hours: 1,
            repo_depends: Vec::new(),
        }
    }

    fn checker(dir: &TempDir) -> RecordChecker {
        RecordChecker::new(
            dir.path().join("oldver.json"),
            dir.path().join("newver.json"),
            None,
            None,
        )
    }

    #[test]
    fn test_check_classifies_packages() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("oldver.json"), r#"{"a": "1", "b": "5"}"#).unwrap();
        std::fs::write(
            dir.path().join("newver.json"),
            r#"{"versions": {"a": "2", "b": "5"}, "rebuild": ["b", "stranger"]}"#,
        )
        .unwrap();

        let recipes: BTreeMap<String, Recipe> = ["a", "b", "c"]
            .iter()
            .map(|n| (n.to_string(), recipe(n)))
            .collect();
        let outcome = checker(&dir).check(&recipes).unwrap();

        assert!(outcome.results["a"].updated());
        assert!(!outcome.results["b"].updated());
        assert!(outcome.unknown.contains("c"));
        assert_eq!(outcome.rebuild.len(), 1);
        assert!(outcome.rebuild.contains("b"));
    }

    #[test]
    fn test_missing_record_files_mean_all_unknown() {
        let dir = TempDir::new().unwrap();
        let recipes: BTreeMap<String, Recipe> =
            [("a".to_string(), recipe("a"))].into_iter().collect();

        let outcome = checker(&dir).check(&recipes).unwrap();
        assert!(outcome.unknown.contains("a"));
    }

    #[test]
    fn test_take_advances_only_given_set() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("oldver.json"), r#"{"a": "1", "b": "5"}"#).unwrap();

        let mut results = BTreeMap::new();
        results.insert("a".to_string(), NvResult::new(Some("1"), Some("2")));
        results.insert("b".to_string(), NvResult::new(Some("5"), Some("6")));

        let pkgs: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let checker = checker(&dir);
        checker.take(&pkgs, &results).unwrap();

        let old: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("oldver.json")).unwrap())
                .unwrap();
        assert_eq!(old["a"], "2");
        assert_eq!(old["b"], "5");
    }
}
