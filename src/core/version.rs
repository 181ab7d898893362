//! Upstream and package version handling
//!
//! Upstream versions come from the external checker as old/new pairs; the
//! package version is the `[epoch:]pkgver-pkgrel` triple read from the build
//! metadata file.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One package's old and new upstream versions as reported by the checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvResult {
    /// Version last recorded by the checker
    pub oldver: Option<String>,

    /// Version currently detected upstream
    pub newver: Option<String>,
}

impl NvResult {
    /// Create a result from optional old and new versions.
    pub fn new(oldver: Option<&str>, newver: Option<&str>) -> Self {
        Self {
            oldver: oldver.map(str::to_string),
            newver: newver.map(str::to_string),
        }
    }

    /// True when a new upstream version differs from the recorded one.
    pub fn updated(&self) -> bool {
        self.newver.is_some() && self.oldver != self.newver
    }
}

/// Everything the version checker reports for one cycle
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// Per-package old/new version pairs
    pub results: BTreeMap<String, NvResult>,

    /// Packages the checker could not produce a verdict for
    pub unknown: BTreeSet<String>,

    /// Packages flagged for rebuild regardless of version equality
    pub rebuild: BTreeSet<String>,
}

/// The `[epoch:]pkgver-pkgrel` triple of a built package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub epoch: Option<String>,
    pub pkgver: String,
    pub pkgrel: String,
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = &self.epoch {
            write!(f, "{epoch}:")?;
        }
        write!(f, "{}-{}", self.pkgver, self.pkgrel)
    }
}

/// Extract `pkgver` and `pkgrel` from build metadata content.
///
/// Line-oriented on purpose: only plain `key=value` assignments at the start
/// of a line count, quoting is stripped, later assignments win.
pub fn extract_pkgver_pkgrel(content: &str) -> (Option<String>, Option<String>) {
    let mut pkgver = None;
    let mut pkgrel = None;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("pkgver=") {
            pkgver = Some(unquote(value));
        } else if let Some(value) = line.strip_prefix("pkgrel=") {
            pkgrel = Some(unquote(value));
        }
    }

    (pkgver, pkgrel)
}

/// Extract the full package version from build metadata content.
pub fn extract_package_version(content: &str) -> Option<PackageVersion> {
    let mut epoch = None;
    if let Some(value) = content
        .lines()
        .find_map(|line| line.strip_prefix("epoch="))
    {
        let value = unquote(value);
        if !value.is_empty() && value != "0" {
            epoch = Some(value);
        }
    }

    let (pkgver, pkgrel) = extract_pkgver_pkgrel(content);
    Some(PackageVersion {
        epoch,
        pkgver: pkgver?,
        pkgrel: pkgrel?,
    })
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
}
