//! Persistent state
//!
//! One JSON file survives between invocations: the last fully processed
//! revision and the failure record. Everything else is recomputed each run.
//! Writes go through a temporary file in the same directory so a crash never
//! leaves a half-written store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::infra::git::EMPTY_COMMIT;

/// State carried across invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Revision last fully processed; the empty-tree sentinel on first run
    #[serde(default = "default_last_commit")]
    pub last_commit: String,

    /// Failed packages and the upstream version of the failed attempt
    #[serde(default)]
    pub failed: BTreeMap<String, Option<String>>,
}

fn default_last_commit() -> String {
    EMPTY_COMMIT.to_string()
}

impl Default for Store {
    fn default() -> Self {
        Self {
            last_commit: default_last_commit(),
            failed: BTreeMap::new(),
        }
    }
}

impl Store {
    /// Load the store, starting fresh when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| StoreError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| StoreError::ParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Atomically write the store.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| StoreError::ParseError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        let dir = path.parent().unwrap_or(Path::new("."));
        let io_err = |e: std::io::Error| StoreError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
