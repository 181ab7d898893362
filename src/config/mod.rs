//! Configuration loading
//!
//! Reads the orchestrator configuration from the first `pkgcycle.toml` found
//! along the search path (explicit override, working directory, XDG config
//! directory, `/etc`). Section and key names follow the classic INI shape:
//! `[pkgcycle]` for the bot itself, `[repository]` for publishing,
//! `[nvchecker]` for the version checker, and a free-form
//! `["enviroment variables"]` section exported into the process environment
//! verbatim.

pub mod defaults;

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No config file found anywhere on the search path
    #[error("No config file found (searched: {searched})")]
    NotFound { searched: String },

    /// Failed to read the config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Failed to parse the config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bot settings
    #[serde(default)]
    pub pkgcycle: BotConfig,

    /// Destination repository settings
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Version checker settings
    #[serde(default)]
    pub nvchecker: CheckerConfig,

    /// Extra environment variables exported verbatim at startup
    #[serde(default, rename = "enviroment variables")]
    pub env: BTreeMap<String, String>,
}

/// `[pkgcycle]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Builder identity used in the PACKAGER string
    #[serde(default = "default_name")]
    pub name: String,

    /// Base directory for state, locks and logs
    #[serde(default = "default_basedir")]
    pub basedir: PathBuf,

    /// Directory tree holding one subdirectory per managed package
    #[serde(default = "default_repodir")]
    pub repodir: PathBuf,

    /// Branch the working tree must be on
    #[serde(default = "default_branch")]
    pub primary_branch: String,

    /// Advance recorded upstream versions only for packages actually built
    #[serde(default)]
    pub rebuild_failed_pkgs: bool,

    /// Push the working tree after each cycle
    #[serde(default)]
    pub git_push: bool,

    /// Command executed in each package directory to perform the build
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,

    /// From address for maintainer reports; unset logs reports instead
    pub mail_from: Option<String>,

    /// Address receiving runtime-error reports
    pub admin_mail: Option<String>,
}

/// `[repository]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Destination directory for signed artifacts; unset disables publishing
    pub destdir: Option<PathBuf>,

    /// Artifact file suffixes eligible for publishing
    #[serde(default = "default_suffixes")]
    pub package_suffixes: Vec<String>,

    /// Bind mounts made available to the builder, as `source:target` pairs
    #[serde(default)]
    pub bindmounts: Vec<String>,
}

/// `[nvchecker]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// HTTP proxy handed to the checker subprocess
    pub proxy: Option<String>,

    /// Recorded (old) upstream versions
    #[serde(default = "default_oldver")]
    pub oldver: PathBuf,

    /// Detected (new) upstream versions
    #[serde(default = "default_newver")]
    pub newver: PathBuf,

    /// Checker command to refresh the new-version records; unset reads them as-is
    pub command: Option<Vec<String>>,
}

fn default_name() -> String {
    defaults::APP_NAME.to_string()
}

fn default_basedir() -> PathBuf {
    PathBuf::from(".")
}

fn default_repodir() -> PathBuf {
    PathBuf::from("repo")
}

fn default_branch() -> String {
    defaults::DEFAULT_PRIMARY_BRANCH.to_string()
}

fn default_build_command() -> Vec<String> {
    defaults::DEFAULT_BUILD_COMMAND
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_suffixes() -> Vec<String> {
    defaults::DEFAULT_PACKAGE_SUFFIXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_oldver() -> PathBuf {
    PathBuf::from("oldver.json")
}

fn default_newver() -> PathBuf {
    PathBuf::from("newver.json")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            basedir: default_basedir(),
            repodir: default_repodir(),
            primary_branch: default_branch(),
            rebuild_failed_pkgs: false,
            git_push: false,
            build_command: default_build_command(),
            mail_from: None,
            admin_mail: None,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            destdir: None,
            package_suffixes: default_suffixes(),
            bindmounts: Vec::new(),
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            oldver: default_oldver(),
            newver: default_newver(),
            command: None,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the search path.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let candidates = Self::search_path();
        for path in &candidates {
            if path.exists() {
                debug!("using config file {}", path.display());
                return Self::load_from_path(path);
            }
        }

        Err(ConfigError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Candidate config locations in priority order.
    fn search_path() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(defaults::CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(defaults::APP_NAME).join(defaults::CONFIG_FILE));
        }
        candidates.push(
            PathBuf::from("/etc")
                .join(defaults::APP_NAME)
                .join(defaults::CONFIG_FILE),
        );
        candidates
    }

    /// Base directory for state, locks and logs.
    pub fn base_dir(&self) -> &Path {
        &self.pkgcycle.basedir
    }

    /// Recipe tree, resolved against the base directory when relative.
    pub fn repo_dir(&self) -> PathBuf {
        self.resolve(&self.pkgcycle.repodir)
    }

    /// Root under which per-invocation log directories are created.
    pub fn log_base(&self) -> PathBuf {
        self.base_dir().join(defaults::LOG_DIR)
    }

    /// Path of the persistent store file.
    pub fn store_path(&self) -> PathBuf {
        self.base_dir().join(defaults::STORE_FILE)
    }

    /// Path of the startup lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.base_dir().join(defaults::LOCK_FILE)
    }

    /// Path of the append-only human build summary.
    pub fn build_log_path(&self) -> PathBuf {
        self.base_dir().join(defaults::BUILD_LOG)
    }

    /// Path of the append-only structured build events.
    pub fn build_log_json_path(&self) -> PathBuf {
        self.base_dir().join(defaults::BUILD_LOG_JSON)
    }

    /// Old-version record file, resolved against the base directory.
    pub fn oldver_path(&self) -> PathBuf {
        self.resolve(&self.nvchecker.oldver)
    }

    /// New-version record file, resolved against the base directory.
    pub fn newver_path(&self) -> PathBuf {
        self.resolve(&self.nvchecker.newver)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Apply the environment contract: configured exports, a PATH prefixed
    /// with our own directory, and a MAKEFLAGS default of `-j<ncpu>`.
    pub fn apply_environment(&self) {
        for (key, value) in &self.env {
            env::set_var(key, value);
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(bindir) = exe.parent() {
                let path = env::var("PATH").unwrap_or_default();
                env::set_var("PATH", format!("{}:{path}", bindir.display()));
            }
        }

        if env::var_os("MAKEFLAGS").is_none() {
            env::set_var("MAKEFLAGS", format!("-j{}", num_cpus::get()));
        }
    }
}
