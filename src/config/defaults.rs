//! Default configuration values

/// Config file name searched along the config path
pub const CONFIG_FILE: &str = "pkgcycle.toml";

/// Application name used in directory paths
pub const APP_NAME: &str = "pkgcycle";

/// Default per-package build time limit in hours
pub const DEFAULT_TIME_LIMIT_HOURS: u32 = 1;

/// Per-package recipe file name
pub const RECIPE_FILE: &str = "recipe.toml";

/// Build metadata file carrying pkgver/pkgrel
pub const PKGBUILD_FILE: &str = "PKGBUILD";

/// Startup lock file name
pub const LOCK_FILE: &str = ".lock";

/// Persistent store file name
pub const STORE_FILE: &str = "store.json";

/// Root of the per-invocation log tree
pub const LOG_DIR: &str = "log";

/// Orchestrator log file inside the per-invocation directory
pub const MAIN_LOG: &str = "main.log";

/// Append-only human build summary
pub const BUILD_LOG: &str = "build.log";

/// Append-only structured build events
pub const BUILD_LOG_JSON: &str = "build-log.json";

/// Default primary branch the working tree must be on
pub const DEFAULT_PRIMARY_BRANCH: &str = "master";

/// Default artifact suffixes considered for publishing
pub const DEFAULT_PACKAGE_SUFFIXES: &[&str] = &[".pkg.tar.zst", ".pkg.tar.xz"];

/// Default builder command run in each package directory
pub const DEFAULT_BUILD_COMMAND: &[&str] = &["makepkg", "--syncdeps", "--noconfirm"];
