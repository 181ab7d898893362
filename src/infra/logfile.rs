//! Build log layout
//!
//! Each invocation gets its own `log/<timestamp>/` directory holding the
//! orchestrator log and one capture file per built package. Build results
//! additionally go to two append-only files at the base directory:
//! `build.log` (one human line per build) and `build-log.json` (one JSON
//! event per line).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::warn;

use crate::config::defaults::MAIN_LOG;

/// Per-invocation log directory
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    /// Create `base/<ISO-timestamp>/` and return its layout.
    pub fn new(base: &Path) -> io::Result<Self> {
        let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let root = base.join(stamp);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The invocation's log directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the orchestrator's own log file.
    pub fn main_log(&self) -> PathBuf {
        self.root.join(MAIN_LOG)
    }

    /// Path of one package's build capture file.
    pub fn package_log(&self, pkgbase: &str) -> PathBuf {
        self.root.join(format!("{pkgbase}.log"))
    }
}

/// Writer duplicating orchestrator output to stderr and the main log file
#[derive(Debug, Clone)]
pub struct TeeWriter {
    file: Arc<File>,
}

impl TeeWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(file),
        })
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        (&*self.file).write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        (&*self.file).flush()
    }
}

/// One structured build event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum BuildEvent {
    #[serde(rename = "build start")]
    Start {
        pkgbase: String,
        nv_version: Option<String>,
    },

    #[serde(rename = "build end")]
    End { pkgbase: String, elapsed: u64 },

    #[serde(rename = "successful")]
    Successful {
        pkgbase: String,
        nv_version: Option<String>,
        pkg_version: Option<String>,
        elapsed: u64,
    },

    #[serde(rename = "failed")]
    Failed {
        pkgbase: String,
        nv_version: Option<String>,
        elapsed: u64,
        reason: String,
    },

    #[serde(rename = "skipped")]
    Skipped { pkgbase: String, reason: String },
}

impl BuildEvent {
    /// Human one-liner for `build.log`; `None` for events that only belong
    /// in the structured stream.
    fn summary(&self) -> Option<String> {
        match self {
            BuildEvent::Start { .. } | BuildEvent::End { .. } => None,
            BuildEvent::Successful {
                pkgbase,
                nv_version,
                pkg_version,
                elapsed,
            } => Some(format!(
                "{pkgbase} {} ({}) successful in {elapsed}s",
                pkg_version.as_deref().unwrap_or("-"),
                nv_version.as_deref().unwrap_or("-"),
            )),
            BuildEvent::Failed {
                pkgbase,
                elapsed,
                reason,
                ..
            } => Some(format!("{pkgbase} failed in {elapsed}s: {reason}")),
            BuildEvent::Skipped { pkgbase, reason } => {
                Some(format!("{pkgbase} skipped: {reason}"))
            }
        }
    }
}

/// Append-only build result journal
#[derive(Debug)]
pub struct BuildJournal {
    text: File,
    json: File,
}

impl BuildJournal {
    /// Open (creating if needed) the two append-only journal files.
    pub fn open(text_path: &Path, json_path: &Path) -> io::Result<Self> {
        let open = |path: &Path| OpenOptions::new().create(true).append(true).open(path);
        Ok(Self {
            text: open(text_path)?,
            json: open(json_path)?,
        })
    }

    /// Record one event in both journals. Journal IO failures are logged and
    /// swallowed; they must not fail a build.
    pub fn record(&mut self, event: &BuildEvent) {
        let mut json = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to serialize build event: {e}");
                return;
            }
        };
        if let Some(map) = json.as_object_mut() {
            map.insert(
                "ts".to_string(),
                serde_json::Value::from(Local::now().timestamp()),
            );
        }
        if let Err(e) = writeln!(self.json, "{json}") {
            warn!("failed to append build-log.json: {e}");
        }

        if let Some(line) = event.summary() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(e) = writeln!(self.text, "[{stamp}] {line}") {
                warn!("failed to append build.log: {e}");
            }
        }
    }
}
