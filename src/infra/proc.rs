//! Subprocess control
//!
//! Spawning helpers used across the orchestrator: capture-output command
//! execution, process-group isolation for builds, deadline supervision, and
//! recursive process-group teardown.
//!
//! The orchestrator acquires child-subreaper semantics at startup so that
//! grandchildren orphaned mid-build are re-parented to us and can still be
//! reaped after a timeout kill.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval while waiting on a supervised child
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL when tearing down a group
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Errors from capture-output command execution
#[derive(Error, Debug)]
pub enum CmdError {
    /// The command could not be started
    #[error("Failed to spawn '{cmd}': {error}")]
    Spawn { cmd: String, error: String },

    /// The command exited unsuccessfully
    #[error("Command '{cmd}' failed ({status}): {stderr}")]
    Failed {
        cmd: String,
        status: String,
        stderr: String,
    },
}

/// Mark this process as a child subreaper.
///
/// Must run before the first build so that orphaned grandchildren are adopted
/// here instead of by init, keeping them killable and reapable on timeout.
pub fn become_subreaper() {
    #[cfg(target_os = "linux")]
    if let Err(e) = nix::sys::prctl::set_child_subreaper(true) {
        warn!("failed to acquire subreaper status: {e}");
    }
}

/// Spawn a command as the leader of a new session and process group.
///
/// Every descendant the build creates stays in this group, so a single
/// `killpg` reaches all of them.
pub fn spawn_group(cmd: &mut Command) -> io::Result<Child> {
    use std::os::unix::process::CommandExt;

    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(io::Error::from)?;
            Ok(())
        });
    }
    cmd.spawn()
}

/// Result of waiting on a supervised child
#[derive(Debug)]
pub enum WaitOutcome {
    /// Child exited before the deadline
    Exited(ExitStatus),
    /// Deadline expired with the child still running
    TimedOut,
}

/// Wait for a child until `deadline`, polling without blocking past it.
pub fn wait_deadline(child: &mut Child, deadline: Instant) -> io::Result<WaitOutcome> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitOutcome::Exited(status));
        }
        if Instant::now() >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Kill the entire process group of `child` and reap everything.
///
/// SIGTERM first, then SIGKILL after a grace period. Orphans adopted through
/// the subreaper are collected afterwards so no zombie outlives the build.
pub fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        debug!(pid = child.id(), "killpg(SIGTERM) failed: {e}");
    }

    let grace_end = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_end {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => std::thread::sleep(WAIT_POLL),
            Err(_) => break,
        }
    }

    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!(pid = child.id(), "killpg(SIGKILL) failed: {e}");
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), "failed to reap build leader: {e}");
    }

    reap_orphans();
}

/// Reap any children re-parented to us via the subreaper.
pub fn reap_orphans() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!(pid = pid.as_raw(), code = code, "reaped orphaned process");
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                debug!(pid = pid.as_raw(), signal = ?sig, "reaped signaled orphan");
            }
            Ok(WaitStatus::StillAlive) | Err(nix::errno::Errno::ECHILD) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("error reaping orphans: {e}");
                break;
            }
        }
    }
}

/// Run a command to completion, capturing stdout.
///
/// Stderr is captured into the error on failure.
pub fn run_cmd(argv: &[&str], dir: Option<&Path>) -> Result<String, CmdError> {
    let display = argv.join(" ");
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| CmdError::Spawn {
        cmd: display.clone(),
        error: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(CmdError::Failed {
            cmd: display,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
