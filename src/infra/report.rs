//! Maintainer and error reporting
//!
//! Reports never abort the cycle: every delivery failure is logged and
//! swallowed. The [`Reporter`] trait is the seam; production delivers via a
//! local sendmail, and setups without mail configured fall back to logging.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{error, warn};

use crate::core::recipe::Recipe;

/// Where package and runtime reports go
pub trait Reporter {
    /// Report a problem with one package to its maintainers.
    fn package_report(&self, recipe: &Recipe, subject: &str, body: &str);

    /// Report a recipe that could not be loaded at all.
    fn recipe_load_error(&self, pkgbase: &str, detail: &str);

    /// Report an error not attributable to a single package.
    fn runtime_error(&self, subject: &str, body: &str);
}

/// Delivers reports through the local sendmail binary
#[derive(Debug)]
pub struct SendmailReporter {
    from_addr: String,
    admin_addr: Option<String>,
}

impl SendmailReporter {
    pub fn new(from_addr: String, admin_addr: Option<String>) -> Self {
        Self {
            from_addr,
            admin_addr,
        }
    }

    fn deliver(&self, to: &[String], subject: &str, body: &str) {
        if to.is_empty() {
            warn!("no recipients for report '{subject}'");
            return;
        }

        let message = format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
            self.from_addr,
            to.join(", "),
            subject,
            body
        );

        let spawned = Command::new("sendmail")
            .args(["-oi", "-t"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!("failed to spawn sendmail for '{subject}': {e}");
                return;
            }
        };

        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(message.as_bytes()) {
                error!("failed to write report '{subject}': {e}");
            }
        }
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => error!("sendmail exited with {status} for '{subject}'"),
            Err(e) => error!("failed to wait for sendmail: {e}"),
        }
    }
}

impl Reporter for SendmailReporter {
    fn package_report(&self, recipe: &Recipe, subject: &str, body: &str) {
        let to: Vec<String> = recipe
            .maintainers
            .iter()
            .map(|m| format!("{} <{}>", m.name, m.email))
            .collect();
        self.deliver(&to, subject, body);
    }

    fn recipe_load_error(&self, pkgbase: &str, detail: &str) {
        let to: Vec<String> = self.admin_addr.iter().cloned().collect();
        self.deliver(
            &to,
            &format!("failed to load recipe for {pkgbase}"),
            detail,
        );
    }

    fn runtime_error(&self, subject: &str, body: &str) {
        let to: Vec<String> = self.admin_addr.iter().cloned().collect();
        self.deliver(&to, subject, body);
    }
}

/// Fallback reporter used when no mail address is configured
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn package_report(&self, recipe: &Recipe, subject: &str, body: &str) {
        let handles: Vec<String> = recipe
            .maintainers
            .iter()
            .map(|m| format!("@{}", m.handle))
            .collect();
        warn!(
            "report for {} ({}): {subject}\n{body}",
            recipe.pkgbase,
            handles.join(" ")
        );
    }

    fn recipe_load_error(&self, pkgbase: &str, detail: &str) {
        warn!("failed to load recipe for {pkgbase}: {detail}");
    }

    fn runtime_error(&self, subject: &str, body: &str) {
        error!("{subject}\n{body}");
    }
}
