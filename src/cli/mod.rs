//! Command-line interface module
//!
//! A single entry point: zero positional arguments runs a full detection
//! cycle, one or more `pkgbase` arguments rebuild exactly those packages.
//! The exit code is zero unless setup or locking failed; build and cycle
//! errors are reported through the configured channel instead.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use crate::config::Config;
use crate::core::cycle::{Collaborators, Cycle};
use crate::core::store::Store;
use crate::infra::builder::{CommandBuilder, PacmanDb};
use crate::infra::git::GitRepo;
use crate::infra::lock;
use crate::infra::logfile::{BuildJournal, LogLayout, TeeWriter};
use crate::infra::nvchecker::RecordChecker;
use crate::infra::proc;
use crate::infra::report::{LogReporter, Reporter, SendmailReporter};

/// Pkgcycle - automated build orchestrator for a community package repository
#[derive(Parser, Debug)]
#[command(name = "pkgcycle")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Rebuild exactly these packages instead of running detection
    pub pkgbases: Vec<String>,

    /// Use a specific config file instead of the search path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Execute one invocation.
    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        std::fs::create_dir_all(config.base_dir())
            .context("Failed to create the base directory")?;

        // Whole invocations are serialized against each other; contention is
        // the one error that exits nonzero without a report.
        let _lock = lock::acquire(&config.lock_path())
            .context("Another instance appears to be running")?;

        let logs = LogLayout::new(&config.log_base())
            .context("Failed to create the log directory")?;
        self.init_logging(&logs)?;

        config.apply_environment();
        proc::become_subreaper();

        let mut store =
            Store::load(&config.store_path()).context("Failed to load the persistent store")?;
        let mut journal =
            BuildJournal::open(&config.build_log_path(), &config.build_log_json_path())
                .context("Failed to open the build journals")?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });

        let vcs = GitRepo::new(
            config.repo_dir(),
            config.pkgcycle.primary_branch.clone(),
        );
        let checker = RecordChecker::new(
            config.oldver_path(),
            config.newver_path(),
            config.nvchecker.proxy.clone(),
            config.nvchecker.command.clone(),
        );
        let builder = CommandBuilder::new(config.pkgcycle.build_command.clone());
        let sysdb = PacmanDb;
        let reporter: Box<dyn Reporter> = match &config.pkgcycle.mail_from {
            Some(from) => Box::new(SendmailReporter::new(
                from.clone(),
                config.pkgcycle.admin_mail.clone(),
            )),
            None => Box::new(LogReporter),
        };

        info!(
            "pkgcycle {} starting ({})",
            env!("CARGO_PKG_VERSION"),
            if self.pkgbases.is_empty() {
                "full cycle".to_string()
            } else {
                format!("manual: {}", self.pkgbases.join(", "))
            }
        );

        let mut cycle = Cycle {
            config: &config,
            store: &mut store,
            logs: &logs,
            journal: &mut journal,
            interrupted: &interrupted,
            pkgs_to_build: &self.pkgbases,
        };
        let result = cycle.run(&Collaborators {
            vcs: &vcs,
            checker: &checker,
            builder: &builder,
            reporter: reporter.as_ref(),
            sysdb: &sysdb,
        });

        if let Err(e) = &result {
            error!("cycle failed: {e}");
            reporter.runtime_error(
                "build cycle failed",
                &format!("The build cycle ended with an error:\n\n{e}\n"),
            );
        }

        // The store is written no matter how the cycle went.
        store
            .save(&config.store_path())
            .context("Failed to save the persistent store")?;

        Ok(())
    }

    fn init_logging(&self, logs: &LogLayout) -> Result<()> {
        use tracing_subscriber::EnvFilter;

        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let tee = TeeWriter::create(&logs.main_log())
            .context("Failed to open the main log file")?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(move || tee.clone())
            .init();
        Ok(())
    }
}
