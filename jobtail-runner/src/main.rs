//! Jobtail
//!
//! Submits one batch Job to the cluster and supervises it until it finishes,
//! keeping a capture of its container output alive the whole time.
//!
//! Architecture:
//! - Configuration: CLI flags with environment fallbacks
//! - Repositories: kubectl clients for workload queries and log capture
//! - Services: Submission and describe snapshots
//! - Scheduler: Status polling and the tailing supervisor
//!
//! Every run leaves its logs under the logs directory and, once supervision
//! concludes, a `done` marker for whoever waits on it.

mod artifacts;
mod config;
mod context;
mod kubectl;
mod repository;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use colored::*;
use jobtail_core::domain::descriptor::WorkloadDescriptor;
use jobtail_core::domain::supervisor::SupervisorOutcome;
use jobtail_core::error::SupervisorError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::artifacts::ArtifactRole;
use crate::config::Config;
use crate::context::RunContext;
use crate::kubectl::Kubectl;
use crate::repository::{KubectlCaptureLauncher, KubectlWorkloadRepository};
use crate::scheduler::Supervisor;

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "jobtail")]
#[command(about = "Run a batch Job and keep its logs captured until it finishes", long_about = None)]
struct Cli {
    /// Workload descriptor (YAML) declaring exactly one Job
    descriptor: PathBuf,

    /// Access context for the cluster
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// kubectl binary
    #[arg(long, env = "JOBTAIL_KUBECTL", default_value = "kubectl")]
    kubectl: String,

    /// Directory receiving the run logs
    #[arg(long, env = "JOBTAIL_LOGS_DIR", default_value = "logs")]
    logs_dir: PathBuf,

    /// Seconds between status polls
    #[arg(long, env = "JOBTAIL_POLL_INTERVAL", default_value_t = 30)]
    poll_interval: u64,

    /// Seconds to wait for a ready pod after submission
    #[arg(long, env = "JOBTAIL_READY_TIMEOUT", default_value_t = 300)]
    ready_timeout: u64,

    /// Upper bound in seconds for a single scheduler query
    #[arg(long, env = "JOBTAIL_QUERY_TIMEOUT", default_value_t = 20)]
    query_timeout: u64,

    /// Consecutive polls without status before the workload is lost
    #[arg(long, env = "JOBTAIL_SOFT_FAILURE_BUDGET", default_value_t = 3)]
    soft_failure_budget: u32,
}

impl Cli {
    fn into_parts(self) -> (PathBuf, Config) {
        // KUBECONFIG may hold a path list; only its first entry is used
        let kubeconfig = self
            .kubeconfig
            .and_then(|paths| std::env::split_paths(&paths).next())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(Config::default_kubeconfig);

        let mut config = Config::new(kubeconfig);
        config.kubectl = self.kubectl;
        config.logs_dir = self.logs_dir;
        config.poll_interval = Duration::from_secs(self.poll_interval);
        config.ready_timeout = Duration::from_secs(self.ready_timeout);
        config.query_timeout = Duration::from_secs(self.query_timeout);
        config.soft_failure_budget = self.soft_failure_budget;

        (self.descriptor, config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let (descriptor_path, config) = Cli::parse().into_parts();

    match run(descriptor_path, config).await {
        Ok(SupervisorOutcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            fatal(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(descriptor_path: PathBuf, config: Config) -> jobtail_core::error::Result<SupervisorOutcome> {
    config
        .validate()
        .map_err(|e| SupervisorError::Precondition(format!("{:#}", e)))?;

    let descriptor = WorkloadDescriptor::load(&descriptor_path)?;

    config
        .check_access_context()
        .map_err(|e| SupervisorError::Precondition(format!("{:#}", e)))?;

    let context = RunContext::new(descriptor, config);
    init_tracing(&context).map_err(|e| SupervisorError::Precondition(format!("{:#}", e)))?;

    let span = info_span!(
        "run",
        run_id = %context.run_id,
        job = %format!("{}/{}", context.descriptor.namespace, context.descriptor.name)
    );

    async move {
        info!("Starting jobtail for {}", descriptor_path.display());
        info!(
            "Poll interval: {:?}, ready timeout: {:?}, query timeout: {:?}, soft failure budget: {}",
            context.config.poll_interval,
            context.config.ready_timeout,
            context.config.query_timeout,
            context.config.soft_failure_budget
        );

        let kubectl = Kubectl::new(context.config.kubectl.clone(), context.config.kubeconfig.clone());
        kubectl
            .check_available()
            .await
            .map_err(|e| SupervisorError::Precondition(format!("{:#}", e)))?;

        let repository = Arc::new(KubectlWorkloadRepository::new(
            kubectl.clone(),
            context.config.query_timeout,
        ));
        let launcher = Arc::new(KubectlCaptureLauncher::new(
            kubectl,
            context.artifacts.path(&context.container_role()),
        ));

        let report = Supervisor::new(context, repository, launcher)
            .run(shutdown_signal())
            .await
            .inspect_err(|e| error!("Supervision aborted: {}", e))?;

        info!(
            "Supervision ended with {:?} after {} tick(s), {} capture restart(s), {} failed capture start(s)",
            report.outcome,
            report.stats.ticks,
            report.stats.restarts,
            report.stats.failed_capture_starts
        );

        Ok(report.outcome)
    }
    .instrument(span)
    .await
}

/// Installs the stdout layer and the runner log file layer
fn init_tracing(context: &RunContext) -> anyhow::Result<()> {
    context.artifacts.prepare()?;
    let runner_log = context.artifacts.open_append(&ArtifactRole::Runner)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobtail=info,jobtail_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(runner_log)),
        )
        .try_init()
        .context("Failed to install the log subscriber")?;

    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Prints a fatal error, with a timestamp, to stderr
fn fatal(e: &SupervisorError) {
    eprintln!(
        "{} {} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        "error:".red().bold(),
        e
    );
}
