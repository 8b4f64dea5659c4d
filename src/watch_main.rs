//! # mqsub-watch: detached per-job watcher
//!
//! Started by `mqsub` right after a successful submission; not meant to be
//! run by hand, though it can be (e.g. to re-attach to a job):
//!
//!   mqsub-watch --config /home/me/mqsub.toml 12345.server1
//!
//! Logs go to `<log_dir>/<job_id>.log`. Exit codes: 0 notified or stopped,
//! 1 monitoring failed, 2 startup error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use mqsub_channels::SmtpMailer;
use mqsub_core::config::MqsubConfig;
use mqsub_core::types::JobId;
use mqsub_pbs::Qstat;
use mqsub_scheduler::{JobMonitor, MonitorSettings, MonitorState, Notifier};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "mqsub-watch",
    version,
    about = "👀 Watch one PBS job and email when it finishes"
)]
struct Cli {
    /// Job id as printed by qsub
    job_id: String,

    /// Configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Submission time (RFC 3339); defaults to now
    #[arg(long)]
    submitted_at: Option<DateTime<Utc>>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Before anything slow: a hangup during startup must not kill us.
    let shutdown = match mqsub_scheduler::install_shutdown_handler() {
        Ok(token) => token,
        Err(e) => {
            eprintln!("mqsub-watch: cannot install signal handlers: {e}");
            return ExitCode::from(2);
        }
    };

    let config = match MqsubConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // No config means no configured log dir either.
            let fallback = MqsubConfig::home_dir().join("logs");
            if mqsub_core::logging::init_watcher(&fallback, &cli.job_id).is_ok() {
                tracing::error!(job_id = %cli.job_id, "❌ Cannot start watcher: {e}");
            }
            return ExitCode::from(2);
        }
    };

    if let Err(e) = mqsub_core::logging::init_watcher(&config.log_dir(), &cli.job_id) {
        eprintln!("mqsub-watch: cannot open log in {}: {e}", config.log_dir().display());
        return ExitCode::from(2);
    }

    match watch(cli, config, shutdown).await {
        MonitorState::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

async fn watch(
    cli: Cli,
    config: MqsubConfig,
    shutdown: CancellationToken,
) -> MonitorState {
    let job_id = JobId::new(cli.job_id);
    let submitted_at = cli.submitted_at.unwrap_or_else(Utc::now);
    tracing::info!(
        job_id = %job_id,
        "🚀 mqsub-watch v{} (pid {}, config {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        cli.config.display()
    );

    let source = Arc::new(Qstat::from_config(&config));
    let notifier = Notifier::from_config(Arc::new(SmtpMailer::from_config(&config)), &config);
    let monitor = JobMonitor::new(
        job_id.clone(),
        submitted_at,
        source,
        notifier,
        MonitorSettings::from_config(&config),
    );

    let outcome = monitor.run(shutdown).await;
    tracing::info!(
        job_id = %job_id,
        "🏁 Watcher finished: {} after {} polls (email sent: {})",
        outcome.state,
        outcome.polls,
        outcome.notified
    );
    outcome.state
}
