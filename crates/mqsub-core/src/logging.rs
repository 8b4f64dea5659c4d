//! Logging setup for the two mqsub processes.
//!
//! The CLI logs to stderr. A watcher has no terminal after detaching, so it
//! appends to `<log_dir>/<job_id>.log` instead.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::Result;

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Terminal logging for the `mqsub` CLI.
pub fn init_terminal(verbose: bool) {
    let filter = if verbose { "mqsub=debug" } else { "mqsub=info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Log file path for one watched job.
pub fn watcher_log_path(log_dir: &Path, job_id: &str) -> PathBuf {
    let safe: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect();
    log_dir.join(format!("{safe}.log"))
}

/// File logging for a `mqsub-watch` process. Returns the log file path.
pub fn init_watcher(log_dir: &Path, job_id: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = watcher_log_path(log_dir, job_id);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter("mqsub=info"))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(path)
}
