//! Launching the detached per-job watcher.
//!
//! The watcher runs in its own process group with stdio on /dev/null, so
//! closing the submitting terminal or hitting Ctrl-C there does not reach it.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, SecondsFormat, Utc};
use mqsub_core::config::MqsubConfig;
use mqsub_core::error::{MqsubError, Result};
use mqsub_core::types::JobId;

const WATCHER_NAME: &str = "mqsub-watch";

/// Watcher executable: `watcher_bin` from config, else `mqsub-watch` next to
/// the running binary, else `mqsub-watch` from `PATH`.
pub fn watcher_program(config: &MqsubConfig) -> PathBuf {
    if let Some(bin) = config.watcher_bin.as_deref().filter(|b| !b.trim().is_empty()) {
        return PathBuf::from(shellexpand::tilde(bin).as_ref());
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WATCHER_NAME)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(WATCHER_NAME))
}

/// Arguments for one watcher invocation.
pub fn watcher_args(config_path: &Path, job_id: &JobId, submitted_at: DateTime<Utc>) -> Vec<String> {
    vec![
        "--config".into(),
        config_path.display().to_string(),
        "--submitted-at".into(),
        submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        job_id.to_string(),
    ]
}

/// Start a watcher for `job_id` and return its pid without waiting for it.
pub fn spawn_watcher(
    config: &MqsubConfig,
    config_path: &Path,
    job_id: &JobId,
    submitted_at: DateTime<Utc>,
) -> Result<u32> {
    // The watcher may run from a different working directory later on.
    let config_path = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    let program = watcher_program(config);
    let args = watcher_args(&config_path, job_id, submitted_at);
    tracing::debug!("Spawning watcher: {} {}", program.display(), args.join(" "));

    let child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| {
            MqsubError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot start watcher {}: {e}", program.display()),
            ))
        })?;

    let pid = child.id();
    tracing::info!(job_id = %job_id, "👀 Watcher started (pid {pid})");
    Ok(pid)
}
