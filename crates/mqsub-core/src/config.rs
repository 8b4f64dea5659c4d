//! mqsub configuration: loaded once per process and passed explicitly.
//!
//! TOML by default (`mqsub.toml`); a `.json` extension selects JSON so
//! existing `config.json` files keep working.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MqsubError, Result};

/// Validated settings record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqsubConfig {
    #[serde(default = "default_pbs_username")]
    pub pbs_username: String,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub smtp_security: SmtpSecurity,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    #[serde(default)]
    pub recipient_email: String,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Consecutive "not found" answers needed before a job counts as vanished.
    #[serde(default = "default_vanish_confirmations")]
    pub vanish_confirmations: u32,
    #[serde(default = "default_confirm_delay")]
    pub confirm_delay_secs: u64,
    #[serde(default = "default_max_query_failures")]
    pub max_query_failures: u32,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_notify_attempts")]
    pub notify_attempts: u32,
    #[serde(default = "default_notify_backoff")]
    pub notify_backoff_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_qsub_bin")]
    pub qsub_bin: String,
    #[serde(default = "default_qstat_bin")]
    pub qstat_bin: String,
    #[serde(default = "default_tracejob_bin")]
    pub tracejob_bin: String,
    #[serde(default)]
    pub watcher_bin: Option<String>,
}

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587).
    #[default]
    Starttls,
    /// Implicit TLS (port 465).
    Tls,
    /// No encryption. Only for local relays.
    Plain,
}

fn default_pbs_username() -> String { whoami::username() }
fn default_sender_name() -> String { "mqsub".into() }
fn default_poll_interval() -> u64 { 60 }
fn default_vanish_confirmations() -> u32 { 2 }
fn default_confirm_delay() -> u64 { 10 }
fn default_max_query_failures() -> u32 { 5 }
fn default_query_timeout() -> u64 { 30 }
fn default_notify_attempts() -> u32 { 3 }
fn default_notify_backoff() -> u64 { 5 }
fn default_log_dir() -> String { "~/.mqsub/logs".into() }
fn default_qsub_bin() -> String { "qsub".into() }
fn default_qstat_bin() -> String { "qstat".into() }
fn default_tracejob_bin() -> String { "tracejob".into() }

impl MqsubConfig {
    /// Load and validate config from a specific path.
    ///
    /// Fails on a missing file, unparseable content, or any missing/invalid
    /// required field. Nothing partial is ever returned.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MqsubError::config(format!("Configuration file not found: {}", path.display()))
            } else {
                MqsubError::config(format!("Failed to read {}: {e}", path.display()))
            }
        })?;
        let config = Self::parse(&content, path)?;
        config.validate()?;
        tracing::debug!("📋 Config loaded from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(content)
                .map_err(|e| MqsubError::config(format!("Invalid JSON in {}: {e}", path.display())))
        } else {
            toml::from_str(content)
                .map_err(|e| MqsubError::config(format!("Invalid TOML in {}: {e}", path.display())))
        }
    }

    /// Check required fields and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("smtp_server", self.smtp_server.trim().is_empty()),
            ("smtp_port", self.smtp_port == 0),
            ("smtp_user", self.smtp_user.trim().is_empty()),
            ("smtp_password", self.smtp_password.trim().is_empty()),
            ("recipient_email", self.recipient_email.trim().is_empty()),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(MqsubError::config(format!(
                "Missing required configuration parameters: {}",
                missing.join(", ")
            )));
        }

        let positive = [
            ("poll_interval", self.poll_interval),
            ("vanish_confirmations", self.vanish_confirmations as u64),
            ("max_query_failures", self.max_query_failures as u64),
            ("notify_attempts", self.notify_attempts as u64),
            ("query_timeout_secs", self.query_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(MqsubError::config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    /// Default config path: `mqsub.toml` in the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from("mqsub.toml")
    }

    /// The mqsub home directory (~/.mqsub).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mqsub")
    }

    /// Watcher log directory with `~` expanded.
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log_dir).to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_secs(self.confirm_delay_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn notify_backoff(&self) -> Duration {
        Duration::from_secs(self.notify_backoff_secs)
    }
}
