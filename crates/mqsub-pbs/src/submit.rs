//! `qsub` wrapper: pass-through submission and job id extraction.

use std::process::Stdio;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use mqsub_core::config::MqsubConfig;
use mqsub_core::error::{MqsubError, Result};
use mqsub_core::types::JobId;
use regex::Regex;

use crate::CommandSpec;

/// `<digits>[<array index>].<server>`, e.g. `12345.server1` or `678[].pbs`.
static JOB_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\[\d*\])?(\.[A-Za-z0-9_.-]+)?$").expect("valid job id pattern")
});

/// A successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: JobId,
    /// qsub's stdout, byte for byte.
    pub stdout: String,
    pub submitted_at: DateTime<Utc>,
}

/// Runs the scheduler's submission command.
#[derive(Debug, Clone)]
pub struct Qsub {
    qsub: CommandSpec,
}

impl Qsub {
    pub fn new(qsub: CommandSpec) -> Self {
        Self { qsub }
    }

    pub fn from_config(config: &MqsubConfig) -> Self {
        Self::new(CommandSpec::parse(&config.qsub_bin))
    }

    /// Submit with `args` forwarded unchanged.
    ///
    /// stdin and stderr stay attached to the terminal so password prompts and
    /// scheduler errors reach the user untouched. stdout is captured for the
    /// job id and then echoed unchanged.
    pub async fn submit(&self, args: &[String]) -> Result<Submission> {
        tracing::debug!("🚀 Running: {} {}", self.qsub, args.join(" "));

        let output = self
            .qsub
            .command()
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| {
                MqsubError::submission(
                    format!("'{}' could not be started: {e}", self.qsub.program),
                    None,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        // Pass qsub's stdout through as-is, whether or not we can parse it.
        {
            use std::io::Write;
            let mut out = std::io::stdout().lock();
            out.write_all(&output.stdout).ok();
            out.flush().ok();
        }

        if !output.status.success() {
            return Err(MqsubError::submission(
                format!("{} exited with {}", self.qsub.program, output.status),
                output.status.code(),
            ));
        }

        let job_id = parse_job_id(&stdout).ok_or_else(|| {
            MqsubError::submission(
                format!("no job id in {} output: {:?}", self.qsub.program, stdout.trim()),
                Some(0),
            )
        })?;

        tracing::info!(job_id = %job_id, "📨 Job submitted");
        Ok(Submission {
            job_id,
            stdout,
            submitted_at: Utc::now(),
        })
    }
}

/// First output line that is exactly one job id token.
pub fn parse_job_id(output: &str) -> Option<JobId> {
    output
        .lines()
        .map(str::trim)
        .find(|line| JOB_ID_RE.is_match(line))
        .map(JobId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell;

    #[test]
    fn test_parse_job_id_formats() {
        assert_eq!(parse_job_id("12345.server1\n").unwrap().as_str(), "12345.server1");
        assert_eq!(parse_job_id("678[].pbs01.hpc.edu").unwrap().as_str(), "678[].pbs01.hpc.edu");
        assert_eq!(parse_job_id("4567").unwrap().as_str(), "4567");
        assert_eq!(
            parse_job_id("Note: queue 'share' is busy\n9001.mgr\n").unwrap().as_str(),
            "9001.mgr"
        );
    }

    #[test]
    fn test_parse_job_id_rejects_garbage() {
        assert!(parse_job_id("").is_none());
        assert!(parse_job_id("   \n").is_none());
        assert!(parse_job_id("qsub: submit error (Bad UID for job execution)").is_none());
        assert!(parse_job_id("12345.server1 extra").is_none());
        assert!(parse_job_id("server1.12345").is_none());
    }

    #[tokio::test]
    async fn test_submit_forwards_args_unchanged() {
        // Prints an id only if the arguments arrive intact.
        let qsub = Qsub::new(shell(r#"[ "$*" = "job.sh -l nodes=1:ppn=4 -N my job" ] && echo 12345.server1"#));
        let args: Vec<String> = ["job.sh", "-l", "nodes=1:ppn=4", "-N", "my job"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sub = qsub.submit(&args).await.unwrap();
        assert_eq!(sub.job_id.as_str(), "12345.server1");
        assert_eq!(sub.stdout, "12345.server1\n");
    }

    #[tokio::test]
    async fn test_submit_nonzero_exit() {
        let qsub = Qsub::new(shell("echo 'qsub: Unknown queue' >&2; exit 3"));
        let err = qsub.submit(&["job.sh".to_string()]).await.unwrap_err();
        assert!(matches!(err, MqsubError::Submission { .. }));
        assert_eq!(err.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_submit_unparseable_output() {
        let qsub = Qsub::new(shell("echo 'submitted, probably'"));
        let err = qsub.submit(&["job.sh".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("no job id"));
    }

    #[tokio::test]
    async fn test_submit_missing_binary() {
        let qsub = Qsub::new(CommandSpec::new("/nonexistent/qsub"));
        let err = qsub.submit(&["job.sh".to_string()]).await.unwrap_err();
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("could not be started"));
    }
}
