//! `qstat -f` status source with `tracejob` exit-status lookup.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mqsub_core::config::MqsubConfig;
use mqsub_core::error::{MqsubError, Result};
use mqsub_core::traits::StatusSource;
use mqsub_core::types::{JobId, JobObservation, StatusCode};

use crate::CommandSpec;

/// stderr fragments PBS flavours print when a job is no longer in the queue.
const NOT_FOUND_MARKERS: &[&str] = &[
    "unknown job id",
    "job has finished",
    "does not exist",
];

/// Queries job state by shelling out to `qstat -f <job_id>`.
#[derive(Debug, Clone)]
pub struct Qstat {
    qstat: CommandSpec,
    tracejob: CommandSpec,
    timeout: Duration,
}

impl Qstat {
    pub fn new(qstat: CommandSpec, tracejob: CommandSpec, timeout: Duration) -> Self {
        Self {
            qstat,
            tracejob,
            timeout,
        }
    }

    pub fn from_config(config: &MqsubConfig) -> Self {
        Self::new(
            CommandSpec::parse(&config.qstat_bin),
            CommandSpec::parse(&config.tracejob_bin),
            config.query_timeout(),
        )
    }

    async fn run(&self, spec: &CommandSpec, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = spec.command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MqsubError::status_query(format!(
                "'{}' could not be started: {e}",
                spec.program
            ))),
            Err(_) => Err(MqsubError::status_query(format!(
                "'{}' timed out after {}s",
                spec.program,
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl StatusSource for Qstat {
    async fn query(&self, job_id: &JobId) -> Result<JobObservation> {
        let output = self.run(&self.qstat, &["-f", job_id.as_str()]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let (job_name, state) = parse_qstat_full(&stdout);
            return Ok(match state {
                Some(code) => JobObservation::Present { code, job_name },
                None => JobObservation::NotFound,
            });
        }

        if reports_missing_job(&stderr) {
            tracing::debug!(job_id = %job_id, "qstat no longer lists the job: {}", stderr.trim());
            return Ok(JobObservation::NotFound);
        }

        Err(MqsubError::status_query(format!(
            "qstat exited with {}: {}",
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into()),
            stderr.trim()
        )))
    }

    async fn exit_status(&self, job_id: &JobId) -> Option<String> {
        match self.run(&self.tracejob, &["-n", "1", job_id.as_str()]).await {
            Ok(output) => parse_exit_status(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::debug!(job_id = %job_id, "tracejob unavailable: {e}");
                None
            }
        }
    }
}

/// Extract `(Job_Name, job_state)` from `qstat -f` output.
pub fn parse_qstat_full(output: &str) -> (Option<String>, Option<StatusCode>) {
    let mut job_name = None;
    let mut state = None;
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "Job_Name" if !value.is_empty() => job_name = Some(value.to_string()),
            "job_state" => state = StatusCode::from_code(value),
            _ => {}
        }
    }
    (job_name, state)
}

/// Whether qstat's stderr says the job is gone rather than the query failing.
pub fn reports_missing_job(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

/// Value of the `Exit_status=` field in `tracejob` output.
pub fn parse_exit_status(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|l| l.contains("Exit_status"))
        .flat_map(|l| l.split_whitespace())
        .find_map(|tok| tok.strip_prefix("Exit_status="))
        .map(String::from)
}
