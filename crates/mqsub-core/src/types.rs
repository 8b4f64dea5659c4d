//! Job data model: the watcher's view of one submitted job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque scheduler-assigned job identifier, e.g. `12345.server1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// PBS/Torque `job_state` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Queued,
    Running,
    Held,
    Waiting,
    Transit,
    Exiting,
    Suspended,
    ArrayBegun,
    /// Torque: completed, not yet purged.
    Completed,
    /// PBS Pro: finished (history).
    Finished,
    /// PBS Pro: subjob expired.
    Expired,
    Other(char),
}

impl StatusCode {
    /// Parse a `job_state` value. Only the first character matters.
    pub fn from_code(code: &str) -> Option<Self> {
        let c = code.trim().chars().next()?;
        Some(match c.to_ascii_uppercase() {
            'Q' => Self::Queued,
            'R' => Self::Running,
            'H' => Self::Held,
            'W' => Self::Waiting,
            'T' => Self::Transit,
            'E' => Self::Exiting,
            'S' => Self::Suspended,
            'B' => Self::ArrayBegun,
            'C' => Self::Completed,
            'F' => Self::Finished,
            'X' => Self::Expired,
            other => Self::Other(other),
        })
    }

    pub fn code(&self) -> char {
        match self {
            Self::Queued => 'Q',
            Self::Running => 'R',
            Self::Held => 'H',
            Self::Waiting => 'W',
            Self::Transit => 'T',
            Self::Exiting => 'E',
            Self::Suspended => 'S',
            Self::ArrayBegun => 'B',
            Self::Completed => 'C',
            Self::Finished => 'F',
            Self::Expired => 'X',
            Self::Other(c) => *c,
        }
    }

    /// The job is done but still listed by the scheduler.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Finished | Self::Expired)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One successful answer from the status source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobObservation {
    Present {
        code: StatusCode,
        job_name: Option<String>,
    },
    /// The job id is absent from the live queue.
    NotFound,
}

/// Last thing the monitor learned about the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedStatus {
    Unknown,
    Code(StatusCode),
    NotFound,
}

/// Per-job state owned by a single watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub job_name: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub last_status: ObservedStatus,
    /// Completed poll cycles.
    pub polls: u32,
    pub consecutive_misses: u32,
    pub consecutive_failures: u32,
    /// Whether the job was ever seen in the queue.
    pub seen: bool,
}

impl JobRecord {
    pub fn new(job_id: JobId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            job_name: None,
            submitted_at,
            last_status: ObservedStatus::Unknown,
            polls: 0,
            consecutive_misses: 0,
            consecutive_failures: 0,
            seen: false,
        }
    }
}

/// Final classification carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalStatus {
    /// Explicit terminal code observed.
    Completed,
    /// Job disappeared from the queue; inferred as finished.
    Vanished,
    /// Monitoring gave up; the job's fate is unknown.
    MonitorFailed,
}

impl FinalStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Vanished => "VANISHED",
            Self::MonitorFailed => "FAILED",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::MonitorFailed)
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Built exactly once per job, by the watcher that saw it finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub job_id: JobId,
    pub job_name: Option<String>,
    pub status: FinalStatus,
    pub exit_status: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub polls: u32,
    /// Why monitoring failed, if it did.
    pub detail: Option<String>,
}

impl NotificationEvent {
    pub fn from_record(record: &JobRecord, status: FinalStatus) -> Self {
        Self {
            job_id: record.job_id.clone(),
            job_name: record.job_name.clone(),
            status,
            exit_status: None,
            submitted_at: record.submitted_at,
            timestamp: Utc::now(),
            polls: record.polls,
            detail: None,
        }
    }
}
