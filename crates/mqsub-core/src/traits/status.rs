//! Status source: how a watcher asks the scheduler about its job.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{JobId, JobObservation};

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Query the live queue for `job_id`.
    ///
    /// `Ok(NotFound)` means the scheduler answered and the job is absent.
    /// `Err(StatusQuery)` means no trustworthy answer was obtained.
    async fn query(&self, job_id: &JobId) -> Result<JobObservation>;

    /// Best-effort exit status of a finished job.
    async fn exit_status(&self, _job_id: &JobId) -> Option<String> {
        None
    }
}
