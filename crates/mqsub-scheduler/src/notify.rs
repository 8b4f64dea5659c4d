//! Notifier: turns a job's final event into one email, with bounded retry.
//! Losing the notification silently is the worst outcome, so every attempt
//! and the final give-up are logged.

use std::sync::Arc;
use std::time::Duration;

use mqsub_core::config::MqsubConfig;
use mqsub_core::error::{MqsubError, Result};
use mqsub_core::traits::Mailer;
use mqsub_core::types::{FinalStatus, NotificationEvent};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Retry policy for a single notification.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MqsubConfig) -> Self {
        Self {
            attempts: config.notify_attempts.max(1),
            backoff: config.notify_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Sends job notifications to the configured recipient.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    recipient: String,
    pbs_username: String,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        recipient: &str,
        pbs_username: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            mailer,
            recipient: recipient.to_string(),
            pbs_username: pbs_username.to_string(),
            retry,
        }
    }

    pub fn from_config(mailer: Arc<dyn Mailer>, config: &MqsubConfig) -> Self {
        Self::new(
            mailer,
            &config.recipient_email,
            &config.pbs_username,
            RetryPolicy::from_config(config),
        )
    }

    /// Subject line. Completion and monitoring failure are distinguishable.
    pub fn subject(event: &NotificationEvent) -> String {
        let name = event.job_name.as_deref().unwrap_or("Unknown");
        match event.status {
            FinalStatus::MonitorFailed => {
                format!("PBS Job Monitoring Failed: {name} (Job ID: {})", event.job_id)
            }
            FinalStatus::Completed | FinalStatus::Vanished => {
                format!("PBS Job Completed: {name} (Job ID: {})", event.job_id)
            }
        }
    }

    /// Plain-text body.
    pub fn body(&self, event: &NotificationEvent) -> String {
        let name = event.job_name.as_deref().unwrap_or("Unknown");
        let explanation = match event.status {
            FinalStatus::Completed => "scheduler reported the job as finished",
            FinalStatus::Vanished => "job left the queue; assumed finished",
            FinalStatus::MonitorFailed => "monitoring stopped before the job was seen finishing",
        };

        let mut body = format!("Job ID: {}\n", event.job_id);
        body.push_str(&format!("Job Name: {name}\n"));
        body.push_str(&format!("Final Status: {} ({explanation})\n", event.status));
        body.push_str(&format!("User: {}\n", self.pbs_username));
        body.push_str(&format!("Submitted: {}\n", event.submitted_at.format(TIME_FORMAT)));
        let stamp_label = if event.status.is_failure() { "Reported" } else { "Finished" };
        body.push_str(&format!("{stamp_label}: {}\n", event.timestamp.format(TIME_FORMAT)));
        if let Some(exit) = &event.exit_status {
            body.push_str(&format!("Exit Status: {exit}\n"));
        }
        body.push_str(&format!("Polls: {}\n", event.polls));
        if let Some(detail) = &event.detail {
            body.push_str(&format!("Error: {detail}\n"));
        }
        if event.status.is_failure() {
            body.push_str(&format!(
                "\nThe job may still be running. Check it with: qstat -f {}\n",
                event.job_id
            ));
        }
        body
    }

    /// Send the notification, retrying up to the policy's attempt count.
    /// Returns the number of attempts used.
    pub async fn deliver(&self, event: &NotificationEvent) -> Result<u32> {
        let subject = Self::subject(event);
        let body = self.body(event);
        let mut last_error = None;

        for attempt in 1..=self.retry.attempts {
            match self.mailer.send(&self.recipient, &subject, &body).await {
                Ok(()) => {
                    tracing::info!(
                        job_id = %event.job_id,
                        "✅ Notification sent via {} ({}) on attempt {attempt}",
                        self.mailer.name(),
                        event.status
                    );
                    return Ok(attempt);
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %event.job_id,
                        "⚠️ Notification attempt {attempt}/{} failed: {e}",
                        self.retry.attempts
                    );
                    last_error = Some(e);
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        let err = last_error.unwrap_or_else(|| MqsubError::notification("no attempts made"));
        tracing::error!(
            job_id = %event.job_id,
            "❌ Giving up on notification after {} attempts: {err}",
            self.retry.attempts
        );
        Err(err)
    }
}
