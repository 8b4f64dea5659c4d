//! Job monitor: the per-job polling state machine.
//!
//! ```text
//! Pending ─► Running ─► Completed ─┐
//!    │          │                  ├─► Notified
//!    └──────────┴────► Vanished ───┘       (or Failed if email never goes out)
//!    └──────────┴────► Failed (query errors; a failure email is still attempted)
//! ```
//! "Not found" is only believed after `vanish_confirmations` consecutive
//! answers; the confirmations are re-queried inside the same poll cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mqsub_core::config::MqsubConfig;
use mqsub_core::traits::StatusSource;
use mqsub_core::types::{
    FinalStatus, JobId, JobObservation, JobRecord, NotificationEvent, ObservedStatus,
};
use tokio_util::sync::CancellationToken;

use crate::notify::Notifier;

/// Monitor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Pending,
    Running,
    Completed,
    Vanished,
    Notified,
    Failed,
    /// Stopped by an external signal; nothing was sent.
    Stopped,
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Notified | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Vanished => "VANISHED",
            Self::Notified => "NOTIFIED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Timing and thresholds for one monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub confirm_delay: Duration,
    pub vanish_confirmations: u32,
    pub max_query_failures: u32,
}

impl MonitorSettings {
    pub fn from_config(config: &MqsubConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            confirm_delay: config.confirm_delay(),
            vanish_confirmations: config.vanish_confirmations.max(1),
            max_query_failures: config.max_query_failures.max(1),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            confirm_delay: Duration::from_secs(10),
            vanish_confirmations: 2,
            max_query_failures: 5,
        }
    }
}

/// How a monitor run ended.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub state: MonitorState,
    pub polls: u32,
    /// Whether an email actually went out.
    pub notified: bool,
    pub event: Option<NotificationEvent>,
}

/// Result of one poll cycle.
enum Cycle {
    Continue,
    Finished(FinalStatus),
    GaveUp(String),
    Stopped,
}

/// Watches a single job until it finishes, then notifies once.
pub struct JobMonitor {
    record: JobRecord,
    state: MonitorState,
    source: Arc<dyn StatusSource>,
    notifier: Notifier,
    settings: MonitorSettings,
}

impl JobMonitor {
    pub fn new(
        job_id: JobId,
        submitted_at: DateTime<Utc>,
        source: Arc<dyn StatusSource>,
        notifier: Notifier,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            record: JobRecord::new(job_id, submitted_at),
            state: MonitorState::Pending,
            source,
            notifier,
            settings,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    fn transition(&mut self, next: MonitorState) {
        if self.state != next {
            tracing::info!(
                job_id = %self.record.job_id,
                "🔁 {} → {} (poll {})",
                self.state,
                next,
                self.record.polls
            );
            self.state = next;
        }
    }

    /// Poll until a terminal state. Consumes the monitor: a job gets one run
    /// and therefore at most one notification.
    pub async fn run(mut self, shutdown: CancellationToken) -> MonitorOutcome {
        tracing::info!(
            job_id = %self.record.job_id,
            "👀 Watching job (every {}s, vanish after {} misses, give up after {} query failures)",
            self.settings.poll_interval.as_secs(),
            self.settings.vanish_confirmations,
            self.settings.max_query_failures
        );

        let finished = loop {
            match self.poll_cycle(&shutdown).await {
                Cycle::Continue => {}
                Cycle::Finished(status) => break Ok(status),
                Cycle::GaveUp(reason) => break Err(reason),
                Cycle::Stopped => return self.stopped(),
            }
            let interval = self.settings.poll_interval;
            if cancellable(&shutdown, tokio::time::sleep(interval)).await.is_none() {
                return self.stopped();
            }
        };

        match finished {
            Ok(status) => self.notify_finished(status, &shutdown).await,
            Err(reason) => self.notify_gave_up(reason, &shutdown).await,
        }
    }

    /// One scheduled poll, plus any confirmation re-queries it triggers.
    async fn poll_cycle(&mut self, shutdown: &CancellationToken) -> Cycle {
        self.record.polls += 1;
        let job_id = self.record.job_id.clone();

        loop {
            let Some(answer) = cancellable(shutdown, self.source.query(&job_id)).await else {
                return Cycle::Stopped;
            };

            match answer {
                Ok(JobObservation::Present { code, job_name }) => {
                    self.record.consecutive_failures = 0;
                    self.record.consecutive_misses = 0;
                    self.record.seen = true;
                    self.record.last_status = ObservedStatus::Code(code);
                    if job_name.is_some() {
                        self.record.job_name = job_name;
                    }
                    tracing::debug!(job_id = %job_id, "job_state = {code}");

                    if code.is_terminal() {
                        self.transition(MonitorState::Completed);
                        return Cycle::Finished(FinalStatus::Completed);
                    }
                    self.transition(MonitorState::Running);
                    return Cycle::Continue;
                }
                Ok(JobObservation::NotFound) => {
                    self.record.consecutive_failures = 0;
                    self.record.consecutive_misses += 1;
                    self.record.last_status = ObservedStatus::NotFound;

                    if self.record.consecutive_misses >= self.settings.vanish_confirmations {
                        if !self.record.seen {
                            tracing::info!(
                                job_id = %job_id,
                                "Job was never seen in the queue; it finished before the first poll"
                            );
                        }
                        self.transition(MonitorState::Vanished);
                        return Cycle::Finished(FinalStatus::Vanished);
                    }

                    tracing::debug!(
                        job_id = %job_id,
                        "Job not in queue ({}/{}), confirming in {:?}",
                        self.record.consecutive_misses,
                        self.settings.vanish_confirmations,
                        self.settings.confirm_delay
                    );
                    let delay = self.settings.confirm_delay;
                    if cancellable(shutdown, tokio::time::sleep(delay)).await.is_none() {
                        return Cycle::Stopped;
                    }
                }
                Err(e) => {
                    // No answer: the miss streak is neither extended nor broken.
                    self.record.consecutive_failures += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        "⚠️ Status query failed ({}/{}): {e}",
                        self.record.consecutive_failures,
                        self.settings.max_query_failures
                    );
                    if self.record.consecutive_failures >= self.settings.max_query_failures {
                        self.transition(MonitorState::Failed);
                        return Cycle::GaveUp(format!(
                            "{} consecutive status query failures; last: {e}",
                            self.record.consecutive_failures
                        ));
                    }
                    return Cycle::Continue;
                }
            }
        }
    }

    async fn notify_finished(
        mut self,
        status: FinalStatus,
        shutdown: &CancellationToken,
    ) -> MonitorOutcome {
        let job_id = self.record.job_id.clone();
        let Some(exit_status) = cancellable(shutdown, self.source.exit_status(&job_id)).await
        else {
            return self.stopped();
        };

        let mut event = NotificationEvent::from_record(&self.record, status);
        event.exit_status = exit_status;

        let Some(sent) = cancellable(shutdown, self.notifier.deliver(&event)).await else {
            return self.stopped();
        };
        let notified = sent.is_ok();
        if notified {
            self.transition(MonitorState::Notified);
        } else {
            tracing::error!(job_id = %job_id, "❌ Job finished ({status}) but no email could be sent");
            self.transition(MonitorState::Failed);
        }
        self.outcome(notified, Some(event))
    }

    async fn notify_gave_up(
        self,
        reason: String,
        shutdown: &CancellationToken,
    ) -> MonitorOutcome {
        tracing::error!(job_id = %self.record.job_id, "❌ Monitoring failed: {reason}");
        let mut event = NotificationEvent::from_record(&self.record, FinalStatus::MonitorFailed);
        event.detail = Some(reason);

        let Some(sent) = cancellable(shutdown, self.notifier.deliver(&event)).await else {
            return self.stopped();
        };
        self.outcome(sent.is_ok(), Some(event))
    }

    fn stopped(mut self) -> MonitorOutcome {
        tracing::info!(job_id = %self.record.job_id, "🛑 Stop requested; exiting without notification");
        self.transition(MonitorState::Stopped);
        self.outcome(false, None)
    }

    fn outcome(&self, notified: bool, event: Option<NotificationEvent>) -> MonitorOutcome {
        MonitorOutcome {
            state: self.state,
            polls: self.record.polls,
            notified,
            event,
        }
    }
}

/// Run `fut` unless `shutdown` fires first.
async fn cancellable<F: Future>(shutdown: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RetryPolicy;
    use crate::testing::{RecordingMailer, ScriptedSource, Step};

    fn fast_settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(1),
            confirm_delay: Duration::from_millis(1),
            vanish_confirmations: 2,
            max_query_failures: 5,
        }
    }

    fn monitor(
        job_id: &str,
        source: Arc<ScriptedSource>,
        mailer: Arc<RecordingMailer>,
        settings: MonitorSettings,
    ) -> JobMonitor {
        let notifier = Notifier::new(
            mailer,
            "me@example.org",
            "alice",
            RetryPolicy {
                attempts: 3,
                backoff: Duration::from_millis(1),
            },
        );
        JobMonitor::new(JobId::new(job_id), Utc::now(), source, notifier, settings)
    }

    #[tokio::test]
    async fn test_terminal_code_notifies_once() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[Code('Q'), Code('R'), Code('C')]).named("relax_Si"));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("77.pbs", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert!(outcome.notified);
        assert_eq!(outcome.polls, 3);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "PBS Job Completed: relax_Si (Job ID: 77.pbs)");
        assert!(sent[0].2.contains("Final Status: COMPLETED"));
        assert!(sent[0].2.contains("Exit Status: 0"));
        assert_eq!(outcome.event.unwrap().status, FinalStatus::Completed);
    }

    #[tokio::test]
    async fn test_running_then_vanished_after_three_cycles() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[Code('R'), Code('R'), Missing, Missing]));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("12345.server1", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert_eq!(outcome.polls, 3);
        // Third cycle = first miss + one confirmation.
        assert_eq!(source.queries(), 4);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("PBS Job Completed:"));
        assert!(sent[0].2.contains("Final Status: VANISHED"));
        assert_eq!(outcome.event.unwrap().status, FinalStatus::Vanished);
    }

    #[tokio::test]
    async fn test_single_confirmation_setting_vanishes_on_first_miss() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[Code('R'), Code('R'), Missing]));
        let mailer = Arc::new(RecordingMailer::default());
        let settings = MonitorSettings {
            vanish_confirmations: 1,
            ..fast_settings()
        };
        let outcome = monitor("12345.server1", source.clone(), mailer.clone(), settings)
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert_eq!(outcome.polls, 3);
        assert_eq!(source.queries(), 3);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_miss_is_not_vanished() {
        use Step::*;
        // A single blip of "not found" that the confirmation query contradicts.
        let source = Arc::new(ScriptedSource::new(&[
            Code('R'),
            Missing,
            Code('R'),
            Code('R'),
            Code('C'),
        ]));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("1.s", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert_eq!(outcome.polls, 4);
        assert_eq!(outcome.event.unwrap().status, FinalStatus::Completed);
    }

    #[tokio::test]
    async fn test_never_seen_job_vanishes() {
        let source = Arc::new(ScriptedSource::new(&[Step::Missing]));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("1.s", source, mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert_eq!(outcome.polls, 1);
        assert!(mailer.sent()[0].2.contains("VANISHED"));
    }

    #[tokio::test]
    async fn test_transient_failures_recover() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[
            Code('R'),
            Error,
            Error,
            Error,
            Error,
            Code('R'),
            Error,
            Code('C'),
        ]));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("1.s", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Notified);
        assert_eq!(outcome.polls, 8);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("PBS Job Completed:"));
    }

    #[tokio::test]
    async fn test_persistent_failures_send_failure_notice() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[Code('R'), Error]));
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = monitor("1.s", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Failed);
        assert_eq!(outcome.polls, 6);
        assert_eq!(source.queries(), 6);
        assert!(outcome.notified);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("PBS Job Monitoring Failed:"));
        assert!(sent[0].2.contains("Final Status: FAILED"));
        assert!(sent[0].2.contains("5 consecutive status query failures"));
    }

    #[tokio::test]
    async fn test_notification_failure_ends_in_failed() {
        use Step::*;
        let source = Arc::new(ScriptedSource::new(&[Code('R'), Code('C')]));
        let mailer = Arc::new(RecordingMailer::failing(3));
        let outcome = monitor("1.s", source.clone(), mailer.clone(), fast_settings())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome.state, MonitorState::Failed);
        assert!(!outcome.notified);
        assert_eq!(mailer.attempts(), 3);
        assert!(mailer.sent().is_empty());
        // No polling after the job was known complete.
        assert_eq!(source.queries(), 2);
        assert_eq!(outcome.polls, 2);
    }

    #[tokio::test]
    async fn test_stop_before_start_sends_nothing() {
        let source = Arc::new(ScriptedSource::new(&[Step::Code('C')]));
        let mailer = Arc::new(RecordingMailer::default());
        let token = CancellationToken::new();
        token.cancel();
        let outcome = monitor("1.s", source.clone(), mailer.clone(), fast_settings())
            .run(token)
            .await;

        assert_eq!(outcome.state, MonitorState::Stopped);
        assert!(!outcome.notified);
        assert!(outcome.event.is_none());
        assert_eq!(source.queries(), 0);
        assert_eq!(mailer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_stop_while_polling() {
        let source = Arc::new(ScriptedSource::new(&[Step::Code('R')]));
        let mailer = Arc::new(RecordingMailer::default());
        let token = CancellationToken::new();
        let settings = MonitorSettings {
            poll_interval: Duration::from_secs(3600),
            ..fast_settings()
        };
        let handle = tokio::spawn(
            monitor("1.s", source.clone(), mailer.clone(), settings).run(token.clone()),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.state, MonitorState::Stopped);
        assert_eq!(outcome.polls, 1);
        assert_eq!(mailer.attempts(), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let config: MqsubConfig = toml::from_str(
            r#"
            smtp_server = "s"
            smtp_port = 25
            smtp_user = "u"
            smtp_password = "p"
            recipient_email = "r@example.org"
            poll_interval = 15
            vanish_confirmations = 3
            "#,
        )
        .unwrap();
        let settings = MonitorSettings::from_config(&config);
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
        assert_eq!(settings.vanish_confirmations, 3);
        assert_eq!(settings.max_query_failures, 5);
    }

    #[test]
    fn test_terminal_states() {
        assert!(MonitorState::Notified.is_terminal());
        assert!(MonitorState::Failed.is_terminal());
        assert!(!MonitorState::Vanished.is_terminal());
        assert_eq!(MonitorState::Vanished.to_string(), "VANISHED");
    }
}
