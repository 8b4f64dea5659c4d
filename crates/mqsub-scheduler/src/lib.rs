//! # mqsub Scheduler
//!
//! The watcher side of mqsub: one detached process per submitted job that
//! polls the scheduler until the job is done, then sends exactly one email.
//!
//! ## Architecture
//! ```text
//! mqsub (CLI) ── qsub ──► job id ──► spawn::spawn_watcher
//!                                        │ (own process group, null stdio)
//!                                        ▼
//! mqsub-watch ── JobMonitor::run ── every poll_interval
//!                  ├── StatusSource::query (qstat -f)
//!                  │     ├── active code  → Running
//!                  │     ├── terminal code → Completed ─┐
//!                  │     ├── not found ×N  → Vanished  ─┤
//!                  │     └── errors ×M     → Failed ────┤
//!                  └── Notifier::deliver (≤3 attempts) ◄┘ → Notified | Failed
//! ```
//! SIGTERM/SIGINT stop the loop without sending anything (see [`shutdown`]).

pub mod monitor;
pub mod notify;
pub mod shutdown;
pub mod spawn;

pub use monitor::{JobMonitor, MonitorOutcome, MonitorSettings, MonitorState};
pub use notify::{Notifier, RetryPolicy};
pub use shutdown::install_shutdown_handler;
pub use spawn::{spawn_watcher, watcher_program};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators for monitor and notifier tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use mqsub_core::error::{MqsubError, Result};
    use mqsub_core::traits::{Mailer, StatusSource};
    use mqsub_core::types::{JobId, JobObservation, StatusCode};

    /// One scripted `qstat` answer.
    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        Code(char),
        Missing,
        Error,
    }

    /// Replays a script of answers; the last step repeats forever.
    pub struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        last: Mutex<Step>,
        job_name: Option<String>,
        queries: AtomicU32,
    }

    impl ScriptedSource {
        pub fn new(steps: &[Step]) -> Self {
            Self {
                steps: Mutex::new(steps.iter().copied().collect()),
                last: Mutex::new(Step::Error),
                job_name: None,
                queries: AtomicU32::new(0),
            }
        }

        pub fn named(mut self, name: &str) -> Self {
            self.job_name = Some(name.to_string());
            self
        }

        pub fn queries(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn query(&self, _job_id: &JobId) -> Result<JobObservation> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let step = {
                let mut steps = self.steps.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                if let Some(next) = steps.pop_front() {
                    *last = next;
                }
                *last
            };
            match step {
                Step::Code(c) => Ok(JobObservation::Present {
                    code: StatusCode::from_code(&c.to_string()).unwrap(),
                    job_name: self.job_name.clone(),
                }),
                Step::Missing => Ok(JobObservation::NotFound),
                Step::Error => Err(MqsubError::status_query("cannot connect to server")),
            }
        }

        async fn exit_status(&self, _job_id: &JobId) -> Option<String> {
            Some("0".into())
        }
    }

    /// Records every message; the first `failures` sends fail.
    #[derive(Default)]
    pub struct RecordingMailer {
        failures: u32,
        attempts: AtomicU32,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingMailer {
        pub fn failing(failures: u32) -> Self {
            Self {
                failures,
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        /// `(to, subject, body)` of every delivered message.
        pub fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(MqsubError::notification("535 authentication failed"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}
