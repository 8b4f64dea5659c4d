//! # mqsub core
//!
//! Shared building blocks for the `mqsub` submit wrapper and the
//! `mqsub-watch` watcher process:
//!
//! ```text
//! config   → MqsubConfig (loaded once, passed explicitly)
//! error    → MqsubError taxonomy
//! types    → JobId, StatusCode, JobRecord, NotificationEvent
//! traits   → StatusSource (qstat), Mailer (SMTP)
//! logging  → terminal / per-job file subscribers
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::{MqsubConfig, SmtpSecurity};
pub use error::{MqsubError, Result};
pub use traits::{Mailer, StatusSource};
pub use types::{
    FinalStatus, JobId, JobObservation, JobRecord, NotificationEvent, ObservedStatus, StatusCode,
};
