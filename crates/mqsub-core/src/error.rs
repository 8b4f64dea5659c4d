//! Error taxonomy shared by every mqsub crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MqsubError {
    /// Fatal: blocks startup before any submission.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal for the invocation; no watcher is spawned.
    #[error("Submission failed: {message}")]
    Submission {
        message: String,
        exit_code: Option<i32>,
    },

    /// Transient; counted by the job monitor.
    #[error("Status query failed: {0}")]
    StatusQuery(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MqsubError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn submission(msg: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Submission {
            message: msg.into(),
            exit_code,
        }
    }

    pub fn status_query(msg: impl Into<String>) -> Self {
        Self::StatusQuery(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Exit code the submission command returned, if this is a submission error.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Submission { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MqsubError>;
