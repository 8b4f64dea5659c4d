//! # mqsub Channels
//! Notification transports. Email over SMTP is the only one mqsub needs.

pub mod email;

pub use email::SmtpMailer;
