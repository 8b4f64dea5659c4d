//! Seams to the external collaborators: the scheduler and the mail relay.

pub mod mailer;
pub mod status;

pub use mailer::Mailer;
pub use status::StatusSource;
