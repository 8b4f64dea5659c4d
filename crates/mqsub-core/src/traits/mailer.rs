//! Mail transport contract.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &str;

    /// Send one plain-text message. Fails with `Notification` on
    /// connection, authentication or rejection errors.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
