//! Email channel: async SMTP sending via lettre.
//!
//! One authenticated session per message; nothing is pooled between sends,
//! so a watcher that sends once and exits holds no connection.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use mqsub_core::config::{MqsubConfig, SmtpSecurity};
use mqsub_core::error::{MqsubError, Result};
use mqsub_core::traits::Mailer;

/// Upper bound for one SMTP conversation.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP transport settings.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    user: String,
    password: String,
    security: SmtpSecurity,
    display_name: String,
}

impl SmtpMailer {
    pub fn from_config(config: &MqsubConfig) -> Self {
        Self {
            host: config.smtp_server.clone(),
            port: config.smtp_port,
            user: config.smtp_user.clone(),
            password: config.smtp_password.clone(),
            security: config.smtp_security,
            display_name: config.sender_name.clone(),
        }
    }

    /// Build the RFC 5322 message without sending it.
    pub fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<LettreMessage> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.display_name, self.user)
            .parse()
            .map_err(|e| MqsubError::notification(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| MqsubError::notification(format!("Invalid to: {e}")))?;

        LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MqsubError::notification(format!("Build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = match self.security {
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| MqsubError::notification(format!("SMTP relay: {e}")))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| MqsubError::notification(format!("SMTP relay: {e}")))?,
            SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
        };

        Ok(builder
            .port(self.port)
            .credentials(Credentials::new(self.user.clone(), self.password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = self.build_message(to, subject, body)?;
        let mailer = self.transport()?;

        tracing::debug!("Connecting to SMTP server {}:{}", self.host, self.port);
        mailer
            .send(email)
            .await
            .map_err(|e| MqsubError::notification(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}
