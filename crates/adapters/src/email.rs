//! SMTP email delivery channel

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use profile_digest_domain::{ChannelError, Digest, DigestChannel, EmailSettings, SendStatus};
use std::time::Duration;

/// Email subject for a digest
pub fn subject_for(digest: &Digest) -> String {
    if digest.entries.is_empty() {
        "Daily Relationship Update - No new posts today".to_string()
    } else {
        format!(
            "Daily Relationship Update - {} new post(s)",
            digest.entries.len()
        )
    }
}

/// Delivers digests as multipart/alternative mail over STARTTLS with login
pub struct EmailChannel {
    timeout: Duration,
}

impl EmailChannel {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    fn build_message(
        digest: &Digest,
        from: &str,
        to: &str,
    ) -> Result<Message, ChannelError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| ChannelError::Config(format!("Invalid smtp_user address: {}", e)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| ChannelError::Config(format!("Invalid notify_email address: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject_for(digest))
            .multipart(MultiPart::alternative_plain_html(
                digest.plain_body.clone(),
                digest.rich_body.clone(),
            ))
            .map_err(|e| ChannelError::Config(format!("Failed to build message: {}", e)))
    }
}

impl Default for EmailChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DigestChannel for EmailChannel {
    async fn send(
        &self,
        digest: &Digest,
        settings: &EmailSettings,
    ) -> Result<SendStatus, ChannelError> {
        let (Some(to), Some(host), Some(port), Some(user), Some(password)) = (
            settings.notify_email.as_deref(),
            settings.smtp_host.as_deref(),
            settings.smtp_port,
            settings.smtp_user.as_deref(),
            settings.smtp_password.as_deref(),
        ) else {
            let missing = settings.missing_fields().join(", ");
            tracing::info!(missing = %missing, "Email not fully configured");
            return Ok(SendStatus::Skipped(format!("missing {}", missing)));
        };

        let message = Self::build_message(digest, user, to)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| ChannelError::Config(format!("Invalid SMTP host {}: {}", host, e)))?
            .port(port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .timeout(Some(self.timeout))
            .build();

        let response = mailer
            .send(message)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        if !response.is_positive() {
            return Err(ChannelError::Rejected(format!("SMTP {}", response.code())));
        }

        tracing::info!(
            to = %to,
            entries = digest.entries.len(),
            "Email digest sent"
        );
        Ok(SendStatus::Sent)
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
