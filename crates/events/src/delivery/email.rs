//! Email notification delivery via SMTP.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport to send trigger
//! notifications. Configuration is loaded from environment variables; if
//! `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and no
//! mailer should be constructed. Recipients travel as one comma-separated
//! `to` list, not as individual fan-out sends.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use deskflow_core::message::OutboundMessage;

use super::{DeliveryError, DeliveryReceipt, OutboundMailer};

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@deskflow.local";

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    ///
    /// | Variable        | Required | Default                   |
    /// |-----------------|----------|---------------------------|
    /// | `SMTP_HOST`     | yes      | —                         |
    /// | `SMTP_PORT`     | no       | `587`                     |
    /// | `SMTP_FROM`     | no       | `noreply@deskflow.local`  |
    /// | `SMTP_USER`     | no       | —                         |
    /// | `SMTP_PASSWORD` | no       | —                         |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// Sends trigger notifications via SMTP.
///
/// Re-sends of an already-delivered dedup key are acknowledged without a
/// second transport call, so a retrying upstream cannot duplicate the
/// outbound mail. Transport failures leave the key unmarked and may be
/// retried.
pub struct SmtpMailer {
    config: EmailConfig,
    delivered: Mutex<HashSet<String>>,
}

impl SmtpMailer {
    /// Create a new mailer with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            delivered: Mutex::new(HashSet::new()),
        }
    }

    async fn transport_send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for address in &message.to {
            builder = builder.to(address.parse()?);
        }
        let email = builder
            .body(message.body.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboundMailer for SmtpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if self.delivered.lock().await.contains(&message.dedup_key) {
            tracing::debug!(
                dedup_key = %message.dedup_key,
                "Message already delivered, acknowledging re-send"
            );
            return Ok(DeliveryReceipt {
                dedup_key: message.dedup_key.clone(),
                recipient_count: message.to.len(),
                duplicate: true,
            });
        }

        self.transport_send(message).await?;
        // Mark only after the transport accepted the message, so a failed
        // attempt stays retryable.
        self.delivered.lock().await.insert(message.dedup_key.clone());

        tracing::info!(
            to = %message.joined_to(),
            subject = %message.subject,
            "Notification email sent"
        );
        Ok(DeliveryReceipt {
            dedup_key: message.dedup_key.clone(),
            recipient_count: message.to.len(),
            duplicate: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_returns_none_without_smtp_host() {
        // Ensure SMTP_HOST is not set in the test environment.
        std::env::remove_var("SMTP_HOST");
        assert!(EmailConfig::from_env().is_none());
    }

    #[test]
    fn delivery_error_display_build() {
        let err = DeliveryError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn delivery_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = DeliveryError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
