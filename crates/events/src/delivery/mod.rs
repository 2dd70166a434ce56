//! Outbound notification delivery.
//!
//! The engine produces [`OutboundMessage`]s; this module carries them out of
//! process. Delivery is at-least-once: the transport may retry, and the
//! message's dedup key lets every party involved recognise a re-send.

pub mod email;

use async_trait::async_trait;

use deskflow_core::message::OutboundMessage;

/// Receipt for an accepted (or deliberately skipped) outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub dedup_key: String,
    /// Number of addresses on the `to` list.
    pub recipient_count: usize,
    /// Whether this delivery was skipped as an exact re-send.
    pub duplicate: bool,
}

/// Error type for outbound delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// A recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

/// Outbound message capability consumed by the trigger worker.
#[async_trait]
pub trait OutboundMailer: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;
}
