//! Deskflow commit bus and delivery infrastructure.
//!
//! This crate provides the async building blocks around the trigger engine:
//!
//! - [`CommitBus`] — in-process publish/subscribe hub the persistence layer
//!   pushes completed units of work into.
//! - [`TriggerWorker`] — background service that dispatches each commit to
//!   completion, one at a time, and hands the produced messages to delivery.
//! - [`delivery`] — the outbound mailer contract and the SMTP
//!   implementation.

pub mod bus;
pub mod delivery;
pub mod worker;

pub use bus::CommitBus;
pub use delivery::email::{EmailConfig, SmtpMailer};
pub use delivery::{DeliveryError, DeliveryReceipt, OutboundMailer};
pub use worker::{CommitProcessor, TriggerWorker};
