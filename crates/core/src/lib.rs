//! Deskflow domain types.
//!
//! This crate carries the data model of the trigger engine and the
//! collaborator traits it evaluates against:
//!
//! - [`rule`] — the Rule document: condition predicates and perform actions
//!   as typed unions, with save-time validation.
//! - [`record`] — record references, commit/change snapshots, and the
//!   [`RecordAccess`](record::RecordAccess) trait with an in-memory store.
//! - [`calendar`] — working-time calendars for time-based predicates.
//! - [`directory`] — user/address lookups for recipient resolution.
//! - [`message`] — the outbound message envelope and its dedup key.
//! - [`value`] — loose scalar comparison shared by all predicates.
//! - [`error`] — the engine error taxonomy.

pub mod calendar;
pub mod directory;
pub mod error;
pub mod message;
pub mod record;
pub mod rule;
pub mod types;
pub mod value;

pub use calendar::{Calendar, CalendarAccess, InMemoryCalendars};
pub use directory::{Directory, InMemoryDirectory, UserRef};
pub use error::EngineError;
pub use message::{OutboundMessage, SecurityOutcome, SecurityResult};
pub use record::{
    ArticleDraft, ChangeKind, Commit, InMemoryStore, ObjectKind, RecordAccess, RecordChange,
    RecordRef,
};
pub use rule::{
    ActionSpec, Condition, ConditionEntry, EmailNotification, Operator, PendingTime, Perform,
    PerformEntry, PreCondition, PredicateSpec, RecipientSpec, Rule, SecurityPolicy, TimeRange,
};
