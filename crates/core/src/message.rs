//! Outbound message envelope and deduplication key.
//!
//! The engine never talks to a mail transport directly; a firing produces
//! [`OutboundMessage`]s that the host (or the events crate's worker) hands to
//! a delivery collaborator. The dedup key is stable for a given
//! (rule, record, commit) tuple so repeated delivery attempts cannot
//! double-fire business side effects.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::record::RecordRef;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Security markers
// ---------------------------------------------------------------------------

/// Outcome of one signing or encryption attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SecurityOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            comment: None,
        }
    }

    pub fn failed(comment: impl Into<String>) -> Self {
        Self {
            success: false,
            comment: Some(comment.into()),
        }
    }
}

/// Sign/encrypt markers recorded on a produced artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityResult {
    pub sign: SecurityOutcome,
    pub encryption: SecurityOutcome,
}

// ---------------------------------------------------------------------------
// Deduplication key
// ---------------------------------------------------------------------------

/// Stable deduplication key for one (rule, record, commit) firing.
pub fn dedup_key(rule_id: DbId, record: &RecordRef, commit_id: Uuid) -> String {
    let hash = Sha256::digest(
        format!("{rule_id}/{}/{}/{commit_id}", record.kind, record.id).as_bytes(),
    );
    format!("{hash:x}")
}

// ---------------------------------------------------------------------------
// OutboundMessage
// ---------------------------------------------------------------------------

/// One rendered notification, addressed and ready for delivery.
///
/// Recipients are joined into a single comma-separated `to` list for
/// email-style delivery rather than fanned out individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub dedup_key: String,
    pub rule_id: DbId,
    pub record: RecordRef,
    pub commit_id: Uuid,
    /// Resolved addresses, first-occurrence order, already deduplicated.
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub internal: bool,
    pub security: SecurityResult,
}

impl OutboundMessage {
    /// The comma-joined `to` header value.
    pub fn joined_to(&self) -> String {
        self.to.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
