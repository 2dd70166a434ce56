//! Per-evaluation context.

use deskflow_core::record::{Commit, RecordChange};
use deskflow_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// Everything a predicate or action may consult besides the record graph:
/// the acting user, a pinned clock, and the change under evaluation.
///
/// The context is transient, scoped to one commit cycle, and discarded once
/// dispatch completes. `now` is supplied by the caller so tests can pin the
/// wall clock.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub actor_id: Option<DbId>,
    pub now: Timestamp,
    pub commit_id: Uuid,
    pub change: &'a RecordChange,
}

impl<'a> EvaluationContext<'a> {
    /// Context for one record change within a commit.
    pub fn for_change(commit: &'a Commit, change: &'a RecordChange, now: Timestamp) -> Self {
        Self {
            actor_id: commit.actor_id,
            now,
            commit_id: commit.id,
            change,
        }
    }
}
