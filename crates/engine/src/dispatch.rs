//! Trigger dispatch: per-commit rule evaluation and firing.
//!
//! One commit is dispatched to completion before the next; within a commit,
//! rules run in (priority, id) order against every changed record, so later
//! rules observe earlier rules' writes. A rule fires at most once per
//! (rule, record, commit) tuple, and executor writes never spawn a nested
//! dispatch cycle: the commit's change set is not re-expanded.

use std::collections::HashSet;

use deskflow_core::calendar::CalendarAccess;
use deskflow_core::directory::Directory;
use deskflow_core::error::EngineError;
use deskflow_core::message::OutboundMessage;
use deskflow_core::record::{Commit, RecordAccess, RecordRef};
use deskflow_core::rule::Rule;
use deskflow_core::types::{DbId, Timestamp};

use crate::condition;
use crate::context::EvaluationContext;
use crate::perform::{self, PerformOutcome};
use crate::security::SecurityRegistry;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The read-only collaborators consulted during evaluation and execution.
pub struct EngineServices<'a> {
    pub directory: &'a dyn Directory,
    pub calendars: &'a dyn CalendarAccess,
    pub security: &'a SecurityRegistry,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One rule firing within a commit.
#[derive(Debug)]
pub struct RuleFiring {
    pub rule_id: DbId,
    pub record: RecordRef,
    pub outcome: PerformOutcome,
}

/// Result of dispatching one commit. No state carries over to the next.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Number of (rule, record) evaluations performed.
    pub evaluated: usize,
    pub firings: Vec<RuleFiring>,
}

impl DispatchOutcome {
    /// All rendered notifications produced by this commit's firings.
    pub fn outbound(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.firings.iter().flat_map(|f| f.outcome.outbound.iter())
    }

    /// All collected execution failures across firings.
    pub fn failures(&self) -> impl Iterator<Item = &EngineError> {
        self.firings.iter().flat_map(|f| f.outcome.failures.iter())
    }

    /// Consume the outcome, keeping only the messages awaiting delivery.
    pub fn into_outbound(self) -> Vec<OutboundMessage> {
        self.firings
            .into_iter()
            .flat_map(|f| f.outcome.outbound)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Dispatch one committed unit of work against the rule set.
///
/// `rules` is the host's active-rule enumeration; inactive rules are
/// filtered and the remainder ordered by (priority, id) here. `now` is the
/// execution-time clock, pinned by tests.
///
/// Per-rule evaluation and execution failures degrade (logged, collected);
/// only a malformed rule that bypassed save-time validation aborts the whole
/// cycle, as [`EngineError::Internal`].
pub fn dispatch(
    commit: &Commit,
    rules: &[Rule],
    access: &mut dyn RecordAccess,
    services: &EngineServices<'_>,
    now: Timestamp,
) -> Result<DispatchOutcome, EngineError> {
    let mut ordered: Vec<&Rule> = rules.iter().filter(|rule| rule.active).collect();
    ordered.sort_by_key(|rule| (rule.priority, rule.id));

    // Malformed rules must never reach dispatch; one getting here is a
    // programming-invariant violation.
    for rule in &ordered {
        rule.validate().map_err(|e| {
            EngineError::Internal(format!("malformed rule {} reached dispatch: {e}", rule.id))
        })?;
    }

    let mut fired: HashSet<(DbId, RecordRef)> = HashSet::new();
    let mut outcome = DispatchOutcome::default();

    for change in &commit.changes {
        for rule in &ordered {
            if !in_scope(rule, &change.record, access) {
                continue;
            }
            // At most one evaluation (and thus firing) per
            // (rule, record, commit) tuple.
            if !fired.insert((rule.id, change.record)) {
                continue;
            }
            outcome.evaluated += 1;

            let ctx = EvaluationContext::for_change(commit, change, now);
            if !condition::matches(&rule.condition, &ctx, access, services.calendars) {
                continue;
            }

            tracing::debug!(
                rule_id = rule.id,
                record_id = change.record.id,
                commit_id = %commit.id,
                "Rule matched, applying perform"
            );
            let perform_outcome =
                perform::apply(rule, &ctx, access, services.directory, services.security);
            for failure in &perform_outcome.failures {
                tracing::error!(
                    rule_id = rule.id,
                    record_id = change.record.id,
                    error = %failure,
                    "Perform action failed"
                );
            }
            outcome.firings.push(RuleFiring {
                rule_id: rule.id,
                record: change.record,
                outcome: perform_outcome,
            });
        }
    }
    Ok(outcome)
}

/// Group scoping: a rule restricted to a group only sees records of that
/// group.
fn in_scope(rule: &Rule, record: &RecordRef, access: &dyn RecordAccess) -> bool {
    let Some(group_id) = rule.group_id else {
        return true;
    };
    access
        .get_attribute(record, "group_id")
        .and_then(|v| v.as_i64())
        .is_some_and(|record_group| record_group == group_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
