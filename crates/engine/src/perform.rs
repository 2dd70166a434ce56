//! Perform-action execution against a matched record.
//!
//! Actions run in declaration order so later actions observe earlier
//! attribute writes. Every action is attempted; failures are collected into
//! the outcome rather than aborting the remainder. Notification actions are
//! idempotency-aware: a firing that already produced its artifact (same
//! dedup key) is skipped on re-execution.

use serde_json::Value;

use deskflow_core::directory::Directory;
use deskflow_core::error::EngineError;
use deskflow_core::message::{self, OutboundMessage};
use deskflow_core::record::{ArticleDraft, RecordAccess, RecordRef};
use deskflow_core::rule::{
    ActionSpec, AttributeUpdate, EmailNotification, PendingTime, PerformEntry, Rule,
};

use crate::context::EvaluationContext;
use crate::recipient;
use crate::security::SecurityRegistry;
use crate::template;

/// Result of applying one rule's perform map.
#[derive(Debug, Default)]
pub struct PerformOutcome {
    /// Articles created on the record, in action order.
    pub articles: Vec<RecordRef>,
    /// Rendered notifications awaiting delivery.
    pub outbound: Vec<OutboundMessage>,
    /// Collected execution failures; never aborts sibling actions.
    pub failures: Vec<EngineError>,
    /// Targets whose outbound action a `discard` security policy suppressed.
    pub suppressed: Vec<String>,
}

/// Apply a matched rule's perform map to the record in `ctx`.
pub fn apply(
    rule: &Rule,
    ctx: &EvaluationContext<'_>,
    access: &mut dyn RecordAccess,
    directory: &dyn Directory,
    security: &SecurityRegistry,
) -> PerformOutcome {
    let mut outcome = PerformOutcome::default();

    for entry in rule.perform.iter() {
        match &entry.action {
            ActionSpec::Attribute(update) => {
                apply_attribute(entry, update, ctx, access, &mut outcome);
            }
            ActionSpec::PendingTime(pending) => {
                apply_pending_time(entry, pending, ctx, access, &mut outcome);
            }
            ActionSpec::EmailNotification(notification) => {
                apply_notification(rule, entry, notification, ctx, access, directory, security,
                    &mut outcome);
            }
            ActionSpec::Unsupported(_) => {
                outcome.failures.push(EngineError::execution(
                    &entry.target,
                    "unsupported action kind",
                ));
            }
        }
    }
    outcome
}

fn apply_attribute(
    entry: &PerformEntry,
    update: &AttributeUpdate,
    ctx: &EvaluationContext<'_>,
    access: &mut dyn RecordAccess,
    outcome: &mut PerformOutcome,
) {
    let Some(attribute) = own_attribute(&entry.target, ctx) else {
        outcome.failures.push(EngineError::execution(
            &entry.target,
            format!(
                "target does not address the {} under evaluation",
                ctx.change.record.kind
            ),
        ));
        return;
    };
    if let Err(e) = access.set_attribute(&ctx.change.record, attribute, update.value.clone()) {
        outcome.failures.push(e);
    }
}

fn apply_pending_time(
    entry: &PerformEntry,
    pending: &PendingTime,
    ctx: &EvaluationContext<'_>,
    access: &mut dyn RecordAccess,
    outcome: &mut PerformOutcome,
) {
    let Some(attribute) = own_attribute(&entry.target, ctx) else {
        outcome.failures.push(EngineError::execution(
            &entry.target,
            format!(
                "target does not address the {} under evaluation",
                ctx.change.record.kind
            ),
        ));
        return;
    };

    let instant = match pending {
        PendingTime::Static { value } => *value,
        PendingTime::Relative { range, .. } => match pending.relative_amount() {
            Some(amount) => range.add_to(ctx.now, amount),
            None => {
                outcome.failures.push(EngineError::execution(
                    &entry.target,
                    "relative value must be a positive integer",
                ));
                return;
            }
        },
    };

    let value = Value::from(instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
    if let Err(e) = access.set_attribute(&ctx.change.record, attribute, value) {
        outcome.failures.push(e);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_notification(
    rule: &Rule,
    entry: &PerformEntry,
    notification: &EmailNotification,
    ctx: &EvaluationContext<'_>,
    access: &mut dyn RecordAccess,
    directory: &dyn Directory,
    security: &SecurityRegistry,
    outcome: &mut PerformOutcome,
) {
    let record = ctx.change.record;

    // An inbound article flagged to suppress auto-responses (e.g. a bounce
    // message) blocks notification actions for this commit.
    if suppresses_auto_response(ctx, access) {
        tracing::info!(
            rule_id = rule.id,
            record_id = record.id,
            "Last article suppresses auto-responses, skipping notification"
        );
        return;
    }

    let recipients = recipient::resolve(&notification.recipient, ctx, access, directory);
    if recipients.is_empty() {
        tracing::info!(
            rule_id = rule.id,
            record_id = record.id,
            "No resolvable recipient, skipping notification"
        );
        return;
    }

    let dedup_key = message::dedup_key(rule.id, &record, ctx.commit_id);
    if access.article_with_dedup_key(&record, &dedup_key).is_some() {
        tracing::debug!(
            rule_id = rule.id,
            record_id = record.id,
            "Notification already produced for this commit, skipping"
        );
        return;
    }

    let sender = access
        .get_attribute(&record, "group_address")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let result = match security.evaluate(notification, &sender, &recipients) {
        Ok(result) => result,
        Err(EngineError::SecurityPolicy(reason)) => {
            tracing::info!(
                rule_id = rule.id,
                record_id = record.id,
                reason = %reason,
                "Security policy discarded notification"
            );
            outcome.suppressed.push(entry.target.clone());
            return;
        }
        Err(other) => {
            outcome.failures.push(other);
            return;
        }
    };

    let subject = template::render(&notification.subject, ctx, access);
    let body = template::render(&notification.body, ctx, access);
    let to = recipients.join(", ");

    let draft = ArticleDraft {
        from: "System".to_string(),
        to,
        subject: subject.clone(),
        body: body.clone(),
        internal: notification.internal,
        security: result.clone(),
        dedup_key: dedup_key.clone(),
    };
    let article = match access.create_article(&record, draft) {
        Ok(article) => article,
        Err(e) => {
            outcome.failures.push(e);
            return;
        }
    };
    outcome.articles.push(article);
    outcome.outbound.push(OutboundMessage {
        dedup_key,
        rule_id: rule.id,
        record,
        commit_id: ctx.commit_id,
        to: recipients,
        subject,
        body,
        internal: notification.internal,
        security: result,
    });
}

/// The attribute name when `target` addresses the record under evaluation.
fn own_attribute<'a>(target: &'a str, ctx: &EvaluationContext<'_>) -> Option<&'a str> {
    let (entity, attribute) = target.split_once('.')?;
    (entity == ctx.change.record.kind.as_str()).then_some(attribute)
}

/// Whether the ticket's most recent article opts out of auto-responses.
fn suppresses_auto_response(ctx: &EvaluationContext<'_>, access: &dyn RecordAccess) -> bool {
    let Some(article) = access.last_article(&ctx.change.record) else {
        return false;
    };
    access
        .get_attribute(&article, "preferences")
        .and_then(|prefs| prefs.get("send-auto-response").cloned())
        .is_some_and(|flag| flag == Value::Bool(false))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
