//! Recipient specification expansion.
//!
//! A spec entry is either a group keyword (`ticket_customer`,
//! `ticket_owner`, `article_last_sender`) resolved against the record graph,
//! or a `userid_<id>` reference resolved through the directory. Output
//! preserves first-occurrence order and dedups addresses case-insensitively;
//! the first occurrence keeps its original casing.

use std::collections::HashSet;

use deskflow_core::directory::Directory;
use deskflow_core::record::RecordAccess;
use deskflow_core::rule::RecipientSpec;

use crate::context::EvaluationContext;

/// Expand a recipient spec into a deduplicated, ordered address list.
///
/// Unresolvable entries are skipped, never an error.
pub fn resolve(
    spec: &RecipientSpec,
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    directory: &dyn Directory,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for entry in spec.entries() {
        let Some(address) = resolve_entry(entry.trim(), ctx, access, directory) else {
            continue;
        };
        if seen.insert(address.to_lowercase()) {
            addresses.push(address);
        }
    }
    addresses
}

fn resolve_entry(
    entry: &str,
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    directory: &dyn Directory,
) -> Option<String> {
    match entry {
        "" => None,
        "ticket_customer" => user_attribute_address(ctx, access, directory, "customer_id"),
        "ticket_owner" => user_attribute_address(ctx, access, directory, "owner_id"),
        "article_last_sender" => last_sender_address(ctx, access, directory),
        _ => {
            if let Some(raw_id) = entry.strip_prefix("userid_") {
                let id = raw_id.parse().ok()?;
                return directory.lookup_user(id).map(|user| user.email);
            }
            tracing::warn!(entry, "Unknown recipient keyword");
            None
        }
    }
}

fn user_attribute_address(
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    directory: &dyn Directory,
    attribute: &str,
) -> Option<String> {
    let user_id = access
        .get_attribute(&ctx.change.record, attribute)?
        .as_i64()?;
    directory.lookup_user(user_id).map(|user| user.email)
}

/// The originator address of the ticket's most recent article.
///
/// `reply_to` wins over `from` when present. An article originating from one
/// of the system's own addresses yields no recipient, so triggers cannot
/// answer an auto-responder loop.
fn last_sender_address(
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    directory: &dyn Directory,
) -> Option<String> {
    let article = access.last_article(&ctx.change.record)?;
    let attribute_of = |name: &str| {
        access
            .get_attribute(&article, name)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
    };

    let from = attribute_of("from");
    let reply_to = attribute_of("reply_to");
    for candidate in [&reply_to, &from].into_iter().flatten() {
        if directory.is_system_address(candidate) {
            tracing::debug!(address = %candidate, "Last sender is a system address, skipping");
            return None;
        }
    }
    reply_to.or(from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
