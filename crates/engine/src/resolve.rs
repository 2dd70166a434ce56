//! Attribute path resolution against the record graph.
//!
//! Paths are dot-separated `<entity>.<attribute>`. The entity is either the
//! record under evaluation (by its kind name, e.g. `ticket`), or `article`
//! for the ticket's most recent article. Unknown entities and attributes
//! resolve to `None`; predicates treat that as "never matches".
//!
//! Two virtual namespaces never reach this resolver: `<kind>.action` is
//! transaction metadata and `execution_time.*` is consumed by the
//! working-time predicate, both handled in the condition evaluator.

use serde_json::Value;

use deskflow_core::record::RecordAccess;

use crate::context::EvaluationContext;

/// Resolve `path` for the record under evaluation.
pub fn resolve(
    path: &str,
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
) -> Option<Value> {
    let (entity, attribute) = path.split_once('.')?;

    if entity == ctx.change.record.kind.as_str() {
        return access.get_attribute(&ctx.change.record, attribute);
    }
    match entity {
        "article" => {
            let article = access.last_article(&ctx.change.record)?;
            access.get_attribute(&article, attribute)
        }
        _ => {
            tracing::debug!(path, "Unknown entity in attribute path");
            None
        }
    }
}
