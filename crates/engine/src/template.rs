//! Notification template rendering.
//!
//! Subjects and bodies may embed `#{entity.attribute}` placeholders, e.g.
//! `#{article.body_as_html}`. Placeholders resolve through the attribute
//! resolver; anything unresolvable renders as the empty string so that
//! re-rendering the same commit snapshot is deterministic.

use regex::Regex;

use deskflow_core::record::RecordAccess;
use deskflow_core::value;

use crate::context::EvaluationContext;
use crate::resolve;

/// Placeholder syntax: `#{entity.attribute}`, dots allowed in the tail.
const PLACEHOLDER_PATTERN: &str = r"#\{\s*([A-Za-z0-9_]+\.[A-Za-z0-9_.]+)\s*\}";

/// Render a template against the record change in `ctx`.
pub fn render(template: &str, ctx: &EvaluationContext<'_>, access: &dyn RecordAccess) -> String {
    let re = match Regex::new(PLACEHOLDER_PATTERN) {
        Ok(re) => re,
        Err(_) => return template.to_string(),
    };
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        match resolve::resolve(&caps[1], ctx, access) {
            Some(resolved) => value::display_string(&resolved),
            None => {
                tracing::debug!(placeholder = &caps[1], "Unresolvable template placeholder");
                String::new()
            }
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskflow_core::record::{Commit, InMemoryStore, RecordChange, RecordRef};
    use serde_json::json;

    fn fixture() -> (InMemoryStore, Commit) {
        let mut store = InMemoryStore::new();
        store.insert(
            RecordRef::ticket(1),
            &[("title", json!("Printer on fire")), ("number", json!(31001))],
        );
        store.insert(
            RecordRef::article(4),
            &[
                ("ticket_id", json!(1)),
                ("body_as_html", json!("<p>please help</p>")),
            ],
        );
        let commit = Commit::new().with_change(RecordChange::created(RecordRef::ticket(1)));
        (store, commit)
    }

    fn render_str(template: &str, store: &InMemoryStore, commit: &Commit) -> String {
        let ctx = EvaluationContext::for_change(commit, &commit.changes[0], commit.occurred_at);
        render(template, &ctx, store)
    }

    #[test]
    fn substitutes_record_and_article_placeholders() {
        let (store, commit) = fixture();
        let rendered = render_str(
            "Ticket #{ticket.number}: >snip<#{article.body_as_html}>/snip<",
            &store,
            &commit,
        );
        assert_eq!(rendered, "Ticket 31001: >snip<<p>please help</p>>/snip<");
    }

    #[test]
    fn unresolvable_placeholder_renders_empty() {
        let (store, commit) = fixture();
        assert_eq!(
            render_str("a#{ticket.missing}b#{organization.name}c", &store, &commit),
            "abc"
        );
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        let (store, commit) = fixture();
        assert_eq!(render_str("Hello World!", &store, &commit), "Hello World!");
    }

    #[test]
    fn rendering_is_deterministic() {
        let (store, commit) = fixture();
        let template = "#{ticket.title} / #{article.body_as_html}";
        assert_eq!(
            render_str(template, &store, &commit),
            render_str(template, &store, &commit)
        );
    }
}
