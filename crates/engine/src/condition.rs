//! Condition tree evaluation.
//!
//! A condition is a conjunction: every predicate must match for the rule to
//! fire, and an empty condition matches always. Failed lookups of any kind
//! (attribute, calendar, acting user) make the affected predicate false,
//! never an error.

use serde_json::Value;

use deskflow_core::calendar::CalendarAccess;
use deskflow_core::record::RecordAccess;
use deskflow_core::rule::{Condition, ConditionEntry, Operator, PreCondition, PredicateSpec};
use deskflow_core::types::DbId;
use deskflow_core::value;

use crate::context::EvaluationContext;
use crate::resolve;

/// Evaluate a condition against the record change in `ctx`.
pub fn matches(
    condition: &Condition,
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    calendars: &dyn CalendarAccess,
) -> bool {
    condition
        .iter()
        .all(|entry| matches_entry(entry, ctx, access, calendars))
}

fn matches_entry(
    entry: &ConditionEntry,
    ctx: &EvaluationContext<'_>,
    access: &dyn RecordAccess,
    calendars: &dyn CalendarAccess,
) -> bool {
    let predicate = &entry.predicate;

    // `<kind>.action` discriminates dispatch timing; it is evaluated against
    // transaction metadata, not record state.
    if is_action_path(&entry.attribute, ctx) {
        return matches_action(predicate, ctx);
    }

    if predicate.operator.is_working_time() {
        return matches_working_time(predicate, ctx, calendars);
    }

    match effective_value(predicate, ctx) {
        Effective::NotSet => {
            let attribute = resolve::resolve(&entry.attribute, ctx, access);
            match predicate.operator {
                Operator::Is => value::is_unset(attribute.as_ref()),
                Operator::IsNot => !value::is_unset(attribute.as_ref()),
                _ => false,
            }
        }
        Effective::Unresolvable => false,
        Effective::Value(expected) => {
            // Absent attributes never match, regardless of operator polarity.
            let Some(attribute) = resolve::resolve(&entry.attribute, ctx, access) else {
                return false;
            };
            apply_operator(predicate.operator, &attribute, &expected)
        }
    }
}

fn is_action_path(path: &str, ctx: &EvaluationContext<'_>) -> bool {
    path.split_once('.')
        .is_some_and(|(entity, attribute)| {
            entity == ctx.change.record.kind.as_str() && attribute == "action"
        })
}

fn matches_action(predicate: &PredicateSpec, ctx: &EvaluationContext<'_>) -> bool {
    let actual = Value::from(ctx.change.kind.as_str());
    match predicate.operator {
        Operator::Is => loose_match(&actual, &predicate.value),
        Operator::IsNot => !loose_match(&actual, &predicate.value),
        _ => false,
    }
}

fn matches_working_time(
    predicate: &PredicateSpec,
    ctx: &EvaluationContext<'_>,
    calendars: &dyn CalendarAccess,
) -> bool {
    let Some(calendar_id) = calendar_id_of(&predicate.value) else {
        tracing::debug!("Working-time predicate without a usable calendar id");
        return false;
    };
    // An unknown calendar fails the predicate for both polarities.
    let Some(inside) = calendars.is_working_time(calendar_id, ctx.now) else {
        tracing::debug!(calendar_id, "Unknown calendar in working-time predicate");
        return false;
    };
    match predicate.operator {
        Operator::IsInWorkingTime => inside,
        Operator::IsNotInWorkingTime => !inside,
        _ => false,
    }
}

fn calendar_id_of(value: &Value) -> Option<DbId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The comparison value after pre-condition substitution.
enum Effective {
    Value(Value),
    /// Match records where the attribute is absent/empty.
    NotSet,
    /// The pre-condition could not be computed (e.g. no acting user).
    Unresolvable,
}

fn effective_value(predicate: &PredicateSpec, ctx: &EvaluationContext<'_>) -> Effective {
    match predicate.pre_condition {
        Some(PreCondition::CurrentUserId) => match ctx.actor_id {
            Some(actor_id) => Effective::Value(Value::from(actor_id)),
            None => {
                tracing::debug!("current_user.id pre-condition without an acting user");
                Effective::Unresolvable
            }
        },
        Some(PreCondition::NotSet) => Effective::NotSet,
        Some(PreCondition::Specific) | None => Effective::Value(predicate.value.clone()),
    }
}

fn apply_operator(operator: Operator, attribute: &Value, expected: &Value) -> bool {
    match operator {
        Operator::Is => loose_match(attribute, expected),
        Operator::IsNot => !loose_match(attribute, expected),
        Operator::Contains => value::contains(attribute, expected),
        Operator::ContainsNot => !value::contains(attribute, expected),
        // Working-time operators are handled before operator dispatch.
        Operator::IsInWorkingTime | Operator::IsNotInWorkingTime => false,
    }
}

/// Equality, with a list-valued comparison value meaning "member of".
fn loose_match(attribute: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(candidates) => value::in_list(attribute, candidates),
        _ => value::loose_eq(attribute, expected),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use deskflow_core::calendar::{Calendar, InMemoryCalendars};
    use deskflow_core::record::{ChangeKind, Commit, InMemoryStore, RecordChange, RecordRef};
    use deskflow_core::types::Timestamp;
    use serde_json::json;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.insert(
            RecordRef::ticket(1),
            &[
                ("title", json!("Test Ticket")),
                ("state_id", json!(2)),
                ("owner_id", json!(7)),
                ("pending_time", Value::Null),
                ("tags", json!(["vip", "billing"])),
            ],
        );
        store
    }

    fn commit(kind: ChangeKind) -> Commit {
        let change = match kind {
            ChangeKind::Create => RecordChange::created(RecordRef::ticket(1)),
            ChangeKind::Update => RecordChange::updated(RecordRef::ticket(1)),
        };
        Commit::new().with_change(change)
    }

    fn condition(entries: Value) -> Condition {
        serde_json::from_value(entries).expect("condition should deserialize")
    }

    fn calendars() -> InMemoryCalendars {
        let mut calendars = InMemoryCalendars::new();
        calendars.insert(Calendar::standard_week(1, "office", 0));
        calendars
    }

    fn at(s: &str) -> Timestamp {
        s.parse().expect("valid timestamp")
    }

    fn eval(cond: &Condition, commit: &Commit, store: &InMemoryStore) -> bool {
        let ctx = EvaluationContext::for_change(commit, &commit.changes[0], commit.occurred_at);
        matches(cond, &ctx, store, &calendars())
    }

    #[test]
    fn empty_condition_always_matches() {
        let store = store();
        assert!(eval(&Condition::default(), &commit(ChangeKind::Create), &store));
        assert!(eval(&Condition::default(), &commit(ChangeKind::Update), &store));
    }

    #[test]
    fn action_discriminates_create_from_update() {
        let store = store();
        let cond = condition(json!([
            { "attribute": "ticket.action", "operator": "is", "value": "create" }
        ]));
        assert!(eval(&cond, &commit(ChangeKind::Create), &store));
        assert!(!eval(&cond, &commit(ChangeKind::Update), &store));

        let negated = condition(json!([
            { "attribute": "ticket.action", "operator": "is not", "value": "create" }
        ]));
        assert!(!eval(&negated, &commit(ChangeKind::Create), &store));
        assert!(eval(&negated, &commit(ChangeKind::Update), &store));
    }

    #[test]
    fn is_coerces_numeric_strings() {
        let store = store();
        let cond = condition(json!([
            { "attribute": "ticket.state_id", "operator": "is", "value": "2" }
        ]));
        assert!(eval(&cond, &commit(ChangeKind::Create), &store));
    }

    #[test]
    fn is_with_list_value_means_member_of() {
        let store = store();
        let cond = condition(json!([
            { "attribute": "ticket.state_id", "operator": "is", "value": [1, 2, 3] }
        ]));
        assert!(eval(&cond, &commit(ChangeKind::Create), &store));

        let cond = condition(json!([
            { "attribute": "ticket.state_id", "operator": "is", "value": [4, 5] }
        ]));
        assert!(!eval(&cond, &commit(ChangeKind::Create), &store));
    }

    #[test]
    fn absent_attribute_never_matches_either_polarity() {
        let store = store();
        let is = condition(json!([
            { "attribute": "ticket.missing", "operator": "is", "value": "x" }
        ]));
        let is_not = condition(json!([
            { "attribute": "ticket.missing", "operator": "is not", "value": "x" }
        ]));
        assert!(!eval(&is, &commit(ChangeKind::Create), &store));
        assert!(!eval(&is_not, &commit(ChangeKind::Create), &store));
    }

    #[test]
    fn contains_on_string_and_list_attributes() {
        let store = store();
        let substring = condition(json!([
            { "attribute": "ticket.title", "operator": "contains", "value": "Test" }
        ]));
        assert!(eval(&substring, &commit(ChangeKind::Create), &store));

        let membership = condition(json!([
            { "attribute": "ticket.tags", "operator": "contains", "value": "vip" }
        ]));
        assert!(eval(&membership, &commit(ChangeKind::Create), &store));

        let negated = condition(json!([
            { "attribute": "ticket.tags", "operator": "contains not", "value": "spam" }
        ]));
        assert!(eval(&negated, &commit(ChangeKind::Create), &store));
    }

    #[test]
    fn conjunction_requires_all_predicates() {
        let store = store();
        let cond = condition(json!([
            { "attribute": "ticket.state_id", "operator": "is", "value": 2 },
            { "attribute": "ticket.title", "operator": "is", "value": "Other" }
        ]));
        assert!(!eval(&cond, &commit(ChangeKind::Create), &store));
    }

    #[test]
    fn current_user_pre_condition_substitutes_actor() {
        let store = store();
        let cond = condition(json!([{
            "attribute": "ticket.owner_id",
            "operator": "is",
            "pre_condition": "current_user.id",
            "value": "",
            "value_completion": ""
        }]));

        let with_owner = commit(ChangeKind::Update).with_actor(7);
        assert!(eval(&cond, &with_owner, &store));

        let with_other = commit(ChangeKind::Update).with_actor(8);
        assert!(!eval(&cond, &with_other, &store));

        // No acting user: the pre-condition cannot be computed.
        assert!(!eval(&cond, &commit(ChangeKind::Update), &store));
    }

    #[test]
    fn not_set_pre_condition_matches_null_attributes() {
        let store = store();
        let cond = condition(json!([{
            "attribute": "ticket.pending_time",
            "operator": "is",
            "pre_condition": "not_set",
            "value": ""
        }]));
        assert!(eval(&cond, &commit(ChangeKind::Update), &store));

        let negated = condition(json!([{
            "attribute": "ticket.owner_id",
            "operator": "is not",
            "pre_condition": "not_set",
            "value": ""
        }]));
        assert!(eval(&negated, &commit(ChangeKind::Update), &store));
    }

    #[test]
    fn working_time_predicate_honors_the_calendar() {
        let store = store();
        let commit = commit(ChangeKind::Update);
        let cond = condition(json!([{
            "attribute": "execution_time.calendar_id",
            "operator": "is in working time",
            "value": 1
        }]));

        let inside = EvaluationContext::for_change(
            &commit,
            &commit.changes[0],
            at("2020-02-12T12:00:00Z"),
        );
        let outside = EvaluationContext::for_change(
            &commit,
            &commit.changes[0],
            at("2020-02-12T02:00:00Z"),
        );
        assert!(matches(&cond, &inside, &store, &calendars()));
        assert!(!matches(&cond, &outside, &store, &calendars()));

        let negated = condition(json!([{
            "attribute": "execution_time.calendar_id",
            "operator": "is not in working time",
            "value": 1
        }]));
        assert!(!matches(&negated, &inside, &store, &calendars()));
        assert!(matches(&negated, &outside, &store, &calendars()));
    }

    #[test]
    fn unknown_calendar_fails_both_polarities() {
        let store = store();
        let commit = commit(ChangeKind::Update);
        let ctx = EvaluationContext::for_change(
            &commit,
            &commit.changes[0],
            at("2020-02-12T12:00:00Z"),
        );
        for operator in ["is in working time", "is not in working time"] {
            let cond = condition(json!([{
                "attribute": "execution_time.calendar_id",
                "operator": operator,
                "value": 99
            }]));
            assert!(!matches(&cond, &ctx, &store, &calendars()));
        }
    }
}
