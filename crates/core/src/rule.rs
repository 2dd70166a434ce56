//! The Rule data model: condition and perform specifications.
//!
//! Rules ("triggers"/"macros") are admin-authored JSON documents. Conditions
//! and performs keep their declaration order, and both parse into typed
//! variants; anything the engine does not understand lands in an explicit
//! unsupported variant that fails [`Rule::validate`] instead of silently
//! matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Comparison operator of a single condition predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is not")]
    IsNot,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "contains not")]
    ContainsNot,
    #[serde(rename = "is in working time")]
    IsInWorkingTime,
    #[serde(rename = "is not in working time")]
    IsNotInWorkingTime,
}

impl Operator {
    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::Contains => "contains",
            Self::ContainsNot => "contains not",
            Self::IsInWorkingTime => "is in working time",
            Self::IsNotInWorkingTime => "is not in working time",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "is" => Ok(Self::Is),
            "is not" => Ok(Self::IsNot),
            "contains" => Ok(Self::Contains),
            "contains not" => Ok(Self::ContainsNot),
            "is in working time" => Ok(Self::IsInWorkingTime),
            "is not in working time" => Ok(Self::IsNotInWorkingTime),
            _ => Err(EngineError::Validation(format!(
                "Invalid condition operator: '{s}'"
            ))),
        }
    }

    /// Whether this operator delegates to the working-time calendar.
    pub fn is_working_time(&self) -> bool {
        matches!(self, Self::IsInWorkingTime | Self::IsNotInWorkingTime)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PreCondition
// ---------------------------------------------------------------------------

/// Evaluation-time substitution applied before the operator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreCondition {
    /// Compare against the acting user's id instead of the stored value.
    #[serde(rename = "current_user.id")]
    CurrentUserId,
    /// Match records where the attribute is absent, null, or empty.
    #[serde(rename = "not_set")]
    NotSet,
    /// Use the stored comparison value (the implicit default).
    #[serde(rename = "specific")]
    Specific,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One condition entry: an attribute path plus its predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEntry {
    /// Dot-separated attribute path, e.g. `"ticket.state_id"`.
    pub attribute: String,
    #[serde(flatten)]
    pub predicate: PredicateSpec,
}

/// One predicate: operator, comparison value, optional pre-condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_condition: Option<PreCondition>,
    /// Admin-form autocomplete artifact; carried through round-trips but
    /// ignored at evaluation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_completion: Option<String>,
}

/// Ordered conjunction of predicates. An empty condition always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition(pub Vec<ConditionEntry>);

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConditionEntry> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Perform actions
// ---------------------------------------------------------------------------

/// Recipient specification of a notification action.
///
/// A bare string keeps scalar arity for callers expecting one recipient; a
/// list mixes group keywords (`ticket_customer`) and `userid_<id>` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipientSpec {
    One(String),
    Many(Vec<String>),
}

impl RecipientSpec {
    /// All entries in declaration order.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(list) => list.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the spec names no usable recipient at all.
    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|e| e.trim().is_empty())
    }
}

/// Signing/encryption policy of a notification action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityPolicy {
    /// Attempt the operation; record a failure marker if it cannot be done.
    Always,
    /// Do not attempt the operation.
    #[default]
    No,
    /// Suppress the whole action when the operation cannot be done.
    Discard,
}

/// An outbound notification synthesized from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub recipient: RecipientSpec,
    pub subject: String,
    pub body: String,
    /// Marks the produced article as internal (not customer-visible).
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub sign: SecurityPolicy,
    #[serde(default)]
    pub encryption: SecurityPolicy,
}

/// Unit for relative time computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Add `amount` units of this range to `instant`.
    ///
    /// Months are calendar months, not a fixed number of days.
    pub fn add_to(&self, instant: Timestamp, amount: i64) -> Timestamp {
        match self {
            Self::Minute => instant + chrono::Duration::minutes(amount),
            Self::Hour => instant + chrono::Duration::hours(amount),
            Self::Day => instant + chrono::Duration::days(amount),
            Self::Week => instant + chrono::Duration::weeks(amount),
            Self::Month => instant + chrono::Months::new(amount.max(0) as u32),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled-time action value (e.g. `ticket.pending_time`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum PendingTime {
    /// Use the stored instant literally.
    Static { value: Timestamp },
    /// Compute `now + value <range>` at execution time.
    Relative { value: Value, range: TimeRange },
}

impl PendingTime {
    /// The relative amount as a positive integer, if well-formed.
    ///
    /// Admin forms post the amount as a string, so both `10` and `"10"` are
    /// accepted.
    pub fn relative_amount(&self) -> Option<i64> {
        let value = match self {
            Self::Relative { value, .. } => value,
            Self::Static { .. } => return None,
        };
        let amount = match value {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (amount > 0).then_some(amount)
    }
}

/// A direct attribute assignment.
///
/// Unknown sibling keys are rejected here so that a malformed scheduled-time
/// or notification spec falls through to [`ActionSpec::Unsupported`] instead
/// of being misread as a plain write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeUpdate {
    pub value: Value,
}

/// One perform action, discriminated by shape.
///
/// Deserialization is untagged: a spec with a `recipient` is a notification,
/// one with an `operator` is a scheduled time, one with only a `value` is a
/// plain attribute write, and anything else is [`ActionSpec::Unsupported`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    EmailNotification(EmailNotification),
    PendingTime(PendingTime),
    Attribute(AttributeUpdate),
    Unsupported(Value),
}

/// One perform entry: the target path plus its action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformEntry {
    /// Target path, e.g. `"ticket.title"` or `"notification.email"`.
    pub target: String,
    #[serde(flatten)]
    pub action: ActionSpec,
}

/// Ordered list of perform actions. Later actions may depend on earlier
/// attribute writes, so declaration order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perform(pub Vec<PerformEntry>);

impl Perform {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PerformEntry> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A stored condition/perform pair, read-only at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub perform: Perform,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Dispatch order; lower fires first, ties broken by id.
    #[serde(default)]
    pub priority: i32,
    /// Optional group scoping; `None` applies to all groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<DbId>,
}

fn default_active() -> bool {
    true
}

impl Rule {
    /// Validate the rule before persistence.
    ///
    /// Rejects unsupported predicate/action kinds, notification actions with
    /// no resolvable recipient, and malformed relative-time values. Rules
    /// failing here must never reach the dispatcher.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "Rule name must not be empty".to_string(),
            ));
        }

        for entry in self.condition.iter() {
            validate_condition_entry(entry)?;
        }

        if self.perform.is_empty() {
            return Err(EngineError::Validation(format!(
                "Rule '{}' has no perform action",
                self.name
            )));
        }
        for entry in self.perform.iter() {
            validate_perform_entry(entry)?;
        }
        Ok(())
    }
}

fn validate_condition_entry(entry: &ConditionEntry) -> Result<(), EngineError> {
    if entry.attribute.trim().is_empty() {
        return Err(EngineError::Validation(
            "Condition attribute must not be empty".to_string(),
        ));
    }
    if entry.attribute.split_once('.').is_none() {
        return Err(EngineError::Validation(format!(
            "Condition attribute '{}' must be an <entity>.<attribute> path",
            entry.attribute
        )));
    }
    Ok(())
}

fn validate_perform_entry(entry: &PerformEntry) -> Result<(), EngineError> {
    let target = entry.target.as_str();
    if target.split_once('.').is_none() {
        return Err(EngineError::Validation(format!(
            "Perform target '{target}' must be an <entity>.<attribute> path"
        )));
    }

    let is_notification = target.starts_with("notification.");
    match &entry.action {
        ActionSpec::EmailNotification(notification) => {
            if !is_notification {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, notification spec on a non-notification target"
                )));
            }
            if notification.recipient.is_empty() {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, recipient is missing!"
                )));
            }
        }
        ActionSpec::PendingTime(pending) => {
            if is_notification {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, scheduled time on a notification target"
                )));
            }
            if matches!(pending, PendingTime::Relative { .. }) && pending.relative_amount().is_none()
            {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, relative value must be a positive integer"
                )));
            }
        }
        ActionSpec::Attribute(_) => {
            if is_notification {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, recipient is missing!"
                )));
            }
        }
        ActionSpec::Unsupported(raw) => {
            // A notification spec that lost its recipient parses as
            // unsupported; keep the admin-facing message specific.
            if is_notification && raw.get("recipient").is_none() {
                return Err(EngineError::Validation(format!(
                    "Invalid perform {target}, recipient is missing!"
                )));
            }
            return Err(EngineError::Validation(format!(
                "Unknown perform action '{target}'"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
