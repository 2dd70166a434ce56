//! Record graph: references, change snapshots, commits, and record access.
//!
//! The engine does not own persistence. It sees records through the
//! [`RecordAccess`] trait and learns about changes through [`Commit`]
//! snapshots pushed by the host after a unit of work completes. The
//! [`InMemoryStore`] implementation backs the test suites and small
//! embeddings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::message::SecurityResult;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// ObjectKind / RecordRef
// ---------------------------------------------------------------------------

/// The entity kinds the engine can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Ticket,
    Article,
    User,
}

impl ObjectKind {
    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Article => "article",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: ObjectKind,
    pub id: DbId,
}

impl RecordRef {
    pub fn ticket(id: DbId) -> Self {
        Self {
            kind: ObjectKind::Ticket,
            id,
        }
    }

    pub fn article(id: DbId) -> Self {
        Self {
            kind: ObjectKind::Article,
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// Change snapshots
// ---------------------------------------------------------------------------

/// Whether a record saw its first-ever commit or a subsequent one. The two
/// are mutually exclusive over a record's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after values of one attribute within a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub before: Value,
    pub after: Value,
}

/// The per-record diff of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub record: RecordRef,
    pub kind: ChangeKind,
    /// Attributes touched in this transaction, keyed by attribute name.
    #[serde(default)]
    pub changed: BTreeMap<String, AttributeChange>,
}

impl RecordChange {
    pub fn created(record: RecordRef) -> Self {
        Self {
            record,
            kind: ChangeKind::Create,
            changed: BTreeMap::new(),
        }
    }

    pub fn updated(record: RecordRef) -> Self {
        Self {
            record,
            kind: ChangeKind::Update,
            changed: BTreeMap::new(),
        }
    }

    /// Record an attribute diff on this change.
    pub fn with_change(mut self, attribute: impl Into<String>, before: Value, after: Value) -> Self {
        self.changed
            .insert(attribute.into(), AttributeChange { before, after });
        self
    }

    /// The diff entry for `attribute`, if it changed in this transaction.
    pub fn changed_attribute(&self, attribute: &str) -> Option<&AttributeChange> {
        self.changed.get(attribute)
    }
}

/// One logical unit-of-work boundary: a batch of record changes evaluated
/// together against the rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: Uuid,
    pub occurred_at: Timestamp,
    /// The acting user, if the change was user-initiated.
    pub actor_id: Option<DbId>,
    pub changes: Vec<RecordChange>,
}

impl Commit {
    /// Create an empty commit stamped with a fresh id and the current time.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: chrono::Utc::now(),
            actor_id: None,
            changes: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: DbId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_change(mut self, change: RecordChange) -> Self {
        self.changes.push(change);
        self
    }
}

impl Default for Commit {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RecordAccess
// ---------------------------------------------------------------------------

/// A notification artifact to be attached to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub from: String,
    /// Comma-joined recipient list.
    pub to: String,
    pub subject: String,
    pub body: String,
    pub internal: bool,
    pub security: SecurityResult,
    /// Stable key of the firing that produced this article.
    pub dedup_key: String,
}

/// Record attribute access, provided by the host's persistence layer.
///
/// Lookups return `None` for unknown records or attributes; predicates treat
/// that as "never matches" rather than an error. Writes validate the target
/// attribute exists before assignment.
pub trait RecordAccess {
    fn get_attribute(&self, record: &RecordRef, attribute: &str) -> Option<Value>;

    fn set_attribute(
        &mut self,
        record: &RecordRef,
        attribute: &str,
        value: Value,
    ) -> Result<(), EngineError>;

    /// The most recent article on a ticket, if any.
    fn last_article(&self, ticket: &RecordRef) -> Option<RecordRef>;

    /// Attach a new article to a ticket, returning its reference.
    fn create_article(
        &mut self,
        ticket: &RecordRef,
        draft: ArticleDraft,
    ) -> Result<RecordRef, EngineError>;

    /// An already-created article carrying the given dedup key, if any.
    fn article_with_dedup_key(&self, ticket: &RecordRef, dedup_key: &str) -> Option<RecordRef>;
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// In-memory record store used by the test suites and small embeddings.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: HashMap<(ObjectKind, DbId), BTreeMap<String, Value>>,
    ticket_articles: HashMap<DbId, Vec<DbId>>,
    next_article_id: DbId,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_article_id: 1,
            ..Self::default()
        }
    }

    /// Insert or replace a record with the given attributes.
    pub fn insert(&mut self, record: RecordRef, attributes: &[(&str, Value)]) {
        let map = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.objects.insert((record.kind, record.id), map);

        if record.kind == ObjectKind::Article {
            self.next_article_id = self.next_article_id.max(record.id + 1);
            if let Some(ticket_id) = self
                .objects
                .get(&(record.kind, record.id))
                .and_then(|attrs| attrs.get("ticket_id"))
                .and_then(Value::as_i64)
            {
                let articles = self.ticket_articles.entry(ticket_id).or_default();
                if !articles.contains(&record.id) {
                    articles.push(record.id);
                }
            }
        }
    }

    /// Article ids attached to a ticket, oldest first.
    pub fn articles(&self, ticket_id: DbId) -> &[DbId] {
        self.ticket_articles
            .get(&ticket_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl RecordAccess for InMemoryStore {
    fn get_attribute(&self, record: &RecordRef, attribute: &str) -> Option<Value> {
        self.objects
            .get(&(record.kind, record.id))?
            .get(attribute)
            .cloned()
    }

    fn set_attribute(
        &mut self,
        record: &RecordRef,
        attribute: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let attrs = self
            .objects
            .get_mut(&(record.kind, record.id))
            .ok_or_else(|| {
                EngineError::execution(
                    format!("{}.{attribute}", record.kind),
                    format!("unknown record {} {}", record.kind, record.id),
                )
            })?;
        // Writes may only touch attributes the record already carries; a
        // typo'd target is an execution failure, not a silent insert.
        let slot = attrs.get_mut(attribute).ok_or_else(|| {
            EngineError::execution(
                format!("{}.{attribute}", record.kind),
                format!("unknown attribute '{attribute}'"),
            )
        })?;
        *slot = value;
        Ok(())
    }

    fn last_article(&self, ticket: &RecordRef) -> Option<RecordRef> {
        self.ticket_articles
            .get(&ticket.id)?
            .last()
            .map(|id| RecordRef::article(*id))
    }

    fn create_article(
        &mut self,
        ticket: &RecordRef,
        draft: ArticleDraft,
    ) -> Result<RecordRef, EngineError> {
        if !self.objects.contains_key(&(ObjectKind::Ticket, ticket.id)) {
            return Err(EngineError::execution(
                "article",
                format!("unknown ticket {}", ticket.id),
            ));
        }
        let id = self.next_article_id;
        self.next_article_id += 1;

        let security = serde_json::to_value(&draft.security)
            .map_err(|e| EngineError::Internal(format!("security markers: {e}")))?;
        let attrs = [
            ("ticket_id", Value::from(ticket.id)),
            ("from", Value::from(draft.from)),
            ("to", Value::from(draft.to)),
            ("subject", Value::from(draft.subject)),
            ("body", Value::from(draft.body)),
            ("internal", Value::from(draft.internal)),
            ("type", Value::from("email")),
            ("sender", Value::from("System")),
            ("security", security),
            ("dedup_key", Value::from(draft.dedup_key)),
        ];
        self.insert(RecordRef::article(id), &attrs);
        Ok(RecordRef::article(id))
    }

    fn article_with_dedup_key(&self, ticket: &RecordRef, dedup_key: &str) -> Option<RecordRef> {
        self.ticket_articles.get(&ticket.id)?.iter().find_map(|id| {
            let article = RecordRef::article(*id);
            let key = self.get_attribute(&article, "dedup_key")?;
            (key.as_str() == Some(dedup_key)).then_some(article)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
