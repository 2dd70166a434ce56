//! Trigger dispatch worker.
//!
//! [`TriggerWorker`] consumes the commit bus in a single task, dispatching
//! each commit to completion before taking the next. That ordering is a
//! correctness requirement, not an optimisation: rules within one commit
//! must observe each other's writes in declaration order, and no two
//! commits' evaluations may interleave for the same record. Outbound
//! delivery is fire-and-forget relative to the triggering commit.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use deskflow_core::error::EngineError;
use deskflow_core::record::Commit;
use deskflow_engine::dispatch::DispatchOutcome;

use crate::delivery::OutboundMailer;

/// Per-commit dispatch hook the worker drives.
///
/// Implemented by the host over its record store and rule set; a closure
/// `FnMut(&Commit) -> Result<DispatchOutcome, EngineError>` works too.
pub trait CommitProcessor: Send {
    fn process(&mut self, commit: &Commit) -> Result<DispatchOutcome, EngineError>;
}

impl<F> CommitProcessor for F
where
    F: FnMut(&Commit) -> Result<DispatchOutcome, EngineError> + Send,
{
    fn process(&mut self, commit: &Commit) -> Result<DispatchOutcome, EngineError> {
        self(commit)
    }
}

/// Background service that runs trigger dispatch for every published commit.
pub struct TriggerWorker<P> {
    processor: P,
    mailer: Option<Arc<dyn OutboundMailer>>,
}

impl<P: CommitProcessor> TriggerWorker<P> {
    /// Create a worker without outbound delivery (dispatch side effects
    /// still apply through the processor).
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            mailer: None,
        }
    }

    /// Attach an outbound mailer for the messages each dispatch produces.
    pub fn with_mailer(mut self, mailer: Arc<dyn OutboundMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Run the dispatch loop.
    ///
    /// Exits gracefully when the provided [`CancellationToken`] is cancelled
    /// or the bus is closed.
    pub async fn run(mut self, mut receiver: broadcast::Receiver<Commit>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Trigger worker cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(commit) => self.handle(&commit).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            skipped = n,
                            "Trigger worker lagged, some commits were not dispatched"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Commit bus closed, trigger worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, commit: &Commit) {
        let outcome = match self.processor.process(commit) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(commit_id = %commit.id, error = %e, "Dispatch aborted");
                return;
            }
        };
        tracing::debug!(
            commit_id = %commit.id,
            evaluated = outcome.evaluated,
            firings = outcome.firings.len(),
            "Commit dispatched"
        );

        let Some(mailer) = &self.mailer else {
            return;
        };
        for message in outcome.into_outbound() {
            // Retries on transient failure are the transport collaborator's
            // concern; the dedup key keeps a retry from double-firing.
            if let Err(e) = mailer.send(&message).await {
                tracing::error!(
                    dedup_key = %message.dedup_key,
                    error = %e,
                    "Outbound delivery failed"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CommitBus;
    use crate::delivery::{DeliveryError, DeliveryReceipt};
    use async_trait::async_trait;
    use deskflow_core::calendar::InMemoryCalendars;
    use deskflow_core::directory::InMemoryDirectory;
    use deskflow_core::message::OutboundMessage;
    use deskflow_core::record::{InMemoryStore, RecordAccess, RecordChange, RecordRef};
    use deskflow_core::rule::Rule;
    use deskflow_engine::dispatch::{dispatch, EngineServices};
    use deskflow_engine::security::SecurityRegistry;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mailer that records every message it is handed.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl OutboundMailer for RecordingMailer {
        async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
            self.sent.lock().expect("mailer mutex").push(message.clone());
            Ok(DeliveryReceipt {
                dedup_key: message.dedup_key.clone(),
                recipient_count: message.to.len(),
                duplicate: false,
            })
        }
    }

    fn fixture_store() -> Arc<Mutex<InMemoryStore>> {
        let mut store = InMemoryStore::new();
        store.insert(
            RecordRef::ticket(1),
            &[("title", json!("Test Ticket")), ("customer_id", json!(2))],
        );
        Arc::new(Mutex::new(store))
    }

    fn rules() -> Vec<Rule> {
        vec![serde_json::from_value(json!({
            "id": 1,
            "name": "notify customer",
            "condition": [
                { "attribute": "ticket.action", "operator": "is", "value": "create" }
            ],
            "perform": [
                { "target": "ticket.title", "value": "triggered" },
                {
                    "target": "notification.email",
                    "recipient": "ticket_customer",
                    "subject": "Hello",
                    "body": "World!"
                }
            ],
        }))
        .expect("rule should deserialize")]
    }

    fn processor(
        store: Arc<Mutex<InMemoryStore>>,
        rules: Vec<Rule>,
    ) -> impl CommitProcessor {
        move |commit: &Commit| {
            let mut store = store.lock().expect("store mutex");
            let mut directory = InMemoryDirectory::new();
            directory.add_user(2, "customer@example.com");
            let calendars = InMemoryCalendars::new();
            let security = SecurityRegistry::new();
            let services = EngineServices {
                directory: &directory,
                calendars: &calendars,
                security: &security,
            };
            dispatch(commit, &rules, &mut *store, &services, commit.occurred_at)
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn dispatches_published_commits_and_delivers_outbound() {
        let store = fixture_store();
        let mailer = Arc::new(RecordingMailer::default());
        let bus = CommitBus::default();
        let cancel = CancellationToken::new();

        let worker = TriggerWorker::new(processor(store.clone(), rules()))
            .with_mailer(mailer.clone());
        let handle = tokio::spawn(worker.run(bus.subscribe(), cancel.clone()));

        bus.publish(Commit::new().with_change(RecordChange::created(RecordRef::ticket(1))));

        wait_until(|| !mailer.sent.lock().expect("mailer mutex").is_empty()).await;
        cancel.cancel();
        handle.await.expect("worker task should join");

        let sent = mailer.sent.lock().expect("mailer mutex");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["customer@example.com"]);
        assert_eq!(sent[0].subject, "Hello");

        let store = store.lock().expect("store mutex");
        assert_eq!(
            store.get_attribute(&RecordRef::ticket(1), "title"),
            Some(json!("triggered"))
        );
    }

    #[tokio::test]
    async fn commits_are_dispatched_in_publication_order() {
        let store = fixture_store();
        {
            let mut store = store.lock().expect("store mutex");
            store.insert(
                RecordRef::ticket(2),
                &[("title", json!("Second")), ("customer_id", json!(2))],
            );
        }
        let bus = CommitBus::default();
        let cancel = CancellationToken::new();

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let worker = TriggerWorker::new(move |commit: &Commit| {
            seen.lock().expect("order mutex").push(commit.changes[0].record.id);
            Ok(deskflow_engine::dispatch::DispatchOutcome::default())
        });
        let handle = tokio::spawn(worker.run(bus.subscribe(), cancel.clone()));

        bus.publish(Commit::new().with_change(RecordChange::created(RecordRef::ticket(1))));
        bus.publish(Commit::new().with_change(RecordChange::updated(RecordRef::ticket(2))));

        wait_until(|| order.lock().expect("order mutex").len() == 2).await;
        cancel.cancel();
        handle.await.expect("worker task should join");

        assert_eq!(*order.lock().expect("order mutex"), vec![1, 2]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let bus = CommitBus::default();
        let cancel = CancellationToken::new();
        let worker = TriggerWorker::new(|_: &Commit| {
            Ok(deskflow_engine::dispatch::DispatchOutcome::default())
        });
        let handle = tokio::spawn(worker.run(bus.subscribe(), cancel.clone()));

        cancel.cancel();
        handle.await.expect("worker task should join");
    }

    #[tokio::test]
    async fn aborted_dispatch_does_not_kill_the_loop() {
        let bus = CommitBus::default();
        let cancel = CancellationToken::new();

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let worker = TriggerWorker::new(move |commit: &Commit| {
            let id = commit.changes[0].record.id;
            seen.lock().expect("order mutex").push(id);
            if id == 1 {
                Err(deskflow_core::error::EngineError::Internal(
                    "malformed rule".to_string(),
                ))
            } else {
                Ok(deskflow_engine::dispatch::DispatchOutcome::default())
            }
        });
        let handle = tokio::spawn(worker.run(bus.subscribe(), cancel.clone()));

        bus.publish(Commit::new().with_change(RecordChange::created(RecordRef::ticket(1))));
        bus.publish(Commit::new().with_change(RecordChange::created(RecordRef::ticket(2))));

        wait_until(|| order.lock().expect("order mutex").len() == 2).await;
        cancel.cancel();
        handle.await.expect("worker task should join");
    }
}
