//! Inbound message dispatch for a hub agent
//!
//! Envelopes are decoded and routed to the from/to handlers. Payloads that can
//! never be processed are dead-lettered at once; handler failures are retried
//! with backoff and dead-lettered when the schedule runs out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleethub_common::retry::{retry_with_backoff, RetryConfig};
use fleethub_common::Error;
use fleethub_transport::{MessageEnvelope, MessageType, MigrationFromEvent, MigrationToEvent};

use crate::from_syncer::FromSyncer;
use crate::to_syncer::ToSyncer;

/// Default dead-letter capacity
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 100;

/// A message that was given up on
#[derive(Clone, Debug)]
pub struct DeadLetter {
    /// The envelope as received
    pub envelope: MessageEnvelope,
    /// Why it was given up on
    pub reason: String,
    /// When it was given up on
    pub at: DateTime<Utc>,
}

/// Bounded dead-letter queue; the oldest entry is evicted when full
pub struct DeadLetterQueue {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl DeadLetterQueue {
    /// Create a queue holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record a dead letter
    pub fn push(&self, envelope: MessageEnvelope, reason: impl Into<String>) {
        let letter = DeadLetter {
            envelope,
            reason: reason.into(),
            at: Utc::now(),
        };
        let Ok(mut entries) = self.entries.lock() else {
            error!(reason = %letter.reason, "Dead-letter queue lock poisoned, dropping message");
            return;
        };
        if self.capacity == 0 {
            return;
        }
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(letter);
    }

    /// Snapshot, oldest first
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of dead letters held
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True if nothing has been dead-lettered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

/// Result of handling one envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handler succeeded
    Handled,
    /// Addressed to another hub
    Dropped,
    /// Given up on
    DeadLettered,
}

enum Decoded {
    From(MigrationFromEvent),
    To(MigrationToEvent),
}

fn decode(envelope: &MessageEnvelope) -> Result<Decoded, Error> {
    match envelope.message_type() {
        Some(MessageType::MigrationFrom) => envelope.decode_payload().map(Decoded::From),
        Some(MessageType::MigrationTo) => envelope.decode_payload().map(Decoded::To),
        None => Err(Error::serialization_for_kind(
            envelope.type_.clone(),
            "unknown message type",
        )),
    }
}

/// Routes envelopes addressed to one hub
pub struct Dispatcher {
    hub: String,
    from: FromSyncer,
    to: ToSyncer,
    retry: RetryConfig,
    dead_letters: Arc<DeadLetterQueue>,
}

impl Dispatcher {
    /// Create a dispatcher for `hub`
    pub fn new(hub: impl Into<String>, from: FromSyncer, to: ToSyncer) -> Self {
        Self {
            hub: hub.into(),
            from,
            to,
            retry: RetryConfig::redelivery(),
            dead_letters: Arc::new(DeadLetterQueue::default()),
        }
    }

    /// Override the redelivery schedule
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the dead-letter queue
    pub fn with_dead_letters(mut self, dead_letters: Arc<DeadLetterQueue>) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    /// Dead letters recorded so far
    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    /// Handle one envelope
    pub async fn dispatch(&self, envelope: MessageEnvelope) -> Delivery {
        if envelope.destination != self.hub {
            warn!(
                destination = %envelope.destination,
                hub = %self.hub,
                message_type = %envelope.type_,
                "Dropping message addressed to another hub"
            );
            return Delivery::Dropped;
        }

        let decoded = match decode(&envelope) {
            Ok(d) => d,
            Err(e) => {
                error!(message_type = %envelope.type_, source = %envelope.source, error = %e, "Poison message");
                self.dead_letters.push(envelope, e.to_string());
                return Delivery::DeadLettered;
            }
        };

        let decoded = &decoded;
        let result = retry_with_backoff(&self.retry, envelope.type_.as_str(), || async move {
            match decoded {
                Decoded::From(event) => self.from.handle(event).await,
                Decoded::To(event) => self.to.handle(event).await,
            }
        })
        .await;

        match result {
            Ok(()) => {
                debug!(message_type = %envelope.type_, source = %envelope.source, "Handled message");
                Delivery::Handled
            }
            Err(e) => {
                error!(message_type = %envelope.type_, error = %e, "Giving up on message");
                self.dead_letters.push(envelope, e.to_string());
                Delivery::DeadLettered
            }
        }
    }

    /// Drain `rx` until it closes or `token` is cancelled
    pub async fn run(self, mut rx: mpsc::Receiver<MessageEnvelope>, token: CancellationToken) {
        info!(hub = %self.hub, "Dispatcher started");
        loop {
            let envelope = tokio::select! {
                _ = token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(e) => e,
                    None => break,
                },
            };
            self.dispatch(envelope).await;
        }
        info!(hub = %self.hub, "Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use fleethub_common::crd::{ConditionStatus, KlusterletConfig};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use serde_json::json;

    use crate::client::{HubClient, MockHubClient};
    use crate::cutover::{CutoverConfig, CutoverScheduler};
    use crate::testing::FakeHub;

    fn dispatcher(client: Arc<dyn HubClient>) -> Dispatcher {
        let cutover = Arc::new(CutoverScheduler::new(
            client.clone(),
            CutoverConfig::default(),
            CancellationToken::new(),
        ));
        Dispatcher::new("hub-a", FromSyncer::new(client.clone(), cutover), ToSyncer::new(client))
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 1.0,
            })
    }

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("multicluster-engine".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("kubeconfig".to_string(), ByteString(b"k".to_vec()))])),
            ..Default::default()
        }
    }

    fn from_envelope(destination: &str) -> MessageEnvelope {
        let event = MigrationFromEvent {
            bootstrap_secret: secret("bootstrap-hub-b"),
            original_bootstrap_secret: secret("bootstrap-hub-a"),
            routing_policy: KlusterletConfig::routing_policy("hub-b", &["bootstrap-hub-b", "bootstrap-hub-a"]),
            managed_clusters: vec!["c1".to_string()],
        };
        MessageEnvelope::new(MessageType::MigrationFrom, "mgr", destination, &event).unwrap()
    }

    fn raw(type_: &str, payload: serde_json::Value) -> MessageEnvelope {
        MessageEnvelope {
            type_: type_.to_string(),
            source: "mgr".to_string(),
            destination: "hub-a".to_string(),
            payload,
        }
    }

    /// Story: a migration.from for this hub runs the source-hub handler
    #[tokio::test(start_paused = true)]
    async fn story_from_message_is_handled() {
        let hub = Arc::new(FakeHub::new().with_cluster("c1", ConditionStatus::True));
        let d = dispatcher(hub.clone());

        assert_eq!(d.dispatch(from_envelope("hub-a")).await, Delivery::Handled);
        assert!(hub.cluster("c1").unwrap().is_pinned_to("migration-hub-b"));
        assert!(d.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_message_for_another_hub_is_dropped() {
        let mut client = MockHubClient::new();
        client.expect_get_secret().never();
        let d = dispatcher(Arc::new(client));

        assert_eq!(d.dispatch(from_envelope("hub-z")).await, Delivery::Dropped);
        assert!(d.dead_letters().is_empty());
    }

    /// Story: a payload missing a required field can never succeed, so it is
    /// dead-lettered without touching the hub
    #[tokio::test]
    async fn story_malformed_payload_is_dead_lettered_immediately() {
        let mut client = MockHubClient::new();
        client.expect_get_secret().never();
        client.expect_apply_cluster_role().never();
        let d = dispatcher(Arc::new(client));

        let delivery = d
            .dispatch(raw("migration.to", json!({"serviceAccountName": "m1"})))
            .await;

        assert_eq!(delivery, Delivery::DeadLettered);
        let letters = d.dead_letters().entries();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].envelope.type_, "migration.to");
    }

    #[tokio::test]
    async fn test_unknown_type_is_dead_lettered() {
        let d = dispatcher(Arc::new(MockHubClient::new()));
        assert_eq!(d.dispatch(raw("migration.sideways", json!({}))).await, Delivery::DeadLettered);
        assert!(d.dead_letters().entries()[0].reason.contains("unknown message type"));
    }

    /// Story: the hub API keeps failing; the handler is retried on the
    /// redelivery schedule and then dead-lettered
    #[tokio::test(start_paused = true)]
    async fn story_handler_failure_is_retried_then_dead_lettered() {
        let mut client = MockHubClient::new();
        client
            .expect_apply_cluster_role()
            .times(3)
            .returning(|_| Err(Error::internal("apiserver unavailable")));
        let d = dispatcher(Arc::new(client));

        let envelope = MessageEnvelope::new(
            MessageType::MigrationTo,
            "mgr",
            "hub-a",
            &MigrationToEvent {
                service_account_name: "m1".to_string(),
                service_account_install_namespace: "ns".to_string(),
            },
        )
        .unwrap();

        assert_eq!(d.dispatch(envelope).await, Delivery::DeadLettered);
        assert!(d.dead_letters().entries()[0].reason.contains("apiserver unavailable"));
    }

    #[test]
    fn test_dead_letter_queue_evicts_oldest() {
        let q = DeadLetterQueue::new(2);
        for i in 0..3 {
            q.push(raw(&format!("t{i}"), json!({})), "bad");
        }
        let types: Vec<_> = q.entries().into_iter().map(|l| l.envelope.type_).collect();
        assert_eq!(types, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let d = dispatcher(Arc::new(MockHubClient::new()));
        let (tx, rx) = mpsc::channel(4);
        tx.send(raw("bogus", json!({}))).await.unwrap();
        drop(tx);

        let dead_letters = d.dead_letters().clone();
        d.run(rx, CancellationToken::new()).await;
        assert_eq!(dead_letters.len(), 1);
    }
}
