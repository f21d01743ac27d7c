//! Message producers
//!
//! The manager only needs "send this envelope to that hub". In-process
//! deployments and tests route over tokio channels; multi-process
//! deployments push over HTTP (see [`crate::http`]).

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::MessageEnvelope;
use crate::error::TransportError;

/// Default per-hub queue depth for in-process channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Sends envelopes to their destination hub
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Deliver `envelope` to `envelope.destination`
    async fn send(&self, envelope: &MessageEnvelope) -> Result<(), TransportError>;
}

/// In-process transport keyed by hub name
pub struct InMemoryTransport {
    hubs: DashMap<String, mpsc::Sender<MessageEnvelope>>,
    capacity: usize,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl InMemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty transport with a custom per-hub queue depth
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Register a hub, returning the receiver its agent consumes
    ///
    /// Registering a hub again replaces the previous channel.
    pub fn register(&self, hub: &str) -> mpsc::Receiver<MessageEnvelope> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.hubs.insert(hub.to_string(), tx).is_some() {
            debug!(hub = %hub, "Replaced existing hub channel");
        }
        rx
    }

    /// Remove a hub's channel
    pub fn unregister(&self, hub: &str) {
        self.hubs.remove(hub);
    }

    /// Number of registered hubs
    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    /// True if no hubs are registered
    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}

#[async_trait]
impl MessageProducer for InMemoryTransport {
    async fn send(&self, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        // Clone the sender out so the map shard is not held across the await
        let tx = self
            .hubs
            .get(&envelope.destination)
            .map(|r| r.value().clone())
            .ok_or_else(|| TransportError::UnknownDestination(envelope.destination.clone()))?;

        tx.send(envelope.clone()).await.map_err(|_| {
            warn!(hub = %envelope.destination, "Hub channel closed");
            TransportError::ChannelClosed(envelope.destination.clone())
        })?;

        debug!(hub = %envelope.destination, message_type = %envelope.type_, "Message delivered");
        Ok(())
    }
}
