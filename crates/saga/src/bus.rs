//! Message bus contract.
//!
//! An explicit per-process object passed by reference to collaborators.
//! Publication of a batch of envelopes is awaited and ordered; there is no
//! fire-and-continue path.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::envelope::MessageEnvelope;

/// Errors produced by a message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport rejected or failed the publish.
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Contract for publishing envelopes to the transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes one envelope.
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError>;

    /// Publishes a batch of envelopes, awaited, in order; stops at the
    /// first failure.
    async fn publish_all(&self, envelopes: Vec<MessageEnvelope>) -> Result<(), BusError> {
        for envelope in envelopes {
            self.publish(envelope).await?;
        }
        Ok(())
    }
}

/// In-memory bus recording every published envelope, for tests and local
/// runs.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    published: Arc<RwLock<Vec<MessageEnvelope>>>,
}

impl InMemoryMessageBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything published so far, in publish order.
    pub async fn published(&self) -> Vec<MessageEnvelope> {
        self.published.read().await.clone()
    }

    /// Drains and returns everything published so far.
    pub async fn drain(&self) -> Vec<MessageEnvelope> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Returns the number of published envelopes.
    pub async fn len(&self) -> usize {
        self.published.read().await.len()
    }

    /// Returns true if nothing has been published.
    pub async fn is_empty(&self) -> bool {
        self.published.read().await.is_empty()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        self.published.write().await.push(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BulkTransactionId;
    use domain::BulkCommand;

    fn envelope() -> MessageEnvelope {
        MessageEnvelope::command(BulkCommand::cleanup(BulkTransactionId::new()))
    }

    #[tokio::test]
    async fn publish_records_in_order() {
        let bus = InMemoryMessageBus::new();
        let first = envelope();
        let second = envelope();

        bus.publish(first.clone()).await.unwrap();
        bus.publish(second.clone()).await.unwrap();

        let published = bus.published().await;
        assert_eq!(published, vec![first, second]);
    }

    #[tokio::test]
    async fn publish_all_preserves_batch_order() {
        let bus = InMemoryMessageBus::new();
        let batch: Vec<MessageEnvelope> = (0..5).map(|_| envelope()).collect();

        bus.publish_all(batch.clone()).await.unwrap();

        assert_eq!(bus.published().await, batch);
    }

    #[tokio::test]
    async fn drain_empties_the_bus() {
        let bus = InMemoryMessageBus::new();
        bus.publish(envelope()).await.unwrap();

        assert_eq!(bus.drain().await.len(), 1);
        assert!(bus.is_empty().await);
    }
}
