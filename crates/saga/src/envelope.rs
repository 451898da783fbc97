//! Typed message envelope.
//!
//! The saga's wire format: a `key` used for transport partitioning (all
//! messages for one bulk share a key, preserving per-bulk ordering), a
//! timestamp, free-form headers, and a payload that is the closed union of
//! commands and domain events. Dispatch matches on the union, never on a
//! runtime name string.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use domain::{BulkCommand, BulkDomainEvent};
use serde::{Deserialize, Serialize};

/// The closed union of message payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Message {
    /// An instruction requesting a state change.
    Command(BulkCommand),

    /// An immutable fact published after a successful state change.
    Event(BulkDomainEvent),
}

impl Message {
    /// Returns the message name used for logging and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Command(command) => command.name(),
            Message::Event(event) => event.event_type(),
        }
    }

    /// Returns the message key used for transport partitioning.
    pub fn partition_key(&self) -> String {
        match self {
            Message::Command(command) => command.partition_key(),
            Message::Event(event) => event.partition_key(),
        }
    }
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Partitioning key; all messages for one bulk share it.
    pub key: String,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// Free-form transport headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// The typed payload.
    pub payload: Message,
}

impl MessageEnvelope {
    /// Wraps a command, keyed by the command's partition key.
    pub fn command(command: BulkCommand) -> Self {
        Self {
            key: command.partition_key(),
            timestamp: Utc::now(),
            headers: HashMap::new(),
            payload: Message::Command(command),
        }
    }

    /// Wraps a domain event, keyed by the event's partition key.
    pub fn event(event: BulkDomainEvent) -> Self {
        Self {
            key: event.partition_key(),
            timestamp: Utc::now(),
            headers: HashMap::new(),
            payload: Message::Event(event),
        }
    }

    /// Adds a transport header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns the payload's message name.
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BulkTransactionId;

    #[test]
    fn command_envelope_is_keyed_by_bulk_id() {
        let bulk_id = BulkTransactionId::new();
        let envelope = MessageEnvelope::command(BulkCommand::cleanup(bulk_id));

        assert_eq!(envelope.key, bulk_id.to_string());
        assert_eq!(envelope.name(), "CleanupBulkTransaction");
    }

    #[test]
    fn event_envelope_uses_event_partition_key() {
        let bulk_id = BulkTransactionId::new();
        let envelope = MessageEnvelope::event(BulkDomainEvent::duplicate_detected(bulk_id));

        assert_eq!(envelope.key, bulk_id.to_string());
        assert_eq!(envelope.name(), "DuplicateDetected");
    }

    #[test]
    fn headers_ride_along() {
        let envelope = MessageEnvelope::command(BulkCommand::cleanup(BulkTransactionId::new()))
            .with_header("traceparent", "00-abc-def-01");

        assert_eq!(
            envelope.headers.get("traceparent").map(String::as_str),
            Some("00-abc-def-01")
        );
    }

    #[test]
    fn envelope_serialization_roundtrip() {
        let envelope = MessageEnvelope::command(BulkCommand::cleanup(BulkTransactionId::new()));
        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: MessageEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, deserialized);
    }
}
