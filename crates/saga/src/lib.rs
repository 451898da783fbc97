//! Phase orchestration for bulk transactions.
//!
//! This crate drives a bulk request through its protocol phases:
//! discovery fans out one party lookup per individual transfer, agreement
//! and transfer execution fan out per batch, and every phase fans back in
//! through atomic counter comparison — the handler that observes the
//! post-increment sum reach the phase total advances the bulk.
//!
//! Handlers are stateless per message; no aggregate instance lives between
//! messages. Per-bulk ordering and counter atomicity are provided by the
//! transport and store respectively.

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod orchestrator;

pub use bus::{BusError, InMemoryMessageBus, MessageBus};
pub use config::SagaConfig;
pub use envelope::{Message, MessageEnvelope};
pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
