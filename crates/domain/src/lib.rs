//! Domain layer for the bulk-transfer saga engine.
//!
//! This crate provides the core domain abstractions:
//! - `EntityState` / `Repository` / `AggregateRoot` for command processing
//!   with store-on-success and recorded domain events
//! - `PersistentStateMachine`, a generic cache-backed finite-state machine
//! - The bulk-transaction aggregate with its entity model, repository,
//!   commands, and domain events
//! - The single outbound transfer lifecycle machine

pub mod aggregate;
pub mod bulk;
pub mod error;
pub mod fsm;
pub mod transfer;

pub use aggregate::{AggregateRoot, EntityState, Repository};
pub use bulk::{
    BatchCallbackData, BatchCallbackOutcome, BatchItemResult, BatchRequestData, BatchStatus,
    BulkBatchState, BulkCommand, BulkDomainEvent, BulkFailedData, BulkTransactionAggregate,
    BulkTransactionOptions, BulkTransactionPhase, BulkTransactionRepository, BulkTransactionState,
    BulkTransactionSummary, BulkTransferRequest, CleanupData, CounterPhase, CreateOutcome,
    DuplicateDetectedData, IndividualTransferOutcome, IndividualTransferRequest,
    IndividualTransferState, IndividualTransferStatus, PartyIdInfo, PartyInfoCallbackData,
    PartyInfoRequestedData, PartyLookupOutcome, PhaseCompletedData, PhaseCounter, PhaseCounters,
    TransferError, allocate_batches, root_key,
};
pub use error::DomainError;
pub use fsm::{
    MachineData, PersistentStateMachine, StateMachineError, StateMachineSpec, TransitionSpec,
};
pub use transfer::{OutboundTransferData, OutboundTransferMachine};
