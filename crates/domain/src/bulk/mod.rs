//! Bulk transaction aggregate and related types.

mod aggregate;
mod batch;
mod commands;
mod events;
mod phase;
mod repository;
mod request;
mod state;
mod transfer_state;

pub use aggregate::{BulkTransactionAggregate, CreateOutcome};
pub use batch::{BatchStatus, BulkBatchState, allocate_batches};
pub use commands::{
    BatchCallbackData, BatchCallbackOutcome, BatchItemResult, BulkCommand, CleanupData,
    PartyInfoCallbackData, PartyLookupOutcome,
};
pub use events::{
    BatchRequestData, BulkDomainEvent, BulkFailedData, BulkTransactionSummary,
    DuplicateDetectedData, IndividualTransferOutcome, PartyInfoRequestedData, PhaseCompletedData,
};
pub use phase::BulkTransactionPhase;
pub use repository::{BulkTransactionRepository, CounterPhase, root_key};
pub use request::{
    BulkTransactionOptions, BulkTransferRequest, IndividualTransferRequest, PartyIdInfo,
};
pub use state::{BulkTransactionState, PhaseCounter, PhaseCounters};
pub use transfer_state::{IndividualTransferState, IndividualTransferStatus, TransferError};
