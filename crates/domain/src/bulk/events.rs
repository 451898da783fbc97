//! Bulk transaction domain events.
//!
//! Events are immutable facts published after a successful state change and
//! consumed by downstream handlers (protocol executors, notification
//! adapters) to drive the next phase.

use common::{BatchId, BulkTransactionId, FspId, TransferId};
use serde::{Deserialize, Serialize};

use super::batch::BulkBatchState;
use super::phase::BulkTransactionPhase;
use super::request::PartyIdInfo;
use super::state::{PhaseCounter, PhaseCounters};
use super::transfer_state::{IndividualTransferState, IndividualTransferStatus, TransferError};

/// Events published by the bulk transaction aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BulkDomainEvent {
    /// A party lookup was dispatched for one individual transfer.
    PartyInfoRequested(PartyInfoRequestedData),

    /// Every party lookup for the bulk has reported back.
    DiscoveryCompleted(PhaseCompletedData),

    /// A bulk quote was dispatched for one batch.
    BulkQuotesRequested(BatchRequestData),

    /// Every quote batch for the bulk has reported back.
    AgreementCompleted(PhaseCompletedData),

    /// A bulk transfer was dispatched for one batch.
    BulkTransfersRequested(BatchRequestData),

    /// The bulk reached its terminal COMPLETED phase.
    BulkTransactionCompleted(BulkTransactionSummary),

    /// An aggregate-level fault aborted the bulk.
    BulkTransactionFailed(BulkFailedData),

    /// A bulk already exists for the id being created.
    DuplicateDetected(DuplicateDetectedData),
}

impl BulkDomainEvent {
    /// Returns the event type name used in envelopes and logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            BulkDomainEvent::PartyInfoRequested(_) => "PartyInfoRequested",
            BulkDomainEvent::DiscoveryCompleted(_) => "DiscoveryCompleted",
            BulkDomainEvent::BulkQuotesRequested(_) => "BulkQuotesRequested",
            BulkDomainEvent::AgreementCompleted(_) => "AgreementCompleted",
            BulkDomainEvent::BulkTransfersRequested(_) => "BulkTransfersRequested",
            BulkDomainEvent::BulkTransactionCompleted(_) => "BulkTransactionCompleted",
            BulkDomainEvent::BulkTransactionFailed(_) => "BulkTransactionFailed",
            BulkDomainEvent::DuplicateDetected(_) => "DuplicateDetected",
        }
    }

    /// Returns the message key used for transport partitioning.
    ///
    /// Per-transfer events carry `{bulk}:{transfer}`; everything else is
    /// keyed by the bulk id alone so per-bulk ordering holds.
    pub fn partition_key(&self) -> String {
        match self {
            BulkDomainEvent::PartyInfoRequested(data) => {
                format!("{}:{}", data.bulk_id, data.transfer_id)
            }
            BulkDomainEvent::DiscoveryCompleted(data) => data.bulk_id.to_string(),
            BulkDomainEvent::BulkQuotesRequested(data) => data.bulk_id.to_string(),
            BulkDomainEvent::AgreementCompleted(data) => data.bulk_id.to_string(),
            BulkDomainEvent::BulkTransfersRequested(data) => data.bulk_id.to_string(),
            BulkDomainEvent::BulkTransactionCompleted(data) => data.bulk_id.to_string(),
            BulkDomainEvent::BulkTransactionFailed(data) => data.bulk_id.to_string(),
            BulkDomainEvent::DuplicateDetected(data) => data.bulk_id.to_string(),
        }
    }
}

/// Data for PartyInfoRequested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyInfoRequestedData {
    pub bulk_id: BulkTransactionId,
    pub transfer_id: TransferId,
    /// Party to resolve.
    pub payee: PartyIdInfo,
}

/// Data for per-batch quote/transfer requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestData {
    pub bulk_id: BulkTransactionId,
    pub batch_id: BatchId,
    /// Destination FSP shared by the batch.
    pub fsp_id: FspId,
    /// Member transfers.
    pub transfer_ids: Vec<TransferId>,
}

/// Data for phase-completion events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseCompletedData {
    pub bulk_id: BulkTransactionId,
    /// Final counter values for the completed phase.
    pub counter: PhaseCounter,
}

/// Data for BulkTransactionFailed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailedData {
    pub bulk_id: BulkTransactionId,
    /// Reason for the abort.
    pub reason: String,
}

/// Data for DuplicateDetected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDetectedData {
    pub bulk_id: BulkTransactionId,
}

/// Final outcome of one individual transfer, reported in the bulk result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualTransferOutcome {
    pub transfer_id: TransferId,
    pub home_transaction_id: String,
    pub status: IndividualTransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TransferError>,
}

impl From<&IndividualTransferState> for IndividualTransferOutcome {
    fn from(state: &IndividualTransferState) -> Self {
        Self {
            transfer_id: state.id,
            home_transaction_id: state.home_transaction_id.clone(),
            status: state.status,
            last_error: state.last_error.clone(),
        }
    }
}

/// The reassembled bulk outcome published on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTransactionSummary {
    pub bulk_id: BulkTransactionId,
    pub bulk_home_transaction_id: String,
    pub current_phase: BulkTransactionPhase,
    pub counters: PhaseCounters,
    pub individual_results: Vec<IndividualTransferOutcome>,
}

// Convenience constructors
impl BulkDomainEvent {
    /// Creates a PartyInfoRequested event.
    pub fn party_info_requested(
        bulk_id: BulkTransactionId,
        transfer_id: TransferId,
        payee: PartyIdInfo,
    ) -> Self {
        BulkDomainEvent::PartyInfoRequested(PartyInfoRequestedData {
            bulk_id,
            transfer_id,
            payee,
        })
    }

    /// Creates a DiscoveryCompleted event.
    pub fn discovery_completed(bulk_id: BulkTransactionId, counter: PhaseCounter) -> Self {
        BulkDomainEvent::DiscoveryCompleted(PhaseCompletedData { bulk_id, counter })
    }

    /// Creates a BulkQuotesRequested event for one batch.
    pub fn bulk_quotes_requested(batch: &BulkBatchState) -> Self {
        BulkDomainEvent::BulkQuotesRequested(BatchRequestData {
            bulk_id: batch.bulk_id,
            batch_id: batch.id,
            fsp_id: batch.fsp_id.clone(),
            transfer_ids: batch.transfer_ids.clone(),
        })
    }

    /// Creates an AgreementCompleted event.
    pub fn agreement_completed(bulk_id: BulkTransactionId, counter: PhaseCounter) -> Self {
        BulkDomainEvent::AgreementCompleted(PhaseCompletedData { bulk_id, counter })
    }

    /// Creates a BulkTransfersRequested event for one batch.
    pub fn bulk_transfers_requested(batch: &BulkBatchState) -> Self {
        BulkDomainEvent::BulkTransfersRequested(BatchRequestData {
            bulk_id: batch.bulk_id,
            batch_id: batch.id,
            fsp_id: batch.fsp_id.clone(),
            transfer_ids: batch.transfer_ids.clone(),
        })
    }

    /// Creates a BulkTransactionCompleted event.
    pub fn bulk_transaction_completed(summary: BulkTransactionSummary) -> Self {
        BulkDomainEvent::BulkTransactionCompleted(summary)
    }

    /// Creates a BulkTransactionFailed event.
    pub fn bulk_transaction_failed(bulk_id: BulkTransactionId, reason: impl Into<String>) -> Self {
        BulkDomainEvent::BulkTransactionFailed(BulkFailedData {
            bulk_id,
            reason: reason.into(),
        })
    }

    /// Creates a DuplicateDetected event.
    pub fn duplicate_detected(bulk_id: BulkTransactionId) -> Self {
        BulkDomainEvent::DuplicateDetected(DuplicateDetectedData { bulk_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let bulk_id = BulkTransactionId::new();
        let transfer_id = TransferId::new();

        assert_eq!(
            BulkDomainEvent::party_info_requested(
                bulk_id,
                transfer_id,
                PartyIdInfo::new("MSISDN", "123"),
            )
            .event_type(),
            "PartyInfoRequested"
        );
        assert_eq!(
            BulkDomainEvent::discovery_completed(bulk_id, PhaseCounter::default()).event_type(),
            "DiscoveryCompleted"
        );
        assert_eq!(
            BulkDomainEvent::duplicate_detected(bulk_id).event_type(),
            "DuplicateDetected"
        );
        assert_eq!(
            BulkDomainEvent::bulk_transaction_failed(bulk_id, "boom").event_type(),
            "BulkTransactionFailed"
        );
    }

    #[test]
    fn test_partition_keys() {
        let bulk_id = BulkTransactionId::new();
        let transfer_id = TransferId::new();

        let per_transfer = BulkDomainEvent::party_info_requested(
            bulk_id,
            transfer_id,
            PartyIdInfo::new("MSISDN", "123"),
        );
        assert_eq!(
            per_transfer.partition_key(),
            format!("{bulk_id}:{transfer_id}")
        );

        let bulk_level = BulkDomainEvent::duplicate_detected(bulk_id);
        assert_eq!(bulk_level.partition_key(), bulk_id.to_string());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let batch = BulkBatchState::new(
            BulkTransactionId::new(),
            FspId::new("fsp-a"),
            vec![TransferId::new()],
        );
        let events = vec![
            BulkDomainEvent::bulk_quotes_requested(&batch),
            BulkDomainEvent::bulk_transfers_requested(&batch),
            BulkDomainEvent::agreement_completed(
                batch.bulk_id,
                PhaseCounter {
                    total: 1,
                    success: 1,
                    failed: 0,
                },
            ),
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let deserialized: BulkDomainEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(event, deserialized);
        }
    }
}
