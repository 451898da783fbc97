//! Bulk transaction commands.
//!
//! Commands are the closed union of instructions the orchestrator accepts;
//! handler dispatch is an exhaustive match, so an unhandled command kind is
//! unrepresentable.

use common::{BatchId, BulkTransactionId, FspId, TransferId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::BulkTransferRequest;
use super::transfer_state::TransferError;

/// Outcome of one party lookup, delivered by the discovery executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PartyLookupOutcome {
    /// Lookup resolved the payee.
    Success {
        /// Opaque party payload.
        party: Value,
        /// Destination FSP resolved by the lookup, when the scheme returns
        /// one.
        #[serde(skip_serializing_if = "Option::is_none")]
        fsp_id: Option<FspId>,
    },
    /// Lookup failed for this transfer.
    Failure { error: TransferError },
}

/// Per-item result inside a batch callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub transfer_id: TransferId,
    /// Opaque per-item payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Per-item error; absence means the item succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

impl BatchItemResult {
    /// Creates a successful item result.
    pub fn success(transfer_id: TransferId, payload: Option<Value>) -> Self {
        Self {
            transfer_id,
            payload,
            error: None,
        }
    }

    /// Creates a failed item result.
    pub fn failure(transfer_id: TransferId, error: TransferError) -> Self {
        Self {
            transfer_id,
            payload: None,
            error: Some(error),
        }
    }

    /// Returns true if this item succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one batch quote/transfer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchCallbackOutcome {
    /// The batch call succeeded; items may still fail individually.
    Success {
        /// Opaque batch-level payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Per-item results.
        items: Vec<BatchItemResult>,
    },
    /// The whole batch call failed; every member is marked failed.
    Failure { error: TransferError },
}

/// The closed union of commands the orchestrator processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BulkCommand {
    /// Accept a bulk request and fan out the first phase.
    ProcessBulkRequest(BulkTransferRequest),

    /// Apply one party lookup result.
    ProcessPartyInfoCallback(PartyInfoCallbackData),

    /// Apply one batch quote result.
    ProcessBulkQuotesCallback(BatchCallbackData),

    /// Apply one batch transfer result.
    ProcessBulkTransfersCallback(BatchCallbackData),

    /// Remove all state for a terminal bulk.
    CleanupBulkTransaction(CleanupData),
}

/// Data for ProcessPartyInfoCallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyInfoCallbackData {
    pub bulk_id: BulkTransactionId,
    pub transfer_id: TransferId,
    pub outcome: PartyLookupOutcome,
}

/// Data for per-batch callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCallbackData {
    pub bulk_id: BulkTransactionId,
    pub batch_id: BatchId,
    pub outcome: BatchCallbackOutcome,
}

/// Data for CleanupBulkTransaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupData {
    pub bulk_id: BulkTransactionId,
}

impl BulkCommand {
    /// Returns the command name used in envelopes and logs.
    pub fn name(&self) -> &'static str {
        match self {
            BulkCommand::ProcessBulkRequest(_) => "ProcessBulkRequest",
            BulkCommand::ProcessPartyInfoCallback(_) => "ProcessPartyInfoCallback",
            BulkCommand::ProcessBulkQuotesCallback(_) => "ProcessBulkQuotesCallback",
            BulkCommand::ProcessBulkTransfersCallback(_) => "ProcessBulkTransfersCallback",
            BulkCommand::CleanupBulkTransaction(_) => "CleanupBulkTransaction",
        }
    }

    /// Returns the bulk transaction this command addresses.
    pub fn bulk_id(&self) -> BulkTransactionId {
        match self {
            BulkCommand::ProcessBulkRequest(request) => request.bulk_transaction_id,
            BulkCommand::ProcessPartyInfoCallback(data) => data.bulk_id,
            BulkCommand::ProcessBulkQuotesCallback(data) => data.bulk_id,
            BulkCommand::ProcessBulkTransfersCallback(data) => data.bulk_id,
            BulkCommand::CleanupBulkTransaction(data) => data.bulk_id,
        }
    }

    /// Returns the message key used for transport partitioning.
    ///
    /// Commands are keyed by bulk id so the transport serializes all
    /// processing for one bulk.
    pub fn partition_key(&self) -> String {
        self.bulk_id().to_string()
    }

    /// Creates a ProcessPartyInfoCallback command.
    pub fn party_info_callback(
        bulk_id: BulkTransactionId,
        transfer_id: TransferId,
        outcome: PartyLookupOutcome,
    ) -> Self {
        BulkCommand::ProcessPartyInfoCallback(PartyInfoCallbackData {
            bulk_id,
            transfer_id,
            outcome,
        })
    }

    /// Creates a ProcessBulkQuotesCallback command.
    pub fn bulk_quotes_callback(
        bulk_id: BulkTransactionId,
        batch_id: BatchId,
        outcome: BatchCallbackOutcome,
    ) -> Self {
        BulkCommand::ProcessBulkQuotesCallback(BatchCallbackData {
            bulk_id,
            batch_id,
            outcome,
        })
    }

    /// Creates a ProcessBulkTransfersCallback command.
    pub fn bulk_transfers_callback(
        bulk_id: BulkTransactionId,
        batch_id: BatchId,
        outcome: BatchCallbackOutcome,
    ) -> Self {
        BulkCommand::ProcessBulkTransfersCallback(BatchCallbackData {
            bulk_id,
            batch_id,
            outcome,
        })
    }

    /// Creates a CleanupBulkTransaction command.
    pub fn cleanup(bulk_id: BulkTransactionId) -> Self {
        BulkCommand::CleanupBulkTransaction(CleanupData { bulk_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_names() {
        let bulk_id = BulkTransactionId::new();
        assert_eq!(
            BulkCommand::cleanup(bulk_id).name(),
            "CleanupBulkTransaction"
        );
        assert_eq!(
            BulkCommand::party_info_callback(
                bulk_id,
                TransferId::new(),
                PartyLookupOutcome::Failure {
                    error: TransferError::new("3204", "Party not found"),
                },
            )
            .name(),
            "ProcessPartyInfoCallback"
        );
    }

    #[test]
    fn test_partition_key_is_bulk_id() {
        let bulk_id = BulkTransactionId::new();
        let command = BulkCommand::bulk_quotes_callback(
            bulk_id,
            BatchId::new(),
            BatchCallbackOutcome::Failure {
                error: TransferError::from_http_status(504),
            },
        );
        assert_eq!(command.partition_key(), bulk_id.to_string());
        assert_eq!(command.bulk_id(), bulk_id);
    }

    #[test]
    fn test_batch_item_result_success_flag() {
        let ok = BatchItemResult::success(TransferId::new(), Some(json!({"q": 1})));
        assert!(ok.is_success());

        let failed =
            BatchItemResult::failure(TransferId::new(), TransferError::new("5103", "rejected"));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let command = BulkCommand::party_info_callback(
            BulkTransactionId::new(),
            TransferId::new(),
            PartyLookupOutcome::Success {
                party: json!({"displayName": "A Payee"}),
                fsp_id: Some(FspId::new("payeefsp")),
            },
        );

        let json = serde_json::to_string(&command).unwrap();
        let deserialized: BulkCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(command, deserialized);
    }
}
