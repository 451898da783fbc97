//! Individual transfer sub-entity.

use chrono::{DateTime, Utc};
use common::{BatchId, BulkTransactionId, Currency, FspId, Money, TransferId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::{IndividualTransferRequest, PartyIdInfo};

/// Lifecycle status of one individual transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndividualTransferStatus {
    /// Accepted at fan-out, no phase has reported yet.
    #[default]
    Received,

    /// Party lookup resolved the payee.
    DiscoverySuccess,

    /// Party lookup failed; the transfer takes no further part in the bulk.
    DiscoveryFailed,

    /// Quote agreed for this transfer.
    AgreementSuccess,

    /// Quote rejected or batch quote failed.
    AgreementFailed,

    /// Transfer executed.
    TransferSuccess,

    /// Transfer rejected or batch transfer failed.
    TransferFailed,
}

impl IndividualTransferStatus {
    /// Returns true if this status represents a failure outcome.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            IndividualTransferStatus::DiscoveryFailed
                | IndividualTransferStatus::AgreementFailed
                | IndividualTransferStatus::TransferFailed
        )
    }
}

/// Error detail attached to a failed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferError {
    /// HTTP status code returned by the counterparty, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,

    /// Protocol error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Protocol error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransferError {
    /// Creates an error with a protocol code and description.
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            http_status_code: None,
            code: Some(code.into()),
            description: Some(description.into()),
        }
    }

    /// Creates an error carrying only an HTTP status code.
    pub fn from_http_status(status: u16) -> Self {
        Self {
            http_status_code: Some(status),
            code: None,
            description: None,
        }
    }
}

/// State of one individual transfer, owned by a bulk transaction but stored
/// under its own composite key so per-item writers never contend on the root
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualTransferState {
    /// Transfer identity.
    pub id: TransferId,

    /// Owning bulk transaction.
    pub bulk_id: BulkTransactionId,

    /// Caller's own reference for this transfer.
    pub home_transaction_id: String,

    /// Destination party; `fsp_id` is filled by discovery when not supplied.
    pub payee: PartyIdInfo,

    /// Transfer amount in minor units.
    pub amount: Money,

    /// Transfer currency.
    pub currency: Currency,

    /// Lifecycle status, mutated once per phase by that phase's handler.
    pub status: IndividualTransferStatus,

    /// Batch this transfer was allocated to, once batched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,

    /// Opaque party payload from discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_result: Option<Value>,

    /// Opaque quote payload from agreement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_result: Option<Value>,

    /// Opaque fulfilment payload from transfer execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_result: Option<Value>,

    /// Last error reported for this transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TransferError>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndividualTransferState {
    /// Builds the sub-entity for one request item at fan-out time.
    pub fn from_request(bulk_id: BulkTransactionId, request: &IndividualTransferRequest) -> Self {
        let now = Utc::now();
        Self {
            id: TransferId::new(),
            bulk_id,
            home_transaction_id: request.home_transaction_id.clone(),
            payee: request.payee.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            status: IndividualTransferStatus::Received,
            batch_id: None,
            party_result: None,
            quote_result: None,
            transfer_result: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a successful party lookup, adopting the resolved FSP when the
    /// request did not carry one.
    pub fn mark_discovery_success(&mut self, party: Value, fsp_id: Option<FspId>) {
        self.party_result = Some(party);
        if let Some(fsp_id) = fsp_id {
            self.payee.fsp_id = Some(fsp_id);
        }
        self.status = IndividualTransferStatus::DiscoverySuccess;
        self.updated_at = Utc::now();
    }

    /// Records a failed party lookup.
    pub fn mark_discovery_failed(&mut self, error: TransferError) {
        self.last_error = Some(error);
        self.status = IndividualTransferStatus::DiscoveryFailed;
        self.updated_at = Utc::now();
    }

    /// Records a successful quote for this transfer.
    pub fn mark_agreement_success(&mut self, quote: Option<Value>) {
        self.quote_result = quote;
        self.status = IndividualTransferStatus::AgreementSuccess;
        self.updated_at = Utc::now();
    }

    /// Records a failed quote for this transfer.
    pub fn mark_agreement_failed(&mut self, error: TransferError) {
        self.last_error = Some(error);
        self.status = IndividualTransferStatus::AgreementFailed;
        self.updated_at = Utc::now();
    }

    /// Records a successful transfer execution.
    pub fn mark_transfer_success(&mut self, fulfilment: Option<Value>) {
        self.transfer_result = fulfilment;
        self.status = IndividualTransferStatus::TransferSuccess;
        self.updated_at = Utc::now();
    }

    /// Records a failed transfer execution.
    pub fn mark_transfer_failed(&mut self, error: TransferError) {
        self.last_error = Some(error);
        self.status = IndividualTransferStatus::TransferFailed;
        self.updated_at = Utc::now();
    }

    /// Assigns this transfer to a batch.
    pub fn assign_batch(&mut self, batch_id: BatchId) {
        self.batch_id = Some(batch_id);
        self.updated_at = Utc::now();
    }

    /// Returns the destination FSP, if known.
    pub fn destination_fsp(&self) -> Option<&FspId> {
        self.payee.fsp_id.as_ref()
    }

    /// Returns true if this transfer can join an agreement batch.
    pub fn is_batchable(&self) -> bool {
        self.destination_fsp().is_some()
            && matches!(
                self.status,
                IndividualTransferStatus::Received | IndividualTransferStatus::DiscoverySuccess
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_transfer() -> IndividualTransferState {
        IndividualTransferState::from_request(
            BulkTransactionId::new(),
            &IndividualTransferRequest::new(
                "home-1",
                PartyIdInfo::new("MSISDN", "27710101010"),
                Money::from_minor_units(100),
                Currency::new("USD"),
            ),
        )
    }

    #[test]
    fn from_request_starts_received() {
        let transfer = make_transfer();
        assert_eq!(transfer.status, IndividualTransferStatus::Received);
        assert!(transfer.batch_id.is_none());
        assert!(transfer.last_error.is_none());
        assert!(!transfer.is_batchable());
    }

    #[test]
    fn discovery_success_adopts_resolved_fsp() {
        let mut transfer = make_transfer();
        transfer.mark_discovery_success(json!({"name": "A Payee"}), Some(FspId::new("payeefsp")));

        assert_eq!(transfer.status, IndividualTransferStatus::DiscoverySuccess);
        assert_eq!(transfer.destination_fsp().unwrap().as_str(), "payeefsp");
        assert!(transfer.is_batchable());
    }

    #[test]
    fn discovery_failure_records_error_and_blocks_batching() {
        let mut transfer = make_transfer();
        transfer.mark_discovery_failed(TransferError::new("3204", "Party not found"));

        assert_eq!(transfer.status, IndividualTransferStatus::DiscoveryFailed);
        assert!(transfer.status.is_failure());
        assert_eq!(
            transfer.last_error.as_ref().unwrap().code.as_deref(),
            Some("3204")
        );
        assert!(!transfer.is_batchable());
    }

    #[test]
    fn supplied_fsp_makes_received_transfer_batchable() {
        let mut transfer = make_transfer();
        transfer.payee.fsp_id = Some(FspId::new("payeefsp"));
        assert!(transfer.is_batchable());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut transfer = make_transfer();
        transfer.mark_discovery_success(json!({"idValue": "x"}), Some(FspId::new("fsp-a")));
        transfer.assign_batch(BatchId::new());

        let json = serde_json::to_string(&transfer).unwrap();
        let deserialized: IndividualTransferState = serde_json::from_str(&json).unwrap();
        assert_eq!(transfer, deserialized);
    }
}
