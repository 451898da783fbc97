//! Inbound bulk transfer request types.

use chrono::{DateTime, Utc};
use common::{BulkTransactionId, Currency, FspId, Money};
use serde::{Deserialize, Serialize};

/// Party addressing information for a payee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyIdInfo {
    /// Identifier scheme (e.g. `MSISDN`, `IBAN`).
    pub id_type: String,

    /// Identifier value within the scheme.
    pub id_value: String,

    /// Optional sub-identifier or sub-type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_id_or_type: Option<String>,

    /// Destination FSP, when already known (required to skip discovery).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsp_id: Option<FspId>,
}

impl PartyIdInfo {
    /// Creates party info without a known destination FSP.
    pub fn new(id_type: impl Into<String>, id_value: impl Into<String>) -> Self {
        Self {
            id_type: id_type.into(),
            id_value: id_value.into(),
            sub_id_or_type: None,
            fsp_id: None,
        }
    }

    /// Creates party info with a known destination FSP.
    pub fn with_fsp(
        id_type: impl Into<String>,
        id_value: impl Into<String>,
        fsp_id: impl Into<FspId>,
    ) -> Self {
        Self {
            id_type: id_type.into(),
            id_value: id_value.into(),
            sub_id_or_type: None,
            fsp_id: Some(fsp_id.into()),
        }
    }
}

/// One payee-directed transfer within a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualTransferRequest {
    /// Caller's own reference for this transfer.
    pub home_transaction_id: String,

    /// Destination party.
    pub payee: PartyIdInfo,

    /// Transfer amount in minor units.
    pub amount: Money,

    /// Transfer currency.
    pub currency: Currency,

    /// Free-text note forwarded to the payee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IndividualTransferRequest {
    /// Creates a transfer request.
    pub fn new(
        home_transaction_id: impl Into<String>,
        payee: PartyIdInfo,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            home_transaction_id: home_transaction_id.into(),
            payee,
            amount,
            currency,
            note: None,
        }
    }
}

/// Processing options carried on a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkTransactionOptions {
    /// Stop after party discovery; no quotes or transfers are executed.
    #[serde(default)]
    pub only_validate_party: bool,

    /// Proceed past discovery without an explicit acceptance call.
    #[serde(default)]
    pub auto_accept_party: bool,

    /// Proceed past agreement without an explicit acceptance call.
    #[serde(default)]
    pub auto_accept_quote: bool,

    /// Skip discovery entirely; every payee must carry a destination FSP.
    #[serde(default)]
    pub skip_party_lookup: bool,

    /// Caller wants a synchronous response (handled by the outer API layer).
    #[serde(default)]
    pub synchronous: bool,

    /// Request expiration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// A customer-submitted bulk transfer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTransferRequest {
    /// Bulk transaction identity; duplicates of this id are rejected.
    pub bulk_transaction_id: BulkTransactionId,

    /// Caller's own reference for the whole bulk.
    pub bulk_home_transaction_id: String,

    /// Processing options.
    #[serde(default)]
    pub options: BulkTransactionOptions,

    /// The individual transfers to process as a unit.
    pub individual_transfers: Vec<IndividualTransferRequest>,
}

impl BulkTransferRequest {
    /// Creates a bulk request with a generated bulk transaction id.
    pub fn new(
        bulk_home_transaction_id: impl Into<String>,
        options: BulkTransactionOptions,
        individual_transfers: Vec<IndividualTransferRequest>,
    ) -> Self {
        Self {
            bulk_transaction_id: BulkTransactionId::new(),
            bulk_home_transaction_id: bulk_home_transaction_id.into(),
            options,
            individual_transfers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_roundtrip() {
        let request = BulkTransferRequest::new(
            "home-bulk-1",
            BulkTransactionOptions {
                auto_accept_party: true,
                ..Default::default()
            },
            vec![IndividualTransferRequest::new(
                "home-1",
                PartyIdInfo::new("MSISDN", "27710101010"),
                Money::from_minor_units(1500),
                Currency::new("USD"),
            )],
        );

        let json = serde_json::to_string(&request).unwrap();
        let deserialized: BulkTransferRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, deserialized);
    }

    #[test]
    fn options_default_to_all_off() {
        let options: BulkTransactionOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.only_validate_party);
        assert!(!options.skip_party_lookup);
        assert!(options.expiration.is_none());
    }

    #[test]
    fn party_with_fsp_carries_destination() {
        let party = PartyIdInfo::with_fsp("MSISDN", "27710101010", "payeefsp");
        assert_eq!(party.fsp_id.as_ref().unwrap().as_str(), "payeefsp");
    }
}
