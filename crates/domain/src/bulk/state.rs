//! Bulk transaction aggregate root state.

use chrono::{DateTime, Utc};
use common::BulkTransactionId;
use serde::{Deserialize, Serialize};

use crate::aggregate::EntityState;

use super::phase::BulkTransactionPhase;
use super::repository::root_key;
use super::request::{BulkTransactionOptions, BulkTransferRequest};

/// Success/failure counters for one phase.
///
/// The authoritative values live in dedicated store keys mutated only
/// through the store's atomic increment; this struct is the snapshot the
/// root document carries for status queries. A phase is complete exactly
/// when `success + failed == total`; the total is fixed at fan-out and
/// never mutated afterward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounter {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
}

impl PhaseCounter {
    /// Returns true when every fanned-out item has reported back.
    pub fn is_complete(&self) -> bool {
        self.success + self.failed == self.total
    }
}

/// Counter snapshots for the three fan-out phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounters {
    pub party_lookup: PhaseCounter,
    pub quotes: PhaseCounter,
    pub transfers: PhaseCounter,
}

/// Aggregate root for one bulk transaction.
///
/// Mutated exclusively by the bulk transaction aggregate in response to
/// commands; individual transfers and batches are owned sub-entities stored
/// under composite keys, never nested in this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTransactionState {
    /// Immutable identity.
    pub id: BulkTransactionId,

    /// Caller's own reference for the whole bulk.
    pub bulk_home_transaction_id: String,

    /// Options from the originating request.
    pub options: BulkTransactionOptions,

    /// Current phase in the bulk lifecycle.
    pub current_phase: BulkTransactionPhase,

    /// Last-observed counter snapshot.
    pub counters: PhaseCounters,

    /// Optimistic version stamp, bumped on every store.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkTransactionState {
    /// Builds a fresh root from an accepted request.
    ///
    /// With `skip_party_lookup` set, discovery is bypassed entirely and the
    /// bulk starts directly in the agreement phase with a zero lookup total.
    pub fn from_request(request: &BulkTransferRequest) -> Self {
        let current_phase = if request.options.skip_party_lookup {
            BulkTransactionPhase::AgreementProcessing
        } else {
            BulkTransactionPhase::Received
        };
        let now = Utc::now();
        Self {
            id: request.bulk_transaction_id,
            bulk_home_transaction_id: request.bulk_home_transaction_id.clone(),
            options: request.options.clone(),
            current_phase,
            counters: PhaseCounters::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the bulk has reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }
}

impl EntityState for BulkTransactionState {
    fn entity_key(&self) -> String {
        root_key(self.id)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
