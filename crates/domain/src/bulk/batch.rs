//! Batches of transfers destined for the same counterparty FSP.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{BatchId, BulkTransactionId, FspId, TransferId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Batch allocated, not yet dispatched.
    #[default]
    Created,

    /// Bulk quote dispatched for this batch.
    QuotesRequested,

    /// Bulk quote callback reported success.
    QuotesCompleted,

    /// Bulk quote callback reported failure.
    QuotesFailed,

    /// Bulk transfer dispatched for this batch.
    TransfersRequested,

    /// Bulk transfer callback reported success.
    TransfersCompleted,

    /// Bulk transfer callback reported failure.
    TransfersFailed,
}

/// A group of individual transfers sharing a destination FSP, bounded by the
/// configured maximum items per batch so protocol bulk calls respect
/// upstream limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkBatchState {
    /// Batch identity.
    pub id: BatchId,

    /// Owning bulk transaction.
    pub bulk_id: BulkTransactionId,

    /// Destination FSP shared by every member transfer.
    pub fsp_id: FspId,

    /// Member transfers, fixed at allocation.
    pub transfer_ids: Vec<TransferId>,

    /// Lifecycle status.
    pub status: BatchStatus,

    /// Opaque bulk-quote result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_result: Option<Value>,

    /// Opaque bulk-transfer result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_result: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkBatchState {
    /// Creates a batch for the given members.
    pub fn new(bulk_id: BulkTransactionId, fsp_id: FspId, transfer_ids: Vec<TransferId>) -> Self {
        let now = Utc::now();
        Self {
            id: BatchId::new(),
            bulk_id,
            fsp_id,
            transfer_ids,
            status: BatchStatus::Created,
            quote_result: None,
            transfer_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the number of member transfers.
    pub fn len(&self) -> usize {
        self.transfer_ids.len()
    }

    /// Returns true if the batch has no members.
    pub fn is_empty(&self) -> bool {
        self.transfer_ids.is_empty()
    }

    /// Marks the batch and records its status change time.
    pub fn set_status(&mut self, status: BatchStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Allocates batches from `(transfer, destination)` pairs: one group per
/// FSP, each group chunked to at most `max_items_per_batch` members.
///
/// Grouping iterates FSPs in sorted order so allocation is deterministic for
/// a given input set.
pub fn allocate_batches(
    bulk_id: BulkTransactionId,
    items: Vec<(TransferId, FspId)>,
    max_items_per_batch: usize,
) -> Vec<BulkBatchState> {
    let max = max_items_per_batch.max(1);

    let mut by_fsp: BTreeMap<FspId, Vec<TransferId>> = BTreeMap::new();
    for (transfer_id, fsp_id) in items {
        by_fsp.entry(fsp_id).or_default().push(transfer_id);
    }

    let mut batches = Vec::new();
    for (fsp_id, transfer_ids) in by_fsp {
        for chunk in transfer_ids.chunks(max) {
            batches.push(BulkBatchState::new(bulk_id, fsp_id.clone(), chunk.to_vec()));
        }
    }
    batches
}
