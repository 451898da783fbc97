//! Cache-backed repository for bulk transactions and their sub-entities.

use async_trait::async_trait;
use common::{BatchId, BulkTransactionId, TransferId};
use state_store::{StateStore, StateStoreError};
use uuid::Uuid;

use crate::aggregate::Repository;
use crate::error::Result;

use super::state::{BulkTransactionState, PhaseCounter, PhaseCounters};
use super::transfer_state::IndividualTransferState;
use super::batch::BulkBatchState;

/// Storage key of a bulk transaction root document.
pub fn root_key(id: BulkTransactionId) -> String {
    format!("bulkTransaction:{id}")
}

fn transfer_key(bulk_id: BulkTransactionId, transfer_id: TransferId) -> String {
    format!("bulkTransaction:{bulk_id}:transfer:{transfer_id}")
}

fn transfer_set_key(bulk_id: BulkTransactionId) -> String {
    format!("bulkTransaction:{bulk_id}:transferIds")
}

fn batch_key(bulk_id: BulkTransactionId, batch_id: BatchId) -> String {
    format!("bulkTransaction:{bulk_id}:batch:{batch_id}")
}

fn batch_set_key(bulk_id: BulkTransactionId) -> String {
    format!("bulkTransaction:{bulk_id}:batchIds")
}

/// The three fan-out phases whose counters live in dedicated store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPhase {
    PartyLookup,
    Quotes,
    Transfers,
}

impl CounterPhase {
    fn fragment(&self) -> &'static str {
        match self {
            CounterPhase::PartyLookup => "partyLookup",
            CounterPhase::Quotes => "bulkQuotes",
            CounterPhase::Transfers => "bulkTransfers",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CounterKind {
    Total,
    Success,
    Failed,
}

impl CounterKind {
    fn fragment(&self) -> &'static str {
        match self {
            CounterKind::Total => "TotalCount",
            CounterKind::Success => "SuccessCount",
            CounterKind::Failed => "FailedCount",
        }
    }
}

fn counter_key(bulk_id: BulkTransactionId, phase: CounterPhase, kind: CounterKind) -> String {
    format!(
        "bulkTransaction:{bulk_id}:{}{}",
        phase.fragment(),
        kind.fragment()
    )
}

/// Repository for bulk transaction state.
///
/// The root document, each individual transfer, each batch, and each counter
/// live under their own keys, so per-item writers never contend on the root
/// document and counter updates go through the store's atomic increment.
pub struct BulkTransactionRepository<C: StateStore> {
    store: C,
}

impl<C: StateStore> BulkTransactionRepository<C> {
    /// Creates a repository over the given store.
    pub fn new(store: C) -> Self {
        Self { store }
    }

    /// Returns true if a root document exists for `bulk_id`.
    pub async fn bulk_exists(&self, bulk_id: BulkTransactionId) -> Result<bool> {
        Ok(self.store.exists(&root_key(bulk_id)).await?)
    }

    // Sub-entity access: individual transfers

    /// Loads one individual transfer sub-entity.
    pub async fn get_individual_transfer(
        &self,
        bulk_id: BulkTransactionId,
        transfer_id: TransferId,
    ) -> Result<Option<IndividualTransferState>> {
        match self.store.get(&transfer_key(bulk_id, transfer_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Stores one individual transfer sub-entity and tracks its id in the
    /// bulk's membership set. A separate store call from the root.
    pub async fn set_individual_transfer(&self, state: &IndividualTransferState) -> Result<()> {
        let key = transfer_key(state.bulk_id, state.id);
        self.store.set(&key, serde_json::to_value(state)?).await?;
        self.store
            .add_set_member(&transfer_set_key(state.bulk_id), &state.id.to_string())
            .await?;
        Ok(())
    }

    /// Returns the ids of all individual transfers owned by a bulk.
    pub async fn individual_transfer_ids(
        &self,
        bulk_id: BulkTransactionId,
    ) -> Result<Vec<TransferId>> {
        let members = self.store.set_members(&transfer_set_key(bulk_id)).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match Uuid::parse_str(&member) {
                Ok(uuid) => ids.push(TransferId::from_uuid(uuid)),
                Err(_) => {
                    tracing::warn!(%bulk_id, member, "skipping unparsable transfer id in set");
                }
            }
        }
        Ok(ids)
    }

    /// Loads every individual transfer owned by a bulk.
    pub async fn load_individual_transfers(
        &self,
        bulk_id: BulkTransactionId,
    ) -> Result<Vec<IndividualTransferState>> {
        let ids = self.individual_transfer_ids(bulk_id).await?;
        let mut transfers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(transfer) = self.get_individual_transfer(bulk_id, id).await? {
                transfers.push(transfer);
            } else {
                tracing::warn!(%bulk_id, transfer_id = %id, "transfer id in set but document missing");
            }
        }
        Ok(transfers)
    }

    // Sub-entity access: batches

    /// Loads one batch sub-entity.
    pub async fn get_batch(
        &self,
        bulk_id: BulkTransactionId,
        batch_id: BatchId,
    ) -> Result<Option<BulkBatchState>> {
        match self.store.get(&batch_key(bulk_id, batch_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Stores one batch sub-entity and tracks its id.
    pub async fn set_batch(&self, state: &BulkBatchState) -> Result<()> {
        let key = batch_key(state.bulk_id, state.id);
        self.store.set(&key, serde_json::to_value(state)?).await?;
        self.store
            .add_set_member(&batch_set_key(state.bulk_id), &state.id.to_string())
            .await?;
        Ok(())
    }

    /// Returns the ids of all batches owned by a bulk.
    pub async fn batch_ids(&self, bulk_id: BulkTransactionId) -> Result<Vec<BatchId>> {
        let members = self.store.set_members(&batch_set_key(bulk_id)).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match Uuid::parse_str(&member) {
                Ok(uuid) => ids.push(BatchId::from_uuid(uuid)),
                Err(_) => {
                    tracing::warn!(%bulk_id, member, "skipping unparsable batch id in set");
                }
            }
        }
        Ok(ids)
    }

    // Counters

    /// Fixes a phase total at fan-out time. Called once per phase; the total
    /// is never mutated afterward.
    pub async fn fix_total(
        &self,
        bulk_id: BulkTransactionId,
        phase: CounterPhase,
        total: i64,
    ) -> Result<()> {
        self.store
            .increment(&counter_key(bulk_id, phase, CounterKind::Total), total)
            .await?;
        Ok(())
    }

    /// Atomically increments a phase's success counter, returning the
    /// post-increment value.
    pub async fn increment_success(
        &self,
        bulk_id: BulkTransactionId,
        phase: CounterPhase,
    ) -> Result<i64> {
        Ok(self
            .store
            .increment(&counter_key(bulk_id, phase, CounterKind::Success), 1)
            .await?)
    }

    /// Atomically increments a phase's failure counter, returning the
    /// post-increment value.
    pub async fn increment_failed(
        &self,
        bulk_id: BulkTransactionId,
        phase: CounterPhase,
    ) -> Result<i64> {
        Ok(self
            .store
            .increment(&counter_key(bulk_id, phase, CounterKind::Failed), 1)
            .await?)
    }

    /// Reads the current counters for one phase.
    pub async fn phase_counter(
        &self,
        bulk_id: BulkTransactionId,
        phase: CounterPhase,
    ) -> Result<PhaseCounter> {
        Ok(PhaseCounter {
            total: self
                .store
                .counter(&counter_key(bulk_id, phase, CounterKind::Total))
                .await?,
            success: self
                .store
                .counter(&counter_key(bulk_id, phase, CounterKind::Success))
                .await?,
            failed: self
                .store
                .counter(&counter_key(bulk_id, phase, CounterKind::Failed))
                .await?,
        })
    }

    /// Reads the current counters for all phases.
    pub async fn all_counters(&self, bulk_id: BulkTransactionId) -> Result<PhaseCounters> {
        Ok(PhaseCounters {
            party_lookup: self.phase_counter(bulk_id, CounterPhase::PartyLookup).await?,
            quotes: self.phase_counter(bulk_id, CounterPhase::Quotes).await?,
            transfers: self.phase_counter(bulk_id, CounterPhase::Transfers).await?,
        })
    }

    // Cleanup

    /// Removes every sub-entity, counter and membership set owned by a bulk.
    ///
    /// The root document itself is removed by the aggregate's destroy; this
    /// is the caller-coordinated cascade.
    pub async fn purge(&self, bulk_id: BulkTransactionId) -> Result<()> {
        for transfer_id in self.individual_transfer_ids(bulk_id).await? {
            self.remove_if_exists(&transfer_key(bulk_id, transfer_id))
                .await?;
        }
        for batch_id in self.batch_ids(bulk_id).await? {
            self.remove_if_exists(&batch_key(bulk_id, batch_id)).await?;
        }
        for phase in [
            CounterPhase::PartyLookup,
            CounterPhase::Quotes,
            CounterPhase::Transfers,
        ] {
            for kind in [CounterKind::Total, CounterKind::Success, CounterKind::Failed] {
                self.remove_if_exists(&counter_key(bulk_id, phase, kind))
                    .await?;
            }
        }
        self.remove_if_exists(&transfer_set_key(bulk_id)).await?;
        self.remove_if_exists(&batch_set_key(bulk_id)).await?;
        Ok(())
    }

    async fn remove_if_exists(&self, key: &str) -> Result<()> {
        match self.store.remove(key).await {
            Ok(()) | Err(StateStoreError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl<C: StateStore> Repository<BulkTransactionState> for BulkTransactionRepository<C> {
    async fn load(&self, id: &str) -> Result<Option<BulkTransactionState>> {
        match self.store.get(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, state: &BulkTransactionState) -> Result<()> {
        self.store
            .set(&root_key(state.id), serde_json::to_value(state)?)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        Ok(self.store.remove(id).await?)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.exists(id).await?)
    }
}
