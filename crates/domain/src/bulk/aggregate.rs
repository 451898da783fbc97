//! Bulk transaction aggregate.

use std::collections::HashMap;

use common::{BatchId, BulkTransactionId, TransferId};
use state_store::StateStore;

use crate::aggregate::AggregateRoot;
use crate::error::{DomainError, Result};

use super::batch::{BatchStatus, BulkBatchState, allocate_batches};
use super::commands::{BatchCallbackOutcome, PartyLookupOutcome};
use super::events::{BulkDomainEvent, BulkTransactionSummary, IndividualTransferOutcome};
use super::phase::BulkTransactionPhase;
use super::repository::{BulkTransactionRepository, CounterPhase, root_key};
use super::request::BulkTransferRequest;
use super::state::{BulkTransactionState, PhaseCounter};
use super::transfer_state::{IndividualTransferState, TransferError};

/// Result of a create-from-request call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A fresh root entity was built and is ready to store.
    Created,
    /// A bulk already exists for the id; a `DuplicateDetected` event was
    /// recorded and nothing must be stored.
    Duplicate,
}

/// Aggregate for one bulk transaction.
///
/// Composes the generic aggregate root with the bulk repository: command
/// handlers mutate the root entity and sub-entities through this type, and
/// the caller stores the root exactly once per successful command before
/// publishing the recorded events.
pub struct BulkTransactionAggregate<C: StateStore> {
    root: AggregateRoot<BulkTransactionState, BulkTransactionRepository<C>, BulkDomainEvent>,
}

impl<C: StateStore> BulkTransactionAggregate<C> {
    /// Creates an aggregate over the given store, with no entity hydrated.
    pub fn new(store: C) -> Self {
        Self {
            root: AggregateRoot::new(BulkTransactionRepository::new(store)),
        }
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &BulkTransactionRepository<C> {
        self.root.repository()
    }

    /// Returns the hydrated root state, if any.
    pub fn state(&self) -> Option<&BulkTransactionState> {
        self.root.entity()
    }

    fn state_required(&self, action: &'static str) -> Result<&BulkTransactionState> {
        self.root.entity().ok_or(DomainError::NoEntity { action })
    }

    fn state_required_mut(
        &mut self,
        action: &'static str,
    ) -> Result<&mut BulkTransactionState> {
        self.root.entity_mut().ok_or(DomainError::NoEntity { action })
    }

    /// Records a domain event for publication after the store.
    pub fn record_event(&mut self, event: BulkDomainEvent) {
        self.root.record_event(event);
    }

    /// Takes the recorded events, in recording order.
    pub fn take_events(&mut self) -> Vec<BulkDomainEvent> {
        self.root.take_events()
    }

    /// Persists the root entity. Called exactly once per successful command.
    pub async fn store(&mut self) -> Result<()> {
        self.root.store().await
    }

    // Creation

    /// Builds a fresh root from an accepted request.
    ///
    /// When a bulk already exists for the request's id, a
    /// `DuplicateDetected` event is recorded, no entity is built, and the
    /// caller must skip the store while still publishing the event.
    pub async fn create_from_request(
        &mut self,
        request: &BulkTransferRequest,
    ) -> Result<CreateOutcome> {
        let bulk_id = request.bulk_transaction_id;
        if self.root.exists(&root_key(bulk_id)).await? {
            tracing::warn!(%bulk_id, "duplicate bulk request");
            self.root
                .record_event(BulkDomainEvent::duplicate_detected(bulk_id));
            return Ok(CreateOutcome::Duplicate);
        }

        self.root
            .set_entity(BulkTransactionState::from_request(request));
        Ok(CreateOutcome::Created)
    }

    /// Rehydrates the aggregate from the repository.
    pub async fn create_from_repo(&mut self, bulk_id: BulkTransactionId) -> Result<()> {
        if self.root.load(&root_key(bulk_id), false).await?.is_none() {
            return Err(DomainError::NotFound {
                entity_type: "BulkTransaction",
                id: bulk_id.to_string(),
            });
        }
        Ok(())
    }

    // Sub-entities

    /// Stores one individual transfer under the bulk's namespace — a
    /// separate store call from the root, never competing with root updates.
    pub async fn add_individual_transfer(&self, entity: &IndividualTransferState) -> Result<()> {
        self.repository().set_individual_transfer(entity).await
    }

    /// Loads every individual transfer owned by this bulk.
    pub async fn individual_transfers(&self) -> Result<Vec<IndividualTransferState>> {
        let bulk_id = self.state_required("load individual transfers")?.id;
        self.repository().load_individual_transfers(bulk_id).await
    }

    // Counters

    /// Fixes the party-lookup total at discovery fan-out.
    pub async fn set_party_lookup_total(&mut self, total: i64) -> Result<()> {
        let bulk_id = self.state_required("set party lookup total")?.id;
        self.repository()
            .fix_total(bulk_id, CounterPhase::PartyLookup, total)
            .await?;
        self.state_required_mut("set party lookup total")?
            .counters
            .party_lookup
            .total = total;
        Ok(())
    }

    /// Refreshes the root's counter snapshot from the authoritative keys.
    pub async fn refresh_counters(&mut self) -> Result<()> {
        let bulk_id = self.state_required("refresh counters")?.id;
        let counters = self.repository().all_counters(bulk_id).await?;
        self.state_required_mut("refresh counters")?.counters = counters;
        Ok(())
    }

    // Per-phase result application (fan-in)

    /// Applies one party lookup result: updates the sub-entity, performs the
    /// atomic counter increment, and returns the post-increment counters so
    /// the caller can detect phase completion by comparison.
    pub async fn apply_party_lookup_result(
        &mut self,
        transfer_id: TransferId,
        outcome: &PartyLookupOutcome,
    ) -> Result<PhaseCounter> {
        let state = self.state_required("apply party lookup result")?;
        if !matches!(
            state.current_phase,
            BulkTransactionPhase::DiscoveryProcessing
        ) {
            return Err(DomainError::InvalidPhaseTransition {
                phase: state.current_phase,
                action: "apply party lookup result",
            });
        }
        let bulk_id = state.id;

        let mut transfer = self
            .repository()
            .get_individual_transfer(bulk_id, transfer_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity_type: "IndividualTransfer",
                id: transfer_id.to_string(),
            })?;

        match outcome {
            PartyLookupOutcome::Success { party, fsp_id } => {
                transfer.mark_discovery_success(party.clone(), fsp_id.clone());
                self.repository().set_individual_transfer(&transfer).await?;
                self.repository()
                    .increment_success(bulk_id, CounterPhase::PartyLookup)
                    .await?;
            }
            PartyLookupOutcome::Failure { error } => {
                transfer.mark_discovery_failed(error.clone());
                self.repository().set_individual_transfer(&transfer).await?;
                self.repository()
                    .increment_failed(bulk_id, CounterPhase::PartyLookup)
                    .await?;
            }
        }

        let counter = self
            .repository()
            .phase_counter(bulk_id, CounterPhase::PartyLookup)
            .await?;
        self.state_required_mut("apply party lookup result")?
            .counters
            .party_lookup = counter;
        Ok(counter)
    }

    /// Applies one batch quote result and returns the post-increment quote
    /// counters.
    pub async fn apply_quotes_result(
        &mut self,
        batch_id: BatchId,
        outcome: &BatchCallbackOutcome,
    ) -> Result<PhaseCounter> {
        let state = self.state_required("apply quotes result")?;
        if !matches!(
            state.current_phase,
            BulkTransactionPhase::AgreementProcessing
        ) {
            return Err(DomainError::InvalidPhaseTransition {
                phase: state.current_phase,
                action: "apply quotes result",
            });
        }
        let bulk_id = state.id;
        let mut batch = self.require_batch(bulk_id, batch_id).await?;

        match outcome {
            BatchCallbackOutcome::Success { payload, items } => {
                batch.quote_result = payload.clone();
                batch.set_status(BatchStatus::QuotesCompleted);
                for item in items {
                    if let Some(mut transfer) = self
                        .repository()
                        .get_individual_transfer(bulk_id, item.transfer_id)
                        .await?
                    {
                        match &item.error {
                            None => transfer.mark_agreement_success(item.payload.clone()),
                            Some(error) => transfer.mark_agreement_failed(error.clone()),
                        }
                        self.repository().set_individual_transfer(&transfer).await?;
                    }
                }
                self.repository()
                    .increment_success(bulk_id, CounterPhase::Quotes)
                    .await?;
            }
            BatchCallbackOutcome::Failure { error } => {
                batch.set_status(BatchStatus::QuotesFailed);
                self.fail_batch_members(bulk_id, &batch, error, |transfer, err| {
                    transfer.mark_agreement_failed(err)
                })
                .await?;
                self.repository()
                    .increment_failed(bulk_id, CounterPhase::Quotes)
                    .await?;
            }
        }
        self.repository().set_batch(&batch).await?;

        let counter = self
            .repository()
            .phase_counter(bulk_id, CounterPhase::Quotes)
            .await?;
        self.state_required_mut("apply quotes result")?.counters.quotes = counter;
        Ok(counter)
    }

    /// Applies one batch transfer result and returns the post-increment
    /// transfer counters.
    pub async fn apply_transfers_result(
        &mut self,
        batch_id: BatchId,
        outcome: &BatchCallbackOutcome,
    ) -> Result<PhaseCounter> {
        let state = self.state_required("apply transfers result")?;
        if !matches!(
            state.current_phase,
            BulkTransactionPhase::TransfersProcessing
        ) {
            return Err(DomainError::InvalidPhaseTransition {
                phase: state.current_phase,
                action: "apply transfers result",
            });
        }
        let bulk_id = state.id;
        let mut batch = self.require_batch(bulk_id, batch_id).await?;

        match outcome {
            BatchCallbackOutcome::Success { payload, items } => {
                batch.transfer_result = payload.clone();
                batch.set_status(BatchStatus::TransfersCompleted);
                for item in items {
                    if let Some(mut transfer) = self
                        .repository()
                        .get_individual_transfer(bulk_id, item.transfer_id)
                        .await?
                    {
                        match &item.error {
                            None => transfer.mark_transfer_success(item.payload.clone()),
                            Some(error) => transfer.mark_transfer_failed(error.clone()),
                        }
                        self.repository().set_individual_transfer(&transfer).await?;
                    }
                }
                self.repository()
                    .increment_success(bulk_id, CounterPhase::Transfers)
                    .await?;
            }
            BatchCallbackOutcome::Failure { error } => {
                batch.set_status(BatchStatus::TransfersFailed);
                self.fail_batch_members(bulk_id, &batch, error, |transfer, err| {
                    transfer.mark_transfer_failed(err)
                })
                .await?;
                self.repository()
                    .increment_failed(bulk_id, CounterPhase::Transfers)
                    .await?;
            }
        }
        self.repository().set_batch(&batch).await?;

        let counter = self
            .repository()
            .phase_counter(bulk_id, CounterPhase::Transfers)
            .await?;
        self.state_required_mut("apply transfers result")?
            .counters
            .transfers = counter;
        Ok(counter)
    }

    async fn require_batch(
        &self,
        bulk_id: BulkTransactionId,
        batch_id: BatchId,
    ) -> Result<BulkBatchState> {
        self.repository()
            .get_batch(bulk_id, batch_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity_type: "BulkBatch",
                id: batch_id.to_string(),
            })
    }

    async fn fail_batch_members(
        &self,
        bulk_id: BulkTransactionId,
        batch: &BulkBatchState,
        error: &TransferError,
        mark: impl Fn(&mut IndividualTransferState, TransferError),
    ) -> Result<()> {
        for transfer_id in &batch.transfer_ids {
            if let Some(mut transfer) = self
                .repository()
                .get_individual_transfer(bulk_id, *transfer_id)
                .await?
            {
                mark(&mut transfer, error.clone());
                self.repository().set_individual_transfer(&transfer).await?;
            }
        }
        Ok(())
    }

    // Batching (agreement fan-out)

    /// Allocates agreement batches from batchable transfers, fixes the quote
    /// total at one unit per batch, and marks transfers that should have
    /// been batchable but lack a destination FSP as failed.
    ///
    /// Must be called in the agreement phase.
    pub async fn create_batches(
        &mut self,
        max_items_per_batch: usize,
    ) -> Result<Vec<BulkBatchState>> {
        let state = self.state_required("create batches")?;
        if !matches!(
            state.current_phase,
            BulkTransactionPhase::AgreementProcessing
        ) {
            return Err(DomainError::InvalidPhaseTransition {
                phase: state.current_phase,
                action: "create batches",
            });
        }
        let bulk_id = state.id;

        let transfers = self.repository().load_individual_transfers(bulk_id).await?;
        let mut by_id: HashMap<TransferId, IndividualTransferState> = HashMap::new();
        let mut eligible = Vec::new();
        for mut transfer in transfers {
            if let Some(fsp) = transfer.destination_fsp().cloned().filter(|_| transfer.is_batchable()) {
                eligible.push((transfer.id, fsp));
                by_id.insert(transfer.id, transfer);
            } else if !transfer.status.is_failure() {
                // Reachable only when discovery was skipped and the request
                // carried no destination FSP.
                transfer.mark_agreement_failed(TransferError::new(
                    "3100",
                    "No destination FSP for transfer",
                ));
                self.repository().set_individual_transfer(&transfer).await?;
            }
        }

        let batches = allocate_batches(bulk_id, eligible, max_items_per_batch);
        for batch in &batches {
            self.repository().set_batch(batch).await?;
            for transfer_id in &batch.transfer_ids {
                if let Some(transfer) = by_id.get_mut(transfer_id) {
                    transfer.assign_batch(batch.id);
                    self.repository().set_individual_transfer(transfer).await?;
                }
            }
        }

        self.repository()
            .fix_total(bulk_id, CounterPhase::Quotes, batches.len() as i64)
            .await?;
        self.state_required_mut("create batches")?.counters.quotes.total = batches.len() as i64;

        Ok(batches)
    }

    /// Fixes the transfer total at transfer fan-out.
    pub async fn set_transfers_total(&mut self, total: i64) -> Result<()> {
        let bulk_id = self.state_required("set transfers total")?.id;
        self.repository()
            .fix_total(bulk_id, CounterPhase::Transfers, total)
            .await?;
        self.state_required_mut("set transfers total")?
            .counters
            .transfers
            .total = total;
        Ok(())
    }

    /// Returns the batches whose quotes completed, eligible for transfer
    /// fan-out.
    pub async fn quote_completed_batches(&self) -> Result<Vec<BulkBatchState>> {
        let bulk_id = self.state_required("load batches")?.id;
        let mut batches = Vec::new();
        for batch_id in self.repository().batch_ids(bulk_id).await? {
            if let Some(batch) = self.repository().get_batch(bulk_id, batch_id).await? {
                if batch.status == BatchStatus::QuotesCompleted {
                    batches.push(batch);
                }
            }
        }
        Ok(batches)
    }

    /// Marks a batch as dispatched for the given phase.
    pub async fn mark_batch_dispatched(
        &self,
        batch: &mut BulkBatchState,
        status: BatchStatus,
    ) -> Result<()> {
        batch.set_status(status);
        self.repository().set_batch(batch).await
    }

    // Phase transitions

    fn transition(
        &mut self,
        action: &'static str,
        allowed: impl Fn(BulkTransactionPhase) -> bool,
        to: BulkTransactionPhase,
    ) -> Result<()> {
        let state = self.state_required_mut(action)?;
        if !allowed(state.current_phase) {
            return Err(DomainError::InvalidPhaseTransition {
                phase: state.current_phase,
                action,
            });
        }
        tracing::info!(bulk_id = %state.id, from = %state.current_phase, to = %to, "bulk phase transition");
        state.current_phase = to;
        Ok(())
    }

    /// RECEIVED → DISCOVERY_PROCESSING.
    pub fn start_discovery(&mut self) -> Result<()> {
        self.transition(
            "start discovery",
            |p| p.can_start_discovery(),
            BulkTransactionPhase::DiscoveryProcessing,
        )
    }

    /// DISCOVERY_PROCESSING → DISCOVERY_COMPLETED.
    pub fn complete_discovery(&mut self) -> Result<()> {
        self.transition(
            "complete discovery",
            |p| p.can_complete_discovery(),
            BulkTransactionPhase::DiscoveryCompleted,
        )
    }

    /// DISCOVERY_COMPLETED → AGREEMENT_PROCESSING.
    pub fn start_agreement(&mut self) -> Result<()> {
        self.transition(
            "start agreement",
            |p| p.can_start_agreement(),
            BulkTransactionPhase::AgreementProcessing,
        )
    }

    /// DISCOVERY_COMPLETED → COMPLETED, for validate-only bulks.
    pub fn complete_validation(&mut self) -> Result<()> {
        self.transition(
            "complete validation",
            |p| p.can_start_agreement(),
            BulkTransactionPhase::Completed,
        )
    }

    /// AGREEMENT_PROCESSING → AGREEMENT_COMPLETED.
    pub fn complete_agreement(&mut self) -> Result<()> {
        self.transition(
            "complete agreement",
            |p| p.can_complete_agreement(),
            BulkTransactionPhase::AgreementCompleted,
        )
    }

    /// AGREEMENT_COMPLETED → TRANSFERS_PROCESSING.
    pub fn start_transfers(&mut self) -> Result<()> {
        self.transition(
            "start transfers",
            |p| p.can_start_transfers(),
            BulkTransactionPhase::TransfersProcessing,
        )
    }

    /// TRANSFERS_PROCESSING → COMPLETED.
    pub fn complete(&mut self) -> Result<()> {
        self.transition(
            "complete",
            |p| p.can_complete(),
            BulkTransactionPhase::Completed,
        )
    }

    /// Any non-terminal phase → ERROR. Aborts the bulk without touching
    /// per-item state.
    pub fn fail(&mut self) -> Result<()> {
        self.transition("fail", |p| p.can_fail(), BulkTransactionPhase::Error)
    }

    // Outcome & cleanup

    /// Builds the reassembled bulk outcome from the root and its transfers.
    pub async fn summary(&self) -> Result<BulkTransactionSummary> {
        let state = self.state_required("summarize")?;
        let transfers = self.repository().load_individual_transfers(state.id).await?;
        Ok(BulkTransactionSummary {
            bulk_id: state.id,
            bulk_home_transaction_id: state.bulk_home_transaction_id.clone(),
            current_phase: state.current_phase,
            counters: state.counters,
            individual_results: transfers.iter().map(IndividualTransferOutcome::from).collect(),
        })
    }

    /// Removes every sub-entity, counter, and membership set owned by this
    /// bulk. The root stays until [`destroy`](Self::destroy).
    pub async fn purge(&self) -> Result<()> {
        let bulk_id = self.state_required("purge")?.id;
        self.repository().purge(bulk_id).await
    }

    /// Removes the root entity and resets in-memory state.
    pub async fn destroy(&mut self) -> Result<()> {
        self.root.destroy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::commands::BatchItemResult;
    use crate::bulk::request::{
        BulkTransactionOptions, IndividualTransferRequest, PartyIdInfo,
    };
    use crate::bulk::transfer_state::IndividualTransferStatus;
    use common::{Currency, FspId, Money};
    use serde_json::json;
    use state_store::InMemoryStateStore;

    fn make_request(
        skip_party_lookup: bool,
        payees: &[(&str, Option<&str>)],
    ) -> BulkTransferRequest {
        let transfers = payees
            .iter()
            .enumerate()
            .map(|(i, (id_value, fsp))| {
                let payee = match fsp {
                    Some(fsp) => PartyIdInfo::with_fsp("MSISDN", *id_value, *fsp),
                    None => PartyIdInfo::new("MSISDN", *id_value),
                };
                IndividualTransferRequest::new(
                    format!("home-{i}"),
                    payee,
                    Money::from_minor_units(100),
                    Currency::new("USD"),
                )
            })
            .collect();

        BulkTransferRequest::new(
            "home-bulk-1",
            BulkTransactionOptions {
                skip_party_lookup,
                ..Default::default()
            },
            transfers,
        )
    }

    async fn created_aggregate(
        store: InMemoryStateStore,
        request: &BulkTransferRequest,
    ) -> BulkTransactionAggregate<InMemoryStateStore> {
        let mut agg = BulkTransactionAggregate::new(store);
        assert_eq!(
            agg.create_from_request(request).await.unwrap(),
            CreateOutcome::Created
        );
        for item in &request.individual_transfers {
            let transfer =
                IndividualTransferState::from_request(request.bulk_transaction_id, item);
            agg.add_individual_transfer(&transfer).await.unwrap();
        }
        agg
    }

    #[tokio::test]
    async fn duplicate_create_records_event_and_builds_nothing() {
        let store = InMemoryStateStore::new();
        let request = make_request(false, &[("27710000001", None)]);

        let mut first = BulkTransactionAggregate::new(store.clone());
        first.create_from_request(&request).await.unwrap();
        first.store().await.unwrap();

        let mut second = BulkTransactionAggregate::new(store);
        let outcome = second.create_from_request(&request).await.unwrap();

        assert_eq!(outcome, CreateOutcome::Duplicate);
        assert!(second.state().is_none());
        let events = second.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BulkDomainEvent::DuplicateDetected(_)));
    }

    #[tokio::test]
    async fn create_from_repo_missing_fails() {
        let mut agg = BulkTransactionAggregate::new(InMemoryStateStore::new());
        let result = agg.create_from_repo(BulkTransactionId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn party_lookup_results_drive_counters_to_completion() {
        let store = InMemoryStateStore::new();
        let request = make_request(false, &[("27710000001", None), ("27710000002", None)]);
        let mut agg = created_aggregate(store, &request).await;

        agg.start_discovery().unwrap();
        agg.set_party_lookup_total(2).await.unwrap();

        let transfers = agg.individual_transfers().await.unwrap();

        let progress = agg
            .apply_party_lookup_result(
                transfers[0].id,
                &PartyLookupOutcome::Success {
                    party: json!({"displayName": "A"}),
                    fsp_id: Some(FspId::new("fsp-a")),
                },
            )
            .await
            .unwrap();
        assert_eq!(progress.success, 1);
        assert!(!progress.is_complete());

        let progress = agg
            .apply_party_lookup_result(
                transfers[1].id,
                &PartyLookupOutcome::Failure {
                    error: TransferError::new("3204", "Party not found"),
                },
            )
            .await
            .unwrap();
        assert_eq!(progress.failed, 1);
        assert!(progress.is_complete());

        agg.complete_discovery().unwrap();
        assert_eq!(
            agg.state().unwrap().current_phase,
            BulkTransactionPhase::DiscoveryCompleted
        );

        // Sub-entity statuses reflect the per-item outcomes.
        let reloaded = agg.individual_transfers().await.unwrap();
        let statuses: Vec<IndividualTransferStatus> =
            reloaded.iter().map(|t| t.status).collect();
        assert!(statuses.contains(&IndividualTransferStatus::DiscoverySuccess));
        assert!(statuses.contains(&IndividualTransferStatus::DiscoveryFailed));
    }

    #[tokio::test]
    async fn party_lookup_result_outside_discovery_phase_is_rejected() {
        let store = InMemoryStateStore::new();
        let request = make_request(false, &[("27710000001", None)]);
        let mut agg = created_aggregate(store, &request).await;
        let transfers = agg.individual_transfers().await.unwrap();

        // Still in RECEIVED.
        let result = agg
            .apply_party_lookup_result(
                transfers[0].id,
                &PartyLookupOutcome::Failure {
                    error: TransferError::new("3204", "Party not found"),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(DomainError::InvalidPhaseTransition { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_phase_transition_is_rejected_and_phase_unchanged() {
        let store = InMemoryStateStore::new();
        let request = make_request(false, &[("27710000001", None)]);
        let mut agg = created_aggregate(store, &request).await;

        let result = agg.complete();
        assert!(matches!(
            result,
            Err(DomainError::InvalidPhaseTransition { .. })
        ));
        assert_eq!(
            agg.state().unwrap().current_phase,
            BulkTransactionPhase::Received
        );
    }

    #[tokio::test]
    async fn skip_party_lookup_creates_in_agreement_with_zero_total() {
        let store = InMemoryStateStore::new();
        let request = make_request(true, &[("27710000001", Some("fsp-a"))]);
        let mut agg = created_aggregate(store, &request).await;
        agg.set_party_lookup_total(0).await.unwrap();

        let state = agg.state().unwrap();
        assert_eq!(
            state.current_phase,
            BulkTransactionPhase::AgreementProcessing
        );
        assert_eq!(state.counters.party_lookup.total, 0);
        assert!(state.counters.party_lookup.is_complete());
    }

    #[tokio::test]
    async fn create_batches_groups_and_fails_unroutable_transfers() {
        let store = InMemoryStateStore::new();
        let request = make_request(
            true,
            &[
                ("27710000001", Some("fsp-a")),
                ("27710000002", Some("fsp-a")),
                ("27710000003", Some("fsp-b")),
                ("27710000004", None),
            ],
        );
        let mut agg = created_aggregate(store, &request).await;

        let batches = agg.create_batches(100).await.unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(agg.state().unwrap().counters.quotes.total, 2);

        let transfers = agg.individual_transfers().await.unwrap();
        let unroutable = transfers
            .iter()
            .find(|t| t.payee.id_value == "27710000004")
            .unwrap();
        assert_eq!(unroutable.status, IndividualTransferStatus::AgreementFailed);
        assert!(unroutable.batch_id.is_none());

        let batched = transfers
            .iter()
            .filter(|t| t.batch_id.is_some())
            .count();
        assert_eq!(batched, 3);
    }

    #[tokio::test]
    async fn quotes_results_update_batch_and_members() {
        let store = InMemoryStateStore::new();
        let request = make_request(
            true,
            &[("27710000001", Some("fsp-a")), ("27710000002", Some("fsp-a"))],
        );
        let mut agg = created_aggregate(store, &request).await;
        let batches = agg.create_batches(100).await.unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];

        let items = batch
            .transfer_ids
            .iter()
            .map(|id| BatchItemResult::success(*id, Some(json!({"quote": "ok"}))))
            .collect();
        let progress = agg
            .apply_quotes_result(
                batch.id,
                &BatchCallbackOutcome::Success {
                    payload: Some(json!({"bulkQuoteId": "q-1"})),
                    items,
                },
            )
            .await
            .unwrap();

        assert_eq!(progress.success, 1);
        assert!(progress.is_complete());

        let stored_batch = agg
            .repository()
            .get_batch(request.bulk_transaction_id, batch.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_batch.status, BatchStatus::QuotesCompleted);

        let transfers = agg.individual_transfers().await.unwrap();
        assert!(transfers
            .iter()
            .all(|t| t.status == IndividualTransferStatus::AgreementSuccess));
    }

    #[tokio::test]
    async fn batch_failure_fails_every_member() {
        let store = InMemoryStateStore::new();
        let request = make_request(
            true,
            &[("27710000001", Some("fsp-a")), ("27710000002", Some("fsp-a"))],
        );
        let mut agg = created_aggregate(store, &request).await;
        let batches = agg.create_batches(100).await.unwrap();

        let progress = agg
            .apply_quotes_result(
                batches[0].id,
                &BatchCallbackOutcome::Failure {
                    error: TransferError::from_http_status(504),
                },
            )
            .await
            .unwrap();

        assert_eq!(progress.failed, 1);

        let transfers = agg.individual_transfers().await.unwrap();
        assert!(transfers
            .iter()
            .all(|t| t.status == IndividualTransferStatus::AgreementFailed));
        assert!(transfers.iter().all(|t| t.last_error.is_some()));
    }

    #[tokio::test]
    async fn summary_reports_per_item_outcomes() {
        let store = InMemoryStateStore::new();
        let request = make_request(true, &[("27710000001", Some("fsp-a"))]);
        let agg = created_aggregate(store, &request).await;

        let summary = agg.summary().await.unwrap();
        assert_eq!(summary.bulk_id, request.bulk_transaction_id);
        assert_eq!(summary.bulk_home_transaction_id, "home-bulk-1");
        assert_eq!(summary.individual_results.len(), 1);
        assert_eq!(summary.individual_results[0].home_transaction_id, "home-0");
    }

    #[tokio::test]
    async fn destroy_and_purge_remove_all_keys() {
        let store = InMemoryStateStore::new();
        let request = make_request(true, &[("27710000001", Some("fsp-a"))]);
        let mut agg = created_aggregate(store.clone(), &request).await;
        agg.store().await.unwrap();
        agg.create_batches(100).await.unwrap();

        agg.purge().await.unwrap();
        agg.destroy().await.unwrap();

        assert!(agg.state().is_none());
        assert!(!store
            .exists(&root_key(request.bulk_transaction_id))
            .await
            .unwrap());
        assert_eq!(
            agg.repository()
                .individual_transfer_ids(request.bulk_transaction_id)
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn fail_reaches_error_from_any_non_terminal_phase() {
        let store = InMemoryStateStore::new();
        let request = make_request(false, &[("27710000001", None)]);
        let mut agg = created_aggregate(store, &request).await;

        agg.start_discovery().unwrap();
        agg.fail().unwrap();
        assert_eq!(
            agg.state().unwrap().current_phase,
            BulkTransactionPhase::Error
        );

        // Terminal phases cannot fail again.
        assert!(matches!(
            agg.fail(),
            Err(DomainError::InvalidPhaseTransition { .. })
        ));
    }
}
