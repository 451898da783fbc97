//! Phase orchestrator.
//!
//! Stateless per-message handling: each command hydrates a fresh aggregate,
//! mutates state, stores the root at most once, and then publishes the
//! recorded domain events in order. Fan-in is counter comparison — the
//! handler that observes the post-increment sum reach the phase total is
//! the one that advances the bulk — which keeps the design tolerant of
//! out-of-order and concurrently delivered per-item results.
//!
//! Handlers are idempotent with respect to at-least-once redelivery except
//! for exact replay of a per-item callback, which re-runs its counter
//! increment; de-duplication of exact redeliveries belongs upstream in the
//! transport.

use common::BulkTransactionId;
use domain::{
    BatchCallbackData, BatchStatus, BulkCommand, BulkDomainEvent, BulkTransactionAggregate,
    BulkTransferRequest, CleanupData, CreateOutcome, IndividualTransferState,
    PartyInfoCallbackData,
};
use state_store::StateStore;

use crate::bus::MessageBus;
use crate::config::SagaConfig;
use crate::envelope::{Message, MessageEnvelope};
use crate::error::{OrchestratorError, Result};

/// Drives bulk transactions through discovery, agreement, and transfer
/// phases.
pub struct Orchestrator<C, B>
where
    C: StateStore + Clone,
    B: MessageBus,
{
    store: C,
    bus: B,
    config: SagaConfig,
}

impl<C, B> Orchestrator<C, B>
where
    C: StateStore + Clone,
    B: MessageBus,
{
    /// Creates an orchestrator over the given store and bus.
    pub fn new(store: C, bus: B, config: SagaConfig) -> Self {
        Self { store, bus, config }
    }

    fn aggregate(&self) -> BulkTransactionAggregate<C> {
        BulkTransactionAggregate::new(self.store.clone())
    }

    /// Handles one inbound envelope.
    ///
    /// Commands are dispatched to their handlers; events are facts for
    /// downstream consumers and are not processed here.
    #[tracing::instrument(skip_all, fields(name = envelope.name(), key = %envelope.key))]
    pub async fn handle(&self, envelope: MessageEnvelope) -> Result<()> {
        let result = match envelope.payload {
            Message::Command(command) => self.process_command(command).await,
            Message::Event(_) => {
                tracing::debug!("event envelope ignored by orchestrator");
                Ok(())
            }
        };
        if let Err(err) = &result {
            metrics::counter!("bulk_command_failures_total").increment(1);
            tracing::warn!(error = %err, "message handling failed");
        }
        result
    }

    async fn process_command(&self, command: BulkCommand) -> Result<()> {
        metrics::counter!("bulk_commands_total").increment(1);
        match command {
            BulkCommand::ProcessBulkRequest(request) => self.handle_bulk_request(request).await,
            BulkCommand::ProcessPartyInfoCallback(data) => {
                self.handle_party_info_callback(data).await
            }
            BulkCommand::ProcessBulkQuotesCallback(data) => {
                self.handle_bulk_quotes_callback(data).await
            }
            BulkCommand::ProcessBulkTransfersCallback(data) => {
                self.handle_bulk_transfers_callback(data).await
            }
            BulkCommand::CleanupBulkTransaction(data) => self.handle_cleanup(data).await,
        }
    }

    /// Accepts a bulk request: creates the root and its sub-entities, then
    /// fans out the first phase. A duplicate id publishes only a
    /// `DuplicateDetected` event and performs zero store calls.
    async fn handle_bulk_request(&self, request: BulkTransferRequest) -> Result<()> {
        if request.individual_transfers.is_empty() {
            return Err(OrchestratorError::MalformedMessage {
                reason: "bulk request carries no individual transfers".to_string(),
            });
        }
        metrics::counter!("bulk_requests_total").increment(1);

        let mut agg = self.aggregate();
        match agg.create_from_request(&request).await? {
            CreateOutcome::Duplicate => {
                metrics::counter!("bulk_duplicates_total").increment(1);
                self.publish_events(agg.take_events()).await
            }
            CreateOutcome::Created => {
                let mut transfers = Vec::with_capacity(request.individual_transfers.len());
                for item in &request.individual_transfers {
                    let transfer =
                        IndividualTransferState::from_request(request.bulk_transaction_id, item);
                    agg.add_individual_transfer(&transfer).await?;
                    transfers.push(transfer);
                }

                if request.options.skip_party_lookup {
                    agg.set_party_lookup_total(0).await?;
                    self.begin_agreement(&mut agg).await?;
                } else {
                    agg.start_discovery()?;
                    agg.set_party_lookup_total(transfers.len() as i64).await?;
                    for transfer in &transfers {
                        agg.record_event(BulkDomainEvent::party_info_requested(
                            transfer.bulk_id,
                            transfer.id,
                            transfer.payee.clone(),
                        ));
                    }
                }

                agg.store().await?;
                self.publish_events(agg.take_events()).await
            }
        }
    }

    /// Applies one party lookup result. The callback that completes the
    /// discovery counters advances the bulk and fans out the agreement
    /// phase.
    async fn handle_party_info_callback(&self, data: PartyInfoCallbackData) -> Result<()> {
        let mut agg = self.aggregate();
        agg.create_from_repo(data.bulk_id).await?;

        let progress = agg
            .apply_party_lookup_result(data.transfer_id, &data.outcome)
            .await?;
        if !progress.is_complete() {
            // Sub-entity and counters are already persisted; the root stays
            // untouched until the phase advances.
            return Ok(());
        }

        metrics::counter!("phase_completions_total", "phase" => "discovery").increment(1);
        agg.complete_discovery()?;
        agg.record_event(BulkDomainEvent::discovery_completed(data.bulk_id, progress));

        let validate_only = agg
            .state()
            .is_some_and(|state| state.options.only_validate_party);
        if validate_only {
            agg.complete_validation()?;
            self.record_completion(&mut agg).await?;
        } else {
            agg.start_agreement()?;
            self.begin_agreement(&mut agg).await?;
        }

        agg.store().await?;
        self.publish_events(agg.take_events()).await
    }

    /// Applies one batch quote result. The callback that completes the
    /// quote counters advances the bulk and fans out the transfer phase.
    async fn handle_bulk_quotes_callback(&self, data: BatchCallbackData) -> Result<()> {
        let mut agg = self.aggregate();
        agg.create_from_repo(data.bulk_id).await?;

        let progress = agg.apply_quotes_result(data.batch_id, &data.outcome).await?;
        if !progress.is_complete() {
            return Ok(());
        }

        metrics::counter!("phase_completions_total", "phase" => "agreement").increment(1);
        agg.complete_agreement()?;
        agg.record_event(BulkDomainEvent::agreement_completed(data.bulk_id, progress));

        agg.start_transfers()?;
        let batches = agg.quote_completed_batches().await?;
        agg.set_transfers_total(batches.len() as i64).await?;
        if batches.is_empty() {
            // Every batch failed its quote; the zero-total transfer phase
            // completes trivially.
            agg.complete()?;
            self.record_completion(&mut agg).await?;
        } else {
            for mut batch in batches {
                agg.mark_batch_dispatched(&mut batch, BatchStatus::TransfersRequested)
                    .await?;
                agg.record_event(BulkDomainEvent::bulk_transfers_requested(&batch));
            }
        }

        agg.store().await?;
        self.publish_events(agg.take_events()).await
    }

    /// Applies one batch transfer result. The callback that completes the
    /// transfer counters completes the bulk and publishes the reassembled
    /// outcome.
    async fn handle_bulk_transfers_callback(&self, data: BatchCallbackData) -> Result<()> {
        let mut agg = self.aggregate();
        agg.create_from_repo(data.bulk_id).await?;

        let progress = agg
            .apply_transfers_result(data.batch_id, &data.outcome)
            .await?;
        if !progress.is_complete() {
            return Ok(());
        }

        metrics::counter!("phase_completions_total", "phase" => "transfers").increment(1);
        agg.complete()?;
        self.record_completion(&mut agg).await?;

        agg.store().await?;
        self.publish_events(agg.take_events()).await
    }

    /// Removes all state for a terminal bulk: sub-entities, counters and
    /// sets first, the root last.
    async fn handle_cleanup(&self, data: CleanupData) -> Result<()> {
        let mut agg = self.aggregate();
        agg.create_from_repo(data.bulk_id).await?;

        let terminal = agg.state().is_some_and(|state| state.is_terminal());
        if !terminal {
            return Err(OrchestratorError::MalformedMessage {
                reason: format!("cleanup requested before terminal phase for {}", data.bulk_id),
            });
        }

        agg.purge().await?;
        agg.destroy().await?;
        tracing::info!(bulk_id = %data.bulk_id, "bulk transaction cleaned up");
        Ok(())
    }

    /// Aborts a bulk after an aggregate-level fault: moves it to the error
    /// phase and publishes `BulkTransactionFailed`. Per-item state is left
    /// untouched.
    pub async fn abort_bulk(
        &self,
        bulk_id: BulkTransactionId,
        reason: impl Into<String>,
    ) -> Result<()> {
        let reason = reason.into();
        let mut agg = self.aggregate();
        agg.create_from_repo(bulk_id).await?;
        agg.fail()?;
        agg.record_event(BulkDomainEvent::bulk_transaction_failed(bulk_id, reason.clone()));
        agg.store().await?;

        metrics::counter!("bulk_aborts_total").increment(1);
        tracing::warn!(%bulk_id, %reason, "bulk transaction aborted");
        self.publish_events(agg.take_events()).await
    }

    /// Fans out the agreement phase from the agreement-processing state:
    /// allocates batches, fixes the quote total, and dispatches one bulk
    /// quote per batch. With nothing batchable the remaining zero-total
    /// phases complete trivially and the bulk finishes here.
    async fn begin_agreement(&self, agg: &mut BulkTransactionAggregate<C>) -> Result<()> {
        let batches = agg.create_batches(self.config.max_items_per_batch).await?;
        if batches.is_empty() {
            agg.complete_agreement()?;
            agg.start_transfers()?;
            agg.set_transfers_total(0).await?;
            agg.complete()?;
            self.record_completion(agg).await?;
        } else {
            for mut batch in batches {
                agg.mark_batch_dispatched(&mut batch, BatchStatus::QuotesRequested)
                    .await?;
                agg.record_event(BulkDomainEvent::bulk_quotes_requested(&batch));
            }
        }
        Ok(())
    }

    async fn record_completion(&self, agg: &mut BulkTransactionAggregate<C>) -> Result<()> {
        agg.refresh_counters().await?;
        let summary = agg.summary().await?;
        metrics::counter!("bulk_completions_total").increment(1);
        tracing::info!(bulk_id = %summary.bulk_id, phase = %summary.current_phase, "bulk transaction finished");
        agg.record_event(BulkDomainEvent::bulk_transaction_completed(summary));
        Ok(())
    }

    async fn publish_events(&self, events: Vec<BulkDomainEvent>) -> Result<()> {
        let envelopes: Vec<MessageEnvelope> =
            events.into_iter().map(MessageEnvelope::event).collect();
        self.bus.publish_all(envelopes).await?;
        Ok(())
    }
}
