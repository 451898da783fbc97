//! Outbound transfer state machine.

use common::TransferId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use state_store::StateStore;

use crate::bulk::TransferError;
use crate::fsm::{
    ERROR_TRANSITION, MachineData, PersistentStateMachine, Result, StateMachineSpec,
    TransitionSpec,
};

/// Lifecycle states of one outbound transfer.
pub mod states {
    pub const START: &str = "start";
    pub const PAYEE_RESOLVED: &str = "payeeResolved";
    pub const QUOTE_RECEIVED: &str = "quoteReceived";
    pub const SUCCEEDED: &str = "succeeded";
    pub const ERRORED: &str = "errored";
}

const RESOLVE_PAYEE: &str = "resolvePayee";
const REQUEST_QUOTE: &str = "requestQuote";
const EXECUTE_TRANSFER: &str = "executeTransfer";

fn transfer_key(transfer_id: TransferId) -> String {
    format!("outboundTransfer:{transfer_id}")
}

fn lifecycle_spec() -> StateMachineSpec {
    StateMachineSpec {
        init: states::START,
        error_state: states::ERRORED,
        transitions: vec![
            TransitionSpec {
                name: RESOLVE_PAYEE,
                from: &[states::START],
                to: states::PAYEE_RESOLVED,
            },
            TransitionSpec {
                name: REQUEST_QUOTE,
                from: &[states::PAYEE_RESOLVED],
                to: states::QUOTE_RECEIVED,
            },
            TransitionSpec {
                name: EXECUTE_TRANSFER,
                from: &[states::QUOTE_RECEIVED],
                to: states::SUCCEEDED,
            },
        ],
    }
}

/// Persisted document for one outbound transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundTransferData {
    pub transfer_id: TransferId,
    pub current_state: String,

    /// Opaque party payload from discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<Value>,

    /// Opaque quote payload from agreement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Value>,

    /// Opaque fulfilment payload from execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfilment: Option<Value>,

    /// Last error reported for this transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TransferError>,
}

impl OutboundTransferData {
    /// Creates an empty document for a new transfer.
    pub fn new(transfer_id: TransferId) -> Self {
        Self {
            transfer_id,
            current_state: String::new(),
            party: None,
            quote: None,
            fulfilment: None,
            last_error: None,
        }
    }
}

impl MachineData for OutboundTransferData {
    fn current_state(&self) -> &str {
        &self.current_state
    }

    fn set_current_state(&mut self, state: &str) {
        self.current_state = state.to_string();
    }
}

/// Named-transition wrapper driving one outbound transfer through its
/// party/quote/transfer lifecycle, persisting after every transition.
pub struct OutboundTransferMachine<C: StateStore> {
    machine: PersistentStateMachine<OutboundTransferData, C>,
}

impl<C: StateStore> OutboundTransferMachine<C> {
    /// Creates a machine for a new transfer at the start state.
    pub fn create(transfer_id: TransferId, store: C) -> Self {
        Self {
            machine: PersistentStateMachine::create(
                OutboundTransferData::new(transfer_id),
                store,
                transfer_key(transfer_id),
                lifecycle_spec(),
            ),
        }
    }

    /// Rehydrates a machine from the cache; fails when nothing is persisted
    /// for the transfer.
    pub async fn load(transfer_id: TransferId, store: C) -> Result<Self> {
        let machine = PersistentStateMachine::load_from_cache(
            store,
            transfer_key(transfer_id),
            lifecycle_spec(),
        )
        .await?;
        Ok(Self { machine })
    }

    /// Records the resolved payee and advances to `payeeResolved`.
    pub async fn resolve_payee(&mut self, party: Value) -> Result<()> {
        self.machine.data_mut().party = Some(party);
        self.machine.transition(RESOLVE_PAYEE).await
    }

    /// Records the agreed quote and advances to `quoteReceived`.
    pub async fn request_quote(&mut self, quote: Value) -> Result<()> {
        self.machine.data_mut().quote = Some(quote);
        self.machine.transition(REQUEST_QUOTE).await
    }

    /// Records the fulfilment and advances to `succeeded`.
    pub async fn execute_transfer(&mut self, fulfilment: Value) -> Result<()> {
        self.machine.data_mut().fulfilment = Some(fulfilment);
        self.machine.transition(EXECUTE_TRANSFER).await
    }

    /// Records the error and short-circuits to `errored`, regardless of any
    /// in-flight transition.
    pub async fn fail(&mut self, error: TransferError) -> Result<()> {
        self.machine.data_mut().last_error = Some(error);
        self.machine.transition(ERROR_TRANSITION).await
    }

    /// Returns the current lifecycle state name.
    pub fn current_state(&self) -> &str {
        self.machine.current_state()
    }

    /// Returns the transfer document.
    pub fn data(&self) -> &OutboundTransferData {
        self.machine.data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::StateMachineError;
    use serde_json::json;
    use state_store::InMemoryStateStore;

    #[tokio::test]
    async fn happy_path_walks_the_full_lifecycle() {
        let store = InMemoryStateStore::new();
        let transfer_id = TransferId::new();
        let mut machine = OutboundTransferMachine::create(transfer_id, store.clone());
        assert_eq!(machine.current_state(), states::START);

        machine
            .resolve_payee(json!({"displayName": "A Payee"}))
            .await
            .unwrap();
        assert_eq!(machine.current_state(), states::PAYEE_RESOLVED);

        machine
            .request_quote(json!({"transferAmount": "15.00"}))
            .await
            .unwrap();
        assert_eq!(machine.current_state(), states::QUOTE_RECEIVED);

        machine
            .execute_transfer(json!({"fulfilment": "abc"}))
            .await
            .unwrap();
        assert_eq!(machine.current_state(), states::SUCCEEDED);

        // Every payload was persisted along the way.
        let persisted = store
            .get(&transfer_key(transfer_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted["current_state"], states::SUCCEEDED);
        assert!(persisted["party"].is_object());
        assert!(persisted["quote"].is_object());
        assert!(persisted["fulfilment"].is_object());
    }

    #[tokio::test]
    async fn out_of_order_transition_is_rejected() {
        let mut machine =
            OutboundTransferMachine::create(TransferId::new(), InMemoryStateStore::new());

        let result = machine.request_quote(json!({})).await;
        assert!(matches!(
            result,
            Err(StateMachineError::InvalidTransition { .. })
        ));
        assert_eq!(machine.current_state(), states::START);
    }

    #[tokio::test]
    async fn fail_short_circuits_from_any_state() {
        let store = InMemoryStateStore::new();
        let transfer_id = TransferId::new();
        let mut machine = OutboundTransferMachine::create(transfer_id, store.clone());
        machine.resolve_payee(json!({})).await.unwrap();

        machine
            .fail(TransferError::new("2001", "Internal server error"))
            .await
            .unwrap();

        assert_eq!(machine.current_state(), states::ERRORED);
        assert_eq!(
            machine.data().last_error.as_ref().unwrap().code.as_deref(),
            Some("2001")
        );
    }

    #[tokio::test]
    async fn load_resumes_where_the_transfer_left_off() {
        let store = InMemoryStateStore::new();
        let transfer_id = TransferId::new();

        let mut machine = OutboundTransferMachine::create(transfer_id, store.clone());
        machine.resolve_payee(json!({"id": 1})).await.unwrap();
        drop(machine);

        let mut resumed = OutboundTransferMachine::load(transfer_id, store)
            .await
            .unwrap();
        assert_eq!(resumed.current_state(), states::PAYEE_RESOLVED);

        resumed.request_quote(json!({"quote": 1})).await.unwrap();
        assert_eq!(resumed.current_state(), states::QUOTE_RECEIVED);
    }

    #[tokio::test]
    async fn load_unknown_transfer_fails() {
        let result =
            OutboundTransferMachine::load(TransferId::new(), InMemoryStateStore::new()).await;
        assert!(matches!(result, Err(StateMachineError::NotFound { .. })));
    }
}
