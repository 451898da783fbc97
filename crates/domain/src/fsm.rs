//! Generic cache-backed finite-state machine.
//!
//! Binds a state-machine definition to one cache key: every successful
//! transition writes the new state name into the machine's data document and
//! persists the whole document under the key. Used for the single outbound
//! transfer lifecycle; the bulk phase lifecycle expresses the same idea as a
//! typed phase enum.

use serde::Serialize;
use serde::de::DeserializeOwned;
use state_store::{StateStore, StateStoreError};
use thiserror::Error;

/// Name of the universal error transition, accepted from any state even
/// while another transition is pending.
pub const ERROR_TRANSITION: &str = "error";

/// Wildcard source state: a transition with this in its `from` list fires
/// from any state.
pub const ANY_STATE: &str = "*";

/// Errors produced by the persistent state machine.
#[derive(Debug, Error)]
pub enum StateMachineError {
    /// No persisted data exists under the machine's cache key.
    #[error("No cached data found for: {key}")]
    NotFound { key: String },

    /// The transition is not defined, or not legal from the current state.
    #[error("Invalid transition: cannot {transition} from state {state}")]
    InvalidTransition { transition: String, state: String },

    /// A transition was requested while a previous transition on this
    /// instance has not settled.
    #[error("Transition {transition} rejected: a previous transition is still pending")]
    PendingTransition { transition: String },

    /// The backing store failed. The in-memory state is still considered
    /// transitioned; only persistence is outstanding.
    #[error("State store error: {0}")]
    Store(#[from] StateStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for state machine operations.
pub type Result<T> = std::result::Result<T, StateMachineError>;

/// Trait for the data document a machine persists.
///
/// The document carries its own current state name so that a machine can be
/// rehydrated from the cache alone.
pub trait MachineData: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn current_state(&self) -> &str;
    fn set_current_state(&mut self, state: &str);
}

/// One named transition in a machine definition.
#[derive(Debug, Clone)]
pub struct TransitionSpec {
    /// Transition name, invoked via [`PersistentStateMachine::transition`].
    pub name: &'static str,
    /// Legal source states; [`ANY_STATE`] matches every state.
    pub from: &'static [&'static str],
    /// Target state.
    pub to: &'static str,
}

/// A state-machine definition: initial state, error state, transitions.
#[derive(Debug, Clone)]
pub struct StateMachineSpec {
    /// State a freshly created machine starts in.
    pub init: &'static str,
    /// Target of the universal `error` transition.
    pub error_state: &'static str,
    pub transitions: Vec<TransitionSpec>,
}

impl Default for StateMachineSpec {
    fn default() -> Self {
        Self {
            init: "none",
            error_state: "errored",
            transitions: Vec::new(),
        }
    }
}

impl StateMachineSpec {
    /// Creates a spec with the given initial state and transitions, keeping
    /// the default error state.
    pub fn new(init: &'static str, transitions: Vec<TransitionSpec>) -> Self {
        Self {
            init,
            transitions,
            ..Self::default()
        }
    }

    fn find(&self, name: &str) -> Option<&TransitionSpec> {
        self.transitions.iter().find(|t| t.name == name)
    }
}

/// A finite-state machine bound to one cache key.
///
/// Every transition persists the full data document; a persistence failure
/// propagates to the caller while the in-memory state remains transitioned.
/// The pending-transition guard is an in-process, single-instance safeguard
/// against reentrant or abandoned transition calls — it provides no
/// cross-process exclusion.
pub struct PersistentStateMachine<D, C>
where
    D: MachineData,
    C: StateStore,
{
    data: D,
    store: C,
    key: String,
    spec: StateMachineSpec,
    pending: bool,
}

impl<D, C> PersistentStateMachine<D, C>
where
    D: MachineData,
    C: StateStore,
{
    /// Builds a machine at the spec's initial state.
    ///
    /// The initial state is written into the data document but not yet
    /// persisted; the first transition (or an explicit
    /// [`save_to_cache`](Self::save_to_cache)) performs the first write.
    pub fn create(mut data: D, store: C, key: impl Into<String>, spec: StateMachineSpec) -> Self {
        data.set_current_state(spec.init);
        Self {
            data,
            store,
            key: key.into(),
            spec,
            pending: false,
        }
    }

    /// Rehydrates a machine from the cache.
    ///
    /// Fails with [`StateMachineError::NotFound`] when nothing is persisted
    /// under `key`; otherwise the machine resumes at the persisted data's
    /// current state.
    pub async fn load_from_cache(
        store: C,
        key: impl Into<String>,
        spec: StateMachineSpec,
    ) -> Result<Self> {
        let key = key.into();
        let value = store
            .get(&key)
            .await?
            .ok_or_else(|| StateMachineError::NotFound { key: key.clone() })?;
        let data: D = serde_json::from_value(value)?;
        Ok(Self {
            data,
            store,
            key,
            spec,
            pending: false,
        })
    }

    /// Returns the current state name.
    pub fn current_state(&self) -> &str {
        self.data.current_state()
    }

    /// Returns the machine's cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the data document.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Returns the data document mutably.
    ///
    /// Mutations are persisted together with the next transition (or an
    /// explicit save).
    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    /// Fires the named transition and persists the data document.
    ///
    /// Rules:
    /// - a transition requested while a previous one is unsettled fails with
    ///   [`StateMachineError::PendingTransition`], unless it is the
    ///   universal [`ERROR_TRANSITION`], which is always accepted;
    /// - a transition absent from the spec, or not legal from the current
    ///   state, fails with [`StateMachineError::InvalidTransition`] and the
    ///   state is unchanged;
    /// - a store failure propagates, but the in-memory state has already
    ///   advanced to the target state.
    pub async fn transition(&mut self, name: &str) -> Result<()> {
        if self.pending && name != ERROR_TRANSITION {
            return Err(StateMachineError::PendingTransition {
                transition: name.to_string(),
            });
        }

        let target = if name == ERROR_TRANSITION {
            self.spec.error_state
        } else {
            let current = self.data.current_state();
            match self.spec.find(name) {
                Some(spec)
                    if spec
                        .from
                        .iter()
                        .any(|from| *from == current || *from == ANY_STATE) =>
                {
                    spec.to
                }
                _ => {
                    return Err(StateMachineError::InvalidTransition {
                        transition: name.to_string(),
                        state: current.to_string(),
                    });
                }
            }
        };

        self.pending = true;
        let from = self.data.current_state().to_string();
        self.data.set_current_state(target);
        tracing::debug!(key = %self.key, transition = name, %from, to = target, "state transition");

        let result = self.save_to_cache().await;
        self.pending = false;
        result
    }

    /// Persists the entire data document verbatim under the machine's key.
    pub async fn save_to_cache(&self) -> Result<()> {
        let value = serde_json::to_value(&self.data)?;
        self.store.set(&self.key, value).await?;
        Ok(())
    }
}
