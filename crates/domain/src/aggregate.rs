//! Composition-based aggregate mechanics.
//!
//! An aggregate here is a repository, an optionally hydrated root entity,
//! and a list of recorded domain events. Command handlers mutate the entity
//! in memory and record events; on success the caller stores the entity
//! exactly once and then publishes the recorded events in recording order.
//! A handler that fails, or that records only a duplicate/rejection event,
//! performs zero store calls while its events are still published.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DomainError, Result};

/// Trait for entity state that can be persisted as a whole document.
pub trait EntityState: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Returns the storage key of this entity's root document.
    fn entity_key(&self) -> String;

    /// Bumps the optimistic version stamp and refreshes the update time.
    ///
    /// Called once per store, immediately before the write.
    fn touch(&mut self);
}

/// Persistence contract for one entity state type.
///
/// `load` returns `None`, never an error, when the entity is absent;
/// `store` is an idempotent full-document overwrite; `remove` fails when
/// the entity does not exist.
#[async_trait]
pub trait Repository<S>: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<S>>;
    async fn store(&self, state: &S) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn exists(&self, id: &str) -> Result<bool>;
}

/// Generic aggregate root: repository + hydrated entity + recorded events.
///
/// Specialized by composition (e.g. the bulk-transaction aggregate) rather
/// than inheritance; command dispatch is an exhaustive match over a closed
/// command union at the call site.
pub struct AggregateRoot<S, R, Ev>
where
    S: EntityState,
    R: Repository<S>,
{
    repo: R,
    entity: Option<S>,
    events: Vec<Ev>,
}

impl<S, R, Ev> AggregateRoot<S, R, Ev>
where
    S: EntityState,
    R: Repository<S>,
{
    /// Creates an aggregate root over the given repository, with no entity
    /// hydrated.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            entity: None,
            events: Vec::new(),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Hydrates the root entity from the repository.
    ///
    /// With `require` set, absence is an error (`NotFound`); otherwise the
    /// entity slot is simply left empty and `Ok(None)` is returned.
    pub async fn load(&mut self, id: &str, require: bool) -> Result<Option<&S>> {
        match self.repo.load(id).await? {
            Some(state) => {
                self.entity = Some(state);
                Ok(self.entity.as_ref())
            }
            None if require => Err(DomainError::NotFound {
                entity_type: std::any::type_name::<S>(),
                id: id.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Returns true if an entity exists under `id`, without hydrating it.
    ///
    /// Used for duplicate detection ahead of creation.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.repo.exists(id).await
    }

    /// Returns the hydrated entity, if any.
    pub fn entity(&self) -> Option<&S> {
        self.entity.as_ref()
    }

    /// Returns the hydrated entity mutably, if any.
    pub fn entity_mut(&mut self) -> Option<&mut S> {
        self.entity.as_mut()
    }

    /// Replaces the hydrated entity (used on creation).
    pub fn set_entity(&mut self, state: S) {
        self.entity = Some(state);
    }

    /// Records a domain event for publication after the store.
    pub fn record_event(&mut self, event: Ev) {
        self.events.push(event);
    }

    /// Takes the recorded events, in recording order.
    pub fn take_events(&mut self) -> Vec<Ev> {
        std::mem::take(&mut self.events)
    }

    /// Returns the recorded events without draining them.
    pub fn recorded_events(&self) -> &[Ev] {
        &self.events
    }

    /// Persists the hydrated entity as a full-document overwrite, bumping
    /// its version stamp.
    ///
    /// Callers invoke this exactly once per successful command.
    pub async fn store(&mut self) -> Result<()> {
        let entity = self.entity.as_mut().ok_or(DomainError::NoEntity {
            action: "store",
        })?;
        entity.touch();
        self.repo.store(entity).await
    }

    /// Removes the root entity from the repository and clears the hydrated
    /// state. Sub-entity cleanup is coordinated by the caller.
    pub async fn destroy(&mut self) -> Result<()> {
        let entity = self.entity.take().ok_or(DomainError::NoEntity {
            action: "destroy",
        })?;
        self.repo.remove(&entity.entity_key()).await
    }
}
