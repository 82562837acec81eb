//! In-memory computation registry
//!
//! Records live for the lifetime of the process. Every mutation goes through a
//! DashMap entry guard, so a transition is atomic with respect to concurrent
//! readers and writers of the same computation.

use api_types::ComputationStatus;
use chrono::DateTime;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use super::types::Computation;
use super::types::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Computation not found: {id}")]
    NotFound { id: String },

    #[error("Computation already registered: {id}")]
    AlreadyExists { id: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Default)]
pub struct ComputationStore {
    computations: DashMap<String, Computation>,
}

impl ComputationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new computation. Ids are never reused.
    pub fn insert(&self, computation: Computation) -> Result<()> {
        match self.computations.entry(computation.id().to_string()) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists {
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                info!(
                    computation_id = %computation.id(),
                    status = %computation.status,
                    "Computation registered"
                );
                entry.insert(computation);
                Ok(())
            }
        }
    }

    /// Snapshot of one computation
    pub fn get(&self, id: &str) -> Option<Computation> {
        self.computations.get(id).map(|c| c.clone())
    }

    /// Snapshots of every computation, ordered by start time with computations
    /// that never started last, then by id
    pub fn list(&self) -> Vec<Computation> {
        let mut all: Vec<Computation> = self
            .computations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            let key = |c: &Computation| (c.start_time.is_none(), c.start_time);
            key(a).cmp(&key(b)).then_with(|| a.id().cmp(b.id()))
        });
        all
    }

    /// Applies a status transition and returns the updated snapshot.
    pub fn transition(
        &self,
        id: &str,
        next: ComputationStatus,
        now: DateTime<Utc>,
    ) -> Result<Computation> {
        let mut entry = self
            .computations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let previous = entry.status;
        entry.transition(next, now)?;
        info!(
            computation_id = %id,
            from = %previous,
            status = %next,
            "Computation status changed"
        );
        Ok(entry.clone())
    }

    /// Records the domain a computation runs in
    pub fn set_domain(&self, id: &str, domain: &str) -> Result<()> {
        let mut entry = self
            .computations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        entry.domain = Some(domain.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.computations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computations.is_empty()
    }
}
