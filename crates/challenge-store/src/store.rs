// One domain's local configuration store: storage, entries and tabs wired
// together over a shared backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::aggregate::{group_entries, GroupSummary};
use crate::db::KeyValueStore;
use crate::repository::{EntryRepository, Mutation};
use crate::schema::{generate_entry_id, EntrySchema, GameEntry, PenaltyEntry, ValidationError};
use crate::storage::{InitReport, Storage, StorageError};
use crate::tabs::{TabError, TabRegistry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid entry: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tab(#[from] TabError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct LocalStore<E, S> {
    storage: Storage<S>,
    pub entries: EntryRepository<E, S>,
    pub tabs: TabRegistry<E, S>,
}

pub type GameStore<S> = LocalStore<GameEntry, S>;
pub type PenaltyStore<S> = LocalStore<PenaltyEntry, S>;

impl<E: EntrySchema, S: KeyValueStore> LocalStore<E, S> {
    /// Initialize the domain's documents in `kv` and seed the tab registry.
    pub fn open(kv: Arc<S>) -> Result<Self, StorageError> {
        let storage = Storage::new(kv, E::domain());
        let report: InitReport = storage.initialize::<E>()?;
        if !report.reconciled.is_empty() {
            info!(
                domain = %E::domain().kind,
                count = report.reconciled.len(),
                "reconciled orphaned entry lists"
            );
        }
        Ok(Self {
            entries: EntryRepository::new(storage.clone()),
            tabs: TabRegistry::new(storage.clone()),
            storage,
        })
    }

    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    /// Validate `input`, stamp a fresh id and the tab's name, and append it.
    pub fn add_new(&self, tab_id: &str, input: E::Input) -> Result<E, StoreError> {
        if !self.tabs.contains(tab_id) {
            return Err(TabError::NotFound(tab_id.to_string()).into());
        }
        let entry = E::build(input, generate_entry_id(), &self.tabs.name_of(tab_id))?;
        self.entries.add(tab_id, entry.clone())?;
        Ok(entry)
    }

    /// Validate `input` and replace the entry `entry_id` with it, keeping the
    /// id.
    pub fn edit(&self, tab_id: &str, entry_id: &str, input: E::Input) -> Result<Mutation, StoreError> {
        let entry = E::build(input, entry_id.to_string(), &self.tabs.name_of(tab_id))?;
        Ok(self.entries.update(tab_id, entry_id, entry)?)
    }

    /// Grouped view of one tab.
    pub fn summary(&self, tab_id: &str) -> BTreeMap<String, GroupSummary> {
        group_entries(&self.entries.list(tab_id))
    }
}
