// Entry CRUD keyed by tab id.
//
// Every mutation is a read-modify-write of the whole entries document;
// there is no patch primitive. Callers run on one logical thread.

use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::schema::EntrySchema;
use crate::storage::{Storage, StorageError};

/// Whether a mutation found something to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Changed,
    Unchanged,
}

pub struct EntryRepository<E, S> {
    storage: Storage<S>,
    _entry: PhantomData<fn() -> E>,
}

impl<E: EntrySchema, S: KeyValueStore> EntryRepository<E, S> {
    pub fn new(storage: Storage<S>) -> Self {
        Self {
            storage,
            _entry: PhantomData,
        }
    }

    /// Entries of one tab, in insertion order. Unknown tabs are empty.
    pub fn list(&self, tab_id: &str) -> Vec<E> {
        self.storage
            .entries_or_default::<E>()
            .shift_remove(tab_id)
            .unwrap_or_default()
    }

    pub fn get(&self, tab_id: &str, entry_id: &str) -> Option<E> {
        self.list(tab_id).into_iter().find(|e| e.id() == entry_id)
    }

    /// Append `entry` to the tab's list, creating the list if needed. Ids are
    /// not checked for uniqueness.
    pub fn add(&self, tab_id: &str, entry: E) -> Result<(), StorageError> {
        let mut doc = self.storage.entries_or_default::<E>();
        debug!(tab_id, entry_id = entry.id(), "adding entry");
        doc.entry(tab_id.to_string()).or_default().push(entry);
        self.storage.write_entries(&doc)
    }

    /// Replace the first entry whose id matches.
    pub fn update(&self, tab_id: &str, entry_id: &str, new_entry: E) -> Result<Mutation, StorageError> {
        let mut doc = self.storage.entries_or_default::<E>();
        let Some(list) = doc.get_mut(tab_id) else {
            warn!(tab_id, entry_id, "update skipped: tab has no entries");
            return Ok(Mutation::Unchanged);
        };
        let Some(slot) = list.iter_mut().find(|e| e.id() == entry_id) else {
            warn!(tab_id, entry_id, "update skipped: entry not found");
            return Ok(Mutation::Unchanged);
        };
        *slot = new_entry;
        self.storage.write_entries(&doc)?;
        Ok(Mutation::Changed)
    }

    /// Drop every entry whose id matches.
    pub fn remove(&self, tab_id: &str, entry_id: &str) -> Result<Mutation, StorageError> {
        let removed = self.remove_many(tab_id, &[entry_id])?;
        if removed == 0 {
            warn!(tab_id, entry_id, "remove skipped: entry not found");
            return Ok(Mutation::Unchanged);
        }
        Ok(Mutation::Changed)
    }

    /// Drop all entries whose id is in `ids` (an aggregated group, usually).
    /// Returns how many were removed.
    pub fn remove_many<T: AsRef<str>>(&self, tab_id: &str, ids: &[T]) -> Result<usize, StorageError> {
        let mut doc = self.storage.entries_or_default::<E>();
        let Some(list) = doc.get_mut(tab_id) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|e| !ids.iter().any(|id| id.as_ref() == e.id()));
        let removed = before - list.len();
        if removed > 0 {
            self.storage.write_entries(&doc)?;
        }
        Ok(removed)
    }

    /// Apply `edit` to every entry whose id is in `ids`. Entries that fail
    /// validation after the edit are left untouched. Returns how many
    /// entries changed.
    pub fn update_group<T, F>(&self, tab_id: &str, ids: &[T], mut edit: F) -> Result<usize, StorageError>
    where
        T: AsRef<str>,
        F: FnMut(&mut E),
    {
        let mut doc = self.storage.entries_or_default::<E>();
        let Some(list) = doc.get_mut(tab_id) else {
            warn!(tab_id, "group update skipped: tab has no entries");
            return Ok(0);
        };
        let mut changed = 0;
        for entry in list.iter_mut().filter(|e| ids.iter().any(|id| id.as_ref() == e.id())) {
            let mut edited = entry.clone();
            edit(&mut edited);
            match edited.validate() {
                Ok(()) if edited != *entry => {
                    *entry = edited;
                    changed += 1;
                }
                Ok(()) => {}
                Err(e) => warn!(tab_id, entry_id = entry.id(), "group edit rejected: {e}"),
            }
        }
        if changed > 0 {
            self.storage.write_entries(&doc)?;
        }
        Ok(changed)
    }

    /// Replace the tab's whole list (bulk loads).
    pub fn replace_tab(&self, tab_id: &str, entries: Vec<E>) -> Result<(), StorageError> {
        let mut doc = self.storage.entries_or_default::<E>();
        debug!(tab_id, count = entries.len(), "replacing tab entries");
        doc.insert(tab_id.to_string(), entries);
        self.storage.write_entries(&doc)
    }
}
