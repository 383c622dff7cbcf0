// Tab registry: id allocation, creation, rename, deletion.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::KeyValueStore;
use crate::repository::Mutation;
use crate::schema::{EntrySchema, DEFAULT_TAB_ID, MAX_TAB_SEQ};
use crate::storage::{Storage, StorageError, TabMeta};

#[derive(Debug, Error)]
pub enum TabError {
    #[error("the default tab cannot be {action}")]
    DefaultTabProtected { action: &'static str },

    #[error("tab `{0}` does not exist")]
    NotFound(String),

    #[error("tab name cannot be empty")]
    EmptyName,

    #[error("no tab ids left: sequence reached {max}")]
    IdsExhausted { max: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tab {
    pub id: String,
    pub name: String,
}

impl Tab {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_TAB_ID
    }
}

pub struct TabRegistry<E, S> {
    storage: Storage<S>,
    /// Highest sequence number handed out (or found persisted) so far.
    last_seq: AtomicU64,
    _entry: PhantomData<fn() -> E>,
}

impl<E: EntrySchema, S: KeyValueStore> TabRegistry<E, S> {
    /// Build the registry, seeding the id counter from persisted tabs.
    pub fn new(storage: Storage<S>) -> Self {
        let seed = persisted_max_seq::<E, S>(&storage);
        Self {
            storage,
            last_seq: AtomicU64::new(seed),
            _entry: PhantomData,
        }
    }

    /// Reseed the id counter from persisted state, as a fresh session would.
    pub fn reload(&self) -> u64 {
        let seed = persisted_max_seq::<E, S>(&self.storage);
        self.last_seq.store(seed, Ordering::SeqCst);
        seed
    }

    /// Next generated tab id. Skips any id already present in storage.
    pub fn allocate_next_id(&self) -> Result<String, TabError> {
        let domain = self.storage.domain();
        let tabs = self.storage.tabs_or_default();
        let entries = self.storage.entries_or_default::<E>();
        loop {
            let n = self
                .last_seq
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    n.checked_add(1).filter(|next| *next <= MAX_TAB_SEQ)
                })
                .map_err(|_| TabError::IdsExhausted { max: MAX_TAB_SEQ })?
                + 1;
            let id = domain.tab_id(n);
            if !tabs.contains_key(&id) && !entries.contains_key(&id) {
                return Ok(id);
            }
            warn!(%id, "skipping tab id already in storage");
        }
    }

    /// Create a tab named `"<Label> Tab <N>"` with an empty entry list.
    pub fn create_tab(&self) -> Result<Tab, TabError> {
        let domain = self.storage.domain();
        let id = self.allocate_next_id()?;
        let name = domain.fallback_tab_name(&id);

        let mut tabs = self.storage.tabs_or_default();
        let mut entries = self.storage.entries_or_default::<E>();
        tabs.insert(id.clone(), TabMeta { name: name.clone() });
        entries.insert(id.clone(), Vec::new());
        self.storage.write_both(&tabs, &entries)?;

        info!(domain = %domain.kind, %id, %name, "tab created");
        Ok(Tab { id, name })
    }

    /// All tabs in display order. Entry lists without metadata are listed
    /// after the registered tabs under their fallback name.
    pub fn list(&self) -> Vec<Tab> {
        let domain = self.storage.domain();
        let tabs = self.storage.tabs_or_default();
        let entries = self.storage.entries_or_default::<E>();

        let mut out: Vec<Tab> = tabs
            .iter()
            .map(|(id, meta)| Tab {
                id: id.clone(),
                name: meta.name.clone(),
            })
            .collect();
        out.extend(
            entries
                .keys()
                .filter(|id| !tabs.contains_key(*id))
                .map(|id| Tab {
                    id: id.clone(),
                    name: domain.fallback_tab_name(id),
                }),
        );
        out
    }

    pub fn contains(&self, tab_id: &str) -> bool {
        self.storage.tabs_or_default().contains_key(tab_id)
            || self.storage.entries_or_default::<E>().contains_key(tab_id)
    }

    /// Display name of a tab, falling back when metadata is missing.
    pub fn name_of(&self, tab_id: &str) -> String {
        self.storage
            .tabs_or_default()
            .get(tab_id)
            .map(|meta| meta.name.clone())
            .unwrap_or_else(|| self.storage.domain().fallback_tab_name(tab_id))
    }

    /// Rename a tab locally and restamp the `tabName` of its entries.
    pub fn rename_tab(&self, tab_id: &str, new_name: &str) -> Result<(), TabError> {
        if tab_id == DEFAULT_TAB_ID {
            return Err(TabError::DefaultTabProtected { action: "renamed" });
        }
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(TabError::EmptyName);
        }
        if !self.contains(tab_id) {
            return Err(TabError::NotFound(tab_id.to_string()));
        }

        let mut tabs = self.storage.tabs_or_default();
        let mut entries = self.storage.entries_or_default::<E>();
        tabs.insert(
            tab_id.to_string(),
            TabMeta {
                name: new_name.to_string(),
            },
        );
        if let Some(list) = entries.get_mut(tab_id) {
            for entry in list.iter_mut() {
                entry.set_tab_name(new_name);
            }
        }
        self.storage.write_both(&tabs, &entries)?;
        info!(%tab_id, name = new_name, "tab renamed");
        Ok(())
    }

    /// Remove a tab and its entries from local storage.
    pub fn delete_local(&self, tab_id: &str) -> Result<Mutation, TabError> {
        if tab_id == DEFAULT_TAB_ID {
            return Err(TabError::DefaultTabProtected { action: "deleted" });
        }
        let mut tabs = self.storage.tabs_or_default();
        let mut entries = self.storage.entries_or_default::<E>();
        let had_tab = tabs.shift_remove(tab_id).is_some();
        let had_entries = entries.shift_remove(tab_id).is_some();
        if !had_tab && !had_entries {
            warn!(%tab_id, "delete skipped: tab not found");
            return Ok(Mutation::Unchanged);
        }
        self.storage.write_both(&tabs, &entries)?;
        info!(%tab_id, "tab deleted locally");
        Ok(Mutation::Changed)
    }

    /// Merge server-saved tabs into local storage. Any payload for the
    /// default tab is ignored so the local default survives. Returns how many
    /// tabs were written.
    pub fn merge_saved(&self, saved: Vec<(Tab, Vec<E>)>) -> Result<usize, TabError> {
        let mut tabs = self.storage.tabs_or_default();
        let mut entries = self.storage.entries_or_default::<E>();
        let mut merged = 0;
        for (tab, list) in saved {
            if tab.is_default() {
                warn!("ignoring server copy of the default tab");
                continue;
            }
            tabs.insert(tab.id.clone(), TabMeta { name: tab.name });
            entries.insert(tab.id, list);
            merged += 1;
        }
        if merged > 0 {
            self.storage.write_both(&tabs, &entries)?;
        }
        Ok(merged)
    }
}

fn persisted_max_seq<E: EntrySchema, S: KeyValueStore>(storage: &Storage<S>) -> u64 {
    let domain = storage.domain();
    let tabs = storage.tabs_or_default();
    let entries = storage.entries_or_default::<E>();
    tabs.keys()
        .chain(entries.keys())
        .filter_map(|id| domain.parse_tab_id(id))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::db::MemoryStore;
    use crate::repository::EntryRepository;
    use crate::schema::{GameEntry, GAME_DOMAIN};

    fn storage() -> Storage<MemoryStore> {
        let storage = Storage::new(Arc::new(MemoryStore::new()), &GAME_DOMAIN);
        storage.initialize::<GameEntry>().unwrap();
        storage
    }

    fn registry(storage: &Storage<MemoryStore>) -> TabRegistry<GameEntry, MemoryStore> {
        TabRegistry::new(storage.clone())
    }

    #[test]
    fn create_tab_registers_metadata_and_empty_list() {
        let storage = storage();
        let tabs = registry(&storage);
        let tab = tabs.create_tab().unwrap();
        assert_eq!(tab.id, "tab-1");
        assert_eq!(tab.name, "Game Tab 1");
        assert_eq!(storage.read_tabs().unwrap()["tab-1"].name, "Game Tab 1");
        assert!(storage.read_entries::<GameEntry>().unwrap()["tab-1"].is_empty());
    }

    #[test]
    fn ids_continue_after_persisted_maximum() {
        let storage = storage();
        let mut doc = storage.read_tabs().unwrap();
        doc.insert("tab-7".into(), TabMeta { name: "Seven".into() });
        doc.insert("tab-2".into(), TabMeta { name: "Two".into() });
        storage.write_tabs(&doc).unwrap();

        let tabs = registry(&storage);
        assert_eq!(tabs.allocate_next_id().unwrap(), "tab-8");
        assert_eq!(tabs.allocate_next_id().unwrap(), "tab-9");
    }

    #[test]
    fn allocation_never_collides_across_reload() {
        let storage = storage();
        let tabs = registry(&storage);
        let mut seen = HashSet::new();
        for _ in 0..5 {
            seen.insert(tabs.create_tab().unwrap().id);
        }
        tabs.delete_local("tab-2").unwrap();

        // A fresh session reseeds from whatever survived.
        let reloaded = registry(&storage);
        for _ in 0..5 {
            let id = reloaded.allocate_next_id().unwrap();
            assert!(!storage.read_tabs().unwrap().contains_key(&id));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn allocation_skips_ids_written_behind_its_back() {
        let storage = storage();
        let tabs = registry(&storage);
        let mut doc = storage.read_tabs().unwrap();
        doc.insert("tab-1".into(), TabMeta { name: "Sneaky".into() });
        storage.write_tabs(&doc).unwrap();
        assert_eq!(tabs.allocate_next_id().unwrap(), "tab-2");
    }

    #[test]
    fn oversized_persisted_suffix_does_not_seed_the_counter() {
        let storage = storage();
        let mut doc = storage.read_tabs().unwrap();
        doc.insert("tab-18446744073709551615".into(), TabMeta { name: "Big".into() });
        storage.write_tabs(&doc).unwrap();

        let tabs = registry(&storage);
        let tab = tabs.create_tab().unwrap();
        assert_eq!(tab.id, "tab-1");
        assert_eq!(tabs.list().len(), 3);
    }

    #[test]
    fn allocation_stops_at_the_largest_sequence() {
        let storage = storage();
        let mut doc = storage.read_tabs().unwrap();
        doc.insert(format!("tab-{}", MAX_TAB_SEQ - 1), TabMeta { name: "Almost".into() });
        storage.write_tabs(&doc).unwrap();

        let tabs = registry(&storage);
        assert_eq!(tabs.create_tab().unwrap().id, format!("tab-{MAX_TAB_SEQ}"));
        assert!(matches!(tabs.create_tab(), Err(TabError::IdsExhausted { .. })));
        assert!(matches!(tabs.create_tab(), Err(TabError::IdsExhausted { .. })));
        assert_eq!(storage.read_tabs().unwrap().len(), 3);
    }

    #[test]
    fn default_tab_cannot_be_renamed_or_deleted() {
        let storage = storage();
        let tabs = registry(&storage);
        assert!(matches!(
            tabs.rename_tab("default", "Mine"),
            Err(TabError::DefaultTabProtected { .. })
        ));
        assert!(matches!(
            tabs.delete_local("default"),
            Err(TabError::DefaultTabProtected { .. })
        ));
    }

    #[test]
    fn rename_restamps_entries() {
        let storage = storage();
        let tabs = registry(&storage);
        let repo: EntryRepository<GameEntry, _> = EntryRepository::new(storage.clone());
        let tab = tabs.create_tab().unwrap();
        repo.add(
            &tab.id,
            GameEntry {
                id: "e1".into(),
                game: "Chess".into(),
                game_mode: "Blitz".into(),
                difficulty: 3.0,
                number_of_players: 2,
                tab_name: tab.name.clone(),
                weight: 1.0,
            },
        )
        .unwrap();

        tabs.rename_tab(&tab.id, "  Board games ").unwrap();
        assert_eq!(tabs.name_of(&tab.id), "Board games");
        assert_eq!(repo.list(&tab.id)[0].tab_name, "Board games");

        assert!(matches!(tabs.rename_tab(&tab.id, "   "), Err(TabError::EmptyName)));
        assert!(matches!(tabs.rename_tab("tab-99", "x"), Err(TabError::NotFound(_))));
    }

    #[test]
    fn delete_cascades_to_entries() {
        let storage = storage();
        let tabs = registry(&storage);
        let tab = tabs.create_tab().unwrap();
        assert_eq!(tabs.delete_local(&tab.id).unwrap(), Mutation::Changed);
        assert!(!storage.read_entries::<GameEntry>().unwrap().contains_key(&tab.id));
        assert_eq!(tabs.delete_local(&tab.id).unwrap(), Mutation::Unchanged);
    }

    #[test]
    fn list_includes_orphans_with_fallback_name() {
        let storage = storage();
        let mut entries = storage.read_entries::<GameEntry>().unwrap();
        entries.insert("tab-3".into(), Vec::new());
        storage.write_entries(&entries).unwrap();

        let tabs = registry(&storage);
        let listed = tabs.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].name, "Game Tab 3");
        assert_eq!(tabs.name_of("tab-3"), "Game Tab 3");
    }

    #[test]
    fn merge_saved_preserves_local_default() {
        let storage = storage();
        let tabs = registry(&storage);
        let saved = vec![
            (
                Tab {
                    id: "default".into(),
                    name: "Server default".into(),
                },
                Vec::new(),
            ),
            (
                Tab {
                    id: "tab-4".into(),
                    name: "Party".into(),
                },
                Vec::new(),
            ),
        ];
        assert_eq!(tabs.merge_saved(saved).unwrap(), 1);
        assert_eq!(tabs.name_of("default"), "Default");
        assert_eq!(tabs.name_of("tab-4"), "Party");
        assert_eq!(tabs.reload(), 4);
    }
}
