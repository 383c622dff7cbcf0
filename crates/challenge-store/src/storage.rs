// Typed document accessor over a key-value backend.
//
// Each domain owns two JSON documents: tab metadata (`tabId -> { name }`)
// and entry lists (`tabId -> [Entry]`). Reads degrade to a default skeleton
// on missing or corrupt data; writes report failure to the caller.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::KeyValueStore;
use crate::schema::{DomainSpec, EntrySchema, DEFAULT_TAB_ID, DEFAULT_TAB_NAME};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded writing `{key}`: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("document `{key}` is corrupt: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("document `{key}` is not a JSON object")]
    NotAnObject { key: String },

    #[error("failed to serialize document `{key}`: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("storage backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabMeta {
    pub name: String,
}

pub type TabsDocument = IndexMap<String, TabMeta>;
pub type EntriesDocument<E> = IndexMap<String, Vec<E>>;

pub fn default_tabs() -> TabsDocument {
    let mut doc = TabsDocument::new();
    doc.insert(
        DEFAULT_TAB_ID.to_string(),
        TabMeta {
            name: DEFAULT_TAB_NAME.to_string(),
        },
    );
    doc
}

pub fn default_entries<E>() -> EntriesDocument<E> {
    let mut doc = EntriesDocument::new();
    doc.insert(DEFAULT_TAB_ID.to_string(), Vec::new());
    doc
}

/// What `initialize()` had to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub seeded_tabs: bool,
    pub seeded_entries: bool,
    /// Tab ids whose metadata was recreated for an orphaned entry list.
    pub reconciled: Vec<String>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Accessor for one domain's pair of documents. Cheap to clone; clones share
/// the backend.
pub struct Storage<S> {
    kv: Arc<S>,
    domain: &'static DomainSpec,
}

impl<S> Clone for Storage<S> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            domain: self.domain,
        }
    }
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(kv: Arc<S>, domain: &'static DomainSpec) -> Self {
        Self { kv, domain }
    }

    pub fn domain(&self) -> &'static DomainSpec {
        self.domain
    }

    /// Seed both documents with their `default` skeletons when absent, then
    /// recreate tab metadata for any entry list that has none. Existing
    /// documents are never replaced, even when they fail to parse.
    pub fn initialize<E: EntrySchema>(&self) -> Result<InitReport, StorageError> {
        let mut report = InitReport::default();

        if self.kv.get_item(self.domain.tabs_key)?.is_none() {
            self.write_tabs(&default_tabs())?;
            report.seeded_tabs = true;
        }
        if self.kv.get_item(self.domain.entries_key)?.is_none() {
            self.write_entries::<E>(&default_entries())?;
            report.seeded_entries = true;
        }

        // Reconciliation needs both documents readable; leave corrupt data
        // for the best-effort readers to deal with.
        let (Ok(mut tabs), Ok(entries)) = (self.read_tabs(), self.read_entries::<E>()) else {
            warn!(domain = %self.domain.kind, "skipping reconciliation: unreadable document");
            return Ok(report);
        };
        for tab_id in entries.keys() {
            if !tabs.contains_key(tab_id) {
                let name = self.domain.fallback_tab_name(tab_id);
                warn!(domain = %self.domain.kind, %tab_id, %name, "recreating missing tab metadata");
                tabs.insert(tab_id.clone(), TabMeta { name });
                report.reconciled.push(tab_id.clone());
            }
        }
        if !report.reconciled.is_empty() {
            self.write_tabs(&tabs)?;
        }

        if report.seeded_tabs || report.seeded_entries {
            info!(domain = %self.domain.kind, ?report, "local storage initialized");
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read the tab document. Absent data yields the skeleton; a document
    /// that is not a JSON object is an error. Malformed tab metadata inside a
    /// valid object falls back to the generated name. The default tab is
    /// always present in the result.
    pub fn read_tabs(&self) -> Result<TabsDocument, StorageError> {
        let mut doc = match self.read_document(self.domain.tabs_key)? {
            Some(raw) => raw
                .into_iter()
                .map(|(tab_id, value)| {
                    let meta = serde_json::from_value::<TabMeta>(value).unwrap_or_else(|e| {
                        warn!(domain = %self.domain.kind, %tab_id, "unreadable tab metadata: {e}");
                        TabMeta {
                            name: self.domain.fallback_tab_name(&tab_id),
                        }
                    });
                    (tab_id, meta)
                })
                .collect(),
            None => default_tabs(),
        };
        if !doc.contains_key(DEFAULT_TAB_ID) {
            doc.shift_insert(
                0,
                DEFAULT_TAB_ID.to_string(),
                TabMeta {
                    name: DEFAULT_TAB_NAME.to_string(),
                },
            );
        }
        Ok(doc)
    }

    /// Read the entry document. Absent data yields the skeleton; a document
    /// that is not a JSON object is an error. Inside a valid object each
    /// entry is decoded on its own and undecodable entries are skipped.
    pub fn read_entries<E: EntrySchema>(&self) -> Result<EntriesDocument<E>, StorageError> {
        let mut doc = match self.read_document(self.domain.entries_key)? {
            Some(raw) => raw
                .into_iter()
                .map(|(tab_id, value)| {
                    let list = self.decode_list::<E>(&tab_id, value);
                    (tab_id, list)
                })
                .collect(),
            None => default_entries(),
        };
        if !doc.contains_key(DEFAULT_TAB_ID) {
            doc.shift_insert(0, DEFAULT_TAB_ID.to_string(), Vec::new());
        }
        Ok(doc)
    }

    fn decode_list<E: EntrySchema>(&self, tab_id: &str, value: Value) -> Vec<E> {
        let Value::Array(items) = value else {
            warn!(domain = %self.domain.kind, %tab_id, "entry list is not an array; treating as empty");
            return Vec::new();
        };
        items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<E>(item) {
                Ok(mut entry) => {
                    entry.normalize();
                    Some(entry)
                }
                Err(e) => {
                    warn!(domain = %self.domain.kind, %tab_id, index, "skipping unreadable stored entry: {e}");
                    None
                }
            })
            .collect()
    }

    /// Best-effort tab read: any failure is logged and replaced by the
    /// skeleton.
    pub fn tabs_or_default(&self) -> TabsDocument {
        self.read_tabs().unwrap_or_else(|e| {
            warn!(domain = %self.domain.kind, "falling back to default tabs: {e}");
            default_tabs()
        })
    }

    /// Best-effort entry read: any failure is logged and replaced by the
    /// skeleton.
    pub fn entries_or_default<E: EntrySchema>(&self) -> EntriesDocument<E> {
        self.read_entries().unwrap_or_else(|e| {
            warn!(domain = %self.domain.kind, "falling back to default entries: {e}");
            default_entries()
        })
    }

    fn read_document(&self, key: &str) -> Result<Option<IndexMap<String, Value>>, StorageError> {
        let Some(raw) = self.kv.get_item(key)? else {
            debug!(key, "document absent");
            return Ok(None);
        };
        // Top level goes into an `IndexMap` so tab order survives.
        if !raw.trim_start().starts_with('{') {
            return Err(match serde_json::from_str::<Value>(&raw) {
                Ok(_) => StorageError::NotAnObject {
                    key: key.to_string(),
                },
                Err(source) => StorageError::Corrupt {
                    key: key.to_string(),
                    source,
                },
            });
        }
        let doc = serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn write_tabs(&self, doc: &TabsDocument) -> Result<(), StorageError> {
        let raw = encode(self.domain.tabs_key, doc)?;
        self.kv.set_item(self.domain.tabs_key, &raw)
    }

    pub fn write_entries<E: EntrySchema>(&self, doc: &EntriesDocument<E>) -> Result<(), StorageError> {
        let raw = encode(self.domain.entries_key, doc)?;
        self.kv.set_item(self.domain.entries_key, &raw)
    }

    /// Write both documents in one atomic backend call so a failure cannot
    /// leave an entry list without its tab metadata.
    pub fn write_both<E: EntrySchema>(
        &self,
        tabs: &TabsDocument,
        entries: &EntriesDocument<E>,
    ) -> Result<(), StorageError> {
        let tabs_raw = encode(self.domain.tabs_key, tabs)?;
        let entries_raw = encode(self.domain.entries_key, entries)?;
        self.kv.set_items(&[
            (self.domain.tabs_key, &tabs_raw),
            (self.domain.entries_key, &entries_raw),
        ])
    }

    /// Write an untyped document. Anything but a JSON object is rejected
    /// before reaching the backend.
    pub fn write_value(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let raw = encode(key, value)?;
        self.kv.set_item(key, &raw)
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, doc: &T) -> Result<String, StorageError> {
    let raw = serde_json::to_string(doc).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    if !raw.starts_with('{') {
        warn!(key, "refusing to store a non-object document");
        return Err(StorageError::NotAnObject {
            key: key.to_string(),
        });
    }
    Ok(raw)
}
