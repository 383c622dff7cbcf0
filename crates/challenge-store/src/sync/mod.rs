// Server sync adapter: save, delete, and load tabs for either domain.
//
// Local state is only touched after the server has answered successfully.
// Each (domain, operation) pair admits one call at a time; a second call
// while the first is in flight fails with `SyncError::Busy`.

pub mod transport;
pub mod wire;

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::config::EndpointsConfig;
use crate::db::KeyValueStore;
use crate::schema::{DomainKind, EntrySchema, DEFAULT_TAB_ID};
use crate::storage::StorageError;
use crate::store::LocalStore;
use crate::tabs::TabError;

pub use transport::{HttpTransport, SyncTransport};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("the default tab cannot be {action} on the server")]
    DefaultTab { action: &'static str },

    #[error("{op} for {domain} is already in progress")]
    Busy { domain: DomainKind, op: SyncOp },

    #[error("deleting tab `{0}` requires confirmation")]
    NotConfirmed(String),

    #[error("no CSRF token configured; set csrf_token in config/credentials.toml")]
    MissingCsrfToken,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected server response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Tab(#[from] TabError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOp {
    SaveTab,
    DeleteTab,
    LoadSavedTabs,
    LoadDefaults,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOp::SaveTab => "save tab",
            SyncOp::DeleteTab => "delete tab",
            SyncOp::LoadSavedTabs => "load saved tabs",
            SyncOp::LoadDefaults => "load defaults",
        })
    }
}

// ---------------------------------------------------------------------------
// In-flight latch
// ---------------------------------------------------------------------------

type Latches = Mutex<HashSet<(DomainKind, SyncOp)>>;

/// Holds one latch; releasing happens on drop, whatever the outcome.
struct InFlight<'a> {
    latches: &'a Latches,
    key: (DomainKind, SyncOp),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.latches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// SyncAdapter
// ---------------------------------------------------------------------------

pub struct SyncAdapter<T> {
    transport: T,
    endpoints: EndpointsConfig,
    in_flight: Latches,
}

impl<T: SyncTransport> SyncAdapter<T> {
    pub fn new(transport: T, endpoints: EndpointsConfig) -> Self {
        Self {
            transport,
            endpoints,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether `op` is currently running for `domain`.
    pub fn is_busy(&self, domain: DomainKind, op: SyncOp) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(domain, op))
    }

    fn begin(&self, domain: DomainKind, op: SyncOp) -> Result<InFlight<'_>, SyncError> {
        let key = (domain, op);
        let mut latches = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !latches.insert(key) {
            return Err(SyncError::Busy { domain, op });
        }
        Ok(InFlight {
            latches: &self.in_flight,
            key,
        })
    }

    /// Upload one tab's entries. The default tab is never uploaded.
    pub async fn save_tab<E: EntrySchema>(&self, tab_id: &str, tab_name: &str, entries: &[E]) -> Result<(), SyncError> {
        if tab_id == DEFAULT_TAB_ID {
            return Err(SyncError::DefaultTab { action: "saved" });
        }
        let domain = E::domain();
        let _latch = self.begin(domain.kind, SyncOp::SaveTab)?;

        let body = wire::save_body(domain, tab_id, tab_name, entries)?;
        let path = &self.endpoints.for_domain(domain.kind).save_tab;
        let response = self.transport.post_json(path, &body).await?;
        wire::check_status(&response)?;

        info!(domain = %domain.kind, %tab_id, count = entries.len(), "tab saved to server");
        Ok(())
    }

    /// Delete a tab on the server, then locally, then reload the registry.
    ///
    /// The default tab is refused before confirmation is even considered,
    /// and nothing is sent unless `confirmed` is set.
    pub async fn delete_tab<E, S>(&self, store: &LocalStore<E, S>, tab_id: &str, confirmed: bool) -> Result<(), SyncError>
    where
        E: EntrySchema,
        S: KeyValueStore,
    {
        if tab_id == DEFAULT_TAB_ID {
            return Err(SyncError::DefaultTab { action: "deleted" });
        }
        if !confirmed {
            return Err(SyncError::NotConfirmed(tab_id.to_string()));
        }
        let domain = E::domain();
        let _latch = self.begin(domain.kind, SyncOp::DeleteTab)?;

        let path = &self.endpoints.for_domain(domain.kind).delete_tab;
        let response = self.transport.post_json(path, &wire::delete_body(tab_id)).await?;
        wire::check_status(&response)?;

        store.tabs.delete_local(tab_id)?;
        store.tabs.reload();
        info!(domain = %domain.kind, %tab_id, "tab deleted on server");
        Ok(())
    }

    /// Fetch every saved tab and merge it into local storage. The local
    /// default tab is kept. Returns how many tabs were merged.
    pub async fn load_saved_tabs<E, S>(&self, store: &LocalStore<E, S>) -> Result<usize, SyncError>
    where
        E: EntrySchema,
        S: KeyValueStore,
    {
        let domain = E::domain();
        let _latch = self.begin(domain.kind, SyncOp::LoadSavedTabs)?;

        let path = &self.endpoints.for_domain(domain.kind).load_saved_tabs;
        let response = self.transport.get_json(path).await?;
        let saved = wire::parse_saved_tabs::<E>(domain, response)?;

        let merged = store.tabs.merge_saved(saved)?;
        store.tabs.reload();
        info!(domain = %domain.kind, merged, "saved tabs loaded");
        Ok(merged)
    }

    /// Replace the default tab's entries with the server's defaults. Returns
    /// how many entries were stored.
    pub async fn load_defaults<E, S>(&self, store: &LocalStore<E, S>) -> Result<usize, SyncError>
    where
        E: EntrySchema,
        S: KeyValueStore,
    {
        let domain = E::domain();
        let _latch = self.begin(domain.kind, SyncOp::LoadDefaults)?;

        let path = &self.endpoints.for_domain(domain.kind).load_defaults;
        let response = self.transport.get_json(path).await?;
        let entries = wire::parse_defaults::<E>(domain, response)?;
        let count = entries.len();

        store.entries.replace_tab(DEFAULT_TAB_ID, entries)?;
        info!(domain = %domain.kind, count, "default entries loaded");
        Ok(count)
    }
}
