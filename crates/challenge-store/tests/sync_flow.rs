// Sync adapter against a recording in-process transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use challenge_store::config::{EndpointSet, EndpointsConfig};
use challenge_store::db::MemoryStore;
use challenge_store::schema::{DomainKind, GameEntry, GameInput, PenaltyEntry};
use challenge_store::store::{GameStore, LocalStore, PenaltyStore};
use challenge_store::sync::{SyncAdapter, SyncError, SyncOp, SyncTransport};

// ---------------------------------------------------------------------------
// Mock transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Call {
    method: &'static str,
    path: String,
    body: Option<Value>,
}

#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, Result<Value, u16>>>,
    /// When set, every call signals `entered` and waits for `release`.
    gated: bool,
    entered: Notify,
    release: Notify,
}

impl MockTransport {
    fn new() -> Self {
        Self::default()
    }

    fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    fn reply(&self, path: &str, value: Value) {
        self.replies.lock().unwrap().insert(path.to_string(), Ok(value));
    }

    fn fail(&self, path: &str, status: u16) {
        self.replies.lock().unwrap().insert(path.to_string(), Err(status));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, method: &'static str, path: &str, body: Option<Value>) -> Result<Value, SyncError> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body,
        });
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let reply = self.replies.lock().unwrap().get(path).cloned();
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(SyncError::Status {
                status,
                body: "mock failure".into(),
            }),
            None => Err(SyncError::Status {
                status: 404,
                body: format!("no reply for {path}"),
            }),
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn get_json(&self, path: &str) -> Result<Value, SyncError> {
        self.respond("GET", path, None).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SyncError> {
        self.respond("POST", path, Some(body.clone())).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn endpoints() -> EndpointsConfig {
    EndpointsConfig {
        games: EndpointSet {
            save_tab: "/save_tab/".into(),
            delete_tab: "/delete_tab/".into(),
            load_saved_tabs: "/load_saved_tabs/".into(),
            load_defaults: "/load_default_entries/".into(),
        },
        penalties: EndpointSet {
            save_tab: "/save_penalty_tab/".into(),
            delete_tab: "/delete_penalty_tab/".into(),
            load_saved_tabs: "/load_saved_penalty_tabs/".into(),
            load_defaults: "/load_default_penalties/".into(),
        },
    }
}

fn adapter(transport: Arc<MockTransport>) -> SyncAdapter<Arc<MockTransport>> {
    SyncAdapter::new(transport, endpoints())
}

fn games() -> GameStore<MemoryStore> {
    LocalStore::open(Arc::new(MemoryStore::new())).unwrap()
}

fn penalties() -> PenaltyStore<MemoryStore> {
    LocalStore::open(Arc::new(MemoryStore::new())).unwrap()
}

fn chess() -> GameInput {
    GameInput {
        game: "Chess".into(),
        game_mode: "Blitz".into(),
        difficulty: 5.0,
        number_of_players: 2,
        weight: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_default_tab_makes_no_network_call_in_either_domain() {
    let transport = Arc::new(MockTransport::new());
    let sync = adapter(Arc::clone(&transport));

    let err = sync.delete_tab(&games(), "default", true).await.unwrap_err();
    assert!(matches!(err, SyncError::DefaultTab { .. }));
    // Refused even without confirmation.
    let err = sync.delete_tab(&penalties(), "default", false).await.unwrap_err();
    assert!(matches!(err, SyncError::DefaultTab { .. }));

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn unconfirmed_delete_is_refused_locally() {
    let transport = Arc::new(MockTransport::new());
    let sync = adapter(Arc::clone(&transport));
    let store = games();
    let tab = store.tabs.create_tab().unwrap();

    let err = sync.delete_tab(&store, &tab.id, false).await.unwrap_err();
    assert!(matches!(err, SyncError::NotConfirmed(_)));
    assert!(transport.calls().is_empty());
    assert!(store.tabs.contains(&tab.id));
}

#[tokio::test]
async fn confirmed_delete_removes_tab_after_server_ok() {
    let transport = Arc::new(MockTransport::new());
    transport.reply("/delete_penalty_tab/", json!({"status": "success"}));
    let sync = adapter(Arc::clone(&transport));
    let store = penalties();
    let tab = store.tabs.create_tab().unwrap();

    sync.delete_tab(&store, &tab.id, true).await.unwrap();

    assert!(!store.tabs.contains(&tab.id));
    assert_eq!(
        transport.calls(),
        vec![Call {
            method: "POST",
            path: "/delete_penalty_tab/".into(),
            body: Some(json!({"tabId": tab.id})),
        }]
    );
}

#[tokio::test]
async fn failed_delete_leaves_local_state_alone() {
    let transport = Arc::new(MockTransport::new());
    transport.fail("/delete_tab/", 500);
    let sync = adapter(Arc::clone(&transport));
    let store = games();
    let tab = store.tabs.create_tab().unwrap();
    store.add_new(&tab.id, chess()).unwrap();

    let err = sync.delete_tab(&store, &tab.id, true).await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 500, .. }));
    assert!(store.tabs.contains(&tab.id));
    assert_eq!(store.entries.list(&tab.id).len(), 1);

    // Rejection in the body is also a failure.
    transport.reply("/delete_tab/", json!({"status": "error", "message": "nope"}));
    let err = sync.delete_tab(&store, &tab.id, true).await.unwrap_err();
    assert!(matches!(err, SyncError::Rejected(ref m) if m == "nope"));
    assert!(store.tabs.contains(&tab.id));
}

#[tokio::test]
async fn load_defaults_translates_chess_entry() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(
        "/load_default_entries/",
        json!({"entries": [
            {"id": 1, "Spiel": "Chess", "Spielmodus": "Blitz", "Schwierigkeit": 5, "Spieleranzahl": 2}
        ]}),
    );
    let sync = adapter(Arc::clone(&transport));
    let store = games();
    store.add_new("default", chess()).unwrap();

    let count = sync.load_defaults(&store).await.unwrap();
    assert_eq!(count, 1);

    // Replaced, not appended.
    let defaults = store.entries.list("default");
    assert_eq!(
        defaults,
        vec![GameEntry {
            id: "1".into(),
            game: "Chess".into(),
            game_mode: "Blitz".into(),
            difficulty: 5.0,
            number_of_players: 2,
            tab_name: "Default".into(),
            weight: 1.0,
        }]
    );
}

#[tokio::test]
async fn load_defaults_for_penalties_uses_penalty_endpoint() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(
        "/load_default_penalties/",
        json!({"penalties": [
            {"id": "p1", "name": "Sing", "probability": 0.25, "description": "One verse"},
            {"id": "p2", "name": "Dance", "probability": 0.75, "description": ""}
        ]}),
    );
    let sync = adapter(Arc::clone(&transport));
    let store = penalties();

    assert_eq!(sync.load_defaults(&store).await.unwrap(), 2);
    let names: Vec<String> = store.entries.list("default").into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Sing", "Dance"]);
    assert_eq!(transport.calls()[0].method, "GET");
}

#[tokio::test]
async fn load_saved_tabs_merges_and_keeps_local_default() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(
        "/load_saved_tabs/",
        json!({
            "default": {"tab_name": "Server default", "entries_json": "[]"},
            "tab-3": {
                "tab_name": "Party",
                "entries_json": "[{\"id\":\"x\",\"game\":\"Go\",\"gameMode\":\"9x9\",\"difficulty\":6,\"numberOfPlayers\":2}]"
            },
            "tab-9": {"tab_name": "Broken", "entries_json": "not json"}
        }),
    );
    let sync = adapter(Arc::clone(&transport));
    let store = games();
    store.add_new("default", chess()).unwrap();

    let merged = sync.load_saved_tabs(&store).await.unwrap();
    assert_eq!(merged, 2);

    assert_eq!(store.tabs.name_of("default"), "Default");
    assert_eq!(store.entries.list("default").len(), 1);
    assert_eq!(store.tabs.name_of("tab-3"), "Party");
    assert_eq!(store.entries.list("tab-3")[0].game, "Go");
    assert!(store.entries.list("tab-9").is_empty());

    // The registry was reseeded past the merged ids.
    assert_eq!(store.tabs.create_tab().unwrap().id, "tab-10");
}

#[tokio::test]
async fn save_tab_posts_local_field_names() {
    let transport = Arc::new(MockTransport::new());
    transport.reply("/save_tab/", json!({"status": "ok"}));
    let sync = adapter(Arc::clone(&transport));
    let store = games();
    let tab = store.tabs.create_tab().unwrap();
    store.add_new(&tab.id, chess()).unwrap();

    sync.save_tab(&tab.id, &tab.name, &store.entries.list(&tab.id)).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    let body = calls[0].body.as_ref().unwrap();
    assert_eq!(body["tabId"], "tab-1");
    assert_eq!(body["tabName"], "Game Tab 1");
    assert_eq!(body["entries"][0]["gameMode"], "Blitz");
    assert_eq!(body["entries"][0]["numberOfPlayers"], 2);
}

#[tokio::test]
async fn save_default_tab_is_refused() {
    let transport = Arc::new(MockTransport::new());
    let sync = adapter(Arc::clone(&transport));
    let entries: Vec<PenaltyEntry> = Vec::new();
    let err = sync.save_tab("default", "Default", &entries).await.unwrap_err();
    assert!(matches!(err, SyncError::DefaultTab { .. }));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn concurrent_call_is_busy_and_latch_is_released() {
    let transport = Arc::new(MockTransport::gated());
    transport.reply("/load_default_entries/", json!({"entries": []}));
    let sync = Arc::new(adapter(Arc::clone(&transport)));
    let store = Arc::new(games());

    let first = {
        let sync = Arc::clone(&sync);
        let store = Arc::clone(&store);
        tokio::spawn(async move { sync.load_defaults(&*store).await })
    };
    transport.entered.notified().await;
    assert!(sync.is_busy(DomainKind::Games, SyncOp::LoadDefaults));

    let err = sync.load_defaults(&*store).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Busy {
            domain: DomainKind::Games,
            op: SyncOp::LoadDefaults
        }
    ));
    // Other domains and operations are unaffected by this latch.
    assert!(!sync.is_busy(DomainKind::Penalties, SyncOp::LoadDefaults));

    transport.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), 0);
    assert!(!sync.is_busy(DomainKind::Games, SyncOp::LoadDefaults));
}

#[tokio::test]
async fn latch_is_released_after_failure() {
    let transport = Arc::new(MockTransport::new());
    let sync = adapter(Arc::clone(&transport));
    let store = games();

    // No reply configured: the mock answers 404.
    assert!(sync.load_saved_tabs(&store).await.is_err());
    assert!(!sync.is_busy(DomainKind::Games, SyncOp::LoadSavedTabs));

    transport.reply("/load_saved_tabs/", json!({}));
    assert_eq!(sync.load_saved_tabs(&store).await.unwrap(), 0);
}
