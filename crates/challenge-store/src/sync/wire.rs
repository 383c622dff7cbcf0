// Conversion between local documents and the server's JSON shapes.

use serde_json::{Map, Value};
use tracing::warn;

use super::SyncError;
use crate::schema::{generate_entry_id, DomainSpec, EntrySchema, DEFAULT_TAB_NAME};
use crate::tabs::Tab;

/// Body of a save request: `{ tabId, tabName, <collection>: [...] }`.
/// Entries keep their local field names.
pub fn save_body<E: EntrySchema>(
    domain: &DomainSpec,
    tab_id: &str,
    tab_name: &str,
    entries: &[E],
) -> Result<Value, SyncError> {
    let entries = serde_json::to_value(entries)
        .map_err(|e| SyncError::Malformed(format!("cannot encode entries: {e}")))?;
    let mut body = Map::new();
    body.insert("tabId".into(), Value::from(tab_id));
    body.insert("tabName".into(), Value::from(tab_name));
    body.insert(domain.collection_field.into(), entries);
    Ok(Value::Object(body))
}

pub fn delete_body(tab_id: &str) -> Value {
    serde_json::json!({ "tabId": tab_id })
}

/// Accept `{ "status": "ok" | "success" }`. Anything else is a rejection
/// carrying the server's `message` or `error` text.
pub fn check_status(response: &Value) -> Result<(), SyncError> {
    let status = response.get("status").and_then(Value::as_str);
    if matches!(status, Some("ok" | "success")) {
        return Ok(());
    }
    let reason = ["message", "error"]
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    match (status, reason) {
        (_, Some(reason)) => Err(SyncError::Rejected(reason)),
        (Some(status), None) => Err(SyncError::Rejected(format!("status `{status}`"))),
        (None, None) => Err(SyncError::Malformed("response has no status".into())),
    }
}

/// Parse `{ tabId: { tab_name, entries_json | penalties_json } }`.
///
/// The embedded list is a JSON string; when it fails to parse the tab is
/// kept with an empty list. Entries failing validation are dropped.
pub fn parse_saved_tabs<E: EntrySchema>(
    domain: &DomainSpec,
    response: Value,
) -> Result<Vec<(Tab, Vec<E>)>, SyncError> {
    let Value::Object(tabs) = response else {
        return Err(SyncError::Malformed("saved tabs must be a JSON object".into()));
    };

    let mut saved = Vec::with_capacity(tabs.len());
    for (tab_id, payload) in tabs {
        let name = payload
            .get("tab_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| domain.fallback_tab_name(&tab_id));

        let raw = match payload.get(domain.saved_json_field) {
            Some(Value::String(text)) => match serde_json::from_str::<Vec<Value>>(text) {
                Ok(list) => list,
                Err(e) => {
                    warn!(%tab_id, "saved entry list is not valid JSON, using empty list: {e}");
                    Vec::new()
                }
            },
            Some(Value::Array(list)) => list.clone(),
            _ => {
                warn!(%tab_id, field = domain.saved_json_field, "saved tab has no entry list");
                Vec::new()
            }
        };

        let entries = raw
            .into_iter()
            .filter_map(|value| decode_entry::<E>(domain, value, &name))
            .collect();
        saved.push((Tab { id: tab_id, name }, entries));
    }
    Ok(saved)
}

/// Parse `{ entries: [...] }` / `{ penalties: [...] }` in server field names
/// into entries for the default tab.
pub fn parse_defaults<E: EntrySchema>(domain: &DomainSpec, response: Value) -> Result<Vec<E>, SyncError> {
    let Some(Value::Array(list)) = response.get(domain.collection_field) else {
        return Err(SyncError::Malformed(format!(
            "defaults response has no `{}` array",
            domain.collection_field
        )));
    };
    Ok(list
        .iter()
        .cloned()
        .filter_map(|value| decode_entry::<E>(domain, value, DEFAULT_TAB_NAME))
        .collect())
}

/// Translate, decode, stamp and validate one wire entry. Invalid entries are
/// logged and skipped.
fn decode_entry<E: EntrySchema>(domain: &DomainSpec, value: Value, tab_name: &str) -> Option<E> {
    let Value::Object(object) = value else {
        warn!(domain = %domain.kind, "skipping non-object entry");
        return None;
    };
    let mut entry: E = match serde_json::from_value(Value::Object(domain.translate_from_server(object))) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(domain = %domain.kind, "skipping undecodable entry: {e}");
            return None;
        }
    };
    if entry.id().is_empty() {
        entry.set_id(generate_entry_id());
    }
    entry.set_tab_name(tab_name);
    entry.normalize();
    if let Err(e) = entry.validate() {
        warn!(domain = %domain.kind, entry_id = entry.id(), "skipping invalid entry: {e}");
        return None;
    }
    Some(entry)
}
