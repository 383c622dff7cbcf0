// Grouped, display-ready summary of a tab's entries.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::schema::EntrySchema;

/// One row of the grouped view: everything known about a single game (or
/// penalty) name across the tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub modes_display: String,
    pub difficulty_range_display: String,
    pub player_range_display: String,
    /// Ids of the entries in this group, in list order. Edits and deletes
    /// made from the grouped view are scoped to these.
    pub entry_ids: Vec<String>,
}

#[derive(Default)]
struct Bucket {
    modes: BTreeSet<String>,
    /// Difficulties in tenths, so they can be ordered and deduplicated
    /// exactly.
    difficulty_tenths: BTreeSet<i64>,
    players: BTreeSet<u32>,
    entry_ids: Vec<String>,
}

/// Group entries by trimmed name. Entries with an empty name are skipped.
/// Pure: the same input always gives the same output.
pub fn group_entries<E: EntrySchema>(entries: &[E]) -> BTreeMap<String, GroupSummary> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for entry in entries {
        let name = entry.name().trim();
        if name.is_empty() {
            continue;
        }
        let bucket = buckets.entry(name.to_string()).or_default();

        if let Some(mode) = entry.mode().map(str::trim).filter(|m| !m.is_empty()) {
            bucket.modes.insert(mode.to_string());
        }
        if let Some(d) = entry.difficulty().filter(|d| d.is_finite()) {
            bucket.difficulty_tenths.insert((d * 10.0).round() as i64);
        }
        if let Some(p) = entry.player_count() {
            bucket.players.insert(p);
        }
        bucket.entry_ids.push(entry.id().to_string());
    }

    buckets
        .into_iter()
        .map(|(name, bucket)| {
            let summary = GroupSummary {
                modes_display: bucket.modes.into_iter().collect::<Vec<_>>().join(", "),
                difficulty_range_display: collapse_range(&bucket.difficulty_tenths, format_tenths),
                player_range_display: collapse_range(&bucket.players, |p| p.to_string()),
                entry_ids: bucket.entry_ids,
            };
            (name, summary)
        })
        .collect()
}

/// `"X"` for a single distinct value, `"min-max"` otherwise, `""` for none.
fn collapse_range<T: Copy + Ord>(values: &BTreeSet<T>, fmt: impl Fn(T) -> String) -> String {
    match (values.first(), values.last()) {
        (Some(&min), Some(&max)) if min == max => fmt(min),
        (Some(&min), Some(&max)) => format!("{}-{}", fmt(min), fmt(max)),
        _ => String::new(),
    }
}

fn format_tenths(tenths: i64) -> String {
    format!("{:.1}", tenths as f64 / 10.0)
}
