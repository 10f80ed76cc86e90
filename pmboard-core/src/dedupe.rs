//! Collapsing of near-duplicate changelog entries.
//!
//! Some write paths can log the same logical event more than once in quick
//! succession. [`dedupe_changelog`] hides those repeats when reading the log
//! without touching what is stored.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{ChangeAction, ChangeLogEntry};

/// Entries with the same identity closer together than this are collapsed.
pub const DEDUPE_WINDOW_MS: i64 = 5000;

#[derive(Debug, PartialEq, Eq, Hash)]
struct EntryKey {
    project_id: String,
    action: ChangeAction,
    feature_id: String,
    subtask_id: String,
    summary: String,
    meta: String,
}

impl EntryKey {
    fn of(entry: &ChangeLogEntry) -> Self {
        Self {
            project_id: entry.project_id.to_string(),
            action: entry.action,
            feature_id: entry.feature_id.map(|id| id.to_string()).unwrap_or_default(),
            subtask_id: entry.subtask_id.map(|id| id.to_string()).unwrap_or_default(),
            summary: entry.summary.clone(),
            meta: canonical_json(entry.meta.as_ref().unwrap_or(&Value::Null)),
        }
    }
}

/// Drops entries that repeat a newer entry with the same identity within
/// [`DEDUPE_WINDOW_MS`].
///
/// `entries` must be sorted newest first; the input is not re-sorted. The
/// result is a subsequence of the input in the original order.
pub fn dedupe_changelog(entries: Vec<ChangeLogEntry>) -> Vec<ChangeLogEntry> {
    let mut kept_at: HashMap<EntryKey, i64> = HashMap::new();
    let mut deduped = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = EntryKey::of(&entry);
        let ts = entry.created_at.timestamp_millis();

        if let Some(&newest) = kept_at.get(&key) {
            if newest - ts < DEDUPE_WINDOW_MS {
                continue;
            }
        }

        kept_at.insert(key, ts);
        deduped.push(entry);
    }

    deduped
}

/// Serializes JSON with object keys sorted at every level, so two values
/// that differ only in key order compare equal.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
