use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AuthoringConfig, Surface};
use crate::content::CourseEntry;
use crate::model::ContentTree;

/// Drafts newer than "now + 24h" are assumed to come from a skewed
/// clock or a corrupted record and are not merged.
const MAX_FUTURE_TIMESTAMP_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Error, Debug)]
pub enum CacheWriteError {
    #[error("draft store quota exceeded: {0}")]
    Quota(String),
    #[error("draft store write failed: {0}")]
    Io(String),
}

/// The browser-provided persistent key-value store, reduced to the
/// three calls the cache needs. Implementations must not throw past
/// `set`; everything else is infallible by contract.
pub trait DraftStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheWriteError>;
    fn remove(&mut self, key: &str);
}

/// One file per key under a workspace directory.
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl DraftStore for FileDraftStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheWriteError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheWriteError::Io(e.to_string()))?;
        std::fs::write(self.path_for(key), value).map_err(|e| CacheWriteError::Io(e.to_string()))
    }

    fn remove(&mut self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

/// In-memory backend for tests and hosts without a disk workspace.
#[derive(Default)]
pub struct MemoryDraftStore {
    map: BTreeMap<String, String>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheWriteError> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

/// Status signal surfaced to the UI; write failures land here instead
/// of propagating to the mutation that triggered them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Idle,
    Pending,
    Saved { at_ms: i64 },
    Failed { message: String },
}

/// Debounced write-through of the whole multi-course map to a single
/// well-known key, plus the guarded restore path.
pub struct DraftCache {
    store: Box<dyn DraftStore>,
    key: String,
    window: Duration,
    dirty_at: Option<Instant>,
    status: CacheStatus,
}

impl DraftCache {
    pub fn new(store: Box<dyn DraftStore>, key: impl Into<String>, window: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            window,
            dirty_at: None,
            status: CacheStatus::Idle,
        }
    }

    /// Mark the in-memory state dirty. Each call restarts the debounce
    /// window; only the final quiet period produces a write.
    pub fn schedule(&mut self) {
        self.dirty_at = Some(Instant::now());
        self.status = CacheStatus::Pending;
    }

    /// Write the pending draft if the debounce window has elapsed.
    /// Returns whether a write happened. Callers drive this from their
    /// event loop tick.
    pub fn flush_due(&mut self, now: Instant, courses: &BTreeMap<String, CourseEntry>) -> bool {
        let Some(dirty_at) = self.dirty_at else {
            return false;
        };
        if now.saturating_duration_since(dirty_at) < self.window {
            return false;
        }
        self.flush(courses);
        true
    }

    /// Serialize everything now, debounce or not.
    pub fn flush(&mut self, courses: &BTreeMap<String, CourseEntry>) {
        self.dirty_at = None;

        let mut data = serde_json::Map::new();
        for (key, entry) in courses {
            match serde_json::to_value(&entry.course.tree) {
                Ok(tree) => {
                    data.insert(key.clone(), tree);
                }
                Err(e) => {
                    warn!(course = key.as_str(), error = %e, "draft serialization skipped course");
                }
            }
        }

        let course_count = data.len();
        let at_ms = Utc::now().timestamp_millis();
        let record = json!({ "timestamp": at_ms, "data": data });
        let text = record.to_string();

        match self.store.set(&self.key, &text) {
            Ok(()) => {
                debug!(courses = course_count, bytes = text.len(), "draft flushed");
                self.status = CacheStatus::Saved { at_ms };
            }
            Err(e) => {
                warn!(error = %e, "draft write failed");
                self.status = CacheStatus::Failed {
                    message: e.to_string(),
                };
            }
        }
    }

    /// Merge a previously stored draft into memory. Returns the number
    /// of course entries accepted. Three independent gates apply:
    /// surface, structural validity, and per-course whitelist with
    /// sanitization; a course already flagged remote-sourced is never
    /// overwritten from a draft.
    pub fn restore(
        &mut self,
        config: &AuthoringConfig,
        courses: &mut BTreeMap<String, CourseEntry>,
    ) -> usize {
        if config.surface != Surface::Authoring {
            return 0;
        }

        let Some(text) = self.store.get(&self.key) else {
            return 0;
        };

        let record: JsonValue = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                // Corrupted drafts are deleted, not retried.
                warn!(error = %e, "stored draft unparseable; discarding");
                self.store.remove(&self.key);
                return 0;
            }
        };

        let Some(obj) = record.as_object() else {
            return 0;
        };
        let Some(data) = obj.get("data").and_then(|v| v.as_object()) else {
            return 0;
        };
        if data.is_empty() {
            return 0;
        }
        if let Some(ts) = obj.get("timestamp") {
            let Some(ms) = ts.as_i64() else {
                return 0;
            };
            if ms > Utc::now().timestamp_millis() + MAX_FUTURE_TIMESTAMP_MS {
                return 0;
            }
        }

        let mut merged = 0;
        for (key, tree_value) in data {
            if !config.catalog.contains(key) {
                continue;
            }
            if courses.get(key).map(|e| e.remote_sourced) == Some(true) {
                continue;
            }

            let sanitized = sanitize_value(tree_value.clone());
            let tree: ContentTree = match serde_json::from_value(sanitized) {
                Ok(t) => t,
                Err(e) => {
                    warn!(course = key.as_str(), error = %e, "draft entry malformed; skipped");
                    continue;
                }
            };

            courses
                .entry(key.clone())
                .or_insert_with(|| CourseEntry::stub(key))
                .course
                .tree = tree;
            merged += 1;
        }

        debug!(merged, "draft restore finished");
        merged
    }

    /// Drop the stored record and reset the status signal.
    pub fn clear(&mut self) {
        self.store.remove(&self.key);
        self.dirty_at = None;
        self.status = CacheStatus::Idle;
    }

    pub fn status(&self) -> &CacheStatus {
        &self.status
    }

    pub fn stored_text(&self) -> Option<String> {
        self.store.get(&self.key)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Deep HTML-escape every string value in a draft entry before it is
/// allowed anywhere near the in-memory tree.
///
/// Escaping runs once per restore pass; a tree that cycles through
/// restore, flush and restore again carries one more layer each cycle
/// (`&` becomes `&amp;`, then `&amp;amp;`). Hosts render draft text as
/// plain text, never as markup.
fn sanitize_value(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(escape_html(&s)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(sanitize_value).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_escapes_nested_strings() {
        let dirty = json!({
            "projects": [{ "title": "<script>alert(1)</script>" }],
            "n": 7
        });
        let clean = sanitize_value(dirty);
        assert_eq!(
            clean["projects"][0]["title"],
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
        assert_eq!(clean["n"], 7);
    }

    #[test]
    fn escape_handles_quotes_and_ampersands() {
        assert_eq!(escape_html(r#"a & "b" 'c'"#), "a &amp; &quot;b&quot; &#39;c&#39;");
    }

    #[test]
    fn sanitize_adds_one_layer_per_pass() {
        let once = sanitize_value(json!("Arduino & LED"));
        assert_eq!(once, json!("Arduino &amp; LED"));
        let twice = sanitize_value(once);
        assert_eq!(twice, json!("Arduino &amp;amp; LED"));
    }
}
