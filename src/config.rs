use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value as JsonValue;

/// Which surface the library is embedded in. Draft restoration is an
/// admin working-copy concern and is skipped entirely on the learner
/// surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    Authoring,
    Learner,
}

/// Course keys every deployment knows about. The draft restore
/// whitelist is this set unioned with any manifest supplied by the host.
pub const DEFAULT_COURSE_KEYS: &[&str] = &["robotics", "coding", "electronics", "design"];

const DEFAULT_CACHE_KEY: &str = "course-content-draft";
const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_UNDO_DEPTH: usize = 20;

#[derive(Clone, Debug)]
pub struct AuthoringConfig {
    pub surface: Surface,
    pub catalog: BTreeSet<String>,
    pub cache_key: String,
    pub debounce: Duration,
    pub undo_depth: usize,
}

impl AuthoringConfig {
    pub fn authoring() -> Self {
        Self::with_surface(Surface::Authoring)
    }

    pub fn learner() -> Self {
        Self::with_surface(Surface::Learner)
    }

    fn with_surface(surface: Surface) -> Self {
        Self {
            surface,
            catalog: DEFAULT_COURSE_KEYS.iter().map(|k| k.to_string()).collect(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            undo_depth: DEFAULT_UNDO_DEPTH,
        }
    }

    /// Resolve from an optional host settings object, field by field,
    /// falling back to defaults for anything missing or out of range.
    pub fn from_settings(surface: Surface, settings: Option<&JsonValue>) -> Self {
        let mut config = Self::with_surface(surface);
        let Some(obj) = settings.and_then(|v| v.as_object()) else {
            return config;
        };

        if let Some(key) = obj
            .get("cacheKey")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            config.cache_key = key;
        }
        if let Some(ms) = obj
            .get("debounceMs")
            .and_then(|v| v.as_u64())
            .filter(|ms| *ms > 0)
        {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(depth) = obj
            .get("undoDepth")
            .and_then(|v| v.as_u64())
            .filter(|d| *d > 0)
        {
            config.undo_depth = depth as usize;
        }
        if let Some(keys) = obj.get("courseKeys").and_then(|v| v.as_array()) {
            let manifest = keys
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            config.catalog.extend(manifest);
        }

        config
    }

    /// Union an externally supplied course manifest into the whitelist.
    pub fn extend_catalog<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog.extend(keys.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_override_defaults_field_by_field() {
        let settings = json!({
            "debounceMs": 500,
            "undoDepth": 0,
            "courseKeys": ["mechatronics", " "]
        });
        let config = AuthoringConfig::from_settings(Surface::Authoring, Some(&settings));

        assert_eq!(config.debounce, Duration::from_millis(500));
        // Zero depth is out of range; default kept.
        assert_eq!(config.undo_depth, DEFAULT_UNDO_DEPTH);
        assert!(config.catalog.contains("mechatronics"));
        assert!(config.catalog.contains("robotics"));
        assert!(!config.catalog.contains(" "));
    }

    #[test]
    fn missing_settings_yield_defaults() {
        let config = AuthoringConfig::from_settings(Surface::Learner, None);
        assert_eq!(config.surface, Surface::Learner);
        assert_eq!(config.cache_key, DEFAULT_CACHE_KEY);
    }
}
