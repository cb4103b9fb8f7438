use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A field that is either a plain string (legacy shorthand for a
/// Turkish-only value) or a full `{tr, en}` pair. All read sites go
/// through `tr()` / `pair()`; never match on the variants directly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Localized {
    Pair {
        #[serde(default)]
        tr: String,
        #[serde(default)]
        en: String,
    },
    Plain(String),
}

impl Localized {
    pub fn plain(text: impl Into<String>) -> Self {
        Localized::Plain(text.into())
    }

    pub fn pair(tr: impl Into<String>, en: impl Into<String>) -> Self {
        Localized::Pair {
            tr: tr.into(),
            en: en.into(),
        }
    }

    /// The Turkish half, which is the value the relational schema stores.
    pub fn tr(&self) -> &str {
        match self {
            Localized::Pair { tr, .. } => tr,
            Localized::Plain(s) => s,
        }
    }

    pub fn en(&self) -> &str {
        match self {
            Localized::Pair { en, .. } => en,
            Localized::Plain(_) => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tr().trim().is_empty()
    }

    /// Canonical form: a bare string upgrades to `{tr, en: ""}`.
    pub fn normalized(self) -> Self {
        match self {
            Localized::Plain(s) => Localized::Pair {
                tr: s,
                en: String::new(),
            },
            pair => pair,
        }
    }
}

impl Default for Localized {
    fn default() -> Self {
        Localized::Plain(String::new())
    }
}

/// An ordered learning unit. Phases have no stable id in the authoring
/// document; their ordinal position in `ContentTree::phases` is the
/// reference projects use.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Phase {
    pub icon: String,
    pub description: String,
    pub color: String,
}

impl Phase {
    /// Fixed per-ordinal name. Index 0 is always the intro phase. This
    /// is the natural key the relational sync matches phases on, so it
    /// must stay stable even when icon/description are edited.
    pub fn fixed_name(index: usize) -> String {
        if index == 0 {
            "Intro".to_string()
        } else {
            format!("Phase {}", index)
        }
    }

    /// Display title shown in the authoring UI: icon plus fixed name.
    pub fn display_title(&self, index: usize) -> String {
        format!("{} {}", self.icon, Self::fixed_name(index))
            .trim()
            .to_string()
    }
}

/// Percentage-normalized image coordinates (0..100).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Hotspot {
    pub name: String,
    pub desc: String,
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizQuestion {
    pub question: Localized,
    pub options: Vec<Localized>,
    pub answer: usize,
}

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

/// A lesson. `id` is author-assigned and unique within a course;
/// `phase` is an ordinal into `ContentTree::phases`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: i64,
    pub phase: usize,
    pub title: Localized,
    pub desc: Localized,
    pub mission: Localized,
    pub theory: Localized,
    pub challenge: Localized,
    pub materials: Vec<String>,
    pub code: String,
    pub quiz: Vec<QuizQuestion>,
    pub hidden_tabs: Vec<String>,
    pub hotspots: Option<Vec<Hotspot>>,
    pub icon: String,
    pub difficulty: String,
    pub duration: String,
    pub tags: Vec<String>,
    pub prerequisites: Vec<i64>,
    pub has_graph: bool,
    pub main_component: Option<String>,
}

impl Project {
    /// `code` doubles as either literal source text or an image
    /// filename; the UI keys the editor widget off this.
    pub fn code_is_image(&self) -> bool {
        let lower = self.code.trim().to_ascii_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }
}

/// Hardware/software component catalog entry, keyed by a free-text
/// identifier in `ContentTree::component_info`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Component {
    pub name: String,
    pub icon: String,
    pub img_file_name: String,
    pub desc: String,
}

/// One course's full authoring document: phases, projects and the
/// component catalog. Pure data; mutation lives on `ContentStore`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ContentTree {
    pub phases: Vec<Phase>,
    pub projects: Vec<Project>,
    #[serde(rename = "componentInfo")]
    pub component_info: BTreeMap<String, Component>,
}

impl ContentTree {
    pub fn project(&self, id: i64) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_mut(&mut self, id: i64) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    /// Next free author-assigned id. Ids are monotonic-ish, not gapless.
    pub fn next_project_id(&self) -> i64 {
        self.projects.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    /// Resolve a `Project::materials` entry against the component
    /// catalog. Older courses reference components by display name
    /// instead of key, so both are accepted.
    pub fn component_for_material(&self, material: &str) -> Option<(&str, &Component)> {
        if let Some((key, comp)) = self.component_info.get_key_value(material) {
            return Some((key.as_str(), comp));
        }
        self.component_info
            .iter()
            .find(|(_, comp)| comp.name == material)
            .map(|(key, comp)| (key.as_str(), comp))
    }
}

/// Top-level authoring unit. `key` is the stable catalog slug; the
/// remaining metadata is display-only.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Course {
    pub key: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub tree: ContentTree,
}

impl Course {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localized_accepts_plain_string_and_pair() {
        let plain: Localized = serde_json::from_str("\"Merhaba\"").expect("plain");
        assert_eq!(plain.tr(), "Merhaba");
        assert_eq!(plain.en(), "");

        let pair: Localized =
            serde_json::from_str(r#"{"tr":"Merhaba","en":"Hello"}"#).expect("pair");
        assert_eq!(pair.tr(), "Merhaba");
        assert_eq!(pair.en(), "Hello");
    }

    #[test]
    fn localized_normalizes_plain_to_pair() {
        let norm = Localized::plain("Devre").normalized();
        assert_eq!(norm, Localized::pair("Devre", ""));
    }

    #[test]
    fn code_image_detection_is_extension_based() {
        let mut p = Project {
            code: "wiring-diagram.PNG".to_string(),
            ..Project::default()
        };
        assert!(p.code_is_image());

        p.code = "let led = 13;".to_string();
        assert!(!p.code_is_image());
    }

    #[test]
    fn material_lookup_matches_key_then_name() {
        let mut tree = ContentTree::default();
        tree.component_info.insert(
            "led-red".to_string(),
            Component {
                name: "Red LED".to_string(),
                ..Component::default()
            },
        );

        assert_eq!(tree.component_for_material("led-red").map(|(k, _)| k), Some("led-red"));
        assert_eq!(tree.component_for_material("Red LED").map(|(k, _)| k), Some("led-red"));
        assert!(tree.component_for_material("Buzzer").is_none());
    }

    #[test]
    fn phase_names_are_fixed_by_ordinal() {
        assert_eq!(Phase::fixed_name(0), "Intro");
        assert_eq!(Phase::fixed_name(3), "Phase 3");

        let phase = Phase {
            icon: "🤖".to_string(),
            ..Phase::default()
        };
        assert_eq!(phase.display_title(1), "🤖 Phase 1");
    }
}
