use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value as JsonValue;

use crate::config::AuthoringConfig;
use crate::draft::{CacheStatus, DraftCache, DraftStore};
use crate::model::{Component, ContentTree, Course, Phase, Project};
use crate::undo::{UndoEntry, UndoKind, UndoLedger};
use crate::validate::{self, Issue};

/// One course held in memory, plus where its authoritative copy lives.
/// A remote-sourced course is never overwritten from a local draft.
#[derive(Clone, Debug)]
pub struct CourseEntry {
    pub course: Course,
    pub remote_sourced: bool,
}

impl CourseEntry {
    pub fn stub(key: &str) -> Self {
        Self {
            course: Course::new(key, key),
            remote_sourced: false,
        }
    }
}

/// What `delete_phase` removed, plus how many projects referenced the
/// removed ordinal and are now unreachable. Reported, never repaired.
#[derive(Clone, Debug)]
pub struct PhaseRemoval {
    pub phase: Phase,
    pub orphaned_projects: usize,
}

/// The authoritative in-memory state of every loaded course. An
/// explicit instance owned by the host and passed by reference; all
/// mutation targets the active course and schedules the draft cache.
pub struct ContentStore {
    config: AuthoringConfig,
    courses: BTreeMap<String, CourseEntry>,
    active: String,
    draft: DraftCache,
    undo: UndoLedger,
}

impl ContentStore {
    pub fn new(config: AuthoringConfig, draft_store: Box<dyn DraftStore>) -> Self {
        let draft = DraftCache::new(draft_store, config.cache_key.clone(), config.debounce);
        let undo = UndoLedger::new(config.undo_depth);

        let mut courses = BTreeMap::new();
        for key in &config.catalog {
            courses.insert(key.clone(), CourseEntry::stub(key));
        }
        let active = config.catalog.iter().next().cloned().unwrap_or_default();

        Self {
            config,
            courses,
            active,
            draft,
            undo,
        }
    }

    // ---- course bookkeeping ----

    pub fn active_key(&self) -> &str {
        &self.active
    }

    /// Switch which course is visible/mutated. Others stay in memory.
    pub fn set_active(&mut self, key: &str) -> bool {
        if self.courses.contains_key(key) {
            self.active = key.to_string();
            true
        } else {
            false
        }
    }

    pub fn ensure_course(&mut self, course: Course) {
        let key = course.key.clone();
        match self.courses.entry(key.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().course = course,
            Entry::Vacant(entry) => {
                entry.insert(CourseEntry {
                    course,
                    remote_sourced: false,
                });
            }
        }
        if self.active.is_empty() {
            self.active = key;
        }
    }

    pub fn course(&self, key: &str) -> Option<&Course> {
        self.courses.get(key).map(|e| &e.course)
    }

    pub fn active_course(&self) -> Option<&Course> {
        self.course(&self.active)
    }

    pub fn active_tree(&self) -> Option<&ContentTree> {
        self.active_course().map(|c| &c.tree)
    }

    pub fn mark_remote_sourced(&mut self, key: &str, remote: bool) {
        if let Some(entry) = self.courses.get_mut(key) {
            entry.remote_sourced = remote;
        }
    }

    pub fn is_remote_sourced(&self, key: &str) -> bool {
        self.courses.get(key).map(|e| e.remote_sourced) == Some(true)
    }

    fn active_tree_mut(&mut self) -> Option<&mut ContentTree> {
        self.courses
            .get_mut(&self.active)
            .map(|e| &mut e.course.tree)
    }

    // ---- project mutations ----

    pub fn add_project(&mut self, project: Project) {
        if let Some(tree) = self.active_tree_mut() {
            tree.projects.push(project);
            self.draft.schedule();
        }
    }

    /// Shallow JSON-merge patch over the serialized project. An invalid
    /// patch leaves the project untouched and returns false.
    pub fn update_project(&mut self, id: i64, patch: &JsonValue) -> bool {
        let Some(tree) = self.active_tree_mut() else {
            return false;
        };
        let Some(project) = tree.project_mut(id) else {
            return false;
        };
        let Some(patch_obj) = patch.as_object() else {
            return false;
        };

        let mut merged = match serde_json::to_value(&*project) {
            Ok(JsonValue::Object(map)) => map,
            _ => return false,
        };
        for (field, value) in patch_obj {
            merged.insert(field.clone(), value.clone());
        }

        match serde_json::from_value::<Project>(JsonValue::Object(merged)) {
            Ok(updated) => {
                *project = updated;
                self.draft.schedule();
                true
            }
            Err(_) => false,
        }
    }

    /// Removes and returns the project; a deep copy goes to the undo
    /// ledger first.
    pub fn delete_project(&mut self, id: i64) -> Option<Project> {
        let active = self.active.clone();
        let tree = self.active_tree_mut()?;
        let index = tree.projects.iter().position(|p| p.id == id)?;
        let removed = tree.projects.remove(index);

        self.undo.push(UndoEntry {
            course_key: active,
            kind: UndoKind::Project(removed.clone()),
        });
        self.draft.schedule();
        Some(removed)
    }

    // ---- phase mutations ----

    pub fn add_phase(&mut self, phase: Phase) {
        if let Some(tree) = self.active_tree_mut() {
            tree.phases.push(phase);
            self.draft.schedule();
        }
    }

    /// Deleting a phase shifts all higher ordinals down; projects that
    /// referenced the removed ordinal become unreachable. Accepted
    /// authoring risk: the count is reported, nothing is rewritten.
    pub fn delete_phase(&mut self, index: usize) -> Option<PhaseRemoval> {
        let tree = self.active_tree_mut()?;
        if index >= tree.phases.len() {
            return None;
        }
        let phase = tree.phases.remove(index);
        let orphaned_projects = tree.projects.iter().filter(|p| p.phase == index).count();

        self.draft.schedule();
        Some(PhaseRemoval {
            phase,
            orphaned_projects,
        })
    }

    // ---- component mutations ----

    pub fn add_component(&mut self, key: impl Into<String>, component: Component) {
        if let Some(tree) = self.active_tree_mut() {
            tree.component_info.insert(key.into(), component);
            self.draft.schedule();
        }
    }

    pub fn delete_component(&mut self, key: &str) -> Option<Component> {
        let active = self.active.clone();
        let tree = self.active_tree_mut()?;
        let removed = tree.component_info.remove(key)?;

        self.undo.push(UndoEntry {
            course_key: active,
            kind: UndoKind::Component {
                key: key.to_string(),
                data: removed.clone(),
            },
        });
        self.draft.schedule();
        Some(removed)
    }

    // ---- undo ----

    /// Replay the most recent destructive delete. Switches the active
    /// course if the entry belongs to another one, and re-appends the
    /// captured data; the original array position is not restored.
    pub fn undo(&mut self) -> Option<UndoEntry> {
        let entry = self.undo.pop()?;
        if entry.course_key != self.active {
            if !self.courses.contains_key(&entry.course_key) {
                self.courses
                    .insert(entry.course_key.clone(), CourseEntry::stub(&entry.course_key));
            }
            self.active = entry.course_key.clone();
        }

        let tree = self.active_tree_mut()?;
        match &entry.kind {
            UndoKind::Project(project) => tree.projects.push(project.clone()),
            UndoKind::Component { key, data } => {
                tree.component_info.insert(key.clone(), data.clone());
            }
        }
        self.draft.schedule();
        Some(entry)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    // ---- draft cache plumbing ----

    /// Event-loop tick: writes the draft if the debounce window since
    /// the last mutation has elapsed.
    pub fn flush_draft_due(&mut self, now: Instant) -> bool {
        self.draft.flush_due(now, &self.courses)
    }

    pub fn flush_draft(&mut self) {
        self.draft.flush(&self.courses);
    }

    pub fn restore_draft(&mut self) -> usize {
        let Self {
            config,
            courses,
            draft,
            ..
        } = self;
        draft.restore(config, courses)
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    pub fn draft_status(&self) -> &CacheStatus {
        self.draft.status()
    }

    pub fn stored_draft_text(&self) -> Option<String> {
        self.draft.stored_text()
    }

    // ---- validation ----

    pub fn validate_active(&self) -> Vec<Issue> {
        self.active_tree().map(validate::check).unwrap_or_default()
    }
}
