mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{Filter, Record, RecordStore, StoreError};

use std::collections::BTreeSet;

use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::bridge::{
    self, ComponentRecord, CourseIdentities, CourseRecord, PhaseIdMap, PhaseRecord, ProjectRecord,
    RelationalBundle,
};
use crate::model::{Course, Phase};

/// A single row that failed during a publish batch. The batch keeps
/// going; failures are reported, not thrown.
#[derive(Clone, Debug)]
pub struct RowFailure {
    pub table: String,
    pub item: String,
    pub message: String,
}

#[derive(Debug)]
pub struct PublishReport {
    pub success: bool,
    pub message: String,
    pub course_id: Option<String>,
    pub phase_ids: PhaseIdMap,
    pub phases_synced: usize,
    pub projects_synced: usize,
    pub components_synced: usize,
    pub failed: Vec<RowFailure>,
    /// Set when the record store was unavailable and the course was
    /// exported locally instead.
    pub offline_export: Option<JsonValue>,
}

impl PublishReport {
    fn empty(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            course_id: None,
            phase_ids: PhaseIdMap::new(),
            phases_synced: 0,
            projects_synced: 0,
            components_synced: 0,
            failed: Vec::new(),
            offline_export: None,
        }
    }
}

/// Orchestrates the idempotent upsert of one course against the remote
/// store: natural keys first (course slug, phase name, project slug,
/// component key), stable-identity creation only when no match exists.
/// Re-running an unchanged publish produces no duplicate rows.
#[derive(Default)]
pub struct RemoteSync {
    in_flight: BTreeSet<String>,
}

impl RemoteSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a course for a publish that spans host event-loop turns.
    /// Returns false while a prior claim is still held. `publish`
    /// claims and releases around its own synchronous run; hosts that
    /// drive the store through an async adapter hold the claim
    /// themselves with this pair.
    pub fn begin_publish(&mut self, course_key: &str) -> bool {
        self.in_flight.insert(course_key.to_string())
    }

    pub fn finish_publish(&mut self, course_key: &str) {
        self.in_flight.remove(course_key);
    }

    /// Best-effort multi-row publish; never a transaction. A course
    /// still claimed is skipped rather than interleaved.
    pub fn publish(&mut self, store: &dyn RecordStore, course: &Course) -> PublishReport {
        if !self.begin_publish(&course.key) {
            return PublishReport::empty(format!(
                "publish already in flight for course {}",
                course.key
            ));
        }
        let report = publish_course(store, course);
        self.finish_publish(&course.key);
        report
    }
}

fn publish_course(store: &dyn RecordStore, course: &Course) -> PublishReport {
    let slug = bridge::course_slug(course);
    let mut report = PublishReport::empty("");

    // 1. Resolve or create the course row by slug.
    let existing = match store.select("courses", &[Filter::eq("slug", slug.clone())]) {
        Ok(rows) => rows,
        Err(StoreError::Unavailable) => return offline_fallback(course),
        Err(e) => {
            report.message = format!("course lookup failed: {}", e);
            return report;
        }
    };

    let meta = json!({ "key": course.key, "icon": course.icon });
    let course_id = if let Some(row) = existing.first() {
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mut patch = Record::new();
        patch.insert("title".to_string(), json!(course.title));
        patch.insert("description".to_string(), json!(course.description));
        patch.insert("meta".to_string(), meta);
        if let Err(e) = store.update("courses", &[Filter::eq("id", id.clone())], patch) {
            warn!(course = course.key.as_str(), error = %e, "course metadata update failed");
            report.failed.push(RowFailure {
                table: "courses".to_string(),
                item: slug.clone(),
                message: e.to_string(),
            });
        }
        id
    } else {
        let record = CourseRecord {
            id: None,
            slug: slug.clone(),
            title: course.title.clone(),
            description: course.description.clone(),
            meta,
        }
        .into_record();
        match store.insert("courses", record) {
            Ok(row) => row
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            Err(StoreError::Unavailable) => return offline_fallback(course),
            Err(e) => {
                // Without a course id nothing downstream can attach.
                report.message = format!("course creation failed: {}", e);
                return report;
            }
        }
    };
    report.course_id = Some(course_id.clone());

    // 2. Phases by (course_id, name); build ordinal -> identity as we go.
    let mut identities = CourseIdentities {
        course_id: course_id.clone(),
        phase_ids: PhaseIdMap::new(),
    };
    for (ordinal, phase) in course.tree.phases.iter().enumerate() {
        let name = Phase::fixed_name(ordinal);
        let filters = [
            Filter::eq("course_id", course_id.clone()),
            Filter::eq("name", name.clone()),
        ];
        let found = match store.select("phases", &filters) {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!(phase = name.as_str(), error = %e, "phase lookup failed");
                report.failed.push(RowFailure {
                    table: "phases".to_string(),
                    item: name,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let record = bridge::phase_record(&course_id, ordinal, phase, &identities);
        let outcome = if let Some(row) = found {
            let id = row
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let mut patch = Record::new();
            patch.insert("position".to_string(), json!(record.position));
            patch.insert("description".to_string(), json!(record.description));
            patch.insert("meta".to_string(), record.meta.clone());
            store
                .update("phases", &[Filter::eq("id", id.clone())], patch)
                .map(|_| id)
        } else {
            store
                .insert("phases", record.clone().into_record())
                .map(|row| {
                    row.get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                })
        };

        match outcome {
            Ok(id) => {
                identities.phase_ids.insert(ordinal, id);
                report.phases_synced += 1;
            }
            Err(e) => {
                warn!(phase = record.name.as_str(), error = %e, "phase sync failed");
                report.failed.push(RowFailure {
                    table: "phases".to_string(),
                    item: record.name,
                    message: e.to_string(),
                });
            }
        }
    }

    // 3 + 4. Projects by (course_id, slug), one upsert per row so a bad
    // row cannot take the rest of the batch down with it.
    for (position, project) in course.tree.projects.iter().enumerate() {
        let record = bridge::project_record(&course_id, project, position, &identities);
        let slug = record.slug.clone();
        match store.upsert("projects", vec![record.into_record()], &["course_id", "slug"]) {
            Ok(_) => report.projects_synced += 1,
            Err(e) => {
                warn!(project = slug.as_str(), error = %e, "project upsert failed");
                report.failed.push(RowFailure {
                    table: "projects".to_string(),
                    item: slug,
                    message: e.to_string(),
                });
            }
        }
    }

    // 5. Components by (course_id, key).
    for (key, component) in &course.tree.component_info {
        let record = bridge::component_record(&course_id, key, component);
        match store.upsert(
            "components",
            vec![record.into_record()],
            &["course_id", "key"],
        ) {
            Ok(_) => report.components_synced += 1,
            Err(e) => {
                warn!(component = key.as_str(), error = %e, "component upsert failed");
                report.failed.push(RowFailure {
                    table: "components".to_string(),
                    item: key.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    report.phase_ids = identities.phase_ids;
    report.success = report.failed.is_empty();
    report.message = format!(
        "synced {} phases, {} projects, {} components ({} failures)",
        report.phases_synced,
        report.projects_synced,
        report.components_synced,
        report.failed.len()
    );
    debug!(course = course.key.as_str(), message = report.message.as_str(), "publish finished");
    report
}

fn offline_fallback(course: &Course) -> PublishReport {
    warn!(course = course.key.as_str(), "record store unavailable; exporting offline bundle");
    let mut report = PublishReport::empty("record store unavailable; course exported locally");
    report.offline_export = Some(bridge::offline_bundle(course));
    report
}

/// Pull one course back out of the relational store by slug. The
/// inverse direction of `publish`; feeds `bridge::to_authoring_document`.
pub fn fetch(store: &dyn RecordStore, slug: &str) -> Result<RelationalBundle, StoreError> {
    let course_row = store
        .select("courses", &[Filter::eq("slug", slug)])?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::row("courses", format!("no course with slug {}", slug)))?;
    let course = CourseRecord::from_record(&course_row);
    let course_id = course.id.clone().unwrap_or_default();

    let by_course = [Filter::eq("course_id", course_id)];
    let phases = store
        .select("phases", &by_course)?
        .iter()
        .map(PhaseRecord::from_record)
        .collect();
    let projects = store
        .select("projects", &by_course)?
        .iter()
        .map(ProjectRecord::from_record)
        .collect();
    let components = store
        .select("components", &by_course)?
        .iter()
        .map(ComponentRecord::from_record)
        .collect();

    Ok(RelationalBundle {
        course,
        phases,
        projects,
        components,
    })
}
