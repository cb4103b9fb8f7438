use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use crate::model::{
    Component, ContentTree, Course, Hotspot, Localized, Phase, Project, QuizQuestion,
};
use crate::remote::Record;

/// Ordinal phase position -> stable relational identity. The authoring
/// document only ever holds the ordinal; this map is rebuilt for every
/// sync and never persisted.
pub type PhaseIdMap = BTreeMap<usize, String>;

/// Stable identities for one course, resolved remotely during a publish
/// or minted locally for offline export.
#[derive(Clone, Debug)]
pub struct CourseIdentities {
    pub course_id: String,
    pub phase_ids: PhaseIdMap,
}

impl CourseIdentities {
    /// Mint fresh identities for every phase. Used when no remote
    /// round-trip is available (offline export, local round-trips).
    pub fn local(course: &Course) -> Self {
        let phase_ids = course
            .tree
            .phases
            .iter()
            .enumerate()
            .map(|(i, _)| (i, Uuid::new_v4().to_string()))
            .collect();
        Self {
            course_id: Uuid::new_v4().to_string(),
            phase_ids,
        }
    }

    /// Resolve an ordinal to a phase identity. The relational foreign
    /// key is non-nullable, so an unmapped ordinal falls back to the
    /// first available identity rather than skipping the project.
    pub fn resolve_phase_id(&self, ordinal: usize) -> String {
        if let Some(id) = self.phase_ids.get(&ordinal) {
            return id.clone();
        }
        self.phase_ids.values().next().cloned().unwrap_or_default()
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct CourseRecord {
    pub id: Option<String>,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub meta: JsonValue,
}

#[derive(Serialize, Clone, Debug)]
pub struct PhaseRecord {
    pub id: Option<String>,
    pub course_id: String,
    pub name: String,
    pub description: String,
    pub position: i64,
    pub meta: JsonValue,
}

#[derive(Serialize, Clone, Debug)]
pub struct ProjectRecord {
    pub id: Option<String>,
    pub course_id: String,
    pub phase_id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub materials: JsonValue,
    pub code: String,
    pub component_info: JsonValue,
    pub position: i64,
}

#[derive(Serialize, Clone, Debug)]
pub struct ComponentRecord {
    pub course_id: String,
    pub key: String,
    pub data: JsonValue,
}

/// The normalized shape of one course: what `publish` writes and what a
/// pull from the relational store hands back.
#[derive(Serialize, Clone, Debug)]
pub struct RelationalBundle {
    pub course: CourseRecord,
    pub phases: Vec<PhaseRecord>,
    pub projects: Vec<ProjectRecord>,
    pub components: Vec<ComponentRecord>,
}

/// Lower-cased, diacritic-stripped, non-alphanumeric runs collapsed to
/// a single dash. Handles the Turkish letters course titles actually
/// contain.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    // Unicode lowercase of 'İ' is 'i' plus a combining dot above, so
    // the Turkish capitals fold before any generic lowercasing.
    for ch in text.chars() {
        let folded = match ch {
            'Ç' | 'ç' => 'c',
            'Ğ' | 'ğ' => 'g',
            'İ' | 'I' | 'ı' | 'Î' | 'î' | 'Ì' | 'ì' | 'Í' | 'í' | 'Ï' | 'ï' => 'i',
            'Ö' | 'ö' | 'Ô' | 'ô' | 'Ò' | 'ò' | 'Ó' | 'ó' => 'o',
            'Ş' | 'ş' => 's',
            'Ü' | 'ü' | 'Û' | 'û' | 'Ù' | 'ù' | 'Ú' | 'ú' => 'u',
            'Â' | 'â' | 'À' | 'à' | 'Á' | 'á' | 'Ä' | 'ä' => 'a',
            'É' | 'é' | 'È' | 'è' | 'Ê' | 'ê' | 'Ë' | 'ë' => 'e',
            'Ñ' | 'ñ' => 'n',
            other => other.to_ascii_lowercase(),
        };
        if folded.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(folded);
        } else if !('\u{0300}'..='\u{036f}').contains(&folded) {
            // combining marks vanish; everything else separates
            pending_dash = true;
        }
    }

    slug
}

pub fn course_slug(course: &Course) -> String {
    let from_title = slugify(&course.title);
    if from_title.is_empty() {
        slugify(&course.key)
    } else {
        from_title
    }
}

pub fn project_slug(project: &Project) -> String {
    let from_title = slugify(project.title.tr());
    if from_title.is_empty() {
        format!("project-{}", project.id)
    } else {
        from_title
    }
}

/// Flatten one course into relational records. Localized fields carry
/// only their `tr` half (the relational schema is single-locale); every
/// field without a direct column rides in the `component_info` side
/// channel so schema changes never force a paired authoring migration.
pub fn to_relational(course: &Course, identities: &CourseIdentities) -> RelationalBundle {
    let course_id = identities.course_id.clone();

    let course_record = CourseRecord {
        id: Some(course_id.clone()),
        slug: course_slug(course),
        title: course.title.clone(),
        description: course.description.clone(),
        meta: json!({ "key": course.key, "icon": course.icon }),
    };

    let phases = course
        .tree
        .phases
        .iter()
        .enumerate()
        .map(|(ordinal, phase)| phase_record(&course_id, ordinal, phase, identities))
        .collect();

    let projects = course
        .tree
        .projects
        .iter()
        .enumerate()
        .map(|(position, project)| project_record(&course_id, project, position, identities))
        .collect();

    let components = course
        .tree
        .component_info
        .iter()
        .map(|(key, component)| component_record(&course_id, key, component))
        .collect();

    RelationalBundle {
        course: course_record,
        phases,
        projects,
        components,
    }
}

pub fn phase_record(
    course_id: &str,
    ordinal: usize,
    phase: &Phase,
    identities: &CourseIdentities,
) -> PhaseRecord {
    PhaseRecord {
        id: identities.phase_ids.get(&ordinal).cloned(),
        course_id: course_id.to_string(),
        name: Phase::fixed_name(ordinal),
        description: phase.description.clone(),
        position: ordinal as i64,
        meta: json!({ "icon": phase.icon, "color": phase.color }),
    }
}

pub fn project_record(
    course_id: &str,
    project: &Project,
    position: usize,
    identities: &CourseIdentities,
) -> ProjectRecord {
    ProjectRecord {
        id: None,
        course_id: course_id.to_string(),
        phase_id: identities.resolve_phase_id(project.phase),
        slug: project_slug(project),
        title: project.title.tr().to_string(),
        description: project.desc.tr().to_string(),
        materials: JsonValue::from(project.materials.clone()),
        code: project.code.clone(),
        component_info: side_channel(project),
        position: position as i64,
    }
}

pub fn component_record(course_id: &str, key: &str, component: &Component) -> ComponentRecord {
    ComponentRecord {
        course_id: course_id.to_string(),
        key: key.to_string(),
        data: serde_json::to_value(component).unwrap_or(JsonValue::Null),
    }
}

/// Everything without a relational column, packed opaquely. `localId`
/// preserves the author-assigned lesson id across the round trip.
fn side_channel(project: &Project) -> JsonValue {
    json!({
        "localId": project.id,
        "icon": project.icon,
        "mission": project.mission.tr(),
        "theory": project.theory.tr(),
        "challenge": project.challenge.tr(),
        "quiz": flatten_quiz(&project.quiz),
        "hiddenTabs": project.hidden_tabs,
        "hotspots": project.hotspots,
        "difficulty": project.difficulty,
        "duration": project.duration,
        "tags": project.tags,
        "prerequisites": project.prerequisites,
        "hasGraph": project.has_graph,
        "mainComponent": project.main_component,
    })
}

fn flatten_quiz(quiz: &[QuizQuestion]) -> JsonValue {
    let questions: Vec<JsonValue> = quiz
        .iter()
        .map(|q| {
            json!({
                "question": q.question.tr(),
                "options": q.options.iter().map(|o| o.tr()).collect::<Vec<_>>(),
                "answer": q.answer,
            })
        })
        .collect();
    JsonValue::from(questions)
}

/// Rebuild the authoring document from relational records. Phases come
/// back ordered by `position`; each project's `phase` is rewritten to
/// the ordinal of its `phase_id` (unknown identities land on 0). The
/// English half of localized fields is not reconstructible and comes
/// back empty; that loss is part of the contract, not a bug.
pub fn to_authoring_document(bundle: &RelationalBundle) -> Course {
    let meta = bundle.course.meta.as_object();
    let key = meta
        .and_then(|m| m.get("key"))
        .and_then(|v| v.as_str())
        .unwrap_or(&bundle.course.slug)
        .to_string();
    let icon = meta
        .and_then(|m| m.get("icon"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut phases: Vec<&PhaseRecord> = bundle.phases.iter().collect();
    phases.sort_by_key(|p| p.position);

    let mut ordinal_of: BTreeMap<&str, usize> = BTreeMap::new();
    let mut tree = ContentTree::default();
    for (ordinal, record) in phases.iter().enumerate() {
        if let Some(id) = record.id.as_deref() {
            ordinal_of.insert(id, ordinal);
        }
        let meta = record.meta.as_object();
        tree.phases.push(Phase {
            icon: meta
                .and_then(|m| m.get("icon"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            description: record.description.clone(),
            color: meta
                .and_then(|m| m.get("color"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        });
    }

    let mut projects: Vec<&ProjectRecord> = bundle.projects.iter().collect();
    projects.sort_by_key(|p| p.position);
    for record in projects {
        tree.projects.push(unpack_project(record, &ordinal_of));
    }

    for record in &bundle.components {
        let component: Component =
            serde_json::from_value(record.data.clone()).unwrap_or_default();
        tree.component_info.insert(record.key.clone(), component);
    }

    Course {
        key,
        title: bundle.course.title.clone(),
        description: bundle.course.description.clone(),
        icon,
        tree,
    }
}

fn unpack_project(record: &ProjectRecord, ordinal_of: &BTreeMap<&str, usize>) -> Project {
    let info = record.component_info.as_object();
    let get = |field: &str| -> JsonValue {
        info.and_then(|m| m.get(field)).cloned().unwrap_or(JsonValue::Null)
    };
    let get_str = |field: &str| -> String {
        get(field).as_str().unwrap_or_default().to_string()
    };
    let localized = |text: String| Localized::pair(text, "");

    let materials: Vec<String> = record
        .materials
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    let hotspots: Option<Vec<Hotspot>> = match get("hotspots") {
        JsonValue::Null => None,
        value => serde_json::from_value(value).ok(),
    };

    let quiz: Vec<QuizQuestion> = get("quiz")
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|q| QuizQuestion {
                    question: Localized::pair(
                        q.get("question").and_then(|v| v.as_str()).unwrap_or_default(),
                        "",
                    ),
                    options: q
                        .get("options")
                        .and_then(|v| v.as_array())
                        .map(|opts| {
                            opts.iter()
                                .map(|o| Localized::pair(o.as_str().unwrap_or_default(), ""))
                                .collect()
                        })
                        .unwrap_or_default(),
                    answer: q.get("answer").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                })
                .collect()
        })
        .unwrap_or_default();

    Project {
        id: get("localId").as_i64().unwrap_or(0),
        phase: ordinal_of
            .get(record.phase_id.as_str())
            .copied()
            .unwrap_or(0),
        title: localized(record.title.clone()),
        desc: localized(record.description.clone()),
        mission: localized(get_str("mission")),
        theory: localized(get_str("theory")),
        challenge: localized(get_str("challenge")),
        materials,
        code: record.code.clone(),
        quiz,
        hidden_tabs: get("hiddenTabs")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        hotspots,
        icon: get_str("icon"),
        difficulty: get_str("difficulty"),
        duration: get_str("duration"),
        tags: get("tags")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        prerequisites: get("prerequisites")
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default(),
        has_graph: get("hasGraph").as_bool().unwrap_or(false),
        main_component: get("mainComponent").as_str().map(|s| s.to_string()),
    }
}

/// The export payload `publish` falls back to when the record store is
/// unavailable. Identities are minted locally; the host decides what to
/// do with the blob.
pub fn offline_bundle(course: &Course) -> JsonValue {
    let identities = CourseIdentities::local(course);
    let bundle = to_relational(course, &identities);
    serde_json::to_value(&bundle).unwrap_or(JsonValue::Null)
}

// ---- record-map conversions for the generic store interface ----

fn record_from_value(value: JsonValue) -> Record {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

impl CourseRecord {
    pub fn into_record(self) -> Record {
        record_from_value(serde_json::to_value(&self).unwrap_or(JsonValue::Null))
    }
}

impl PhaseRecord {
    pub fn into_record(self) -> Record {
        record_from_value(serde_json::to_value(&self).unwrap_or(JsonValue::Null))
    }
}

impl ProjectRecord {
    pub fn into_record(self) -> Record {
        record_from_value(serde_json::to_value(&self).unwrap_or(JsonValue::Null))
    }

    pub fn from_record(record: &Record) -> Self {
        let text = |field: &str| -> String {
            record
                .get(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: record.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
            course_id: text("course_id"),
            phase_id: text("phase_id"),
            slug: text("slug"),
            title: text("title"),
            description: text("description"),
            materials: json_field(record, "materials"),
            code: text("code"),
            component_info: json_field(record, "component_info"),
            position: record.get("position").and_then(|v| v.as_i64()).unwrap_or(0),
        }
    }
}

impl PhaseRecord {
    pub fn from_record(record: &Record) -> Self {
        let text = |field: &str| -> String {
            record
                .get(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: record.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
            course_id: text("course_id"),
            name: text("name"),
            description: text("description"),
            position: record.get("position").and_then(|v| v.as_i64()).unwrap_or(0),
            meta: json_field(record, "meta"),
        }
    }
}

impl CourseRecord {
    pub fn from_record(record: &Record) -> Self {
        let text = |field: &str| -> String {
            record
                .get(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: record.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
            slug: text("slug"),
            title: text("title"),
            description: text("description"),
            meta: json_field(record, "meta"),
        }
    }
}

impl ComponentRecord {
    pub fn into_record(self) -> Record {
        record_from_value(serde_json::to_value(&self).unwrap_or(JsonValue::Null))
    }

    pub fn from_record(record: &Record) -> Self {
        let text = |field: &str| -> String {
            record
                .get(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            course_id: text("course_id"),
            key: text("key"),
            data: json_field(record, "data"),
        }
    }
}

/// Structured columns may arrive either as real JSON values or as JSON
/// text, depending on the backing store. Accept both.
fn json_field(record: &Record, field: &str) -> JsonValue {
    match record.get(field) {
        Some(JsonValue::String(s)) => serde_json::from_str(s).unwrap_or(JsonValue::Null),
        Some(value) => value.clone(),
        None => JsonValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_turkish_diacritics() {
        assert_eq!(slugify("Işık Sensörü Projesi"), "isik-sensoru-projesi");
        assert_eq!(slugify("Çılgın Müzik!!"), "cilgin-muzik");
        assert_eq!(slugify("İstanbul"), "istanbul");
        assert_eq!(slugify("İleri Projeler"), "ileri-projeler");
        assert_eq!(slugify("Is\u{0131}k I\u{0307}leri"), "isik-ileri");
        assert_eq!(slugify("  Hello   World  "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn blank_project_title_falls_back_to_id_slug() {
        let project = Project {
            id: 42,
            ..Project::default()
        };
        assert_eq!(project_slug(&project), "project-42");
    }

    #[test]
    fn resolve_phase_id_never_yields_null_identity() {
        let mut ids = CourseIdentities {
            course_id: "c1".to_string(),
            phase_ids: PhaseIdMap::new(),
        };
        ids.phase_ids.insert(0, "p0".to_string());
        ids.phase_ids.insert(1, "p1".to_string());

        assert_eq!(ids.resolve_phase_id(1), "p1");
        // Out-of-range ordinal falls back to the first identity.
        assert_eq!(ids.resolve_phase_id(9), "p0");
    }
}
