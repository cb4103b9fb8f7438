
use serde_json::json;
use test_support::{sample_course, SharedDraftStore};

use courseforge::{AuthoringConfig, ContentStore};

const KEY: &str = "course-content-draft";

fn draft_blob(course_key: &str) -> String {
    let course = sample_course(course_key);
    let tree = serde_json::to_value(&course.tree).expect("serialize tree");
    json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "data": { course_key: tree }
    })
    .to_string()
}

#[test]
fn whitelisted_course_is_merged_unknown_is_ignored() {
    let (store, handle) = SharedDraftStore::new();
    let course = sample_course("robotics");
    let tree = serde_json::to_value(&course.tree).expect("tree");
    let blob = json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "data": {
            "robotics": tree,
            "not-in-catalog": { "projects": [{ "id": 1 }] }
        }
    })
    .to_string();
    handle.borrow_mut().map.insert(KEY.to_string(), blob);

    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));
    assert_eq!(content.restore_draft(), 1);

    let merged = content.course("robotics").expect("course present");
    assert_eq!(merged.tree.projects.len(), 3);
    assert!(content.course("not-in-catalog").is_none());
}

#[test]
fn remote_sourced_course_wins_over_draft() {
    let (store, handle) = SharedDraftStore::new();
    handle
        .borrow_mut()
        .map
        .insert(KEY.to_string(), draft_blob("robotics"));

    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));
    content.mark_remote_sourced("robotics", true);

    assert_eq!(content.restore_draft(), 0);
    let course = content.course("robotics").expect("course present");
    assert!(course.tree.projects.is_empty());
}

#[test]
fn learner_surface_never_restores() {
    let (store, handle) = SharedDraftStore::new();
    handle
        .borrow_mut()
        .map
        .insert(KEY.to_string(), draft_blob("robotics"));

    let mut content = ContentStore::new(AuthoringConfig::learner(), Box::new(store));
    assert_eq!(content.restore_draft(), 0);
}

#[test]
fn far_future_timestamp_is_rejected() {
    let (store, handle) = SharedDraftStore::new();
    let course = sample_course("robotics");
    let tree = serde_json::to_value(&course.tree).expect("tree");
    let skewed = json!({
        // Two days ahead: past the 24h clock-skew allowance.
        "timestamp": chrono::Utc::now().timestamp_millis() + 48 * 60 * 60 * 1000,
        "data": { "robotics": tree }
    })
    .to_string();
    handle.borrow_mut().map.insert(KEY.to_string(), skewed);

    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));
    assert_eq!(content.restore_draft(), 0);
}

#[test]
fn restored_strings_are_html_escaped() {
    let (store, handle) = SharedDraftStore::new();
    let blob = json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "data": {
            "robotics": {
                "projects": [{ "id": 1, "title": "<img onerror=x>" }]
            }
        }
    })
    .to_string();
    handle.borrow_mut().map.insert(KEY.to_string(), blob);

    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));
    assert_eq!(content.restore_draft(), 1);

    let course = content.course("robotics").expect("course present");
    assert_eq!(course.tree.projects[0].title.tr(), "&lt;img onerror=x&gt;");
}
