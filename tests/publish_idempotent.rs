
use courseforge::remote::RemoteSync;
use courseforge::{RecordStore, SqliteStore};

// Re-publishing an unchanged course must not grow any table: phases
// re-match by (course_id, name), projects by (course_id, slug),
// components by (course_id, key).
#[test]
fn publishing_twice_creates_no_duplicate_rows() {
    let store = SqliteStore::open_in_memory().expect("open store");
    let course = test_support::sample_course("robotics");
    let mut sync = RemoteSync::new();

    let first = sync.publish(&store, &course);
    assert!(first.success, "first publish failed: {}", first.message);
    assert_eq!(first.phases_synced, 3);
    assert_eq!(first.projects_synced, 3);
    assert_eq!(first.components_synced, 2);

    let phases_before = store.select("phases", &[]).expect("phases").len();
    let projects_before = store.select("projects", &[]).expect("projects").len();
    let components_before = store.select("components", &[]).expect("components").len();

    let second = sync.publish(&store, &course);
    assert!(second.success, "second publish failed: {}", second.message);
    assert_eq!(second.course_id, first.course_id);
    assert_eq!(second.phase_ids, first.phase_ids);

    assert_eq!(store.select("courses", &[]).expect("courses").len(), 1);
    assert_eq!(store.select("phases", &[]).expect("phases").len(), phases_before);
    assert_eq!(store.select("projects", &[]).expect("projects").len(), projects_before);
    assert_eq!(
        store.select("components", &[]).expect("components").len(),
        components_before
    );
}

#[test]
fn metadata_edits_update_rows_in_place() {
    let store = SqliteStore::open_in_memory().expect("open store");
    let mut course = test_support::sample_course("robotics");
    let mut sync = RemoteSync::new();

    sync.publish(&store, &course);
    course.description = "Güncellenmiş açıklama".to_string();
    course.tree.phases[1].description = "Yeni sensör fazı".to_string();
    let report = sync.publish(&store, &course);
    assert!(report.success);

    let courses = store.select("courses", &[]).expect("courses");
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["description"], "Güncellenmiş açıklama");

    let phases = store.select("phases", &[]).expect("phases");
    assert_eq!(phases.len(), 3);
    assert!(phases
        .iter()
        .any(|p| p["description"] == "Yeni sensör fazı"));
}

#[test]
fn claimed_course_is_skipped_until_released() {
    let store = SqliteStore::open_in_memory().expect("open store");
    let course = test_support::sample_course("robotics");
    let mut sync = RemoteSync::new();

    assert!(sync.begin_publish("robotics"));
    let skipped = sync.publish(&store, &course);
    assert!(!skipped.success);
    assert!(skipped.message.contains("in flight"));
    assert_eq!(skipped.phases_synced, 0);
    assert_eq!(store.select("courses", &[]).expect("courses").len(), 0);

    sync.finish_publish("robotics");
    let report = sync.publish(&store, &course);
    assert!(report.success, "publish after release failed: {}", report.message);
}
