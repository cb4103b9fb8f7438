
use std::time::{Duration, Instant};

use test_support::SharedDraftStore;

use courseforge::{AuthoringConfig, CacheStatus, ContentStore, Phase, Project};

// A burst of mutations inside the debounce window coalesces into a
// single cache write once the window elapses.
#[test]
fn five_mutations_one_write() {
    let (store, handle) = SharedDraftStore::new();
    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));

    for id in 1..=3 {
        content.add_project(Project {
            id,
            ..Project::default()
        });
    }
    content.add_phase(Phase::default());
    content.add_phase(Phase::default());

    assert_eq!(handle.borrow().writes, 0);
    assert_eq!(content.draft_status(), &CacheStatus::Pending);

    // Still inside the window: nothing flushes.
    assert!(!content.flush_draft_due(Instant::now()));
    assert_eq!(handle.borrow().writes, 0);

    // Past the window: exactly one write.
    let later = Instant::now() + Duration::from_secs(3);
    assert!(content.flush_draft_due(later));
    assert_eq!(handle.borrow().writes, 1);
    assert!(matches!(content.draft_status(), CacheStatus::Saved { .. }));

    // Nothing pending anymore; a further tick is a no-op.
    assert!(!content.flush_draft_due(later + Duration::from_secs(5)));
    assert_eq!(handle.borrow().writes, 1);
}

#[test]
fn a_new_mutation_rearms_the_window() {
    let (store, handle) = SharedDraftStore::new();
    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));

    content.add_project(Project {
        id: 1,
        ..Project::default()
    });
    let later = Instant::now() + Duration::from_secs(3);
    assert!(content.flush_draft_due(later));

    content.add_project(Project {
        id: 2,
        ..Project::default()
    });
    assert!(content.flush_draft_due(later + Duration::from_secs(3)));
    assert_eq!(handle.borrow().writes, 2);
}

#[test]
fn flushed_record_has_the_persisted_shape() {
    let (store, handle) = SharedDraftStore::new();
    let mut content = ContentStore::new(AuthoringConfig::authoring(), Box::new(store));

    content.add_project(Project {
        id: 5,
        ..Project::default()
    });
    content.flush_draft();

    let text = handle
        .borrow()
        .map
        .get("course-content-draft")
        .cloned()
        .expect("record stored under the fixed key");
    let record: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert!(record["timestamp"].is_i64());
    assert!(record["data"].is_object());
    // Every catalog course is serialized, including the mutated one.
    assert!(record["data"].get(content.active_key()).is_some());
}
