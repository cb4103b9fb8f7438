
use courseforge::bridge;
use courseforge::remote::{self, RemoteSync};
use courseforge::SqliteStore;

// After publish + pull, every project's ordinal must point at the
// phase whose relational identity it was mapped to on the way out.
#[test]
fn project_ordinals_follow_their_phase_identities() {
    let store = SqliteStore::open_in_memory().expect("open store");
    let course = test_support::sample_course("robotics");
    let mut sync = RemoteSync::new();

    let report = sync.publish(&store, &course);
    assert!(report.success, "{}", report.message);

    let bundle = remote::fetch(&store, "robotik-atolyesi").expect("fetch course");
    let back = bridge::to_authoring_document(&bundle);

    // Phase ordinals are the sort order of `position`.
    let mut phases = bundle.phases.clone();
    phases.sort_by_key(|p| p.position);

    for original in &course.tree.projects {
        let expected_identity = report
            .phase_ids
            .get(&original.phase)
            .expect("ordinal was mapped during publish");

        let restored = back
            .tree
            .projects
            .iter()
            .find(|p| p.id == original.id)
            .expect("project survived the round trip");

        let restored_identity = phases[restored.phase]
            .id
            .as_deref()
            .expect("phase identity present");
        assert_eq!(restored_identity, expected_identity);
        assert_eq!(restored.phase, original.phase);
    }
}
