//! Integration tests for the project version track

use folio_core::model::{ActivityKind, NewProject, NewSection, ProjectPatch, SectionPatch};
use folio_core::{
    FaultPoint, FolioError, Isolation, MemoryStore, Store, Transaction, VersionEngine,
};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

fn engine() -> VersionEngine<MemoryStore> {
    VersionEngine::new(MemoryStore::new())
}

fn version_numbers(engine: &VersionEngine<MemoryStore>, project_id: Uuid) -> Vec<u32> {
    let mut numbers: Vec<u32> = engine
        .list_versions(project_id)
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    numbers.reverse();
    numbers
}

#[test]
fn test_init_edit_restore_scenario() {
    let engine = engine();
    let project = engine
        .create_project(NewProject::new("Folio").with_description("versioned state"))
        .unwrap()
        .project;
    let original = engine
        .add_section(project.id, NewSection::new("Intro", "first draft"))
        .unwrap();
    assert!(engine.list_versions(project.id).unwrap().is_empty());

    // init
    let v1 = engine.commit_version(project.id, Some("init")).unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v1.reason.as_deref(), Some("init"));
    assert_eq!(v1.snapshot.body.title, "Folio");
    assert_eq!(v1.snapshot.body.sections.len(), 1);
    assert_eq!(v1.snapshot.body.sections[0].content, "first draft");

    let activity = engine.list_activity(project.id).unwrap();
    let versions: Vec<&str> = activity
        .iter()
        .filter(|a| a.kind == ActivityKind::Version)
        .map(|a| a.content.as_str())
        .collect();
    assert_eq!(versions, vec!["Created version 1: init"]);

    // edit and commit again
    engine
        .update_section(
            project.id,
            original.id,
            SectionPatch {
                content: Some("second draft".into()),
                ..SectionPatch::default()
            },
        )
        .unwrap();
    let v2 = engine.commit_version(project.id, None).unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.snapshot.body.sections[0].content, "second draft");

    // restore 1
    let restored = engine.restore_version(project.id, v1.id).unwrap();
    assert_eq!(restored.sections.len(), 1);
    assert_eq!(restored.sections[0].content, "first draft");
    assert_ne!(restored.sections[0].id, original.id);

    let history = engine.list_versions(project.id).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].version, 3);
    assert_eq!(history[0].snapshot, v1.snapshot);
    assert_eq!(history[0].reason.as_deref(), Some("Restored from version 1"));

    let latest = &engine.list_activity(project.id).unwrap()[0];
    assert_eq!(latest.kind, ActivityKind::Restored);
    assert_eq!(latest.content, "Restored from version 1");
}

#[test]
fn test_random_commit_sequences_are_contiguous() {
    let mut rng = rand::thread_rng();
    let engine = engine();

    for _ in 0..3 {
        let project = engine.create_project(NewProject::new("Random")).unwrap().project;
        let commits = rng.gen_range(1..=12);

        for i in 0..commits {
            if rng.gen_bool(0.5) {
                engine
                    .add_section(project.id, NewSection::new(format!("S{i}"), "body"))
                    .unwrap();
            }
            if rng.gen_bool(0.3) {
                engine
                    .update_project(
                        project.id,
                        ProjectPatch {
                            status: Some(format!("phase-{i}")),
                            ..ProjectPatch::default()
                        },
                    )
                    .unwrap();
            }
            engine.commit_version(project.id, None).unwrap();
        }

        let expected: Vec<u32> = (1..=commits).collect();
        assert_eq!(version_numbers(&engine, project.id), expected);
    }
}

#[test]
fn test_restore_round_trip_matches_snapshot() {
    let engine = engine();
    let project = engine
        .create_project(NewProject::new("Round trip").with_tags(["rust"]))
        .unwrap()
        .project;
    engine
        .add_section(project.id, NewSection::new("B", "bee").at(2))
        .unwrap();
    engine
        .add_section(project.id, NewSection::new("A", "ay").at(1))
        .unwrap();
    let v1 = engine.commit_version(project.id, None).unwrap();

    engine
        .update_project(
            project.id,
            ProjectPatch {
                title: Some("Renamed".into()),
                tags: Some(vec![]),
                ..ProjectPatch::default()
            },
        )
        .unwrap();
    engine
        .add_section(project.id, NewSection::new("C", "sea"))
        .unwrap();
    engine.commit_version(project.id, None).unwrap();

    engine.restore_version(project.id, v1.id).unwrap();
    let recaptured = engine.commit_version(project.id, None).unwrap();

    assert_eq!(recaptured.version, 4);
    assert_eq!(recaptured.snapshot.body, v1.snapshot.body);
}

#[test]
fn test_cross_project_restore_is_forbidden_both_ways() {
    let engine = engine();
    let a = engine.create_project(NewProject::new("A")).unwrap().project;
    let b = engine.create_project(NewProject::new("B")).unwrap().project;
    let va = engine.commit_version(a.id, None).unwrap();
    let vb = engine.commit_version(b.id, None).unwrap();

    assert!(matches!(
        engine.restore_version(b.id, va.id),
        Err(FolioError::Forbidden(_))
    ));
    assert!(matches!(
        engine.restore_version(a.id, vb.id),
        Err(FolioError::Forbidden(_))
    ));

    assert_eq!(version_numbers(&engine, a.id), vec![1]);
    assert_eq!(version_numbers(&engine, b.id), vec![1]);
}

#[test]
fn test_restore_unknown_targets() {
    let engine = engine();
    let project = engine.create_project(NewProject::new("Known")).unwrap().project;
    let v1 = engine.commit_version(project.id, None).unwrap();

    assert!(engine
        .restore_version(project.id, Uuid::new_v4())
        .unwrap_err()
        .is_not_found());
    assert!(engine
        .restore_version(Uuid::new_v4(), v1.id)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_concurrent_commits_get_distinct_numbers() {
    let engine = Arc::new(VersionEngine::new(MemoryStore::new()));
    let project = engine.create_project(NewProject::new("Busy")).unwrap().project;
    engine.commit_version(project.id, None).unwrap();
    engine.commit_version(project.id, None).unwrap();
    let prior = engine.list_versions(project.id).unwrap().len();

    std::thread::scope(|scope| {
        for _ in 0..2 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || engine.commit_version(project.id, Some("racing")).unwrap());
        }
    });

    let numbers: Vec<u32> = engine
        .list_versions(project.id)
        .unwrap()
        .iter()
        .rev()
        .map(|v| v.version)
        .collect();
    assert_eq!(numbers.len(), prior + 2);
    assert_eq!(numbers, (1..=(prior as u32 + 2)).collect::<Vec<_>>());
}

#[test]
fn test_edit_racing_a_restore_is_rejected() {
    let store = MemoryStore::new();
    let engine = VersionEngine::new(store.clone());
    let project = engine.create_project(NewProject::new("Original")).unwrap().project;
    engine
        .add_section(project.id, NewSection::new("S1", "kept"))
        .unwrap();
    let v1 = engine.commit_version(project.id, Some("init")).unwrap();
    engine
        .update_project(
            project.id,
            ProjectPatch {
                title: Some("Edited".into()),
                ..ProjectPatch::default()
            },
        )
        .unwrap();
    engine
        .add_section(project.id, NewSection::new("S2", "dropped"))
        .unwrap();

    // The edit read the project before the restore committed
    let err = store
        .transaction(|tx| {
            let mut row = tx.get_project(project.id)?.unwrap();
            row.description = Some("stale edit".into());
            engine.restore_version(project.id, v1.id)?;
            tx.update_project(row)
        })
        .unwrap_err();
    assert!(err.is_conflict());

    let view = engine.get_project(project.id).unwrap();
    assert_eq!(view.project.title, "Original");
    assert_eq!(view.project.description, None);
    let titles: Vec<&str> = view.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["S1"]);
}

#[test]
fn test_lost_update_is_retried_against_fresh_state() {
    let engine = Arc::new(VersionEngine::new(MemoryStore::new()));
    let project = engine.create_project(NewProject::new("Shared")).unwrap().project;

    std::thread::scope(|scope| {
        for title in ["Left", "Right"] {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                engine
                    .add_section(project.id, NewSection::new(title, "body"))
                    .unwrap()
            });
        }
    });

    let view = engine.get_project(project.id).unwrap();
    let mut titles: Vec<&str> = view.sections.iter().map(|s| s.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Left", "Right"]);
    let orders: Vec<i64> = view.sections.iter().map(|s| s.order).collect();
    assert_ne!(orders[0], orders[1]);
}

#[test]
fn test_serializable_store_handles_concurrent_commits() {
    let engine = Arc::new(VersionEngine::new(MemoryStore::with_isolation(
        Isolation::Serializable,
    )));
    let project = engine.create_project(NewProject::new("Locked")).unwrap().project;

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || engine.commit_version(project.id, None).unwrap());
        }
    });

    assert_eq!(version_numbers(&engine, project.id), (1..=8).collect::<Vec<_>>());
}

#[test]
fn test_fault_mid_apply_leaves_state_untouched() {
    let store = MemoryStore::new();
    let faults = store.faults().clone();
    let engine = VersionEngine::new(store);

    let project = engine.create_project(NewProject::new("Fragile")).unwrap().project;
    engine
        .add_section(project.id, NewSection::new("One", "1"))
        .unwrap();
    let v1 = engine.commit_version(project.id, None).unwrap();
    engine
        .update_project(
            project.id,
            ProjectPatch {
                title: Some("Changed".into()),
                ..ProjectPatch::default()
            },
        )
        .unwrap();
    engine
        .add_section(project.id, NewSection::new("Two", "2"))
        .unwrap();
    engine.commit_version(project.id, None).unwrap();

    let before = engine.get_project(project.id).unwrap();
    let versions_before = engine.list_versions(project.id).unwrap().len();
    let activity_before = engine.list_activity(project.id).unwrap().len();

    // Scalars are already overwritten when the first section write fails
    faults.fail_next(FaultPoint::WriteSection);
    let err = engine.restore_version(project.id, v1.id).unwrap_err();
    assert!(matches!(err, FolioError::Storage(_)));

    assert_eq!(engine.get_project(project.id).unwrap(), before);
    assert_eq!(engine.list_versions(project.id).unwrap().len(), versions_before);
    assert_eq!(engine.list_activity(project.id).unwrap().len(), activity_before);
}

#[test]
fn test_fault_in_activity_aborts_commit() {
    let store = MemoryStore::new();
    let faults = store.faults().clone();
    let engine = VersionEngine::new(store);
    let project = engine.create_project(NewProject::new("Audited")).unwrap().project;

    faults.fail_next(FaultPoint::InsertActivity);
    assert!(engine.commit_version(project.id, None).is_err());
    assert!(engine.list_versions(project.id).unwrap().is_empty());

    assert_eq!(engine.commit_version(project.id, None).unwrap().version, 1);
}

#[test]
fn test_single_conflict_is_retried() {
    let store = MemoryStore::new();
    let faults = store.faults().clone();
    let engine = VersionEngine::new(store);
    let project = engine.create_project(NewProject::new("Retry")).unwrap().project;

    faults.conflict_next(FaultPoint::Commit);
    let v1 = engine.commit_version(project.id, None).unwrap();

    assert_eq!(v1.version, 1);
    assert_eq!(faults.pending(), 0);
    assert_eq!(version_numbers(&engine, project.id), vec![1]);
}

#[test]
fn test_repeated_conflict_is_surfaced() {
    let store = MemoryStore::new();
    let faults = store.faults().clone();
    let engine = VersionEngine::new(store);
    let project = engine.create_project(NewProject::new("Retry")).unwrap().project;
    let v1 = engine.commit_version(project.id, None).unwrap();

    faults.conflict_next(FaultPoint::Commit);
    faults.conflict_next(FaultPoint::Commit);
    let err = engine.restore_version(project.id, v1.id).unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(version_numbers(&engine, project.id), vec![1]);
}

#[test]
fn test_deleted_tag_is_dropped_on_restore() {
    let engine = engine();
    let view = engine
        .create_project(NewProject::new("Tagged").with_tags(["keep", "drop"]))
        .unwrap();
    let v1 = engine.commit_version(view.project.id, None).unwrap();
    let dropped = view.tags.iter().find(|t| t.name == "drop").unwrap();

    engine.delete_tag(dropped.id).unwrap();
    let restored = engine.restore_version(view.project.id, v1.id).unwrap();

    let names: Vec<&str> = restored.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["keep"]);
    // History keeps the reference
    assert_eq!(v1.snapshot.body.tags.len(), 2);
}

#[test]
fn test_renamed_tag_shows_current_name() {
    let engine = engine();
    let view = engine
        .create_project(NewProject::new("Tagged").with_tags(["draft"]))
        .unwrap();
    let tag = view.tags[0].clone();
    let v1 = engine.commit_version(view.project.id, None).unwrap();

    engine
        .update_project(
            view.project.id,
            ProjectPatch {
                tags: Some(vec![]),
                ..ProjectPatch::default()
            },
        )
        .unwrap();
    engine.rename_tag(tag.id, "published").unwrap();

    let restored = engine.restore_version(view.project.id, v1.id).unwrap();
    assert_eq!(restored.tags.len(), 1);
    assert_eq!(restored.tags[0].id, tag.id);
    assert_eq!(restored.tags[0].name, "published");

    let stored = engine.get_version(v1.id).unwrap();
    assert_eq!(stored.snapshot.body.tags[0].name, "draft");
}

#[test]
fn test_reorder_is_captured_in_next_version() {
    let engine = engine();
    let project = engine.create_project(NewProject::new("Order")).unwrap().project;
    let a = engine.add_section(project.id, NewSection::new("A", "")).unwrap();
    let b = engine.add_section(project.id, NewSection::new("B", "")).unwrap();

    engine
        .reorder_sections(project.id, &[(a.id, 1), (b.id, 0)])
        .unwrap();
    let v1 = engine.commit_version(project.id, None).unwrap();

    let titles: Vec<&str> = v1
        .snapshot
        .body
        .sections
        .iter()
        .map(|s| s.title.as_str())
        .collect();
    assert_eq!(titles, vec!["B", "A"]);
    assert_eq!(
        engine.list_activity(project.id).unwrap()[1].content,
        "Reordered project sections"
    );
}
