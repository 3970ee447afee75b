//! Multi-device synchronization scenarios over a shared bare remote.

mod support;

use std::fs;

use support::{Remote, Replica, ScriptedPullUi};
use yokadi::ui::{CollisionStrategy, FieldChoice, SideChoice};
use yokadi::Error;

#[test]
fn disjoint_edits_converge() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    a.add_task("work", "from a");
    a.push().unwrap();

    let mut b = Replica::join(&remote);
    assert_eq!(b.task_titles(), ["from a"]);

    b.add_task("home", "from b");
    b.pull(&mut ScriptedPullUi::default()).unwrap();
    b.push().unwrap();
    assert_eq!(b.task_titles(), ["from a", "from b"]);

    a.pull(&mut ScriptedPullUi::default()).unwrap();
    assert_eq!(a.task_titles(), ["from a", "from b"]);
    assert_eq!(a.project_names(), ["home", "work"]);
}

#[test]
fn different_fields_auto_resolve_without_ui() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    let task = a.add_task("work", "shared");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    a.store.set_urgency(task.uuid, 42).unwrap();
    a.push().unwrap();
    b.store.set_title(task.uuid, "retitled on b").unwrap();

    // The default UI cancels everything, so reaching it would fail the
    // pull; auto-resolution must handle this conflict alone.
    let mut ui = ScriptedPullUi::default();
    b.pull(&mut ui).unwrap();
    assert!(ui.field_questions.is_empty());

    let merged = b.task(task.uuid);
    assert_eq!(merged.title, "retitled on b");
    assert_eq!(merged.urgency, 42);

    b.push().unwrap();
    a.pull(&mut ScriptedPullUi::default()).unwrap();
    let on_a = a.task(task.uuid);
    assert_eq!(on_a.title, "retitled on b");
    assert_eq!(on_a.urgency, 42);
}

#[test]
fn same_field_conflict_asks_the_ui() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    let task = a.add_task("work", "original");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    a.store.set_title(task.uuid, "title from a").unwrap();
    a.push().unwrap();
    b.store.set_title(task.uuid, "title from b").unwrap();

    // Cancelling aborts the merge and leaves the local state alone.
    let err = b.pull(&mut ScriptedPullUi::default()).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(b.task(task.uuid).title, "title from b");

    // Picking the remote side applies it everywhere.
    let mut ui = ScriptedPullUi {
        field: FieldChoice::Remote,
        ..ScriptedPullUi::default()
    };
    b.pull(&mut ui).unwrap();
    assert_eq!(
        ui.field_questions,
        [(format!("tasks/{}.json", task.uuid), "title".to_string())]
    );
    assert_eq!(b.task(task.uuid).title, "title from a");
}

#[test]
fn modified_deleted_resolves_whole_object() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    // A second task keeps the project alive through the deletion.
    a.add_task("work", "anchor");
    let task = a.add_task("work", "contested");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    a.store.remove_task(task.uuid).unwrap();
    a.push().unwrap();
    b.store.set_title(task.uuid, "still wanted").unwrap();

    // Keep the local modification.
    let mut ui = ScriptedPullUi {
        object: SideChoice::Local,
        ..ScriptedPullUi::default()
    };
    b.pull(&mut ui).unwrap();
    assert_eq!(b.task(task.uuid).title, "still wanted");

    b.push().unwrap();
    a.pull(&mut ScriptedPullUi::default()).unwrap();
    assert_eq!(a.task(task.uuid).title, "still wanted");
}

#[test]
fn modified_deleted_can_drop_the_object() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    a.add_task("work", "anchor");
    let task = a.add_task("work", "contested");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    a.store.remove_task(task.uuid).unwrap();
    a.push().unwrap();
    b.store.set_title(task.uuid, "doomed anyway").unwrap();

    let mut ui = ScriptedPullUi {
        object: SideChoice::Remote,
        ..ScriptedPullUi::default()
    };
    b.pull(&mut ui).unwrap();
    assert!(b.store.task_by_uuid(task.uuid).is_err());
    assert_eq!(b.task_titles(), ["anchor"]);
}

/// Both devices invent a project named `perso` while offline; only then
/// does B pull A's version.
fn colliding_replicas() -> (Remote, Replica, Replica, uuid::Uuid) {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    let mut b = Replica::join(&remote);

    a.add_task("perso", "from a");
    a.push().unwrap();
    b.add_task("perso", "from b");

    let local_project = b.store.project_by_name("perso").unwrap().uuid;
    (remote, a, b, local_project)
}

#[test]
fn project_name_collision_rename() {
    let (_remote, a, mut b, local_project) = colliding_replicas();

    let mut ui = ScriptedPullUi {
        collision: CollisionStrategy::Rename,
        ..ScriptedPullUi::default()
    };
    let report = b.pull(&mut ui).unwrap();

    assert_eq!(ui.renames, [("perso".to_string(), "perso_1".to_string())]);
    assert_eq!(report.renames, ui.renames);
    assert_eq!(b.project_names(), ["perso", "perso_1"]);

    // The local task followed its renamed project; the remote task lives
    // in the imported one.
    let renamed = b.store.project_by_name("perso_1").unwrap();
    assert_eq!(renamed.uuid, local_project);
    let local_titles: Vec<String> = b
        .store
        .tasks_of_project(local_project)
        .map(|t| t.title.clone())
        .collect();
    assert_eq!(local_titles, ["from b"]);

    let remote_project = a.store.project_by_name("perso").unwrap().uuid;
    let imported_titles: Vec<String> = b
        .store
        .tasks_of_project(remote_project)
        .map(|t| t.title.clone())
        .collect();
    assert_eq!(imported_titles, ["from a"]);
}

#[test]
fn project_name_collision_merge() {
    let (_remote, a, mut b, local_project) = colliding_replicas();

    let mut ui = ScriptedPullUi {
        collision: CollisionStrategy::Merge,
        ..ScriptedPullUi::default()
    };
    b.pull(&mut ui).unwrap();

    assert_eq!(b.project_names(), ["perso"]);
    let remote_project = a.store.project_by_name("perso").unwrap().uuid;
    assert_eq!(
        b.store.project_by_name("perso").unwrap().uuid,
        remote_project
    );
    assert!(b.store.project_by_uuid(local_project).is_err());
    assert_eq!(b.task_titles(), ["from a", "from b"]);
    assert!(b
        .store
        .tasks()
        .all(|task| task.project_uuid == remote_project));
}

#[test]
fn project_name_collision_cancel() {
    let (_remote, _a, mut b, local_project) = colliding_replicas();

    let err = b.pull(&mut ScriptedPullUi::default()).unwrap_err();
    assert!(matches!(err, Error::UserInput(_)));
    // The cancelled import rolled back wholesale.
    assert_eq!(b.task_titles(), ["from b"]);
    assert_eq!(b.store.project_by_name("perso").unwrap().uuid, local_project);
}

#[test]
fn push_rejected_until_pulled() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    a.add_task("p", "seed");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    a.add_task("p", "a wins the race");
    a.push().unwrap();

    b.add_task("p", "b lost the race");
    let err = b.push().unwrap_err();
    assert!(matches!(err, Error::NotFastForward));

    b.pull(&mut ScriptedPullUi::default()).unwrap();
    b.push().unwrap();
    assert_eq!(
        b.task_titles(),
        ["a wins the race", "b lost the race", "seed"]
    );

    a.pull(&mut ScriptedPullUi::default()).unwrap();
    assert_eq!(a.task_titles(), b.task_titles());
}

#[test]
fn pull_is_idempotent() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    a.add_task("p", "only one");
    a.push().unwrap();

    let mut b = Replica::join(&remote);
    b.pull(&mut ScriptedPullUi::default()).unwrap();
    b.pull(&mut ScriptedPullUi::default()).unwrap();
    assert_eq!(b.task_titles(), ["only one"]);
    assert_eq!(b.store.tasks().count(), 1);
    assert!(!b.sync.has_changes_to_import().unwrap());
}

#[test]
fn change_probes_reflect_pending_work() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    assert!(!a.sync.has_changes_to_push().unwrap());

    a.add_task("p", "pending");
    assert!(a.sync.has_changes_to_push().unwrap());
    a.push().unwrap();
    assert!(!a.sync.has_changes_to_push().unwrap());

    let mut b = Replica::join(&remote);
    a.add_task("p", "more");
    a.push().unwrap();
    b.sync
        .pull(&mut b.store, &mut ScriptedPullUi::default())
        .unwrap();
    assert_eq!(b.task_titles(), ["more", "pending"]);
}

#[test]
fn version_mismatch_aborts_the_pull() {
    let remote = Remote::new();
    let mut a = Replica::bootstrap(&remote);
    a.add_task("p", "seed");
    a.push().unwrap();
    let mut b = Replica::join(&remote);

    // Simulate a newer client publishing a newer dump format.
    let repo = git2::Repository::open(a.sync.dump_dir()).unwrap();
    fs::write(a.sync.dump_dir().join("version"), "9\n").unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("test", "test@example.com").unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "bump format", &tree, &[&parent])
        .unwrap();
    repo.find_remote("origin")
        .unwrap()
        .push(&["refs/heads/master:refs/heads/master"], None)
        .unwrap();

    let err = b.pull(&mut ScriptedPullUi::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::DumpVersion {
            local: 1,
            remote: 9
        }
    ));
    // Nothing was merged or imported.
    assert_eq!(b.task_titles(), ["seed"]);
}
