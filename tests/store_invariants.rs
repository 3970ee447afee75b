//! Store behaviour across persistence boundaries: a snapshot written by
//! one session must reload into an equivalent store, ids and all.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tempfile::TempDir;
use yokadi::dates::parse_humane_date_time;
use yokadi::db::{TaskLockManager, TaskStatus, TaskStore};
use yokadi::query::{Grouping, KeywordFilter, TaskQuery};
use yokadi::recurrence::RecurrenceRule;
use yokadi::ui::AcceptAll;
use yokadi::Error;

fn keyword_map(entries: &[(&str, Option<i64>)]) -> BTreeMap<String, Option<i64>> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[test]
fn snapshot_survives_a_full_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("yokadi.json");

    let (first_uuid, second_uuid) = {
        let mut store = TaskStore::load(&path).unwrap();
        let first = store
            .add_task(
                "home",
                "fix the roof",
                &keyword_map(&[("diy", Some(3))]),
                &mut AcceptAll,
            )
            .unwrap();
        let second = store
            .add_task("home", "paint the fence", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();

        let due = parse_humane_date_time(
            "tomorrow 18:00",
            None,
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
        .unwrap();
        store.set_due_date(first.uuid, Some(due)).unwrap();
        store.set_urgency(first.uuid, 20).unwrap();
        store.set_status(second.uuid, TaskStatus::Started).unwrap();
        store
            .set_recurrence(
                first.uuid,
                RecurrenceRule::from_humane_string("weekly monday 18:00").unwrap(),
            )
            .unwrap();
        (first.uuid, second.uuid)
    };

    let store = TaskStore::load(&path).unwrap();
    assert_eq!(store.tasks().count(), 2);

    let first = store.task_by_uuid(first_uuid).unwrap();
    assert_eq!(first.urgency, 20);
    assert_eq!(
        first.due_date,
        NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(18, 0, 0)
    );
    assert!(!first.recurrence.is_none());
    assert_eq!(first.keywords, keyword_map(&[("diy", Some(3))]));

    let second = store.task_by_uuid(second_uuid).unwrap();
    assert_eq!(second.status, TaskStatus::Started);

    // Session ids follow creation order after a reload.
    assert_eq!(store.task_id(first_uuid), Some(1));
    assert_eq!(store.task_id(second_uuid), Some(2));
    assert_eq!(store.get_task("1").unwrap().uuid, first_uuid);
}

#[test]
fn queries_work_on_a_reloaded_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("yokadi.json");

    {
        let mut store = TaskStore::load(&path).unwrap();
        store
            .add_task("work", "report", &keyword_map(&[("office", None)]), &mut AcceptAll)
            .unwrap();
        store
            .add_task("home", "dishes", &keyword_map(&[("chore", None)]), &mut AcceptAll)
            .unwrap();
    }

    let store = TaskStore::load(&path).unwrap();
    let sections = TaskQuery::new().sections(&store, &Grouping::Project);
    let labels: Vec<&str> = sections.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, ["home", "work"]);

    let office = TaskQuery::new()
        .keyword_filter(KeywordFilter::new("office").unwrap())
        .run(&store);
    assert_eq!(office.len(), 1);
    assert_eq!(office[0].title, "report");
}

#[test]
fn task_locks_persist_across_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("yokadi.json");
    let manager = TaskLockManager::new();

    let uuid = {
        let mut store = TaskStore::load(&path).unwrap();
        let task = store
            .add_task("p", "edited elsewhere", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();
        manager.acquire(&mut store, task.uuid).unwrap();
        task.uuid
    };

    // Same process id, so the reloaded lock row is ours to refresh.
    let mut store = TaskStore::load(&path).unwrap();
    manager.update(&mut store, uuid).unwrap();
    manager.release(&mut store, uuid).unwrap();
}

#[test]
fn done_recurring_task_stays_open_after_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("yokadi.json");

    let uuid = {
        let mut store = TaskStore::load(&path).unwrap();
        let task = store
            .add_task("p", "water plants", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();
        store
            .set_due_date(
                task.uuid,
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0),
            )
            .unwrap();
        store
            .set_recurrence(
                task.uuid,
                RecurrenceRule::from_humane_string("daily 09:00").unwrap(),
            )
            .unwrap();
        store.set_status(task.uuid, TaskStatus::Done).unwrap();
        task.uuid
    };

    let store = TaskStore::load(&path).unwrap();
    let task = store.task_by_uuid(uuid).unwrap();
    assert_eq!(task.status, TaskStatus::New);
    assert_eq!(
        task.due_date,
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
    );
}

#[test]
fn failed_batch_leaves_the_snapshot_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("yokadi.json");

    {
        let mut store = TaskStore::load(&path).unwrap();
        store
            .add_task("p", "survivor", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();

        let result: Result<(), Error> = store.in_txn(|store| {
            store.add_task("p", "doomed", &BTreeMap::new(), &mut AcceptAll)?;
            Err(Error::UserInput("abort".to_string()))
        });
        assert!(result.is_err());
    }

    let store = TaskStore::load(&path).unwrap();
    assert_eq!(store.tasks().count(), 1);
    assert_eq!(store.tasks().next().unwrap().title, "survivor");
}
