//! Mass edit: project tasks as an editable text block.
//!
//! A project's open tasks render to one line each; the user reorders,
//! retitles, deletes or adds lines in an editor; applying the edited block
//! back diffs it against the rendered one and commits every change in a
//! single transaction.
//!
//! Line format: `<id|-> <N|S|D> <title> [@keyword[=value]]...`. Blank lines
//! and `#` comments are ignored. A `-` id denotes a new task, and its
//! status letter may be omitted (defaults to new).

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::db::model::{TaskStatus, URGENCY_MAX, URGENCY_MIN};
use crate::db::store::TaskStore;
use crate::error::{Error, Result};
use crate::ui::InteractionPort;

/// One line of a mass-edit block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeditEntry {
    /// Session id of an existing task, `None` for a new one.
    pub id: Option<u64>,
    pub status: TaskStatus,
    pub title: String,
    pub keywords: BTreeMap<String, Option<i64>>,
}

fn status_char(status: TaskStatus) -> char {
    match status {
        TaskStatus::New => 'N',
        TaskStatus::Started => 'S',
        TaskStatus::Done => 'D',
    }
}

fn status_from_token(token: &str) -> Option<TaskStatus> {
    match token {
        "N" | "n" => Some(TaskStatus::New),
        "S" | "s" => Some(TaskStatus::Started),
        "D" | "d" => Some(TaskStatus::Done),
        _ => None,
    }
}

/// Entries for every non-done, non-note task of a project, most urgent
/// first.
pub fn render_entries(store: &TaskStore, project_uuid: Uuid) -> Vec<MeditEntry> {
    let mut tasks: Vec<_> = store
        .tasks_of_project(project_uuid)
        .filter(|task| task.status != TaskStatus::Done && !task.is_note())
        .collect();
    tasks.sort_by(|a, b| {
        b.urgency
            .cmp(&a.urgency)
            .then_with(|| a.creation_date.cmp(&b.creation_date))
            .then_with(|| store.task_id(a.uuid).cmp(&store.task_id(b.uuid)))
    });
    tasks
        .into_iter()
        .map(|task| MeditEntry {
            id: store.task_id(task.uuid),
            status: task.status,
            title: task.title.clone(),
            keywords: task.keywords.clone(),
        })
        .collect()
}

/// Render entries to the editable text block.
pub fn serialize(entries: &[MeditEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry.id {
            Some(id) => out.push_str(&id.to_string()),
            None => out.push('-'),
        }
        out.push(' ');
        out.push(status_char(entry.status));
        out.push(' ');
        out.push_str(&entry.title);
        for (name, value) in &entry.keywords {
            out.push_str(" @");
            out.push_str(name);
            if let Some(value) = value {
                out.push('=');
                out.push_str(&value.to_string());
            }
        }
        out.push('\n');
    }
    out
}

/// Parse an edited text block back into entries.
pub fn parse(text: &str) -> Result<Vec<MeditEntry>> {
    let mut entries = Vec::new();
    let mut seen_ids = BTreeSet::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(id_token) = tokens.next() else {
            continue;
        };
        let id = if id_token == "-" {
            None
        } else {
            let id: u64 = id_token.parse().map_err(|_| Error::MeditParse {
                line: line_no,
                message: format!("invalid task id '{id_token}'"),
            })?;
            if !seen_ids.insert(id) {
                return Err(Error::MeditParse {
                    line: line_no,
                    message: format!("duplicate task id {id}"),
                });
            }
            Some(id)
        };

        let rest: Vec<&str> = tokens.collect();
        let (status, words) = match rest.split_first() {
            Some((first, tail)) => match status_from_token(first) {
                Some(status) => (status, tail),
                // A new task may start its title where the status letter
                // would be; an existing task may not.
                None if id.is_none() => (TaskStatus::New, rest.as_slice()),
                None => {
                    return Err(Error::MeditParse {
                        line: line_no,
                        message: format!("invalid status '{first}'"),
                    })
                }
            },
            None => {
                return Err(Error::MeditParse {
                    line: line_no,
                    message: "missing status and title".to_string(),
                })
            }
        };

        let mut title_words = Vec::new();
        let mut keywords = BTreeMap::new();
        for word in words {
            if let Some(keyword) = word.strip_prefix('@') {
                let (name, value) = match keyword.split_once('=') {
                    Some((name, value)) => {
                        let value: i64 = value.parse().map_err(|_| Error::MeditParse {
                            line: line_no,
                            message: format!("invalid keyword value in '{word}'"),
                        })?;
                        (name, Some(value))
                    }
                    None => (keyword, None),
                };
                if name.is_empty() {
                    return Err(Error::MeditParse {
                        line: line_no,
                        message: "empty keyword name".to_string(),
                    });
                }
                keywords.insert(name.to_string(), value);
            } else {
                title_words.push(*word);
            }
        }

        let title = title_words.join(" ");
        if title.is_empty() {
            return Err(Error::MeditParse {
                line: line_no,
                message: "missing title".to_string(),
            });
        }

        entries.push(MeditEntry {
            id,
            status,
            title,
            keywords,
        });
    }

    Ok(entries)
}

/// Apply the edited entries to a project in one transaction.
///
/// Tasks whose id disappeared are deleted, known ids are updated, `-` lines
/// become new tasks. Urgency is rewritten so the textual order becomes the
/// listing order. Any unknown id aborts the whole batch.
pub fn apply_changes(
    store: &mut TaskStore,
    project_uuid: Uuid,
    old_entries: &[MeditEntry],
    new_entries: &[MeditEntry],
    ui: &mut dyn InteractionPort,
) -> Result<()> {
    let old_ids: BTreeSet<u64> = old_entries.iter().filter_map(|entry| entry.id).collect();
    for entry in new_entries {
        if let Some(id) = entry.id {
            if !old_ids.contains(&id) {
                return Err(Error::not_found("task id", id.to_string()));
            }
        }
    }

    store.in_txn(|store| {
        let project_name = store.project_by_uuid(project_uuid)?.name.clone();

        for entry in new_entries {
            for name in entry.keywords.keys() {
                store.get_or_create_keyword(name, ui)?;
            }
        }

        let kept_ids: BTreeSet<u64> = new_entries.iter().filter_map(|entry| entry.id).collect();
        for id in old_ids.difference(&kept_ids) {
            let uuid = store.get_task(&id.to_string())?.uuid;
            store.delete_task(uuid)?;
        }

        let count = new_entries.len() as i32;
        for (position, entry) in new_entries.iter().enumerate() {
            let urgency = (count - position as i32).clamp(URGENCY_MIN, URGENCY_MAX);
            let uuid = match entry.id {
                Some(id) => {
                    let uuid = store.get_task(&id.to_string())?.uuid;
                    store.set_title(uuid, &entry.title)?;
                    uuid
                }
                None => {
                    store
                        .add_task(&project_name, &entry.title, &entry.keywords, ui)?
                        .uuid
                }
            };
            store.set_keyword_dict(uuid, &entry.keywords)?;
            store.set_status(uuid, entry.status)?;
            store.set_urgency(uuid, urgency)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::AcceptAll;

    fn keyword_map(entries: &[(&str, Option<i64>)]) -> BTreeMap<String, Option<i64>> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn project_with_tasks() -> (TaskStore, Uuid) {
        let mut store = TaskStore::in_memory();
        let t1 = store
            .add_task("birthday", "buy food", &keyword_map(&[("errand", None)]), &mut AcceptAll)
            .unwrap();
        let t2 = store
            .add_task("birthday", "invite guests", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();
        store.set_urgency(t1.uuid, 5).unwrap();
        store.set_status(t2.uuid, TaskStatus::Started).unwrap();
        (store, t1.project_uuid)
    }

    #[test]
    fn render_and_serialize() {
        let (store, project) = project_with_tasks();
        let entries = render_entries(&store, project);
        let text = serialize(&entries);
        assert_eq!(text, "1 N buy food @errand\n2 S invite guests\n");
    }

    #[test]
    fn render_skips_done_and_notes() {
        let (mut store, project) = project_with_tasks();
        let done = store
            .add_task("birthday", "already done", &BTreeMap::new(), &mut AcceptAll)
            .unwrap();
        store.set_status(done.uuid, TaskStatus::Done).unwrap();
        store
            .add_task(
                "birthday",
                "a note",
                &keyword_map(&[("_note", None)]),
                &mut AcceptAll,
            )
            .unwrap();

        let entries = render_entries(&store, project);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn parse_roundtrip_and_comments() {
        let text = "# comment\n\n1 N buy food @errand\n- order cake @errand=3\n2 D invite guests\n";
        let entries = parse(text).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, Some(1));
        assert_eq!(entries[0].keywords, keyword_map(&[("errand", None)]));
        assert_eq!(entries[1].id, None);
        assert_eq!(entries[1].status, TaskStatus::New);
        assert_eq!(entries[1].title, "order cake");
        assert_eq!(entries[1].keywords, keyword_map(&[("errand", Some(3))]));
        assert_eq!(entries[2].status, TaskStatus::Done);
    }

    #[test]
    fn parse_new_task_with_explicit_status() {
        let entries = parse("- S start this\n").unwrap();
        assert_eq!(entries[0].status, TaskStatus::Started);
        assert_eq!(entries[0].title, "start this");
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let err = parse("1 N fine\nxyz N broken\n").unwrap_err();
        assert!(matches!(err, Error::MeditParse { line: 2, .. }));

        let err = parse("1 N fine\n1 N again\n").unwrap_err();
        assert!(matches!(err, Error::MeditParse { line: 2, .. }));

        let err = parse("1 X wrong status\n").unwrap_err();
        assert!(matches!(err, Error::MeditParse { line: 1, .. }));

        let err = parse("1 N\n").unwrap_err();
        assert!(matches!(err, Error::MeditParse { line: 1, .. }));
    }

    #[test]
    fn apply_reorders_deletes_and_creates() {
        let (mut store, project) = project_with_tasks();
        let old = render_entries(&store, project);

        // Drop "invite guests", add a new task, put it first.
        let new = parse("- order cake\n1 S buy food @errand\n").unwrap();
        apply_changes(&mut store, project, &old, &new, &mut AcceptAll).unwrap();

        let entries = render_entries(&store, project);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "order cake");
        assert_eq!(entries[1].title, "buy food");
        assert_eq!(entries[1].status, TaskStatus::Started);
        assert_eq!(store.tasks().count(), 2);
    }

    #[test]
    fn apply_rejects_unknown_id_atomically() {
        let (mut store, project) = project_with_tasks();
        let old = render_entries(&store, project);
        let new = parse("99 N ghost\n- real new task\n").unwrap();

        let err = apply_changes(&mut store, project, &old, &new, &mut AcceptAll).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        // Nothing was committed.
        assert_eq!(store.tasks().count(), 2);
        assert!(store.keyword_by_name("real").is_none());
    }

    #[test]
    fn apply_writes_positional_urgency() {
        let (mut store, project) = project_with_tasks();
        let old = render_entries(&store, project);
        let new = parse("2 S invite guests\n1 N buy food @errand\n").unwrap();
        apply_changes(&mut store, project, &old, &new, &mut AcceptAll).unwrap();

        let first = store.get_task("2").unwrap();
        let second = store.get_task("1").unwrap();
        assert_eq!(first.urgency, 2);
        assert_eq!(second.urgency, 1);
    }

    #[test]
    fn render_keeps_insertion_order_for_ties() {
        use crate::db::model::{ProjectRecord, TaskRecord};
        use chrono::NaiveDate;

        let mut store = TaskStore::in_memory();
        let project = ProjectRecord::new("party");
        let project_uuid = project.uuid;
        store.upsert_project(project).unwrap();

        let created = NaiveDate::from_ymd_opt(2009, 1, 3)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        // uuid order is the reverse of insertion order; urgencies and
        // creation dates all tie.
        for (raw, title) in [(3u128, "first"), (2, "second"), (1, "third")] {
            let mut task = TaskRecord::new(project_uuid, title);
            task.uuid = Uuid::from_u128(raw);
            task.creation_date = created;
            store.upsert_task(task).unwrap();
        }

        let titles: Vec<String> = render_entries(&store, project_uuid)
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(titles, ["first", "second", "third"]);
    }
}
