//! The task store.
//!
//! Holds the authoritative entity state and enforces the model invariants.
//! Mutations run inside a transaction over the in-memory state: on success
//! the snapshot is persisted atomically and the accumulated events are
//! delivered to observers; on error everything is rolled back and the typed
//! error surfaces to the caller.
//!
//! Session-stable small integer ids are assigned to tasks at load and
//! insert time; uuids are the sync identity and never change.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::db::events::{StoreEvent, StoreObserver};
use crate::db::model::{
    keyword_is_reserved, now_second, AliasRecord, ConfigEntry, KeywordRecord, ProjectRecord,
    TaskLockRecord, TaskRecord, TaskStatus, URGENCY_MAX, URGENCY_MIN,
};
use crate::error::{Error, Result};
use crate::storage;
use crate::ui::InteractionPort;

const SNAPSHOT_VERSION: u32 = 1;

/// Entity domains addressable by uuid, used by the sync import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityDomain {
    Project,
    Task,
    Alias,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct DbState {
    pub(crate) projects: BTreeMap<Uuid, ProjectRecord>,
    pub(crate) keywords: BTreeMap<Uuid, KeywordRecord>,
    pub(crate) tasks: BTreeMap<Uuid, TaskRecord>,
    pub(crate) aliases: BTreeMap<Uuid, AliasRecord>,
    pub(crate) configs: BTreeMap<String, ConfigEntry>,
    pub(crate) locks: BTreeMap<Uuid, TaskLockRecord>,
    /// Small integer ids by task uuid, in insertion order. Local only,
    /// never dumped.
    #[serde(default)]
    pub(crate) task_ids: BTreeMap<Uuid, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(flatten)]
    state: DbState,
}

/// The authoritative task store.
pub struct TaskStore {
    path: Option<PathBuf>,
    state: DbState,
    next_id: u64,
    id_by_uuid: HashMap<Uuid, u64>,
    uuid_by_id: HashMap<u64, Uuid>,
    observers: Vec<Box<dyn StoreObserver>>,
    pending: Vec<StoreEvent>,
    txn_depth: usize,
}

impl TaskStore {
    /// An unpersisted store. Used by tests and one-shot tools.
    pub fn in_memory() -> Self {
        Self::from_state(None, DbState::default())
    }

    /// Load the snapshot from its platform default location, honoring the
    /// environment overrides of [`storage::Paths`].
    pub fn open_default() -> Result<Self> {
        let paths = storage::Paths::resolve()?;
        paths.init_dirs()?;
        Self::load(paths.db_file())
    }

    /// Load the snapshot at `path`, or start empty if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let state = if path.exists() {
            let snapshot: Snapshot = storage::read_json(path)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(Error::Integrity(format!(
                    "snapshot version {} not supported (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                )));
            }
            snapshot.state
        } else {
            DbState::default()
        };
        Ok(Self::from_state(Some(path.to_path_buf()), state))
    }

    fn from_state(path: Option<PathBuf>, state: DbState) -> Self {
        let mut store = Self {
            path,
            state,
            next_id: 1,
            id_by_uuid: HashMap::new(),
            uuid_by_id: HashMap::new(),
            observers: Vec::new(),
            pending: Vec::new(),
            txn_depth: 0,
        };
        store.assign_session_ids();
        store
    }

    /// Small ids follow insertion order and are recorded in the snapshot,
    /// so listings and id references stay stable between sessions even
    /// when creation dates tie at second precision.
    fn assign_session_ids(&mut self) {
        self.state
            .task_ids
            .retain(|uuid, _| self.state.tasks.contains_key(uuid));
        for (&uuid, &id) in &self.state.task_ids {
            self.id_by_uuid.insert(uuid, id);
            self.uuid_by_id.insert(id, uuid);
            self.next_id = self.next_id.max(id + 1);
        }

        // Tasks from snapshots written before ids were recorded.
        let mut missing: Vec<(chrono::NaiveDateTime, Uuid)> = self
            .state
            .tasks
            .values()
            .filter(|task| !self.id_by_uuid.contains_key(&task.uuid))
            .map(|task| (task.creation_date, task.uuid))
            .collect();
        missing.sort();
        for (_, uuid) in missing {
            let id = self.next_id;
            self.next_id += 1;
            self.id_by_uuid.insert(uuid, id);
            self.uuid_by_id.insert(id, uuid);
            self.state.task_ids.insert(uuid, id);
        }
    }

    /// Register a commit observer such as the dump replicator.
    pub fn add_observer(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` as a transaction. Nested calls join the outer transaction;
    /// the outermost commit persists the snapshot and notifies observers.
    pub fn in_txn<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.txn_depth > 0 {
            return f(self);
        }

        let backup_state = self.state.clone();
        let backup_next_id = self.next_id;
        let backup_id_by_uuid = self.id_by_uuid.clone();
        let backup_uuid_by_id = self.uuid_by_id.clone();

        self.txn_depth = 1;
        let result = f(self).and_then(|value| {
            self.persist()?;
            Ok(value)
        });
        self.txn_depth = 0;

        match result {
            Ok(value) => {
                let events = std::mem::take(&mut self.pending);
                for observer in &mut self.observers {
                    for event in &events {
                        observer.on_event(event);
                    }
                }
                for observer in &mut self.observers {
                    observer.on_commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                self.state = backup_state;
                self.next_id = backup_next_id;
                self.id_by_uuid = backup_id_by_uuid;
                self.uuid_by_id = backup_uuid_by_id;
                self.pending.clear();
                for observer in &mut self.observers {
                    observer.on_rollback();
                }
                Err(err)
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            state: self.state.clone(),
        };
        storage::write_json_locked(path, &snapshot)
    }

    fn emit(&mut self, event: StoreEvent) {
        self.pending.push(event);
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn projects(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.state.projects.values()
    }

    pub fn project_by_uuid(&self, uuid: Uuid) -> Result<&ProjectRecord> {
        self.state
            .projects
            .get(&uuid)
            .ok_or_else(|| Error::not_found("project", uuid.to_string()))
    }

    pub fn project_by_name(&self, name: &str) -> Option<&ProjectRecord> {
        self.state
            .projects
            .values()
            .find(|project| project.name == name)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &KeywordRecord> {
        self.state.keywords.values()
    }

    pub fn keyword_by_name(&self, name: &str) -> Option<&KeywordRecord> {
        self.state
            .keywords
            .values()
            .find(|keyword| keyword.name == name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.state.tasks.values()
    }

    pub fn task_by_uuid(&self, uuid: Uuid) -> Result<&TaskRecord> {
        self.state
            .tasks
            .get(&uuid)
            .ok_or_else(|| Error::not_found("task", uuid.to_string()))
    }

    pub fn tasks_of_project(&self, project_uuid: Uuid) -> impl Iterator<Item = &TaskRecord> {
        self.state
            .tasks
            .values()
            .filter(move |task| task.project_uuid == project_uuid)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &AliasRecord> {
        self.state.aliases.values()
    }

    pub fn alias_by_name(&self, name: &str) -> Option<&AliasRecord> {
        self.state.aliases.values().find(|alias| alias.name == name)
    }

    /// The session-stable integer id of a task.
    pub fn task_id(&self, uuid: Uuid) -> Option<u64> {
        self.id_by_uuid.get(&uuid).copied()
    }

    /// Resolve a task reference: a decimal session id, or a uuid when the
    /// reference contains a hyphen.
    pub fn get_task(&self, reference: &str) -> Result<&TaskRecord> {
        let trimmed = reference.trim();
        if trimmed.contains('-') {
            let uuid = Uuid::parse_str(trimmed)
                .map_err(|_| Error::InvalidId(reference.to_string()))?;
            self.task_by_uuid(uuid)
        } else {
            let id: u64 = trimmed
                .parse()
                .map_err(|_| Error::InvalidId(reference.to_string()))?;
            let uuid = self
                .uuid_by_id
                .get(&id)
                .ok_or_else(|| Error::not_found("task", reference))?;
            self.task_by_uuid(*uuid)
        }
    }

    // =========================================================================
    // Projects and keywords
    // =========================================================================

    /// Find a project by name, creating it after confirmation when allowed.
    pub fn get_or_create_project(
        &mut self,
        name: &str,
        ui: &mut dyn InteractionPort,
        create_if_needed: bool,
    ) -> Result<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::UserInput("project name cannot be empty".to_string()));
        }
        if let Some(project) = self.project_by_name(name) {
            return Ok(project.uuid);
        }
        if !create_if_needed {
            return Err(Error::not_found("project", name));
        }
        if !ui.confirm(&format!("Project '{name}' does not exist, create it?")) {
            return Err(Error::UserInput(format!("project '{name}' not created")));
        }
        self.in_txn(|store| {
            let project = ProjectRecord::new(name);
            let uuid = project.uuid;
            store.emit(StoreEvent::ProjectSaved(project.clone()));
            store.state.projects.insert(uuid, project);
            Ok(uuid)
        })
    }

    /// Find a keyword by name, creating it after confirmation.
    pub fn get_or_create_keyword(
        &mut self,
        name: &str,
        ui: &mut dyn InteractionPort,
    ) -> Result<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::UserInput("keyword name cannot be empty".to_string()));
        }
        if let Some(keyword) = self.keyword_by_name(name) {
            return Ok(keyword.uuid);
        }
        if !ui.confirm(&format!("Keyword '{name}' does not exist, create it?")) {
            return Err(Error::UserInput(format!("keyword '{name}' not created")));
        }
        self.ensure_keyword(name)
    }

    /// Create a keyword without prompting. Used by reserved keywords and
    /// the sync import.
    pub(crate) fn ensure_keyword(&mut self, name: &str) -> Result<Uuid> {
        if let Some(keyword) = self.keyword_by_name(name) {
            return Ok(keyword.uuid);
        }
        self.in_txn(|store| {
            let keyword = KeywordRecord::new(name);
            let uuid = keyword.uuid;
            store.state.keywords.insert(uuid, keyword);
            Ok(uuid)
        })
    }

    /// Rename a project. Renaming onto an existing name is a conflict.
    pub fn rename_project(&mut self, uuid: Uuid, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::UserInput("project name cannot be empty".to_string()));
        }
        if let Some(existing) = self.project_by_name(new_name) {
            if existing.uuid != uuid {
                return Err(Error::Conflict(format!(
                    "a project named '{new_name}' already exists"
                )));
            }
        }
        self.in_txn(|store| {
            let project = store
                .state
                .projects
                .get_mut(&uuid)
                .ok_or_else(|| Error::not_found("project", uuid.to_string()))?;
            project.name = new_name.to_string();
            let saved = project.clone();
            store.emit(StoreEvent::ProjectSaved(saved));
            Ok(())
        })
    }

    pub fn set_project_active(&mut self, uuid: Uuid, active: bool) -> Result<()> {
        self.in_txn(|store| {
            let project = store
                .state
                .projects
                .get_mut(&uuid)
                .ok_or_else(|| Error::not_found("project", uuid.to_string()))?;
            project.active = active;
            let saved = project.clone();
            store.emit(StoreEvent::ProjectSaved(saved));
            Ok(())
        })
    }

    /// Delete a project and cascade to its tasks.
    pub fn delete_project(&mut self, uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            store.project_by_uuid(uuid)?;
            let task_uuids: Vec<Uuid> = store
                .tasks_of_project(uuid)
                .map(|task| task.uuid)
                .collect();
            for task_uuid in task_uuids {
                store.remove_task_row(task_uuid);
            }
            store.state.projects.remove(&uuid);
            store.emit(StoreEvent::ProjectDeleted(uuid));
            Ok(())
        })
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Create a task, creating the project and any missing keywords after
    /// confirmation through `ui`.
    pub fn add_task(
        &mut self,
        project_name: &str,
        title: &str,
        keywords: &BTreeMap<String, Option<i64>>,
        ui: &mut dyn InteractionPort,
    ) -> Result<TaskRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::UserInput("task title cannot be empty".to_string()));
        }
        self.in_txn(|store| {
            let project_uuid = store.get_or_create_project(project_name, ui, true)?;
            for name in keywords.keys() {
                store.get_or_create_keyword(name, ui)?;
            }
            let mut task = TaskRecord::new(project_uuid, title);
            task.keywords = keywords.clone();
            let uuid = task.uuid;
            let id = store.next_id;
            store.next_id += 1;
            store.id_by_uuid.insert(uuid, id);
            store.uuid_by_id.insert(id, uuid);
            store.state.task_ids.insert(uuid, id);
            store.emit(StoreEvent::TaskSaved(task.clone()));
            store.state.tasks.insert(uuid, task.clone());
            Ok(task)
        })
    }

    /// Change a task status, honoring the recurrence rule: marking a
    /// recurring task done advances its due date and keeps the status.
    pub fn set_status(&mut self, uuid: Uuid, status: TaskStatus) -> Result<()> {
        self.in_txn(|store| {
            let task = store
                .state
                .tasks
                .get_mut(&uuid)
                .ok_or_else(|| Error::not_found("task", uuid.to_string()))?;

            if status == TaskStatus::Done && !task.recurrence.is_none() {
                let reference = task.due_date.unwrap_or_else(now_second);
                task.due_date = task.recurrence.get_next(reference);
            } else {
                task.status = status;
                task.done_date = if status == TaskStatus::Done {
                    Some(now_second())
                } else {
                    None
                };
            }
            let saved = task.clone();
            store.emit(StoreEvent::TaskSaved(saved));
            Ok(())
        })
    }

    /// Set urgency, clamped to the legal range.
    pub fn set_urgency(&mut self, uuid: Uuid, urgency: i32) -> Result<()> {
        self.update_task(uuid, |task| {
            task.urgency = urgency.clamp(URGENCY_MIN, URGENCY_MAX);
        })
    }

    pub fn set_title(&mut self, uuid: Uuid, title: &str) -> Result<()> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::UserInput("task title cannot be empty".to_string()));
        }
        self.update_task(uuid, |task| task.title = title)
    }

    pub fn set_description(&mut self, uuid: Uuid, description: &str) -> Result<()> {
        let description = description.to_string();
        self.update_task(uuid, |task| task.description = description)
    }

    pub fn set_due_date(&mut self, uuid: Uuid, due: Option<chrono::NaiveDateTime>) -> Result<()> {
        self.update_task(uuid, |task| task.due_date = due)
    }

    pub fn set_recurrence(
        &mut self,
        uuid: Uuid,
        recurrence: crate::recurrence::RecurrenceRule,
    ) -> Result<()> {
        self.update_task(uuid, |task| task.recurrence = recurrence)
    }

    /// Replace the full keyword association set of a task. Every keyword
    /// name must already exist.
    pub fn set_keyword_dict(
        &mut self,
        uuid: Uuid,
        keywords: &BTreeMap<String, Option<i64>>,
    ) -> Result<()> {
        for name in keywords.keys() {
            if self.keyword_by_name(name).is_none() {
                return Err(Error::not_found("keyword", name.clone()));
            }
        }
        let keywords = keywords.clone();
        self.update_task(uuid, |task| task.keywords = keywords)
    }

    fn update_task(&mut self, uuid: Uuid, f: impl FnOnce(&mut TaskRecord)) -> Result<()> {
        self.in_txn(|store| {
            let task = store
                .state
                .tasks
                .get_mut(&uuid)
                .ok_or_else(|| Error::not_found("task", uuid.to_string()))?;
            f(task);
            let saved = task.clone();
            store.emit(StoreEvent::TaskSaved(saved));
            Ok(())
        })
    }

    /// Remove a task explicitly. When it was the last task of its project
    /// the project is removed too; this is the one cascade-up path.
    pub fn remove_task(&mut self, uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            let project_uuid = store.task_by_uuid(uuid)?.project_uuid;
            store.remove_task_row(uuid);
            if store.tasks_of_project(project_uuid).next().is_none() {
                store.state.projects.remove(&project_uuid);
                store.emit(StoreEvent::ProjectDeleted(project_uuid));
            }
            Ok(())
        })
    }

    /// Delete a task without touching its project. Used by mass edit and
    /// the sync import.
    pub fn delete_task(&mut self, uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            store.task_by_uuid(uuid)?;
            store.remove_task_row(uuid);
            Ok(())
        })
    }

    fn remove_task_row(&mut self, uuid: Uuid) {
        if self.state.tasks.remove(&uuid).is_some() {
            self.emit(StoreEvent::TaskDeleted(uuid));
        }
        self.state.locks.remove(&uuid);
        self.state.task_ids.remove(&uuid);
        if let Some(id) = self.id_by_uuid.remove(&uuid) {
            self.uuid_by_id.remove(&id);
        }
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    pub fn add_alias(&mut self, name: &str, command: &str) -> Result<AliasRecord> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::UserInput(
                "alias name must be a single word".to_string(),
            ));
        }
        if self.alias_by_name(name).is_some() {
            return Err(Error::Conflict(format!("alias '{name}' already exists")));
        }
        let command = command.to_string();
        let name = name.to_string();
        self.in_txn(move |store| {
            let alias = AliasRecord::new(name, command);
            store.emit(StoreEvent::AliasSaved(alias.clone()));
            store.state.aliases.insert(alias.uuid, alias.clone());
            Ok(alias)
        })
    }

    pub fn delete_alias(&mut self, uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            store
                .state
                .aliases
                .remove(&uuid)
                .ok_or_else(|| Error::not_found("alias", uuid.to_string()))?;
            store.emit(StoreEvent::AliasDeleted(uuid));
            Ok(())
        })
    }

    // =========================================================================
    // Configuration rows
    // =========================================================================

    /// Current value of a recognized key, falling back to its default.
    pub fn get_config(&self, name: &str) -> Result<String> {
        if let Some(entry) = self.state.configs.get(name) {
            return Ok(entry.value.clone());
        }
        config::key(name)
            .map(|key| key.default.to_string())
            .ok_or_else(|| Error::UserInput(format!("unknown configuration key '{name}'")))
    }

    /// Set a user-tunable key after validation.
    pub fn set_config(&mut self, name: &str, value: &str) -> Result<()> {
        config::validate(name, value)?;
        let desc = config::key(name).map(|key| key.desc).unwrap_or_default();
        let entry = ConfigEntry {
            name: name.to_string(),
            value: value.to_string(),
            system: false,
            desc: desc.to_string(),
        };
        self.in_txn(|store| {
            store.state.configs.insert(entry.name.clone(), entry);
            Ok(())
        })
    }

    /// Set an internal bookkeeping entry, bypassing the key table.
    pub fn set_system_config(&mut self, name: &str, value: &str, desc: &str) -> Result<()> {
        let entry = ConfigEntry {
            name: name.to_string(),
            value: value.to_string(),
            system: true,
            desc: desc.to_string(),
        };
        self.in_txn(|store| {
            store.state.configs.insert(entry.name.clone(), entry);
            Ok(())
        })
    }

    // =========================================================================
    // Task locks (internal rows; see db::tasklock for the manager)
    // =========================================================================

    pub(crate) fn lock_for(&self, task_uuid: Uuid) -> Option<&TaskLockRecord> {
        self.state.locks.get(&task_uuid)
    }

    pub(crate) fn put_lock(&mut self, record: TaskLockRecord) -> Result<()> {
        self.in_txn(|store| {
            store.state.locks.insert(record.task_uuid, record);
            Ok(())
        })
    }

    pub(crate) fn remove_lock(&mut self, task_uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            store.state.locks.remove(&task_uuid);
            Ok(())
        })
    }

    // =========================================================================
    // Sync import support
    // =========================================================================

    /// Insert or replace a project by uuid. Name collisions are the sync
    /// manager's business and must be resolved before calling this.
    pub fn upsert_project(&mut self, record: ProjectRecord) -> Result<()> {
        if let Some(existing) = self.project_by_name(&record.name) {
            if existing.uuid != record.uuid {
                return Err(Error::Conflict(format!(
                    "a project named '{}' already exists",
                    record.name
                )));
            }
        }
        self.in_txn(|store| {
            store.emit(StoreEvent::ProjectSaved(record.clone()));
            store.state.projects.insert(record.uuid, record);
            Ok(())
        })
    }

    /// Insert or replace a task by uuid. The referenced project must
    /// exist; missing keywords are created without prompting.
    pub fn upsert_task(&mut self, record: TaskRecord) -> Result<()> {
        self.in_txn(|store| {
            if !store.state.projects.contains_key(&record.project_uuid) {
                return Err(Error::Integrity(format!(
                    "task {} references unknown project {}",
                    record.uuid, record.project_uuid
                )));
            }
            let names: Vec<String> = record.keywords.keys().cloned().collect();
            for name in names {
                store.ensure_keyword(&name)?;
            }
            if !store.id_by_uuid.contains_key(&record.uuid) {
                let id = store.next_id;
                store.next_id += 1;
                store.id_by_uuid.insert(record.uuid, id);
                store.uuid_by_id.insert(id, record.uuid);
                store.state.task_ids.insert(record.uuid, id);
            }
            store.emit(StoreEvent::TaskSaved(record.clone()));
            store.state.tasks.insert(record.uuid, record);
            Ok(())
        })
    }

    /// Insert or replace an alias by uuid. A same-named local alias with a
    /// different uuid is replaced; the remote side wins.
    pub fn upsert_alias(&mut self, record: AliasRecord) -> Result<()> {
        self.in_txn(|store| {
            let shadowed: Vec<Uuid> = store
                .state
                .aliases
                .values()
                .filter(|alias| alias.name == record.name && alias.uuid != record.uuid)
                .map(|alias| alias.uuid)
                .collect();
            for uuid in shadowed {
                store.state.aliases.remove(&uuid);
                store.emit(StoreEvent::AliasDeleted(uuid));
            }
            store.emit(StoreEvent::AliasSaved(record.clone()));
            store.state.aliases.insert(record.uuid, record);
            Ok(())
        })
    }

    /// Delete an entity by domain and uuid. Unknown uuids are ignored: the
    /// remote may delete rows this replica never saw.
    pub fn delete_entity(&mut self, domain: EntityDomain, uuid: Uuid) -> Result<()> {
        self.in_txn(|store| {
            match domain {
                EntityDomain::Project => {
                    if store.state.projects.contains_key(&uuid) {
                        return store.delete_project(uuid);
                    }
                }
                EntityDomain::Task => {
                    store.remove_task_row(uuid);
                }
                EntityDomain::Alias => {
                    if store.state.aliases.remove(&uuid).is_some() {
                        store.emit(StoreEvent::AliasDeleted(uuid));
                    }
                }
            }
            Ok(())
        })
    }

    /// Reassign every task of `from` to `to`. Used when two projects with
    /// the same name are merged during a pull.
    pub fn reassign_tasks(&mut self, from: Uuid, to: Uuid) -> Result<()> {
        self.in_txn(|store| {
            store.project_by_uuid(to)?;
            let task_uuids: Vec<Uuid> = store
                .tasks_of_project(from)
                .map(|task| task.uuid)
                .collect();
            for uuid in task_uuids {
                let task = store
                    .state
                    .tasks
                    .get_mut(&uuid)
                    .ok_or_else(|| Error::not_found("task", uuid.to_string()))?;
                task.project_uuid = to;
                let saved = task.clone();
                store.emit(StoreEvent::TaskSaved(saved));
            }
            Ok(())
        })
    }
}

/// Partition a keyword map into user keywords and reserved (`_`-prefixed)
/// keywords.
pub fn split_keyword_dict(
    keywords: &BTreeMap<String, Option<i64>>,
) -> (BTreeMap<String, Option<i64>>, BTreeMap<String, Option<i64>>) {
    let mut user = BTreeMap::new();
    let mut reserved = BTreeMap::new();
    for (name, value) in keywords {
        if keyword_is_reserved(name) {
            reserved.insert(name.clone(), *value);
        } else {
            user.insert(name.clone(), *value);
        }
    }
    (user, reserved)
}
