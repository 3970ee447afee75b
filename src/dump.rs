//! Dump tree replication.
//!
//! The dump is a git-friendly mirror of the store: one JSON file per
//! entity under `projects/`, `tasks/` and `aliases/`, plus a `version`
//! file carrying the dump format version. The replicator observes store
//! commits and keeps the tree in step; `dump_all` rebuilds it from
//! scratch.
//!
//! Config rows and task locks are machine-local and never dumped.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use crate::db::events::{StoreEvent, StoreObserver};
use crate::db::store::{EntityDomain, TaskStore};
use crate::error::{Error, Result};
use crate::storage;

/// Version of the dump wire format.
pub const DUMP_VERSION: u32 = 1;
/// Name of the version file at the dump root.
pub const VERSION_FILE: &str = "version";

const PROJECTS_DIR: &str = "projects";
const TASKS_DIR: &str = "tasks";
const ALIASES_DIR: &str = "aliases";

fn domain_dir(domain: EntityDomain) -> &'static str {
    match domain {
        EntityDomain::Project => PROJECTS_DIR,
        EntityDomain::Task => TASKS_DIR,
        EntityDomain::Alias => ALIASES_DIR,
    }
}

/// Relative path of an entity file inside the dump tree.
pub fn entity_path(domain: EntityDomain, uuid: Uuid) -> PathBuf {
    PathBuf::from(domain_dir(domain)).join(format!("{uuid}.json"))
}

/// Map a relative dump path back to its domain and uuid. Returns `None`
/// for the version file and anything else that is not an entity file.
pub fn classify_path(path: &Path) -> Option<(EntityDomain, Uuid)> {
    let mut components = path.components();
    let dir = components.next()?.as_os_str().to_str()?;
    let file = components.next()?.as_os_str().to_str()?;
    if components.next().is_some() {
        return None;
    }
    let domain = match dir {
        PROJECTS_DIR => EntityDomain::Project,
        TASKS_DIR => EntityDomain::Task,
        ALIASES_DIR => EntityDomain::Alias,
        _ => return None,
    };
    let stem = file.strip_suffix(".json")?;
    let uuid = Uuid::parse_str(stem).ok()?;
    Some((domain, uuid))
}

/// Create the dump skeleton: domain directories and the version file.
pub fn init_dump_tree(root: &Path) -> Result<()> {
    for dir in [PROJECTS_DIR, TASKS_DIR, ALIASES_DIR] {
        fs::create_dir_all(root.join(dir))?;
    }
    storage::write_atomic(root.join(VERSION_FILE), format!("{DUMP_VERSION}\n").as_bytes())
}

/// Read a dump tree's version file.
pub fn read_version(root: &Path) -> Result<u32> {
    let raw = fs::read_to_string(root.join(VERSION_FILE))?;
    parse_version(&raw)
}

pub(crate) fn parse_version(raw: &str) -> Result<u32> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Integrity(format!("malformed dump version '{}'", raw.trim())))
}

/// Write the full store state into the dump tree, removing entity files
/// that no longer have a backing row.
pub fn dump_all(store: &TaskStore, root: &Path) -> Result<()> {
    init_dump_tree(root)?;

    // Everything goes through `Value` so key order is canonical and a
    // file written here is byte-identical to one written by the
    // replicator.
    let mut expected: BTreeSet<PathBuf> = BTreeSet::new();
    for project in store.projects() {
        let path = entity_path(EntityDomain::Project, project.uuid);
        storage::write_json(root.join(&path), &serde_json::to_value(project)?)?;
        expected.insert(path);
    }
    for task in store.tasks() {
        let path = entity_path(EntityDomain::Task, task.uuid);
        storage::write_json(root.join(&path), &serde_json::to_value(task)?)?;
        expected.insert(path);
    }
    for alias in store.aliases() {
        let path = entity_path(EntityDomain::Alias, alias.uuid);
        storage::write_json(root.join(&path), &serde_json::to_value(alias)?)?;
        expected.insert(path);
    }

    for dir in [PROJECTS_DIR, TASKS_DIR, ALIASES_DIR] {
        for entry in fs::read_dir(root.join(dir))? {
            let entry = entry?;
            let rel = PathBuf::from(dir).join(entry.file_name());
            if !expected.contains(&rel) {
                fs::remove_file(entry.path())?;
            }
        }
    }
    Ok(())
}

/// Store observer mirroring commits into the dump tree.
///
/// Events accumulate during the transaction; on commit, deletes are
/// applied before writes so a delete-then-recreate of the same uuid lands
/// as a write. On rollback everything accumulated is dropped.
pub struct DumpReplicator {
    root: PathBuf,
    deletes: BTreeSet<PathBuf>,
    writes: BTreeMap<PathBuf, Value>,
}

impl DumpReplicator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            deletes: BTreeSet::new(),
            writes: BTreeMap::new(),
        }
    }

    fn record_write(&mut self, domain: EntityDomain, uuid: Uuid, value: Value) {
        let path = entity_path(domain, uuid);
        self.deletes.remove(&path);
        self.writes.insert(path, value);
    }

    fn record_delete(&mut self, domain: EntityDomain, uuid: Uuid) {
        let path = entity_path(domain, uuid);
        self.writes.remove(&path);
        self.deletes.insert(path);
    }
}

impl StoreObserver for DumpReplicator {
    fn on_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::ProjectSaved(project) => {
                if let Ok(value) = serde_json::to_value(project) {
                    self.record_write(EntityDomain::Project, project.uuid, value);
                }
            }
            StoreEvent::ProjectDeleted(uuid) => {
                self.record_delete(EntityDomain::Project, *uuid);
            }
            StoreEvent::TaskSaved(task) => {
                if let Ok(value) = serde_json::to_value(task) {
                    self.record_write(EntityDomain::Task, task.uuid, value);
                }
            }
            StoreEvent::TaskDeleted(uuid) => {
                self.record_delete(EntityDomain::Task, *uuid);
            }
            StoreEvent::AliasSaved(alias) => {
                if let Ok(value) = serde_json::to_value(alias) {
                    self.record_write(EntityDomain::Alias, alias.uuid, value);
                }
            }
            StoreEvent::AliasDeleted(uuid) => {
                self.record_delete(EntityDomain::Alias, *uuid);
            }
        }
    }

    fn on_commit(&mut self) -> Result<()> {
        for path in std::mem::take(&mut self.deletes) {
            let full = self.root.join(path);
            match fs::remove_file(&full) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        for (path, value) in std::mem::take(&mut self.writes) {
            let full = self.root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            storage::write_json(&full, &value)?;
        }
        Ok(())
    }

    fn on_rollback(&mut self) {
        self.deletes.clear();
        self.writes.clear();
    }
}
