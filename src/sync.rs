//! Synchronization of the dump tree across devices.
//!
//! The dump working copy is a git clone shared by all replicas. Pull
//! merges `origin/master`, resolves entity-level conflicts key by key,
//! then imports everything committed since the `synced` ref into the
//! store in one transaction. Push forwards local commits and reports a
//! non-fast-forward rejection so the caller can pull first.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::db::model::{AliasRecord, ProjectRecord, TaskRecord};
use crate::db::store::{EntityDomain, TaskStore};
use crate::dump::{self, DUMP_VERSION, VERSION_FILE};
use crate::error::{Error, Result};
use crate::ui::{CollisionStrategy, FieldChoice, PullUi, SideChoice};
use crate::vcs::{ChangeSet, MergeOutcome, Vcs, SYNC_REF};

const REMOTE_MASTER: &str = "refs/remotes/origin/master";

/// A conflicting entity file during a pull merge.
#[derive(Debug)]
pub struct ConflictingObject {
    pub path: PathBuf,
    pub ancestor: Option<Value>,
    pub local: Option<Value>,
    pub remote: Option<Value>,
}

/// What a pull did, for reporting to the user.
#[derive(Debug, Default)]
pub struct PullReport {
    /// Project renames performed by the `Rename` collision strategy, as
    /// `(old, new)` pairs.
    pub renames: Vec<(String, String)>,
    /// Entity files imported into the store.
    pub imported: usize,
}

/// Synchronization over one dump working copy.
pub struct SyncManager {
    vcs: Vcs,
}

impl SyncManager {
    /// Initialize a fresh dump repository and populate it from the store.
    pub fn init_dump(store: &TaskStore, dump_dir: &Path) -> Result<Self> {
        let vcs = Vcs::init(dump_dir)?;
        let manager = Self { vcs };
        dump::dump_all(store, manager.vcs.workdir())?;
        if let Some(oid) = manager.vcs.commit_all("Created")? {
            manager.vcs.set_synced(oid)?;
        }
        Ok(manager)
    }

    /// Clone an existing dump repository.
    pub fn clone_remote(url: &str, dump_dir: &Path) -> Result<Self> {
        let vcs = Vcs::clone(url, dump_dir)?;
        Ok(Self { vcs })
    }

    /// Open an existing dump working copy.
    pub fn open(dump_dir: &Path) -> Result<Self> {
        let vcs = Vcs::open(dump_dir)?;
        Ok(Self { vcs })
    }

    pub fn dump_dir(&self) -> &Path {
        self.vcs.workdir()
    }

    /// Snapshot the full store into the dump tree and commit the result.
    pub fn dump(&self, store: &TaskStore) -> Result<()> {
        dump::dump_all(store, self.vcs.workdir())?;
        self.vcs.commit_all("Synced")?;
        Ok(())
    }

    /// Pull remote changes, resolve conflicts and import into the store.
    pub fn pull(&self, store: &mut TaskStore, ui: &mut dyn PullUi) -> Result<PullReport> {
        // Local edits must be committed before merging.
        if !self.vcs.is_clean()? {
            self.vcs.commit_all("Synced")?;
        }

        self.vcs.fetch()?;

        let Some(raw) = self.vcs.file_content_at(REMOTE_MASTER, Path::new(VERSION_FILE))? else {
            // Empty remote, nothing to pull.
            debug!("remote has no dump yet");
            return Ok(PullReport::default());
        };
        let remote_version = dump::parse_version(&String::from_utf8_lossy(&raw))?;
        if remote_version != DUMP_VERSION {
            return Err(Error::DumpVersion {
                local: DUMP_VERSION,
                remote: remote_version,
            });
        }

        match self.vcs.merge_remote()? {
            MergeOutcome::UpToDate | MergeOutcome::FastForward => {}
            MergeOutcome::Clean => {
                self.vcs.commit_merge("Merged")?;
            }
            MergeOutcome::Conflicts(paths) => {
                warn!(count = paths.len(), "merge left conflicting entities");
                if let Err(err) = self.resolve_conflicts(&paths, ui) {
                    self.vcs.abort_merge()?;
                    return Err(err);
                }
                self.vcs.commit_merge("Merged")?;
            }
        }

        let report = self.import_since_last_sync(store, ui)?;

        // Imports may have rewritten dump files (renames, merges). Keep
        // the tree clean and move the sync point past our own echo.
        self.vcs.commit_all("Pulled")?;
        self.vcs.set_synced(self.vcs.head_oid()?)?;
        info!(imported = report.imported, "pull finished");
        Ok(report)
    }

    fn resolve_conflicts(&self, paths: &[PathBuf], ui: &mut dyn PullUi) -> Result<()> {
        for path in paths {
            let versions = self.vcs.conflict_versions(path)?;
            let object = ConflictingObject {
                path: path.clone(),
                ancestor: parse_optional(versions.ancestor.as_deref())?,
                local: parse_optional(versions.local.as_deref())?,
                remote: parse_optional(versions.remote.as_deref())?,
            };
            let resolved = resolve_object(&object, ui)?;

            let full = self.vcs.workdir().join(path);
            match resolved {
                Some(value) => {
                    if let Some(parent) = full.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    crate::storage::write_json(&full, &value)?;
                }
                None => match fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                },
            }
            self.vcs.stage(std::slice::from_ref(path))?;
        }
        Ok(())
    }

    /// Import every dump change committed since the `synced` ref.
    pub fn import_since_last_sync(
        &self,
        store: &mut TaskStore,
        ui: &mut dyn PullUi,
    ) -> Result<PullReport> {
        let changes = self.vcs.changes_since(SYNC_REF)?;
        self.import_changes(store, &changes, ui)
    }

    /// Import the whole dump tree, for populating a fresh store from a
    /// clone.
    pub fn import_all(&self, store: &mut TaskStore, ui: &mut dyn PullUi) -> Result<PullReport> {
        let mut changes = ChangeSet::default();
        for dir in ["projects", "tasks", "aliases"] {
            let dir_path = self.vcs.workdir().join(dir);
            if !dir_path.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir_path)? {
                let entry = entry?;
                changes.added.push(PathBuf::from(dir).join(entry.file_name()));
            }
        }
        let report = self.import_changes(store, &changes, ui)?;
        self.vcs.set_synced(self.vcs.head_oid()?)?;
        Ok(report)
    }

    fn import_changes(
        &self,
        store: &mut TaskStore,
        changes: &ChangeSet,
        ui: &mut dyn PullUi,
    ) -> Result<PullReport> {
        let mut report = PullReport::default();
        if changes.is_empty() {
            return Ok(report);
        }

        let mut projects = Vec::new();
        let mut tasks = Vec::new();
        let mut aliases = Vec::new();
        for path in changes.added.iter().chain(&changes.modified) {
            let Some((domain, _uuid)) = dump::classify_path(path) else {
                continue;
            };
            let value: Value = crate::storage::read_json(self.vcs.workdir().join(path))?;
            match domain {
                EntityDomain::Project => projects.push(value),
                EntityDomain::Task => tasks.push(value),
                EntityDomain::Alias => aliases.push(value),
            }
            report.imported += 1;
        }

        store.in_txn(|store| {
            // The change set may contain this replica's own files from
            // before a collision was handled; `handled` and `remap` keep
            // those stale echoes from undoing the resolution.
            let mut handled = CollisionLedger::default();

            // Projects first so task imports can resolve their references.
            for value in projects {
                let record: ProjectRecord = serde_json::from_value(value)?;
                import_project(store, record, ui, &mut report, &mut handled)?;
            }
            for value in tasks {
                let mut record: TaskRecord = serde_json::from_value(value)?;
                if let Some(target) = handled.remap.get(&record.project_uuid) {
                    record.project_uuid = *target;
                }
                store.upsert_task(record)?;
            }
            for value in aliases {
                let record: AliasRecord = serde_json::from_value(value)?;
                store.upsert_alias(record)?;
            }

            // Deletions last; removing a project cascades to any of its
            // tasks that were deleted in the same batch.
            for path in &changes.removed {
                if let Some((domain, uuid)) = dump::classify_path(path) {
                    store.delete_entity(domain, uuid)?;
                    report.imported += 1;
                }
            }
            Ok(())
        })?;
        Ok(report)
    }

    /// Push local commits. `NotFastForward` tells the caller to pull
    /// first.
    pub fn push(&self, store: &TaskStore) -> Result<()> {
        if !self.vcs.is_clean()? {
            dump::dump_all(store, self.vcs.workdir())?;
            self.vcs.commit_all("Synced")?;
        }
        self.vcs.push()
    }

    /// Whether commits since the sync point are waiting to be imported.
    pub fn has_changes_to_import(&self) -> Result<bool> {
        Ok(!self.vcs.changes_since(SYNC_REF)?.is_empty())
    }

    /// Whether local commits or uncommitted dump edits await a push.
    pub fn has_changes_to_push(&self) -> Result<bool> {
        if !self.vcs.is_clean()? {
            return Ok(true);
        }
        let (ahead, _behind) = self.vcs.ahead_behind()?;
        Ok(ahead > 0)
    }
}

fn parse_optional(raw: Option<&[u8]>) -> Result<Option<Value>> {
    match raw {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Resolve one conflicting entity. `None` means the file is deleted.
fn resolve_object(object: &ConflictingObject, ui: &mut dyn PullUi) -> Result<Option<Value>> {
    let path = object.path.to_string_lossy();

    if let (Some(local), Some(remote)) = (&object.local, &object.remote) {
        let ancestor = object.ancestor.as_ref().map(as_object).unwrap_or_default();
        let local = as_object(local);
        let remote = as_object(remote);

        let mut keys: Vec<&String> = local.keys().chain(remote.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut merged = BTreeMap::new();
        for key in keys {
            let base = ancestor.get(key);
            let ours = local.get(key);
            let theirs = remote.get(key);
            let value = if ours == theirs {
                ours.cloned()
            } else if ours == base {
                // Unchanged on our side, the remote edit wins.
                theirs.cloned()
            } else if theirs == base {
                ours.cloned()
            } else {
                let ours = ours.cloned().unwrap_or(Value::Null);
                let theirs = theirs.cloned().unwrap_or(Value::Null);
                match ui.resolve_field(&path, key, &ours, &theirs) {
                    FieldChoice::Local => Some(ours),
                    FieldChoice::Remote => Some(theirs),
                    FieldChoice::Cancel => {
                        return Err(Error::Conflict(format!(
                            "conflict on '{path}' left unresolved"
                        )))
                    }
                }
            };
            if let Some(value) = value {
                merged.insert(key.clone(), value);
            }
        }
        let merged: Map<String, Value> = merged.into_iter().collect();
        return Ok(Some(Value::Object(merged)));
    }

    // Modified on one side, deleted on the other: whole-object choice.
    match ui.resolve_object(&path, object.local.as_ref(), object.remote.as_ref()) {
        SideChoice::Local => Ok(object.local.clone()),
        SideChoice::Remote => Ok(object.remote.clone()),
        SideChoice::Cancel => Err(Error::Conflict(format!(
            "conflict on '{path}' left unresolved"
        ))),
    }
}

/// Local projects already renamed or merged away during this import, and
/// where their tasks should be pointed instead.
#[derive(Debug, Default)]
struct CollisionLedger {
    handled: std::collections::BTreeSet<uuid::Uuid>,
    remap: BTreeMap<uuid::Uuid, uuid::Uuid>,
}

/// Apply the project name collision policy, then upsert the incoming
/// record.
fn import_project(
    store: &mut TaskStore,
    record: ProjectRecord,
    ui: &mut dyn PullUi,
    report: &mut PullReport,
    ledger: &mut CollisionLedger,
) -> Result<()> {
    // A stale snapshot of a project this import already resolved.
    if ledger.handled.contains(&record.uuid) {
        return Ok(());
    }

    let collision = store
        .project_by_name(&record.name)
        .filter(|local| local.uuid != record.uuid)
        .map(|local| local.uuid);

    if let Some(local_uuid) = collision {
        match ui.project_name_collision(&record.name) {
            CollisionStrategy::Merge => {
                // Free the name, bring the remote project in, move the
                // local tasks over, drop the now empty local project.
                let parking = unique_project_name(store, &record.name);
                store.rename_project(local_uuid, &parking)?;
                store.upsert_project(record.clone())?;
                store.reassign_tasks(local_uuid, record.uuid)?;
                store.delete_project(local_uuid)?;
                ledger.handled.insert(local_uuid);
                ledger.remap.insert(local_uuid, record.uuid);
                return Ok(());
            }
            CollisionStrategy::Rename => {
                let new_name = unique_project_name(store, &record.name);
                store.rename_project(local_uuid, &new_name)?;
                ui.notify_rename(&record.name, &new_name);
                report.renames.push((record.name.clone(), new_name));
                ledger.handled.insert(local_uuid);
            }
            CollisionStrategy::Cancel => {
                return Err(Error::UserInput(format!(
                    "pull cancelled on project name collision '{}'",
                    record.name
                )));
            }
        }
    }
    store.upsert_project(record)
}

/// First `name_1`, `name_2`, ... not taken by an existing project.
fn unique_project_name(store: &TaskStore, name: &str) -> String {
    let mut counter = 1;
    loop {
        let candidate = format!("{name}_{counter}");
        if store.project_by_name(&candidate).is_none() {
            return candidate;
        }
        counter += 1;
    }
}
