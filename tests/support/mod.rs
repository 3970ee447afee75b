//! Shared fixtures: a bare remote plus replicas wiring a store, a dump
//! replicator and a sync manager together, the way a real deployment
//! does.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use git2::Repository;
use tempfile::TempDir;
use uuid::Uuid;

use yokadi::db::{TaskRecord, TaskStore};
use yokadi::dump::DumpReplicator;
use yokadi::sync::{PullReport, SyncManager};
use yokadi::ui::{AcceptAll, CollisionStrategy, FieldChoice, PullUi, SideChoice};
use yokadi::Result;

static TRACING: std::sync::Once = std::sync::Once::new();

/// Route crate logs through the test harness, once per process. Enable
/// with `RUST_LOG=yokadi=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A bare repository standing in for the shared remote.
pub struct Remote {
    _dir: TempDir,
    pub url: String,
}

impl Remote {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("remote.git");
        let mut options = git2::RepositoryInitOptions::new();
        options.bare(true).initial_head("refs/heads/master");
        Repository::init_opts(&path, &options).expect("failed to init bare remote");
        let url = path.to_string_lossy().to_string();
        Self { _dir: dir, url }
    }
}

/// One device: a store persisted to disk, its dump replicator and a sync
/// working copy cloned from the remote.
pub struct Replica {
    _dir: TempDir,
    pub store: TaskStore,
    pub sync: SyncManager,
}

impl Replica {
    fn clone_from(remote: &Remote) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let dump_dir = dir.path().join("dump");
        let sync = SyncManager::clone_remote(&remote.url, &dump_dir).expect("clone failed");

        let mut store = TaskStore::load(dir.path().join("yokadi.json")).expect("load failed");
        store.add_observer(Box::new(DumpReplicator::new(&dump_dir)));
        Self {
            _dir: dir,
            store,
            sync,
        }
    }

    /// First device: clone the empty remote and publish the local store.
    pub fn bootstrap(remote: &Remote) -> Self {
        let mut replica = Self::clone_from(remote);
        replica.sync.dump(&replica.store).expect("dump failed");
        replica.sync.push(&replica.store).expect("push failed");
        // Establishes the sync point.
        replica
            .sync
            .pull(&mut replica.store, &mut ScriptedPullUi::default())
            .expect("bootstrap pull failed");
        replica
    }

    /// Later device: clone and import the published state.
    pub fn join(remote: &Remote) -> Self {
        let mut replica = Self::clone_from(remote);
        replica
            .sync
            .import_all(&mut replica.store, &mut ScriptedPullUi::default())
            .expect("import_all failed");
        replica
    }

    pub fn add_task(&mut self, project: &str, title: &str) -> TaskRecord {
        self.store
            .add_task(project, title, &BTreeMap::new(), &mut AcceptAll)
            .expect("add_task failed")
    }

    pub fn pull(&mut self, ui: &mut dyn PullUi) -> Result<PullReport> {
        self.sync.pull(&mut self.store, ui)
    }

    pub fn push(&mut self) -> Result<()> {
        self.sync.push(&self.store)
    }

    pub fn task_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.store.tasks().map(|t| t.title.clone()).collect();
        titles.sort();
        titles
    }

    pub fn project_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.projects().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }

    pub fn task(&self, uuid: Uuid) -> &TaskRecord {
        self.store.task_by_uuid(uuid).expect("task not found")
    }
}

/// A pull UI answering with preset choices and recording what it was
/// asked.
pub struct ScriptedPullUi {
    pub field: FieldChoice,
    pub object: SideChoice,
    pub collision: CollisionStrategy,
    pub field_questions: Vec<(String, String)>,
    pub renames: Vec<(String, String)>,
}

impl Default for ScriptedPullUi {
    fn default() -> Self {
        Self {
            field: FieldChoice::Cancel,
            object: SideChoice::Cancel,
            collision: CollisionStrategy::Cancel,
            field_questions: Vec::new(),
            renames: Vec::new(),
        }
    }
}

impl PullUi for ScriptedPullUi {
    fn resolve_field(
        &mut self,
        path: &str,
        key: &str,
        _local: &serde_json::Value,
        _remote: &serde_json::Value,
    ) -> FieldChoice {
        self.field_questions.push((path.to_string(), key.to_string()));
        self.field
    }

    fn resolve_object(
        &mut self,
        _path: &str,
        _local: Option<&serde_json::Value>,
        _remote: Option<&serde_json::Value>,
    ) -> SideChoice {
        self.object
    }

    fn project_name_collision(&mut self, _name: &str) -> CollisionStrategy {
        self.collision
    }

    fn notify_rename(&mut self, old_name: &str, new_name: &str) {
        self.renames.push((old_name.to_string(), new_name.to_string()));
    }
}

/// Relative dump path of a task entity, for poking at the tree directly.
pub fn task_dump_path(uuid: Uuid) -> PathBuf {
    PathBuf::from("tasks").join(format!("{uuid}.json"))
}
