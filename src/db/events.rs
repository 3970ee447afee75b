//! Post-commit store events.
//!
//! Every mutation of the task store is observable: events accumulate during
//! a transaction and are delivered to registered observers once the commit
//! has been persisted. The dump replicator is the primary observer.
//!
//! Config rows and task locks are store-internal and never produce events.

use uuid::Uuid;

use crate::db::model::{AliasRecord, ProjectRecord, TaskRecord};
use crate::error::Result;

/// A committed mutation. `Saved` covers both insert and update; the
/// receiver keys on the uuid.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    ProjectSaved(ProjectRecord),
    ProjectDeleted(Uuid),
    TaskSaved(TaskRecord),
    TaskDeleted(Uuid),
    AliasSaved(AliasRecord),
    AliasDeleted(Uuid),
}

/// Observer of store commits.
pub trait StoreObserver {
    /// Called once per accumulated event, in mutation order, after the
    /// store state has been persisted.
    fn on_event(&mut self, event: &StoreEvent);

    /// Called after all events of a commit have been delivered.
    fn on_commit(&mut self) -> Result<()>;

    /// Called when the transaction rolled back; accumulated state must be
    /// discarded without side effects.
    fn on_rollback(&mut self);
}
