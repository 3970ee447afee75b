//! Injected interaction ports.
//!
//! Store helpers that may prompt (`get_or_create_*`) and the sync manager's
//! conflict resolution never talk to a terminal directly. They go through
//! these traits; the shell layer supplies interactive implementations, and
//! the defaults here refuse creation and cancel conflicts, which is the
//! right behaviour for scripts and daemons.

use serde_json::Value;

/// Confirmation prompts for find-or-create paths.
pub trait InteractionPort {
    /// Ask whether a missing entity should be created.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Refuses every creation. The non-interactive default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl InteractionPort for NonInteractive {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}

/// Accepts every creation. Used by batch paths that must not prompt, such
/// as the sync import.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl InteractionPort for AcceptAll {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Which side of a conflicting field to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChoice {
    Local,
    Remote,
    Cancel,
}

/// Which side of a modified-deleted conflict to keep, whole-object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideChoice {
    Local,
    Remote,
    Cancel,
}

/// What to do when a pulled project name collides with a different local
/// project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionStrategy {
    /// Move the local project's tasks onto the remote project, drop the
    /// local one.
    Merge,
    /// Rename the local project with a `_1`, `_2`, ... suffix.
    Rename,
    /// Abort the whole pull.
    Cancel,
}

/// Decisions the sync manager cannot make on its own during a pull.
pub trait PullUi {
    /// Pick a value for one conflicting key of a both-modified object.
    fn resolve_field(&mut self, path: &str, key: &str, local: &Value, remote: &Value)
        -> FieldChoice;

    /// Pick a side for a modified-deleted conflict. `None` marks the
    /// deleted side.
    fn resolve_object(
        &mut self,
        path: &str,
        local: Option<&Value>,
        remote: Option<&Value>,
    ) -> SideChoice;

    /// Choose how to handle a project name collision.
    fn project_name_collision(&mut self, name: &str) -> CollisionStrategy;

    /// Report a rename performed by the rename collision strategy.
    fn notify_rename(&mut self, old_name: &str, new_name: &str) {
        let _ = (old_name, new_name);
    }
}

/// Cancels every conflict. The non-interactive default for pulls.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelPull;

impl PullUi for CancelPull {
    fn resolve_field(
        &mut self,
        _path: &str,
        _key: &str,
        _local: &Value,
        _remote: &Value,
    ) -> FieldChoice {
        FieldChoice::Cancel
    }

    fn resolve_object(
        &mut self,
        _path: &str,
        _local: Option<&Value>,
        _remote: Option<&Value>,
    ) -> SideChoice {
        SideChoice::Cancel
    }

    fn project_name_collision(&mut self, _name: &str) -> CollisionStrategy {
        CollisionStrategy::Cancel
    }
}
