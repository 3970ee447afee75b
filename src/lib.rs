//! yokadi - Task Manager Core Library
//!
//! This library provides the core functionality of the yokadi personal
//! task manager: a durable task store, humane date parsing, recurring
//! tasks, query building and git-based multi-device synchronization.
//!
//! # Core Concepts
//!
//! - **Tasks and Projects**: Every task belongs to exactly one project
//! - **Keywords**: Optional-valued labels; `_`-prefixed names are reserved
//! - **Humane Dates**: `tomorrow 18:00`, `tu 11:45`, `+2w` and friends
//! - **Recurrence**: Tasks that re-arm their due date when marked done
//! - **Dump and Sync**: A JSON-per-entity mirror, versioned with git and
//!   merged entity-by-entity across devices
//!
//! # Module Organization
//!
//! - `config`: Recognized configuration keys and validation
//! - `dates`: Humane date/time and delta parsing
//! - `db`: Entity records, the task store, events and task locks
//! - `dump`: Dump tree replication and full snapshots
//! - `error`: Error types and result aliases
//! - `massedit`: Project tasks as an editable text block
//! - `query`: Filters, ordering and section grouping
//! - `recurrence`: Recurrence rules and next-occurrence search
//! - `storage`: Paths, file locking and atomic writes
//! - `sync`: Pull/push orchestration over the dump tree
//! - `ui`: Injected interaction ports for prompts and conflicts
//! - `vcs`: Git operations wrapper using libgit2

pub mod config;
pub mod dates;
pub mod db;
pub mod dump;
pub mod error;
pub mod massedit;
pub mod query;
pub mod recurrence;
pub mod storage;
pub mod sync;
pub mod ui;
pub mod vcs;

pub use error::{Error, Result};
