//! The entity layer: records, the store, its events and task locks.

pub mod events;
pub mod model;
pub mod store;
pub mod tasklock;

pub use events::{StoreEvent, StoreObserver};
pub use model::{
    AliasRecord, ConfigEntry, KeywordRecord, ProjectRecord, TaskLockRecord, TaskRecord,
    TaskStatus,
};
pub use store::{split_keyword_dict, EntityDomain, TaskStore};
pub use tasklock::TaskLockManager;
