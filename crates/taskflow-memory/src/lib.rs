//! # taskflow-memory
//!
//! Durable multi-user memory for TaskFlow (single JSON document, atomic writes).

pub mod backup;
pub mod lock;
pub mod migrate;
mod persist;
pub mod store;
pub mod types;

pub use backup::BackupManager;
pub use store::{Store, StoreOptions, StoreStats};
pub use types::{
    ConversationEntry, NewProduct, PendingReminder, ProductPatch, Reminder, ReminderPatch,
    ReminderStatus, StoreRoot, TrackedProduct, UserRecord,
};
