//! JSON-file-backed persistent memory store.
//!
//! Split into focused submodules:
//! - `users`: record lookup/creation and preferences
//! - `conversations`: capped conversation history
//! - `products`: tracked product CRUD
//! - `reminders`: reminder CRUD, status transitions, pending scan
//!
//! Every mutation holds the store mutex and the sibling file lock while it
//! rewrites the whole document, so the file on disk is always a complete,
//! consistent snapshot.

mod conversations;
mod products;
mod reminders;
mod users;


use chrono::{Local, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskflow_core::config::Config;
use taskflow_core::error::TaskflowError;
use taskflow_core::timezone::DEFAULT_ZONE;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::backup::BackupManager;
use crate::lock::{lock_path_for, FileLock};
use crate::migrate::{self, MigrationContext};
use crate::persist;
use crate::types::StoreRoot;

/// Tunables for [`Store::open`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub max_conversation_history: usize,
    pub backup_retention_days: u32,
    pub default_zone: Tz,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_conversation_history: 50,
            backup_retention_days: 7,
            default_zone: DEFAULT_ZONE,
        }
    }
}

impl StoreOptions {
    /// Options taken from a validated [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, TaskflowError> {
        Ok(Self {
            max_conversation_history: config.memory.max_conversation_history,
            backup_retention_days: config.memory.backup_retention_days,
            default_zone: config.timezone.zone()?,
        })
    }
}

/// Summary for `status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub path: PathBuf,
    pub users: usize,
    pub pending_reminders: usize,
    pub backups: usize,
}

/// Persistent memory store backed by a single JSON document.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    lock_path: PathBuf,
    backups: BackupManager,
    options: StoreOptions,
    root: Mutex<StoreRoot>,
}

impl Store {
    /// Open (or create) the store at `path`, migrating and recovering as needed.
    pub async fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, TaskflowError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TaskflowError::StorageIo(format!("failed to create data dir: {e}"))
            })?;
        }

        let store = Self {
            inner: Arc::new(Inner {
                lock_path: lock_path_for(&path),
                backups: BackupManager::for_store(&path, options.backup_retention_days),
                root: Mutex::new(StoreRoot::empty(Utc::now())),
                path,
                options,
            }),
        };

        store.load().await?;
        info!("Memory store initialized at {}", store.inner.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn backups(&self) -> &BackupManager {
        &self.inner.backups
    }

    pub fn default_zone(&self) -> Tz {
        self.inner.options.default_zone
    }

    /// Re-read the document from disk, replacing the in-memory copy.
    ///
    /// Unreadable content is quarantined and replaced with the latest backup,
    /// or an empty store if no backup parses either. Writes back if the
    /// document had to be migrated, repaired, or created.
    pub async fn load(&self) -> Result<(), TaskflowError> {
        let mut root = self.inner.root.lock().await;

        let swept = persist::sweep_temp_files(&self.inner.path);
        if swept > 0 {
            warn!("removed {swept} stray temp file(s) next to {}", self.inner.path.display());
        }

        let (loaded, dirty) = self.read_root().await?;
        *root = loaded;
        if dirty {
            self.persist(&root).await?;
        } else {
            self.snapshot().await;
        }
        Ok(())
    }

    /// Write the current in-memory document to disk.
    pub async fn save(&self) -> Result<(), TaskflowError> {
        let root = self.inner.root.lock().await;
        self.persist(&root).await
    }

    pub async fn stats(&self) -> StoreStats {
        let root = self.inner.root.lock().await;
        let pending_reminders = root
            .users
            .values()
            .flat_map(|u| u.reminders.iter())
            .filter(|r| r.is_pending())
            .count();
        StoreStats {
            path: self.inner.path.clone(),
            users: root.users.len(),
            pending_reminders,
            backups: self.inner.backups.list().len(),
        }
    }

    /// Run `f` against the document under the lock, persisting if it reports a change.
    ///
    /// `f` returns its result and whether it modified the document. If the
    /// write fails, the in-memory document is restored to its prior state.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreRoot) -> Result<(T, bool), TaskflowError>,
    ) -> Result<T, TaskflowError> {
        let mut root = self.inner.root.lock().await;
        let before = root.clone();
        let (out, changed) = f(&mut *root)?;
        if changed {
            if let Err(e) = self.persist(&root).await {
                *root = before;
                return Err(e);
            }
        }
        Ok(out)
    }

    /// Read-only access under the lock.
    async fn read<T>(&self, f: impl FnOnce(&StoreRoot) -> T) -> T {
        let root = self.inner.root.lock().await;
        f(&*root)
    }

    async fn persist(&self, root: &StoreRoot) -> Result<(), TaskflowError> {
        let bytes = serde_json::to_vec_pretty(root)?;

        let lock_path = self.inner.lock_path.clone();
        let guard = tokio::task::spawn_blocking(move || FileLock::acquire(&lock_path))
            .await
            .map_err(|e| TaskflowError::StorageIo(format!("lock task failed: {e}")))??;
        let written = persist::write_atomic(&self.inner.path, &bytes).await;
        drop(guard);
        written?;

        self.snapshot().await;
        Ok(())
    }

    async fn snapshot(&self) {
        let backups = self.inner.backups.clone();
        let live = self.inner.path.clone();
        let today = Local::now().date_naive();
        if let Err(e) =
            tokio::task::spawn_blocking(move || backups.snapshot_if_due(&live, today)).await
        {
            warn!("backup task failed: {e}");
        }
    }

    /// Returns the document and whether it must be written back.
    async fn read_root(&self) -> Result<(StoreRoot, bool), TaskflowError> {
        let path = &self.inner.path;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no store at {}, starting empty", path.display());
                return Ok((StoreRoot::empty(Utc::now()), true));
            }
            Err(e) => {
                return Err(TaskflowError::StorageIo(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        match self.decode(&bytes) {
            Ok(decoded) => Ok(decoded),
            Err(e) => {
                error!("store at {} is unreadable: {e}", path.display());
                self.quarantine().await;
                Ok((self.recover_from_backup().await, true))
            }
        }
    }

    /// Parse, migrate, and type-check a raw document.
    fn decode(&self, bytes: &[u8]) -> Result<(StoreRoot, bool), TaskflowError> {
        let mut doc: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| TaskflowError::StorageCorruption(format!("invalid JSON: {e}")))?;

        let ctx = MigrationContext {
            default_zone: self.inner.options.default_zone,
            now: Utc::now(),
        };
        let migrated = migrate::migrate(&mut doc, &ctx)?;

        let mut root: StoreRoot = serde_json::from_value(doc)
            .map_err(|e| TaskflowError::StorageCorruption(format!("unexpected shape: {e}")))?;

        let cap = self.inner.options.max_conversation_history;
        let mut trimmed = false;
        for user in root.users.values_mut() {
            trimmed |= user.enforce_history_cap(cap);
        }

        Ok((root, migrated.changed() || trimmed))
    }

    async fn quarantine(&self) {
        let target = persist::corrupt_path_for(&self.inner.path);
        match tokio::fs::rename(&self.inner.path, &target).await {
            Ok(()) => warn!("moved unreadable store to {}", target.display()),
            Err(e) => error!("failed to quarantine {}: {e}", self.inner.path.display()),
        }
    }

    async fn recover_from_backup(&self) -> StoreRoot {
        let Some(backup) = self.inner.backups.latest() else {
            warn!("no backup available, starting with an empty store");
            return StoreRoot::empty(Utc::now());
        };

        let decoded = match tokio::fs::read(&backup).await {
            Ok(bytes) => self.decode(&bytes),
            Err(e) => Err(TaskflowError::StorageIo(e.to_string())),
        };
        match decoded {
            Ok((root, _)) => {
                info!("restored store from backup {}", backup.display());
                root
            }
            Err(e) => {
                error!("backup {} is unusable ({e}), starting with an empty store", backup.display());
                StoreRoot::empty(Utc::now())
            }
        }
    }
}
