//! Daily snapshots of the store file and date-based retention.
//!
//! Backups live in a `backups/` directory next to the live file and are named
//! `{stem}_{YYYY-MM-DD}.{ext}`, so there is at most one per calendar day.
//! Every failure here is logged and swallowed: by the time a snapshot is
//! attempted the primary write has already succeeded.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    stem: String,
    ext: String,
    retention_days: u32,
}

impl BackupManager {
    /// Backups for `live` in `<live dir>/backups/`.
    pub fn for_store(live: &Path, retention_days: u32) -> Self {
        let dir = live
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));
        let stem = live
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "user_memory".to_string());
        let ext = live
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "json".to_string());
        Self {
            dir,
            stem,
            ext,
            retention_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backup for `date`.
    pub fn backup_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            self.stem,
            date.format(DATE_FORMAT),
            self.ext
        ))
    }

    /// Copy `live` into today's backup when `live` was modified after that backup.
    /// Blocking; async callers run it on the blocking pool.
    ///
    /// Returns the backup path when a copy was made. Prunes afterwards.
    pub fn snapshot_if_due(&self, live: &Path, today: NaiveDate) -> Option<PathBuf> {
        let live_modified = match modified(live) {
            Some(m) => m,
            None => return None,
        };

        let target = self.backup_path(today);
        if let Some(existing) = modified(&target) {
            if existing >= live_modified {
                return None;
            }
        }

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("backup: failed to create {}: {e}", self.dir.display());
            return None;
        }

        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        let copied = std::fs::copy(live, &staging).and_then(|_| std::fs::rename(&staging, &target));
        if let Err(e) = copied {
            warn!("backup: failed to snapshot {}: {e}", live.display());
            let _ = std::fs::remove_file(&staging);
            return None;
        }

        info!("backup: wrote {}", target.display());
        self.prune(today);
        Some(target)
    }

    /// Delete backups whose filename date is more than `retention_days` before `today`.
    ///
    /// Returns the number of files removed.
    pub fn prune(&self, today: NaiveDate) -> usize {
        let mut removed = 0;
        for path in self.list() {
            let Some(date) = self.date_of(&path) else {
                debug!("backup: skipping {} (no date in name)", path.display());
                continue;
            };
            let age_days = today.signed_duration_since(date).num_days();
            if age_days > i64::from(self.retention_days) {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        info!("backup: pruned {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("backup: failed to prune {}: {e}", path.display()),
                }
            }
        }
        removed
    }

    /// Most recently modified backup, if any.
    pub fn latest(&self) -> Option<PathBuf> {
        self.list()
            .into_iter()
            .filter_map(|p| modified(&p).map(|m| (m, p)))
            .max_by_key(|(m, _)| *m)
            .map(|(_, p)| p)
    }

    /// Every file in the backup directory that carries this store's prefix.
    pub fn list(&self) -> Vec<PathBuf> {
        let prefix = format!("{}_", self.stem);
        let suffix = format!(".{}", self.ext);
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut found: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with(&prefix) && name.ends_with(&suffix)
            })
            .map(|e| e.path())
            .collect();
        found.sort();
        found
    }

    fn date_of(&self, path: &Path) -> Option<NaiveDate> {
        let name = path.file_name()?.to_string_lossy().to_string();
        let raw = name
            .strip_prefix(&format!("{}_", self.stem))?
            .strip_suffix(&format!(".{}", self.ext))?;
        NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn touch(path: &Path, at: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(at)
            .unwrap();
    }

    #[test]
    fn test_backup_name_uses_store_stem() {
        let mgr = BackupManager::for_store(Path::new("/d/user_memory.json"), 7);
        assert_eq!(
            mgr.backup_path(date("2026-03-02")),
            PathBuf::from("/d/backups/user_memory_2026-03-02.json")
        );
    }

    #[test]
    fn test_one_snapshot_per_day_unless_live_is_newer() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("user_memory.json");
        std::fs::write(&live, "{\"v\":1}").unwrap();
        touch(&live, SystemTime::now() - Duration::from_secs(60));
        let mgr = BackupManager::for_store(&live, 7);
        let today = date("2026-03-02");

        let first = mgr.snapshot_if_due(&live, today).unwrap();
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "{\"v\":1}");
        assert!(mgr.snapshot_if_due(&live, today).is_none());

        std::fs::write(&live, "{\"v\":2}").unwrap();
        touch(&live, SystemTime::now() + Duration::from_secs(10));
        let second = mgr.snapshot_if_due(&live, today).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "{\"v\":2}");
        assert_eq!(mgr.list().len(), 1);
    }

    #[test]
    fn test_equal_mtime_is_not_newer() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("user_memory.json");
        std::fs::write(&live, "{\"v\":1}").unwrap();
        let mgr = BackupManager::for_store(&live, 7);
        let today = date("2026-03-02");
        let backup = mgr.snapshot_if_due(&live, today).unwrap();

        std::fs::write(&live, "{\"v\":2}").unwrap();
        let at = SystemTime::now() - Duration::from_secs(30);
        touch(&live, at);
        touch(&backup, at);

        assert!(mgr.snapshot_if_due(&live, today).is_none());
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "{\"v\":1}");
    }

    #[test]
    fn test_missing_live_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("user_memory.json");
        let mgr = BackupManager::for_store(&live, 7);
        assert!(mgr.snapshot_if_due(&live, date("2026-03-02")).is_none());
        assert!(mgr.latest().is_none());
    }

    #[test]
    fn test_prune_by_filename_date() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("user_memory.json");
        let mgr = BackupManager::for_store(&live, 7);
        std::fs::create_dir_all(mgr.dir()).unwrap();

        for d in ["2026-02-20", "2026-02-22", "2026-02-23", "2026-03-01"] {
            std::fs::write(mgr.backup_path(date(d)), "{}").unwrap();
        }
        let odd = mgr.dir().join("user_memory_latest.json");
        std::fs::write(&odd, "{}").unwrap();

        let removed = mgr.prune(date("2026-03-02"));
        assert_eq!(removed, 2);
        assert!(!mgr.backup_path(date("2026-02-20")).exists());
        assert!(!mgr.backup_path(date("2026-02-22")).exists());
        assert!(mgr.backup_path(date("2026-02-23")).exists());
        assert!(mgr.backup_path(date("2026-03-01")).exists());
        assert!(odd.exists(), "unparseable names are left alone");
    }

    #[test]
    fn test_latest_is_by_mtime_not_name() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("user_memory.json");
        let mgr = BackupManager::for_store(&live, 7);
        std::fs::create_dir_all(mgr.dir()).unwrap();

        let older_name = mgr.backup_path(date("2026-02-01"));
        let newer_name = mgr.backup_path(date("2026-02-10"));
        std::fs::write(&older_name, "{}").unwrap();
        std::fs::write(&newer_name, "{}").unwrap();
        let base = SystemTime::now();
        touch(&newer_name, base - Duration::from_secs(3600));
        touch(&older_name, base);

        assert_eq!(mgr.latest(), Some(older_name));
    }
}
