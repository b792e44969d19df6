//! Crash-safe whole-file replacement.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use taskflow_core::error::TaskflowError;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Write `bytes` to `path` through a uniquely named sibling temp file.
///
/// The temp file is flushed and fsynced before it is renamed over `path`, so a
/// reader only ever sees the previous snapshot or the new one. On failure the
/// temp file is removed and the live file is untouched.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TaskflowError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            TaskflowError::StorageIo(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp = temp_path_for(path);
    if let Err(e) = write_and_sync(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TaskflowError::StorageIo(format!(
            "failed to write {}: {e}",
            tmp.display()
        )));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TaskflowError::StorageIo(format!(
            "failed to replace {}: {e}",
            path.display()
        )));
    }

    debug!("persisted {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

async fn write_and_sync(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// `<file>.<uuid>.tmp` in the same directory as `path`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = file_name(path);
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// `<file>.corrupt` in the same directory as `path`.
pub(crate) fn corrupt_path_for(path: &Path) -> PathBuf {
    let mut name = file_name(path);
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Remove temp files left behind by an interrupted write. Returns how many were removed.
pub(crate) fn sweep_temp_files(path: &Path) -> usize {
    let Some(dir) = path.parent() else {
        return 0;
    };
    let prefix = format!("{}.", file_name(path).to_string_lossy());
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && name.ends_with(".tmp") {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove stray temp file {name}: {e}"),
            }
        }
    }
    removed
}

fn file_name(path: &Path) -> OsString {
    path.file_name().map(|n| n.to_os_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data/user_memory.json");

        write_atomic(&path, b"{\"a\":1}").await.unwrap();
        write_atomic(&path, b"{\"a\":2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_live_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("user_memory.json");
        write_atomic(&path, b"old").await.unwrap();

        // A directory where the file should be makes the rename fail.
        let blocked = tmp.path().join("blocked");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();
        assert!(write_atomic(&blocked, b"new").await.is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        assert_eq!(sweep_temp_files(&blocked), 0);
    }

    #[test]
    fn test_sweep_only_touches_own_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("user_memory.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::write(temp_path_for(&path), "{\"partial").unwrap();
        std::fs::write(temp_path_for(&path), "").unwrap();
        std::fs::write(tmp.path().join("other.json.abc.tmp"), "").unwrap();

        assert_eq!(sweep_temp_files(&path), 2);
        assert!(path.exists());
        assert!(tmp.path().join("other.json.abc.tmp").exists());
    }

    #[test]
    fn test_sibling_names() {
        let path = Path::new("/d/user_memory.json");
        assert_eq!(corrupt_path_for(path), PathBuf::from("/d/user_memory.json.corrupt"));
        let t = temp_path_for(path).to_string_lossy().to_string();
        assert!(t.starts_with("/d/user_memory.json."));
        assert!(t.ends_with(".tmp"));
    }
}
