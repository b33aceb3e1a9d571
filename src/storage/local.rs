// dbackup/src/storage/local.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, Result};
use crate::storage::{retention_cutoff_epoch, BackendKind, StorageBackend};

/// Stores artifacts in a directory on the local filesystem.
pub struct LocalBackend {
    target_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(target_dir: PathBuf) -> Self {
        LocalBackend { target_dir }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn remote_location(&self, artifact_name: &str) -> String {
        self.target_dir.join(artifact_name).display().to_string()
    }

    async fn put(&self, local_path: &Path) -> Result<()> {
        let artifact_name = local_path
            .file_name()
            .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", local_path.display())))?;
        fs::create_dir_all(&self.target_dir)?;
        fs::copy(local_path, self.target_dir.join(artifact_name))?;
        Ok(())
    }

    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let source = self.target_dir.join(artifact_name);
        if !source.is_file() {
            return Err(AppError::Storage(format!(
                "artifact not found in local storage: {}",
                source.display()
            )));
        }
        let destination = local_dir.join(artifact_name);
        fs::copy(&source, &destination)?;
        Ok(destination)
    }

    async fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = retention_cutoff_epoch(retention_days);
        let mut deleted = 0;

        for entry in fs::read_dir(&self.target_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = metadata.modified()?.into();
            if modified.timestamp() < cutoff {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_then_get_round_trip() -> Result<()> {
        let store = tempdir()?;
        let work = tempdir()?;
        let backend = LocalBackend::new(store.path().to_path_buf());

        let artifact = work.path().join("dump.sql.gz");
        fs::write(&artifact, b"payload")?;

        backend.put(&artifact).await?;
        assert!(store.path().join("dump.sql.gz").is_file());

        let fetched = backend.get("dump.sql.gz", work.path()).await?;
        assert_eq!(fs::read(fetched)?, b"payload");
        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing_artifact_is_storage_error() -> Result<()> {
        let store = tempdir()?;
        let work = tempdir()?;
        let backend = LocalBackend::new(store.path().to_path_buf());

        let err = backend.get("nope.sql", work.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_keeps_fresh_artifacts() -> Result<()> {
        let store = tempdir()?;
        let backend = LocalBackend::new(store.path().to_path_buf());
        fs::write(store.path().join("fresh.sql.gz"), b"payload")?;

        let deleted = backend.prune(7).await?;
        assert_eq!(deleted, 0);
        assert!(store.path().join("fresh.sql.gz").is_file());
        Ok(())
    }
}
