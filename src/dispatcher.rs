// dbackup/src/dispatcher.rs
use tempfile::TempDir;

use crate::backup;
use crate::config::{BackupJob, RestoreJob, StorageSettings};
use crate::errors::Result;
use crate::notify::{LogNotifier, Notifier};
use crate::restore;
use crate::storage;

/// Lifecycle of one dispatched job. A terminal state is always reached:
/// `Done` on success, `Failed` on any error, including errors while the
/// backend is still being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Selecting,
    Running,
    Done,
    Failed,
}

/// Owns the scratch directory and the notifier for the lifetime of one
/// job, and drives the selected pipeline through its states. The scratch
/// directory is a fresh temp dir removed on drop, so artifacts from a
/// failed run never leak onto disk.
pub struct Dispatcher {
    state: JobState,
    workdir: TempDir,
    notifier: Box<dyn Notifier>,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        Ok(Dispatcher {
            state: JobState::Idle,
            workdir: TempDir::new()?,
            notifier: Box::new(LogNotifier),
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn workdir(&self) -> &std::path::Path {
        self.workdir.path()
    }

    pub async fn run_backup(
        &mut self,
        job: &BackupJob,
        settings: &StorageSettings,
    ) -> Result<()> {
        self.state = JobState::Selecting;
        let backend =
            match storage::resolve_backend(&job.storage_identifier, settings, &job.remote_path)
                .await
            {
                Ok(backend) => backend,
                Err(e) => {
                    self.state = JobState::Failed;
                    self.notifier
                        .notify_failure(&job.database.name, &e.to_string());
                    return Err(e);
                }
            };

        self.state = JobState::Running;
        match backup::perform_backup(job, backend.as_ref(), self.notifier.as_ref(), self.workdir())
            .await
        {
            Ok(_record) => {
                self.state = JobState::Done;
                Ok(())
            }
            Err(e) => {
                self.state = JobState::Failed;
                self.notifier
                    .notify_failure(&job.database.name, &e.to_string());
                Err(e)
            }
        }
    }

    pub async fn run_restore(
        &mut self,
        job: &RestoreJob,
        settings: &StorageSettings,
    ) -> Result<()> {
        self.state = JobState::Selecting;
        let backend =
            match storage::resolve_backend(&job.storage_identifier, settings, &job.remote_path)
                .await
            {
                Ok(backend) => backend,
                Err(e) => {
                    self.state = JobState::Failed;
                    self.notifier
                        .notify_failure(&job.database.name, &e.to_string());
                    return Err(e);
                }
            };

        self.state = JobState::Running;
        match restore::perform_restore(job, backend.as_ref(), self.workdir()).await {
            Ok(()) => {
                self.state = JobState::Done;
                Ok(())
            }
            Err(e) => {
                self.state = JobState::Failed;
                self.notifier
                    .notify_failure(&job.database.name, &e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::errors::AppError;
    use tempfile::tempdir;

    fn test_database() -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            name: "appdb".to_string(),
            password: String::new(),
        }
    }

    #[test]
    fn test_new_dispatcher_is_idle() -> Result<()> {
        let dispatcher = Dispatcher::new()?;
        assert_eq!(dispatcher.state(), JobState::Idle);
        assert!(dispatcher.workdir().is_dir());
        Ok(())
    }

    #[test]
    fn test_workdir_is_removed_on_drop() -> Result<()> {
        let dispatcher = Dispatcher::new()?;
        let path = dispatcher.workdir().to_path_buf();
        assert!(path.is_dir());
        drop(dispatcher);
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_of_missing_artifact_ends_failed() -> Result<()> {
        let store = tempdir()?;
        let settings = StorageSettings {
            local_dir: Some(store.path().to_path_buf()),
            ..Default::default()
        };
        let job = RestoreJob {
            database: test_database(),
            storage_identifier: "local".to_string(),
            remote_path: "backups".to_string(),
            artifact_name: "no_such_artifact.sql.gz".to_string(),
        };

        let mut dispatcher = Dispatcher::new()?;
        let err = dispatcher.run_restore(&job, &settings).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(dispatcher.state(), JobState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_with_unconfigured_s3_fails_in_selecting() -> Result<()> {
        let job = BackupJob {
            database: test_database(),
            storage_identifier: "s3".to_string(),
            remote_path: "backups".to_string(),
            artifact_prefix: "backup".to_string(),
            compress: true,
            encrypt: false,
            retention_days: None,
            recipient_public_key: None,
        };

        let mut dispatcher = Dispatcher::new()?;
        let err = dispatcher
            .run_backup(&job, &StorageSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(dispatcher.state(), JobState::Failed);
        Ok(())
    }

    // An unknown identifier resolves to the local fallback, so the job
    // reaches Running and fails later (here at the database preflight,
    // pointed at a port nothing listens on).
    #[tokio::test]
    async fn test_unknown_identifier_reaches_running_before_failing() -> Result<()> {
        let store = tempdir()?;
        let settings = StorageSettings {
            local_dir: Some(store.path().to_path_buf()),
            ..Default::default()
        };
        let mut database = test_database();
        database.port = 1;
        let job = BackupJob {
            database,
            storage_identifier: "gopher-cloud".to_string(),
            remote_path: "backups".to_string(),
            artifact_prefix: "backup".to_string(),
            compress: true,
            encrypt: false,
            retention_days: None,
            recipient_public_key: None,
        };

        let mut dispatcher = Dispatcher::new()?;
        let result = dispatcher.run_backup(&job, &settings).await;
        assert!(result.is_err());
        assert_eq!(dispatcher.state(), JobState::Failed);
        // Nothing was uploaded into the fallback target.
        assert_eq!(std::fs::read_dir(store.path())?.count(), 0);
        Ok(())
    }
}
