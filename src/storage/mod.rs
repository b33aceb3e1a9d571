// dbackup/src/storage/mod.rs
pub mod azure;
pub mod ftp;
pub mod local;
pub mod s3;
pub mod ssh;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::StorageSettings;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    S3,
    Ssh,
    Ftp,
    Azure,
}

impl BackendKind {
    /// Pure, total mapping from a configured identifier to a backend kind.
    /// Unrecognized identifiers fall back to `Local`; the boolean reports
    /// whether the identifier was recognized so callers can log the
    /// fallback.
    pub fn parse(identifier: &str) -> (BackendKind, bool) {
        match identifier.trim().to_ascii_lowercase().as_str() {
            "local" => (BackendKind::Local, true),
            "s3" => (BackendKind::S3, true),
            "ssh" | "sftp" | "remote" => (BackendKind::Ssh, true),
            "ftp" => (BackendKind::Ftp, true),
            "azure" => (BackendKind::Azure, true),
            _ => (BackendKind::Local, false),
        }
    }
}

impl fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageBackend({})", self.kind())
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Local => "local",
            BackendKind::S3 => "s3",
            BackendKind::Ssh => "ssh",
            BackendKind::Ftp => "ftp",
            BackendKind::Azure => "azure",
        };
        f.write_str(name)
    }
}

/// Capability interface every storage location implements. Each backend
/// owns its own connection for the duration of one operation; nothing is
/// pooled or shared between calls.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable remote location of an artifact, for logs and
    /// notifications.
    fn remote_location(&self, artifact_name: &str) -> String;

    /// Uploads a local artifact into the backend's remote directory.
    async fn put(&self, local_path: &Path) -> Result<()>;

    /// Downloads a named artifact into `local_dir`, returning its local path.
    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf>;

    /// Deletes remote artifacts older than `retention_days`, returning the
    /// number removed.
    async fn prune(&self, retention_days: u32) -> Result<usize>;
}

/// Maps the configured identifier to a concrete backend. A recognized kind
/// whose connection settings are missing from config.json is a
/// configuration error; an unrecognized identifier never is.
pub async fn resolve_backend(
    identifier: &str,
    settings: &StorageSettings,
    remote_path: &str,
) -> Result<Box<dyn StorageBackend>> {
    let (kind, recognized) = BackendKind::parse(identifier);
    if !recognized {
        println!(
            "⚠️ Unknown storage identifier '{}', falling back to local storage",
            identifier
        );
    }

    match kind {
        BackendKind::Local => {
            let target_dir = settings
                .local_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./backups"));
            Ok(Box::new(local::LocalBackend::new(target_dir)))
        }
        BackendKind::S3 => {
            let config = settings.s3.as_ref().ok_or_else(|| {
                AppError::Config(
                    "storage is 's3' but s3_storage is not fully configured in config.json"
                        .to_string(),
                )
            })?;
            Ok(Box::new(s3::S3Backend::connect(config, remote_path).await))
        }
        BackendKind::Ssh => {
            let config = settings.ssh.as_ref().ok_or_else(|| {
                AppError::Config(
                    "storage is 'ssh' but ssh_storage is not fully configured in config.json"
                        .to_string(),
                )
            })?;
            Ok(Box::new(ssh::SshBackend::new(config.clone(), remote_path)))
        }
        BackendKind::Ftp => {
            let config = settings.ftp.as_ref().ok_or_else(|| {
                AppError::Config(
                    "storage is 'ftp' but ftp_storage is not fully configured in config.json"
                        .to_string(),
                )
            })?;
            Ok(Box::new(ftp::FtpBackend::new(config.clone(), remote_path)))
        }
        BackendKind::Azure => {
            let config = settings.azure.as_ref().ok_or_else(|| {
                AppError::Config(
                    "storage is 'azure' but azure_storage is not fully configured in config.json"
                        .to_string(),
                )
            })?;
            Ok(Box::new(azure::AzureBackend::new(config, remote_path)))
        }
    }
}

/// Epoch-seconds cutoff for retention pruning: anything modified earlier
/// is eligible for deletion.
pub(crate) fn retention_cutoff_epoch(retention_days: u32) -> i64 {
    (chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days))).timestamp()
}
