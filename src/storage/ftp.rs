// dbackup/src/storage/ftp.rs
use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use suppaftp::{FtpError, FtpStream};

use crate::config::FtpConfig;
use crate::errors::{AppError, Result};
use crate::storage::{BackendKind, StorageBackend};

/// Stores artifacts on an FTP server. A fresh connection is opened for
/// every operation and closed with `QUIT` when it succeeds.
pub struct FtpBackend {
    config: FtpConfig,
    remote_dir: String,
}

impl FtpBackend {
    pub fn new(config: FtpConfig, remote_path: &str) -> Self {
        FtpBackend {
            config,
            remote_dir: remote_path.to_string(),
        }
    }

    fn connect(&self) -> Result<FtpStream> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let mut ftp = FtpStream::connect(&address)
            .map_err(|e| AppError::Storage(format!("ftp connect to {} failed: {}", address, e)))?;
        ftp.login(&self.config.user, &self.config.password)
            .map_err(|e| {
                AppError::Storage(format!(
                    "ftp login for {}@{} failed: {}",
                    self.config.user, address, e
                ))
            })?;
        Ok(ftp)
    }

    fn enter_remote_dir(&self, ftp: &mut FtpStream) -> Result<()> {
        // The remote directory may already exist.
        let _ = ftp.mkdir(&self.remote_dir);
        ftp.cwd(&self.remote_dir).map_err(|e| {
            AppError::Storage(format!(
                "ftp could not enter remote directory {}: {}",
                self.remote_dir, e
            ))
        })
    }
}

#[async_trait]
impl StorageBackend for FtpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ftp
    }

    fn remote_location(&self, artifact_name: &str) -> String {
        format!(
            "ftp://{}/{}/{}",
            self.config.host, self.remote_dir, artifact_name
        )
    }

    async fn put(&self, local_path: &Path) -> Result<()> {
        let artifact_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", local_path.display())))?;
        let mut ftp = self.connect()?;
        self.enter_remote_dir(&mut ftp)?;

        let mut local_file = File::open(local_path)?;
        ftp.put_file(artifact_name, &mut local_file).map_err(|e| {
            AppError::Storage(format!("ftp upload of {} failed: {}", artifact_name, e))
        })?;
        let _ = ftp.quit();
        Ok(())
    }

    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let mut ftp = self.connect()?;
        self.enter_remote_dir(&mut ftp)?;

        let destination = local_dir.join(artifact_name);
        let mut local_file = File::create(&destination)?;
        // RETR streams the remote file through the data connection; copy
        // it to disk chunk by chunk instead of buffering it whole.
        ftp.retr(artifact_name, |reader| {
            io::copy(reader, &mut local_file).map_err(FtpError::ConnectionError)
        })
        .map_err(|e| {
            AppError::Storage(format!("ftp download of {} failed: {}", artifact_name, e))
        })?;
        let _ = ftp.quit();
        Ok(destination)
    }

    async fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(i64::from(retention_days));
        let mut ftp = self.connect()?;
        self.enter_remote_dir(&mut ftp)?;

        let names = ftp
            .nlst(None)
            .map_err(|e| AppError::Storage(format!("ftp listing failed: {}", e)))?;

        let mut deleted = 0;
        for name in names {
            // Servers without MDTM support simply keep their artifacts.
            let Ok(modified) = ftp.mdtm(&name) else {
                continue;
            };
            if modified < cutoff {
                ftp.rm(&name).map_err(|e| {
                    AppError::Storage(format!("ftp delete of {} failed: {}", name, e))
                })?;
                deleted += 1;
            }
        }
        let _ = ftp.quit();
        Ok(deleted)
    }
}
