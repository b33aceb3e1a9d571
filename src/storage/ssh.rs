// dbackup/src/storage/ssh.rs
use async_trait::async_trait;
use ssh2::Session;
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use crate::config::SshConfig;
use crate::errors::{AppError, Result};
use crate::storage::{retention_cutoff_epoch, BackendKind, StorageBackend};

/// Stores artifacts on a remote host over SFTP. A fresh session is opened
/// for every operation and dropped with it.
pub struct SshBackend {
    config: SshConfig,
    remote_dir: String,
}

impl SshBackend {
    pub fn new(config: SshConfig, remote_path: &str) -> Self {
        SshBackend {
            config,
            remote_dir: remote_path.to_string(),
        }
    }

    fn session(&self) -> Result<Session> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let tcp = TcpStream::connect(&address)
            .map_err(|e| AppError::Storage(format!("ssh connect to {} failed: {}", address, e)))?;
        let mut session = Session::new()
            .map_err(|e| AppError::Storage(format!("ssh session setup failed: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| AppError::Storage(format!("ssh handshake with {} failed: {}", address, e)))?;
        session
            .userauth_password(&self.config.user, &self.config.password)
            .map_err(|e| {
                AppError::Storage(format!(
                    "ssh authentication for {}@{} failed: {}",
                    self.config.user, address, e
                ))
            })?;
        Ok(session)
    }

    fn remote_file(&self, artifact_name: &str) -> PathBuf {
        Path::new(&self.remote_dir).join(artifact_name)
    }
}

#[async_trait]
impl StorageBackend for SshBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ssh
    }

    fn remote_location(&self, artifact_name: &str) -> String {
        format!(
            "{}@{}:{}",
            self.config.user,
            self.config.host,
            self.remote_file(artifact_name).display()
        )
    }

    async fn put(&self, local_path: &Path) -> Result<()> {
        let artifact_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", local_path.display())))?;
        let session = self.session()?;
        let sftp = session
            .sftp()
            .map_err(|e| AppError::Storage(format!("sftp subsystem failed: {}", e)))?;

        // The remote directory may already exist.
        let _ = sftp.mkdir(Path::new(&self.remote_dir), 0o755);

        let mut local_file = File::open(local_path)?;
        let mut remote_file = sftp.create(&self.remote_file(artifact_name)).map_err(|e| {
            AppError::Storage(format!(
                "failed to create remote file {}: {}",
                self.remote_file(artifact_name).display(),
                e
            ))
        })?;
        io::copy(&mut local_file, &mut remote_file)?;
        Ok(())
    }

    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let session = self.session()?;
        let sftp = session
            .sftp()
            .map_err(|e| AppError::Storage(format!("sftp subsystem failed: {}", e)))?;

        let remote_path = self.remote_file(artifact_name);
        let mut remote_file = sftp.open(&remote_path).map_err(|e| {
            AppError::Storage(format!(
                "failed to open remote artifact {}: {}",
                remote_path.display(),
                e
            ))
        })?;

        let destination = local_dir.join(artifact_name);
        let mut local_file = File::create(&destination)?;
        io::copy(&mut remote_file, &mut local_file)?;
        Ok(destination)
    }

    async fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = retention_cutoff_epoch(retention_days);
        let session = self.session()?;
        let sftp = session
            .sftp()
            .map_err(|e| AppError::Storage(format!("sftp subsystem failed: {}", e)))?;

        let entries = sftp.readdir(Path::new(&self.remote_dir)).map_err(|e| {
            AppError::Storage(format!(
                "failed to list remote directory {}: {}",
                self.remote_dir, e
            ))
        })?;

        let mut deleted = 0;
        for (path, stat) in entries {
            if !stat.is_file() {
                continue;
            }
            let Some(mtime) = stat.mtime else { continue };
            if (mtime as i64) < cutoff {
                sftp.unlink(&path).map_err(|e| {
                    AppError::Storage(format!(
                        "failed to delete remote artifact {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
