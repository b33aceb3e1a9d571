// dbackup/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::S3Config;
use crate::errors::{AppError, Result};
use crate::storage::{retention_cutoff_epoch, BackendKind, StorageBackend};

/// Stores artifacts in an S3-compatible object store (AWS S3,
/// DigitalOcean Spaces, MinIO, ...).
pub struct S3Backend {
    client: s3::Client,
    bucket: String,
    key_prefix: String,
}

impl S3Backend {
    pub async fn connect(config: &S3Config, remote_path: &str) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        let key_prefix = match &config.folder_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_matches('/'), remote_path.trim_matches('/')),
            None => remote_path.trim_matches('/').to_string(),
        };

        S3Backend {
            client: s3::Client::new(&sdk_config),
            bucket: config.bucket_name.clone(),
            key_prefix,
        }
    }

    fn key_for(&self, artifact_name: &str) -> String {
        if self.key_prefix.is_empty() {
            artifact_name.to_string()
        } else {
            format!("{}/{}", self.key_prefix, artifact_name)
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    fn remote_location(&self, artifact_name: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key_for(artifact_name))
    }

    async fn put(&self, local_path: &Path) -> Result<()> {
        let artifact_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", local_path.display())))?;
        let key = self.key_for(artifact_name);

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::Storage(format!(
                "failed to read artifact {}: {}",
                local_path.display(),
                e
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "failed to upload s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;
        Ok(())
    }

    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let key = self.key_for(artifact_name);
        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "failed to get object s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;

        let destination = local_dir.join(artifact_name);
        let mut output_file = tokio::fs::File::create(&destination).await?;
        while let Some(chunk) = object.body.try_next().await.map_err(|e| {
            AppError::Storage(format!(
                "failed to stream s3://{}/{}: {}",
                self.bucket, key, e
            ))
        })? {
            output_file.write_all(&chunk).await?;
        }
        output_file.flush().await?;
        Ok(destination)
    }

    async fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = retention_cutoff_epoch(retention_days);
        let mut deleted = 0;
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(format!("{}/", self.key_prefix));
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(|e| {
                AppError::Storage(format!(
                    "failed to list s3://{}/{}: {}",
                    self.bucket, self.key_prefix, e
                ))
            })?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let Some(last_modified) = object.last_modified() else {
                    continue;
                };
                if last_modified.secs() < cutoff {
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!(
                                "failed to delete s3://{}/{}: {}",
                                self.bucket, key, e
                            ))
                        })?;
                    deleted += 1;
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(deleted)
    }
}
