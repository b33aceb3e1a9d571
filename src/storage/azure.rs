// dbackup/src/storage/azure.rs
use async_trait::async_trait;
use azure_storage::StorageCredentials;
use azure_storage_blobs::blob::{BlobBlockType, BlockList};
use azure_storage_blobs::prelude::*;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upload block size. Blobs are committed from blocks of this size so a
/// large artifact never has to fit in memory at once.
const UPLOAD_BLOCK_SIZE: usize = 4 * 1024 * 1024;

use crate::config::AzureConfig;
use crate::errors::{AppError, Result};
use crate::storage::{BackendKind, StorageBackend};

/// Stores artifacts as block blobs in an Azure Blob Storage container.
pub struct AzureBackend {
    container: ContainerClient,
    account: String,
    container_name: String,
    remote_dir: String,
}

impl AzureBackend {
    pub fn new(config: &AzureConfig, remote_path: &str) -> Self {
        let credentials =
            StorageCredentials::access_key(config.account.clone(), config.access_key.clone());
        let container = ClientBuilder::new(config.account.clone(), credentials)
            .container_client(config.container.clone());
        AzureBackend {
            container,
            account: config.account.clone(),
            container_name: config.container.clone(),
            remote_dir: remote_path.trim_matches('/').to_string(),
        }
    }

    fn blob_name(&self, artifact_name: &str) -> String {
        if self.remote_dir.is_empty() {
            artifact_name.to_string()
        } else {
            format!("{}/{}", self.remote_dir, artifact_name)
        }
    }
}

#[async_trait]
impl StorageBackend for AzureBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Azure
    }

    fn remote_location(&self, artifact_name: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account,
            self.container_name,
            self.blob_name(artifact_name)
        )
    }

    async fn put(&self, local_path: &Path) -> Result<()> {
        let artifact_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", local_path.display())))?;
        let blob = self.container.blob_client(self.blob_name(artifact_name));

        let mut local_file = tokio::fs::File::open(local_path).await?;
        let mut block_list = BlockList::default();
        let mut index: u32 = 0;
        loop {
            let mut chunk = vec![0u8; UPLOAD_BLOCK_SIZE];
            let mut filled = 0;
            while filled < chunk.len() {
                let n = local_file.read(&mut chunk[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            chunk.truncate(filled);

            let block_id = format!("{:08x}", index);
            blob.put_block(block_id.clone(), chunk).await.map_err(|e| {
                AppError::Storage(format!(
                    "azure upload of {} (block {}) failed: {}",
                    artifact_name, index, e
                ))
            })?;
            block_list
                .blocks
                .push(BlobBlockType::new_uncommitted(block_id));
            index += 1;
        }

        if block_list.blocks.is_empty() {
            // Empty artifact still produces a blob.
            blob.put_block_blob(Vec::new()).await.map_err(|e| {
                AppError::Storage(format!("azure upload of {} failed: {}", artifact_name, e))
            })?;
        } else {
            blob.put_block_list(block_list).await.map_err(|e| {
                AppError::Storage(format!("azure commit of {} failed: {}", artifact_name, e))
            })?;
        }
        Ok(())
    }

    async fn get(&self, artifact_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let destination = local_dir.join(artifact_name);
        let mut local_file = tokio::fs::File::create(&destination).await?;

        let mut pages = self
            .container
            .blob_client(self.blob_name(artifact_name))
            .get()
            .into_stream();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                AppError::Storage(format!("azure download of {} failed: {}", artifact_name, e))
            })?;
            let data = page.data.collect().await.map_err(|e| {
                AppError::Storage(format!("azure download of {} failed: {}", artifact_name, e))
            })?;
            local_file.write_all(&data).await?;
        }
        local_file.flush().await?;
        Ok(destination)
    }

    async fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(i64::from(retention_days));
        let mut deleted = 0;

        let prefix = if self.remote_dir.is_empty() {
            String::new()
        } else {
            format!("{}/", self.remote_dir)
        };
        let mut pages = self.container.list_blobs().prefix(prefix).into_stream();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| AppError::Storage(format!("azure listing failed: {}", e)))?;
            for blob in page.blobs.blobs() {
                if blob.properties.last_modified < cutoff {
                    self.container
                        .blob_client(blob.name.clone())
                        .delete()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!(
                                "azure delete of {} failed: {}",
                                blob.name, e
                            ))
                        })?;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}
