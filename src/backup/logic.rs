// dbackup/src/backup/logic.rs
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{self, EncryptionKey};
use crate::config::BackupJob;
use crate::errors::{AppError, Result};
use crate::notify::{time_format, NotificationRecord, Notifier};
use crate::storage::StorageBackend;
use crate::utils::check_db_connection;

use super::db_dump;

/// Runs the full backup pipeline: dump → compress → encrypt → upload →
/// prune → notify, against one already-resolved backend. Every step's
/// failure is fatal except pruning.
pub async fn perform_backup(
    job: &BackupJob,
    backend: &dyn StorageBackend,
    notifier: &dyn Notifier,
    workdir: &Path,
) -> Result<NotificationRecord> {
    let start_time = Local::now().format(time_format()).to_string();
    println!(
        "🚀 Starting backup of database {} to {} storage",
        job.database.name,
        backend.kind()
    );

    check_db_connection(&job.database).await?;

    let dumped = db_dump::dump_database(&job.database, workdir, &job.artifact_prefix)?;
    let artifact = encode_artifact(dumped, job)?;

    upload_and_finalize(job, backend, notifier, &artifact, &start_time).await
}

/// Applies the optional forward transforms in order: compression first,
/// encryption last, so restore reverses them as decrypt-then-decompress.
pub(crate) fn encode_artifact(dumped: PathBuf, job: &BackupJob) -> Result<PathBuf> {
    let mut artifact = dumped;
    if job.compress {
        println!("🗜 Compressing artifact...");
        artifact = codec::compress_file(&artifact)?;
    }
    if job.encrypt {
        let key = EncryptionKey::for_backup(job.recipient_public_key.as_deref())?;
        println!("🔐 Encrypting artifact...");
        artifact = codec::encrypt_file(&artifact, &key)?;
    }
    Ok(artifact)
}

/// Uploads the finished artifact, records its size, prunes old remote
/// artifacts (non-fatal) and emits the success notification. The local
/// temp artifact is deleted no matter how the upload went.
pub(crate) async fn upload_and_finalize(
    job: &BackupJob,
    backend: &dyn StorageBackend,
    notifier: &dyn Notifier,
    artifact: &Path,
    start_time: &str,
) -> Result<NotificationRecord> {
    let result = put_prune_notify(job, backend, notifier, artifact, start_time).await;

    // Cleanup always runs so repeated invocations cannot accumulate temp
    // artifacts on disk.
    if artifact.exists() {
        if let Err(e) = fs::remove_file(artifact) {
            eprintln!(
                "⚠️ Failed to remove local temp artifact {}: {}",
                artifact.display(),
                e
            );
        } else {
            println!("🧽 Removed local temp artifact {}", artifact.display());
        }
    }

    result
}

async fn put_prune_notify(
    job: &BackupJob,
    backend: &dyn StorageBackend,
    notifier: &dyn Notifier,
    artifact: &Path,
    start_time: &str,
) -> Result<NotificationRecord> {
    let artifact_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Storage(format!("invalid artifact path: {}", artifact.display())))?
        .to_string();

    println!(
        "⬆️ Uploading {} to {} storage...",
        artifact_name,
        backend.kind()
    );
    backend.put(artifact).await?;
    println!(
        "✅ Backup saved in {}",
        backend.remote_location(&artifact_name)
    );

    // Size is read from the local copy after the upload and before the
    // cleanup so the notification reports what actually went out.
    let size_bytes = fs::metadata(artifact)?.len();

    if let Some(retention_days) = job.retention_days {
        println!(
            "🧹 Pruning artifacts older than {} days from {} storage...",
            retention_days,
            backend.kind()
        );
        match backend.prune(retention_days).await {
            Ok(deleted) => println!("🧹 Pruned {} old artifact(s)", deleted),
            Err(e) => eprintln!(
                "⚠️ Failed to prune old artifacts from {} storage: {} (the backup itself succeeded)",
                backend.kind(),
                e
            ),
        }
    }

    let record = NotificationRecord {
        artifact_name: artifact_name.clone(),
        size_bytes,
        database: job.database.name.clone(),
        storage: backend.kind(),
        remote_location: backend.remote_location(&artifact_name),
        start_time: start_time.to_string(),
        end_time: Local::now().format(time_format()).to_string(),
    };
    notifier.notify_success(&record);
    println!("🎉 Backup completed successfully");
    Ok(record)
}
