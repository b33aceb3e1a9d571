// dbackup/src/restore/logic.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{self, DecryptionSecret, ReverseStep};
use crate::config::{RestoreJob, PASSPHRASE_ENV, PRIVATE_KEY_ENV};
use crate::errors::{AppError, Result};
use crate::storage::StorageBackend;
use crate::utils::check_db_connection;

use super::db_restore;

/// Runs the full restore pipeline: fetch → decode → apply, against one
/// already-resolved backend. The artifact is decoded strictly by its
/// extension chain, reversing the transforms in the opposite order of
/// how a backup applied them.
pub async fn perform_restore(
    job: &RestoreJob,
    backend: &dyn StorageBackend,
    workdir: &Path,
) -> Result<()> {
    println!(
        "🚀 Starting restore of database {} from {} storage",
        job.database.name,
        backend.kind()
    );

    println!(
        "⬇️ Fetching {} from {} storage...",
        job.artifact_name,
        backend.kind()
    );
    let fetched = backend.get(&job.artifact_name, workdir).await?;
    println!("✓ Fetched artifact to {}", fetched.display());

    let secret = DecryptionSecret::from_env();
    let decoded = decode_artifact(&fetched, secret.as_ref())?;

    check_db_connection(&job.database).await?;
    db_restore::apply_artifact(&job.database, &decoded)?;

    if decoded.exists() {
        if let Err(e) = fs::remove_file(&decoded) {
            eprintln!(
                "⚠️ Failed to remove local temp artifact {}: {}",
                decoded.display(),
                e
            );
        } else {
            println!("🧽 Removed local temp artifact {}", decoded.display());
        }
    }

    println!("🎉 Restore completed successfully");
    Ok(())
}

/// Peels transforms off the fetched artifact until it is ready to apply.
/// Encryption is reversed on disk; a trailing `.gz` is left in place
/// because the apply step streams gzip straight into psql. The remaining
/// name must end in a recognized terminal extension or the restore is
/// refused before the database is touched.
pub(crate) fn decode_artifact(
    fetched: &Path,
    secret: Option<&DecryptionSecret>,
) -> Result<PathBuf> {
    let mut artifact = fetched.to_path_buf();
    loop {
        match codec::next_reverse_step(&artifact) {
            ReverseStep::Decrypt => {
                let Some(secret) = secret else {
                    return Err(AppError::Config(format!(
                        "artifact {} is encrypted but neither {} nor {} is set",
                        artifact.display(),
                        PASSPHRASE_ENV,
                        PRIVATE_KEY_ENV
                    )));
                };
                artifact = codec::decrypt_file(&artifact, secret)?;
            }
            ReverseStep::Decompress | ReverseStep::Terminal => break,
        }
    }

    let ready = match codec::next_reverse_step(&artifact) {
        // The gzip layer is consumed during apply; what is under it still
        // has to be a recognized terminal.
        ReverseStep::Decompress => {
            codec::is_recognized_terminal(&codec::strip_last_extension(&artifact))
        }
        ReverseStep::Terminal => codec::is_recognized_terminal(&artifact),
        ReverseStep::Decrypt => false,
    };
    if !ready {
        return Err(AppError::Format(format!(
            "artifact {} does not decode to a recognized SQL artifact",
            artifact.display()
        )));
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncryptionKey;
    use crate::storage::local::LocalBackend;
    use tempfile::tempdir;

    const PAYLOAD: &[u8] = b"CREATE TABLE t (id int);\n";

    #[test]
    fn test_decode_plain_sql_is_a_passthrough() -> Result<()> {
        let dir = tempdir()?;
        let artifact = dir.path().join("dump.sql");
        fs::write(&artifact, PAYLOAD)?;

        let decoded = decode_artifact(&artifact, None)?;
        assert_eq!(decoded, artifact);
        assert_eq!(fs::read(&decoded)?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_decode_leaves_gzip_layer_for_streaming() -> Result<()> {
        let dir = tempdir()?;
        let sql = dir.path().join("dump.sql");
        fs::write(&sql, PAYLOAD)?;
        let gz = codec::compress_file(&sql)?;

        let decoded = decode_artifact(&gz, None)?;
        assert_eq!(decoded.file_name().unwrap(), "dump.sql.gz");
        Ok(())
    }

    #[test]
    fn test_decode_encrypted_chain_with_passphrase() -> Result<()> {
        let dir = tempdir()?;
        let sql = dir.path().join("dump.sql");
        fs::write(&sql, PAYLOAD)?;
        let gz = codec::compress_file(&sql)?;
        let encrypted = codec::encrypt_file(&gz, &EncryptionKey::Passphrase("p".to_string()))?;
        assert_eq!(encrypted.file_name().unwrap(), "dump.sql.gz.gpg");

        let secret = DecryptionSecret::Passphrase("p".to_string());
        let decoded = decode_artifact(&encrypted, Some(&secret))?;
        assert_eq!(decoded.file_name().unwrap(), "dump.sql.gz");
        assert!(!encrypted.exists(), "encrypted layer must be consumed");
        Ok(())
    }

    #[test]
    fn test_decode_unknown_extension_is_format_error() -> Result<()> {
        let dir = tempdir()?;
        let artifact = dir.path().join("dump.tar");
        fs::write(&artifact, PAYLOAD)?;

        let err = decode_artifact(&artifact, None).unwrap_err();
        assert!(matches!(err, AppError::Format(_)));
        Ok(())
    }

    #[test]
    fn test_decode_hidden_non_sql_under_gzip_is_format_error() -> Result<()> {
        let dir = tempdir()?;
        let inner = dir.path().join("dump.tar");
        fs::write(&inner, PAYLOAD)?;
        let gz = codec::compress_file(&inner)?;

        let err = decode_artifact(&gz, None).unwrap_err();
        assert!(matches!(err, AppError::Format(_)));
        Ok(())
    }

    // Scenario: encrypted artifact fetched from local storage, but no
    // secret is available. The restore fails with a configuration error
    // and the fetched artifact is left untouched.
    #[tokio::test]
    async fn test_encrypted_artifact_without_secret_is_config_error() -> Result<()> {
        let store = tempdir()?;
        let work = tempdir()?;

        let sql = work.path().join("dump.sql");
        fs::write(&sql, PAYLOAD)?;
        let encrypted = codec::encrypt_file(&sql, &EncryptionKey::Passphrase("p".to_string()))?;
        let backend = LocalBackend::new(store.path().to_path_buf());
        backend.put(&encrypted).await?;

        let fetched = backend.get("dump.sql.gpg", work.path()).await?;
        let err = decode_artifact(&fetched, None).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(fetched.exists(), "fetched artifact must not be consumed");
        Ok(())
    }
}
