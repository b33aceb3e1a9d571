// dbackup/src/codec/mod.rs
//
// Artifact transforms. A backup artifact starts as `<name>.sql` and gains
// one extension per forward transform (`.gz`, then `.gpg`); reversing a
// transform strips the consumed extension so the on-disk name always
// matches the remaining chain.
use age::secrecy::Secret;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::config::{PASSPHRASE_ENV, PRIVATE_KEY_ENV};
use crate::errors::{AppError, Result};

pub const SQL_EXTENSION: &str = "sql";
pub const GZIP_EXTENSION: &str = "gz";
pub const ENCRYPTED_EXTENSION: &str = "gpg";

/// The next transform to reverse for an artifact, decided purely from its
/// outermost extension. Content is never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseStep {
    Decrypt,
    Decompress,
    Terminal,
}

pub fn outermost_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn next_reverse_step(path: &Path) -> ReverseStep {
    match outermost_extension(path).as_deref() {
        Some(ENCRYPTED_EXTENSION) => ReverseStep::Decrypt,
        Some(GZIP_EXTENSION) => ReverseStep::Decompress,
        _ => ReverseStep::Terminal,
    }
}

/// A fully decoded artifact must end in `.sql`; anything else is an
/// unknown format the restore pipeline refuses to feed to the database.
pub fn is_recognized_terminal(path: &Path) -> bool {
    outermost_extension(path).as_deref() == Some(SQL_EXTENSION)
}

pub fn strip_last_extension(path: &Path) -> PathBuf {
    path.with_extension("")
}

pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Gzip-compresses `path` into `<path>.gz` and removes the input file.
pub fn compress_file(path: &Path) -> Result<PathBuf> {
    let out_path = append_extension(path, GZIP_EXTENSION);
    let mut input = File::open(path)?;
    let output = File::create(&out_path)?;
    let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    Ok(out_path)
}

/// Reverses [`compress_file`]: `<name>.gz` becomes `<name>` and the
/// compressed file is removed.
pub fn decompress_file(path: &Path) -> Result<PathBuf> {
    if outermost_extension(path).as_deref() != Some(GZIP_EXTENSION) {
        return Err(AppError::Format(format!(
            "{} is not a gzip artifact",
            path.display()
        )));
    }
    let out_path = strip_last_extension(path);
    let input = File::open(path)?;
    let mut decoder = flate2::read::GzDecoder::new(BufReader::new(input));
    let mut output = File::create(&out_path)?;
    io::copy(&mut decoder, &mut output)?;
    fs::remove_file(path)?;
    Ok(out_path)
}

/// How a backup artifact gets encrypted.
#[derive(Debug, Clone)]
pub enum EncryptionKey {
    /// Symmetric, scrypt-derived from a passphrase.
    Passphrase(String),
    /// Asymmetric, encrypt to an x25519 recipient public key.
    Recipient(String),
}

impl EncryptionKey {
    /// Resolves the key for a backup: a configured recipient public key
    /// selects the asymmetric mode, otherwise the passphrase comes from the
    /// environment. Fails fast with a configuration error before any file
    /// is touched.
    pub fn for_backup(recipient_public_key: Option<&str>) -> Result<Self> {
        if let Some(recipient) = recipient_public_key {
            return Ok(EncryptionKey::Recipient(recipient.to_string()));
        }
        env::var(PASSPHRASE_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(EncryptionKey::Passphrase)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "encryption requested but {} is not set and no recipient_public_key is configured",
                    PASSPHRASE_ENV
                ))
            })
    }
}

/// Exactly one of these is required to reverse an encrypted artifact.
#[derive(Debug, Clone)]
pub enum DecryptionSecret {
    Passphrase(String),
    /// Path to an identity file. This path is best-effort only.
    PrivateKey(PathBuf),
}

impl DecryptionSecret {
    /// Reads the secret from the environment. A private key takes
    /// precedence over a passphrase when both are set.
    pub fn from_env() -> Option<Self> {
        if let Some(key_path) = env::var(PRIVATE_KEY_ENV).ok().filter(|s| !s.is_empty()) {
            return Some(DecryptionSecret::PrivateKey(PathBuf::from(key_path)));
        }
        env::var(PASSPHRASE_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(DecryptionSecret::Passphrase)
    }
}

/// Encrypts `path` into `<path>.gpg` and removes the plaintext input.
pub fn encrypt_file(path: &Path, key: &EncryptionKey) -> Result<PathBuf> {
    let out_path = append_extension(path, ENCRYPTED_EXTENSION);
    let mut input = File::open(path)?;
    let output = File::create(&out_path)?;

    let encryptor = match key {
        EncryptionKey::Passphrase(passphrase) => {
            age::Encryptor::with_user_passphrase(Secret::new(passphrase.clone()))
        }
        EncryptionKey::Recipient(recipient) => {
            let recipient: age::x25519::Recipient = recipient.trim().parse().map_err(|e| {
                AppError::Crypto(format!("invalid recipient public key: {}", e))
            })?;
            age::Encryptor::with_recipients(vec![Box::new(recipient)])
                .ok_or_else(|| AppError::Crypto("no encryption recipient available".to_string()))?
        }
    };

    let mut writer = encryptor
        .wrap_output(output)
        .map_err(|e| AppError::Crypto(format!("failed to start encryption: {}", e)))?;
    io::copy(&mut input, &mut writer)?;
    writer.finish()?;

    fs::remove_file(path)?;
    Ok(out_path)
}

/// Decrypts `<name>.gpg` into `<name>` and removes the encrypted input.
pub fn decrypt_file(path: &Path, secret: &DecryptionSecret) -> Result<PathBuf> {
    if outermost_extension(path).as_deref() != Some(ENCRYPTED_EXTENSION) {
        return Err(AppError::Format(format!(
            "{} is not an encrypted artifact",
            path.display()
        )));
    }
    let out_path = strip_last_extension(path);
    let input = File::open(path)?;
    let decryptor = age::Decryptor::new(BufReader::new(input))
        .map_err(|e| AppError::Crypto(format!("not a valid encrypted artifact: {}", e)))?;

    let mut reader = match (decryptor, secret) {
        (age::Decryptor::Passphrase(d), DecryptionSecret::Passphrase(passphrase)) => {
            println!("🔓 Decrypting artifact using passphrase...");
            d.decrypt(&Secret::new(passphrase.clone()), None)
                .map_err(|e| AppError::Crypto(format!("decryption failed: {}", e)))?
        }
        (age::Decryptor::Recipients(d), DecryptionSecret::PrivateKey(key_path)) => {
            println!("🔓 Decrypting artifact using private key...");
            println!("⚠️ Decryption using a private key is not fully supported; treating as best-effort.");
            let key_material = fs::read_to_string(key_path).map_err(|e| {
                AppError::Crypto(format!(
                    "failed to read private key {}: {}",
                    key_path.display(),
                    e
                ))
            })?;
            let identity: age::x25519::Identity = key_material.trim().parse().map_err(|e| {
                AppError::Crypto(format!("invalid private key material: {}", e))
            })?;
            d.decrypt(std::iter::once(&identity as &dyn age::Identity))
                .map_err(|e| AppError::Crypto(format!("decryption failed: {}", e)))?
        }
        (age::Decryptor::Passphrase(_), DecryptionSecret::PrivateKey(_)) => {
            return Err(AppError::Crypto(
                "artifact is passphrase-encrypted but a private key was supplied".to_string(),
            ));
        }
        (age::Decryptor::Recipients(_), DecryptionSecret::Passphrase(_)) => {
            return Err(AppError::Crypto(
                "artifact is key-encrypted but only a passphrase was supplied".to_string(),
            ));
        }
    };

    let mut output = File::create(&out_path)?;
    io::copy(&mut reader, &mut output)?;
    fs::remove_file(path)?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use age::secrecy::ExposeSecret;
    use tempfile::tempdir;

    const PAYLOAD: &[u8] = b"CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);\n";

    fn write_artifact(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, PAYLOAD).unwrap();
        path
    }

    #[test]
    fn test_gzip_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");

        let gz = compress_file(&sql)?;
        assert_eq!(gz.file_name().unwrap(), "dump.sql.gz");
        assert!(!sql.exists(), "input must be consumed");

        let restored = decompress_file(&gz)?;
        assert_eq!(restored.file_name().unwrap(), "dump.sql");
        assert!(!gz.exists());
        assert_eq!(fs::read(&restored)?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_passphrase_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");

        let encrypted = encrypt_file(&sql, &EncryptionKey::Passphrase("p".to_string()))?;
        assert_eq!(encrypted.file_name().unwrap(), "dump.sql.gpg");
        assert!(!sql.exists());
        assert_ne!(fs::read(&encrypted)?, PAYLOAD);

        let restored = decrypt_file(&encrypted, &DecryptionSecret::Passphrase("p".to_string()))?;
        assert_eq!(restored.file_name().unwrap(), "dump.sql");
        assert!(!encrypted.exists());
        assert_eq!(fs::read(&restored)?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_wrong_passphrase_is_crypto_error() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");
        let encrypted = encrypt_file(&sql, &EncryptionKey::Passphrase("right".to_string()))?;

        let err = decrypt_file(&encrypted, &DecryptionSecret::Passphrase("wrong".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Crypto(_)));
        // Failed decryption must not consume the artifact.
        assert!(encrypted.exists());
        Ok(())
    }

    #[test]
    fn test_private_key_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");

        let identity = age::x25519::Identity::generate();
        let recipient = identity.to_public().to_string();
        let key_path = dir.path().join("backup.key");
        fs::write(&key_path, identity.to_string().expose_secret())?;

        let encrypted = encrypt_file(&sql, &EncryptionKey::Recipient(recipient))?;
        let restored = decrypt_file(&encrypted, &DecryptionSecret::PrivateKey(key_path))?;
        assert_eq!(fs::read(&restored)?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_secret_kind_mismatch_is_crypto_error() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");
        let encrypted = encrypt_file(&sql, &EncryptionKey::Passphrase("p".to_string()))?;

        let key_path = dir.path().join("backup.key");
        fs::write(
            &key_path,
            age::x25519::Identity::generate().to_string().expose_secret(),
        )?;
        let err = decrypt_file(&encrypted, &DecryptionSecret::PrivateKey(key_path)).unwrap_err();
        assert!(matches!(err, AppError::Crypto(_)));
        Ok(())
    }

    #[test]
    fn test_reverse_step_follows_extension_chain() {
        assert_eq!(
            next_reverse_step(Path::new("dump.sql.gz.gpg")),
            ReverseStep::Decrypt
        );
        assert_eq!(
            next_reverse_step(Path::new("dump.sql.gz")),
            ReverseStep::Decompress
        );
        assert_eq!(
            next_reverse_step(Path::new("dump.sql")),
            ReverseStep::Terminal
        );
        assert_eq!(next_reverse_step(Path::new("dump")), ReverseStep::Terminal);
    }

    #[test]
    fn test_full_chain_reversal_leaves_no_codec_extensions() -> Result<()> {
        let dir = tempdir()?;
        let sql = write_artifact(dir.path(), "dump.sql");
        let gz = compress_file(&sql)?;
        let mut artifact = encrypt_file(&gz, &EncryptionKey::Passphrase("p".to_string()))?;
        assert_eq!(artifact.file_name().unwrap(), "dump.sql.gz.gpg");

        let secret = DecryptionSecret::Passphrase("p".to_string());
        let mut steps = 0;
        loop {
            match next_reverse_step(&artifact) {
                ReverseStep::Decrypt => artifact = decrypt_file(&artifact, &secret)?,
                ReverseStep::Decompress => artifact = decompress_file(&artifact)?,
                ReverseStep::Terminal => break,
            }
            steps += 1;
        }

        assert_eq!(steps, 2);
        assert_eq!(artifact.file_name().unwrap(), "dump.sql");
        assert!(is_recognized_terminal(&artifact));
        assert_eq!(fs::read(&artifact)?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_terminal_recognition() {
        assert!(is_recognized_terminal(Path::new("dump.sql")));
        assert!(!is_recognized_terminal(Path::new("dump.sql.gz")));
        assert!(!is_recognized_terminal(Path::new("dump.tar")));
    }

    #[test]
    fn test_encryption_key_prefers_recipient() -> Result<()> {
        let identity = age::x25519::Identity::generate();
        let recipient = identity.to_public().to_string();
        let key = EncryptionKey::for_backup(Some(&recipient))?;
        assert!(matches!(key, EncryptionKey::Recipient(_)));
        Ok(())
    }
}
