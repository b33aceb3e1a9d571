// dbackup/src/config/mod.rs
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, Result};

/// Environment variable holding the database password, passed to the
/// `pg_dump`/`psql` child processes and the preflight connection check.
pub const DB_PASSWORD_ENV: &str = "PGPASSWORD";
/// Environment variable holding the symmetric encryption passphrase.
pub const PASSPHRASE_ENV: &str = "BACKUP_PASSPHRASE";
/// Environment variable holding the path to an identity file for the
/// asymmetric (best-effort) decryption path.
pub const PRIVATE_KEY_ENV: &str = "BACKUP_PRIVATE_KEY";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonLocalStorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSshStorageConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonFtpStorageConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonAzureStorageConfig {
    pub account: Option<String>,
    pub access_key: Option<String>,
    pub container: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonBackupOptions {
    pub artifact_prefix: Option<String>,
    pub compress: Option<bool>,
    pub encrypt: Option<bool>,
    pub retention_days: Option<u32>,
    pub recipient_public_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRestoreOptions {
    pub artifact_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub database: Option<JsonDatabaseConfig>,
    pub storage: Option<String>,
    pub remote_path: Option<String>,
    pub local_storage: Option<JsonLocalStorageConfig>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub ssh_storage: Option<JsonSshStorageConfig>,
    pub ftp_storage: Option<JsonFtpStorageConfig>,
    pub azure_storage: Option<JsonAzureStorageConfig>,
    pub backup: Option<JsonBackupOptions>,
    pub restore: Option<JsonRestoreOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub name: String,
    pub password: String,
}

impl DatabaseConfig {
    /// Builds a PostgreSQL connection URL for the preflight connection check.
    pub fn connection_url(&self) -> Result<String> {
        let mut url = url::Url::parse("postgres://localhost")?;
        url.set_host(Some(&self.host))?;
        url.set_port(Some(self.port))
            .map_err(|_| AppError::Config("invalid database port".to_string()))?;
        url.set_username(&self.username)
            .map_err(|_| AppError::Config("invalid database username".to_string()))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| AppError::Config("invalid database password".to_string()))?;
        }
        url.set_path(&self.name);
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: String,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub account: String,
    pub access_key: String,
    pub container: String,
}

/// Connection settings for every backend that appears in config.json.
/// Only the section matching the selected backend kind has to be present.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    pub local_dir: Option<PathBuf>,
    pub s3: Option<S3Config>,
    pub ssh: Option<SshConfig>,
    pub ftp: Option<FtpConfig>,
    pub azure: Option<AzureConfig>,
}

/// Immutable description of one backup invocation. Built once from the
/// parsed configuration and passed through the pipeline by reference.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub database: DatabaseConfig,
    pub storage_identifier: String,
    pub remote_path: String,
    pub artifact_prefix: String,
    pub compress: bool,
    pub encrypt: bool,
    pub retention_days: Option<u32>,
    pub recipient_public_key: Option<String>,
}

/// Immutable description of one restore invocation.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub database: DatabaseConfig,
    pub storage_identifier: String,
    pub remote_path: String,
    pub artifact_name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub raw_json_config: RawJsonConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)?;

        let storage = StorageSettings {
            local_dir: raw_json_config
                .local_storage
                .as_ref()
                .and_then(|l| l.path.clone())
                .filter(|p| !p.as_os_str().is_empty()),
            s3: load_s3_settings(&raw_json_config),
            ssh: load_ssh_settings(&raw_json_config),
            ftp: load_ftp_settings(&raw_json_config),
            azure: load_azure_settings(&raw_json_config),
        };

        Ok(AppConfig {
            storage,
            raw_json_config,
        })
    }
}

fn load_s3_settings(raw: &RawJsonConfig) -> Option<S3Config> {
    let s3_raw = raw.s3_storage.as_ref()?;
    if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
        s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
        s3_raw.region.as_ref().filter(|s| !s.is_empty()),
        s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
        s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
        s3_raw.endpoint_url.as_ref().filter(|s| !s.is_empty()),
    ) {
        Some(S3Config {
            bucket_name: bucket.clone(),
            region: region.clone(),
            access_key_id: key_id.clone(),
            secret_access_key: secret.clone(),
            endpoint_url: endpoint.clone(),
            folder_prefix: s3_raw.folder_prefix.clone().filter(|s| !s.is_empty()),
        })
    } else {
        println!(
            "⚠️ s3_storage is present in config.json but some required fields \
             (bucket_name, region, access_key_id, secret_access_key, endpoint_url) \
             are missing or empty. The s3 backend will be unavailable."
        );
        None
    }
}

fn load_ssh_settings(raw: &RawJsonConfig) -> Option<SshConfig> {
    let ssh_raw = raw.ssh_storage.as_ref()?;
    match (
        ssh_raw.host.as_ref().filter(|s| !s.is_empty()),
        ssh_raw.user.as_ref().filter(|s| !s.is_empty()),
    ) {
        (Some(host), Some(user)) => Some(SshConfig {
            host: host.clone(),
            port: ssh_raw.port.unwrap_or(22),
            user: user.clone(),
            password: ssh_raw.password.clone().unwrap_or_default(),
        }),
        _ => {
            println!(
                "⚠️ ssh_storage is present in config.json but host or user is missing. \
                 The ssh backend will be unavailable."
            );
            None
        }
    }
}

fn load_ftp_settings(raw: &RawJsonConfig) -> Option<FtpConfig> {
    let ftp_raw = raw.ftp_storage.as_ref()?;
    match (
        ftp_raw.host.as_ref().filter(|s| !s.is_empty()),
        ftp_raw.user.as_ref().filter(|s| !s.is_empty()),
    ) {
        (Some(host), Some(user)) => Some(FtpConfig {
            host: host.clone(),
            port: ftp_raw.port.unwrap_or(21),
            user: user.clone(),
            password: ftp_raw.password.clone().unwrap_or_default(),
        }),
        _ => {
            println!(
                "⚠️ ftp_storage is present in config.json but host or user is missing. \
                 The ftp backend will be unavailable."
            );
            None
        }
    }
}

fn load_azure_settings(raw: &RawJsonConfig) -> Option<AzureConfig> {
    let azure_raw = raw.azure_storage.as_ref()?;
    if let (Some(account), Some(access_key), Some(container)) = (
        azure_raw.account.as_ref().filter(|s| !s.is_empty()),
        azure_raw.access_key.as_ref().filter(|s| !s.is_empty()),
        azure_raw.container.as_ref().filter(|s| !s.is_empty()),
    ) {
        Some(AzureConfig {
            account: account.clone(),
            access_key: access_key.clone(),
            container: container.clone(),
        })
    } else {
        println!(
            "⚠️ azure_storage is present in config.json but account, access_key or \
             container is missing. The azure backend will be unavailable."
        );
        None
    }
}

fn load_database_config(raw: &RawJsonConfig) -> Result<DatabaseConfig> {
    let db = raw
        .database
        .as_ref()
        .ok_or_else(|| AppError::Config("database section must be set in config.json".to_string()))?;
    let host = db
        .host
        .as_ref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Config("database.host must be set in config.json".to_string()))?
        .clone();
    let username = db
        .username
        .as_ref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Config("database.username must be set in config.json".to_string()))?
        .clone();
    let name = db
        .name
        .as_ref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Config("database.name must be set in config.json".to_string()))?
        .clone();

    Ok(DatabaseConfig {
        host,
        port: db.port.unwrap_or(5432),
        username,
        name,
        password: env::var(DB_PASSWORD_ENV).unwrap_or_default(),
    })
}

fn storage_identifier(raw: &RawJsonConfig) -> String {
    raw.storage
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "local".to_string())
}

fn remote_path(raw: &RawJsonConfig) -> String {
    raw.remote_path
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "backups".to_string())
}

pub fn load_backup_job(raw_config: &RawJsonConfig) -> Result<BackupJob> {
    let database = load_database_config(raw_config)?;
    let options = raw_config.backup.clone().unwrap_or(JsonBackupOptions {
        artifact_prefix: None,
        compress: None,
        encrypt: None,
        retention_days: None,
        recipient_public_key: None,
    });

    if let Some(days) = options.retention_days {
        if days == 0 {
            return Err(AppError::Config(
                "backup.retention_days must be greater than zero when set".to_string(),
            ));
        }
    }

    Ok(BackupJob {
        database,
        storage_identifier: storage_identifier(raw_config),
        remote_path: remote_path(raw_config),
        artifact_prefix: options
            .artifact_prefix
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "backup".to_string()),
        compress: options.compress.unwrap_or(true),
        encrypt: options.encrypt.unwrap_or(false),
        retention_days: options.retention_days,
        recipient_public_key: options.recipient_public_key.filter(|s| !s.trim().is_empty()),
    })
}

pub fn load_restore_job(raw_config: &RawJsonConfig) -> Result<RestoreJob> {
    let database = load_database_config(raw_config)?;
    let artifact_name = raw_config
        .restore
        .as_ref()
        .and_then(|r| r.artifact_name.as_ref())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            AppError::Config("restore.artifact_name must be set in config.json".to_string())
        })?
        .trim()
        .to_string();

    Ok(RestoreJob {
        database,
        storage_identifier: storage_identifier(raw_config),
        remote_path: remote_path(raw_config),
        artifact_name,
    })
}
