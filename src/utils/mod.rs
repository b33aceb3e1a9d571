// dbackup/src/utils/mod.rs
use sqlx::postgres::PgPoolOptions;
use std::io::Read;
use std::path::PathBuf;
use std::process::Child;
use std::thread::JoinHandle;
use std::time::Duration;
use which::which;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};

/// Finds the pg_dump executable in the system PATH.
pub fn find_pg_dump_executable() -> Result<PathBuf> {
    which("pg_dump").map_err(|_| {
        AppError::Config(
            "pg_dump executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.".to_string(),
        )
    })
}

/// Finds the psql executable in the system PATH.
pub fn find_psql_executable() -> Result<PathBuf> {
    which("psql").map_err(|_| {
        AppError::Config(
            "psql executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.".to_string(),
        )
    })
}

/// Drains the child's stderr on a separate thread. While the parent is
/// busy on stdin or stdout, a chatty tool can fill the stderr pipe buffer
/// and block; nothing may leave that pipe unread until the child exits.
pub(crate) fn drain_stderr(child: &mut Child) -> Option<JoinHandle<Vec<u8>>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stderr.read_to_end(&mut buffer);
        buffer
    }))
}

/// Preflight connection check, run before dumping or applying anything so a
/// bad database configuration fails the job with a clear message.
pub async fn check_db_connection(db: &DatabaseConfig) -> Result<()> {
    let url = db.connection_url()?;
    let _pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await?;
    println!("✅ Successfully connected to database {}", db.name);
    Ok(())
}
