// dbackup/src/backup/db_dump.rs
use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::codec::SQL_EXTENSION;
use crate::config::{DatabaseConfig, DB_PASSWORD_ENV};
use crate::errors::{AppError, Result};
use crate::utils::{drain_stderr, find_pg_dump_executable};

/// Dumps the database as plain SQL into
/// `<workdir>/<prefix>_<timestamp>.sql` using pg_dump, streaming the
/// child's stdout straight to the file. A non-zero exit removes the
/// partial file and fails the job.
pub fn dump_database(
    db: &DatabaseConfig,
    workdir: &Path,
    artifact_prefix: &str,
) -> Result<PathBuf> {
    let pg_dump = find_pg_dump_executable()?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let output_path = workdir.join(format!("{}_{}.{}", artifact_prefix, timestamp, SQL_EXTENSION));

    println!(
        "🔍 Dumping database {} with pg_dump to {}...",
        db.name,
        output_path.display()
    );

    let mut command = Command::new(&pg_dump);
    command
        .arg("--format=plain")
        .arg("-h")
        .arg(&db.host)
        .arg("-p")
        .arg(db.port.to_string())
        .arg("-U")
        .arg(&db.username)
        .arg("-d")
        .arg(&db.name)
        .env(DB_PASSWORD_ENV, &db.password);

    if let Err(e) = stream_stdout_to_file(command, &output_path, "pg_dump") {
        let _ = fs::remove_file(&output_path);
        return Err(e);
    }

    println!("✓ Database {} dumped successfully", db.name);
    Ok(output_path)
}

/// Copies the tool's stdout to `output_path` while a drain thread keeps
/// its stderr pipe empty; a tool that interleaves verbose stderr with its
/// output cannot block either pipe.
fn stream_stdout_to_file(mut command: Command, output_path: &Path, tool: &str) -> Result<()> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let Some(mut stdout) = child.stdout.take() else {
        return Err(AppError::ExternalTool {
            tool: tool.to_string(),
            status: "spawn".to_string(),
            stderr: "stdout pipe unavailable".to_string(),
        });
    };
    let stderr_drain = drain_stderr(&mut child);

    let mut output_file = File::create(output_path)?;
    let copy_result = io::copy(&mut stdout, &mut output_file);
    drop(stdout);

    let status = child.wait()?;
    let stderr = stderr_drain
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default();
    copy_result?;
    if !status.success() {
        return Err(AppError::ExternalTool {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        });
    }
    Ok(())
}
