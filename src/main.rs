//! Database Backup/Restore Orchestrator
//!
//! Provides a CLI interface for dumping a database into a portable
//! artifact, shipping it to a configured storage backend, and restoring
//! such an artifact back into a database.

// dbackup/src/main.rs
mod backup;
mod codec;
mod config;
mod dispatcher;
mod errors;
mod notify;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use config::{load_backup_job, load_restore_job, AppConfig};
use dispatcher::Dispatcher;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();

    // Expects config.json in the same directory as the executable or the
    // project root when running with `cargo run`.
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "backup" => {
            println!("🚀 Starting Backup Process...");
            let job = load_backup_job(&app_config.raw_json_config)
                .context("Failed to load backup configuration from JSON")?;
            let mut dispatcher = Dispatcher::new()?;
            dispatcher
                .run_backup(&job, &app_config.storage)
                .await
                .context("Backup process failed")?;
        }
        "2" | "restore" => {
            println!("🔄 Starting Restore Process...");
            let job = load_restore_job(&app_config.raw_json_config)
                .context("Failed to load restore configuration from JSON")?;
            println!(
                "Restore target: {}, Artifact: {}",
                job.database.name, job.artifact_name
            );
            let mut dispatcher = Dispatcher::new()?;
            dispatcher
                .run_restore(&job, &app_config.storage)
                .await
                .context("Restore process failed")?;
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup) or '2' (restore).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Prompts the user to select a backup or restore operation.
fn prompt_choice() -> Result<String> {
    use std::io::{stdin, stdout, Write};

    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
