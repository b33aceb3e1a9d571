// dbackup/src/notify/mod.rs
use crate::storage::BackendKind;

/// Everything a delivery channel needs to describe one finished job.
/// Emitted once per job and not kept afterwards.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub artifact_name: String,
    pub size_bytes: u64,
    pub database: String,
    pub storage: BackendKind,
    pub remote_location: String,
    pub start_time: String,
    pub end_time: String,
}

/// Delivery channel for job outcomes. Formatting and transport beyond the
/// record itself are the channel's concern.
pub trait Notifier {
    fn notify_success(&self, record: &NotificationRecord);
    fn notify_failure(&self, database: &str, message: &str);
}

/// Default channel: prints the record to stdout/stderr.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_success(&self, record: &NotificationRecord) {
        println!("📬 Backup job finished");
        println!("   Artifact:  {}", record.artifact_name);
        println!("   Size:      {} bytes", record.size_bytes);
        println!("   Database:  {}", record.database);
        println!("   Storage:   {}", record.storage);
        println!("   Location:  {}", record.remote_location);
        println!("   Started:   {}", record.start_time);
        println!("   Finished:  {}", record.end_time);
    }

    fn notify_failure(&self, database: &str, message: &str) {
        eprintln!("📬 Job for database {} failed: {}", database, message);
    }
}

/// Timestamp format used in notification records.
pub fn time_format() -> &'static str {
    "%Y-%m-%d at %H:%M:%S"
}
