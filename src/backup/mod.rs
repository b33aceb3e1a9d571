// dbackup/src/backup/mod.rs
pub(crate) mod db_dump;
pub(crate) mod logic;

pub use logic::perform_backup;
