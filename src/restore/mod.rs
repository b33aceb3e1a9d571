// dbackup/src/restore/mod.rs
pub(crate) mod db_restore;
pub(crate) mod logic;

pub use logic::perform_restore;
