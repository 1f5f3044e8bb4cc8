//! Catalog entry models, the JSON backup store and app config.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, CleanupConfig, MatchingConfig, MergeConfig, OutputConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;

pub use storage::backup_json::{load_record_set, load_record_sets, save_backup, save_entries};
