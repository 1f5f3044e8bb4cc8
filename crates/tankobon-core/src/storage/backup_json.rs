use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::{BackupExtras, CatalogEntry, RecordSet};

/// On-disk shape of a JSON backup: `{ "entries": [...], ... }`. Any other
/// top-level field lands in `extras` and is written back as it was read.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BackupDocument {
    #[serde(default)]
    entries: Vec<CatalogEntry>,
    #[serde(flatten)]
    extras: BackupExtras,
}

/// Load a record set from a JSON backup. The label is the file name.
pub fn load_record_set(path: &Path) -> Result<RecordSet> {
    if !path.exists() {
        return Err(CoreError::BackupNotFound(path.display().to_string()));
    }

    let contents = fs::read_to_string(path)?;
    let document: BackupDocument =
        serde_json::from_str(&contents).map_err(|e| CoreError::InvalidBackup {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(RecordSet::new(label, document.entries).with_extras(document.extras))
}

/// Load several backups, preserving the order they were given in.
pub fn load_record_sets<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RecordSet>> {
    paths.iter().map(|p| load_record_set(p.as_ref())).collect()
}

/// Write entries as a JSON backup with no extra top-level fields.
pub fn save_entries(path: &Path, entries: &[CatalogEntry], pretty: bool) -> Result<()> {
    save_backup(path, entries, &BackupExtras::new(), pretty)
}

/// Write entries and extra top-level fields as a JSON backup, creating
/// parent directories as needed.
pub fn save_backup(
    path: &Path,
    entries: &[CatalogEntry],
    extras: &BackupExtras,
    pretty: bool,
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let document = BackupDocument {
        entries: entries.to_vec(),
        extras: extras.clone(),
    };
    let json = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    fs::write(path, json)?;
    Ok(())
}
