use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CatalogEntry;

/// Top-level backup fields other than `entries` (preferences, source
/// preferences, extensions), carried through untouched.
pub type BackupExtras = Map<String, Value>;

/// An ordered batch of entries, typically one backup snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub entries: Vec<CatalogEntry>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: BackupExtras,
}

impl RecordSet {
    pub fn new(label: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            label: label.into(),
            entries,
            extras: BackupExtras::new(),
        }
    }

    pub fn with_extras(mut self, extras: BackupExtras) -> Self {
        self.extras = extras;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
