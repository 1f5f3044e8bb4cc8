mod chapter;
mod history;
mod status;
mod tracking;

pub use chapter::*;
pub use history::*;
pub use status::*;
pub use tracking::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Source id used for entries that did not come from a known catalog.
pub const LOCAL_SOURCE_ID: i64 = 0;

/// `(source_id, url)`: names an entry's origin, unique per source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub source_id: i64,
    pub url: String,
}

impl IdentityKey {
    pub fn new(source_id: i64, url: impl Into<String>) -> Self {
        Self {
            source_id,
            url: url.into(),
        }
    }

    pub fn is_known_source(&self) -> bool {
        self.source_id != LOCAL_SOURCE_ID
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_id, self.url)
    }
}

/// One work tracked by a user, with its reading progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub source_id: i64,

    pub url: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub alternate_titles: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default)]
    pub status: ReadingStatus,

    #[serde(default)]
    pub favorite: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tracking_id: Option<i64>,

    /// Epoch millis.
    #[serde(default)]
    pub last_modified_at: i64,

    #[serde(default)]
    pub chapters: Vec<ChapterRecord>,

    #[serde(default)]
    pub history: Vec<HistoryRecord>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<i64>,

    #[serde(default)]
    pub tracking_links: Vec<TrackingRecord>,
}

impl CatalogEntry {
    pub fn new(source_id: i64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id,
            url: url.into(),
            title: title.into(),
            alternate_titles: BTreeSet::new(),
            author: None,
            status: ReadingStatus::default(),
            favorite: false,
            external_tracking_id: None,
            last_modified_at: 0,
            chapters: Vec::new(),
            history: Vec::new(),
            categories: BTreeSet::new(),
            tracking_links: Vec::new(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.source_id, self.url.clone())
    }

    pub fn chapter(&self, url: &str) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.url == url)
    }
}
