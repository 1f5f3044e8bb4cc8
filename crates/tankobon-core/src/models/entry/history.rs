use serde::{Deserialize, Serialize};

/// Read-history row for one chapter of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub chapter_url: String,

    /// Epoch millis of the last read.
    #[serde(default)]
    pub last_read: i64,

    /// Accumulated reading time in millis.
    #[serde(default)]
    pub read_duration: i64,
}

impl HistoryRecord {
    pub fn new(chapter_url: impl Into<String>, last_read: i64) -> Self {
        Self {
            chapter_url: chapter_url.into(),
            last_read,
            read_duration: 0,
        }
    }
}
