use serde::{Deserialize, Serialize};

/// One chapter of a catalog entry, keyed by `url` within its entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub url: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanlator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<f32>,

    #[serde(default)]
    pub read: bool,

    #[serde(default)]
    pub bookmark: bool,

    #[serde(default)]
    pub last_page_read: i64,

    /// Epoch millis, `0` when the source did not report one.
    #[serde(default)]
    pub date_upload: i64,
}

impl ChapterRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Ordering key for "which record carries more progress".
    pub fn progress_rank(&self) -> (bool, bool, i64) {
        (self.read, self.bookmark, self.last_page_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_rank_prefers_read_over_pages() {
        let mut read = ChapterRecord::new("c/1");
        read.read = true;
        let mut paged = ChapterRecord::new("c/1");
        paged.last_page_read = 40;
        assert!(read.progress_rank() > paged.progress_rank());
    }
}
