use serde::{Deserialize, Serialize};

/// Link between an entry and a list-tracking service (AniList, MAL, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub sync_id: i32,
    pub tracking_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<i64>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub last_chapter_read: f32,

    #[serde(default)]
    pub total_chapters: i32,

    #[serde(default)]
    pub score: f32,

    #[serde(default)]
    pub status: i32,

    #[serde(default)]
    pub tracking_url: String,
}

impl TrackingRecord {
    pub fn new(sync_id: i32, tracking_id: i64) -> Self {
        Self {
            sync_id,
            tracking_id,
            ..Default::default()
        }
    }

    pub fn key(&self) -> (i32, i64) {
        (self.sync_id, self.tracking_id)
    }
}
