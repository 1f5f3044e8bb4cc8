//! AniList list exports: conversion into catalog entries and alternate-title
//! enrichment for duplicate detection.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tankobon_core::{CatalogEntry, ChapterRecord, ReadingStatus, RecordSet};
use tracing::{debug, info, warn};

use crate::normalize::normalize_title;

/// Source id given to entries created from an AniList list.
pub const ANILIST_SOURCE_ID: i64 = 6902;
const ANILIST_MANGA_URL: &str = "anilist.co/manga/";
const MAL_MANGA_URL: &str = "myanimelist.net/manga/";
/// Upper bound on chapters generated from a list entry's progress.
pub const MAX_PROGRESS_CHAPTERS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracker {
    AniList,
    MyAnimeList,
}

/// Numeric id embedded in an AniList or MyAnimeList manga URL.
pub fn tracker_url_id(url: &str) -> Option<(Tracker, i64)> {
    let (tracker, rest) = if let Some((_, rest)) = url.split_once(ANILIST_MANGA_URL) {
        (Tracker::AniList, rest)
    } else if let Some((_, rest)) = url.split_once(MAL_MANGA_URL) {
        (Tracker::MyAnimeList, rest)
    } else {
        return None;
    };
    let id = rest.split(['/', '?', '#']).next()?.parse().ok()?;
    Some((tracker, id))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AniListTitle {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

impl AniListTitle {
    /// English when present, otherwise romaji, otherwise native.
    pub fn preferred(&self) -> Option<&str> {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .flatten()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }

    pub fn all(&self) -> impl Iterator<Item = &str> {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .flatten()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AniListMedia {
    pub id: i64,
    pub id_mal: Option<i64>,
    pub title: AniListTitle,
    pub synonyms: Vec<String>,
    pub chapters: Option<u32>,
}

impl AniListMedia {
    pub fn from_json(v: &Value) -> Option<Self> {
        let id = v.get("id").and_then(Value::as_i64)?;
        let title = v
            .get("title")
            .map(|t| AniListTitle {
                english: string_field(t, "english"),
                romaji: string_field(t, "romaji"),
                native: string_field(t, "native"),
            })
            .unwrap_or_default();
        let synonyms = v
            .get("synonyms")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            id_mal: v.get("idMal").and_then(Value::as_i64),
            title,
            synonyms,
            chapters: v
                .get("chapters")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
        })
    }

    /// Every known name except the preferred one.
    /// The AniList id, plus the MyAnimeList id when AniList knows it.
    pub fn tracker_ids(&self) -> impl Iterator<Item = (Tracker, i64)> {
        std::iter::once((Tracker::AniList, self.id))
            .chain(self.id_mal.map(|id| (Tracker::MyAnimeList, id)))
    }

    pub fn alternate_titles(&self) -> BTreeSet<String> {
        let preferred = self.title.preferred();
        self.title
            .all()
            .chain(self.synonyms.iter().map(String::as_str))
            .filter(|t| Some(*t) != preferred)
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn url(&self) -> String {
        format!("https://{ANILIST_MANGA_URL}{}", self.id)
    }
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AniListEntry {
    pub status: Option<String>,
    pub progress: u32,
    pub media: AniListMedia,
}

impl AniListEntry {
    pub fn from_json(v: &Value) -> Option<Self> {
        Some(Self {
            status: string_field(v, "status"),
            progress: v
                .get("progress")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            media: AniListMedia::from_json(v.get("media")?)?,
        })
    }

    /// Converts into a catalog entry; `None` when the media has no usable title.
    /// Progress beyond [`MAX_PROGRESS_CHAPTERS`] is treated as corrupt and capped.
    pub fn to_catalog_entry(&self) -> Option<CatalogEntry> {
        let title = self.media.title.preferred()?;
        let url = self.media.url();
        let mut entry = CatalogEntry::new(ANILIST_SOURCE_ID, url.clone(), title);
        entry.alternate_titles = self.media.alternate_titles();
        entry.external_tracking_id = Some(self.media.id);
        entry.status = map_status(self.status.as_deref());
        let read = self.progress.min(MAX_PROGRESS_CHAPTERS);
        if read < self.progress {
            warn!(id = self.media.id, progress = self.progress, "capping implausible progress");
        }
        entry.chapters = (1..=read)
            .map(|n| ChapterRecord {
                url: format!("{url}/chapter/{n}"),
                name: format!("Chapter {n}"),
                chapter_number: Some(n as f32),
                read: true,
                last_page_read: 1,
                ..Default::default()
            })
            .collect();
        Some(entry)
    }
}

/// Unknown or missing statuses land in the plan-to-read list.
pub fn map_status(status: Option<&str>) -> ReadingStatus {
    match status.map(str::to_uppercase).as_deref() {
        Some("CURRENT" | "REPEATING") => ReadingStatus::Reading,
        Some("COMPLETED") => ReadingStatus::Completed,
        Some("DROPPED") => ReadingStatus::Dropped,
        Some("PAUSED") => ReadingStatus::OnHold,
        _ => ReadingStatus::PlanToRead,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AniListList {
    pub status: Option<String>,
    pub entries: Vec<AniListEntry>,
}

/// A `MediaListCollection` export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AniListExport {
    pub lists: Vec<AniListList>,
}

impl AniListExport {
    /// Accepts the full GraphQL response or the bare collection object.
    pub fn from_json(v: &Value) -> Self {
        let collection = v
            .pointer("/data/MediaListCollection")
            .or_else(|| v.get("MediaListCollection"))
            .unwrap_or(v);
        let lists = collection
            .get("lists")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|list| AniListList {
                        status: string_field(list, "status"),
                        entries: list
                            .get("entries")
                            .and_then(Value::as_array)
                            .map(|entries| {
                                entries.iter().filter_map(AniListEntry::from_json).collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { lists }
    }

    pub fn entries<'a>(
        &'a self,
        filter: &'a StatusFilter,
    ) -> impl Iterator<Item = &'a AniListEntry> + 'a {
        self.lists
            .iter()
            .filter(move |list| filter.allows(list.status.as_deref()))
            .flat_map(|list| list.entries.iter())
    }

    pub fn media(&self) -> impl Iterator<Item = &AniListMedia> {
        self.lists
            .iter()
            .flat_map(|list| list.entries.iter())
            .map(|entry| &entry.media)
    }
}

/// Which AniList lists to import: `all` or a comma-separated status list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(HashSet<String>),
}

impl StatusFilter {
    pub fn parse(input: &str) -> Self {
        let statuses: HashSet<String> = input
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if statuses.is_empty() || statuses.contains("ALL") {
            Self::All
        } else {
            Self::Only(statuses)
        }
    }

    pub fn allows(&self, status: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Only(statuses) => {
                status.is_some_and(|s| statuses.contains(&s.to_uppercase()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub entries: Vec<CatalogEntry>,
    /// `(title, anilist id)` of list entries already present in the compared set.
    pub already_present: Vec<(String, i64)>,
}

/// Converts the selected lists; with `existing`, entries whose AniList or
/// MyAnimeList id, or any normalized title, is already there are left out.
pub fn convert(
    export: &AniListExport,
    filter: &StatusFilter,
    existing: Option<&RecordSet>,
) -> Conversion {
    let mut known_titles: HashSet<String> = HashSet::new();
    let mut known_ids: HashSet<(Tracker, i64)> = HashSet::new();
    for entry in existing.map(|set| set.entries.as_slice()).unwrap_or_default() {
        known_titles.insert(normalize_title(&entry.title));
        if let Some(tracked) = tracker_url_id(&entry.url) {
            known_ids.insert(tracked);
        }
    }

    let mut conversion = Conversion::default();
    for item in export.entries(filter) {
        let Some(entry) = item.to_catalog_entry() else {
            debug!(id = item.media.id, "skipping AniList entry without a title");
            continue;
        };

        let present = item
            .media
            .tracker_ids()
            .any(|tracked| known_ids.contains(&tracked))
            || std::iter::once(entry.title.as_str())
                .chain(entry.alternate_titles.iter().map(String::as_str))
                .any(|t| known_titles.contains(&normalize_title(t)));
        if present {
            debug!(title = %entry.title, id = item.media.id, "already in compared set");
            conversion.already_present.push((entry.title, item.media.id));
            continue;
        }
        conversion.entries.push(entry);
    }

    info!(
        converted = conversion.entries.len(),
        already_present = conversion.already_present.len(),
        "converted AniList lists"
    );
    conversion
}

/// Attaches AniList names to backup entries so the alternate-title signal
/// can see them. Entries are matched by the AniList or MyAnimeList id in their
/// URL, then by normalized title. Returns how many entries gained at least
/// one title.
pub fn enrich_alternate_titles<'a>(
    entries: &mut [CatalogEntry],
    media: impl IntoIterator<Item = &'a AniListMedia>,
) -> usize {
    let mut by_id: HashMap<(Tracker, i64), &AniListMedia> = HashMap::new();
    let mut by_title: HashMap<String, &AniListMedia> = HashMap::new();
    for item in media {
        for tracked in item.tracker_ids() {
            by_id.entry(tracked).or_insert(item);
        }
        for title in item.title.all().chain(item.synonyms.iter().map(String::as_str)) {
            let normalized = normalize_title(title);
            if !normalized.is_empty() {
                by_title.entry(normalized).or_insert(item);
            }
        }
    }

    let mut enriched = 0;
    for entry in entries.iter_mut() {
        let by_url = tracker_url_id(&entry.url).and_then(|tracked| by_id.get(&tracked).copied());
        let Some(matched) =
            by_url.or_else(|| by_title.get(&normalize_title(&entry.title)).copied())
        else {
            continue;
        };

        let before = entry.alternate_titles.len();
        for title in matched
            .title
            .all()
            .chain(matched.synonyms.iter().map(String::as_str))
        {
            if title != entry.title {
                entry.alternate_titles.insert(title.to_string());
            }
        }
        if entry.alternate_titles.len() > before {
            enriched += 1;
        }
    }
    enriched
}
