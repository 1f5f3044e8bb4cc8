//! Field-level merging of duplicate entries into one survivor.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tankobon_core::{
    CatalogEntry, ChapterRecord, HistoryRecord, IdentityKey, ReadingStatus, TrackingRecord,
};

/// Which member supplies the survivor's identity and base fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survivor {
    First,
    Last,
}

/// How a group of duplicate entries collapses into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurvivorPolicy {
    pub survivor: Survivor,
    /// Later members' scalar fields override earlier ones when not older.
    pub override_scalars: bool,
}

impl SurvivorPolicy {
    pub const KEEP_FIRST: Self = Self {
        survivor: Survivor::First,
        override_scalars: false,
    };
    pub const KEEP_LAST: Self = Self {
        survivor: Survivor::Last,
        override_scalars: false,
    };
    pub const REPLACE: Self = Self {
        survivor: Survivor::Last,
        override_scalars: true,
    };
}

/// A scalar on the survivor that differs from the base member's own value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOverride {
    pub field: String,
    pub from: IdentityKey,
    pub previous: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub chapters_added: usize,
    pub history_added: usize,
    pub tracking_added: usize,
}

impl MergeStats {
    fn absorb(&mut self, other: MergeStats) {
        self.chapters_added += other.chapters_added;
        self.history_added += other.history_added;
        self.tracking_added += other.tracking_added;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub entry: CatalogEntry,
    pub absorbed: Vec<IdentityKey>,
    pub overrides: Vec<FieldOverride>,
    pub stats: MergeStats,
}

#[derive(Debug, Clone, PartialEq)]
struct Scalars {
    title: String,
    author: Option<String>,
    status: ReadingStatus,
    favorite: bool,
}

impl Scalars {
    fn of(entry: &CatalogEntry) -> Self {
        Self {
            title: entry.title.clone(),
            author: entry.author.clone(),
            status: entry.status,
            favorite: entry.favorite,
        }
    }
}

/// Collapses `members` (in supply order, at least one) into a single entry.
pub fn merge_members(members: &[&CatalogEntry], policy: SurvivorPolicy) -> Option<MergeOutcome> {
    let base_at = match policy.survivor {
        Survivor::First => 0,
        Survivor::Last => members.len().checked_sub(1)?,
    };
    let base = members.get(base_at)?;
    let base_key = base.identity_key();
    let mut target = (*base).clone();
    let mut overrides = Vec::new();
    let mut stats = MergeStats::default();
    let mut holders = chapter_holders(base);

    if policy.override_scalars {
        apply_scalar_fold(&mut target, members, &mut overrides);
    }

    for (at, member) in members.iter().enumerate() {
        if at == base_at {
            continue;
        }
        stats.absorb(merge_nested(&mut target, member, &mut holders));

        if target.author.is_none()
            && let Some(author) = member.author.as_ref().filter(|a| !a.trim().is_empty())
        {
            target.author = Some(author.clone());
            overrides.push(FieldOverride {
                field: "author".to_string(),
                from: member.identity_key(),
                previous: String::new(),
                value: author.clone(),
            });
        }
        if target.external_tracking_id.is_none()
            && let Some(id) = member.external_tracking_id
        {
            target.external_tracking_id = Some(id);
            overrides.push(FieldOverride {
                field: "external_tracking_id".to_string(),
                from: member.identity_key(),
                previous: String::new(),
                value: id.to_string(),
            });
        }
    }

    for member in members {
        if member.title != target.title {
            target.alternate_titles.insert(member.title.clone());
        }
        target
            .alternate_titles
            .extend(member.alternate_titles.iter().cloned());
        target.categories.extend(member.categories.iter().copied());
        target.last_modified_at = target.last_modified_at.max(member.last_modified_at);
    }
    let title = target.title.clone();
    target.alternate_titles.remove(&title);

    let mut absorbed: Vec<IdentityKey> = Vec::new();
    for (at, member) in members.iter().enumerate() {
        let key = member.identity_key();
        if at != base_at && key != base_key && !absorbed.contains(&key) {
            absorbed.push(key);
        }
    }

    Some(MergeOutcome {
        entry: target,
        absorbed,
        overrides,
        stats,
    })
}

/// Folds scalars in supply order: a later member wins when it is not older
/// than the current holder.
fn apply_scalar_fold(
    target: &mut CatalogEntry,
    members: &[&CatalogEntry],
    overrides: &mut Vec<FieldOverride>,
) {
    let Some((first, rest)) = members.split_first() else {
        return;
    };
    let mut scalars = Scalars::of(first);
    let mut holder = *first;
    for member in rest {
        if member.last_modified_at >= holder.last_modified_at {
            let next = Scalars::of(member);
            scalars = Scalars {
                author: next.author.or(scalars.author),
                ..next
            };
            holder = *member;
        }
    }

    let from = holder.identity_key();
    let mut record = |field: &str, previous: String, value: String| {
        if previous != value {
            overrides.push(FieldOverride {
                field: field.to_string(),
                from: from.clone(),
                previous,
                value,
            });
        }
    };

    record("title", target.title.clone(), scalars.title.clone());
    record(
        "author",
        target.author.clone().unwrap_or_default(),
        scalars.author.clone().unwrap_or_default(),
    );
    record("status", target.status.to_string(), scalars.status.to_string());
    record(
        "favorite",
        target.favorite.to_string(),
        scalars.favorite.to_string(),
    );

    target.title = scalars.title;
    target.author = scalars.author.or(target.author.take());
    target.status = scalars.status;
    target.favorite = scalars.favorite;
}

/// Modification time of the member whose descriptive fields each chapter
/// currently carries, keyed by chapter url.
pub type ChapterHolders = HashMap<String, i64>;

pub fn chapter_holders(entry: &CatalogEntry) -> ChapterHolders {
    entry
        .chapters
        .iter()
        .map(|c| (c.url.clone(), entry.last_modified_at))
        .collect()
}

/// Merges chapters, history and tracking links of `incoming` into `target`.
pub fn merge_nested(
    target: &mut CatalogEntry,
    incoming: &CatalogEntry,
    holders: &mut ChapterHolders,
) -> MergeStats {
    MergeStats {
        chapters_added: merge_chapters(
            &mut target.chapters,
            &incoming.chapters,
            incoming.last_modified_at,
            holders,
        ),
        history_added: merge_history(&mut target.history, &incoming.history),
        tracking_added: merge_tracking(&mut target.tracking_links, &incoming.tracking_links),
    }
}

/// `incoming_at` is the modification time of the entry `incoming` belongs to.
/// Descriptive fields are compared against their current holder in `holders`,
/// not against the survivor as a whole.
pub fn merge_chapters(
    target: &mut Vec<ChapterRecord>,
    incoming: &[ChapterRecord],
    incoming_at: i64,
    holders: &mut ChapterHolders,
) -> usize {
    let mut index: HashMap<String, usize> = target
        .iter()
        .enumerate()
        .map(|(at, c)| (c.url.clone(), at))
        .collect();
    let mut added = 0;

    for chapter in incoming {
        match index.get(&chapter.url) {
            Some(&at) => {
                let holder_at = holders.get(&chapter.url).copied().unwrap_or(incoming_at);
                if combine_chapter(&mut target[at], chapter, incoming_at.cmp(&holder_at)) {
                    holders.insert(chapter.url.clone(), incoming_at);
                }
            }
            None => {
                holders.insert(chapter.url.clone(), incoming_at);
                index.insert(chapter.url.clone(), target.len());
                target.push(chapter.clone());
                added += 1;
            }
        }
    }
    added
}

/// Progress only moves forward. Descriptive fields come from the more
/// recently modified side, with ties going to whichever has more progress.
/// Returns whether `incoming` became the holder of those fields.
fn combine_chapter(
    target: &mut ChapterRecord,
    incoming: &ChapterRecord,
    recency: Ordering,
) -> bool {
    let prefer_incoming = match recency {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => incoming.progress_rank() > target.progress_rank(),
    };

    prefer_non_default(&mut target.name, &incoming.name, prefer_incoming);
    prefer_non_default(&mut target.scanlator, &incoming.scanlator, prefer_incoming);
    prefer_non_default(
        &mut target.chapter_number,
        &incoming.chapter_number,
        prefer_incoming,
    );
    prefer_non_default(&mut target.date_upload, &incoming.date_upload, prefer_incoming);

    target.read |= incoming.read;
    target.bookmark |= incoming.bookmark;
    target.last_page_read = target.last_page_read.max(incoming.last_page_read);
    prefer_incoming
}

fn prefer_non_default<T>(target: &mut T, incoming: &T, prefer_incoming: bool)
where
    T: Clone + Default + PartialEq,
{
    let empty = T::default();
    if *incoming == empty {
        return;
    }
    if *target == empty || prefer_incoming {
        *target = incoming.clone();
    }
}

pub fn merge_history(target: &mut Vec<HistoryRecord>, incoming: &[HistoryRecord]) -> usize {
    let mut index: HashMap<String, usize> = target
        .iter()
        .enumerate()
        .map(|(at, h)| (h.chapter_url.clone(), at))
        .collect();
    let mut added = 0;

    for record in incoming {
        match index.get(&record.chapter_url) {
            Some(&at) => {
                let existing = &mut target[at];
                existing.last_read = existing.last_read.max(record.last_read);
                existing.read_duration = existing.read_duration.max(record.read_duration);
            }
            None => {
                index.insert(record.chapter_url.clone(), target.len());
                target.push(record.clone());
                added += 1;
            }
        }
    }
    added
}

/// One link per `(sync_id, tracking_id)`; the one further along wins.
pub fn merge_tracking(target: &mut Vec<TrackingRecord>, incoming: &[TrackingRecord]) -> usize {
    let mut index: HashMap<(i32, i64), usize> = target
        .iter()
        .enumerate()
        .map(|(at, t)| (t.key(), at))
        .collect();
    let mut added = 0;

    for link in incoming {
        match index.get(&link.key()) {
            Some(&at) => {
                if link.last_chapter_read > target[at].last_chapter_read {
                    target[at] = link.clone();
                }
            }
            None => {
                index.insert(link.key(), target.len());
                target.push(link.clone());
                added += 1;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(url: &str, page: i64) -> ChapterRecord {
        let mut c = ChapterRecord::new(url);
        c.last_page_read = page;
        c
    }

    #[test]
    fn chapters_union_keeps_maximum_progress() {
        let mut read = chapter("c/2", 3);
        read.read = true;
        let mut target = vec![chapter("c/1", 5), read];
        let mut bookmarked = chapter("c/2", 20);
        bookmarked.bookmark = true;
        let incoming = vec![chapter("c/1", 10), bookmarked, chapter("c/3", 1)];

        let mut holders: ChapterHolders =
            target.iter().map(|c| (c.url.clone(), 50)).collect();
        let added = merge_chapters(&mut target, &incoming, 10, &mut holders);
        assert_eq!(added, 1);
        assert_eq!(target.len(), 3);
        assert_eq!(target[0].last_page_read, 10);
        assert!(target[1].read && target[1].bookmark);
        assert_eq!(target[1].last_page_read, 20);
        assert_eq!(target[2].url, "c/3");
        assert_eq!(holders["c/3"], 10);
        assert_eq!(holders["c/1"], 50);
    }

    #[test]
    fn chapter_details_come_from_the_newest_member_in_any_order() {
        let named = |at: i64, name: &str| {
            let mut entry = CatalogEntry::new(1, format!("m/{at}"), "Pluto");
            entry.last_modified_at = at;
            let mut c = chapter("c/1", 0);
            c.name = name.to_string();
            entry.chapters.push(c);
            entry
        };
        let a = named(100, "from-100");
        let b = named(300, "from-300");
        let c = named(200, "from-200");

        let outcome = merge_members(&[&a, &b, &c], SurvivorPolicy::KEEP_FIRST).unwrap();
        assert_eq!(outcome.entry.chapters.len(), 1);
        assert_eq!(outcome.entry.chapters[0].name, "from-300");

        let outcome = merge_members(&[&b, &c, &a], SurvivorPolicy::KEEP_LAST).unwrap();
        assert_eq!(outcome.entry.chapters[0].name, "from-300");
    }

    #[test]
    fn chapter_details_follow_recency_without_erasing() {
        let mut target = chapter("c/1", 0);
        target.name = "Old name".to_string();
        target.scanlator = Some("Group A".to_string());

        let mut newer = chapter("c/1", 0);
        newer.name = "New name".to_string();
        combine_chapter(&mut target, &newer, Ordering::Greater);
        assert_eq!(target.name, "New name");
        assert_eq!(target.scanlator.as_deref(), Some("Group A"));

        let mut older = chapter("c/1", 0);
        older.name = "Ancient".to_string();
        older.date_upload = 42;
        combine_chapter(&mut target, &older, Ordering::Less);
        assert_eq!(target.name, "New name");
        assert_eq!(target.date_upload, 42);
    }

    #[test]
    fn equal_recency_prefers_more_progress() {
        let mut target = chapter("c/1", 2);
        target.name = "Mine".to_string();
        let mut ahead = chapter("c/1", 9);
        ahead.name = "Theirs".to_string();
        combine_chapter(&mut target, &ahead, Ordering::Equal);
        assert_eq!(target.name, "Theirs");
    }

    #[test]
    fn history_takes_latest_and_longest() {
        let mut target = vec![HistoryRecord {
            chapter_url: "c/1".to_string(),
            last_read: 100,
            read_duration: 50,
        }];
        let incoming = vec![
            HistoryRecord {
                chapter_url: "c/1".to_string(),
                last_read: 90,
                read_duration: 80,
            },
            HistoryRecord::new("c/2", 5),
        ];
        assert_eq!(merge_history(&mut target, &incoming), 1);
        assert_eq!(target[0].last_read, 100);
        assert_eq!(target[0].read_duration, 80);
    }

    #[test]
    fn tracking_keeps_the_link_further_along() {
        let mut behind = TrackingRecord::new(2, 77);
        behind.last_chapter_read = 3.0;
        let mut ahead = TrackingRecord::new(2, 77);
        ahead.last_chapter_read = 12.0;

        let mut target = vec![ahead.clone()];
        assert_eq!(merge_tracking(&mut target, &[behind.clone()]), 0);
        assert_eq!(target[0].last_chapter_read, 12.0);

        let mut target = vec![behind];
        merge_tracking(&mut target, &[ahead, TrackingRecord::new(1, 5)]);
        assert_eq!(target[0].last_chapter_read, 12.0);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn keep_first_retains_base_scalars_and_collects_titles() {
        let mut first = CatalogEntry::new(1, "a", "Naruto");
        first.last_modified_at = 10;
        first.categories.insert(1);
        let mut second = CatalogEntry::new(2, "b", "NARUTO (Digital)");
        second.last_modified_at = 20;
        second.favorite = true;
        second.author = Some("Kishimoto".to_string());
        second.categories.insert(4);

        let outcome = merge_members(&[&first, &second], SurvivorPolicy::KEEP_FIRST).unwrap();
        assert_eq!(outcome.entry.identity_key(), first.identity_key());
        assert!(!outcome.entry.favorite);
        assert_eq!(outcome.entry.author.as_deref(), Some("Kishimoto"));
        assert!(outcome.entry.alternate_titles.contains("NARUTO (Digital)"));
        assert_eq!(outcome.entry.categories.len(), 2);
        assert_eq!(outcome.entry.last_modified_at, 20);
        assert_eq!(outcome.absorbed, vec![second.identity_key()]);
        assert_eq!(outcome.overrides.len(), 1);
        assert_eq!(outcome.overrides[0].field, "author");
    }

    #[test]
    fn replace_folds_scalars_by_recency() {
        let mut early = CatalogEntry::new(1, "a", "Blame!");
        early.last_modified_at = 500;
        early.status = ReadingStatus::Completed;
        let mut late = CatalogEntry::new(1, "b", "BLAME");
        late.last_modified_at = 100;
        late.status = ReadingStatus::Reading;

        let outcome = merge_members(&[&early, &late], SurvivorPolicy::REPLACE).unwrap();
        assert_eq!(outcome.entry.identity_key(), late.identity_key());
        assert_eq!(outcome.entry.title, "Blame!");
        assert_eq!(outcome.entry.status, ReadingStatus::Completed);
        assert!(outcome.entry.alternate_titles.contains("BLAME"));
        assert!(!outcome.entry.alternate_titles.contains("Blame!"));
        let fields: Vec<&str> = outcome.overrides.iter().map(|o| o.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "status"]);
        assert!(outcome.overrides.iter().all(|o| o.from == early.identity_key()));
    }

    #[test]
    fn keep_last_uses_the_final_member() {
        let first = CatalogEntry::new(1, "a", "Monster");
        let mut last = CatalogEntry::new(1, "b", "Monster");
        last.favorite = true;
        let outcome = merge_members(&[&first, &last], SurvivorPolicy::KEEP_LAST).unwrap();
        assert_eq!(outcome.entry.identity_key(), last.identity_key());
        assert!(outcome.entry.favorite);
        assert!(outcome.entry.alternate_titles.is_empty());
    }

    #[test]
    fn same_key_members_are_not_reported_as_absorbed() {
        let a = CatalogEntry::new(3, "x", "Dorohedoro");
        let b = CatalogEntry::new(3, "x", "Dorohedoro");
        let outcome = merge_members(&[&a, &b], SurvivorPolicy::KEEP_FIRST).unwrap();
        assert!(outcome.absorbed.is_empty());
    }

    #[test]
    fn empty_group_yields_nothing() {
        assert!(merge_members(&[], SurvivorPolicy::REPLACE).is_none());
    }
}
