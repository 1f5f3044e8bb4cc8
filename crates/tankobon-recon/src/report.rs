//! Markdown rendering of a [`DecisionLog`] for human review.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tankobon_core::IdentityKey;

use crate::log::{DecisionLog, GroupOverride, LogEvent};
use crate::signals::MatchEvidence;

/// Groups whose weakest link falls below this are flagged for review.
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub title: String,
    pub review_threshold: f64,
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: "Reconciliation Report".to_string(),
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            generated_at: None,
        }
    }
}

#[derive(Default)]
struct GroupView<'a> {
    members: &'a [IdentityKey],
    weakest_edge: f64,
    strongest: Option<&'a MatchEvidence>,
    survivors: &'a [IdentityKey],
    absorbed: &'a [IdentityKey],
    overrides: &'a [GroupOverride],
    rejected: Option<&'a str>,
    chapters_added: usize,
}

fn group_views(log: &DecisionLog) -> BTreeMap<usize, GroupView<'_>> {
    let mut views: BTreeMap<usize, GroupView<'_>> = BTreeMap::new();
    for event in log.iter() {
        match event {
            LogEvent::GroupFormed {
                group,
                members,
                weakest_edge,
                strongest,
            } => {
                let view = views.entry(*group).or_default();
                view.members = members.as_slice();
                view.weakest_edge = *weakest_edge;
                view.strongest = Some(strongest);
            }
            LogEvent::GroupResolved {
                group,
                survivors,
                absorbed,
                overrides,
                stats,
                ..
            } => {
                let view = views.entry(*group).or_default();
                view.survivors = survivors.as_slice();
                view.absorbed = absorbed.as_slice();
                view.overrides = overrides.as_slice();
                view.chapters_added = stats.chapters_added;
            }
            LogEvent::GroupRejected {
                group,
                survivors,
                reason,
                ..
            } => {
                let view = views.entry(*group).or_default();
                view.survivors = survivors.as_slice();
                view.rejected = Some(reason.as_str());
            }
            _ => {}
        }
    }
    views
}

/// Ids of groups whose weakest internal edge is below `threshold`.
pub fn low_confidence_groups(log: &DecisionLog, threshold: f64) -> Vec<usize> {
    log.iter()
        .filter_map(|event| match event {
            LogEvent::GroupFormed {
                group,
                weakest_edge,
                ..
            } if *weakest_edge < threshold => Some(*group),
            _ => None,
        })
        .collect()
}

pub fn render_markdown(log: &DecisionLog, options: &ReportOptions) -> String {
    let summary = &log.summary;
    let flagged = low_confidence_groups(log, options.review_threshold);

    let mut out = format!("# {}\n\n", options.title);
    out.push_str(&format!("Mode: `{}`\n", log.mode));
    if let Some(at) = options.generated_at {
        out.push_str(&format!("Generated on: {}\n", at.format("%Y-%m-%d %H:%M:%S")));
    }

    out.push_str("\n## Summary\n\n");
    out.push_str(&format!("- Entries in: {}\n", summary.entries_in));
    out.push_str(&format!("- Entries out: {}\n", summary.entries_out));
    out.push_str(&format!("- Groups formed: {}\n", summary.groups_formed));
    out.push_str(&format!("- Groups resolved: {}\n", summary.groups_resolved));
    out.push_str(&format!("- Groups rejected: {}\n", summary.groups_rejected));
    out.push_str(&format!("- Records skipped: {}\n", summary.skipped));
    out.push_str(&format!(
        "- Needing review (weakest link below {:.2}): {}\n",
        options.review_threshold,
        flagged.len()
    ));

    let skipped: Vec<(&IdentityKey, &str)> = log
        .iter()
        .filter_map(|event| match event {
            LogEvent::Skipped { key, reason } => Some((key, reason.as_str())),
            _ => None,
        })
        .collect();
    if !skipped.is_empty() {
        out.push_str("\n## Skipped Records\n\n");
        for (key, reason) in skipped {
            out.push_str(&format!("- `{key}`: {reason}\n"));
        }
    }

    let views = group_views(log);
    if views.is_empty() {
        out.push_str("\n**No duplicates found.**\n");
        return out;
    }

    out.push_str("\n## Groups\n");
    for (id, view) in &views {
        let status = match view.rejected {
            Some(_) => "rejected",
            None => "resolved",
        };
        out.push_str(&format!("\n### Group {id} ({status})\n\n"));

        if flagged.contains(id) {
            out.push_str(&format!(
                "> **Review:** weakest link {:.3} is below {:.2}\n\n",
                view.weakest_edge, options.review_threshold
            ));
        }
        if let Some(reason) = view.rejected {
            out.push_str(&format!("Left unmerged: {reason}\n\n"));
        }
        if let Some(strongest) = view.strongest {
            out.push_str(&format!(
                "- Strongest signal: {} ({:.3})\n",
                strongest.kind, strongest.confidence
            ));
        }
        out.push_str(&format!("- Weakest link: {:.3}\n", view.weakest_edge));
        if view.chapters_added > 0 {
            out.push_str(&format!("- Chapters added: {}\n", view.chapters_added));
        }

        out.push_str("\n**Members:**\n\n");
        for (n, key) in view.members.iter().enumerate() {
            let marker = if view.survivors.contains(key) {
                " (kept)"
            } else if view.absorbed.contains(key) {
                " (absorbed)"
            } else {
                ""
            };
            out.push_str(&format!("{}. `{key}`{marker}\n", n + 1));
        }

        if !view.overrides.is_empty() {
            out.push_str("\n**Overrides:**\n\n");
            for o in view.overrides {
                out.push_str(&format!(
                    "- `{}` {}: \"{}\" -> \"{}\" (from `{}`)\n",
                    o.survivor, o.change.field, o.change.previous, o.change.value, o.change.from
                ));
            }
        }
        out.push_str("\n---\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{FieldOverride, MergeStats};
    use crate::policy::{MergeMode, ReconcileMode};
    use crate::signals::SignalKind;
    use chrono::TimeZone;

    fn key(source: i64, url: &str) -> IdentityKey {
        IdentityKey::new(source, url)
    }

    fn sample_log() -> DecisionLog {
        let mut log = DecisionLog::new(ReconcileMode::Merge(MergeMode::Replace));
        log.summary.entries_in = 5;
        log.summary.entries_out = 3;
        let strongest = MatchEvidence {
            kind: SignalKind::FuzzyTitle,
            left: key(1, "a"),
            right: key(1, "b"),
            confidence: 0.88,
        };
        log.push(LogEvent::GroupFormed {
            group: 1,
            members: vec![key(1, "a"), key(1, "b")],
            weakest_edge: 0.88,
            strongest,
        });
        let mode = log.mode;
        log.push(LogEvent::GroupResolved {
            group: 1,
            mode,
            survivors: vec![key(1, "b")],
            absorbed: vec![key(1, "a")],
            overrides: vec![GroupOverride {
                survivor: key(1, "b"),
                change: FieldOverride {
                    field: "favorite".to_string(),
                    from: key(1, "a"),
                    previous: "false".to_string(),
                    value: "true".to_string(),
                },
            }],
            stats: MergeStats {
                chapters_added: 4,
                ..Default::default()
            },
        });
        log.push(LogEvent::Skipped {
            key: key(2, ""),
            reason: "empty url".to_string(),
        });
        log
    }

    #[test]
    fn low_confidence_groups_use_the_threshold() {
        let log = sample_log();
        assert_eq!(low_confidence_groups(&log, 0.9), vec![1]);
        assert!(low_confidence_groups(&log, 0.8).is_empty());
    }

    #[test]
    fn render_includes_summary_and_group_details() {
        let options = ReportOptions {
            generated_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            ..Default::default()
        };
        let md = render_markdown(&sample_log(), &options);

        assert!(md.starts_with("# Reconciliation Report\n"));
        assert!(md.contains("Mode: `merge:replace`"));
        assert!(md.contains("Generated on: 2024-03-01 12:00:00"));
        assert!(md.contains("- Entries in: 5"));
        assert!(md.contains("- `2:`: empty url"));
        assert!(md.contains("### Group 1 (resolved)"));
        assert!(md.contains("**Review:** weakest link 0.880"));
        assert!(md.contains("1. `1:a` (absorbed)"));
        assert!(md.contains("2. `1:b` (kept)"));
        assert!(md.contains("- Chapters added: 4"));
        assert!(md.contains("`1:b` favorite: \"false\" -> \"true\" (from `1:a`)"));
    }

    #[test]
    fn empty_log_says_no_duplicates() {
        let log = DecisionLog::new(ReconcileMode::Merge(MergeMode::KeepBoth));
        let md = render_markdown(&log, &ReportOptions::default());
        assert!(md.contains("**No duplicates found.**"));
        assert!(!md.contains("Generated on"));
    }
}
