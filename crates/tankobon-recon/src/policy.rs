use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tankobon_core::{BackupExtras, CatalogEntry, IdentityKey, RecordSet};
use tracing::{debug, info, warn};

use crate::log::{DecisionLog, GroupOverride, LogEvent};
use crate::merge::{MergeStats, SurvivorPolicy, merge_members};
use crate::options::ReconcileOptions;
use crate::resolver::{DuplicateGroup, DuplicateResolver};
use crate::signals::SignalKind;
use crate::similarity::TitleSimilarity;
use crate::{ReconError, Result};

/// Merging several record sets into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    Replace,
    KeepFirst,
    KeepBoth,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::KeepFirst => "keep_first",
            Self::KeepBoth => "keep_both",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "replace" => Ok(Self::Replace),
            "keep_first" => Ok(Self::KeepFirst),
            "keep_both" => Ok(Self::KeepBoth),
            other => Err(ReconError::Configuration(format!(
                "unknown merge mode '{other}' (expected replace, keep_first or keep_both)"
            ))),
        }
    }
}

/// Deduplicating a single record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    #[default]
    KeepFirst,
    KeepLast,
}

impl CleanupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepFirst => "keep_first",
            Self::KeepLast => "keep_last",
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupMode {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "keep_first" => Ok(Self::KeepFirst),
            "keep_last" => Ok(Self::KeepLast),
            other => Err(ReconError::Configuration(format!(
                "unknown cleanup mode '{other}' (expected keep_first or keep_last)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "workflow", content = "mode", rename_all = "snake_case")]
pub enum ReconcileMode {
    Merge(MergeMode),
    Cleanup(CleanupMode),
}

impl ReconcileMode {
    /// How an accepted group collapses; `None` means members are kept as-is.
    fn group_policy(self) -> Option<SurvivorPolicy> {
        match self {
            Self::Merge(MergeMode::Replace) => Some(SurvivorPolicy::REPLACE),
            Self::Merge(MergeMode::KeepFirst) => Some(SurvivorPolicy::KEEP_FIRST),
            Self::Merge(MergeMode::KeepBoth) => None,
            Self::Cleanup(CleanupMode::KeepFirst) => Some(SurvivorPolicy::KEEP_FIRST),
            Self::Cleanup(CleanupMode::KeepLast) => Some(SurvivorPolicy::KEEP_LAST),
        }
    }

    /// How retained entries sharing an identity key collapse.
    fn identity_policy(self) -> SurvivorPolicy {
        self.group_policy().unwrap_or(SurvivorPolicy::KEEP_FIRST)
    }

    fn check_set_count(self, count: usize) -> Result<()> {
        match self {
            Self::Merge(_) if count == 0 => Err(ReconError::Configuration(
                "merge needs at least one record set".to_string(),
            )),
            Self::Cleanup(_) if count != 1 => Err(ReconError::Configuration(format!(
                "cleanup takes exactly one record set, got {count}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge(mode) => write!(f, "merge:{mode}"),
            Self::Cleanup(mode) => write!(f, "cleanup:{mode}"),
        }
    }
}

impl FromStr for ReconcileMode {
    type Err = ReconError;

    /// Parses `merge:<mode>` or `cleanup:<mode>`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("merge", mode)) => Ok(Self::Merge(mode.parse()?)),
            Some(("cleanup", mode)) => Ok(Self::Cleanup(mode.parse()?)),
            _ => Err(ReconError::Configuration(format!(
                "unknown reconcile mode '{s}' (expected merge:<mode> or cleanup:<mode>)"
            ))),
        }
    }
}

/// Reconciled entries plus the decisions that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub entries: Vec<CatalogEntry>,
    /// Non-entry backup fields of the last record set supplied.
    pub extras: BackupExtras,
    pub log: DecisionLog,
}

/// Entries of one group after identity collapse, placed by first slot.
struct Retained {
    placements: Vec<(usize, CatalogEntry)>,
    survivors: Vec<IdentityKey>,
    absorbed: Vec<IdentityKey>,
    overrides: Vec<GroupOverride>,
    stats: MergeStats,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    resolver: DuplicateResolver,
}

impl Reconciler {
    pub fn new(options: &ReconcileOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            resolver: DuplicateResolver::new(options),
        })
    }

    pub fn with_similarity(mut self, similarity: impl TitleSimilarity + 'static) -> Self {
        self.resolver = self.resolver.with_similarity(similarity);
        self
    }

    pub fn reconcile(&self, sets: &[RecordSet], mode: ReconcileMode) -> Result<Reconciliation> {
        mode.check_set_count(sets.len())?;

        let entries: Vec<&CatalogEntry> = sets.iter().flat_map(|s| s.entries.iter()).collect();
        debug!(sets = sets.len(), entries = entries.len(), %mode, "reconciling");

        let resolution = self.resolver.resolve(&entries);
        let mut log = DecisionLog::new(mode);
        log.summary.entries_in = entries.len();

        for evidence in resolution.evidence {
            log.push(LogEvent::EvidenceFound { evidence });
        }
        for skipped in &resolution.skipped {
            let key = entries[skipped.index].identity_key();
            let reason = match &skipped.error {
                ReconError::InvalidRecord { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            warn!(%key, %reason, "skipping invalid record");
            log.push(LogEvent::Skipped { key, reason });
        }

        let mut placements: BTreeMap<usize, Vec<CatalogEntry>> = BTreeMap::new();
        let mut consumed: HashSet<usize> = HashSet::new();

        for group in &resolution.groups {
            log.push(LogEvent::GroupFormed {
                group: group.id,
                members: group.member_keys.clone(),
                weakest_edge: group.weakest_edge,
                strongest: group.strongest.clone(),
            });

            let mut members = group.members.clone();
            members.sort_unstable();
            consumed.extend(members.iter().copied());

            let ambiguity = find_ambiguity(group, &entries);
            let retained = match (&ambiguity, mode.group_policy()) {
                (None, Some(policy)) => merge_group(&members, &entries, policy),
                _ => collapse_identities(&members, &entries, mode.identity_policy()),
            };

            if let Some(ReconError::AmbiguousGroup { reason, .. }) = ambiguity {
                warn!(group = group.id, %reason, "leaving ambiguous group unmerged");
                log.push(LogEvent::GroupRejected {
                    group: group.id,
                    members: group.member_keys.clone(),
                    survivors: retained.survivors.clone(),
                    reason,
                });
            } else {
                info!(
                    group = group.id,
                    survivors = retained.survivors.len(),
                    absorbed = retained.absorbed.len(),
                    chapters_added = retained.stats.chapters_added,
                    "group resolved"
                );
                log.push(LogEvent::GroupResolved {
                    group: group.id,
                    mode,
                    survivors: retained.survivors.clone(),
                    absorbed: retained.absorbed.clone(),
                    overrides: retained.overrides.clone(),
                    stats: retained.stats,
                });
            }

            for (slot, entry) in retained.placements {
                placements.entry(slot).or_default().push(entry);
            }
        }

        let mut output = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if let Some(placed) = placements.remove(&index) {
                output.extend(placed);
            } else if !consumed.contains(&index) {
                output.push((*entry).clone());
            }
        }

        log.summary.entries_out = output.len();
        info!(
            entries_in = log.summary.entries_in,
            entries_out = log.summary.entries_out,
            groups = log.summary.groups_formed,
            rejected = log.summary.groups_rejected,
            "reconciliation finished"
        );

        Ok(Reconciliation {
            entries: output,
            extras: sets.last().map(|s| s.extras.clone()).unwrap_or_default(),
            log,
        })
    }
}

/// Runs one reconciliation with the default title metric.
pub fn reconcile(
    sets: &[RecordSet],
    mode: ReconcileMode,
    options: &ReconcileOptions,
) -> Result<Reconciliation> {
    Reconciler::new(options)?.reconcile(sets, mode)
}

pub fn reconcile_merge(
    sets: &[RecordSet],
    mode: MergeMode,
    options: &ReconcileOptions,
) -> Result<Reconciliation> {
    reconcile(sets, ReconcileMode::Merge(mode), options)
}

pub fn reconcile_cleanup(
    set: &RecordSet,
    mode: CleanupMode,
    options: &ReconcileOptions,
) -> Result<Reconciliation> {
    reconcile(std::slice::from_ref(set), ReconcileMode::Cleanup(mode), options)
}

/// A link between two different known sources merges on an exact title, or
/// on a shared tracker id backed by a title signal. Anything weaker is
/// ambiguous.
fn find_ambiguity(group: &DuplicateGroup, entries: &[&CatalogEntry]) -> Option<ReconError> {
    group.edges.iter().find_map(|edge| {
        let left = entries[edge.left].identity_key();
        let right = entries[edge.right].identity_key();
        let cross_source = left.is_known_source()
            && right.is_known_source()
            && left.source_id != right.source_id;
        let corroborated = edge.has_signal(SignalKind::ExactTitle)
            || (edge.has_signal(SignalKind::ExternalTracking) && edge.has_title_signal());
        if !cross_source || corroborated {
            return None;
        }

        let signals: Vec<String> = edge.evidence.iter().map(|e| e.kind.to_string()).collect();
        Some(ReconError::AmbiguousGroup {
            group: group.id,
            reason: format!(
                "{left} and {right} come from different sources and are linked only by {}",
                signals.join(", ")
            ),
        })
    })
}

fn merge_group(members: &[usize], entries: &[&CatalogEntry], policy: SurvivorPolicy) -> Retained {
    let refs: Vec<&CatalogEntry> = members.iter().map(|&i| entries[i]).collect();
    match (members.first(), merge_members(&refs, policy)) {
        (Some(&slot), Some(outcome)) => {
            let survivor = outcome.entry.identity_key();
            Retained {
                overrides: outcome
                    .overrides
                    .into_iter()
                    .map(|change| GroupOverride {
                        survivor: survivor.clone(),
                        change,
                    })
                    .collect(),
                placements: vec![(slot, outcome.entry)],
                survivors: vec![survivor],
                absorbed: outcome.absorbed,
                stats: outcome.stats,
            }
        }
        _ => collapse_identities(members, entries, policy),
    }
}

/// Keeps every distinct identity; entries sharing a key merge under `policy`.
fn collapse_identities(
    members: &[usize],
    entries: &[&CatalogEntry],
    policy: SurvivorPolicy,
) -> Retained {
    let mut by_key: BTreeMap<IdentityKey, Vec<usize>> = BTreeMap::new();
    for &index in members {
        by_key.entry(entries[index].identity_key()).or_default().push(index);
    }

    let mut partitions: Vec<Vec<usize>> = by_key.into_values().collect();
    partitions.sort_by_key(|p| p.first().copied());

    let mut retained = Retained {
        placements: Vec::new(),
        survivors: Vec::new(),
        absorbed: Vec::new(),
        overrides: Vec::new(),
        stats: MergeStats::default(),
    };

    for partition in partitions {
        if let [only] = partition.as_slice() {
            retained.survivors.push(entries[*only].identity_key());
            retained.placements.push((*only, entries[*only].clone()));
            continue;
        }
        let refs: Vec<&CatalogEntry> = partition.iter().map(|&i| entries[i]).collect();
        let (Some(&slot), Some(outcome)) = (partition.first(), merge_members(&refs, policy))
        else {
            continue;
        };
        let survivor = outcome.entry.identity_key();
        retained
            .overrides
            .extend(outcome.overrides.into_iter().map(|change| GroupOverride {
                survivor: survivor.clone(),
                change,
            }));
        retained.stats.chapters_added += outcome.stats.chapters_added;
        retained.stats.history_added += outcome.stats.history_added;
        retained.stats.tracking_added += outcome.stats.tracking_added;
        retained.survivors.push(survivor);
        retained.placements.push((slot, outcome.entry));
    }
    retained
}
