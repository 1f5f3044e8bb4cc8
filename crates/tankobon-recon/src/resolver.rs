use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::Serialize;
use tankobon_core::{CatalogEntry, IdentityKey};
use tracing::{debug, trace};

use crate::options::ReconcileOptions;
use crate::signals::{MatchEvidence, SignalExtractor, SignalKind, TitleFingerprint, strongest};
use crate::similarity::TitleSimilarity;
use crate::{ReconError, Result};

/// A qualifying link between two group members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEdge {
    /// Input indices of the two entries.
    pub left: usize,
    pub right: usize,
    pub confidence: f64,
    /// Everything that fired for this pair, not only the strongest signal.
    pub evidence: Vec<MatchEvidence>,
}

impl GroupEdge {
    pub fn has_signal(&self, kind: SignalKind) -> bool {
        self.evidence.iter().any(|e| e.kind == kind)
    }

    pub fn has_title_signal(&self) -> bool {
        self.evidence.iter().any(|e| e.kind.is_title_based())
    }
}

/// Entries judged to be the same work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// 1-based, numbered by lowest canonical member.
    pub id: usize,
    /// Input indices in canonical (identity key) order.
    pub members: Vec<usize>,
    pub member_keys: Vec<IdentityKey>,
    pub strongest: MatchEvidence,
    /// Lowest confidence among the edges needed to hold the group together.
    pub weakest_edge: f64,
    pub edges: Vec<GroupEdge>,
}

/// An entry excluded from matching.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub index: usize,
    pub error: ReconError,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub groups: Vec<DuplicateGroup>,
    /// All evidence in canonical pair order, including pairs below the cutoff.
    pub evidence: Vec<MatchEvidence>,
    pub skipped: Vec<SkippedEntry>,
}

/// Rejects records the engine cannot reason about.
pub fn validate_entry(entry: &CatalogEntry) -> Result<()> {
    let reason = if entry.title.trim().is_empty() {
        Some("empty title")
    } else if entry.url.trim().is_empty() {
        Some("empty url")
    } else if entry.source_id < 0 {
        Some("negative source id")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ReconError::InvalidRecord {
            key: entry.identity_key(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug)]
pub struct DuplicateResolver {
    min_confidence: f64,
    extractor: SignalExtractor,
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self::new(&ReconcileOptions::default())
    }
}

impl DuplicateResolver {
    pub fn new(options: &ReconcileOptions) -> Self {
        Self {
            min_confidence: options.min_confidence,
            extractor: SignalExtractor::new(options.fuzzy_threshold),
        }
    }

    pub fn with_similarity(mut self, similarity: impl TitleSimilarity + 'static) -> Self {
        self.extractor = self.extractor.with_similarity(similarity);
        self
    }

    pub fn resolve<E: Borrow<CatalogEntry>>(&self, entries: &[E]) -> Resolution {
        let mut skipped = Vec::new();
        let mut canonical: Vec<(IdentityKey, usize)> = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let entry = entry.borrow();
            match validate_entry(entry) {
                Ok(()) => canonical.push((entry.identity_key(), index)),
                Err(error) => skipped.push(SkippedEntry { index, error }),
            }
        }
        canonical.sort();

        let fingerprints: Vec<TitleFingerprint> = canonical
            .iter()
            .map(|(_, index)| TitleFingerprint::of(entries[*index].borrow()))
            .collect();

        // Pairwise pass in canonical order; positions index into `canonical`.
        let mut evidence = Vec::new();
        let mut edges: Vec<(usize, usize, GroupEdge)> = Vec::new();
        for i in 0..canonical.len() {
            for j in (i + 1)..canonical.len() {
                let (left, right) = (canonical[i].1, canonical[j].1);
                let found = self.extractor.extract_prepared(
                    entries[left].borrow(),
                    &fingerprints[i],
                    entries[right].borrow(),
                    &fingerprints[j],
                );
                if found.is_empty() {
                    continue;
                }

                if let Some(best) = strongest(&found)
                    && best.confidence >= self.min_confidence
                {
                    trace!(
                        left = %best.left,
                        right = %best.right,
                        signal = %best.kind,
                        confidence = best.confidence,
                        "duplicate edge"
                    );
                    edges.push((
                        i,
                        j,
                        GroupEdge {
                            left,
                            right,
                            confidence: best.confidence,
                            evidence: found.clone(),
                        },
                    ));
                }
                evidence.extend(found);
            }
        }

        // Strongest edges first, so the last union inside a component is its bottleneck.
        let mut order: Vec<usize> = (0..edges.len()).collect();
        order.sort_by(|&a, &b| edges[b].2.confidence.total_cmp(&edges[a].2.confidence));

        let mut dsu = DisjointSet::new(canonical.len());
        let mut spanning = vec![false; edges.len()];
        for edge_idx in order {
            let (i, j, _) = &edges[edge_idx];
            if dsu.union(*i, *j) {
                spanning[edge_idx] = true;
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for pos in 0..canonical.len() {
            let root = dsu.find(pos);
            components.entry(root).or_default().push(pos);
        }

        let mut positions: Vec<Vec<usize>> = components
            .into_values()
            .filter(|members| members.len() > 1)
            .collect();
        positions.sort_by_key(|members| members[0]);

        let mut groups = Vec::with_capacity(positions.len());
        for (n, members) in positions.into_iter().enumerate() {
            let root = dsu.find(members[0]);
            let mut group_edges = Vec::new();
            let mut weakest_edge = f64::INFINITY;

            for (edge_idx, (i, _, edge)) in edges.iter().enumerate() {
                if dsu.find(*i) != root {
                    continue;
                }
                if spanning[edge_idx] {
                    weakest_edge = weakest_edge.min(edge.confidence);
                }
                group_edges.push(edge.clone());
            }

            let strongest = group_edges
                .iter()
                .filter_map(|edge| strongest(&edge.evidence))
                .reduce(|best, e| if e.confidence > best.confidence { e } else { best })
                .cloned();

            // Every group has at least one edge, so this always holds.
            if let Some(strongest) = strongest {
                groups.push(DuplicateGroup {
                    id: n + 1,
                    member_keys: members.iter().map(|&p| canonical[p].0.clone()).collect(),
                    members: members.iter().map(|&p| canonical[p].1).collect(),
                    strongest,
                    weakest_edge,
                    edges: group_edges,
                });
            }
        }

        debug!(
            entries = entries.len(),
            skipped = skipped.len(),
            evidence = evidence.len(),
            groups = groups.len(),
            "resolved duplicate groups"
        );

        Resolution {
            groups,
            evidence,
            skipped,
        }
    }
}

#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    /// Returns `false` when both were already in the same set.
    fn union(&mut self, left: usize, right: usize) -> bool {
        let left_root = self.find(left);
        let right_root = self.find(right);

        if left_root == right_root {
            return false;
        }

        let left_rank = self.rank[left_root];
        let right_rank = self.rank[right_root];

        if left_rank < right_rank {
            self.parent[left_root] = right_root;
        } else if left_rank > right_rank {
            self.parent[right_root] = left_root;
        } else {
            self.parent[right_root] = left_root;
            self.rank[left_root] += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source_id: i64, url: &str, title: &str) -> CatalogEntry {
        CatalogEntry::new(source_id, url, title)
    }

    #[test]
    fn identity_match_forms_single_group() {
        let entries = vec![
            entry(5, "manga/1", "One Piece"),
            entry(5, "manga/1", "one piece"),
            entry(5, "manga/2", "Naruto"),
        ];
        let resolution = DuplicateResolver::default().resolve(&entries);

        assert_eq!(resolution.groups.len(), 1);
        let group = &resolution.groups[0];
        assert_eq!(group.id, 1);
        assert_eq!(group.members, vec![0, 1]);
        assert_eq!(group.strongest.kind, SignalKind::Identity);
        assert_eq!(group.weakest_edge, 1.0);
    }

    #[test]
    fn transitive_chain_joins_and_reports_weakest_edge() {
        let mut a = entry(1, "a", "Shingeki no Kyojin");
        a.external_tracking_id = Some(53390);
        let mut b = entry(1, "b", "Attack on Titan");
        b.external_tracking_id = Some(53390);
        let c = entry(1, "c", "Attack on Titan");

        let resolution = DuplicateResolver::default().resolve(&[a, b, c]);
        assert_eq!(resolution.groups.len(), 1);
        let group = &resolution.groups[0];
        assert_eq!(group.members, vec![0, 1, 2]);
        assert_eq!(group.weakest_edge, 0.9);
        assert_eq!(group.strongest.kind, SignalKind::ExactTitle);
    }

    #[test]
    fn weakest_edge_ignores_redundant_links() {
        struct Fixed;
        impl TitleSimilarity for Fixed {
            fn similarity(&self, a: &str, b: &str) -> f64 {
                if a == b { 1.0 } else { 0.86 }
            }
        }

        // a-b exact (0.95), a-c tracking (0.9), b-c fuzzy only (0.86, redundant).
        let mut a = entry(1, "a", "Monster");
        a.external_tracking_id = Some(7);
        let b = entry(1, "b", "Monster");
        let mut c = entry(1, "c", "Pluto");
        c.external_tracking_id = Some(7);

        let options = ReconcileOptions::default().with_fuzzy_threshold(0.8);
        let resolution = DuplicateResolver::new(&options)
            .with_similarity(Fixed)
            .resolve(&[a, b, c]);

        let group = &resolution.groups[0];
        assert_eq!(group.members.len(), 3);
        assert_eq!(group.edges.len(), 3);
        assert_eq!(group.weakest_edge, 0.9);
    }

    #[test]
    fn group_membership_ignores_input_order() {
        let forward = vec![
            entry(2, "x", "Vinland Saga"),
            entry(1, "y", "Vinland Saga"),
            entry(3, "z", "Blame!"),
            entry(1, "w", "Blame"),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let resolver = DuplicateResolver::default();
        let keys = |entries: &[CatalogEntry]| {
            resolver
                .resolve(entries)
                .groups
                .into_iter()
                .map(|g| (g.id, g.member_keys))
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&forward), keys(&backward));
        assert_eq!(keys(&forward)[0].1[0], IdentityKey::new(1, "w"));
    }

    #[test]
    fn below_min_confidence_pairs_only_log_evidence() {
        let mut a = entry(1, "a", "Dorohedoro");
        let mut b = entry(1, "b", "Dungeon Meshi");
        a.external_tracking_id = Some(1);
        b.external_tracking_id = Some(1);

        let options = ReconcileOptions::default().with_min_confidence(0.95);
        let resolution = DuplicateResolver::new(&options).resolve(&[a, b]);
        assert!(resolution.groups.is_empty());
        assert_eq!(resolution.evidence.len(), 1);
        assert_eq!(resolution.evidence[0].kind, SignalKind::ExternalTracking);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let entries = vec![
            entry(1, "a", "   "),
            entry(1, "", "Naruto"),
            entry(1, "c", "Naruto"),
            entry(-4, "d", "Naruto"),
        ];
        let resolution = DuplicateResolver::default().resolve(&entries);
        assert!(resolution.groups.is_empty());
        let skipped: Vec<usize> = resolution.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![0, 1, 3]);
        assert!(matches!(
            resolution.skipped[0].error,
            ReconError::InvalidRecord { .. }
        ));
    }

    #[test]
    fn unrelated_entries_form_no_groups() {
        let entries = vec![
            entry(1, "a", "Attack on Titan"),
            entry(1, "b", "Attack on Titan: Final Season"),
        ];
        let resolution = DuplicateResolver::default().resolve(&entries);
        assert!(resolution.groups.is_empty());
        assert!(resolution.evidence.is_empty());
    }

    #[test]
    fn disjoint_set_union_reports_merges() {
        let mut dsu = DisjointSet::new(3);
        assert!(dsu.union(0, 1));
        assert!(!dsu.union(1, 0));
        assert!(dsu.union(2, 1));
        assert_eq!(dsu.find(0), dsu.find(2));
    }
}
