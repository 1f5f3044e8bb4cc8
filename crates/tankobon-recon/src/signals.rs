use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tankobon_core::{CatalogEntry, IdentityKey};

use crate::normalize::normalize_title;
use crate::options::DEFAULT_FUZZY_THRESHOLD;
use crate::similarity::{NormalizedLevenshtein, TitleSimilarity};

pub const IDENTITY_CONFIDENCE: f64 = 1.0;
pub const EXACT_TITLE_CONFIDENCE: f64 = 0.95;
pub const EXTERNAL_TRACKING_CONFIDENCE: f64 = 0.9;
pub const ALTERNATE_TITLE_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Identity,
    ExactTitle,
    AlternateTitle,
    ExternalTracking,
    FuzzyTitle,
}

impl SignalKind {
    pub fn is_title_based(self) -> bool {
        matches!(
            self,
            Self::ExactTitle | Self::AlternateTitle | Self::FuzzyTitle
        )
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::ExactTitle => write!(f, "exact_title"),
            Self::AlternateTitle => write!(f, "alternate_title"),
            Self::ExternalTracking => write!(f, "external_tracking"),
            Self::FuzzyTitle => write!(f, "fuzzy_title"),
        }
    }
}

/// One signal firing for a pair of entries. `left <= right` always holds,
/// so the same pair yields the same evidence in either argument order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub kind: SignalKind,
    pub left: IdentityKey,
    pub right: IdentityKey,
    pub confidence: f64,
}

impl MatchEvidence {
    fn new(kind: SignalKind, a: &IdentityKey, b: &IdentityKey, confidence: f64) -> Self {
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        Self {
            kind,
            left: left.clone(),
            right: right.clone(),
            confidence,
        }
    }
}

/// Normalized titles of one entry, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFingerprint {
    pub title: String,
    pub alternates: BTreeSet<String>,
}

impl TitleFingerprint {
    pub fn of(entry: &CatalogEntry) -> Self {
        let alternates = entry
            .alternate_titles
            .iter()
            .map(|t| normalize_title(t))
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            title: normalize_title(&entry.title),
            alternates,
        }
    }
}

/// Runs every pairwise signal. Nothing short-circuits: the decision log
/// wants the full evidence for each pair.
pub struct SignalExtractor {
    fuzzy_threshold: f64,
    similarity: Box<dyn TitleSimilarity>,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl std::fmt::Debug for SignalExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalExtractor")
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .finish_non_exhaustive()
    }
}

impl SignalExtractor {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            fuzzy_threshold,
            similarity: Box::new(NormalizedLevenshtein),
        }
    }

    pub fn with_similarity(mut self, similarity: impl TitleSimilarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn extract(&self, a: &CatalogEntry, b: &CatalogEntry) -> Vec<MatchEvidence> {
        self.extract_prepared(a, &TitleFingerprint::of(a), b, &TitleFingerprint::of(b))
    }

    /// Same as [`extract`](Self::extract) with fingerprints supplied by the caller.
    pub fn extract_prepared(
        &self,
        a: &CatalogEntry,
        a_titles: &TitleFingerprint,
        b: &CatalogEntry,
        b_titles: &TitleFingerprint,
    ) -> Vec<MatchEvidence> {
        let a_key = a.identity_key();
        let b_key = b.identity_key();
        let mut evidence = Vec::new();

        if a_key == b_key {
            evidence.push(MatchEvidence::new(
                SignalKind::Identity,
                &a_key,
                &b_key,
                IDENTITY_CONFIDENCE,
            ));
        }

        let both_titled = !a_titles.title.is_empty() && !b_titles.title.is_empty();

        if both_titled && a_titles.title == b_titles.title {
            evidence.push(MatchEvidence::new(
                SignalKind::ExactTitle,
                &a_key,
                &b_key,
                EXACT_TITLE_CONFIDENCE,
            ));
        }

        if both_titled
            && (b_titles.alternates.contains(&a_titles.title)
                || a_titles.alternates.contains(&b_titles.title))
        {
            evidence.push(MatchEvidence::new(
                SignalKind::AlternateTitle,
                &a_key,
                &b_key,
                ALTERNATE_TITLE_CONFIDENCE,
            ));
        }

        if let (Some(left), Some(right)) = (a.external_tracking_id, b.external_tracking_id)
            && left == right
        {
            evidence.push(MatchEvidence::new(
                SignalKind::ExternalTracking,
                &a_key,
                &b_key,
                EXTERNAL_TRACKING_CONFIDENCE,
            ));
        }

        // Approximate matches only; equal titles are the exact-title signal's job.
        if both_titled && a_titles.title != b_titles.title {
            let score = self.similarity.similarity(&a_titles.title, &b_titles.title);
            if score >= self.fuzzy_threshold {
                evidence.push(MatchEvidence::new(
                    SignalKind::FuzzyTitle,
                    &a_key,
                    &b_key,
                    score,
                ));
            }
        }

        evidence
    }
}

/// Strongest evidence of a pair; ties go to the earlier signal kind.
pub fn strongest(evidence: &[MatchEvidence]) -> Option<&MatchEvidence> {
    evidence.iter().reduce(|best, e| {
        if e.confidence > best.confidence {
            e
        } else {
            best
        }
    })
}
