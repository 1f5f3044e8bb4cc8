//! Structured record of every decision a reconciliation run makes.

use serde::{Deserialize, Serialize};
use tankobon_core::IdentityKey;

use crate::merge::{FieldOverride, MergeStats};
use crate::policy::ReconcileMode;
use crate::signals::MatchEvidence;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    EvidenceFound {
        evidence: MatchEvidence,
    },
    Skipped {
        key: IdentityKey,
        reason: String,
    },
    GroupFormed {
        group: usize,
        members: Vec<IdentityKey>,
        weakest_edge: f64,
        strongest: MatchEvidence,
    },
    GroupResolved {
        group: usize,
        mode: ReconcileMode,
        survivors: Vec<IdentityKey>,
        absorbed: Vec<IdentityKey>,
        overrides: Vec<GroupOverride>,
        #[serde(flatten)]
        stats: MergeStats,
    },
    GroupRejected {
        group: usize,
        members: Vec<IdentityKey>,
        survivors: Vec<IdentityKey>,
        reason: String,
    },
}

/// A field override attributed to the survivor it landed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOverride {
    pub survivor: IdentityKey,
    #[serde(flatten)]
    pub change: FieldOverride,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub entries_in: usize,
    pub entries_out: usize,
    pub evidence: usize,
    pub skipped: usize,
    pub groups_formed: usize,
    pub groups_resolved: usize,
    pub groups_rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub mode: ReconcileMode,
    pub summary: LogSummary,
    pub events: Vec<LogEvent>,
}

impl DecisionLog {
    pub fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            summary: LogSummary::default(),
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: LogEvent) {
        match &event {
            LogEvent::EvidenceFound { .. } => self.summary.evidence += 1,
            LogEvent::Skipped { .. } => self.summary.skipped += 1,
            LogEvent::GroupFormed { .. } => self.summary.groups_formed += 1,
            LogEvent::GroupResolved { .. } => self.summary.groups_resolved += 1,
            LogEvent::GroupRejected { .. } => self.summary.groups_rejected += 1,
        }
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.events.iter()
    }

    pub fn evidence(&self) -> impl Iterator<Item = &MatchEvidence> {
        self.events.iter().filter_map(|e| match e {
            LogEvent::EvidenceFound { evidence } => Some(evidence),
            _ => None,
        })
    }

    pub fn rejected_groups(&self) -> impl Iterator<Item = usize> + '_ {
        self.events.iter().filter_map(|e| match e {
            LogEvent::GroupRejected { group, .. } => Some(*group),
            _ => None,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MergeMode;
    use crate::signals::SignalKind;

    fn evidence() -> MatchEvidence {
        MatchEvidence {
            kind: SignalKind::ExactTitle,
            left: IdentityKey::new(1, "a"),
            right: IdentityKey::new(2, "b"),
            confidence: 0.95,
        }
    }

    #[test]
    fn push_updates_summary_counts() {
        let mut log = DecisionLog::new(ReconcileMode::Merge(MergeMode::Replace));
        log.push(LogEvent::EvidenceFound {
            evidence: evidence(),
        });
        log.push(LogEvent::GroupRejected {
            group: 1,
            members: vec![IdentityKey::new(1, "a"), IdentityKey::new(2, "b")],
            survivors: vec![IdentityKey::new(1, "a"), IdentityKey::new(2, "b")],
            reason: "uncorroborated".to_string(),
        });

        assert_eq!(log.summary.evidence, 1);
        assert_eq!(log.summary.groups_rejected, 1);
        assert_eq!(log.evidence().count(), 1);
        assert_eq!(log.rejected_groups().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = LogEvent::EvidenceFound {
            evidence: evidence(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "evidence_found");
        assert_eq!(json["evidence"]["kind"], "exact_title");
        assert_eq!(json["evidence"]["left"]["source_id"], 1);

        let back: LogEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn resolved_event_flattens_stats() {
        let event = LogEvent::GroupResolved {
            group: 2,
            mode: ReconcileMode::Merge(MergeMode::KeepFirst),
            survivors: vec![IdentityKey::new(1, "a")],
            absorbed: vec![IdentityKey::new(2, "b")],
            overrides: Vec::new(),
            stats: MergeStats {
                chapters_added: 3,
                history_added: 1,
                tracking_added: 0,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "group_resolved");
        assert_eq!(json["chapters_added"], 3);
        assert_eq!(json["mode"]["workflow"], "merge");
        assert_eq!(json["mode"]["mode"], "keep_first");
    }
}
