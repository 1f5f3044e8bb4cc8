//! Duplicate detection and reconciliation of catalog entries.

pub mod anilist;
pub mod error;
pub mod log;
pub mod merge;
pub mod normalize;
pub mod options;
pub mod policy;
pub mod report;
pub mod resolver;
pub mod signals;
pub mod similarity;

pub use error::{ReconError, Result};
pub use log::{DecisionLog, GroupOverride, LogEvent, LogSummary};
pub use merge::{FieldOverride, MergeStats};
pub use normalize::normalize_title;
pub use options::ReconcileOptions;
pub use policy::{
    CleanupMode, MergeMode, ReconcileMode, Reconciler, Reconciliation, reconcile,
    reconcile_cleanup, reconcile_merge,
};
pub use report::{ReportOptions, render_markdown};
pub use resolver::{DuplicateGroup, DuplicateResolver, Resolution};
pub use signals::{MatchEvidence, SignalExtractor, SignalKind};
pub use similarity::{JaroWinkler, NormalizedLevenshtein, TitleSimilarity};
