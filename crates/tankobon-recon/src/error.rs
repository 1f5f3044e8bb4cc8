use tankobon_core::IdentityKey;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconError {
    #[error("invalid record {key}: {reason}")]
    InvalidRecord { key: IdentityKey, reason: String },

    #[error("ambiguous duplicate group {group}: {reason}")]
    AmbiguousGroup { group: usize, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;
