//! Error type shared across the workspace.

use crate::types::Category;

/// Failures surfaced by compilation, synchronization and persistence.
///
/// None of these are fatal to the blocker as a whole: callers keep serving
/// the last rule set that was installed successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleSetError {
    #[error("rule id range for '{category}' exhausted after {width} rules")]
    RangeExhausted { category: Category, width: u32 },
    #[error("failed to fetch filter list '{list}': {reason}")]
    FetchFailed { list: String, reason: String },
    #[error(
        "backend sync failed after {applied_removals} removals and {applied_additions} additions: {reason}"
    )]
    BackendSyncFailed {
        reason: String,
        applied_removals: usize,
        applied_additions: usize,
    },
    #[error("rule set of {wanted} rules exceeds the backend limit of {limit}")]
    BackendCapacity { wanted: usize, limit: usize },
    #[error("invalid rule id ranges: {0}")]
    InvalidIdRanges(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, RuleSetError>;
