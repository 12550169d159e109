//! Watchable error types

use thiserror::Error;

use crate::tree::TreeError;

/// Errors that can occur when defining, addressing or updating watchables
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WatchError {
    /// The value was rejected by the watchable's kind; the prior value is kept
    #[error("Validation error for {path}: {reason}")]
    Validation { path: String, reason: String },

    /// Path resolution or tree editing failed
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The node exists but has no watchable attached
    #[error("Not a watchable: {0}")]
    NotWatchable(String),

    /// Kind constraints are inconsistent (e.g. min > max, no choices)
    #[error("Invalid definition for {path}: {reason}")]
    InvalidDefinition { path: String, reason: String },
}

impl WatchError {
    /// True for errors caused by addressing something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WatchError::Tree(TreeError::NotFound(_)) | WatchError::NotWatchable(_)
        )
    }
}

/// Result type alias for watchable operations
pub type WatchResult<T> = Result<T, WatchError>;
