//! Tree error types

use thiserror::Error;

/// Errors raised by tree navigation and editing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A path segment or node id does not exist
    #[error("Node not found: {0}")]
    NotFound(String),

    /// The parent already has a child with this name
    #[error("Node {parent} already has a child named '{name}'")]
    DuplicateName { parent: String, name: String },

    /// Names must be non-empty and may not contain '/' or be '.' / '..'
    #[error("Invalid node name: '{0}'")]
    InvalidName(String),

    /// Malformed slice expression or zero step
    #[error("Invalid slice: {0}")]
    InvalidSlice(String),
}

/// Result type alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreeError::DuplicateName {
            parent: "/app".to_string(),
            name: "counter".to_string(),
        };
        assert_eq!(err.to_string(), "Node /app already has a child named 'counter'");
        assert_eq!(
            TreeError::NotFound("/x".to_string()).to_string(),
            "Node not found: /x"
        );
    }
}
