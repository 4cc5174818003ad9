use thiserror::Error;

pub type Result<T> = std::result::Result<T, LineageError>;

/// Errors produced while building or encoding a lineage graph.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Failed to serialize lineage: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Field lineage of '{field}' exceeds the maximum depth of {limit}")]
    GraphTooDeep { field: String, limit: usize },

    #[error("Table lineage exceeds the maximum of {limit} nodes")]
    GraphTooLarge { limit: usize },

    #[error("Invalid catalog snapshot: {0}")]
    InvalidSnapshot(String),
}

impl LineageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LineageError::TableNotFound(_) | LineageError::FieldNotFound(_)
        )
    }

    /// True for errors raised because a traversal hit a configured bound.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(
            self,
            LineageError::GraphTooDeep { .. } | LineageError::GraphTooLarge { .. }
        )
    }
}
