use thiserror::Error;

use crate::conversation::ConversationId;
use crate::memory::InternalId;

/// Errors from repository operations (used by trait definitions in mneme-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding provider returned no vectors")]
    EmptyResponse,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from a vector index partition or the index registry.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: partition has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no index partition for conversation {0}")]
    NotFound(ConversationId),

    #[error("id {0} is already present in the partition")]
    DuplicateId(InternalId),

    #[error("vector must have at least one dimension")]
    EmptyVector,

    #[error("index codec error: {0}")]
    Codec(String),
}

/// Errors from the blob storage collaborator.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob io error: {0}")]
    Io(String),

    #[error("invalid blob path: {0}")]
    InvalidPath(String),
}

/// Errors from snapshot export/upload and download/import.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot export failed: {0}")]
    Export(String),

    #[error("snapshot upload failed: {0}")]
    Upload(String),

    #[error("snapshot download failed: {0}")]
    Download(String),

    #[error("snapshot import failed: {0}")]
    Import(String),

    #[error("snapshot bundle is missing '{0}'")]
    MissingArtifact(String),

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot cancelled")]
    Cancelled,
}

/// Errors surfaced at the memory engine boundary.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conversation {0} does not exist")]
    ConversationNotFound(ConversationId),

    #[error("conversation {0} has never been indexed")]
    ConversationNotIndexed(ConversationId),

    #[error("embedding dimension {actual} does not match partition dimension {expected} for conversation {conversation_id}")]
    DimensionMismatch {
        conversation_id: ConversationId,
        expected: usize,
        actual: usize,
    },

    #[error("embedding failed ({context}): {source}")]
    Embedding {
        context: String,
        source: EmbeddingError,
    },

    #[error("storage failed ({context}): {source}")]
    Storage {
        context: String,
        source: RepositoryError,
    },

    #[error("index operation failed ({context}): {source}")]
    Index { context: String, source: IndexError },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("operation cancelled")]
    Cancelled,
}

impl MemoryError {
    pub fn embedding(context: impl Into<String>, source: EmbeddingError) -> Self {
        Self::Embedding {
            context: context.into(),
            source,
        }
    }

    pub fn storage(context: impl Into<String>, source: RepositoryError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Map an index failure for `conversation_id`, lifting the kinds callers
    /// branch on (missing partition, dimension mismatch) into their own variants.
    pub fn index(
        conversation_id: ConversationId,
        context: impl Into<String>,
        source: IndexError,
    ) -> Self {
        match source {
            IndexError::NotFound(id) => Self::ConversationNotIndexed(id),
            IndexError::DimensionMismatch { expected, actual } => Self::DimensionMismatch {
                conversation_id,
                expected,
                actual,
            },
            other => Self::Index {
                context: context.into(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_index_not_found_becomes_not_indexed() {
        let id = ConversationId::new();
        let err = MemoryError::index(id, "search", IndexError::NotFound(id));
        assert!(matches!(err, MemoryError::ConversationNotIndexed(c) if c == id));
    }

    #[test]
    fn test_dimension_mismatch_keeps_conversation() {
        let id = ConversationId::new();
        let err = MemoryError::index(
            id,
            "add",
            IndexError::DimensionMismatch {
                expected: 4,
                actual: 3,
            },
        );
        match err {
            MemoryError::DimensionMismatch {
                conversation_id,
                expected,
                actual,
            } => {
                assert_eq!(conversation_id, id);
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_storage_error_carries_context() {
        let err = MemoryError::storage(
            "insert memory for conversation abc",
            RepositoryError::Conflict("duplicate".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("insert memory for conversation abc"));
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn test_snapshot_error_is_transparent() {
        let err: MemoryError = SnapshotError::UnsupportedVersion(9).into();
        assert_eq!(err.to_string(), "unsupported snapshot format version 9");
    }
}
