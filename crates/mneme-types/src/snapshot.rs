//! Snapshot bundle layout and reports.
//!
//! A bundle is a directory-shaped set of blobs under one prefix:
//!
//! ```text
//! {prefix}/manifest.json
//! {prefix}/metadata/conversations.arrow
//! {prefix}/metadata/memories.arrow
//! {prefix}/index/{conversation_id}.index
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;
use crate::memory::InternalId;

/// Current bundle format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONVERSATIONS_FILE: &str = "metadata/conversations.arrow";
pub const MEMORIES_FILE: &str = "metadata/memories.arrow";
pub const INDEX_DIR: &str = "index";
pub const INDEX_EXTENSION: &str = "index";

/// Relative bundle path of a partition's index file.
pub fn index_file_name(conversation_id: &ConversationId) -> String {
    format!("{INDEX_DIR}/{conversation_id}.{INDEX_EXTENSION}")
}

/// Parse a relative bundle path back to the partition it names.
///
/// Returns `None` for anything that is not `index/<uuid>.index`.
pub fn parse_index_file_name(name: &str) -> Option<ConversationId> {
    let stem = name
        .strip_prefix(INDEX_DIR)?
        .strip_prefix('/')?
        .strip_suffix(INDEX_EXTENSION)?
        .strip_suffix('.')?;
    stem.parse().ok()
}

/// Describes a bundle. Written last on store, read first on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub conversation_count: u64,
    pub memory_count: u64,
    /// Partitions with an index file in this bundle.
    pub partitions: Vec<ConversationId>,
}

/// Which stores a load rehydrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreMode {
    /// Replace both the metadata tables and every index partition.
    Full,
    /// Replace only the index partitions, keeping local metadata rows.
    IndexOnly,
}

/// Summary of a completed snapshot store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub manifest: SnapshotManifest,
    pub bytes_written: u64,
}

/// Consistency findings for one partition after a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionReport {
    pub vectors: usize,
    /// Vector ids with no metadata row. Dropped at retrieval time.
    pub orphan_vectors: Vec<InternalId>,
    /// Metadata rows with no vector. Recency-only until re-indexed.
    pub unindexed_rows: Vec<InternalId>,
}

/// Outcome of a snapshot load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// No bundle exists at the configured prefix.
    NoSnapshot,
    Restored(LoadReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub mode: RestoreMode,
    pub manifest: SnapshotManifest,
    pub partitions: Vec<(ConversationId, PartitionReport)>,
    /// Conversations that have memories but no index file in the bundle.
    pub recency_only: Vec<ConversationId>,
}
