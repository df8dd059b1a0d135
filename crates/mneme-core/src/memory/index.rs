//! Vector index capability trait.
//!
//! One index instance holds one conversation partition. The concrete
//! nearest-neighbor backend (brute force, tree based, a native library) is
//! swappable behind this trait without touching the registry or the engine.
//! Implementations live in mneme-infra (e.g., `FlatIndex`).

use mneme_types::error::IndexError;
use mneme_types::memory::{InternalId, SearchHit};

/// A single-partition nearest-neighbor structure keyed by internal id.
///
/// Not required to be safe for concurrent mutation; the registry serializes
/// writers per partition.
pub trait VectorIndex: Send + Sync + Sized {
    /// Create an empty index whose dimension is fixed to `dimension`.
    fn with_dimension(dimension: usize) -> Result<Self, IndexError>;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: InternalId) -> bool;

    /// Every id in the partition, ascending.
    fn ids(&self) -> Vec<InternalId>;

    /// Add a vector under `id`.
    ///
    /// Fails with `DimensionMismatch` when `vector.len()` differs from the
    /// partition dimension and with `DuplicateId` when `id` is already present.
    /// A failed add leaves the partition unchanged.
    fn add(&mut self, id: InternalId, vector: &[f32]) -> Result<(), IndexError>;

    /// The `top_k` nearest entries by ascending distance.
    ///
    /// Returns `min(len, top_k)` hits; never returns an id that was not added.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Serialize the partition to an opaque byte blob.
    fn export(&self) -> Result<Vec<u8>, IndexError>;

    /// Rebuild a partition from `export` output with identical query behavior.
    fn load(bytes: &[u8]) -> Result<Self, IndexError>;
}
