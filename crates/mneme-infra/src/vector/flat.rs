//! Exact brute-force index over squared Euclidean distance.
//!
//! Vectors are stored row-major in one contiguous buffer. Search scans every
//! entry, so results are exact; ties are broken by ascending id so repeated
//! queries (and a reloaded partition) rank identically.

use std::collections::HashSet;

use mneme_core::memory::index::VectorIndex;
use mneme_types::error::IndexError;
use mneme_types::memory::{InternalId, SearchHit};

use crate::columnar::codec;

pub struct FlatIndex {
    dimension: usize,
    ids: Vec<InternalId>,
    vectors: Vec<f32>,
    present: HashSet<InternalId>,
}

impl FlatIndex {
    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn rank(a: &SearchHit, b: &SearchHit) -> std::cmp::Ordering {
    a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id))
}

impl VectorIndex for FlatIndex {
    fn with_dimension(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }
        Ok(Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            present: HashSet::new(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn contains(&self, id: InternalId) -> bool {
        self.present.contains(&id)
    }

    fn ids(&self) -> Vec<InternalId> {
        let mut ids = self.ids.clone();
        ids.sort_unstable();
        ids
    }

    fn add(&mut self, id: InternalId, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector.len())?;
        if self.present.contains(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        self.present.insert(id);
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimension(query.len())?;
        if top_k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .ids
            .iter()
            .enumerate()
            .map(|(position, id)| SearchHit {
                id: *id,
                distance: squared_l2(self.row(position), query),
            })
            .collect();

        if top_k < hits.len() {
            hits.select_nth_unstable_by(top_k - 1, rank);
            hits.truncate(top_k);
        }
        hits.sort_by(rank);
        Ok(hits)
    }

    fn export(&self) -> Result<Vec<u8>, IndexError> {
        codec::encode_vectors(self.dimension, &self.ids, &self.vectors)
            .map_err(|e| IndexError::Codec(e.to_string()))
    }

    fn load(bytes: &[u8]) -> Result<Self, IndexError> {
        let (dimension, ids, vectors) =
            codec::decode_vectors(bytes).map_err(|e| IndexError::Codec(e.to_string()))?;
        let mut index = Self::with_dimension(dimension)?;
        for (position, id) in ids.iter().enumerate() {
            let start = position * dimension;
            index.add(*id, &vectors[start..start + dimension])?;
        }
        Ok(index)
    }
}
