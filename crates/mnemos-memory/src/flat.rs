//! Exhaustive inner-product vector store.

use std::cmp::Ordering;

/// Contiguous row-major vectors, one row per slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Wrap raw row-major data. `data.len()` must be a multiple of `dimension`.
    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> Option<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return None;
        }
        Some(Self { dimension, data })
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len() / self.dimension.max(1)
    }

    pub(crate) fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// Append one vector and return its slot. Callers check the dimension.
    pub(crate) fn push(&mut self, vector: &[f32]) -> usize {
        debug_assert_eq!(vector.len(), self.dimension);
        let slot = self.len();
        self.data.extend_from_slice(vector);
        slot
    }

    pub(crate) fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Best `limit` slots by inner product, highest first; equal scores keep slot order.
    pub(crate) fn search(&self, query: &[f32], limit: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, row)| (slot, dot(query, row)))
            .collect();
        let limit = limit.min(scored.len());
        if limit == 0 {
            return Vec::new();
        }
        if limit < scored.len() {
            scored.select_nth_unstable_by(limit - 1, rank_order);
            scored.truncate(limit);
        }
        scored.sort_by(rank_order);
        scored
    }
}

fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
