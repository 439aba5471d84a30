//! Brute-force in-memory [`VectorStore`], for unit and end-to-end tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HtmError, Result};

use super::{Predicate, SearchHit, StoredRow, VectorStore};

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// In-memory store backed by a `Vec<StoredRow>` behind a mutex, scanning
/// linearly for both filter and vector-distance queries.
pub struct InMemoryVectorStore {
    dim: Mutex<usize>,
    rows: Mutex<Vec<StoredRow>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim: Mutex::new(dim),
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot all rows currently stored, for test assertions.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_table(&self, dim: usize) -> Result<()> {
        *self.dim.lock().unwrap() = dim;
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn open_or_create(_path: &str, dim: usize) -> Result<Self> {
        Ok(Self::new(dim))
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        predicate: Option<Predicate>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter(|r| predicate.as_ref().map_or(true, |p| p.matches(r)))
            .map(|r| SearchHit {
                row: r.clone(),
                distance: l2_distance(query_vec, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn query(&self, predicate: Predicate, limit: Option<usize>) -> Result<Vec<StoredRow>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<StoredRow> = rows.iter().filter(|r| predicate.matches(r)).cloned().collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn upsert_batch(&self, batch: Vec<StoredRow>) -> Result<()> {
        let dim = *self.dim.lock().unwrap();
        for row in &batch {
            if dim != 0 && row.vector.len() != dim {
                return Err(HtmError::DimensionMismatch {
                    id: row.id.clone(),
                    expected: dim,
                    actual: row.vector.len(),
                });
            }
        }
        let mut rows = self.rows.lock().unwrap();
        let incoming_ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        rows.retain(|r| !incoming_ids.contains(&r.id.as_str()));
        rows.extend(batch);
        Ok(())
    }

    async fn delete_where(&self, predicate: Predicate) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !predicate.matches(r));
        Ok(before - rows.len())
    }
}
