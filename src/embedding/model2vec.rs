//! Local static-embedding model backed by `model2vec-rs`.

use model2vec_rs::model::StaticModel;

use crate::error::HtmError;
use crate::error::Result;

use super::{l2_normalize, Embedder};

/// Wraps a `model2vec-rs` static model behind the [`Embedder`] contract.
pub struct Model2VecEmbedder {
    model: StaticModel,
}

impl Model2VecEmbedder {
    /// Load `model_id` (a HuggingFace Hub repo id or local path).
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let model = StaticModel::from_pretrained(model_id, None, None, None)
            .map_err(|e| HtmError::ModelUnavailable(e.to_string()))?;
        Ok(Self { model })
    }
}

impl Embedder for Model2VecEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = self.model.encode_single(text);
        l2_normalize(&mut vector);
        Ok(vector)
    }
}
