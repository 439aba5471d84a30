//! Bilingual-file ingestion pipeline: file → ingestor → JSONL temp file →
//! batch importer → embedder → vector store.

pub mod importer;
pub mod progress;
pub mod tmx;
pub mod xliff;

use serde::{Deserialize, Serialize};

use crate::model::{canonical_id, Entry, Metadata};

/// One entry candidate emitted by an ingestor, before embedding.
///
/// Written one-per-line as JSONL. Nested metadata stays a nested JSON object
/// here, not pre-flattened — the batch importer flattens it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: String,
    pub language: String,
    pub pure_text: String,
    pub element: String,
    pub file_id: String,
    pub original: String,
    pub unit_id: String,
    pub segment_index: u32,
    pub segment_count: u32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl PendingEntry {
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        original: impl Into<String>,
        unit_id: impl Into<String>,
        language: impl Into<String>,
        segment_index: u32,
        segment_count: u32,
        pure_text: impl Into<String>,
        element: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Self {
        let file_id = file_id.into();
        let unit_id = unit_id.into();
        let language = language.into();
        let id = canonical_id(&file_id, &unit_id, segment_index, &language);
        Self {
            id,
            language,
            pure_text: pure_text.into(),
            element: element.into(),
            file_id,
            original: original.into(),
            unit_id,
            segment_index,
            segment_count,
            metadata,
        }
    }

    /// Promote to a full [`Entry`] once an embedding vector is available.
    #[must_use]
    pub fn into_entry(self, vector: Vec<f32>) -> Entry {
        Entry {
            id: self.id,
            language: self.language,
            pure_text: self.pure_text,
            element: self.element,
            file_id: self.file_id,
            original: self.original,
            unit_id: self.unit_id,
            segment_index: self.segment_index,
            segment_count: self.segment_count,
            vector,
            metadata: self.metadata,
        }
    }
}

/// Outcome of running an ingestor: where the JSONL landed and how many
/// entries it holds, handed off to [`importer::run_import`].
#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub jsonl_path: std::path::PathBuf,
    pub entry_count: usize,
}
