//! Vector-store adapter contract.
//!
//! The flattened row representation differs from [`crate::model::Entry`]:
//! nested `notes`, `properties`, and `segment` sub-records serialize to JSON
//! strings at this layer so they fit a columnar backend's scalar columns.

pub mod lance;
pub mod memory;

use crate::error::Result;
use crate::model::{Entry, Metadata, SegmentProvenance, XliffState};

/// One stored row: [`Entry`] with its metadata flattened to scalar/JSON-string
/// columns, as required for a columnar backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: String,
    pub language: String,
    pub pure_text: String,
    pub element: String,
    pub file_id: String,
    pub original: String,
    pub unit_id: String,
    pub segment_index: u32,
    pub segment_count: u32,
    pub vector: Vec<f32>,

    pub state: Option<String>,
    pub sub_state: Option<String>,
    pub quality: Option<u8>,
    pub creation_date: Option<String>,
    pub creation_id: Option<String>,
    pub change_date: Option<String>,
    pub change_id: Option<String>,
    pub creation_tool: Option<String>,
    pub creation_tool_version: Option<String>,
    pub context: Option<String>,
    pub last_usage_date: Option<String>,
    pub usage_count: Option<u64>,
    /// JSON array of strings, or `None` when there are no notes.
    pub notes_json: Option<String>,
    /// JSON object `{key: value}`, or `None` when there are no properties.
    pub properties_json: Option<String>,
    /// JSON-encoded [`SegmentProvenance`], or `None`.
    pub segment_json: Option<String>,
}

impl StoredRow {
    /// Flatten an [`Entry`] into its storage representation.
    #[must_use]
    pub fn from_entry(entry: &Entry) -> Self {
        let md = entry.metadata.clone().unwrap_or_default();
        let notes_json = if md.notes.is_empty() {
            None
        } else {
            serde_json::to_string(&md.notes).ok()
        };
        let properties_json = if md.properties.is_empty() {
            None
        } else {
            serde_json::to_string(&md.properties).ok()
        };
        let segment_json = md.segment.as_ref().and_then(|s| serde_json::to_string(s).ok());

        Self {
            id: entry.id.clone(),
            language: entry.language.clone(),
            pure_text: entry.pure_text.clone(),
            element: entry.element.clone(),
            file_id: entry.file_id.clone(),
            original: entry.original.clone(),
            unit_id: entry.unit_id.clone(),
            segment_index: entry.segment_index,
            segment_count: entry.segment_count,
            vector: entry.vector.clone(),
            state: md.state.map(|s| s.as_str().to_string()),
            sub_state: md.sub_state,
            quality: md.quality,
            creation_date: md.creation_date,
            creation_id: md.creation_id,
            change_date: md.change_date,
            change_id: md.change_id,
            creation_tool: md.creation_tool,
            creation_tool_version: md.creation_tool_version,
            context: md.context,
            last_usage_date: md.last_usage_date,
            usage_count: md.usage_count,
            notes_json,
            properties_json,
            segment_json,
        }
    }

    /// Hydrate a [`StoredRow`] back into an [`Entry`].
    #[must_use]
    pub fn to_entry(&self) -> Entry {
        let notes = self
            .notes_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .unwrap_or_default();
        let properties = self
            .properties_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let segment = self
            .segment_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<SegmentProvenance>(s).ok());

        let metadata = Metadata {
            state: self.state.as_deref().and_then(XliffState::parse),
            sub_state: self.sub_state.clone(),
            quality: self.quality,
            creation_date: self.creation_date.clone(),
            creation_id: self.creation_id.clone(),
            change_date: self.change_date.clone(),
            change_id: self.change_id.clone(),
            creation_tool: self.creation_tool.clone(),
            creation_tool_version: self.creation_tool_version.clone(),
            context: self.context.clone(),
            last_usage_date: self.last_usage_date.clone(),
            notes,
            usage_count: self.usage_count,
            properties,
            segment,
        };

        let metadata = if metadata == Metadata::default() {
            None
        } else {
            Some(metadata)
        };

        Entry {
            id: self.id.clone(),
            language: self.language.clone(),
            pure_text: self.pure_text.clone(),
            element: self.element.clone(),
            file_id: self.file_id.clone(),
            original: self.original.clone(),
            unit_id: self.unit_id.clone(),
            segment_index: self.segment_index,
            segment_count: self.segment_count,
            vector: self.vector.clone(),
            metadata,
        }
    }
}

/// A row returned from [`VectorStore::vector_search`], paired with its
/// reported L2-like distance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub row: StoredRow,
    pub distance: f32,
}

/// Filter predicates the store must support natively: equality,
/// `starts_with(id, prefix)`, and `IN` over ID strings, plus the conjunctions
/// the engine actually issues.
#[derive(Debug, Clone)]
pub enum Predicate {
    LanguageEq(String),
    IdEq(String),
    IdStartsWith(String),
    IdIn(Vec<String>),
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Evaluate against a row in memory; the LanceDB adapter instead compiles
    /// this into a SQL-like filter string.
    #[must_use]
    pub fn matches(&self, row: &StoredRow) -> bool {
        match self {
            Predicate::LanguageEq(lang) => &row.language == lang,
            Predicate::IdEq(id) => &row.id == id,
            Predicate::IdStartsWith(prefix) => row.id.starts_with(prefix.as_str()),
            Predicate::IdIn(ids) => ids.iter().any(|id| id == &row.id),
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
        }
    }
}

/// Thin contract over a columnar vector store.
///
/// Implementations: [`lance::LanceVectorStore`] (real, LanceDB-backed) and
/// [`memory::InMemoryVectorStore`] (fake, for tests — it satisfies the same
/// contract as the real adapter so tests never need LanceDB).
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the table with a fixed-length float vector column of width
    /// `dim`. Called exactly once, at open time, after probing the embedder.
    async fn create_table(&self, dim: usize) -> Result<()>;

    /// Idempotently open (or create) the store at `path`.
    async fn open_or_create(path: &str, dim: usize) -> Result<Self>
    where
        Self: Sized;

    /// Ordered by ascending vector distance; `predicate` is applied before
    /// ranking, `limit` bounds the returned row count.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        predicate: Option<Predicate>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>>;

    /// Filter-only scan, no vector ranking.
    async fn query(&self, predicate: Predicate, limit: Option<usize>) -> Result<Vec<StoredRow>>;

    /// Atomic per-batch insert. Callers precede this with a
    /// `delete_where(id IN ...)` over the batch's own IDs.
    async fn upsert_batch(&self, rows: Vec<StoredRow>) -> Result<()>;

    /// Delete every row matching `predicate`; returns the number deleted.
    async fn delete_where(&self, predicate: Predicate) -> Result<usize>;
}
