use thiserror::Error;

/// Errors surfaced by the HTM engine.
///
/// Every variant that can be tied to a specific row carries the canonical
/// `fileId:unitId:segmentIndex:language` ID where known, and the source file
/// path where applicable, per the propagation policy in the engine design.
#[derive(Debug, Error)]
pub enum HtmError {
    /// Malformed or unsupported XLIFF/TMX header (wrong version, missing
    /// `srcLang`/`trgLang`, not a recognizable root element).
    #[error("unsupported format in {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// A required XML attribute is absent (e.g. `<unit>` without `id`).
    #[error("missing attribute `{attribute}` on <{element}> in {path}")]
    MissingAttribute {
        path: String,
        element: String,
        attribute: String,
    },

    /// Embedder initialization or inference failed.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Vector-store I/O or predicate-compilation error.
    #[error("vector store error: {0}")]
    StoreError(String),

    /// Attempted insert with a vector length different from the table's
    /// configured embedding dimension.
    #[error("dimension mismatch for {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// Reserved for callers that want a hard failure on a missing ID rather
    /// than the `Option`/`bool` results the engine's own lookups return.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// A JSONL line could not be decoded. Recovered by skipping the line.
    #[error("failed to parse JSONL line {line_number} in {path}: {source}")]
    ParseError {
        path: String,
        line_number: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A stored `element` string could not be reparsed into XML. Recovered
    /// by dropping that result from the caller's result set.
    #[error("failed to hydrate element for {id}: {reason}")]
    HydrationError { id: String, reason: String },

    /// Any other I/O failure (temp file creation, cleanup, config load).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HtmError>;
