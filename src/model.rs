use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Normalized XLIFF workflow state, ranked `initial < translated < reviewed
/// < final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XliffState {
    Initial,
    Translated,
    Reviewed,
    Final,
}

impl XliffState {
    /// Rank used for `minState` comparisons (0..3).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Translated => 1,
            Self::Reviewed => 2,
            Self::Final => 3,
        }
    }

    /// Parse an XLIFF/TMX state string. Out-of-vocabulary values map to
    /// `None` rather than erroring.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initial" => Some(Self::Initial),
            "translated" => Some(Self::Translated),
            "reviewed" => Some(Self::Reviewed),
            "final" => Some(Self::Final),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Translated => "translated",
            Self::Reviewed => "reviewed",
            Self::Final => "final",
        }
    }
}

/// Provenance sub-record attached to an entry's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentProvenance {
    pub provider: String,
    pub file_hash: Option<String>,
    pub file_id: Option<String>,
    pub unit_id: Option<String>,
    pub segment_id: Option<String>,
    pub segment_index: Option<u32>,
    pub segment_count: Option<u32>,
    pub segment_key: Option<String>,
}

/// Optional metadata record. Every field is truly absent when unknown
/// rather than present-with-null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub state: Option<XliffState>,
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
    pub notes: Vec<String>,
    pub usage_count: Option<u64>,
    pub properties: HashMap<String, String>,
    pub segment: Option<SegmentProvenance>,
}

/// One language-side of a segment, uniquely identified by `(fileId, unitId,
/// segmentIndex, language)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
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
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Build the canonical ID string for a segment side.
///
/// Colons inside `file_id`/`unit_id` are preserved literally; callers must
/// not escape them.
#[must_use]
pub fn canonical_id(file_id: &str, unit_id: &str, segment_index: u32, language: &str) -> String {
    format!("{file_id}:{unit_id}:{segment_index}:{language}")
}

/// Build the `fileId:unitId:` prefix used by `starts_with` queries.
#[must_use]
pub fn unit_prefix(file_id: &str, unit_id: &str) -> String {
    format!("{file_id}:{unit_id}:")
}

impl Entry {
    /// Recompute `id` from this entry's own fields; used to assert ID
    /// determinism after construction.
    #[must_use]
    pub fn recomputed_id(&self) -> String {
        canonical_id(&self.file_id, &self.unit_id, self.segment_index, &self.language)
    }
}
