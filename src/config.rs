use serde::{Deserialize, Serialize};

/// Penalty constant used by [`crate::match_quality::similarity`] to decide
/// when a repeated longest-common-substring extraction has stopped finding
/// meaningful matches. Empirical, not derived.
pub const MATCH_QUALITY_PENALTY: u32 = 2;

/// Default number of entries accumulated per batch by the importer before
/// embedding + upserting.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// `starts_with(id, "fileId:unitId:")` query limit used by target pairing.
pub const TARGET_PAIRING_LIMIT: usize = 50;

/// Probe string embedded once at table-creation time to determine the
/// embedding dimension.
pub const DIMENSION_PROBE_TEXT: &str = "hybrid translation memory dimension probe";

/// Runtime-tunable knobs for an HTM engine instance.
///
/// A `#[serde(default)]` struct with an explicit `Default` impl, loaded from
/// an optional JSON file and never hard-failing when the file is absent or
/// unparsable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmConfig {
    /// Batch size for the streaming JSONL importer.
    pub batch_size: usize,

    /// Default `minState` applied by XLIFF ingestion when the caller does
    /// not specify one explicitly.
    pub default_min_state: Option<String>,

    /// Whether XLIFF ingestion skips segments whose `pureTarget` is
    /// whitespace-only by default.
    pub skip_empty: bool,

    /// Whether XLIFF ingestion skips segments with no explicit `state` when
    /// `skipUnconfirmed` is requested by the caller.
    pub skip_unconfirmed: bool,

    /// Whether ingestors populate `metadata` from `<notes>`/`<metadata>` /
    /// `<prop>` trees.
    pub extract_metadata: bool,
}

impl Default for HtmConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            default_min_state: None,
            skip_empty: true,
            skip_unconfirmed: false,
            extract_metadata: true,
        }
    }
}

impl HtmConfig {
    /// Load configuration from `path`, falling back to defaults on any
    /// read/parse failure — never hard-fails on bad config.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                crate::debug_log!(
                    "[hybridtm] config at {} unparsable ({e}), using defaults",
                    path.display()
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}
