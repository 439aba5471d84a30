//! TMX 1.4b ingestor.
//!
//! Walks `<body>/<tu>/<tuv>`, emitting one entry per translation-unit
//! variant with `segmentIndex = 0`, `segmentCount = 1`.

use std::io::{BufWriter, Write};
use std::path::Path;

use regex::Regex;

use crate::config::HtmConfig;
use crate::error::{HtmError, Result};
use crate::model::{Metadata, SegmentProvenance};
use crate::xml_util::{self, Node};

use super::{IngestOutput, PendingEntry};

pub struct TmxOptions {
    pub skip_empty: bool,
    pub extract_metadata: bool,
}

impl From<&HtmConfig> for TmxOptions {
    fn from(cfg: &HtmConfig) -> Self {
        Self {
            skip_empty: cfg.skip_empty,
            extract_metadata: cfg.extract_metadata,
        }
    }
}

pub fn ingest_tmx(path: &Path, options: &TmxOptions) -> Result<IngestOutput> {
    let path_str = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let root = xml_util::parse_document(&text).map_err(|e| with_path(e, &path_str))?;

    if root.name != "tmx" {
        return Err(HtmError::UnsupportedFormat {
            path: path_str,
            reason: format!("root element is <{}>, expected <tmx>", root.name),
        });
    }
    let body = root.child("body").ok_or_else(|| HtmError::MissingAttribute {
        path: path_str.clone(),
        element: "tmx".to_string(),
        attribute: "body".to_string(),
    })?;

    let mut pending = Vec::new();
    let mut synthetic_counter: u64 = 0;

    for tu in body.children_named("tu") {
        synthetic_counter += 1;
        let unit_id = tu
            .attr("tuid")
            .map(str::to_string)
            .unwrap_or_else(|| format!("tu-{synthetic_counter}"));

        ingest_tu(&mut pending, tu, &unit_id, path_str.as_str(), options);
    }

    write_jsonl(&pending)
}

fn ingest_tu(out: &mut Vec<PendingEntry>, tu: &Node, unit_id: &str, file_id: &str, options: &TmxOptions) {
    for tuv in tu.children_named("tuv") {
        // `attrs_of` keys by local name, so `xml:lang` and a bare `lang`
        // attribute both surface as `lang` here.
        let Some(language) = tuv.attr("lang") else {
            continue;
        };
        let Some(seg) = tuv.child("seg") else { continue };
        let pure_text = xml_util::pure_text(&seg.raw);
        if options.skip_empty && pure_text.trim().is_empty() {
            continue;
        }

        let metadata = options.extract_metadata.then(|| build_metadata(tu, tuv, file_id, unit_id));

        out.push(PendingEntry::new(
            file_id,
            file_id,
            unit_id,
            language,
            0,
            1,
            pure_text,
            seg.raw.clone(),
            metadata,
        ));
    }
}

fn build_metadata(tu: &Node, tuv: &Node, file_id: &str, unit_id: &str) -> Metadata {
    let pick = |attr: &str| -> Option<String> { tuv.attr(attr).or_else(|| tu.attr(attr)).map(str::to_string) };

    let mut notes = Vec::new();
    for note in tu.children_named("note").chain(tuv.children_named("note")) {
        let text = note.text.trim();
        if !text.is_empty() {
            notes.push(text.to_string());
        }
    }

    let mut properties = std::collections::HashMap::new();
    for prop in tu.children_named("prop").chain(tuv.children_named("prop")) {
        if let Some(ty) = prop.attr("type") {
            properties.insert(ty.to_string(), prop.text.trim().to_string());
        }
    }

    let mut context = None;
    for key in ["x-context", "context", "domain"] {
        if let Some(value) = properties.get(key) {
            context = Some(value.clone());
            break;
        }
    }

    let prefix_re = Regex::new(r"(?i)^(prev|next)-").ok();
    if let Some(re) = &prefix_re {
        let mut prev = None;
        let mut next = None;
        for (key, value) in &properties {
            if re.is_match(key) {
                if key.to_lowercase().starts_with("prev") {
                    prev = Some(value.clone());
                } else {
                    next = Some(value.clone());
                }
            }
        }
        if prev.is_some() || next.is_some() {
            let phrase = format!("prev={}; next={}", prev.unwrap_or_default(), next.unwrap_or_default());
            context = Some(match context {
                Some(existing) => format!("{existing}; {phrase}"),
                None => phrase,
            });
        }
    }

    let segment = properties.get("xliff-segment").and_then(|value| parse_xliff_segment(value));

    Metadata {
        state: None,
        sub_state: None,
        quality: None,
        creation_date: pick("creationdate"),
        creation_id: pick("creationid"),
        change_date: pick("changedate"),
        change_id: pick("changeid"),
        creation_tool: pick("creationtool"),
        creation_tool_version: pick("creationtoolversion"),
        context,
        last_usage_date: tu.attr("lastusagedate").map(str::to_string),
        notes,
        usage_count: tu.attr("usagecount").and_then(|v| v.parse().ok()),
        properties,
        segment: segment.or_else(|| {
            Some(SegmentProvenance {
                provider: "xliff".to_string(),
                file_hash: None,
                file_id: Some(file_id.to_string()),
                unit_id: Some(unit_id.to_string()),
                segment_id: None,
                segment_index: Some(0),
                segment_count: Some(1),
                segment_key: None,
            })
        }),
    }
}

/// Parse a `...-FILE-UNIT-SEGMENT` identifier (three trailing numeric
/// groups) into its components.
fn parse_xliff_segment(value: &str) -> Option<SegmentProvenance> {
    let re = Regex::new(r"^(.*)-(\d+)-(\d+)-(\d+)$").ok()?;
    let caps = re.captures(value)?;
    let file_hash = caps.get(1)?.as_str().to_string();
    let file_id: u32 = caps.get(2)?.as_str().parse().ok()?;
    let unit_id: u32 = caps.get(3)?.as_str().parse().ok()?;
    let segment_id: u32 = caps.get(4)?.as_str().parse().ok()?;

    Some(SegmentProvenance {
        provider: "xliff-segment".to_string(),
        file_hash: Some(file_hash),
        file_id: Some(file_id.to_string()),
        unit_id: Some(unit_id.to_string()),
        segment_id: Some(segment_id.to_string()),
        segment_index: None,
        segment_count: None,
        segment_key: Some(value.to_string()),
    })
}

fn write_jsonl(entries: &[PendingEntry]) -> Result<IngestOutput> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let jsonl_path = std::env::temp_dir().join(format!("hybridtm-tmx-{}-{nanos}.jsonl", std::process::id()));

    let file = std::fs::File::create(&jsonl_path)?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        serde_json::to_writer(&mut writer, entry).map_err(|e| HtmError::ParseError {
            path: jsonl_path.display().to_string(),
            line_number: 0,
            source: e,
        })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(IngestOutput {
        jsonl_path,
        entry_count: entries.len(),
    })
}

fn with_path(err: HtmError, path: &str) -> HtmError {
    match err {
        HtmError::UnsupportedFormat { reason, .. } => HtmError::UnsupportedFormat {
            path: path.to_string(),
            reason,
        },
        other => other,
    }
}
