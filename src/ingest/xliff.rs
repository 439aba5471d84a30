//! XLIFF 2.x ingestor.
//!
//! Walks `<file>/<unit>/<segment>` producing one entry per retained segment
//! plus a merged per-unit entry, and writes them as newline-delimited JSON
//! candidates for the batch importer.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::HtmConfig;
use crate::error::{HtmError, Result};
use crate::model::{Metadata, SegmentProvenance, XliffState};
use crate::xml_util::{self, Node};

use super::{IngestOutput, PendingEntry};

pub struct XliffOptions {
    pub skip_empty: bool,
    pub skip_unconfirmed: bool,
    pub min_state: Option<XliffState>,
    pub extract_metadata: bool,
}

impl From<&HtmConfig> for XliffOptions {
    fn from(cfg: &HtmConfig) -> Self {
        Self {
            skip_empty: cfg.skip_empty,
            skip_unconfirmed: cfg.skip_unconfirmed,
            min_state: cfg.default_min_state.as_deref().and_then(XliffState::parse),
            extract_metadata: cfg.extract_metadata,
        }
    }
}

struct RetainedSegment<'a> {
    node: &'a Node,
    pure_source: String,
    pure_target: String,
    /// Pre-built `<source>`/`<target>` markup for synthetic (virtual-segment)
    /// entries, where `node` has no real `<source>`/`<target>` child to read.
    element_override: Option<(String, String)>,
}

/// Ingest an XLIFF 2.x file at `path`, writing a JSONL temp file of
/// [`PendingEntry`] candidates. Returns its path and entry count.
pub fn ingest_xliff(path: &Path, options: &XliffOptions) -> Result<IngestOutput> {
    let path_str = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let root = xml_util::parse_document(&text).map_err(|e| with_path(e, &path_str))?;

    if root.name != "xliff" {
        return Err(HtmError::UnsupportedFormat {
            path: path_str,
            reason: format!("root element is <{}>, expected <xliff>", root.name),
        });
    }
    let version = root.attr("version").ok_or_else(|| HtmError::MissingAttribute {
        path: path_str.clone(),
        element: "xliff".to_string(),
        attribute: "version".to_string(),
    })?;
    if !version.starts_with("2.") {
        return Err(HtmError::UnsupportedFormat {
            path: path_str,
            reason: format!("unsupported XLIFF version `{version}`, expected 2.x"),
        });
    }
    let src_lang = root.attr("srcLang").ok_or_else(|| HtmError::MissingAttribute {
        path: path_str.clone(),
        element: "xliff".to_string(),
        attribute: "srcLang".to_string(),
    })?;
    let trg_lang = root.attr("trgLang").ok_or_else(|| HtmError::MissingAttribute {
        path: path_str.clone(),
        element: "xliff".to_string(),
        attribute: "trgLang".to_string(),
    })?;

    let mut pending = Vec::new();

    for file_node in root.children_named("file") {
        let file_id = file_node.attr("id").ok_or_else(|| HtmError::MissingAttribute {
            path: path_str.clone(),
            element: "file".to_string(),
            attribute: "id".to_string(),
        })?;
        let original = file_node.attr("original").unwrap_or(file_id);

        for unit_node in file_node.children_named("unit") {
            let unit_id = unit_node.attr("id").ok_or_else(|| HtmError::MissingAttribute {
                path: path_str.clone(),
                element: "unit".to_string(),
                attribute: "id".to_string(),
            })?;

            ingest_unit(
                &mut pending,
                unit_node,
                file_id,
                original,
                unit_id,
                src_lang,
                trg_lang,
                options,
            );
        }
    }

    write_jsonl(&pending)
}

#[allow(clippy::too_many_arguments)]
fn ingest_unit(
    out: &mut Vec<PendingEntry>,
    unit_node: &Node,
    file_id: &str,
    original: &str,
    unit_id: &str,
    src_lang: &str,
    trg_lang: &str,
    options: &XliffOptions,
) {
    let segments: Vec<&Node> = unit_node.children_named("segment").collect();

    let retained: Vec<RetainedSegment> = if !segments.is_empty() {
        segments
            .into_iter()
            .filter_map(|segment| evaluate_segment(segment, options))
            .collect()
    } else {
        let virtual_nodes: Vec<&Node> = unit_node.children_named("ignorable").collect();
        if virtual_nodes.is_empty() {
            Vec::new()
        } else {
            let sources: Vec<String> = virtual_nodes
                .iter()
                .filter_map(|n| n.child("source"))
                .map(|n| n.raw.clone())
                .collect();
            let targets: Vec<String> = virtual_nodes
                .iter()
                .filter_map(|n| n.child("target"))
                .map(|n| n.raw.clone())
                .collect();
            let merged_source = xml_util::build_wrapper_element("source", &sources).ok();
            let merged_target = xml_util::build_wrapper_element("target", &targets).ok();
            let pure_source = merged_source.as_deref().map(xml_util::pure_text).unwrap_or_default();
            if pure_source.trim().is_empty() {
                Vec::new()
            } else {
                // The unit node itself stands in for a "segment" here, carrying
                // whatever state/lifecycle attributes this synthetic entry uses.
                let pure_target = merged_target.as_deref().map(xml_util::pure_text).unwrap_or_default();
                if options.skip_empty && pure_target.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![RetainedSegment {
                        node: unit_node,
                        element_override: Some((
                            merged_source.unwrap_or_else(|| format!("<source>{pure_source}</source>")),
                            merged_target.unwrap_or_else(|| format!("<target>{pure_target}</target>")),
                        )),
                        pure_source,
                        pure_target,
                    }]
                }
            }
        }
    };

    let n = retained.len();
    if n == 0 {
        return;
    }

    let mut all_source_nodes = Vec::new();
    let mut all_target_nodes = Vec::new();

    for (i, seg) in retained.iter().enumerate() {
        let index = (i + 1) as u32;
        let metadata_src = options
            .extract_metadata
            .then(|| build_metadata(unit_node, seg.node, file_id, unit_id, index, n as u32, src_lang));
        let metadata_tgt = options
            .extract_metadata
            .then(|| build_metadata(unit_node, seg.node, file_id, unit_id, index, n as u32, trg_lang));

        let (source_element, target_element) = if let Some((src, tgt)) = &seg.element_override {
            (src.clone(), tgt.clone())
        } else {
            (
                seg.node
                    .child("source")
                    .map(|n| n.raw.clone())
                    .unwrap_or_else(|| format!("<source>{}</source>", seg.pure_source)),
                seg.node
                    .child("target")
                    .map(|n| n.raw.clone())
                    .unwrap_or_else(|| format!("<target>{}</target>", seg.pure_target)),
            )
        };

        all_source_nodes.push(source_element.clone());
        all_target_nodes.push(target_element.clone());

        out.push(PendingEntry::new(
            file_id,
            original,
            unit_id,
            src_lang,
            index,
            n as u32,
            seg.pure_source.clone(),
            source_element,
            metadata_src,
        ));
        out.push(PendingEntry::new(
            file_id,
            original,
            unit_id,
            trg_lang,
            index,
            n as u32,
            seg.pure_target.clone(),
            target_element,
            metadata_tgt,
        ));
    }

    if n > 1 {
        if let (Ok(merged_source), Ok(merged_target)) = (
            xml_util::build_wrapper_element("source", &all_source_nodes),
            xml_util::build_wrapper_element("target", &all_target_nodes),
        ) {
            let pure_source = xml_util::pure_text(&merged_source);
            let pure_target = xml_util::pure_text(&merged_target);

            // The merged entry's own skipEmpty check applies even when every
            // component segment was retained.
            if !(options.skip_empty && pure_target.trim().is_empty()) {
                let metadata_src = options
                    .extract_metadata
                    .then(|| build_metadata(unit_node, unit_node, file_id, unit_id, 0, n as u32, src_lang));
                let metadata_tgt = options
                    .extract_metadata
                    .then(|| build_metadata(unit_node, unit_node, file_id, unit_id, 0, n as u32, trg_lang));

                out.push(PendingEntry::new(
                    file_id,
                    original,
                    unit_id,
                    src_lang,
                    0,
                    n as u32,
                    pure_source,
                    merged_source,
                    metadata_src,
                ));
                out.push(PendingEntry::new(
                    file_id,
                    original,
                    unit_id,
                    trg_lang,
                    0,
                    n as u32,
                    pure_target,
                    merged_target,
                    metadata_tgt,
                ));
            }
        }
    }
}

fn evaluate_segment<'a>(segment: &'a Node, options: &XliffOptions) -> Option<RetainedSegment<'a>> {
    let pure_source = segment.child("source").map(|n| xml_util::pure_text(&n.raw)).unwrap_or_default();
    if pure_source.trim().is_empty() {
        return None;
    }
    let pure_target = segment.child("target").map(|n| xml_util::pure_text(&n.raw)).unwrap_or_default();
    if options.skip_empty && pure_target.trim().is_empty() {
        return None;
    }

    match segment.attr("state").and_then(XliffState::parse) {
        Some(state) => {
            if let Some(min_state) = options.min_state {
                if state.rank() < min_state.rank() {
                    return None;
                }
            }
        }
        None => {
            if options.skip_unconfirmed {
                return None;
            }
        }
    }

    Some(RetainedSegment {
        node: segment,
        pure_source,
        pure_target,
        element_override: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_metadata(
    unit_node: &Node,
    segment_node: &Node,
    file_id: &str,
    unit_id: &str,
    segment_index: u32,
    segment_count: u32,
    _language: &str,
) -> Metadata {
    let state = segment_node.attr("state").and_then(XliffState::parse);
    let sub_state = segment_node.attr("subState").map(str::to_string);

    let pick = |attr: &str| -> Option<String> {
        segment_node
            .attr(attr)
            .or_else(|| unit_node.attr(attr))
            .map(str::to_string)
    };

    let mut notes = Vec::new();
    for notes_node in [unit_node.child("notes"), segment_node.child("notes")].into_iter().flatten() {
        for note in notes_node.children_named("note") {
            let text = note.text.trim();
            if !text.is_empty() {
                notes.push(text.to_string());
            }
        }
    }

    let mut properties = std::collections::HashMap::new();
    if let Some(metadata_node) = unit_node.child("metadata") {
        for group in metadata_node.children_named("metaGroup") {
            let category = group.attr("category").unwrap_or("");
            for meta in group.children_named("meta") {
                let meta_type = meta.attr("type").unwrap_or("");
                let key = format!("{category}:{meta_type}");
                properties.insert(key, meta.text.trim().to_string());
            }
        }
    }

    let mut context = pick("context");
    if context.is_none() {
        if let Some((_, value)) = properties.iter().find(|(k, _)| k.to_lowercase().contains("context")) {
            context = Some(value.clone());
        }
    }

    Metadata {
        state,
        sub_state,
        quality: None,
        creation_date: pick("creationDate"),
        creation_id: pick("creationId"),
        change_date: pick("changeDate"),
        change_id: pick("changeId"),
        creation_tool: pick("creationTool"),
        creation_tool_version: pick("creationToolVersion"),
        context,
        last_usage_date: None,
        notes,
        usage_count: None,
        properties,
        segment: Some(SegmentProvenance {
            provider: "xliff".to_string(),
            file_hash: None,
            file_id: Some(file_id.to_string()),
            unit_id: Some(unit_id.to_string()),
            segment_id: segment_node.attr("id").map(str::to_string),
            segment_index: Some(segment_index),
            segment_count: Some(segment_count),
            segment_key: None,
        }),
    }
}

fn write_jsonl(entries: &[PendingEntry]) -> Result<IngestOutput> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let jsonl_path = std::env::temp_dir().join(format!("hybridtm-xliff-{}-{nanos}.jsonl", std::process::id()));

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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::path::PathBuf;

    fn default_options() -> XliffOptions {
        XliffOptions {
            skip_empty: true,
            skip_unconfirmed: false,
            min_state: None,
            extract_metadata: true,
        }
    }

    fn write_temp_xliff(body: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("hybridtm-test-{nanos}.xlf"));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn single_segment_unit_emits_one_pair_no_merge() {
        let path = write_temp_xliff(
            r#"<xliff version="2.0" srcLang="en" trgLang="es"><file id="f1"><unit id="u1"><segment state="final"><source>Hello world</source><target>Hola mundo</target></segment></unit></file></xliff>"#,
        );
        let out = ingest_xliff(&path, &default_options()).unwrap();
        assert_eq!(out.entry_count, 2);
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&out.jsonl_path).ok();
    }

    #[test]
    fn multi_segment_unit_emits_segments_plus_merged() {
        let path = write_temp_xliff(
            r#"<xliff version="2.0" srcLang="en" trgLang="es"><file id="f1"><unit id="u1">
            <segment state="translated"><source>One</source><target>Uno</target></segment>
            <segment state="translated"><source>Two</source><target>Dos</target></segment>
            <segment state="translated"><source>Three</source><target>Tres</target></segment>
            </unit></file></xliff>"#,
        );
        let out = ingest_xliff(&path, &default_options()).unwrap();
        // 3 segments * 2 languages + 1 merged pair = 8
        assert_eq!(out.entry_count, 8);

        let file = std::fs::File::open(&out.jsonl_path).unwrap();
        let reader = std::io::BufReader::new(file);
        let entries: Vec<PendingEntry> = reader
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert!(entries.iter().all(|e| e.segment_count == 3));
        assert_eq!(entries.iter().filter(|e| e.segment_index == 0).count(), 2);

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&out.jsonl_path).ok();
    }

    #[test]
    fn missing_src_lang_is_rejected() {
        let path = write_temp_xliff(r#"<xliff version="2.0" trgLang="es"><file id="f1"></file></xliff>"#);
        let result = ingest_xliff(&path, &default_options());
        assert!(matches!(result, Err(HtmError::MissingAttribute { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn non_2x_version_is_unsupported() {
        let path = write_temp_xliff(r#"<xliff version="1.2" srcLang="en" trgLang="es"><file id="f1"></file></xliff>"#);
        let result = ingest_xliff(&path, &default_options());
        assert!(matches!(result, Err(HtmError::UnsupportedFormat { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_source_segment_is_skipped() {
        let path = write_temp_xliff(
            r#"<xliff version="2.0" srcLang="en" trgLang="es"><file id="f1"><unit id="u1"><segment state="final"><source>   </source><target>Hola</target></segment></unit></file></xliff>"#,
        );
        let out = ingest_xliff(&path, &default_options()).unwrap();
        assert_eq!(out.entry_count, 0);
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&out.jsonl_path).ok();
    }

    #[test]
    fn unconfirmed_segment_skipped_when_requested() {
        let path = write_temp_xliff(
            r#"<xliff version="2.0" srcLang="en" trgLang="es"><file id="f1"><unit id="u1"><segment><source>Hi</source><target>Hola</target></segment></unit></file></xliff>"#,
        );
        let mut options = default_options();
        options.skip_unconfirmed = true;
        let out = ingest_xliff(&path, &options).unwrap();
        assert_eq!(out.entry_count, 0);
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&out.jsonl_path).ok();
    }
}
