//! Public write/search API.
//!
//! Ties the embedder, vector store, filter evaluator, and lexical scorer
//! together. Holds one embedder and one store for its whole lifetime — both
//! must come from the same instance across writes and queries.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::TARGET_PAIRING_LIMIT;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::filter::Filter;
use crate::ingest::PendingEntry;
use crate::match_quality;
use crate::model::{canonical_id, unit_prefix, Entry, Metadata, XliffState};
use crate::store::{Predicate, StoredRow, VectorStore};

/// Per-side filters for `semantic_translation_search`.
///
/// When `source` is absent but `target` is set, `target` is also applied to
/// the source candidate, so a caller who only configures one side still gets
/// consistent filtering on both.
#[derive(Debug, Clone, Default)]
pub struct TranslationFilters {
    pub source: Option<Filter>,
    pub target: Option<Filter>,
}

/// One bilingual match returned by `semantic_translation_search`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationMatch {
    pub source_element: String,
    pub target_element: String,
    pub origin: String,
    pub semantic: u8,
    pub fuzzy: u8,
    pub rank: f64,
}

/// The HTM engine: one embedder, one vector-store connection, one name used
/// to stamp `origin` on translation matches.
pub struct Engine<E: Embedder, S: VectorStore> {
    embedder: E,
    store: S,
    instance_name: String,
}

impl<E: Embedder, S: VectorStore> Engine<E, S> {
    pub fn new(embedder: E, store: S, instance_name: impl Into<String>) -> Self {
        Self {
            embedder,
            store,
            instance_name: instance_name.into(),
        }
    }

    /// Access the underlying embedder, e.g. to feed the batch importer,
    /// which bypasses `store_lang_entry`'s idempotence check.
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Access the underlying vector store, for the same reason.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create or update one language-side of a segment. A no-op rewrite when
    /// `pureText`/`element`/`original` are all unchanged from the stored row.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_lang_entry(
        &self,
        file_id: &str,
        original: &str,
        unit_id: &str,
        language: &str,
        pure_text: &str,
        element: &str,
        vector: Option<Vec<f32>>,
        segment_index: u32,
        segment_count: u32,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let id = canonical_id(file_id, unit_id, segment_index, language);

        let existing = self.store.query(Predicate::IdEq(id.clone()), Some(1)).await?;
        if let Some(row) = existing.first() {
            if row.pure_text == pure_text && row.element == element && row.original == original {
                return Ok(());
            }
        }

        let vector = match vector {
            Some(v) => v,
            None => self.embedder.embed(pure_text)?,
        };

        self.store.delete_where(Predicate::IdEq(id.clone())).await?;

        let entry = Entry {
            id,
            language: language.to_string(),
            pure_text: pure_text.to_string(),
            element: element.to_string(),
            file_id: file_id.to_string(),
            original: original.to_string(),
            unit_id: unit_id.to_string(),
            segment_index,
            segment_count,
            vector,
            metadata,
        };
        self.store.upsert_batch(vec![StoredRow::from_entry(&entry)]).await
    }

    /// Embed every entry in order, then issue one bulk delete followed by
    /// one bulk insert.
    pub async fn store_batch_entries(&self, entries: Vec<PendingEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let vector = self.embedder.embed(&entry.pure_text)?;
            rows.push(StoredRow::from_entry(&entry.into_entry(vector)));
        }

        self.store.delete_where(Predicate::IdIn(ids)).await?;
        let count = rows.len();
        self.store.upsert_batch(rows).await?;
        Ok(count)
    }

    /// Returns `false` when no row matched the canonical ID.
    pub async fn delete_lang_entry(&self, file_id: &str, unit_id: &str, segment_index: u32, language: &str) -> Result<bool> {
        let id = canonical_id(file_id, unit_id, segment_index, language);
        let deleted = self.store.delete_where(Predicate::IdEq(id)).await?;
        Ok(deleted > 0)
    }

    pub async fn entry_exists(&self, file_id: &str, unit_id: &str, segment_index: u32, language: &str) -> Result<bool> {
        let id = canonical_id(file_id, unit_id, segment_index, language);
        Ok(!self.store.query(Predicate::IdEq(id), Some(1)).await?.is_empty())
    }

    pub async fn get_lang_entry(&self, file_id: &str, unit_id: &str, segment_index: u32, language: &str) -> Result<Option<Entry>> {
        let id = canonical_id(file_id, unit_id, segment_index, language);
        Ok(self
            .store
            .query(Predicate::IdEq(id), Some(1))
            .await?
            .into_iter()
            .next()
            .map(|row| row.to_entry()))
    }

    /// Case-insensitive substring search over `pureText` within one language,
    /// returning one `language -> element` mapping per unique
    /// `(fileId, unitId, segmentIndex)` descriptor.
    pub async fn concordance_search(
        &self,
        fragment: &str,
        language: &str,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<HashMap<String, String>>> {
        let needle = fragment.to_lowercase();
        let rows = self.store.query(Predicate::LanguageEq(language.to_string()), None).await?;

        let mut seen = HashSet::new();
        let mut mappings = Vec::new();

        for row in rows {
            if mappings.len() >= limit {
                break;
            }
            if !row.pure_text.to_lowercase().contains(&needle) {
                continue;
            }
            if let Some(f) = filter {
                if !f.matches(&row.to_entry()) {
                    continue;
                }
            }

            let descriptor = (row.file_id.clone(), row.unit_id.clone(), row.segment_index);
            if !seen.insert(descriptor) {
                continue;
            }

            let prefix = format!("{}{}:", unit_prefix(&row.file_id, &row.unit_id), row.segment_index);
            let variants = self.store.query(Predicate::IdStartsWith(prefix), None).await?;

            let mapping = variants
                .into_iter()
                .map(|v| (v.language, v.element))
                .collect::<HashMap<_, _>>();
            mappings.push(mapping);
        }

        Ok(mappings)
    }

    /// Vector search restricted to one language, filtered, no target pairing.
    pub async fn semantic_search(&self, query_text: &str, language: &str, limit: usize, filter: Option<&Filter>) -> Result<Vec<Entry>> {
        let vector = self.embedder.embed(query_text)?;
        let hits = self
            .store
            .vector_search(&vector, Some(Predicate::LanguageEq(language.to_string())), Some(limit))
            .await?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let entry = hit.row.to_entry();
            if let Some(f) = filter {
                if !f.matches(&entry) {
                    continue;
                }
            }
            out.push(entry);
        }
        Ok(out)
    }

    /// Bilingual semantic search with target pairing and ranking.
    pub async fn semantic_translation_search(
        &self,
        query_text: &str,
        src_lang: &str,
        tgt_lang: &str,
        min_score: u8,
        limit: usize,
        filters: Option<&TranslationFilters>,
    ) -> Result<Vec<TranslationMatch>> {
        let vector = self.embedder.embed(query_text)?;
        let hits = self
            .store
            .vector_search(&vector, Some(Predicate::LanguageEq(src_lang.to_string())), None)
            .await?;

        let empty = TranslationFilters::default();
        let filters = filters.unwrap_or(&empty);
        let effective_source_filter = filters.source.as_ref().or(filters.target.as_ref());

        let mut scored = Vec::new();
        for hit in hits {
            let source_entry = hit.row.to_entry();

            if let Some(f) = effective_source_filter {
                if !f.matches(&source_entry) {
                    continue;
                }
            }

            let semantic = semantic_score(hit.distance);
            let fuzzy = match_quality::similarity(query_text, &source_entry.pure_text);
            let hybrid = round_avg(semantic, fuzzy);
            if hybrid < min_score {
                continue;
            }

            let Some(target_row) = self
                .find_target_entry(
                    &source_entry.file_id,
                    &source_entry.unit_id,
                    source_entry.segment_index,
                    tgt_lang,
                    filters.target.as_ref(),
                )
                .await?
            else {
                continue;
            };
            let target_entry = target_row.to_entry();

            let both_segment_level = source_entry.segment_index > 0 && target_entry.segment_index > 0;
            let same_index = both_segment_level && source_entry.segment_index == target_entry.segment_index;
            let pairing_bonus = if both_segment_level {
                if same_index {
                    10.0
                } else {
                    5.0
                }
            } else {
                0.0
            };

            let quality_bonus = target_entry
                .metadata
                .as_ref()
                .and_then(|m| m.quality)
                .map(|q| f64::from(q.min(100)) / 20.0)
                .unwrap_or(0.0);

            let recency = recency_bonus(target_entry.metadata.as_ref());

            let state_bonus = match target_entry.metadata.as_ref().and_then(|m| m.state) {
                Some(XliffState::Final) => 3.0,
                Some(XliffState::Reviewed) => 2.0,
                Some(XliffState::Translated) => 1.0,
                _ => 0.0,
            };

            let rank = f64::from(hybrid) + pairing_bonus + quality_bonus + recency + state_bonus;

            scored.push(TranslationMatch {
                source_element: source_entry.element,
                target_element: target_entry.element,
                origin: self.instance_name.clone(),
                semantic,
                fuzzy,
                rank,
            });
        }

        scored.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Resolve the paired target row: exact ID first, then a `starts_with`
    /// prefix fallback preferring the same segment index, then any
    /// segment-level row, then the first row.
    async fn find_target_entry(
        &self,
        file_id: &str,
        unit_id: &str,
        segment_index: u32,
        tgt_lang: &str,
        target_filter: Option<&Filter>,
    ) -> Result<Option<StoredRow>> {
        let exact_id = canonical_id(file_id, unit_id, segment_index, tgt_lang);
        if let Some(row) = self.store.query(Predicate::IdEq(exact_id), Some(1)).await?.into_iter().next() {
            if target_filter.map_or(true, |f| f.matches(&row.to_entry())) {
                return Ok(Some(row));
            }
        }

        let predicate = Predicate::IdStartsWith(unit_prefix(file_id, unit_id)).and(Predicate::LanguageEq(tgt_lang.to_string()));
        let mut candidates = self.store.query(predicate, Some(TARGET_PAIRING_LIMIT)).await?;
        if let Some(f) = target_filter {
            candidates.retain(|row| f.matches(&row.to_entry()));
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        if segment_index > 0 {
            if let Some(row) = candidates.iter().find(|row| row.segment_index == segment_index) {
                return Ok(Some(row.clone()));
            }
        }
        if let Some(row) = candidates.iter().find(|row| row.segment_index > 0) {
            return Ok(Some(row.clone()));
        }
        Ok(Some(candidates.remove(0)))
    }
}

fn semantic_score(distance: f32) -> u8 {
    let raw = (((2.0 - distance) / 2.0).max(0.0) * 100.0).round();
    raw.clamp(0.0, 100.0) as u8
}

fn round_avg(a: u8, b: u8) -> u8 {
    (((f64::from(a) + f64::from(b)) / 2.0).round()) as u8
}

/// Linear from 5 at 0 days since `changeDate || creationDate` down to 0 at
/// 365 days and beyond; unparsable or absent dates contribute nothing.
fn recency_bonus(metadata: Option<&Metadata>) -> f64 {
    let Some(md) = metadata else { return 0.0 };
    let date_str = md.change_date.as_deref().or(md.creation_date.as_deref());
    let Some(parsed) = date_str.and_then(parse_htm_date) else {
        return 0.0;
    };
    let days = (Utc::now() - parsed).num_days().max(0) as f64;
    5.0 * (1.0 - days.min(365.0) / 365.0)
}

fn parse_htm_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::memory::DeterministicEmbedder;
    use crate::store::memory::InMemoryVectorStore;

    async fn seeded_engine() -> Engine<DeterministicEmbedder, InMemoryVectorStore> {
        let embedder = DeterministicEmbedder::new();
        let store = InMemoryVectorStore::new(32);
        store.create_table(32).await.unwrap();
        Engine::new(embedder, store, "demo-instance")
    }

    #[tokio::test]
    async fn store_lang_entry_is_idempotent_on_unchanged_content() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry("demo", "demo.docx", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, None)
            .await
            .unwrap();
        engine
            .store_lang_entry("demo", "demo.docx", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, None)
            .await
            .unwrap();

        let row = engine.get_lang_entry("demo", "u1", 1, "en").await.unwrap().unwrap();
        assert_eq!(row.pure_text, "Hello world");
    }

    #[tokio::test]
    async fn store_lang_entry_rewrites_on_changed_content() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry("demo", "demo.docx", "u1", "en", "Hello", "<source>Hello</source>", None, 1, 1, None)
            .await
            .unwrap();
        engine
            .store_lang_entry("demo", "demo.docx", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, None)
            .await
            .unwrap();

        let row = engine.get_lang_entry("demo", "u1", 1, "en").await.unwrap().unwrap();
        assert_eq!(row.pure_text, "Hello world");
        assert!(engine.entry_exists("demo", "u1", 1, "en").await.unwrap());
    }

    #[tokio::test]
    async fn delete_lang_entry_reports_no_match() {
        let engine = seeded_engine().await;
        assert!(!engine.delete_lang_entry("demo", "u1", 1, "en").await.unwrap());
        engine
            .store_lang_entry("demo", "demo.docx", "u1", "en", "Hi", "<source>Hi</source>", None, 1, 1, None)
            .await
            .unwrap();
        assert!(engine.delete_lang_entry("demo", "u1", 1, "en").await.unwrap());
        assert!(!engine.entry_exists("demo", "u1", 1, "en").await.unwrap());
    }

    #[tokio::test]
    async fn concordance_search_groups_two_units_into_two_mappings() {
        let engine = seeded_engine().await;
        for (unit, text) in [("u1", "open settings"), ("u2", "save settings")] {
            engine
                .store_lang_entry("demo", "demo.docx", unit, "en", text, &format!("<source>{text}</source>"), None, 1, 1, None)
                .await
                .unwrap();
            let es = text.replace("settings", "ajustes");
            engine
                .store_lang_entry("demo", "demo.docx", unit, "es", &es, &format!("<target>{es}</target>"), None, 1, 1, None)
                .await
                .unwrap();
        }

        let mappings = engine.concordance_search("settings", "en", 10, None).await.unwrap();
        assert_eq!(mappings.len(), 2);
        for mapping in &mappings {
            assert!(mapping.contains_key("en"));
            assert!(mapping.contains_key("es"));
        }
    }

    #[tokio::test]
    async fn semantic_search_applies_filter_after_vector_ranking() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry(
                "demo",
                "demo.docx",
                "u1",
                "en",
                "save settings",
                "<source>save settings</source>",
                None,
                1,
                1,
                Some(Metadata {
                    context: Some("ui.settings".to_string()),
                    state: Some(XliffState::Translated),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        engine
            .store_lang_entry(
                "demo",
                "demo.docx",
                "u2",
                "en",
                "save file",
                "<source>save file</source>",
                None,
                1,
                1,
                Some(Metadata {
                    context: Some("file.menu".to_string()),
                    state: Some(XliffState::Initial),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let filter = Filter {
            context_includes: Some(vec!["ui.settings".to_string()]),
            min_state: Some(XliffState::Translated),
            ..Default::default()
        };
        let results = engine.semantic_search("save", "en", 5, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pure_text, "save settings");
    }

    #[tokio::test]
    async fn translation_search_pairs_exact_target_and_scores_above_threshold() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry(
                "demo",
                "demo.xlf",
                "u1",
                "en",
                "Hello world",
                "<source>Hello world</source>",
                None,
                1,
                1,
                Some(Metadata {
                    state: Some(XliffState::Final),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        engine
            .store_lang_entry(
                "demo",
                "demo.xlf",
                "u1",
                "es",
                "Hola mundo",
                "<target>Hola mundo</target>",
                None,
                1,
                1,
                Some(Metadata {
                    state: Some(XliffState::Final),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let matches = engine
            .semantic_translation_search("Hi world", "en", "es", 40, 5, None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].target_element, "<target>Hola mundo</target>");
        assert!(matches[0].fuzzy >= 50);
    }

    #[tokio::test]
    async fn translation_search_falls_back_to_any_segment_level_target() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry("demo", "demo.xlf", "u1", "en", "Hello", "<source>Hello</source>", None, 2, 2, None)
            .await
            .unwrap();
        // No es entry at segment index 2, but one exists at index 1.
        engine
            .store_lang_entry("demo", "demo.xlf", "u1", "es", "Hola", "<target>Hola</target>", None, 1, 2, None)
            .await
            .unwrap();

        let matches = engine.semantic_translation_search("Hello", "en", "es", 0, 5, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].target_element, "<target>Hola</target>");
    }

    #[tokio::test]
    async fn translation_search_applies_target_filter_to_source_when_source_filter_absent() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry(
                "demo",
                "demo.xlf",
                "u1",
                "en",
                "Hello world",
                "<source>Hello world</source>",
                None,
                1,
                1,
                Some(Metadata {
                    context: Some("ui.settings".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        engine
            .store_lang_entry(
                "demo",
                "demo.xlf",
                "u1",
                "es",
                "Hola mundo",
                "<target>Hola mundo</target>",
                None,
                1,
                1,
                None,
            )
            .await
            .unwrap();

        let filters = TranslationFilters {
            source: None,
            target: Some(Filter {
                context_includes: Some(vec!["nonexistent".to_string()]),
                ..Default::default()
            }),
        };
        let matches = engine
            .semantic_translation_search("Hello world", "en", "es", 0, 5, Some(&filters))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn ranking_prefers_final_state_and_same_index_pairing() {
        let engine = seeded_engine().await;
        engine
            .store_lang_entry("demo", "a.xlf", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, None)
            .await
            .unwrap();
        engine
            .store_lang_entry(
                "demo",
                "a.xlf",
                "u1",
                "es",
                "Hola mundo",
                "<target>Hola mundo</target>",
                None,
                1,
                1,
                Some(Metadata {
                    state: Some(XliffState::Final),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let matches = engine
            .semantic_translation_search("Hello world", "en", "es", 0, 5, None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].rank >= f64::from(matches[0].semantic));
    }
}
