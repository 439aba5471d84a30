//! End-to-end scenarios and cross-cutting properties, exercised against the
//! in-memory fakes.

use hybridtm::embedding::memory::DeterministicEmbedder;
use hybridtm::engine::{Engine, TranslationFilters};
use hybridtm::filter::Filter;
use hybridtm::ingest::importer::run_import;
use hybridtm::ingest::progress::SilentProgress;
use hybridtm::ingest::xliff::{ingest_xliff, XliffOptions};
use hybridtm::match_quality;
use hybridtm::model::XliffState;
use hybridtm::store::memory::InMemoryVectorStore;

const DIM: usize = 32;

async fn fresh_engine() -> Engine<DeterministicEmbedder, InMemoryVectorStore> {
    let embedder = DeterministicEmbedder::new();
    let store = InMemoryVectorStore::new(DIM);
    store.create_table(DIM).await.unwrap();
    Engine::new(embedder, store, "e2e-instance")
}

use hybridtm::store::VectorStore;

fn write_temp_xliff(body: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    let path = std::env::temp_dir().join(format!("hybridtm-e2e-{nanos}.xlf"));
    std::fs::write(&path, body).unwrap();
    path
}

async fn import_xliff(engine: &Engine<DeterministicEmbedder, InMemoryVectorStore>, body: &str) -> usize {
    let path = write_temp_xliff(body);
    let output = ingest_xliff(&path, &XliffOptions::from(&hybridtm::config::HtmConfig::default())).unwrap();
    std::fs::remove_file(&path).ok();
    run_import(&output.jsonl_path, output.entry_count, 1000, engine.embedder(), engine.store(), &SilentProgress).await.unwrap()
}

const THREE_SEGMENT_UNIT: &str = r#"<xliff version="2.0" srcLang="en" trgLang="es">
<file id="demo.xlf">
  <unit id="u1">
    <segment id="1" state="translated">
      <source>Hello</source>
      <target>Hola</target>
    </segment>
    <segment id="2" state="translated">
      <source>World</source>
      <target>Mundo</target>
    </segment>
    <segment id="3" state="translated">
      <source>Goodbye</source>
      <target>Adios</target>
    </segment>
  </unit>
</file>
</xliff>"#;

#[tokio::test]
async fn translation_search_pairs_exact_final_entries() {
    let engine = fresh_engine().await;
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, Some(final_state()))
        .await
        .unwrap();
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "es", "Hola mundo", "<target>Hola mundo</target>", None, 1, 1, Some(final_state()))
        .await
        .unwrap();

    let matches = engine.semantic_translation_search("Hi world", "en", "es", 40, 5, None).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].target_element, "<target>Hola mundo</target>");
    assert!(matches[0].fuzzy >= 50);
}

fn final_state() -> hybridtm::model::Metadata {
    hybridtm::model::Metadata {
        state: Some(XliffState::Final),
        ..Default::default()
    }
}

#[tokio::test]
async fn three_segment_unit_yields_n_plus_one_entries_per_language() {
    let engine = fresh_engine().await;
    let processed = import_xliff(&engine, THREE_SEGMENT_UNIT).await;
    assert_eq!(processed, 8); // (3 segments + 1 merged) * 2 languages

    for lang in ["en", "es"] {
        for idx in 0..=3u32 {
            let entry = engine.get_lang_entry("demo.xlf", "u1", idx, lang).await.unwrap();
            let entry = entry.unwrap_or_else(|| panic!("missing {lang} segment {idx}"));
            assert_eq!(entry.segment_count, 3);
        }
    }
}

#[tokio::test]
async fn reimporting_the_same_file_is_idempotent() {
    let engine = fresh_engine().await;
    let first = import_xliff(&engine, THREE_SEGMENT_UNIT).await;
    let second = import_xliff(&engine, THREE_SEGMENT_UNIT).await;
    assert_eq!(first, second);

    let snapshot_len = engine.store().snapshot().len();
    assert_eq!(snapshot_len, 8);
}

#[tokio::test]
async fn concordance_search_groups_two_units() {
    let engine = fresh_engine().await;
    for (unit, en, es) in [("u1", "open settings", "abrir ajustes"), ("u2", "save settings", "guardar ajustes")] {
        engine
            .store_lang_entry("demo", "demo.xlf", unit, "en", en, &format!("<source>{en}</source>"), None, 1, 1, None)
            .await
            .unwrap();
        engine
            .store_lang_entry("demo", "demo.xlf", unit, "es", es, &format!("<target>{es}</target>"), None, 1, 1, None)
            .await
            .unwrap();
    }
    // A third unit that doesn't mention "settings" must not appear.
    engine
        .store_lang_entry("demo", "demo.xlf", "u3", "en", "close window", "<source>close window</source>", None, 1, 1, None)
        .await
        .unwrap();

    let mappings = engine.concordance_search("settings", "en", 10, None).await.unwrap();
    assert_eq!(mappings.len(), 2);
    for mapping in &mappings {
        assert!(mapping.contains_key("en"));
        assert!(mapping.contains_key("es"));
    }
}

#[tokio::test]
async fn semantic_search_excludes_entries_failing_filter() {
    let engine = fresh_engine().await;
    engine
        .store_lang_entry(
            "demo",
            "demo.xlf",
            "u1",
            "en",
            "save settings",
            "<source>save settings</source>",
            None,
            1,
            1,
            Some(hybridtm::model::Metadata {
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
            "demo.xlf",
            "u2",
            "en",
            "save draft",
            "<source>save draft</source>",
            None,
            1,
            1,
            Some(hybridtm::model::Metadata {
                context: Some("editor.draft".to_string()),
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
    let results = engine.semantic_search("save", "en", 10, Some(&filter)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pure_text, "save settings");
}

#[test]
fn match_quality_ranks_partial_overlap_between_identity_and_disjoint() {
    let identical = match_quality::similarity("Save settings", "Save settings");
    let partial = match_quality::similarity("Save settings", "Save the settings now");
    let disjoint = match_quality::similarity("Save settings", "Completely different text");

    assert_eq!(identical, 100);
    assert!(partial > disjoint);
    assert!(partial < identical);
}

#[test]
fn match_quality_identity_and_symmetry() {
    assert_eq!(match_quality::similarity("hello world", "hello world"), 100);
    assert_eq!(
        match_quality::similarity("hello world", "bonjour monde"),
        match_quality::similarity("bonjour monde", "hello world")
    );
    assert_eq!(match_quality::similarity("", "nonempty"), 0);
}

#[tokio::test]
async fn raising_min_state_never_increases_concordance_matches() {
    let engine = fresh_engine().await;
    for (unit, state) in [("u1", XliffState::Initial), ("u2", XliffState::Translated), ("u3", XliffState::Final)] {
        engine
            .store_lang_entry(
                "demo",
                "demo.xlf",
                unit,
                "en",
                "shared settings text",
                "<source>shared settings text</source>",
                None,
                1,
                1,
                Some(hybridtm::model::Metadata {
                    state: Some(state),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
    }

    let count_at = |min: XliffState| async move {
        let filter = Filter {
            min_state: Some(min),
            ..Default::default()
        };
        engine.concordance_search("settings", "en", 10, Some(&filter)).await.unwrap().len()
    };

    let initial_count = count_at(XliffState::Initial).await;
    let translated_count = count_at(XliffState::Translated).await;
    let final_count = count_at(XliffState::Final).await;
    assert!(translated_count <= initial_count);
    assert!(final_count <= translated_count);
}

#[tokio::test]
async fn target_pairing_prefers_exact_index_over_fallback() {
    let engine = fresh_engine().await;
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "en", "Hello", "<source>Hello</source>", None, 2, 2, None)
        .await
        .unwrap();
    // Exact-index target.
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "es", "Hola", "<target index=\"2\">Hola</target>", None, 2, 2, None)
        .await
        .unwrap();
    // A fallback-only candidate at a different index, which must lose.
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "es", "Otro", "<target index=\"1\">Otro</target>", None, 1, 2, None)
        .await
        .unwrap();

    let matches = engine.semantic_translation_search("Hello", "en", "es", 0, 5, None).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].target_element, "<target index=\"2\">Hola</target>");
}

#[tokio::test]
async fn every_match_honors_the_min_score_threshold() {
    let engine = fresh_engine().await;
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "en", "Hello world", "<source>Hello world</source>", None, 1, 1, None)
        .await
        .unwrap();
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "es", "Hola mundo", "<target>Hola mundo</target>", None, 1, 1, None)
        .await
        .unwrap();
    engine
        .store_lang_entry("demo", "demo.xlf", "u2", "en", "completely unrelated text", "<source>completely unrelated text</source>", None, 1, 1, None)
        .await
        .unwrap();
    engine
        .store_lang_entry("demo", "demo.xlf", "u2", "es", "texto totalmente diferente", "<target>texto totalmente diferente</target>", None, 1, 1, None)
        .await
        .unwrap();

    let min_score = 60;
    let matches = engine.semantic_translation_search("Hello world", "en", "es", min_score, 10, None).await.unwrap();
    for m in &matches {
        let hybrid = ((f64::from(m.semantic) + f64::from(m.fuzzy)) / 2.0).round() as u8;
        assert!(hybrid >= min_score);
    }
}

#[tokio::test]
async fn translation_filters_apply_target_filter_to_source_when_source_absent() {
    let engine = fresh_engine().await;
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
            Some(hybridtm::model::Metadata {
                context: Some("ui.settings".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    engine
        .store_lang_entry("demo", "demo.xlf", "u1", "es", "Hola mundo", "<target>Hola mundo</target>", None, 1, 1, None)
        .await
        .unwrap();

    let filters = TranslationFilters {
        source: None,
        target: Some(Filter {
            context_includes: Some(vec!["missing-context".to_string()]),
            ..Default::default()
        }),
    };
    let matches = engine
        .semantic_translation_search("Hello world", "en", "es", 0, 5, Some(&filters))
        .await
        .unwrap();
    assert!(matches.is_empty());
}
