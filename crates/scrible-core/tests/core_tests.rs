use std::fs;
use std::path::Path;
use tempfile::TempDir;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use scrible_core::chunker::{chunk, split_sentences};
use scrible_core::config::{EmbeddingBackend, Settings};
use scrible_core::types::{ChunkRecord, DocumentKind};
use scrible_core::{resolve_with_base, Error};

const ARTICLE: &str = "Machine learning models learn patterns from data. \
Training requires a large and varied corpus. \
Evaluation uses held-out examples to estimate generalization. \
Overfitting happens when a model memorizes noise.\n\
Regularization and early stopping reduce overfitting. \
Deployment brings its own monitoring challenges. \
Drift in the input distribution degrades accuracy over time.";

#[test]
fn three_sentence_document_with_overlap_one() {
    let chunks = chunk("Sentence one. Sentence two. Sentence three.", 15, 1);
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Sentence one.", "Sentence one. Sentence two.", "Sentence two. Sentence three."]);
    assert_eq!(chunks[0].overlap, 0);
    assert_eq!(chunks[1].overlap, 1);
    assert_eq!(chunks[2].start_sentence, "Sentence two.");
    assert_eq!(chunks[2].end_sentence, "Sentence three.");
    assert_eq!(chunks[2].sentence_count, 2);
    assert_eq!(chunks[2].char_count, "Sentence two. Sentence three.".len());
}

#[test]
fn chunking_is_deterministic() {
    for size in [40, 80, 200] {
        assert_eq!(chunk(ARTICLE, size, 1), chunk(ARTICLE, size, 1));
    }
}

#[test]
fn every_sentence_is_covered_in_order() {
    let sentences = split_sentences(ARTICLE);
    for (size, overlap) in [(30, 0), (60, 1), (120, 2), (10_000, 1)] {
        let chunks = chunk(ARTICLE, size, overlap);
        let fresh: Vec<String> = chunks.iter().flat_map(|c| c.sentences[c.overlap..].to_vec()).collect();
        assert_eq!(fresh, sentences, "size={size} overlap={overlap}");
    }
}

#[test]
fn chunks_only_exceed_budget_with_a_single_fresh_sentence() {
    for (size, overlap) in [(20, 0), (50, 1), (90, 2)] {
        for c in chunk(ARTICLE, size, overlap) {
            assert!(!c.text.is_empty());
            if c.char_count > size {
                assert_eq!(c.sentence_count - c.overlap, 1, "oversized chunk {:?}", c.text);
            }
        }
    }
}

#[test]
fn consecutive_chunks_share_overlap_sentences() {
    let chunks = chunk(ARTICLE, 100, 1);
    assert!(chunks.len() > 2);
    for pair in chunks.windows(2) {
        assert_eq!(pair[1].overlap, 1);
        assert_eq!(pair[0].sentences.last(), pair[1].sentences.first());
    }
}

#[test]
fn large_budget_keeps_document_whole() {
    let chunks = chunk(ARTICLE, 10_000, 1);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].sentence_count, split_sentences(ARTICLE).len());
}

#[test]
fn char_counts_use_unicode_scalars() {
    let chunks = chunk("Ünïcödé wörds. Ström.", 14, 0);
    assert_eq!(chunks[0].text, "Ünïcödé wörds.");
    assert_eq!(chunks[0].char_count, 14);
    assert_eq!(chunks.len(), 2);
}

#[test]
fn default_settings_match_documented_values() {
    let s = Settings::default();
    assert_eq!(s.chunking.chunk_size, 512);
    assert_eq!(s.chunking.overlap_sentences, 1);
    assert_eq!((s.index.m, s.index.ef_construction, s.index.ef_search), (32, 200, 100));
    assert_eq!(s.retrieval.default_k, 10);
    assert_eq!(s.answer.max_tokens, 500);
    assert!(s.llm.base_url.is_none());
    s.validate().expect("defaults are valid");
}

#[test]
fn toml_overrides_defaults() {
    let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(
        r#"
        [chunking]
        chunk_size = 256

        [embedding]
        backend = "hash"
        hash_dim = 64
        "#,
    ));
    let s = Settings::from_figment(&figment).expect("settings");
    assert_eq!(s.chunking.chunk_size, 256);
    assert_eq!(s.chunking.overlap_sentences, 1);
    assert_eq!(s.embedding.backend, EmbeddingBackend::Hash);
    assert_eq!(s.embedding.hash_dim, 64);
}

#[test]
fn config_file_is_read_from_base_dir() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[retrieval]\ndefault_k = 7\n").unwrap();
    let s = Settings::load_from(tmp.path()).expect("load");
    assert_eq!(s.retrieval.default_k, 7);
}

#[test]
fn validation_rejects_degenerate_values() {
    let mut s = Settings::default();
    s.chunking.chunk_size = 0;
    assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));

    let mut s = Settings::default();
    s.index.m = 1;
    assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));

    let mut s = Settings::default();
    s.index.ef_search = 0;
    assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn document_kind_serializes_lowercase_and_keeps_unknowns() {
    assert_eq!(serde_json::to_string(&DocumentKind::Video).unwrap(), "\"video\"");
    let k: DocumentKind = serde_json::from_str("\"PDF\"").unwrap();
    assert_eq!(k, DocumentKind::Pdf);
    let k: DocumentKind = serde_json::from_str("\"podcast\"").unwrap();
    assert_eq!(k, DocumentKind::Other("podcast".into()));
    assert_eq!(k.to_string(), "podcast");
}

#[test]
fn chunk_ids_are_positional() {
    assert_eq!(ChunkRecord::chunk_id_for("doc-7", 3), "doc-7_chunk_3");
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = Path::new("/srv/scrible");
    assert_eq!(resolve_with_base(base, "data/index"), base.join("data/index"));
    assert_eq!(resolve_with_base(base, "/abs/path"), Path::new("/abs/path"));
}
