//! End-to-end ingestion tests: source files on disk through to a persisted collection.

use std::path::Path;
use std::sync::Arc;

use askqa_rag::{
    EmbeddingProvider, FileVectorStore, IndexBuilder, NormalizedEmbedder, RagError, Result,
    Settings, VectorStore, collect_chunks,
};
use async_trait::async_trait;

/// Deterministic bag-of-letters embedding.
struct LetterCounts;

#[async_trait]
impl EmbeddingProvider for LetterCounts {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![1.0f32; 26];
        for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
            v[(c - b'a') as usize] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        26
    }
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

fn settings(data: &Path, persist: &Path) -> Settings {
    Settings::builder()
        .data_dir(data)
        .persist_dir(persist)
        .collection_name("qa_test")
        .chunk_size_words(300)
        .build()
        .unwrap()
}

fn builder(settings: &Settings, store: Arc<FileVectorStore>) -> IndexBuilder {
    IndexBuilder::new(settings, NormalizedEmbedder::new(Arc::new(LetterCounts)), store)
}

#[test]
fn duplicate_question_across_files_survives_once() {
    let data = tempfile::tempdir().unwrap();
    write(
        data.path(),
        "a_fiqh.json",
        r#"{"Zakat": {"questions": [
            {"question": "What is Zakat?", "answer": "A form of alms.", "url": "https://qa/1"}
        ]}}"#,
    );
    write(
        data.path(),
        "b_misc.json",
        r#"{"General": {"questions": [
            {"question": "  what is ZAKAT?  ", "answer": "Different text.", "url": "https://qa/2"},
            {"question": "What is Hajj?", "answer": "Pilgrimage."}
        ]}}"#,
    );

    let set = collect_chunks(data.path(), 300).unwrap();
    assert_eq!(set.questions.len(), 2);
    assert_eq!(set.chunks.len(), 2);
    assert_eq!(set.chunks[0].metadata.source, "https://qa/1");
    assert_eq!(set.chunks[1].metadata.source, "b_misc.json");
    assert!(set.chunks.iter().all(|c| !c.text.contains("Different text")));
}

#[test]
fn malformed_file_is_skipped_and_others_ingested() {
    let data = tempfile::tempdir().unwrap();
    write(data.path(), "a_broken.json", "{ not json");
    write(data.path(), "b_wrong_shape.json", r#"{"Cat": {"questions": "nope"}}"#);
    write(data.path(), "c_notes.txt", "ignored");
    write(
        data.path(),
        "d_good.json",
        r#"{"Cat": {"questions": [{"question": "Q", "answer": "A"}]}}"#,
    );

    let set = collect_chunks(data.path(), 300).unwrap();
    assert_eq!(set.chunks.len(), 1);
    assert_eq!(set.chunks[0].id, "id_0");
    assert_eq!(set.chunks[0].metadata.source, "d_good.json");
}

#[test]
fn long_answer_is_split_into_windows() {
    let data = tempfile::tempdir().unwrap();
    let body = serde_json::json!({
        "Cat": {"questions": [{"question": "Long?", "answer": words(650), "url": "u"}]}
    });
    write(data.path(), "long.json", &body.to_string());

    let set = collect_chunks(data.path(), 300).unwrap();
    let sizes: Vec<usize> = set
        .chunks
        .iter()
        .map(|c| c.text.trim_start_matches("Question: Long?\nAnswer: ").split_whitespace().count())
        .collect();
    assert_eq!(sizes, vec![300, 300, 50]);
    assert_eq!(set.questions.len(), 1);
}

#[tokio::test]
async fn missing_data_dir_is_created_and_build_fails_empty() {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    let persist = root.path().join("index");
    let settings = settings(&data, &persist);
    let store = Arc::new(FileVectorStore::open(&persist).unwrap());

    let err = builder(&settings, Arc::clone(&store)).run().await.unwrap_err();
    assert!(matches!(err, RagError::EmptyIngestion));
    assert!(data.is_dir());
    assert!(!store.has_collection("qa_test").await.unwrap());
}

#[tokio::test]
async fn empty_ingestion_leaves_existing_collection_untouched() {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    let persist = root.path().join("index");
    std::fs::create_dir_all(&data).unwrap();
    write(&data, "qa.json", r#"{"C": {"questions": [{"question": "Q", "answer": "A"}]}}"#);

    let settings = settings(&data, &persist);
    let store = Arc::new(FileVectorStore::open(&persist).unwrap());
    builder(&settings, Arc::clone(&store)).run().await.unwrap();

    write(&data, "qa.json", r#"{"C": {"questions": [{"question": "", "answer": "A"}]}}"#);
    let err = builder(&settings, Arc::clone(&store)).run().await.unwrap_err();
    assert!(matches!(err, RagError::EmptyIngestion));
    assert_eq!(store.count("qa_test").await.unwrap(), 1);
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    let persist = root.path().join("index");
    std::fs::create_dir_all(&data).unwrap();
    write(
        &data,
        "qa.json",
        &serde_json::json!({
            "Prayer": {"questions": [
                {"question": "How many daily prayers?", "answer": "Five.", "url": "https://qa/5"},
                {"question": "Long one", "answer": words(400)}
            ]}
        })
        .to_string(),
    );

    let settings = settings(&data, &persist);
    let store = Arc::new(FileVectorStore::open(&persist).unwrap());

    let first = builder(&settings, Arc::clone(&store)).run().await.unwrap();
    let first_hits = store.search("qa_test", &[1.0 / 26f32.sqrt(); 26], 10).await.unwrap();

    let second = builder(&settings, Arc::clone(&store)).run().await.unwrap();
    let reopened = FileVectorStore::open(&persist).unwrap();
    let second_hits = reopened.search("qa_test", &[1.0 / 26f32.sqrt(); 26], 10).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.chunks, 3);
    assert_eq!(first.questions, 2);
    assert_eq!(reopened.count("qa_test").await.unwrap(), 3);

    let ids = |hits: &[askqa_rag::SearchResult]| {
        let mut v: Vec<(String, String)> =
            hits.iter().map(|h| (h.chunk.id.clone(), h.chunk.text.clone())).collect();
        v.sort();
        v
    };
    assert_eq!(ids(&first_hits), ids(&second_hits));
}
