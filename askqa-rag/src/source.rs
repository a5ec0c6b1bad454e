//! Discovery and parsing of Q&A source files.
//!
//! Each source file is a JSON object mapping a category name to a record with
//! a `questions` list:
//!
//! ```json
//! { "Zakat": { "questions": [ { "question": "...", "answer": "...", "url": "..." } ] } }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;
use walkdir::WalkDir;

use crate::document::SourceRecord;
use crate::error::{RagError, Result};

#[derive(Debug, Deserialize)]
struct CategoryData {
    #[serde(default)]
    questions: Vec<Map<String, Value>>,
}

/// List the `.json` files directly inside `dir`, sorted by path.
///
/// The directory is created when it does not exist yet, in which case the
/// result is empty. Symlinks are followed; entries that cannot be read are
/// logged and skipped.
pub fn discover_source_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut files = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(%path, error = %e, "skipping unreadable data dir entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    files.sort();
    Ok(files)
}

/// Read and parse one source file.
///
/// Any I/O, encoding, or structural problem is reported as
/// [`RagError::IngestError`] naming the file.
pub fn read_source_file(path: &Path) -> Result<Vec<SourceRecord>> {
    let bytes = std::fs::read(path).map_err(|e| ingest_error(path, e))?;
    parse_source(&bytes).map_err(|e| ingest_error(path, e))
}

/// Parse the bytes of a source file into records, in category-then-entry order.
pub fn parse_source(bytes: &[u8]) -> std::result::Result<Vec<SourceRecord>, serde_json::Error> {
    let categories: Map<String, Value> = serde_json::from_slice(bytes)?;

    let mut records = Vec::new();
    for (_, category) in categories {
        let data: CategoryData = serde_json::from_value(category)?;
        records.extend(data.questions.iter().map(|item| SourceRecord {
            question: string_field(item, "question"),
            answer: string_field(item, "answer"),
            url: string_field(item, "url"),
        }));
    }
    Ok(records)
}

fn string_field(item: &Map<String, Value>, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

fn ingest_error(path: &Path, err: impl std::fmt::Display) -> RagError {
    RagError::IngestError { path: path.display().to_string(), message: err.to_string() }
}

/// The identifier recorded as chunk source for records without a url.
pub fn source_id(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_categories_in_file_order() {
        let json = br#"{
            "Zakat": {"questions": [
                {"question": "Q1", "answer": "A1", "url": "https://x/1"},
                {"question": "Q2", "answer": "A2"}
            ]},
            "Fasting": {"questions": [{"question": "Q3", "answer": "A3"}]},
            "Empty": {}
        }"#;
        let records = parse_source(json).unwrap();
        let questions: Vec<_> = records.iter().map(|r| r.question.clone().unwrap()).collect();
        assert_eq!(questions, vec!["Q1", "Q2", "Q3"]);
        assert_eq!(records[0].url.as_deref(), Some("https://x/1"));
        assert_eq!(records[1].url, None);
    }

    #[test]
    fn non_string_fields_are_treated_as_absent() {
        let json = br#"{"c": {"questions": [{"question": 7, "answer": "A"}]}}"#;
        let records = parse_source(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, None);
    }

    #[test]
    fn rejects_invalid_structure() {
        assert!(parse_source(b"[1, 2, 3]").is_err());
        assert!(parse_source(br#"{"c": "not an object"}"#).is_err());
        assert!(parse_source(br#"{"c": {"questions": "nope"}}"#).is_err());
        assert!(parse_source(b"{ truncated").is_err());
    }

    #[test]
    fn discovers_only_top_level_json_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.json"), "{}").unwrap();
        fs::write(root.join("a.json"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "ignore").unwrap();
        fs::write(root.join("nested/c.json"), "{}").unwrap();

        let files = discover_source_files(root).unwrap();
        let names: Vec<String> = files.iter().map(|p| source_id(p)).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks_and_skips_dangling_ones() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("data");
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(elsewhere.join("dir.json")).unwrap();
        fs::write(elsewhere.join("linked.json"), "{}").unwrap();
        fs::write(root.join("a.json"), "{}").unwrap();
        std::os::unix::fs::symlink(elsewhere.join("linked.json"), root.join("linked.json")).unwrap();
        std::os::unix::fs::symlink(elsewhere.join("dir.json"), root.join("dir.json")).unwrap();
        std::os::unix::fs::symlink(elsewhere.join("gone.json"), root.join("gone.json")).unwrap();

        let files = discover_source_files(&root).unwrap();
        let names: Vec<String> = files.iter().map(|p| source_id(p)).collect();
        assert_eq!(names, vec!["a.json", "linked.json"]);
        assert_eq!(read_source_file(&files[1]).unwrap().len(), 0);
    }

    #[test]
    fn creates_missing_data_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("data");
        assert!(discover_source_files(&dir).unwrap().is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn invalid_utf8_is_an_ingest_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = read_source_file(&path).unwrap_err();
        assert!(matches!(err, RagError::IngestError { .. }));
    }
}
