//! JSON corpus loader.
//!
//! The corpus file is a JSON array of note records:
//!
//! ```json
//! [
//!   {
//!     "id": "a",
//!     "notebookId": "work",
//!     "title": "Rust Ownership",
//!     "content": "Rust uses ownership to manage memory.",
//!     "tags": ["rust", "memory"],
//!     "updatedAt": "2024-05-01T12:00:00Z"
//!   }
//! ]
//! ```
//!
//! `body` is accepted in place of `content`. `tags` may be an array of
//! strings or a string holding a JSON array of strings. A record that cannot
//! be read is skipped with a warning; the rest of the corpus still loads.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use notebook_rag_core::models::Document;

const DEFAULT_TITLE: &str = "Untitled";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteRecord {
    id: Value,
    #[serde(default)]
    notebook_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "body")]
    content: Option<String>,
    #[serde(default)]
    tags: Value,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Read and parse a corpus file.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let docs = parse_corpus(&text)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;
    info!(path = %path.display(), documents = docs.len(), "corpus loaded");
    Ok(docs)
}

/// Parse corpus JSON. Fails only when the top level is not an array.
pub fn parse_corpus(text: &str) -> Result<Vec<Document>> {
    let records: Vec<Value> =
        serde_json::from_str(text).context("corpus must be a JSON array of note records")?;

    let mut docs = Vec::with_capacity(records.len());
    for (position, raw) in records.into_iter().enumerate() {
        match record_to_document(raw) {
            Ok(doc) => docs.push(doc),
            Err(reason) => warn!(position, %reason, "skipping malformed note record"),
        }
    }
    Ok(docs)
}

fn record_to_document(raw: Value) -> std::result::Result<Document, String> {
    let record: NoteRecord = serde_json::from_value(raw).map_err(|e| e.to_string())?;

    let id = match &record.id {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(format!("invalid id: {other}")),
    };
    let tags = parse_tags(&record.tags).ok_or_else(|| format!("note {id}: malformed tags"))?;
    let title = record
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let mut doc = Document::new(id, title, record.content.unwrap_or_default()).with_tags(tags);
    if let Some(nb) = record.notebook_id {
        doc = doc.with_notebook(nb);
    }
    if let Some(ts) = record.updated_at {
        doc = doc.with_updated_at(ts);
    }
    Ok(doc)
}

/// Tags as stored by the notes app: a string array, a JSON-encoded string
/// array, or absent. Returns `None` for anything else.
pub fn parse_tags(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ Value::Array(_)) => parse_tags(&inner),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tags_shapes() {
        assert_eq!(parse_tags(&json!(["a", "b"])), Some(vec!["a".into(), "b".into()]));
        assert_eq!(parse_tags(&json!("[\"a\",\"b\"]")), Some(vec!["a".into(), "b".into()]));
        assert_eq!(parse_tags(&Value::Null), Some(vec![]));
        assert_eq!(parse_tags(&json!("")), Some(vec![]));
        assert_eq!(parse_tags(&json!("not json")), None);
        assert_eq!(parse_tags(&json!("\"a\"")), None);
        assert_eq!(parse_tags(&json!([1, 2])), None);
        assert_eq!(parse_tags(&json!({"a": 1})), None);
    }

    #[test]
    fn test_parse_corpus_skips_malformed() {
        let text = r#"[
            {"id": "a", "notebookId": "work", "title": "Rust Ownership",
             "content": "Rust uses ownership.", "tags": "[\"rust\",\"memory\",\"rust\"]",
             "updatedAt": "2024-05-01T12:00:00Z"},
            {"id": "b", "title": "Bad", "content": "x", "tags": "{oops"},
            {"title": "No id"},
            {"id": 7, "body": "numeric id, body field"}
        ]"#;
        let docs = parse_corpus(text).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].notebook_id.as_deref(), Some("work"));
        assert_eq!(docs[0].tags, vec!["rust", "memory"]);
        assert_eq!(docs[0].updated_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        assert_eq!(docs[1].id, "7");
        assert_eq!(docs[1].title, "Untitled");
        assert_eq!(docs[1].body, "numeric id, body field");
    }

    #[test]
    fn test_parse_corpus_requires_array() {
        assert!(parse_corpus("{\"id\": \"a\"}").is_err());
        assert!(parse_corpus("[]").unwrap().is_empty());
    }
}
