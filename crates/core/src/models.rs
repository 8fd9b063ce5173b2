use crate::merge::MergedResult;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

pub const NOT_FOUND_SENTINEL: &str = "Not found";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Found(Value),
    NotFound,
}

impl FieldValue {
    // The sentinel, null, blank strings and empty arrays all mean nothing was found.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::NotFound,
            Value::String(text)
                if text.trim().is_empty() || text.trim().eq_ignore_ascii_case(NOT_FOUND_SENTINEL) =>
            {
                FieldValue::NotFound
            }
            Value::Array(items) if items.is_empty() => FieldValue::NotFound,
            other => FieldValue::Found(other.clone()),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FieldValue::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionNode {
    Group(ExtractionTree),
    Field(FieldValue),
}

pub type ExtractionTree = IndexMap<String, ExtractionNode>;

pub fn tree_from_object(object: &Map<String, Value>) -> ExtractionTree {
    object
        .iter()
        .map(|(key, value)| {
            let node = match value {
                Value::Object(children) => ExtractionNode::Group(tree_from_object(children)),
                leaf => ExtractionNode::Field(FieldValue::from_json(leaf)),
            };
            (key.clone(), node)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    Extracted {
        chunk_index: usize,
        tree: ExtractionTree,
    },
    Unparsed {
        chunk_index: usize,
        error: String,
        raw: String,
    },
}

impl PartialResult {
    pub fn from_value(chunk_index: usize, value: &Value) -> Self {
        match value {
            Value::Object(object) => PartialResult::Extracted {
                chunk_index,
                tree: tree_from_object(object),
            },
            other => PartialResult::Unparsed {
                chunk_index,
                error: format!("expected a JSON object, got {}", json_kind(other)),
                raw: other.to_string(),
            },
        }
    }

    pub fn chunk_index(&self) -> usize {
        match self {
            PartialResult::Extracted { chunk_index, .. }
            | PartialResult::Unparsed { chunk_index, .. } => *chunk_index,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes { name: String, data: Vec<u8> },
}

impl DocumentSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        DocumentSource::Path(path.into())
    }

    pub fn name(&self) -> String {
        match self {
            DocumentSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Bytes { name, .. } => name.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            DocumentSource::Path(path) => Some(path),
            DocumentSource::Bytes { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailureKind {
    Unparsed,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub kind: ChunkFailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub document: String,
    pub chunk_count: usize,
    pub result: MergedResult,
    pub failures: Vec<ChunkFailure>,
    pub analyzed_at: DateTime<Utc>,
}

impl DocumentReport {
    pub fn failed_chunks(&self, kind: ChunkFailureKind) -> usize {
        self.failures.iter().filter(|failure| failure.kind == kind).count()
    }

    pub fn to_detailed_json(&self) -> Value {
        json!({
            "fields": self.result.to_value(),
            "chunk_count": self.chunk_count,
            "failed_chunks": self.failures,
            "conflicts": self.result.conflicts(),
            "displaced": self.result.displaced(),
            "analyzed_at": self.analyzed_at.to_rfc3339(),
        })
    }
}

pub type DocumentOutcome = Result<DocumentReport, String>;

#[derive(Debug, Default)]
pub struct DocumentResultSet {
    entries: IndexMap<String, DocumentOutcome>,
}

impl DocumentResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_key(&self, name: String, fallback: impl FnOnce() -> String) -> String {
        if self.entries.contains_key(&name) {
            let alternative = fallback();
            if !self.entries.contains_key(&alternative) && alternative != name {
                return alternative;
            }
            let mut suffix = 2;
            loop {
                let candidate = format!("{name} ({suffix})");
                if !self.entries.contains_key(&candidate) {
                    return candidate;
                }
                suffix += 1;
            }
        }
        name
    }

    pub fn insert(&mut self, key: String, outcome: DocumentOutcome) {
        self.entries.insert(key, outcome);
    }

    pub fn get(&self, key: &str) -> Option<&DocumentOutcome> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentOutcome)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.values().filter(|outcome| outcome.is_ok()).count()
    }

    /// `{document: {fields...} | {"error": message}}`.
    pub fn to_json(&self, detailed: bool) -> Value {
        let mut documents = Map::new();
        for (name, outcome) in &self.entries {
            let rendered = match outcome {
                Ok(report) if detailed => report.to_detailed_json(),
                Ok(report) => report.result.to_value(),
                Err(message) => json!({ "error": message }),
            };
            documents.insert(name.clone(), rendered);
        }
        Value::Object(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_variants_are_not_found() {
        for raw in [json!("Not found"), json!(" not FOUND "), json!(""), json!(null), json!([])] {
            assert_eq!(FieldValue::from_json(&raw), FieldValue::NotFound, "{raw}");
        }
        assert_eq!(
            FieldValue::from_json(&json!("Rs. 10 Crore")),
            FieldValue::Found(json!("Rs. 10 Crore"))
        );
        assert!(FieldValue::from_json(&json!(["3 similar works"])).is_found());
    }

    #[test]
    fn nested_objects_become_groups() {
        let value = json!({"cat": {"x": "Not found", "y": "5"}});
        let PartialResult::Extracted { tree, .. } = PartialResult::from_value(0, &value) else {
            panic!("object should be extracted");
        };

        let Some(ExtractionNode::Group(cat)) = tree.get("cat") else {
            panic!("cat should be a group");
        };
        assert_eq!(cat.get("x"), Some(&ExtractionNode::Field(FieldValue::NotFound)));
        assert_eq!(
            cat.get("y"),
            Some(&ExtractionNode::Field(FieldValue::Found(json!("5"))))
        );
    }

    #[test]
    fn non_object_values_are_unparsed() {
        let result = PartialResult::from_value(3, &json!(["a"]));
        assert!(matches!(result, PartialResult::Unparsed { chunk_index: 3, .. }));
    }

    #[test]
    fn duplicate_names_fall_back_to_path() {
        let mut set = DocumentResultSet::new();
        let first = set.reserve_key("tender.pdf".to_string(), || "a/tender.pdf".to_string());
        set.insert(first.clone(), Err("boom".to_string()));
        let second = set.reserve_key("tender.pdf".to_string(), || "b/tender.pdf".to_string());

        assert_eq!(first, "tender.pdf");
        assert_eq!(second, "b/tender.pdf");
    }

    #[test]
    fn document_name_is_file_name() {
        let source = DocumentSource::from_path("/tmp/tenders/bid-17.pdf");
        assert_eq!(source.name(), "bid-17.pdf");
    }
}
