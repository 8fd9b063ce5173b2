//! Deep merge of per-chunk extractions into one answer per document.
//!
//! Chunks are applied strictly in the order given. For every leaf the last
//! found value wins, a not-found leaf never erases an earlier value, and
//! groups merge key by key. Every found value is kept as a candidate with
//! its chunk index so disagreements between chunks stay visible.

use crate::models::{ExtractionNode, ExtractionTree, FieldValue, PartialResult};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub chunk_index: usize,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    pub value: Value,
    pub chunk_index: usize,
    pub candidates: Vec<Candidate>,
}

impl MergedField {
    fn new(chunk_index: usize, value: Value) -> Self {
        Self {
            candidates: vec![Candidate {
                chunk_index,
                value: value.clone(),
            }],
            value,
            chunk_index,
        }
    }

    fn overwrite(&mut self, chunk_index: usize, value: Value) {
        self.candidates.push(Candidate {
            chunk_index,
            value: value.clone(),
        });
        self.value = value;
        self.chunk_index = chunk_index;
    }

    pub fn distinct_values(&self) -> Vec<&Value> {
        let mut seen: Vec<&Value> = Vec::new();
        for candidate in &self.candidates {
            if !seen.contains(&&candidate.value) {
                seen.push(&candidate.value);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergedNode {
    Group(IndexMap<String, MergedNode>),
    Field(MergedField),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub path: String,
    pub chosen: Value,
    pub candidates: Vec<Candidate>,
}

pub const PATH_SEPARATOR: &str = " > ";

/// Found values dropped because a later chunk gave the field a different shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplacedValues {
    pub path: String,
    pub replaced_by_chunk: usize,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResult {
    fields: IndexMap<String, MergedNode>,
    displaced: Vec<DisplacedValues>,
}

impl MergedResult {
    pub fn fields(&self) -> &IndexMap<String, MergedNode> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn displaced(&self) -> &[DisplacedValues] {
        &self.displaced
    }

    pub fn get(&self, path: &[&str]) -> Option<&MergedNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.fields.get(*first)?;
        for key in rest {
            match node {
                MergedNode::Group(children) => node = children.get(*key)?,
                MergedNode::Field(_) => return None,
            }
        }
        Some(node)
    }

    /// The plain answer: same tree shape, leaves hold the winning values.
    pub fn to_value(&self) -> Value {
        group_to_value(&self.fields)
    }

    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut rows = Vec::new();
        walk_fields(&self.fields, &mut Vec::new(), &mut |path, field| {
            rows.push((path.join(PATH_SEPARATOR), field.value.clone()));
        });
        rows
    }

    /// Fields where chunks reported more than one distinct value.
    pub fn conflicts(&self) -> Vec<FieldConflict> {
        let mut conflicts = Vec::new();
        walk_fields(&self.fields, &mut Vec::new(), &mut |path, field| {
            if field.distinct_values().len() > 1 {
                conflicts.push(FieldConflict {
                    path: path.join(PATH_SEPARATOR),
                    chosen: field.value.clone(),
                    candidates: field.candidates.clone(),
                });
            }
        });
        conflicts
    }
}

impl Serialize for MergedResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Merges partial results in iteration order; unparsed chunks contribute nothing.
pub fn merge_partials<'a, I>(partials: I) -> MergedResult
where
    I: IntoIterator<Item = &'a PartialResult>,
{
    let mut fields = IndexMap::new();
    let mut displaced = Vec::new();
    for partial in partials {
        if let PartialResult::Extracted { chunk_index, tree } = partial {
            merge_tree(&mut fields, tree, *chunk_index, &mut Vec::new(), &mut displaced);
        }
    }
    MergedResult { fields, displaced }
}

fn merge_tree(
    target: &mut IndexMap<String, MergedNode>,
    incoming: &ExtractionTree,
    chunk_index: usize,
    path: &mut Vec<String>,
    displaced: &mut Vec<DisplacedValues>,
) {
    for (key, node) in incoming {
        path.push(key.clone());
        match node {
            ExtractionNode::Field(FieldValue::NotFound) => {}
            ExtractionNode::Field(FieldValue::Found(value)) => match target.get_mut(key) {
                Some(MergedNode::Field(field)) => field.overwrite(chunk_index, value.clone()),
                Some(existing) => {
                    record_displaced(existing, path, chunk_index, displaced);
                    *existing = MergedNode::Field(MergedField::new(chunk_index, value.clone()));
                }
                None => {
                    target.insert(
                        key.clone(),
                        MergedNode::Field(MergedField::new(chunk_index, value.clone())),
                    );
                }
            },
            ExtractionNode::Group(children) => match target.get_mut(key) {
                Some(MergedNode::Group(existing)) => {
                    merge_tree(existing, children, chunk_index, path, displaced)
                }
                Some(existing) => {
                    let mut replacement = IndexMap::new();
                    merge_tree(&mut replacement, children, chunk_index, path, displaced);
                    if !replacement.is_empty() {
                        record_displaced(existing, path, chunk_index, displaced);
                        *existing = MergedNode::Group(replacement);
                    }
                }
                None => {
                    let mut fresh = IndexMap::new();
                    merge_tree(&mut fresh, children, chunk_index, path, displaced);
                    if !fresh.is_empty() {
                        target.insert(key.clone(), MergedNode::Group(fresh));
                    }
                }
            },
        }
        path.pop();
    }
}

fn record_displaced(
    node: &MergedNode,
    path: &[String],
    chunk_index: usize,
    displaced: &mut Vec<DisplacedValues>,
) {
    let mut prefix: Vec<&str> = path.iter().map(String::as_str).collect();
    let mut keep = |field_path: &[&str], field: &MergedField| {
        debug!(
            path = %field_path.join(PATH_SEPARATOR),
            chunk_index,
            "field changed shape, earlier values displaced"
        );
        displaced.push(DisplacedValues {
            path: field_path.join(PATH_SEPARATOR),
            replaced_by_chunk: chunk_index,
            candidates: field.candidates.clone(),
        });
    };

    match node {
        MergedNode::Field(field) => keep(prefix.as_slice(), field),
        MergedNode::Group(children) => walk_fields(children, &mut prefix, &mut keep),
    }
}

fn group_to_value(group: &IndexMap<String, MergedNode>) -> Value {
    let mut object = Map::new();
    for (key, node) in group {
        let value = match node {
            MergedNode::Group(children) => group_to_value(children),
            MergedNode::Field(field) => field.value.clone(),
        };
        object.insert(key.clone(), value);
    }
    Value::Object(object)
}

fn walk_fields<'a, F>(group: &'a IndexMap<String, MergedNode>, prefix: &mut Vec<&'a str>, visit: &mut F)
where
    F: FnMut(&[&str], &MergedField),
{
    for (key, node) in group {
        prefix.push(key);
        match node {
            MergedNode::Group(children) => walk_fields(children, prefix, visit),
            MergedNode::Field(field) => visit(prefix, field),
        }
        prefix.pop();
    }
}
