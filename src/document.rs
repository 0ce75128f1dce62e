//! Corpus document parsing.
//!
//! Node files are semi-structured YAML, optionally wrapped in a single-key
//! envelope (`decision:`, `learning:`, `pattern:`, `concept:`). This module
//! owns the envelope and field conventions: [`parse_node_file`] normalizes a
//! file into a [`NodeDocument`] for the graph builder, and the text index
//! reuses the lower-level helpers for its lighter indexing pass. Callers pick
//! their own failure policy: the graph scanner warns and skips a
//! [`ParseError`], the text index skips silently, and the incremental build
//! propagates it.

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::NodeKind;

/// Category directories scanned under `nodes/` (or the corpus root when
/// `nodes/` is absent).
pub(crate) const CATEGORY_DIRS: [&str; 4] = ["decisions", "learnings", "patterns", "concepts"];

/// Envelope keys checked, in order, when unwrapping a document.
const ENVELOPE_KEYS: [&str; 4] = ["decision", "learning", "pattern", "concept"];

/// Free-text fields concatenated into the searchable text blob.
const TEXT_FIELDS: [&str; 8] = [
    "title",
    "context",
    "decision",
    "description",
    "problem",
    "solution",
    "insight",
    "label",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{}: document is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("{}: document is not a mapping", .path.display())]
    NotAMapping { path: PathBuf },
}

/// A relation declared by a document, before validation against the
/// closed relation set.
#[derive(Debug, Clone)]
pub struct DocRelation {
    pub relation: String,
    pub target: String,
    pub reason: Option<String>,
}

/// Normalized view of one corpus YAML file.
#[derive(Debug, Clone)]
pub struct NodeDocument {
    /// The document's `id` field, or the uppercased file stem when absent.
    pub id: String,
    /// False when the ID was derived from the file name.
    pub explicit_id: bool,
    pub kind: NodeKind,
    pub title: String,
    pub status: String,
    pub phases: Vec<i64>,
    pub concepts: Vec<String>,
    pub tags: Vec<String>,
    pub relations: Vec<DocRelation>,
    /// Concatenation of the document's searchable text fields.
    pub text: String,
    pub path: PathBuf,
}

/// Parses one corpus YAML file into a normalized [`NodeDocument`].
pub fn parse_node_file(path: &Path) -> Result<NodeDocument, ParseError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&raw).map_err(|source| ParseError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    match &value {
        Value::Null => {
            return Err(ParseError::Empty {
                path: path.to_path_buf(),
            })
        }
        Value::Mapping(mapping) if mapping.is_empty() => {
            return Err(ParseError::Empty {
                path: path.to_path_buf(),
            })
        }
        _ => {}
    }

    let doc = unwrap_envelope(value).ok_or_else(|| ParseError::NotAMapping {
        path: path.to_path_buf(),
    })?;

    let (id, explicit_id) = match str_field(&doc, "id") {
        Some(id) if !id.is_empty() => (id, true),
        _ => (
            path.file_stem()
                .map(|stem| stem.to_string_lossy().to_uppercase())
                .unwrap_or_default(),
            false,
        ),
    };

    // Path-derived kind, overridden by a recognized explicit `type` field.
    let mut kind = kind_from_path(path);
    if let Some(type_field) = str_field(&doc, "type") {
        if let Some(explicit) = NodeKind::from_field(&type_field) {
            kind = explicit;
        }
    }

    let semantic = doc.get("semantic");

    let mut phases = int_list(semantic.and_then(|s| s.get("phases")));
    if let Some(phase) = doc.get("phase") {
        // An explicit scalar phase overrides the semantic list.
        phases = match phase.as_i64() {
            Some(p) => vec![p],
            None => Vec::new(),
        };
    }

    let concepts = string_list(semantic.and_then(|s| s.get("concepts")));
    let tags = match semantic.and_then(|s| s.get("tags")) {
        Some(tags) => string_list(Some(tags)),
        None => string_list(doc.get("tags")),
    };

    let mut relations = Vec::new();
    if let Some(Value::Sequence(entries)) = semantic.and_then(|s| s.get("relations")) {
        for entry in entries {
            let relation = entry.get("type").and_then(Value::as_str);
            let target = entry.get("target").and_then(Value::as_str);
            if let (Some(relation), Some(target)) = (relation, target) {
                relations.push(DocRelation {
                    relation: relation.to_string(),
                    target: target.to_string(),
                    reason: entry
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }
    }

    // Legacy fields kept for older corpora.
    if let Some(target) = str_field(&doc, "supersedes").filter(|t| !t.is_empty()) {
        relations.push(DocRelation {
            relation: "supersedes".to_string(),
            target,
            reason: None,
        });
    }
    if let Some(Value::Sequence(entries)) = doc.get("related_decisions") {
        for entry in entries {
            if let Some(target) = entry.as_str().filter(|t| !t.is_empty()) {
                relations.push(DocRelation {
                    relation: "relatedTo".to_string(),
                    target: target.to_string(),
                    reason: None,
                });
            }
        }
    }

    let text = extract_text(&doc);
    let title = match str_field(&doc, "title") {
        Some(title) if !title.is_empty() => title,
        _ => id.clone(),
    };
    let status = str_field(&doc, "status").unwrap_or_else(|| "active".to_string());

    Ok(NodeDocument {
        id,
        explicit_id,
        kind,
        title,
        status,
        phases,
        concepts,
        tags,
        relations,
        text,
        path: path.to_path_buf(),
    })
}

/// Unwraps the optional single-key envelope, returning the inner document
/// mapping. `None` when the document (or the envelope payload) is not a
/// mapping.
pub(crate) fn unwrap_envelope(value: Value) -> Option<Value> {
    if !value.is_mapping() {
        return None;
    }
    for key in ENVELOPE_KEYS {
        if let Some(inner) = value.get(key) {
            return if inner.is_mapping() {
                Some(inner.clone())
            } else {
                None
            };
        }
    }
    Some(value)
}

/// Infers a node kind from the file path alone. The text index uses this
/// directly; [`parse_node_file`] additionally honors an explicit `type` field.
pub(crate) fn kind_from_path(path: &Path) -> NodeKind {
    let path_str = path.to_string_lossy().to_lowercase();
    if path_str.contains("decision") || path_str.contains("adr") {
        NodeKind::Decision
    } else if path_str.contains("learning") {
        NodeKind::Learning
    } else if path_str.contains("pattern") {
        NodeKind::Pattern
    } else if path_str.contains("concept") {
        NodeKind::Concept
    } else {
        NodeKind::Decision
    }
}

/// Concatenates the document's searchable text: free-text fields,
/// consequences (list form or positive/negative/risks map form), semantic
/// tags and concepts, and plain tags.
pub(crate) fn extract_text(doc: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    for field in TEXT_FIELDS {
        if let Some(text) = doc.get(field).and_then(Value::as_str) {
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }

    match doc.get("consequences") {
        Some(Value::Sequence(items)) => {
            parts.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
        Some(consequences @ Value::Mapping(_)) => {
            for key in ["positive", "negative", "risks"] {
                parts.extend(string_list(consequences.get(key)));
            }
        }
        _ => {}
    }

    if let Some(semantic) = doc.get("semantic") {
        parts.extend(string_list(semantic.get("tags")));
        parts.extend(string_list(semantic.get("concepts")));
    }
    parts.extend(string_list(doc.get("tags")));

    parts.join(" ")
}

pub(crate) fn str_field(doc: &Value, key: &str) -> Option<String> {
    doc.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn int_list(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_i64).collect(),
        Some(other) => other.as_i64().map(|p| vec![p]).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Legacy corpus locations scanned in addition to `nodes/`: sibling
/// `decisions/` and `projects/` trees from corpora predating the current
/// layout.
pub(crate) fn legacy_dirs(corpus_root: &Path) -> Vec<PathBuf> {
    match corpus_root.parent() {
        Some(parent) => vec![parent.join("decisions"), parent.join("projects")],
        None => Vec::new(),
    }
}

/// Lists node files under a directory, sorted for deterministic ordering.
/// Missing directories yield an empty list.
pub(crate) fn node_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut walker = WalkDir::new(dir);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.contains(&ext))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}
