//! TF-IDF text index over corpus documents.
//!
//! The index is persisted as `index.yml` at the corpus root and rebuilt from
//! the corpus files whenever it is missing or unreadable. Indexing is a
//! lighter pass than the graph build: only documents with an explicit `id`
//! are indexed, the node kind comes from the file path alone, and files that
//! fail to parse are skipped without comment. Search results are memoized in
//! `.cache/search_cache.json`, flushed every tenth distinct query.

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::document;
use crate::models::{NodeKind, CORPUS_FORMAT_VERSION};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z][a-z0-9_-]*\b").expect("token regex is valid"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with",
        "at", "by", "from", "as", "into", "through", "during", "before", "after", "above",
        "below", "between", "under", "again", "further", "then", "once", "and", "or", "but",
        "if", "so", "than", "too", "very", "just", "only", "own", "same", "that", "this",
        "these", "those", "what", "which", "who", "whom", "when", "where", "why", "how", "all",
        "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "any",
        "both",
    ]
    .into_iter()
    .collect()
});

/// One text hit: document ID, TF-IDF score, snippet.
pub type TextHit = (String, f64, String);

/// Per-document metadata stored in `index.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub path: String,
    pub text_length: usize,
    #[serde(default)]
    pub phases: Vec<i64>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// On-disk shape of `index.yml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    documents: BTreeMap<String, IndexedDocument>,
    #[serde(default)]
    inverted_index: BTreeMap<String, BTreeMap<String, usize>>,
}

pub struct TextIndex {
    corpus_root: PathBuf,
    index_file: PathBuf,
    cache_file: PathBuf,
    documents: BTreeMap<String, IndexedDocument>,
    inverted_index: BTreeMap<String, BTreeMap<String, usize>>,
    cache: HashMap<String, Vec<TextHit>>,
}

impl TextIndex {
    /// Opens the index for a corpus, loading `index.yml` when it is present
    /// and readable, and rebuilding it from the corpus files otherwise.
    pub fn open(corpus_root: &Path) -> Result<TextIndex> {
        let mut index = TextIndex {
            corpus_root: corpus_root.to_path_buf(),
            index_file: corpus_root.join("index.yml"),
            cache_file: corpus_root.join(".cache").join("search_cache.json"),
            documents: BTreeMap::new(),
            inverted_index: BTreeMap::new(),
            cache: HashMap::new(),
        };
        index.load()?;
        Ok(index)
    }

    fn load(&mut self) -> Result<()> {
        let loaded = match std::fs::read_to_string(&self.index_file) {
            Ok(raw) => match serde_yaml::from_str::<IndexFile>(&raw) {
                Ok(data) => {
                    self.documents = data.documents;
                    self.inverted_index = data.inverted_index;
                    true
                }
                Err(_) => false,
            },
            Err(_) => false,
        };
        if !loaded {
            self.build()?;
        }

        if let Ok(raw) = std::fs::read_to_string(&self.cache_file) {
            self.cache = serde_json::from_str(&raw).unwrap_or_default();
        }
        Ok(())
    }

    /// Rescans the corpus and rewrites `index.yml`.
    pub fn build(&mut self) -> Result<()> {
        self.documents.clear();
        self.inverted_index.clear();

        let mut nodes_root = self.corpus_root.join("nodes");
        if !nodes_root.exists() {
            nodes_root = self.corpus_root.clone();
        }

        for category in document::CATEGORY_DIRS {
            for path in document::node_files(&nodes_root.join(category), &["yml"], false) {
                self.index_node_file(&path);
            }
        }
        for legacy in document::legacy_dirs(&self.corpus_root) {
            for path in document::node_files(&legacy, &["yml"], true) {
                self.index_node_file(&path);
            }
        }

        self.save()
    }

    /// Indexes a single node file. Unreadable or unparseable files and
    /// documents without an explicit `id` are skipped.
    fn index_node_file(&mut self, path: &Path) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let value: serde_yaml::Value = match serde_yaml::from_str(&raw) {
            Ok(value) => value,
            Err(_) => return,
        };
        let doc = match document::unwrap_envelope(value) {
            Some(doc) => doc,
            None => return,
        };
        let doc_id = match document::str_field(&doc, "id") {
            Some(id) if !id.is_empty() => id,
            _ => return,
        };

        let title = match document::str_field(&doc, "title") {
            Some(title) if !title.is_empty() => title,
            _ => doc_id.clone(),
        };
        let semantic = doc.get("semantic");
        let phases = document::int_list(semantic.and_then(|s| s.get("phases")));
        let concepts = document::string_list(semantic.and_then(|s| s.get("concepts")));
        let text = document::extract_text(&doc);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in tokenize(&text) {
            *counts.entry(token).or_insert(0) += 1;
        }
        for (token, count) in counts {
            self.inverted_index
                .entry(token)
                .or_default()
                .insert(doc_id.clone(), count);
        }

        self.documents.insert(
            doc_id,
            IndexedDocument {
                title,
                kind: document::kind_from_path(path),
                path: path.to_string_lossy().into_owned(),
                text_length: text.chars().count(),
                phases,
                concepts,
            },
        );
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.index_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let data = IndexFile {
            version: CORPUS_FORMAT_VERSION.to_string(),
            updated_at: Some(Utc::now().to_rfc3339()),
            documents: self.documents.clone(),
            inverted_index: self.inverted_index.clone(),
        };
        let yaml = serde_yaml::to_string(&data)?;
        std::fs::write(&self.index_file, yaml)
            .with_context(|| format!("Failed to write {}", self.index_file.display()))?;
        Ok(())
    }

    fn save_cache(&self) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.cache)?;
        std::fs::write(&self.cache_file, json)?;
        Ok(())
    }

    /// Searches the index, returning up to `limit` scored hits.
    ///
    /// Scores sum TF-IDF over the query tokens, with term frequency dampened
    /// by the square root of document length. Ties keep ascending document
    /// ID order. A query with no usable tokens yields no hits.
    pub fn search(&mut self, query: &str, limit: usize) -> Vec<TextHit> {
        let cache_key = format!("text:{}:{}", query, limit);
        if let Some(hits) = self.cache.get(&cache_key) {
            return hits.clone();
        }

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: BTreeMap<String, f64> = BTreeMap::new();
        let num_docs = self.documents.len().max(1) as f64;

        for token in &query_tokens {
            let doc_freqs = match self.inverted_index.get(token) {
                Some(freqs) => freqs,
                None => continue,
            };
            let idf = (num_docs / (1.0 + doc_freqs.len() as f64)).ln();
            for (doc_id, tf) in doc_freqs {
                let text_length = self
                    .documents
                    .get(doc_id)
                    .map(|doc| doc.text_length.max(1))
                    .unwrap_or(1);
                let tfidf = (*tf as f64 / (text_length as f64).sqrt()) * idf;
                *scores.entry(doc_id.clone()).or_insert(0.0) += tfidf;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        let hits: Vec<TextHit> = ranked
            .into_iter()
            .map(|(doc_id, score)| {
                let snippet = self.snippet(&doc_id, &query_tokens);
                (doc_id, score, snippet)
            })
            .collect();

        self.cache.insert(cache_key, hits.clone());
        if self.cache.len() % 10 == 0 {
            if let Err(e) = self.save_cache() {
                eprintln!("Warning: failed to write search cache: {}", e);
            }
        }

        hits
    }

    /// Builds a short excerpt around the first query token present in the
    /// source file's text. Falls back to the document title when the file is
    /// gone or unparseable, and to a plain text prefix when no token matches.
    fn snippet(&self, doc_id: &str, query_tokens: &[String]) -> String {
        let meta = match self.documents.get(doc_id) {
            Some(meta) => meta,
            None => return doc_id.to_string(),
        };

        let raw = match std::fs::read_to_string(&meta.path) {
            Ok(raw) => raw,
            Err(_) => return meta.title.clone(),
        };
        let value: serde_yaml::Value = match serde_yaml::from_str(&raw) {
            Ok(value) => value,
            Err(_) => return meta.title.clone(),
        };
        let doc = match document::unwrap_envelope(value) {
            Some(doc) => doc,
            None => return meta.title.clone(),
        };

        let text = document::extract_text(&doc);
        let lowered = text.to_lowercase();

        for token in query_tokens {
            let pos = match lowered.find(token.as_str()) {
                Some(pos) => pos.min(text.len()),
                None => continue,
            };
            let start = floor_char_boundary(&text, pos.saturating_sub(50));
            let end = floor_char_boundary(&text, (pos + token.len() + 100).min(text.len()));
            let mut snippet = text[start..end].to_string();
            if start > 0 {
                snippet = format!("...{}", snippet);
            }
            if end < text.len() {
                snippet.push_str("...");
            }
            return snippet;
        }

        if text.chars().count() > 150 {
            let cut = text
                .char_indices()
                .nth(150)
                .map(|(idx, _)| idx)
                .unwrap_or(text.len());
            format!("{}...", &text[..cut])
        } else {
            text
        }
    }

    /// Metadata for an indexed document.
    pub fn get_document(&self, doc_id: &str) -> Option<&IndexedDocument> {
        self.documents.get(doc_id)
    }

    /// Number of indexed documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Rebuilds the index from the corpus and drops the in-memory cache.
    pub fn rebuild(&mut self) -> Result<()> {
        self.build()?;
        self.cache.clear();
        Ok(())
    }
}

/// Splits text into lowercase index tokens: alphanumeric runs starting with
/// a letter, minus stop words and tokens shorter than three characters.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|token| token.as_str())
        .filter(|token| token.len() > 2 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Walks an index back to the nearest UTF-8 character boundary.
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_node(root: &Path, category: &str, name: &str, yaml: &str) -> PathBuf {
        let dir = root.join("nodes").join(category);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_tokenize_filters_stop_words_and_short_tokens() {
        let tokens = tokenize("The quick db-migration IS a plan to use PostgreSQL");
        assert_eq!(
            tokens,
            vec!["quick", "db-migration", "plan", "use", "postgresql"]
        );
    }

    #[test]
    fn test_ranks_by_term_frequency() {
        let dir = tempfile::tempdir().unwrap();
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database choice\ncontext: database database database database\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-002.yml",
            "id: DEC-002\ntitle: Cache strategy\ncontext: reads hit the database once per request\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-003.yml",
            "id: DEC-003\ntitle: Logging format\ncontext: structured logs with request identifiers\n",
        );
        write_node(
            dir.path(),
            "learnings",
            "l-001.yml",
            "id: L-001\ntitle: Retry budget\ninsight: exponential backoff caps retry storms\n",
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        let hits = index.search("database", 10);
        let ids: Vec<&str> = hits.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["DEC-001", "DEC-002"]);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_matching_docs_returned_even_at_zero_idf() {
        // Three documents with the term in two of them: idf = ln(3/3) = 0,
        // so both matches score 0.0 and rank in document ID order.
        let dir = tempfile::tempdir().unwrap();
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ncontext: database database database database database\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-002.yml",
            "id: DEC-002\ncontext: one database mention\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-003.yml",
            "id: DEC-003\ncontext: nothing relevant here\n",
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        let hits = index.search("database", 10);
        let ids: Vec<&str> = hits.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["DEC-001", "DEC-002"]);
    }

    #[test]
    fn test_skips_unparseable_and_anonymous_documents() {
        let dir = tempfile::tempdir().unwrap();
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Keep me\n",
        );
        write_node(dir.path(), "decisions", "no-id.yml", "title: No id here\n");
        write_node(dir.path(), "decisions", "broken.yml", "id: [unclosed\n");

        let index = TextIndex::open(dir.path()).unwrap();
        assert_eq!(index.document_count(), 1);
        assert!(index.get_document("DEC-001").is_some());
    }

    #[test]
    fn test_indexes_legacy_sibling_directories() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        let legacy = dir.path().join("decisions").join("2024");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(
            legacy.join("dec-001.yml"),
            "id: DEC-001\ntitle: Legacy decision\n",
        )
        .unwrap();

        let index = TextIndex::open(&corpus).unwrap();
        assert_eq!(index.document_count(), 1);
    }

    #[test]
    fn test_empty_query_returns_no_hits() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = TextIndex::open(dir.path()).unwrap();
        assert!(index.search("", 10).is_empty());
        assert!(index.search("the of an", 10).is_empty());
    }

    #[test]
    fn test_snippet_windows_long_text() {
        let dir = tempfile::tempdir().unwrap();
        let padding = "lorem ipsum context ".repeat(10);
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            &format!(
                "id: DEC-001\ntitle: Storage engine\ncontext: {}database{}\n",
                padding, padding
            ),
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        let hits = index.search("database", 5);
        let snippet = &hits[0].2;
        assert!(snippet.contains("database"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_search_results_are_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database choice\ncontext: the database we picked\n",
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        let first = index.search("database", 5);
        assert!(!first.is_empty());

        // Removing the file does not change a cached answer.
        fs::remove_file(&path).unwrap();
        let second = index.search("database", 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rebuild_rescans_and_drops_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database choice\ncontext: the database we picked\n",
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        assert!(!index.search("database", 5).is_empty());

        fs::remove_file(&path).unwrap();
        index.rebuild().unwrap();
        assert!(index.search("database", 5).is_empty());
        assert_eq!(index.document_count(), 0);
    }

    #[test]
    fn test_snippet_falls_back_to_title_when_file_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database choice\ncontext: the database we picked\n",
        );

        let mut index = TextIndex::open(dir.path()).unwrap();
        fs::remove_file(&path).unwrap();
        let hits = index.search("database", 5);
        assert_eq!(hits[0].2, "Database choice");
    }
}
