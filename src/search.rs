//! Hybrid keyword + graph search.
//!
//! Merges two relevance channels over one corpus: TF-IDF keyword hits from
//! the text index, and graph proximity obtained by expanding outward from
//! the top text hits through the adjacency index. The weighted merge is
//! then re-ranked by a multiplicative freshness boost from the decay index,
//! so stale knowledge sinks without disappearing.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::decay::DecayIndex;
use crate::graph::{Direction, GraphStore};
use crate::models::{MatchType, NodeKind, SearchResult};
use crate::text_index::{self, TextIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Text,
    Graph,
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<SearchMode> {
        match s {
            "text" => Some(SearchMode::Text),
            "graph" => Some(SearchMode::Graph),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }

    fn includes_text(&self) -> bool {
        matches!(self, SearchMode::Text | SearchMode::Hybrid)
    }

    fn includes_graph(&self) -> bool {
        matches!(self, SearchMode::Graph | SearchMode::Hybrid)
    }
}

/// Candidate filters. Filtered-out candidates are dropped before the
/// merge, not down-weighted.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub phase: Option<i64>,
    pub concept: Option<String>,
    pub kind: Option<NodeKind>,
}

/// A graph-channel candidate: proximity score plus the first path that
/// reached it, when it was found by expansion rather than concept match.
struct GraphHit {
    score: f64,
    path: Option<Vec<String>>,
}

pub struct HybridSearcher {
    text_index: TextIndex,
    store: GraphStore,
    decay: DecayIndex,
    text_weight: f64,
    graph_weight: f64,
    decay_weight: f64,
    seed_count: usize,
}

impl HybridSearcher {
    /// Opens all three inputs for a corpus. A missing graph or decay file
    /// is a valid cold-start state; only text index I/O can fail here.
    pub fn open(corpus_root: &Path, config: &Config) -> Result<HybridSearcher> {
        Ok(HybridSearcher {
            text_index: TextIndex::open(corpus_root)?,
            store: GraphStore::open(corpus_root),
            decay: DecayIndex::open(corpus_root),
            text_weight: config.search.text_weight,
            graph_weight: config.search.graph_weight,
            decay_weight: config.search.decay_boost_weight,
            seed_count: config.search.seed_count,
        })
    }

    pub fn rebuild_index(&mut self) -> Result<()> {
        self.text_index.rebuild()
    }

    pub fn search(
        &mut self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        hops: usize,
        filters: &SearchFilters,
    ) -> Vec<SearchResult> {
        let query_tokens = text_index::tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut text_hits = if mode.includes_text() {
            self.text_index.search(query, limit * 2)
        } else {
            Vec::new()
        };

        let mut graph_hits = if mode.includes_graph() {
            self.expand_graph(&text_hits, &query_tokens, hops)
        } else {
            HashMap::new()
        };

        text_hits.retain(|(id, _, _)| self.passes_filters(id, filters));
        graph_hits.retain(|id, _| self.passes_filters(id, filters));

        let mut results = self.merge(&text_hits, &graph_hits, filters.kind);
        sort_results(&mut results);
        results.truncate(limit);

        // Freshness boost, then a final re-rank.
        for result in &mut results {
            let record = self.decay.get(&result.node_id);
            result.score *= self.decay_weight + (1.0 - self.decay_weight) * record.score;
            result.decay_score = Some(record.score);
            result.decay_status = Some(record.status);
        }
        sort_results(&mut results);

        results
    }

    /// Graph channel: BFS from the top text hits, scoring each reached
    /// node `1/(1+depth)` and keeping the best score and first-found path
    /// across seeds. Query tokens longer than three characters also pull
    /// in concept-matched nodes at a flat 0.4.
    fn expand_graph(
        &self,
        text_hits: &[(String, f64, String)],
        query_tokens: &[String],
        hops: usize,
    ) -> HashMap<String, GraphHit> {
        let mut hits: HashMap<String, GraphHit> = HashMap::new();

        for (seed, _, _) in text_hits.iter().take(self.seed_count) {
            let mut visited: Vec<String> = vec![seed.clone()];
            let mut frontier: Vec<(String, Vec<String>)> = vec![(seed.clone(), vec![seed.clone()])];

            for depth in 1..=hops {
                let mut next: Vec<(String, Vec<String>)> = Vec::new();
                let score = 1.0 / (1.0 + depth as f64);

                for (node, path) in &frontier {
                    for neighbor in self.store.get_neighbors(node, 1, None, Direction::Both) {
                        if visited.contains(&neighbor) {
                            continue;
                        }
                        visited.push(neighbor.clone());

                        let mut reached = path.clone();
                        reached.push(neighbor.clone());

                        let entry = hits.entry(neighbor.clone()).or_insert(GraphHit {
                            score,
                            path: Some(reached.clone()),
                        });
                        if score > entry.score {
                            entry.score = score;
                        }
                        next.push((neighbor, reached));
                    }
                }

                if next.is_empty() {
                    break;
                }
                frontier = next;
            }
        }

        for token in query_tokens {
            if token.len() <= 3 {
                continue;
            }
            for node_id in self.store.find_by_concept(token) {
                hits.entry(node_id)
                    .or_insert(GraphHit { score: 0.4, path: None });
            }
        }

        hits
    }

    /// Phase and concept membership, checked against the text index
    /// metadata when the node is indexed and the graph node otherwise.
    /// Unknown candidates pass only an empty filter.
    fn passes_filters(&self, node_id: &str, filters: &SearchFilters) -> bool {
        let (phases, concepts) = match self.text_index.get_document(node_id) {
            Some(doc) => (doc.phases.clone(), doc.concepts.clone()),
            None => match self.store.get_node(node_id) {
                Some(node) => (node.phases.clone(), node.concepts.clone()),
                None => (Vec::new(), Vec::new()),
            },
        };

        if let Some(phase) = filters.phase {
            if !phases.contains(&phase) {
                return false;
            }
        }
        if let Some(ref concept) = filters.concept {
            let needle = concept.to_lowercase();
            if !concepts.iter().any(|c| c.to_lowercase().contains(&needle)) {
                return false;
            }
        }
        true
    }

    fn merge(
        &self,
        text_hits: &[(String, f64, String)],
        graph_hits: &HashMap<String, GraphHit>,
        kind_filter: Option<NodeKind>,
    ) -> Vec<SearchResult> {
        let mut candidates: Vec<&str> = text_hits.iter().map(|(id, _, _)| id.as_str()).collect();
        for id in graph_hits.keys() {
            if !candidates.contains(&id.as_str()) {
                candidates.push(id);
            }
        }

        let text_map: HashMap<&str, (f64, &str)> = text_hits
            .iter()
            .map(|(id, score, snippet)| (id.as_str(), (*score, snippet.as_str())))
            .collect();

        let mut results = Vec::new();
        for id in candidates {
            let text = text_map.get(id);
            let graph = graph_hits.get(id);

            let text_score = text.map(|(score, _)| *score).unwrap_or(0.0);
            let graph_score = graph.map(|hit| hit.score).unwrap_or(0.0);
            let match_type = match (text.is_some(), graph.is_some()) {
                (true, true) => MatchType::Both,
                (true, false) => MatchType::Text,
                _ => MatchType::Graph,
            };

            let (title, kind) = match self.text_index.get_document(id) {
                Some(doc) => (doc.title.clone(), doc.kind),
                None => match self.store.get_node(id) {
                    Some(node) => (node.title.clone(), node.kind),
                    None => (id.to_string(), NodeKind::Decision),
                },
            };
            if let Some(wanted) = kind_filter {
                if kind != wanted {
                    continue;
                }
            }

            let path = graph.and_then(|hit| hit.path.clone());
            let snippet = match text {
                Some((_, snippet)) => snippet.to_string(),
                None => match &path {
                    Some(path) => format!("Related via: {}", path.join(" -> ")),
                    None => title.clone(),
                },
            };

            results.push(SearchResult {
                node_id: id.to_string(),
                title,
                kind,
                score: self.text_weight * text_score + self.graph_weight * graph_score,
                match_type,
                snippet,
                path_from_query: path,
                decay_score: None,
                decay_status: None,
            });
        }
        results
    }
}

/// Descending score, node ID as the deterministic tie-break.
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
}

/// CLI entry point for `kg search`.
#[allow(clippy::too_many_arguments)]
pub fn run_search(
    config: &Config,
    corpus_root: &Path,
    query: &str,
    mode: &str,
    limit: Option<usize>,
    hops: Option<usize>,
    filters: SearchFilters,
    json: bool,
    rebuild: bool,
) -> Result<()> {
    let mode = match SearchMode::parse(mode) {
        Some(mode) => mode,
        None => bail!("Unknown search mode: {}. Use text, graph, or hybrid.", mode),
    };

    let mut searcher = HybridSearcher::open(corpus_root, config)?;
    if rebuild {
        searcher.rebuild_index()?;
    }

    let limit = limit.unwrap_or(config.search.default_limit);
    let hops = hops.unwrap_or(config.search.default_hops);
    let mut results = searcher.search(query, mode, limit, hops, &filters);

    if json {
        for result in &mut results {
            result.score = (result.score * 1000.0).round() / 1000.0;
        }
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {} ({})",
            i + 1,
            result.score,
            result.kind,
            result.title,
            result.match_type.as_str()
        );
        if let (Some(status), Some(score)) = (&result.decay_status, result.decay_score) {
            println!("    freshness: {} ({:.2})", status, score);
        }
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        if let Some(ref path) = result.path_from_query {
            println!("    path: {}", path.join(" -> "));
        }
        println!("    id: {}", result.node_id);
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use std::fs;
    use std::path::Path;

    fn write_node(root: &Path, category: &str, name: &str, yaml: &str) {
        let dir = root.join("nodes").join(category);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), yaml).unwrap();
    }

    fn build_graph(root: &Path) {
        let mut builder = GraphBuilder::new(root);
        builder.scan_corpus();
        builder.build_edges();
        builder.save().unwrap();
    }

    fn searcher(root: &Path) -> HybridSearcher {
        HybridSearcher::open(root, &Config::default()).unwrap()
    }

    fn setup_linked_corpus(root: &Path) {
        write_node(
            root,
            "decisions",
            "dec-001.yml",
            r#"
id: DEC-001
title: Database Migration Strategy
context: phased database migration with dual writes
semantic:
  relations:
    - type: dependsOn
      target: DEC-002
"#,
        );
        write_node(
            root,
            "decisions",
            "dec-002.yml",
            "id: DEC-002\ntitle: Schema Conventions\ncontext: naming and versioning of schemas\n",
        );
        write_node(
            root,
            "learnings",
            "l-001.yml",
            "id: L-001\ntype: learning\ntitle: Backup cadence\ninsight: nightly snapshots were not enough\n",
        );
        build_graph(root);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(SearchMode::parse("hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(SearchMode::parse("keyword"), None);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        setup_linked_corpus(dir.path());
        let mut s = searcher(dir.path());
        assert!(s.search("", SearchMode::Hybrid, 5, 2, &SearchFilters::default()).is_empty());
        assert!(s.search("the of", SearchMode::Hybrid, 5, 2, &SearchFilters::default()).is_empty());
    }

    #[test]
    fn test_hybrid_pulls_in_graph_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        setup_linked_corpus(dir.path());
        let mut s = searcher(dir.path());

        let results = s.search("migration", SearchMode::Hybrid, 5, 2, &SearchFilters::default());
        let hit = results.iter().find(|r| r.node_id == "DEC-001").unwrap();
        assert_eq!(hit.match_type, MatchType::Text);
        assert!(hit.score > 0.0);

        // DEC-002 never mentions "migration" but neighbors the top hit.
        let neighbor = results.iter().find(|r| r.node_id == "DEC-002").unwrap();
        assert_eq!(neighbor.match_type, MatchType::Graph);
        assert_eq!(
            neighbor.path_from_query.as_deref(),
            Some(&["DEC-001".to_string(), "DEC-002".to_string()][..])
        );
        assert_eq!(neighbor.snippet, "Related via: DEC-001 -> DEC-002");

        // L-001 is disconnected and off-topic.
        assert!(!results.iter().any(|r| r.node_id == "L-001"));
    }

    #[test]
    fn test_text_mode_ignores_graph() {
        let dir = tempfile::tempdir().unwrap();
        setup_linked_corpus(dir.path());
        let mut s = searcher(dir.path());

        let results = s.search("migration", SearchMode::Text, 5, 2, &SearchFilters::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, "DEC-001");
    }

    #[test]
    fn test_graph_mode_matches_concepts_by_token() {
        let dir = tempfile::tempdir().unwrap();
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Cache layer\nsemantic:\n  concepts: [caching, redis]\n",
        );
        build_graph(dir.path());
        let mut s = searcher(dir.path());

        // Graph mode has no text seeds; the concept token is the only way in.
        let results = s.search("caching", SearchMode::Graph, 5, 2, &SearchFilters::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, "DEC-001");
        assert_eq!(results[0].match_type, MatchType::Graph);
        assert!((results[0].score - 0.3 * 0.4 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_filters_drop_candidates() {
        let dir = tempfile::tempdir().unwrap();
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database choice\ncontext: database\nsemantic:\n  phases: [1]\n  concepts: [postgres]\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-002.yml",
            "id: DEC-002\ntitle: Database sharding\ncontext: database\nsemantic:\n  phases: [2]\n  concepts: [postgres]\n",
        );
        build_graph(dir.path());
        let mut s = searcher(dir.path());

        let filters = SearchFilters {
            phase: Some(2),
            ..SearchFilters::default()
        };
        let results = s.search("database", SearchMode::Hybrid, 5, 2, &filters);
        let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["DEC-002"]);

        let filters = SearchFilters {
            concept: Some("Postgres".to_string()),
            ..SearchFilters::default()
        };
        assert_eq!(s.search("database", SearchMode::Hybrid, 5, 2, &filters).len(), 2);
    }

    #[test]
    fn test_type_filter_applied_at_merge() {
        let dir = tempfile::tempdir().unwrap();
        setup_linked_corpus(dir.path());
        let mut s = searcher(dir.path());

        let filters = SearchFilters {
            kind: Some(NodeKind::Learning),
            ..SearchFilters::default()
        };
        let results = s.search("backup snapshots", SearchMode::Hybrid, 5, 2, &filters);
        let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["L-001"]);
    }

    #[test]
    fn test_decay_boost_reranks_equal_scores() {
        let dir = tempfile::tempdir().unwrap();
        // Identical text so the pre-boost scores tie.
        write_node(
            dir.path(),
            "decisions",
            "dec-001.yml",
            "id: DEC-001\ntitle: Database Migration Strategy\ncontext: migration plan\n",
        );
        write_node(
            dir.path(),
            "decisions",
            "dec-002.yml",
            "id: DEC-002\ntitle: Database Migration Strategy\ncontext: migration plan\n",
        );
        // Fillers keep the query terms' document frequency below N/2 so the
        // tied scores stay positive.
        write_node(
            dir.path(),
            "learnings",
            "l-001.yml",
            "id: L-001\ntype: learning\ninsight: retries need jitter\n",
        );
        write_node(
            dir.path(),
            "learnings",
            "l-002.yml",
            "id: L-002\ntype: learning\ninsight: alerts need ownership\n",
        );
        fs::write(
            dir.path().join("decay_index.json"),
            r#"{"nodes": {
                "DEC-001": {"score": 0.05, "status": "obsolete"},
                "DEC-002": {"score": 0.9, "status": "fresh"}
            }}"#,
        )
        .unwrap();
        build_graph(dir.path());
        let mut s = searcher(dir.path());

        let results = s.search("database migration", SearchMode::Hybrid, 5, 2, &SearchFilters::default());
        assert_eq!(results[0].node_id, "DEC-002");
        assert_eq!(results[0].decay_status.as_deref(), Some("fresh"));
        assert_eq!(results[1].node_id, "DEC-001");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_unscored_nodes_get_neutral_decay() {
        let dir = tempfile::tempdir().unwrap();
        setup_linked_corpus(dir.path());
        let mut s = searcher(dir.path());

        let results = s.search("migration", SearchMode::Text, 5, 2, &SearchFilters::default());
        assert_eq!(results[0].decay_score, Some(0.5));
        assert_eq!(results[0].decay_status.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_cold_corpus_is_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = searcher(dir.path());
        assert!(s.search("anything", SearchMode::Hybrid, 5, 2, &SearchFilters::default()).is_empty());
    }
}
