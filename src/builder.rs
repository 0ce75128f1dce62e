//! Graph construction from corpus documents.
//!
//! The builder rederives `graph.json` and `adjacency.json` from the YAML
//! node files: a full scan parses every document into nodes and edges, an
//! optional inference pass connects nodes that share concepts, and the
//! adjacency index is always recomputed wholesale from the final node and
//! edge lists. Incremental mode replaces a single node's entry without
//! rescanning the rest of the corpus.

use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::document::{self, NodeDocument};
use crate::graph::GraphStore;
use crate::models::{GraphEdge, GraphNode, NodeAdjacency, Relation};

pub struct GraphBuilder {
    corpus_root: PathBuf,
    documents: Vec<NodeDocument>,
    edges: Vec<GraphEdge>,
}

impl GraphBuilder {
    pub fn new(corpus_root: &Path) -> GraphBuilder {
        GraphBuilder {
            corpus_root: corpus_root.to_path_buf(),
            documents: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Parses every corpus document into the builder. Files that fail to
    /// parse are reported on stderr and skipped. Returns the number of
    /// files that were skipped.
    ///
    /// Duplicate IDs within the primary scan overwrite the earlier
    /// document in place (last write wins); legacy-path documents only
    /// fill in IDs not already present.
    pub fn scan_corpus(&mut self) -> usize {
        let mut skipped = 0;

        let mut nodes_root = self.corpus_root.join("nodes");
        if !nodes_root.exists() {
            nodes_root = self.corpus_root.clone();
        }

        for category in document::CATEGORY_DIRS {
            let dir = nodes_root.join(category);
            for path in document::node_files(&dir, &["yml", "yaml"], false) {
                match document::parse_node_file(&path) {
                    Ok(doc) => self.insert(doc, true),
                    Err(e) => {
                        eprintln!("Warning: skipping {}", e);
                        skipped += 1;
                    }
                }
            }
        }

        for legacy in document::legacy_dirs(&self.corpus_root) {
            for path in document::node_files(&legacy, &["yml", "yaml"], true) {
                match document::parse_node_file(&path) {
                    Ok(doc) => self.insert(doc, false),
                    Err(e) => {
                        eprintln!("Warning: skipping {}", e);
                        skipped += 1;
                    }
                }
            }
        }

        skipped
    }

    fn insert(&mut self, doc: NodeDocument, overwrite: bool) {
        match self.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => {
                if overwrite {
                    *existing = doc;
                }
            }
            None => self.documents.push(doc),
        }
    }

    /// Flattens every document's declared relations into the edge list.
    /// Relation names outside the closed set are reported and skipped.
    pub fn build_edges(&mut self) {
        self.edges.clear();
        for doc in &self.documents {
            for rel in &doc.relations {
                let relation = match Relation::parse(&rel.relation) {
                    Some(relation) => relation,
                    None => {
                        eprintln!(
                            "Warning: {}: unknown relation '{}' (target {})",
                            doc.id, rel.relation, rel.target
                        );
                        continue;
                    }
                };
                self.edges.push(GraphEdge {
                    source: doc.id.clone(),
                    relation,
                    target: rel.target.clone(),
                    reason: rel.reason.clone(),
                });
            }
        }
    }

    /// Connects every pair of nodes that share at least one concept and
    /// have no existing edge between them, in either direction, with a
    /// single `relatedTo` edge. Returns the number of edges added.
    pub fn infer_relations(&mut self) -> usize {
        let mut connected: HashSet<(String, String)> = HashSet::new();
        for edge in &self.edges {
            connected.insert((edge.source.clone(), edge.target.clone()));
            connected.insert((edge.target.clone(), edge.source.clone()));
        }

        let mut added = 0;
        for i in 0..self.documents.len() {
            for j in (i + 1)..self.documents.len() {
                let (a, b) = (&self.documents[i], &self.documents[j]);
                if connected.contains(&(a.id.clone(), b.id.clone())) {
                    continue;
                }
                let shared: Vec<&str> = a
                    .concepts
                    .iter()
                    .filter(|concept| b.concepts.contains(concept))
                    .map(String::as_str)
                    .collect();
                if shared.is_empty() {
                    continue;
                }

                self.edges.push(GraphEdge {
                    source: a.id.clone(),
                    relation: Relation::RelatedTo,
                    target: b.id.clone(),
                    reason: Some(format!("shared concepts: {}", shared.join(", "))),
                });
                connected.insert((a.id.clone(), b.id.clone()));
                connected.insert((b.id.clone(), a.id.clone()));
                added += 1;
            }
        }
        added
    }

    pub fn nodes(&self) -> Vec<GraphNode> {
        self.documents.iter().map(to_graph_node).collect()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Writes `graph.json` and `adjacency.json`, recomputing the adjacency
    /// projection from the current node and edge lists.
    pub fn save(&self) -> Result<()> {
        let nodes = self.nodes();
        let adjacency = project_adjacency(&nodes, &self.edges);
        let mut store = GraphStore::open(&self.corpus_root);
        store.replace(nodes, self.edges.clone(), adjacency)
    }
}

fn to_graph_node(doc: &NodeDocument) -> GraphNode {
    GraphNode {
        id: doc.id.clone(),
        kind: doc.kind,
        title: doc.title.clone(),
        status: doc.status.clone(),
        phases: doc.phases.clone(),
        concepts: doc.concepts.clone(),
        tags: doc.tags.clone(),
    }
}

/// Derives the adjacency index from a node and edge list: an empty entry
/// per known node, targets appended (deduped) to the source's outgoing
/// bucket, and sources appended (deduped) to a known target's incoming
/// bucket under the relation's inverse name. Edges to external targets
/// populate the outgoing side only.
pub(crate) fn project_adjacency(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
) -> BTreeMap<String, NodeAdjacency> {
    let mut adjacency: BTreeMap<String, NodeAdjacency> = nodes
        .iter()
        .map(|node| (node.id.clone(), NodeAdjacency::default()))
        .collect();

    for edge in edges {
        if let Some(source_adj) = adjacency.get_mut(&edge.source) {
            let outgoing = source_adj
                .outgoing
                .entry(edge.relation.as_str().to_string())
                .or_default();
            if !outgoing.contains(&edge.target) {
                outgoing.push(edge.target.clone());
            }
        }
        if edge.source != edge.target {
            if let Some(target_adj) = adjacency.get_mut(&edge.target) {
                let incoming = target_adj
                    .incoming
                    .entry(edge.relation.inverse_name().to_string())
                    .or_default();
                if !incoming.contains(&edge.source) {
                    incoming.push(edge.source.clone());
                }
            }
        }
    }

    adjacency
}

/// Incremental rebuild for one changed file: the prior node entry and all
/// edges it sourced are dropped, the file is re-parsed, and the adjacency
/// projection is recomputed wholesale before saving. Unlike the batch
/// scan, a parse failure here propagates to the caller.
pub fn update_single_file(corpus_root: &Path, path: &Path) -> Result<String> {
    let doc = document::parse_node_file(path)?;

    let mut store = GraphStore::open(corpus_root);
    let mut nodes: Vec<GraphNode> = store.nodes().to_vec();
    let mut edges: Vec<GraphEdge> = store.edges().to_vec();

    nodes.retain(|node| node.id != doc.id);
    edges.retain(|edge| edge.source != doc.id);

    for rel in &doc.relations {
        let relation = match Relation::parse(&rel.relation) {
            Some(relation) => relation,
            None => {
                eprintln!(
                    "Warning: {}: unknown relation '{}' (target {})",
                    doc.id, rel.relation, rel.target
                );
                continue;
            }
        };
        edges.push(GraphEdge {
            source: doc.id.clone(),
            relation,
            target: rel.target.clone(),
            reason: rel.reason.clone(),
        });
    }
    let id = doc.id.clone();
    nodes.push(to_graph_node(&doc));

    let adjacency = project_adjacency(&nodes, &edges);
    store.replace(nodes, edges, adjacency)?;
    Ok(id)
}

/// CLI entry point for `kg build`.
pub fn run_build(
    corpus_root: &Path,
    infer: bool,
    dry_run: bool,
    incremental: Option<&Path>,
) -> Result<()> {
    if let Some(path) = incremental {
        match update_single_file(corpus_root, path) {
            Ok(id) => {
                println!("build (incremental)");
                println!("  updated node: {}", id);
                println!("ok");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut builder = GraphBuilder::new(corpus_root);
    let skipped = builder.scan_corpus();
    builder.build_edges();
    let inferred = if infer { builder.infer_relations() } else { 0 };

    println!("build{}", if dry_run { " (dry-run)" } else { "" });
    println!("  nodes: {}", builder.documents.len());
    println!("  edges: {}", builder.edges.len());
    if infer {
        println!("  inferred relatedTo edges: {}", inferred);
    }
    if skipped > 0 {
        println!("  skipped files: {}", skipped);
    }

    if !dry_run {
        builder.save()?;
        println!(
            "  wrote {} and {}",
            corpus_root.join("graph.json").display(),
            corpus_root.join("adjacency.json").display()
        );
    }
    println!("ok");
    Ok(())
}
