//! Persistent graph store and traversal.
//!
//! The store owns the two corpus artifacts, `graph.json` (nodes and edges)
//! and `adjacency.json` (the derived per-node index used for traversal), and
//! keeps them consistent: every mutation updates the adjacency projection and
//! writes both files before returning. Missing or unreadable files load as an
//! empty graph, so a cold corpus is a valid, queryable state.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::models::{
    AdjacencyFile, GraphEdge, GraphFile, GraphNode, NodeAdjacency, NodeKind, Relation,
};

/// Which edge directions a query follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "outgoing" => Some(Direction::Outgoing),
            "incoming" => Some(Direction::Incoming),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }

    fn follows_outgoing(&self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }

    fn follows_incoming(&self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }
}

/// Aggregate counts reported by `kg graph stats`.
#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: BTreeMap<String, usize>,
    pub relation_types: BTreeMap<String, usize>,
    pub top_central_nodes: Vec<(String, usize)>,
}

pub struct GraphStore {
    corpus_root: PathBuf,
    graph_file: PathBuf,
    adjacency_file: PathBuf,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    adjacency: BTreeMap<String, NodeAdjacency>,
}

impl GraphStore {
    /// Opens the graph for a corpus. Missing or unreadable files yield an
    /// empty graph.
    pub fn open(corpus_root: &Path) -> GraphStore {
        let mut store = GraphStore {
            corpus_root: corpus_root.to_path_buf(),
            graph_file: corpus_root.join("graph.json"),
            adjacency_file: corpus_root.join("adjacency.json"),
            nodes: Vec::new(),
            edges: Vec::new(),
            adjacency: BTreeMap::new(),
        };
        store.load();
        store
    }

    fn load(&mut self) {
        if let Ok(raw) = std::fs::read_to_string(&self.graph_file) {
            if let Ok(graph) = serde_json::from_str::<GraphFile>(&raw) {
                self.nodes = graph.nodes;
                self.edges = graph.edges;
            }
        }
        if let Ok(raw) = std::fs::read_to_string(&self.adjacency_file) {
            if let Ok(adjacency) = serde_json::from_str::<AdjacencyFile>(&raw) {
                self.adjacency = adjacency.adjacency;
            }
        }
        for node in &mut self.nodes {
            if node.title.is_empty() {
                node.title = node.id.clone();
            }
        }
    }

    /// Writes both artifacts, refreshing timestamps and adjacency metadata.
    fn save(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        std::fs::create_dir_all(&self.corpus_root)
            .with_context(|| format!("Failed to create {}", self.corpus_root.display()))?;

        let graph = GraphFile {
            updated_at: Some(now.clone()),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            ..GraphFile::default()
        };
        let json = serde_json::to_string_pretty(&graph)?;
        std::fs::write(&self.graph_file, json)
            .with_context(|| format!("Failed to write {}", self.graph_file.display()))?;

        let mut adjacency = AdjacencyFile {
            adjacency: self.adjacency.clone(),
            ..AdjacencyFile::default()
        };
        adjacency.metadata.node_count = self.nodes.len();
        adjacency.metadata.edge_count = self.edges.len();
        adjacency.metadata.last_updated = Some(now);
        let json = serde_json::to_string_pretty(&adjacency)?;
        std::fs::write(&self.adjacency_file, json)
            .with_context(|| format!("Failed to write {}", self.adjacency_file.display()))?;

        Ok(())
    }

    /// Replaces the entire graph contents and persists them. Used by the
    /// builder, which assembles nodes, edges, and adjacency wholesale.
    pub fn replace(
        &mut self,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        adjacency: BTreeMap<String, NodeAdjacency>,
    ) -> Result<()> {
        self.nodes = nodes;
        self.edges = edges;
        self.adjacency = adjacency;
        self.save()
    }

    // ==================== Node operations ====================

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn get_node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// Adds a node, degrading to [`update_node`](Self::update_node) when the
    /// ID already exists. Persists on success.
    pub fn add_node(&mut self, node: GraphNode) -> Result<bool> {
        if self.get_node(&node.id).is_some() {
            let id = node.id.clone();
            return self.update_node(&id, node);
        }

        self.adjacency
            .insert(node.id.clone(), NodeAdjacency::default());
        self.nodes.push(node);
        self.save()?;
        Ok(true)
    }

    /// Replaces an existing node's data. The stored ID is preserved even if
    /// the replacement carries a different one. Returns false when the node
    /// does not exist.
    pub fn update_node(&mut self, node_id: &str, mut node: GraphNode) -> Result<bool> {
        match self.nodes.iter_mut().find(|n| n.id == node_id) {
            Some(existing) => {
                node.id = node_id.to_string();
                *existing = node;
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes a node along with every edge touching it, scrubbing it out of
    /// other nodes' adjacency lists. Returns false when the node does not
    /// exist.
    pub fn delete_node(&mut self, node_id: &str) -> Result<bool> {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != node_id);
        if self.nodes.len() == before {
            return Ok(false);
        }

        self.edges
            .retain(|edge| edge.source != node_id && edge.target != node_id);

        self.adjacency.remove(node_id);
        for adj in self.adjacency.values_mut() {
            for targets in adj.outgoing.values_mut() {
                targets.retain(|target| target != node_id);
            }
            for sources in adj.incoming.values_mut() {
                sources.retain(|source| source != node_id);
            }
        }

        self.save()?;
        Ok(true)
    }

    pub fn list_nodes(&self, kind: Option<NodeKind>) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|node| kind.map_or(true, |k| node.kind == k))
            .collect()
    }

    /// Nodes whose concept list contains `concept` as a case-insensitive
    /// substring.
    pub fn find_by_concept(&self, concept: &str) -> Vec<String> {
        let needle = concept.to_lowercase();
        self.nodes
            .iter()
            .filter(|node| {
                node.concepts
                    .iter()
                    .any(|c| c.to_lowercase().contains(&needle))
            })
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn find_by_phase(&self, phase: i64) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.phases.contains(&phase))
            .map(|node| node.id.clone())
            .collect()
    }

    // ==================== Edge operations ====================

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Adds an edge. The source must be a known node; the target may be an
    /// external reference. Returns false for an unknown source or when the
    /// same (source, relation, target) triple already exists.
    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<bool> {
        if self.get_node(&edge.source).is_none() {
            return Ok(false);
        }
        let duplicate = self.edges.iter().any(|e| {
            e.source == edge.source && e.relation == edge.relation && e.target == edge.target
        });
        if duplicate {
            return Ok(false);
        }

        let source_adj = self.adjacency.entry(edge.source.clone()).or_default();
        let outgoing = source_adj
            .outgoing
            .entry(edge.relation.as_str().to_string())
            .or_default();
        if !outgoing.contains(&edge.target) {
            outgoing.push(edge.target.clone());
        }

        // The incoming side exists only for targets that are known nodes.
        if let Some(target_adj) = self.adjacency.get_mut(&edge.target) {
            let incoming = target_adj
                .incoming
                .entry(edge.relation.inverse_name().to_string())
                .or_default();
            if !incoming.contains(&edge.source) {
                incoming.push(edge.source.clone());
            }
        }

        self.edges.push(edge);
        self.save()?;
        Ok(true)
    }

    /// Removes the exact (source, relation, target) triple. Returns false
    /// when no such edge exists.
    pub fn remove_edge(&mut self, source: &str, relation: Relation, target: &str) -> Result<bool> {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.source == source && e.relation == relation && e.target == target));
        if self.edges.len() == before {
            return Ok(false);
        }

        if let Some(source_adj) = self.adjacency.get_mut(source) {
            if let Some(targets) = source_adj.outgoing.get_mut(relation.as_str()) {
                targets.retain(|t| t != target);
            }
        }
        if let Some(target_adj) = self.adjacency.get_mut(target) {
            if let Some(sources) = target_adj.incoming.get_mut(relation.inverse_name()) {
                sources.retain(|s| s != source);
            }
        }

        self.save()?;
        Ok(true)
    }

    /// Edges touching a node. With `Direction::Both`, outgoing edges come
    /// first; a self-loop is reported on both sides.
    pub fn get_edges(&self, node_id: &str, direction: Direction) -> Vec<&GraphEdge> {
        let mut edges = Vec::new();
        if direction.follows_outgoing() {
            edges.extend(self.edges.iter().filter(|e| e.source == node_id));
        }
        if direction.follows_incoming() {
            edges.extend(self.edges.iter().filter(|e| e.target == node_id));
        }
        edges
    }

    pub(crate) fn adjacency_of(&self, node_id: &str) -> Option<&NodeAdjacency> {
        self.adjacency.get(node_id)
    }

    // ==================== Traversal ====================

    /// IDs of all nodes reachable within `hops` hops of `node_id`, the
    /// origin excluded, in ascending ID order. The relation filter matches
    /// the original relation on both the outgoing and incoming side; the
    /// filter is ignored for incoming entries whose name is not a known
    /// inverse.
    pub fn get_neighbors(
        &self,
        node_id: &str,
        hops: usize,
        relation_filter: Option<&[Relation]>,
        direction: Direction,
    ) -> Vec<String> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        visited.insert(node_id.to_string());
        let mut current_level: BTreeSet<String> = BTreeSet::new();
        current_level.insert(node_id.to_string());

        for _ in 0..hops {
            let mut next_level: BTreeSet<String> = BTreeSet::new();

            for current in &current_level {
                let adj = match self.adjacency.get(current) {
                    Some(adj) => adj,
                    None => continue,
                };

                if direction.follows_outgoing() {
                    for (relation, targets) in &adj.outgoing {
                        if let Some(filter) = relation_filter {
                            if !filter.iter().any(|r| r.as_str() == relation) {
                                continue;
                            }
                        }
                        for target in targets {
                            if !visited.contains(target) {
                                next_level.insert(target.clone());
                            }
                        }
                    }
                }

                if direction.follows_incoming() {
                    for (inverse, sources) in &adj.incoming {
                        if let Some(filter) = relation_filter {
                            if let Some(original) = Relation::from_inverse_name(inverse) {
                                if !filter.contains(&original) {
                                    continue;
                                }
                            }
                        }
                        for source in sources {
                            if !visited.contains(source) {
                                next_level.insert(source.clone());
                            }
                        }
                    }
                }
            }

            if next_level.is_empty() {
                break;
            }
            visited.extend(next_level.iter().cloned());
            current_level = next_level;
        }

        visited.remove(node_id);
        visited.into_iter().collect()
    }

    /// Shortest undirected path from `source` to `target` (BFS over both
    /// edge directions), capped at `max_hops` edges. A node is trivially
    /// connected to itself.
    pub fn find_path(&self, source: &str, target: &str, max_hops: usize) -> Option<Vec<String>> {
        if source == target {
            return Some(vec![source.to_string()]);
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(source.to_string());
        let mut queue: VecDeque<Vec<String>> = VecDeque::new();
        queue.push_back(vec![source.to_string()]);

        while let Some(path) = queue.pop_front() {
            if path.len() > max_hops {
                continue;
            }
            let current = match path.last() {
                Some(current) => current.clone(),
                None => continue,
            };

            for neighbor in self.get_neighbors(&current, 1, None, Direction::Both) {
                if neighbor == target {
                    let mut found = path.clone();
                    found.push(neighbor);
                    return Some(found);
                }
                if !visited.contains(&neighbor) {
                    visited.insert(neighbor.clone());
                    let mut next = path.clone();
                    next.push(neighbor);
                    queue.push_back(next);
                }
            }
        }

        None
    }

    /// Every node reachable from `node_id` by repeatedly following one
    /// relation's outgoing edges, up to `max_depth`. The origin is excluded
    /// and each node appears once, in discovery order.
    pub fn get_transitive_closure(
        &self,
        node_id: &str,
        relation: Relation,
        max_depth: usize,
    ) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((node_id.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if visited.contains(&current) || depth > max_depth {
                continue;
            }
            visited.insert(current.clone());

            let targets = self
                .adjacency
                .get(&current)
                .and_then(|adj| adj.outgoing.get(relation.as_str()));
            for target in targets.into_iter().flatten() {
                if !visited.contains(target) && !result.contains(target) {
                    result.push(target.clone());
                    queue.push_back((target.clone(), depth + 1));
                }
            }
        }

        result
    }

    /// The `top_n` nodes by degree (outgoing plus incoming adjacency list
    /// lengths), ties resolved by node insertion order.
    pub fn get_centrality(&self, top_n: usize) -> Vec<(String, usize)> {
        let mut degrees: Vec<(String, usize)> = self
            .nodes
            .iter()
            .map(|node| {
                let degree = self
                    .adjacency
                    .get(&node.id)
                    .map(|adj| {
                        let outgoing: usize = adj.outgoing.values().map(Vec::len).sum();
                        let incoming: usize = adj.incoming.values().map(Vec::len).sum();
                        outgoing + incoming
                    })
                    .unwrap_or(0);
                (node.id.clone(), degree)
            })
            .collect();

        degrees.sort_by(|a, b| b.1.cmp(&a.1));
        degrees.truncate(top_n);
        degrees
    }

    // ==================== Integrity ====================

    /// Integrity report: orphan edge endpoints and nodes missing from the
    /// adjacency index. Targets starting with one of the external reference
    /// prefixes are allowed to have no node.
    pub fn validate(&self, external_ref_prefixes: &[String]) -> Vec<String> {
        let mut errors = Vec::new();
        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        for edge in &self.edges {
            if !node_ids.contains(edge.source.as_str()) {
                errors.push(format!("Orphan edge: source '{}' not found", edge.source));
            }
            let external = external_ref_prefixes
                .iter()
                .any(|prefix| edge.target.starts_with(prefix.as_str()));
            if !node_ids.contains(edge.target.as_str()) && !external {
                errors.push(format!("Orphan edge: target '{}' not found", edge.target));
            }
        }

        for node in &self.nodes {
            if !self.adjacency.contains_key(&node.id) {
                errors.push(format!("Missing adjacency entry for node '{}'", node.id));
            }
        }

        errors
    }

    pub fn stats(&self) -> GraphStats {
        let mut node_types: BTreeMap<String, usize> = BTreeMap::new();
        for node in &self.nodes {
            *node_types.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
        }
        let mut relation_types: BTreeMap<String, usize> = BTreeMap::new();
        for edge in &self.edges {
            *relation_types
                .entry(edge.relation.as_str().to_string())
                .or_insert(0) += 1;
        }

        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            node_types,
            relation_types,
            top_central_nodes: self.get_centrality(5),
        }
    }
}
