//! CLI handlers for the `kg graph` subcommands.
//!
//! Each handler opens the graph store for the corpus, runs one operation,
//! and prints the outcome. Mutations that report false (not found, unknown
//! source, duplicate edge) and validation failures exit non-zero; queries
//! with empty answers exit zero.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::graph::{Direction, GraphStore};
use crate::models::{GraphEdge, GraphNode, NodeKind, Relation};

fn parse_kind(s: &str) -> Result<NodeKind> {
    match NodeKind::parse(s) {
        Some(kind) => Ok(kind),
        None => bail!("Unknown node type: {}. Use Decision, Learning, Pattern, or Concept.", s),
    }
}

fn parse_relation(s: &str) -> Result<Relation> {
    match Relation::parse(s) {
        Some(relation) => Ok(relation),
        None => {
            let names: Vec<&str> = Relation::ALL.iter().map(|r| r.as_str()).collect();
            bail!("Unknown relation: {}. Use one of: {}.", s, names.join(", "))
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_add(
    corpus_root: &Path,
    id: &str,
    kind: &str,
    title: &str,
    status: &str,
    phases: Vec<i64>,
    concepts: Vec<String>,
    tags: Vec<String>,
) -> Result<()> {
    let mut store = GraphStore::open(corpus_root);
    let existed = store.get_node(id).is_some();
    store.add_node(GraphNode {
        id: id.to_string(),
        kind: parse_kind(kind)?,
        title: title.to_string(),
        status: status.to_string(),
        phases,
        concepts,
        tags,
    })?;
    if existed {
        println!("Updated node {}", id);
    } else {
        println!("Added node {}", id);
    }
    Ok(())
}

pub fn run_delete(corpus_root: &Path, id: &str) -> Result<()> {
    let mut store = GraphStore::open(corpus_root);
    if !store.delete_node(id)? {
        eprintln!("Error: node not found: {}", id);
        std::process::exit(1);
    }
    println!("Deleted node {} and its edges", id);
    Ok(())
}

pub fn run_neighbors(
    corpus_root: &Path,
    id: &str,
    hops: usize,
    direction: &str,
    relations: Vec<String>,
) -> Result<()> {
    let direction = match Direction::parse(direction) {
        Some(direction) => direction,
        None => bail!("Unknown direction: {}. Use outgoing, incoming, or both.", direction),
    };
    let filter: Vec<Relation> = relations
        .iter()
        .map(|s| parse_relation(s))
        .collect::<Result<_>>()?;

    let store = GraphStore::open(corpus_root);
    let filter = if filter.is_empty() { None } else { Some(filter.as_slice()) };
    let neighbors = store.get_neighbors(id, hops, filter, direction);
    if neighbors.is_empty() {
        println!("No neighbors.");
        return Ok(());
    }
    println!("Neighbors of {} within {} hop(s):", id, hops);
    for neighbor in &neighbors {
        match store.get_node(neighbor) {
            Some(node) => println!("  {} [{}] {}", node.id, node.kind, node.title),
            None => println!("  {} (external)", neighbor),
        }
    }
    Ok(())
}

pub fn run_path(corpus_root: &Path, source: &str, target: &str, max_hops: usize) -> Result<()> {
    let store = GraphStore::open(corpus_root);
    match store.find_path(source, target, max_hops) {
        Some(path) => println!("{}", path.join(" -> ")),
        None => println!("No path found within {} hops.", max_hops),
    }
    Ok(())
}

pub fn run_edge(
    corpus_root: &Path,
    source: &str,
    relation: &str,
    target: &str,
    reason: Option<String>,
) -> Result<()> {
    let relation = parse_relation(relation)?;
    let mut store = GraphStore::open(corpus_root);
    let added = store.add_edge(GraphEdge {
        source: source.to_string(),
        relation,
        target: target.to_string(),
        reason,
    })?;
    if !added {
        eprintln!(
            "Error: edge not added: source '{}' unknown or edge already exists",
            source
        );
        std::process::exit(1);
    }
    println!("Added edge {} -{}-> {}", source, relation, target);
    Ok(())
}

pub fn run_remove_edge(
    corpus_root: &Path,
    source: &str,
    relation: &str,
    target: &str,
) -> Result<()> {
    let relation = parse_relation(relation)?;
    let mut store = GraphStore::open(corpus_root);
    if !store.remove_edge(source, relation, target)? {
        eprintln!("Error: no such edge: {} -{}-> {}", source, relation, target);
        std::process::exit(1);
    }
    println!("Removed edge {} -{}-> {}", source, relation, target);
    Ok(())
}

pub fn run_closure(corpus_root: &Path, id: &str, relation: &str, max_depth: usize) -> Result<()> {
    let relation = parse_relation(relation)?;
    let store = GraphStore::open(corpus_root);
    let reachable = store.get_transitive_closure(id, relation, max_depth);
    if reachable.is_empty() {
        println!("Nothing reachable from {} via {}.", id, relation);
        return Ok(());
    }
    println!("Reachable from {} via {}:", id, relation);
    for node_id in &reachable {
        println!("  {}", node_id);
    }
    Ok(())
}

pub fn run_stats(corpus_root: &Path) -> Result<()> {
    let store = GraphStore::open(corpus_root);
    let stats = store.stats();

    println!("Knowledge Graph — Stats");
    println!("=======================");
    println!();
    println!("  Nodes: {}", stats.total_nodes);
    println!("  Edges: {}", stats.total_edges);

    if !stats.node_types.is_empty() {
        println!();
        println!("  By type:");
        for (kind, count) in &stats.node_types {
            println!("    {:<12} {}", kind, count);
        }
    }
    if !stats.relation_types.is_empty() {
        println!();
        println!("  By relation:");
        for (relation, count) in &stats.relation_types {
            println!("    {:<14} {}", relation, count);
        }
    }
    if !stats.top_central_nodes.is_empty() {
        println!();
        println!("  Most connected:");
        for (id, degree) in &stats.top_central_nodes {
            println!("    {:<16} degree {}", id, degree);
        }
    }
    println!();
    Ok(())
}

pub fn run_validate(config: &Config, corpus_root: &Path) -> Result<()> {
    let store = GraphStore::open(corpus_root);
    let errors = store.validate(&config.graph.external_ref_prefixes);
    if errors.is_empty() {
        println!("Graph is consistent.");
        return Ok(());
    }
    for error in &errors {
        println!("  {}", error);
    }
    eprintln!("Error: {} consistency error(s) found", errors.len());
    std::process::exit(1);
}

pub fn run_list(corpus_root: &Path, kind: Option<&str>) -> Result<()> {
    let kind = match kind {
        Some(kind) => Some(parse_kind(kind)?),
        None => None,
    };
    let store = GraphStore::open(corpus_root);
    let nodes = store.list_nodes(kind);
    if nodes.is_empty() {
        println!("No nodes.");
        return Ok(());
    }
    println!("{:<16} {:<10} TITLE", "ID", "TYPE");
    for node in nodes {
        println!("{:<16} {:<10} {}", node.id, node.kind, node.title);
    }
    Ok(())
}
