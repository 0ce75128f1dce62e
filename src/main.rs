//! # Corpus Graph CLI (`kg`)
//!
//! The `kg` binary is the interface to the knowledge corpus: it rebuilds
//! the graph from the YAML node files, answers hybrid (keyword + graph)
//! search queries re-ranked by freshness, and exposes direct graph CRUD
//! and traversal.
//!
//! ## Usage
//!
//! ```bash
//! kg --config ./kg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kg build` | Rebuild graph.json and adjacency.json from the corpus |
//! | `kg search "<query>"` | Hybrid search over the corpus |
//! | `kg graph add` | Add or update a node |
//! | `kg graph edge` | Add an edge between nodes |
//! | `kg graph neighbors <id>` | BFS neighbor expansion |
//! | `kg graph path <a> <b>` | Shortest path between two nodes |
//! | `kg graph validate` | Consistency check (non-zero exit on errors) |
//!
//! ## Examples
//!
//! ```bash
//! # Rebuild the graph, inferring relatedTo edges from shared concepts
//! kg build --infer
//!
//! # Freshness-aware hybrid search
//! kg search "database migration" --mode hybrid --limit 5
//!
//! # Graph-only expansion around a query
//! kg search "caching" --mode graph --hops 3
//!
//! # Everything a decision transitively supersedes
//! kg graph closure DEC-042 --relation supersedes
//! ```

use clap::{Parser, Subcommand};
use corpus_graph::builder;
use corpus_graph::config;
use corpus_graph::graph_cmd;
use corpus_graph::search::{self, SearchFilters};
use std::path::PathBuf;

/// Corpus Graph CLI — hybrid keyword + graph search over a YAML knowledge
/// corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file and a `--corpus` flag overriding the corpus root directory.
#[derive(Parser)]
#[command(
    name = "kg",
    about = "Corpus Graph — hybrid keyword + graph search over a YAML knowledge corpus",
    version,
    long_about = "Corpus Graph maintains a knowledge graph derived from YAML node files \
    (decisions, learnings, patterns, concepts), a TF-IDF text index over the same files, \
    and answers hybrid search queries that merge keyword relevance with graph proximity \
    and re-rank by an externally computed freshness score."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./kg.toml`. A missing file uses built-in defaults.
    #[arg(long, global = true, default_value = "./kg.toml")]
    config: PathBuf,

    /// Corpus root directory, overriding `[corpus].root` from the config.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Search the corpus.
    ///
    /// Runs the requested channels (text, graph, or both), merges them with
    /// the configured weights, applies the freshness boost, and prints a
    /// ranked result list.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `text` (TF-IDF only), `graph` (expansion + concept
        /// match only), or `hybrid` (weighted merge).
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Graph expansion depth from the top text hits.
        #[arg(long)]
        hops: Option<usize>,

        /// Only return nodes tagged with this phase.
        #[arg(long)]
        phase: Option<i64>,

        /// Only return nodes whose concepts contain this string.
        #[arg(long)]
        concept: Option<String>,

        /// Only return nodes of this type (Decision, Learning, Pattern, Concept).
        #[arg(long = "type")]
        node_type: Option<String>,

        /// Print results as JSON instead of the human-readable list.
        #[arg(long)]
        json: bool,

        /// Rebuild the text index from the corpus before searching.
        #[arg(long)]
        rebuild: bool,
    },

    /// Rebuild graph.json and adjacency.json from the corpus documents.
    ///
    /// Scans the node-type directories (plus legacy locations), derives
    /// nodes and edges, and writes both artifacts. Files that fail to parse
    /// are skipped with a warning.
    Build {
        /// Infer `relatedTo` edges between nodes that share a concept.
        #[arg(long)]
        infer: bool,

        /// Show node and edge counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Re-derive the graph entry for one changed file instead of
        /// rescanning the whole corpus. Parse errors are fatal here.
        #[arg(long, value_name = "FILE")]
        incremental: Option<PathBuf>,
    },

    /// Direct graph operations (CRUD, traversal, diagnostics).
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
}

/// Graph subcommands.
#[derive(Subcommand)]
enum GraphAction {
    /// Add a node, or update it if the ID already exists.
    Add {
        #[arg(long)]
        id: String,
        /// Node type: Decision, Learning, Pattern, or Concept.
        #[arg(long = "type")]
        node_type: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "active")]
        status: String,
        #[arg(long, num_args = 0..)]
        phases: Vec<i64>,
        #[arg(long, num_args = 0..)]
        concepts: Vec<String>,
        #[arg(long, num_args = 0..)]
        tags: Vec<String>,
    },

    /// Delete a node and every edge touching it.
    Delete {
        /// Node ID.
        id: String,
    },

    /// List nodes reachable within a number of hops.
    Neighbors {
        /// Origin node ID.
        id: String,
        #[arg(long, default_value_t = 1)]
        hops: usize,
        /// Edge directions to follow: outgoing, incoming, or both.
        #[arg(long, default_value = "both")]
        direction: String,
        /// Restrict traversal to these relations.
        #[arg(long, num_args = 0..)]
        relations: Vec<String>,
    },

    /// Find the shortest path between two nodes.
    ///
    /// Only the path length is guaranteed; among equal-length paths the
    /// one returned depends on traversal order.
    Path {
        source: String,
        target: String,
        #[arg(long, default_value_t = 6)]
        max_hops: usize,
    },

    /// Add an edge. The source must exist; the target may be an external
    /// reference. Duplicate (source, relation, target) triples are
    /// rejected.
    Edge {
        #[arg(long)]
        source: String,
        #[arg(long)]
        relation: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Remove an exact (source, relation, target) edge.
    RemoveEdge {
        #[arg(long)]
        source: String,
        #[arg(long)]
        relation: String,
        #[arg(long)]
        target: String,
    },

    /// All nodes reachable by repeatedly following one relation.
    Closure {
        /// Origin node ID.
        id: String,
        #[arg(long)]
        relation: String,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },

    /// Node, edge, and connectivity summary.
    Stats,

    /// Check graph consistency (orphan edges, missing adjacency entries).
    ///
    /// Exits non-zero when errors are found; nothing is auto-repaired.
    Validate,

    /// List nodes, optionally restricted to one type.
    List {
        /// Node type: Decision, Learning, Pattern, or Concept.
        #[arg(long = "type")]
        node_type: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let corpus_root = cli.corpus.unwrap_or_else(|| cfg.corpus.root.clone());

    match cli.command {
        Commands::Search {
            query,
            mode,
            limit,
            hops,
            phase,
            concept,
            node_type,
            json,
            rebuild,
        } => {
            let kind = match node_type.as_deref() {
                Some(s) => match corpus_graph::models::NodeKind::parse(s) {
                    Some(kind) => Some(kind),
                    None => anyhow::bail!(
                        "Unknown node type: {}. Use Decision, Learning, Pattern, or Concept.",
                        s
                    ),
                },
                None => None,
            };
            let filters = SearchFilters {
                phase,
                concept,
                kind,
            };
            search::run_search(
                &cfg,
                &corpus_root,
                &query,
                &mode,
                limit,
                hops,
                filters,
                json,
                rebuild,
            )?;
        }
        Commands::Build {
            infer,
            dry_run,
            incremental,
        } => {
            builder::run_build(&corpus_root, infer, dry_run, incremental.as_deref())?;
        }
        Commands::Graph { action } => match action {
            GraphAction::Add {
                id,
                node_type,
                title,
                status,
                phases,
                concepts,
                tags,
            } => {
                graph_cmd::run_add(
                    &corpus_root,
                    &id,
                    &node_type,
                    &title,
                    &status,
                    phases,
                    concepts,
                    tags,
                )?;
            }
            GraphAction::Delete { id } => {
                graph_cmd::run_delete(&corpus_root, &id)?;
            }
            GraphAction::Neighbors {
                id,
                hops,
                direction,
                relations,
            } => {
                graph_cmd::run_neighbors(&corpus_root, &id, hops, &direction, relations)?;
            }
            GraphAction::Path {
                source,
                target,
                max_hops,
            } => {
                graph_cmd::run_path(&corpus_root, &source, &target, max_hops)?;
            }
            GraphAction::Edge {
                source,
                relation,
                target,
                reason,
            } => {
                graph_cmd::run_edge(&corpus_root, &source, &relation, &target, reason)?;
            }
            GraphAction::RemoveEdge {
                source,
                relation,
                target,
            } => {
                graph_cmd::run_remove_edge(&corpus_root, &source, &relation, &target)?;
            }
            GraphAction::Closure {
                id,
                relation,
                max_depth,
            } => {
                graph_cmd::run_closure(&corpus_root, &id, &relation, max_depth)?;
            }
            GraphAction::Stats => {
                graph_cmd::run_stats(&corpus_root)?;
            }
            GraphAction::Validate => {
                graph_cmd::run_validate(&cfg, &corpus_root)?;
            }
            GraphAction::List { node_type } => {
                graph_cmd::run_list(&corpus_root, node_type.as_deref())?;
            }
        },
    }

    Ok(())
}
