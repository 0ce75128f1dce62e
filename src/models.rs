//! Core data models for the knowledge graph.
//!
//! These types represent the nodes, edges, and search results that flow
//! between the graph builder, the graph store, and the hybrid searcher.
//! The persisted `graph.json` / `adjacency.json` shapes serialize directly
//! from the file structs at the bottom of this module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Format version stamped into every persisted corpus artifact.
pub const CORPUS_FORMAT_VERSION: &str = "1.4.0";

/// The four kinds of knowledge node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    #[default]
    Decision,
    Learning,
    Pattern,
    Concept,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Decision => "Decision",
            NodeKind::Learning => "Learning",
            NodeKind::Pattern => "Pattern",
            NodeKind::Concept => "Concept",
        }
    }

    /// Strict parse of the four canonical names, for CLI arguments.
    pub fn parse(s: &str) -> Option<NodeKind> {
        match s {
            "Decision" => Some(NodeKind::Decision),
            "Learning" => Some(NodeKind::Learning),
            "Pattern" => Some(NodeKind::Pattern),
            "Concept" => Some(NodeKind::Concept),
            _ => None,
        }
    }

    /// Maps an explicit document `type` field to a node kind.
    ///
    /// Documents use looser vocabulary than the canonical kind names
    /// (`architectural`, `incident`, ...); unrecognized values return
    /// `None` so the caller can keep its path-derived default.
    pub fn from_field(value: &str) -> Option<NodeKind> {
        match value.to_ascii_lowercase().as_str() {
            "decision" | "architectural" | "technical" | "process" | "tool" => {
                Some(NodeKind::Decision)
            }
            "learning" | "incident" | "retrospective" | "discovery" => Some(NodeKind::Learning),
            "pattern" => Some(NodeKind::Pattern),
            "concept" => Some(NodeKind::Concept),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeKind::from_field(&s).unwrap_or_default())
    }
}

/// The closed set of semantic relations between nodes.
///
/// Each relation has a defined inverse name used for the adjacency
/// index's incoming side. Inverses exist only in that projection and
/// are never written as persisted edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    Supersedes,
    Implements,
    Addresses,
    CausedBy,
    RelatedTo,
    DependsOn,
    UsedIn,
    IsA,
    PartOf,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Supersedes,
        Relation::Implements,
        Relation::Addresses,
        Relation::CausedBy,
        Relation::RelatedTo,
        Relation::DependsOn,
        Relation::UsedIn,
        Relation::IsA,
        Relation::PartOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Supersedes => "supersedes",
            Relation::Implements => "implements",
            Relation::Addresses => "addresses",
            Relation::CausedBy => "causedBy",
            Relation::RelatedTo => "relatedTo",
            Relation::DependsOn => "dependsOn",
            Relation::UsedIn => "usedIn",
            Relation::IsA => "isA",
            Relation::PartOf => "partOf",
        }
    }

    /// Name under which this relation appears on the incoming side of
    /// the adjacency index. `relatedTo` is its own inverse.
    pub fn inverse_name(&self) -> &'static str {
        match self {
            Relation::Supersedes => "supersededBy",
            Relation::Implements => "implementedBy",
            Relation::Addresses => "addressedBy",
            Relation::CausedBy => "caused",
            Relation::RelatedTo => "relatedTo",
            Relation::DependsOn => "dependedOnBy",
            Relation::UsedIn => "uses",
            Relation::IsA => "hasSubtype",
            Relation::PartOf => "hasPart",
        }
    }

    pub fn parse(s: &str) -> Option<Relation> {
        Relation::ALL.iter().copied().find(|r| r.as_str() == s)
    }

    /// Recovers the original relation from an inverse name, for
    /// relation-filtered traversal over incoming edges.
    pub fn from_inverse_name(s: &str) -> Option<Relation> {
        Relation::ALL.iter().copied().find(|r| r.inverse_name() == s)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Relation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Relation::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown relation: {}", s)))
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub phases: Vec<i64>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_status() -> String {
    "active".to_string()
}

/// A typed, directed edge between two nodes.
///
/// `source` must reference a known node; `target` may be an external
/// reference that has no node of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub relation: Relation,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-node adjacency entry: outgoing edges keyed by relation name,
/// incoming edges keyed by the relation's inverse name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeAdjacency {
    #[serde(default)]
    pub outgoing: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub incoming: BTreeMap<String, Vec<String>>,
}

/// How a search result matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Text,
    Graph,
    Both,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Text => "text",
            MatchType::Graph => "graph",
            MatchType::Both => "both",
        }
    }
}

/// A ranked hit produced by the hybrid searcher.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(rename = "id")]
    pub node_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub score: f64,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    pub snippet: String,
    #[serde(rename = "pathFromQuery", skip_serializing_if = "Option::is_none")]
    pub path_from_query: Option<Vec<String>>,
    #[serde(rename = "decayScore", skip_serializing_if = "Option::is_none")]
    pub decay_score: Option<f64>,
    #[serde(rename = "decayStatus", skip_serializing_if = "Option::is_none")]
    pub decay_status: Option<String>,
}

/// On-disk shape of `graph.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl Default for GraphFile {
    fn default() -> Self {
        GraphFile {
            version: CORPUS_FORMAT_VERSION.to_string(),
            updated_at: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// On-disk shape of `adjacency.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjacencyFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub adjacency: BTreeMap<String, NodeAdjacency>,
    #[serde(default)]
    pub metadata: AdjacencyMetadata,
}

impl Default for AdjacencyFile {
    fn default() -> Self {
        AdjacencyFile {
            version: CORPUS_FORMAT_VERSION.to_string(),
            adjacency: BTreeMap::new(),
            metadata: AdjacencyMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjacencyMetadata {
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub edge_count: usize,
    #[serde(default)]
    pub last_updated: Option<String>,
}
