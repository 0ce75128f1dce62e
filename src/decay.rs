//! Read-only freshness index.
//!
//! Decay scores are computed by an external tool and persisted as
//! `decay_index.json` at the corpus root. This module only reads them: a
//! missing or unreadable file loads as an empty index, and every lookup
//! falls back to a neutral default, so search works the same on a corpus
//! that has never been scored.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_SCORE: f64 = 0.5;
const DEFAULT_STATUS: &str = "unknown";

/// Freshness of one node: a score in [0, 1] and a coarse status label
/// (fresh, aging, stale, obsolete — or "unknown" for unscored nodes).
#[derive(Debug, Clone, Deserialize)]
pub struct DecayRecord {
    #[serde(default = "default_score")]
    pub score: f64,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_score() -> f64 {
    DEFAULT_SCORE
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

impl Default for DecayRecord {
    fn default() -> Self {
        DecayRecord {
            score: DEFAULT_SCORE,
            status: DEFAULT_STATUS.to_string(),
        }
    }
}

/// On-disk shape of `decay_index.json`. Extra per-node fields written by
/// the scoring tool are ignored.
#[derive(Debug, Default, Deserialize)]
struct DecayFile {
    #[serde(default)]
    nodes: HashMap<String, DecayRecord>,
}

#[derive(Debug, Default)]
pub struct DecayIndex {
    records: HashMap<String, DecayRecord>,
}

impl DecayIndex {
    /// Loads the decay index for a corpus. Missing or unreadable files
    /// yield an empty index.
    pub fn open(corpus_root: &Path) -> DecayIndex {
        let path = corpus_root.join("decay_index.json");
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<DecayFile>(&raw).ok())
            .map(|file| file.nodes)
            .unwrap_or_default();
        DecayIndex { records }
    }

    /// The record for a node, or the neutral default when unscored.
    pub fn get(&self, node_id: &str) -> DecayRecord {
        self.records.get(node_id).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
